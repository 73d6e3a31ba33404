//! Demonstration of the activity classification pipeline.
//!
//! This example shows how to:
//! 1. Build sessions of sensor samples
//! 2. Window them and extract features into a corpus
//! 3. Train and evaluate an SVM with a stratified split
//! 4. Classify a live stream window by window
//!
//! Run with: cargo run --example pipeline_demo
//!
//! The sessions are synthetic: each activity is a sine wave on the linear
//! acceleration axes with its own amplitude and frequency, plus noise.

use std::f64::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use activity_classifier::{
    classifier::{InferenceService, LinfaSvm, SplitConfig, TrainParams, Trainer},
    core::{DatasetBuilder, SampleBuffer, WindowSpec},
    SensorSample, SessionTable,
};

/// (label, amplitude, frequency in Hz) per simulated activity.
const ACTIVITIES: [(i32, f64, f64); 3] = [(1, 1.5, 2.0), (2, 4.0, 3.0), (4, 0.05, 0.2)];

const SAMPLE_RATE_HZ: f64 = 100.0;

fn simulate(
    label: i32,
    amplitude: f64,
    freq: f64,
    n: usize,
    rng: &mut StdRng,
) -> Vec<SensorSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE_HZ;
            let wave = amplitude * (TAU * freq * t).sin();
            let noise = |rng: &mut StdRng| rng.gen_range(-0.1..0.1);
            SensorSample::new(
                label,
                [wave + noise(rng), 0.5 * wave + noise(rng), noise(rng)],
                [noise(rng), 9.81 + noise(rng), noise(rng)],
                [0.3 * wave + noise(rng), noise(rng), noise(rng)],
            )
        })
        .collect()
}

fn main() {
    println!("Activity Classifier - Pipeline Demo");
    println!("===================================");
    println!();

    let mut rng = StdRng::seed_from_u64(7);
    let spec = WindowSpec::default();

    // One session per activity and repetition
    let mut sessions = Vec::new();
    for repetition in 0..4 {
        for &(label, amplitude, freq) in &ACTIVITIES {
            let samples = simulate(label, amplitude, freq, 1_500, &mut rng);
            sessions.push(SessionTable::new(format!("{label}-{repetition}"), samples));
        }
    }

    let builder = DatasetBuilder::new(spec);
    let corpus = builder.build(&sessions);
    println!("{}", builder.stats().summary());
    println!();

    let trainer = Trainer::new(LinfaSvm::new(), TrainParams::default(), SplitConfig::default());
    let outcome = match trainer.train_and_evaluate(&corpus) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Training failed: {e}");
            return;
        }
    };
    println!(
        "Accuracy: {:.2}% on {} held-out windows",
        outcome.metrics.accuracy * 100.0,
        outcome.test_size
    );
    println!("{}", outcome.metrics.confusion);
    println!();

    // Feed a fresh walking stream sample by sample
    let service = InferenceService::new(LinfaSvm::new(), outcome.model);
    let mut buffer = SampleBuffer::new(spec);
    let (label, amplitude, freq) = ACTIVITIES[0];
    println!("Streaming a new session (recorded label {label}):");
    for sample in simulate(label, amplitude, freq, 800, &mut rng) {
        buffer.push(sample);
        for buffered in buffer.take_completed_windows() {
            match service.classify_window(&buffered.as_window()) {
                Ok(prediction) => println!(
                    "  window @ {:>4}: {} ({})",
                    buffered.start, prediction.label, prediction.activity
                ),
                Err(e) => eprintln!("  window @ {:>4}: {e}", buffered.start),
            }
        }
    }
}
