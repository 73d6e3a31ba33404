//! End-to-end tests: CSV sessions to corpus, model and predictions

use activity_classifier::classifier::{
    classify, Classifier, InferenceService, LinfaSvm, SplitConfig, TrainParams, Trainer,
};
use activity_classifier::core::{
    generate_windows, Corpus, DatasetBuilder, MinMaxScaler, SampleBuffer, ScalingConfig,
    WindowSpec,
};
use activity_classifier::source::{discover_sessions, load_session, SourceLayout};
use activity_classifier::PipelineError;
use std::fmt::Write as _;
use std::path::Path;

/// Write one session with `rows` samples of `label`; `amplitude` drives the
/// spread of the linear x axis.
fn write_session(dir: &Path, label: i32, rows: usize, amplitude: f64) {
    std::fs::create_dir_all(dir).unwrap();
    for (file, scale) in [("linear.csv", 1.0), ("gravity.csv", 0.1), ("gyro.csv", 0.5)] {
        let mut text = String::from("label,timestamp,x,y,z\n");
        for i in 0..rows {
            let phase = (i % 8) as f64 - 3.5;
            let x = amplitude * scale * phase;
            let _ = writeln!(text, "{label},{i},{x},{},{}", x * 0.5, -x);
        }
        std::fs::write(dir.join(file), text).unwrap();
    }
}

fn write_dataset(root: &Path) {
    // numeric names sort numerically: 2 before 10
    write_session(&root.join("10"), 4, 650, 0.01);
    write_session(&root.join("2"), 1, 650, 1.0);
    write_session(&root.join("3"), 2, 650, 3.0);
    write_session(&root.join("11"), 1, 650, 1.1);
    write_session(&root.join("12"), 2, 650, 2.9);
    write_session(&root.join("13"), 4, 650, 0.02);
}

#[test]
fn test_sessions_to_model_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("sessions");
    write_dataset(&data);

    let dirs = discover_sessions(&data).unwrap();
    let names: Vec<String> = dirs
        .iter()
        .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["2", "3", "10", "11", "12", "13"]);

    let spec = WindowSpec::new(100, 50).unwrap();
    let builder = DatasetBuilder::new(spec);
    let corpus = builder.build_from_dirs(&dirs, &SourceLayout::default()).unwrap();

    // floor((650 - 100) / 50) + 1 windows per session
    assert_eq!(corpus.len(), 6 * 12);
    assert_eq!(corpus.examples()[0].label, 1);
    assert_eq!(corpus.examples()[12].label, 2);

    let corpus_path = tmp.path().join("corpus.txt");
    corpus.save(&corpus_path).unwrap();
    let reloaded = Corpus::load(&corpus_path).unwrap();
    assert_eq!(reloaded, corpus);

    let trainer = Trainer::new(LinfaSvm::new(), TrainParams::default(), SplitConfig::default());
    let first = trainer.train_and_evaluate(&reloaded).unwrap();
    let second = trainer.train_and_evaluate(&reloaded).unwrap();
    assert_eq!(first.metrics.accuracy, second.metrics.accuracy);
    assert_eq!(first.metrics.confusion, second.metrics.confusion);
    assert!(first.metrics.accuracy > 0.9, "accuracy {}", first.metrics.accuracy);

    let model_path = tmp.path().join("model.json");
    trainer.persist(&first.model, &model_path).unwrap();

    let backend = LinfaSvm::new();
    let model = backend.load(&model_path).unwrap();
    for example in corpus.examples().iter().step_by(7) {
        assert_eq!(
            classify(&backend, &model, example.features.as_slice()).unwrap(),
            classify(&backend, &first.model, example.features.as_slice()).unwrap()
        );
    }
}

#[test]
fn test_live_replay_matches_batch_predictions() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("sessions");
    write_dataset(&data);

    let spec = WindowSpec::new(100, 50).unwrap();
    let dirs = discover_sessions(&data).unwrap();
    let corpus = DatasetBuilder::new(spec)
        .build_from_dirs(&dirs, &SourceLayout::default())
        .unwrap();

    let scaler = MinMaxScaler::fit(&corpus, ScalingConfig::default()).unwrap();
    let scaled = scaler.transform_corpus(&corpus);
    let trainer = Trainer::new(LinfaSvm::new(), TrainParams::default(), SplitConfig::default());
    let outcome = trainer.train_and_evaluate(&scaled).unwrap();

    let range_path = tmp.path().join("corpus.range");
    scaler.save(&range_path).unwrap();
    let model_path = tmp.path().join("model.json");
    trainer.persist(&outcome.model, &model_path).unwrap();
    let service = InferenceService::load(LinfaSvm::new(), &model_path, Some(&range_path)).unwrap();

    let table = load_session(&dirs[1], &SourceLayout::default()).unwrap();
    let batch: Vec<i32> = generate_windows(&table, spec)
        .iter()
        .map(|w| service.classify_window(w).unwrap().label)
        .collect();

    let mut buffer = SampleBuffer::new(spec);
    let mut streamed = Vec::new();
    for sample in table.samples() {
        buffer.push(*sample);
        for window in buffer.take_completed_windows() {
            streamed.push(service.classify_window(&window.as_window()).unwrap().label);
        }
    }

    assert_eq!(streamed, batch);
    assert!(streamed.iter().all(|&label| label == 2));
}

#[test]
fn test_misaligned_session_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let session = tmp.path().join("broken");
    write_session(&session, 1, 120, 1.0);
    // drop the last gyro row so the files disagree in length
    let gyro = std::fs::read_to_string(session.join("gyro.csv")).unwrap();
    let truncated: Vec<&str> = gyro.lines().collect();
    std::fs::write(session.join("gyro.csv"), truncated[..truncated.len() - 1].join("\n")).unwrap();

    let err = DatasetBuilder::new(WindowSpec::default())
        .build_from_dirs(&[session], &SourceLayout::default())
        .unwrap_err();
    match err {
        PipelineError::Shape { session, .. } => assert_eq!(session, "broken"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_bad_cell_names_session_and_row() {
    let tmp = tempfile::tempdir().unwrap();
    let session = tmp.path().join("7");
    write_session(&session, 3, 5, 1.0);
    let linear = std::fs::read_to_string(session.join("linear.csv")).unwrap();
    std::fs::write(session.join("linear.csv"), linear.replacen("3,2,", "3,2,oops", 1)).unwrap();

    let err = load_session(&session, &SourceLayout::default()).unwrap_err();
    match err {
        PipelineError::Input { session, row, .. } => {
            assert_eq!(session, "7");
            assert_eq!(row, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
