//! Activity classifier CLI
//!
//! Builds LIBSVM corpora from recorded sensor sessions, trains and evaluates
//! SVM models, and classifies new windows.

use activity_classifier::{
    classifier::{
        InferenceService, KernelType, LinfaSvm, Trainer, TrainingOutcome, TrainingReport,
    },
    config::Config,
    core::{
        dataset::parse_feature_tokens, Corpus, DatasetBuilder, FeatureVector, MinMaxScaler,
        SampleBuffer, FEATURE_COUNT,
    },
    source::{discover_sessions, load_session},
    stats::create_shared_stats_with_persistence,
    VERSION,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "activity-svm")]
#[command(version = VERSION)]
#[command(about = "Windowed sensor features and SVM activity classification", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a LIBSVM corpus from recorded sessions
    Corpus {
        /// Directory holding one sub-directory per session
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Explicit session directories, in corpus order (overrides --data-dir)
        #[arg(long = "session")]
        sessions: Vec<PathBuf>,

        /// Corpus file to write
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Window size in samples
        #[arg(long)]
        window_size: Option<usize>,

        /// Stride in samples
        #[arg(long)]
        stride: Option<usize>,

        /// Fit and apply min-max scaling, even if the config leaves it off
        #[arg(long)]
        scale: bool,
    },

    /// Train and evaluate a model on a corpus
    Train {
        /// Corpus file
        #[arg(long)]
        corpus: Option<PathBuf>,

        /// Model file to write
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Kernel (linear, polynomial or rbf)
        #[arg(long)]
        kernel: Option<KernelType>,

        /// Soft-margin cost
        #[arg(long)]
        c: Option<f64>,

        /// RBF width
        #[arg(long)]
        gamma: Option<f64>,

        /// Polynomial degree
        #[arg(long)]
        degree: Option<u32>,

        /// Polynomial offset
        #[arg(long)]
        coef0: Option<f64>,

        /// Share of each class held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Split seed
        #[arg(long)]
        seed: Option<u64>,

        /// Abort training after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Classify one feature vector
    Classify {
        /// Model file
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Range file to scale the vector with
        #[arg(long)]
        range_file: Option<PathBuf>,

        /// Values as "1:v 2:v ..." tokens or a comma separated list of 18 numbers
        features: String,
    },

    /// Stream a recorded session through the live windowing buffer
    Replay {
        /// Session directory
        session: PathBuf,

        /// Model file
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Range file to scale features with
        #[arg(long)]
        range_file: Option<PathBuf>,
    },

    /// Serve predictions over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1 (0 for random)
        #[arg(long, default_value = "8787")]
        port: u16,

        /// Model file
        #[arg(long, short)]
        model: Option<PathBuf>,

        /// Range file to scale features with
        #[arg(long)]
        range_file: Option<PathBuf>,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Corpus {
            data_dir,
            sessions,
            output,
            window_size,
            stride,
            scale,
        } => cmd_corpus(config, data_dir, sessions, output, window_size, stride, scale),
        Commands::Train {
            corpus,
            model,
            kernel,
            c,
            gamma,
            degree,
            coef0,
            test_fraction,
            seed,
            timeout_secs,
        } => {
            let mut config = config;
            let svm = &mut config.svm;
            svm.kernel = kernel.unwrap_or(svm.kernel);
            svm.c = c.unwrap_or(svm.c);
            svm.gamma = gamma.unwrap_or(svm.gamma);
            svm.degree = degree.unwrap_or(svm.degree);
            svm.coef0 = coef0.unwrap_or(svm.coef0);
            config.split.test_fraction = test_fraction.unwrap_or(config.split.test_fraction);
            config.split.random_seed = seed.unwrap_or(config.split.random_seed);
            if timeout_secs.is_some() {
                config.training_timeout_secs = timeout_secs;
            }
            config.validate()?;
            cmd_train(&config, corpus, model)
        }
        Commands::Classify {
            model,
            range_file,
            features,
        } => cmd_classify(&config, model, range_file, &features),
        Commands::Replay {
            session,
            model,
            range_file,
        } => cmd_replay(&config, &session, model, range_file),
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            model,
            range_file,
        } => cmd_serve(&config, port, model, range_file),
        Commands::Config => {
            cmd_config(&config, cli.config.as_deref());
            Ok(())
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
    Config::load_from(&path).with_context(|| format!("loading configuration from {path:?}"))
}

fn default_corpus_path(config: &Config) -> PathBuf {
    config.data_path.join("corpus.txt")
}

fn default_model_path(config: &Config) -> PathBuf {
    config.data_path.join("model.json")
}

/// Range file belonging to a corpus: `corpus.txt` -> `corpus.range`.
fn range_path_for(corpus: &Path) -> PathBuf {
    corpus.with_extension("range")
}

fn cmd_corpus(
    mut config: Config,
    data_dir: Option<PathBuf>,
    sessions: Vec<PathBuf>,
    output: Option<PathBuf>,
    window_size: Option<usize>,
    stride: Option<usize>,
    scale: bool,
) -> anyhow::Result<()> {
    config.window.window_size = window_size.unwrap_or(config.window.window_size);
    config.window.stride = stride.unwrap_or(config.window.stride);
    if scale && config.scaling.is_none() {
        config.scaling = Some(Default::default());
    }
    config.validate()?;

    let dirs = if sessions.is_empty() {
        let data_dir = data_dir.unwrap_or_else(|| config.data_path.join("sessions"));
        discover_sessions(&data_dir)
            .with_context(|| format!("discovering sessions in {data_dir:?}"))?
    } else {
        sessions
    };
    if dirs.is_empty() {
        bail!("no session directories found");
    }

    config.ensure_directories()?;
    let stats = create_shared_stats_with_persistence(config.data_path.join("stats.json"));
    let builder = DatasetBuilder::new(config.window_spec()?).with_stats(stats.clone());
    let mut corpus = builder.build_from_dirs(&dirs, &config.source)?;

    let output = output.unwrap_or_else(|| default_corpus_path(&config));
    if let Some(bounds) = config.scaling {
        let scaler = MinMaxScaler::fit(&corpus, bounds)?;
        let range_path = range_path_for(&output);
        scaler.save(&range_path)?;
        corpus = scaler.transform_corpus(&corpus);
        println!("Scaling ranges written to {range_path:?}");
    }

    corpus.save(&output)?;
    if let Err(e) = stats.save() {
        tracing::warn!(error = %e, "could not save pipeline stats");
    }

    println!("{}", builder.stats().summary());
    println!();
    println!("Wrote {} example(s) to {output:?}", corpus.len());
    Ok(())
}

fn cmd_train(
    config: &Config,
    corpus: Option<PathBuf>,
    model: Option<PathBuf>,
) -> anyhow::Result<()> {
    let corpus_path = corpus.unwrap_or_else(|| default_corpus_path(config));
    let model_path = model.unwrap_or_else(|| default_model_path(config));

    let corpus =
        Corpus::load(&corpus_path).with_context(|| format!("reading corpus {corpus_path:?}"))?;
    println!("Loaded {} example(s) from {corpus_path:?}", corpus.len());

    let trainer = Trainer::new(LinfaSvm::new(), config.svm, config.split);
    let outcome = match config.training_timeout_secs {
        Some(secs) => trainer.train_with_timeout(&corpus, Duration::from_secs(secs))?,
        None => trainer.train_and_evaluate(&corpus)?,
    };

    print_outcome(&outcome);

    trainer.persist(&outcome.model, &model_path)?;
    let report = TrainingReport::new(&outcome, config.svm, config.split)
        .with_model_id(outcome.model.model_id)
        .with_scaling(range_path_for(&corpus_path).exists());
    let report_path = TrainingReport::path_for(&model_path);
    report.save(&report_path)?;

    println!();
    println!("Model saved to {model_path:?}");
    println!("Report saved to {report_path:?}");
    Ok(())
}

fn print_outcome<M>(outcome: &TrainingOutcome<M>) {
    let metrics = &outcome.metrics;
    println!();
    println!("Training Results");
    println!("================");
    println!("  Train examples: {}", outcome.train_size);
    println!("  Test examples: {}", outcome.test_size);
    println!(
        "  Accuracy: {:.2}% ({}/{})",
        metrics.accuracy * 100.0,
        metrics.correct,
        metrics.total
    );
    println!();
    println!("Confusion matrix (rows = true, columns = predicted):");
    println!("{}", metrics.confusion);
}

fn load_service(
    config: &Config,
    model: Option<PathBuf>,
    range_file: Option<PathBuf>,
) -> anyhow::Result<InferenceService<LinfaSvm>> {
    let model_path = model.unwrap_or_else(|| default_model_path(config));
    let service = InferenceService::load(LinfaSvm::new(), &model_path, range_file.as_deref())
        .with_context(|| format!("loading model {model_path:?}"))?;
    Ok(service)
}

/// Parse "1:v 2:v" tokens (absent indices are zero) or a plain number list.
fn parse_vector(input: &str) -> anyhow::Result<Vec<f64>> {
    if input.contains(':') {
        let sparse = parse_feature_tokens(input.split_whitespace())
            .map_err(|reason| anyhow::anyhow!("invalid feature tokens: {reason}"))?;
        let mut dense = FeatureVector::zeros();
        for (index, value) in sparse {
            dense.0[index - 1] = value;
        }
        return Ok(dense.as_slice().to_vec());
    }

    input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .with_context(|| format!("'{t}' is not a number"))
        })
        .collect()
}

fn cmd_classify(
    config: &Config,
    model: Option<PathBuf>,
    range_file: Option<PathBuf>,
    features: &str,
) -> anyhow::Result<()> {
    let values = parse_vector(features)?;
    if values.len() != FEATURE_COUNT {
        bail!(
            "expected {FEATURE_COUNT} feature values, got {}",
            values.len()
        );
    }
    let service = load_service(config, model, range_file)?;
    let prediction = service.classify_features(&values)?;
    println!("{} ({})", prediction.label, prediction.activity);
    Ok(())
}

fn cmd_replay(
    config: &Config,
    session: &Path,
    model: Option<PathBuf>,
    range_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let service = load_service(config, model, range_file)?;
    let table = load_session(session, &config.source)?;
    let mut buffer = SampleBuffer::new(config.window_spec()?);

    println!("Replaying session '{}' ({} samples)", table.id(), table.len());
    println!();
    println!("{:>8} {:>6} {:>12} {:>6}", "offset", "label", "activity", "truth");

    let mut windows = 0usize;
    let mut agreed = 0usize;
    for sample in table.samples() {
        buffer.push(*sample);
        for buffered in buffer.take_completed_windows() {
            let window = buffered.as_window();
            let prediction = service.classify_window(&window)?;
            let truth = window.label().unwrap_or_default();
            println!(
                "{:>8} {:>6} {:>12} {:>6}",
                window.start,
                prediction.label,
                prediction.activity.name(),
                truth
            );
            windows += 1;
            if prediction.label == truth {
                agreed += 1;
            }
        }
    }

    println!();
    if windows == 0 {
        println!("Session is shorter than one window; nothing classified.");
    } else {
        println!(
            "Agreement with recorded labels: {:.2}% ({agreed}/{windows})",
            agreed as f64 * 100.0 / windows as f64
        );
    }
    Ok(())
}

#[cfg(feature = "server")]
fn cmd_serve(
    config: &Config,
    port: u16,
    model: Option<PathBuf>,
    range_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    use activity_classifier::server::{run, ServerConfig};

    let mut server_config =
        ServerConfig::new(port, model.unwrap_or_else(|| default_model_path(config)));
    if let Some(range_file) = range_file {
        server_config = server_config.with_scaler(range_file);
    }

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(async {
        let (addr, shutdown_tx) = run(server_config).await?;
        println!("Serving predictions on http://{addr} (Ctrl+C to stop)");
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        println!("Server stopped.");
        Ok::<(), anyhow::Error>(())
    })
}

fn cmd_config(config: &Config, path: Option<&Path>) {
    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.map(Path::to_path_buf).unwrap_or_else(Config::config_path)
    );
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}
