//! Pass-coverage classifier CLI
//!
//! Trains a fold ensemble of permutation-invariant CNNs on player-tracking data
//! and predicts the defensive coverage scheme of each play.

use clap::{Parser, Subcommand};
use coverage::{Config, Result};

#[derive(Parser)]
#[command(name = "coverage")]
#[command(about = "Pass-coverage classification from player-tracking data", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data inspection commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Train the fold ensemble with stratified cross-validation
    Train {
        /// Override number of epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override number of folds
        #[arg(long)]
        folds: Option<usize>,
    },
    /// Predict coverage schemes for a tracking file
    Predict {
        /// Tracking CSV to classify
        #[arg(long)]
        tracking: String,
        /// Optional labels CSV to score the predictions against
        #[arg(long)]
        labels: Option<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Show play and class counts for the configured week
    Status,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown format: {}. Use table, json, or csv.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Train { epochs, folds } => commands::train(&config, epochs, folds),
        Commands::Predict {
            tracking,
            labels,
            format,
        } => commands::predict(&config, &tracking, labels.as_deref(), format),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use std::path::Path;

    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use coverage::data::{CoverageDataset, TrackingLoader};
    use coverage::features::{assemble, build_relative_features};
    use coverage::predict::EnsemblePredictor;
    use coverage::training::{stratified_holdout, CrossValidator, FoldCheckpoints};
    use coverage::{CoverageError, Deployment, PlayPrediction};

    type MyBackend = NdArray<f32>;
    type MyAutodiffBackend = Autodiff<MyBackend>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.model_dir)?;
        println!("Created data/ and {}/ directories", config.data.model_dir);

        println!("\nNext steps:");
        println!("  1. Put tracking and coverage label CSVs under data/");
        println!("  2. Edit {} to point at them", config_path);
        println!("  3. Run 'coverage train' to train the fold ensemble");
        println!("  4. Run 'coverage predict --tracking <FILE>' to classify plays");

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let week = TrackingLoader::new()
            .with_frame(config.data.frame_id)
            .load_paths(
                Path::new(&config.data.tracking_path),
                Path::new(&config.data.labels_path),
            )?;

        println!("Data Status");
        println!("───────────────────────────────");
        println!("  Tracking:  {}", config.data.tracking_path);
        println!("  Labels:    {}", config.data.labels_path);
        println!("  Plays:     {}", week.plays.len());
        println!("  Unlabeled: {} (dropped)", week.dropped_unlabeled);
        println!("  Classes:   {}", week.classes.len());
        for (code, (name, count)) in week.class_counts().into_iter().enumerate() {
            println!("    {:>2}. {:<24} {:>5}", code + 1, name, count);
        }

        match FoldCheckpoints::<MyBackend>::read_manifest(Path::new(&config.data.model_dir)) {
            Ok(manifest) => println!(
                "  Model:     {} x{} trained {}",
                manifest.deployment,
                manifest.folds.len(),
                manifest.trained_at.format("%Y-%m-%d %H:%M")
            ),
            Err(CoverageError::NoModel) => println!("  Model:     none"),
            Err(e) => return Err(e),
        }

        Ok(())
    }

    pub fn train(config: &Config, epochs: Option<usize>, folds: Option<usize>) -> Result<()> {
        let mut training_config = config.clone();
        if let Some(e) = epochs {
            training_config.training.epochs = e;
        }
        if let Some(k) = folds {
            training_config.training.folds = k;
        }
        training_config.validate()?;

        println!("Initializing training...");

        let week = TrackingLoader::new()
            .with_frame(config.data.frame_id)
            .load_paths(
                Path::new(&config.data.tracking_path),
                Path::new(&config.data.labels_path),
            )?;
        if week.plays.is_empty() {
            return Err(CoverageError::InsufficientData(format!(
                "no labeled plays in {}",
                config.data.tracking_path
            )));
        }
        println!(
            "Loaded {} labeled plays across {} classes",
            week.plays.len(),
            week.classes.len()
        );

        let dataset = CoverageDataset::from_plays(&week.plays, &week.classes)?;

        // Stratified holdout for the final ensemble report
        let (train_dataset, test_dataset) = if config.data.test_fraction > 0.0 {
            let (train, test) = stratified_holdout(
                &dataset.labels(),
                config.data.test_fraction,
                training_config.training.seed,
            )?;
            (dataset.subset(&train), Some(dataset.subset(&test)))
        } else {
            (dataset, None)
        };
        println!("  {} training plays", train_dataset.len());
        if let Some(test) = &test_dataset {
            println!("  {} held-out test plays", test.len());
        }

        let device = NdArrayDevice::default();
        let validator = CrossValidator::<MyAutodiffBackend>::from_config(&training_config, device);

        println!("\nStarting training...\n");
        let checkpoints = match config.predict.deployment {
            Deployment::Ensemble => {
                let result = validator.run(&train_dataset)?;
                println!("\nCross-validation complete!");
                for report in &result.reports {
                    println!(
                        "  Fold {}: best val acc {:.1}% at epoch {} ({} train / {} val)",
                        report.fold + 1,
                        report.history.best_val_accuracy.unwrap_or(0.0) * 100.0,
                        report.history.best_epoch + 1,
                        report.train_size,
                        report.val_size
                    );
                }
                if let Some(mean) = result.checkpoints.mean_val_accuracy() {
                    println!("  Mean:   {:.1}%", mean * 100.0);
                }
                result.checkpoints
            }
            Deployment::FullData => {
                let (checkpoints, history) = validator.train_full(&train_dataset)?;
                println!("\nTraining complete!");
                if let Some(reduction) = history.loss_reduction() {
                    println!("  Loss reduction: {:.4}", reduction);
                }
                checkpoints
            }
        };

        println!("\nSaving checkpoints to {}...", config.data.model_dir);
        checkpoints.save(Path::new(&config.data.model_dir))?;

        if let Some(test) = test_dataset {
            let predictor = EnsemblePredictor::from_checkpoints(&checkpoints, device)?;
            let report = predictor.evaluate(&test)?;
            println!(
                "\nHeld-out accuracy ({} model{}): {:.1}%",
                predictor.model_count(),
                if predictor.model_count() == 1 { "" } else { "s" },
                report.accuracy * 100.0
            );
            println!("\nConfusion matrix (rows = actual, columns = predicted):");
            print!("{}", report.confusion);
        }

        Ok(())
    }

    pub fn predict(
        config: &Config,
        tracking: &str,
        labels: Option<&str>,
        format: OutputFormat,
    ) -> Result<()> {
        let device = NdArrayDevice::default();
        let checkpoints =
            FoldCheckpoints::<MyBackend>::load(Path::new(&config.data.model_dir), &device)?;
        let predictor = EnsemblePredictor::from_checkpoints(&checkpoints, device)?;

        let loader = TrackingLoader::new().with_frame(config.data.frame_id);
        let predictions = match labels {
            Some(labels) => {
                let week = loader.load_paths(Path::new(tracking), Path::new(labels))?;
                let dataset = CoverageDataset::from_plays(&week.plays, predictor.classes())?;
                let report = predictor.evaluate(&dataset)?;
                log::info!("Accuracy: {:.2}%", report.accuracy * 100.0);
                report.predictions
            }
            None => {
                let file = std::fs::File::open(tracking)?;
                let plays = loader.load_unlabeled(file)?;
                let mut keys = Vec::with_capacity(plays.len());
                let mut tensors = Vec::with_capacity(plays.len());
                for play in &plays {
                    let table = build_relative_features(play.key, play.frame_id, &play.participants)?;
                    keys.push(play.key);
                    tensors.push(assemble(&table)?);
                }
                predictor.predict_plays(&keys, &tensors, None)?
            }
        };

        match format {
            OutputFormat::Table => print!("{}", format_predictions(&predictions)),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&predictions)?);
            }
            OutputFormat::Csv => {
                println!("gameId,playId,predicted,confidence,actual");
                for p in &predictions {
                    println!(
                        "{},{},{},{:.3},{}",
                        p.play.game_id,
                        p.play.play_id,
                        p.predicted,
                        p.confidence,
                        p.actual.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Ok(())
    }

    fn format_predictions(predictions: &[PlayPrediction]) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<16} {:<24} {:>6}  {}\n",
            "Play", "Predicted", "Conf", "Actual"
        ));
        out.push_str(&format!("{}\n", "─".repeat(64)));
        for p in predictions {
            let actual = match (&p.actual, p.is_correct()) {
                (Some(actual), Some(true)) => format!("{} ✓", actual),
                (Some(actual), _) => format!("{} ✗", actual),
                (None, _) => String::new(),
            };
            out.push_str(&format!(
                "{:<16} {:<24} {:>5.1}%  {}\n",
                p.play.to_string(),
                p.predicted,
                p.confidence * 100.0,
                actual
            ));
        }
        out
    }
}
