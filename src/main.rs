//! langid CLI
//!
//! Loads the train/valid/test spectrogram bundles, fits the classifier and
//! prints classification reports for the validation and test splits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use chrono::Local;
use clap::Parser;
use colored::Colorize;
use tracing::info;

use langid::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use langid::dataset::{
    load_bundle_with, LabelBinarizer, LanguageBurnDataset, LoadOptions, LANGUAGES, TEST_BUNDLE,
    TRAIN_BUNDLE, VALID_BUNDLE,
};
use langid::inference::{evaluate_split, print_report, Predictor};
use langid::training::{run_training, TrainingConfig};
use langid::utils::logging::{init_logging, LogConfig};
use langid::utils::{format_number, Stopwatch};

/// Spoken language classification from spectrogram images
///
/// With no arguments, reads train.npz, valid.npz and test.npz from the
/// current directory, trains for 3 epochs and saves the model as `language`.
#[derive(Parser, Debug)]
#[command(name = "langid")]
#[command(version)]
#[command(about = "Classify en/de/es speech spectrograms with Burn", long_about = None)]
struct Cli {
    /// Directory holding the .npz bundles
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Model output path (without extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Drop augmented samples from the training bundle
    #[arg(long, default_value = "false")]
    skip_augmentation: bool,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size for training
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Learning rate
    #[arg(short, long)]
    learning_rate: Option<f64>,

    /// Random seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// JSON run configuration; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .with_context(|| format!("Failed to load configuration {:?}", path))?,
            None => TrainingConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if self.skip_augmentation {
            config.skip_augmentation = true;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    print_banner();

    let config = cli.training_config()?;
    info!("Run configuration: {:?}", config);

    // Data
    let stopwatch = Stopwatch::start("Loaded data");
    let binarizer = LabelBinarizer::fit(&LANGUAGES);
    println!("{} {:?}", "Label classes:".cyan(), binarizer.classes());

    let options = |skip_augmentation| LoadOptions {
        skip_augmentation,
        image_size: config.model.input_size,
        write_preview: config.write_previews,
    };
    let train = load_bundle_with(
        &binarizer,
        config.bundle_path(TRAIN_BUNDLE),
        &options(config.skip_augmentation),
    )?;
    let valid = load_bundle_with(&binarizer, config.bundle_path(VALID_BUNDLE), &options(false))?;
    let test = load_bundle_with(&binarizer, config.bundle_path(TEST_BUNDLE), &options(false))?;
    stopwatch.finish();

    println!(
        "  Training samples:   {}\n  Validation samples: {}\n  Test samples:       {}",
        format_number(train.len()),
        format_number(valid.len()),
        format_number(test.len())
    );

    // Model
    let stopwatch = Stopwatch::start("Generated model");
    let device = default_device();
    let (model, history) =
        run_training::<TrainingBackend>(&config, train, valid.clone(), &device)?;
    stopwatch.finish();

    if let Some(best) = history.best_val_accuracy() {
        println!("  Best validation accuracy: {:.4}", best);
    }

    // Evaluation
    let predictor = Predictor::<DefaultBackend>::new(model.valid(), device)
        .with_batch_size(config.eval_batch_size);

    let report = evaluate_split(&predictor, &LanguageBurnDataset::new(valid), &binarizer)?;
    print_report("Validation set", &report);

    let report = evaluate_split(&predictor, &LanguageBurnDataset::new(test), &binarizer)?;
    print_report("Test set", &report);

    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "langid: spoken language identification".green().bold());
    println!(
        "  Version {} | Backend: {} | {}",
        langid::VERSION,
        backend_name(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
}
