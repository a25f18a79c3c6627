//! Training Pipeline for the Language Classifier
//!
//! This module implements the training loop using the Burn framework:
//! - Forward/backward passes with automatic differentiation
//! - Categorical cross-entropy against one-hot labels
//! - Nadam updates
//! - Per-epoch validation loss and accuracy
//! - Saving the fitted model next to its configuration

use std::path::Path;

use anyhow::{Context, Result};
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{adaptor::OptimizerAdaptor, GradientsParams, Optimizer},
    record::CompactRecorder,
    tensor::{
        activation::log_softmax,
        backend::{AutodiffBackend, Backend},
        ElementConversion, Int, Tensor,
    },
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::optim::{Nadam, NadamConfig};
use crate::dataset::{LanguageBatch, LanguageBatcher, LanguageBurnDataset, LoadedSplit};
use crate::model::config::TrainingConfig;
use crate::model::LanguageClassifier;
use crate::utils::logging::EpochLogger;
use crate::utils::metrics::RunningAverage;

/// Mean categorical cross-entropy between logits and one-hot targets
///
/// Computed through `log_softmax`, which equals `-sum(y * log(softmax(x)))`
/// without the overflow of a separate softmax and log.
pub fn categorical_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    one_hot: Tensor<B, 2>,
) -> Tensor<B, 1> {
    (one_hot * log_softmax(logits, 1)).sum_dim(1).mean().neg()
}

/// Number of rows whose arg-max matches the target class
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let [batch_size, _] = logits.dims();
    let predictions = logits.argmax(1).reshape([batch_size]);
    let correct: i64 = predictions.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Metrics for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Per-epoch training history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn record(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Highest validation accuracy across epochs
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|e| e.val_accuracy)
            .fold(None, |best, acc| Some(best.map_or(acc, |b: f64| b.max(acc))))
    }
}

/// Fits a [`LanguageClassifier`] with Nadam
pub struct Trainer<B: AutodiffBackend> {
    /// Model being trained
    pub model: LanguageClassifier<B>,
    optimizer: OptimizerAdaptor<Nadam, LanguageClassifier<B>, B>,
    /// Training configuration
    pub config: TrainingConfig,
    batcher: LanguageBatcher,
    rng: ChaCha8Rng,
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a new trainer with the given model and configuration
    pub fn new(model: LanguageClassifier<B>, config: TrainingConfig, device: B::Device) -> Self {
        let optimizer = NadamConfig::from(&config.optimizer).init();
        let batcher = LanguageBatcher::with_image_size(config.model.input_size);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Self {
            model,
            optimizer,
            config,
            batcher,
            rng,
            device,
        }
    }

    /// Train for one epoch over a freshly shuffled order
    ///
    /// Returns the sample-weighted mean loss and the accuracy.
    pub fn train_epoch(&mut self, dataset: &LanguageBurnDataset) -> (f64, f64) {
        let indices = shuffled_indices(&mut self.rng, dataset.len());

        let batch_size = self.config.batch_size.max(1);
        let num_batches = indices.len().div_ceil(batch_size);
        let progress = progress_bar(num_batches as u64);

        let mut loss_avg = RunningAverage::new();
        let mut correct = 0usize;
        let mut seen = 0usize;

        for chunk in indices.chunks(batch_size) {
            let items: Vec<_> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }
            let batch: LanguageBatch<B> = self.batcher.batch(items, &self.device);
            let n = batch.targets.dims()[0];

            let logits = self.model.forward(batch.images);
            let loss = categorical_cross_entropy(logits.clone(), batch.one_hot);

            let loss_value: f64 = loss.clone().into_scalar().elem();
            loss_avg.update(loss_value, n);
            correct += count_correct(logits, batch.targets);
            seen += n;

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optimizer
                .step(self.config.learning_rate, self.model.clone(), grads);

            progress.set_message(format!(
                "loss: {:.4} - accuracy: {:.4}",
                loss_avg.average(),
                correct as f64 / seen as f64
            ));
            progress.inc(1);
        }
        progress.finish_and_clear();

        (loss_avg.average(), correct as f64 / seen.max(1) as f64)
    }

    /// Run all configured epochs, validating after each one
    pub fn fit(
        &mut self,
        train: &LanguageBurnDataset,
        valid: &LanguageBurnDataset,
    ) -> TrainingHistory {
        let mut history = TrainingHistory::default();
        let mut logger = EpochLogger::new(self.config.epochs);

        for epoch in 0..self.config.epochs {
            logger.start_epoch(epoch);

            let (train_loss, train_accuracy) = self.train_epoch(train);
            let (val_loss, val_accuracy) = evaluate_loss(
                &self.model.valid(),
                valid,
                self.config.eval_batch_size,
                &self.device,
            );

            logger.end_epoch(train_loss, train_accuracy, val_loss, val_accuracy);
            history.record(EpochMetrics {
                epoch: epoch + 1,
                train_loss,
                train_accuracy,
                val_loss,
                val_accuracy,
            });
        }
        logger.log_complete();

        history
    }

    /// Save the model (`<output>.mpk`) and the run configuration (`<output>.json`)
    pub fn save(&self, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        self.model
            .clone()
            .save_file(output, &CompactRecorder::new())
            .map_err(|e| anyhow::anyhow!("Failed to save model to {:?}: {:?}", output, e))?;

        let config_path = output.with_extension("json");
        self.config
            .save(&config_path)
            .with_context(|| format!("Failed to write {:?}", config_path))?;

        info!("Saved model to {:?} and config to {:?}", output, config_path);
        Ok(())
    }
}

/// Mean loss and accuracy of a model over a dataset, without gradients
pub fn evaluate_loss<B: Backend>(
    model: &LanguageClassifier<B>,
    dataset: &LanguageBurnDataset,
    batch_size: usize,
    device: &B::Device,
) -> (f64, f64) {
    let batcher = LanguageBatcher::with_image_size(dataset.image_size());
    let mut loss_avg = RunningAverage::new();
    let mut correct = 0usize;
    let mut total = 0usize;

    let len = dataset.len();
    for start in (0..len).step_by(batch_size.max(1)) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: LanguageBatch<B> = batcher.batch(items, device);
        let n = batch.targets.dims()[0];
        let logits = model.forward(batch.images);

        let loss: f64 = categorical_cross_entropy(logits.clone(), batch.one_hot)
            .into_scalar()
            .elem();
        loss_avg.update(loss, n);
        correct += count_correct(logits, batch.targets);
        total += n;
    }

    debug!("Evaluated {} samples", total);
    (loss_avg.average(), correct as f64 / total.max(1) as f64)
}

/// `0..len` in the order drawn from `rng`
fn shuffled_indices(rng: &mut ChaCha8Rng, len: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Train a fresh model on `train`, validating on `valid`, and save it
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
///
/// # Returns
/// * The fitted model and its per-epoch history
pub fn run_training<B: AutodiffBackend>(
    config: &TrainingConfig,
    train: LoadedSplit,
    valid: LoadedSplit,
    device: &B::Device,
) -> Result<(LanguageClassifier<B>, TrainingHistory)> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid training configuration: {}", e))?;

    let model = config.model.init::<B>(device);
    println!("{}", model.summary());
    info!(
        "Training on {} samples, validating on {} ({} epochs, batch size {})",
        train.len(),
        valid.len(),
        config.epochs,
        config.batch_size
    );

    let train = LanguageBurnDataset::new(train);
    let valid = LanguageBurnDataset::new(valid);

    let mut trainer = Trainer::new(model, config.clone(), device.clone());
    let history = trainer.fit(&train, &valid);
    trainer.save(&config.output)?;

    Ok((trainer.model, history))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Augmentation, SampleMetadata};
    use crate::model::LanguageClassifierConfig;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    const SIZE: usize = 4;

    /// Three linearly separable classes: dark, mid and bright images
    fn split(name: &str, per_class: usize) -> LoadedSplit {
        let mut labels = Vec::new();
        let mut features = Vec::new();
        let mut metadata = Vec::new();
        for (class, (lang, level)) in [("de", 0.0f32), ("en", 0.5), ("es", 1.0)].iter().enumerate() {
            for i in 0..per_class {
                let mut row = vec![0.0; 3];
                row[class] = 1.0;
                labels.push(row);
                features.extend(std::iter::repeat(*level).take(SIZE * SIZE));
                let filename = format!("{}_{}_fragment{}", lang, name, i);
                metadata.push(SampleMetadata {
                    columns: vec![lang.to_string(), "s".into(), filename.clone()],
                    language: lang.to_string(),
                    filename,
                    augmentation: Augmentation::Original,
                });
            }
        }
        LoadedSplit {
            name: name.to_string(),
            labels,
            features,
            metadata,
            image_size: SIZE,
        }
    }

    fn config(dir: &Path) -> TrainingConfig {
        TrainingConfig {
            output: dir.join("language"),
            epochs: 2,
            batch_size: 4,
            eval_batch_size: 5,
            learning_rate: 1e-2,
            model: LanguageClassifierConfig::new()
                .with_input_size(SIZE)
                .with_dense_units(4),
            ..TrainingConfig::debug()
        }
    }

    #[test]
    fn test_cross_entropy_matches_hand_computation() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.0f32, 0.0, 0.0, 2.0, 0.0, 0.0], [2, 3]),
            &device,
        );
        let one_hot = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0], [2, 3]),
            &device,
        );

        let loss: f32 = categorical_cross_entropy(logits, one_hot).into_scalar().elem();

        let uniform = 3.0f32.ln();
        let peaked = -(2.0f32.exp() / (2.0f32.exp() + 2.0)).ln();
        assert!((loss - (uniform + peaked) / 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_count_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(vec![0.1f32, 0.8, 0.1, 0.9, 0.05, 0.05], [2, 3]),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![1i64, 2], [2]), &device);
        assert_eq!(count_correct(logits, targets), 1);
    }

    #[test]
    fn test_seed_fixes_shuffle_order() {
        let order = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (
                shuffled_indices(&mut rng, 50),
                shuffled_indices(&mut rng, 50),
            )
        };

        let (first, second) = order(42);
        assert_eq!(order(42), (first.clone(), second.clone()));
        assert_ne!(first, second);
        assert_ne!(order(7).0, first);

        let mut sorted = first;
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_history_best_accuracy() {
        let mut history = TrainingHistory::default();
        assert_eq!(history.best_val_accuracy(), None);
        for (epoch, acc) in [(1, 0.4), (2, 0.7), (3, 0.6)] {
            history.record(EpochMetrics {
                epoch,
                train_loss: 1.0,
                train_accuracy: acc,
                val_loss: 1.0,
                val_accuracy: acc,
            });
        }
        assert_eq!(history.best_val_accuracy(), Some(0.7));
        assert_eq!(history.last().map(|e| e.epoch), Some(3));
    }

    #[test]
    fn test_evaluate_loss_on_untrained_model() {
        let device = Default::default();
        let model = LanguageClassifierConfig::new()
            .with_input_size(SIZE)
            .init::<TestBackend>(&device);
        let dataset = LanguageBurnDataset::new(split("valid", 3));

        let (loss, accuracy) = evaluate_loss(&model, &dataset, 4, &device);

        assert!(loss.is_finite() && loss > 0.0);
        assert!((0.0..=1.0).contains(&accuracy));
    }

    #[test]
    fn test_run_training_records_history_and_saves() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let config = config(&dir.path().join("models"));

        let (model, history) =
            run_training::<TestAutodiffBackend>(&config, split("train", 6), split("valid", 2), &device)
                .unwrap();

        assert_eq!(history.len(), 2);
        for epoch in &history.epochs {
            assert!(epoch.train_loss.is_finite());
            assert!((0.0..=1.0).contains(&epoch.val_accuracy));
        }
        assert_eq!(model.num_classes(), 3);
        assert!(config.output.with_extension("mpk").exists());
        assert!(config.config_path().exists());
    }

    #[test]
    fn test_training_lowers_loss() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());

        let model = config.model.init::<TestAutodiffBackend>(&device);
        let train = LanguageBurnDataset::new(split("train", 8));
        let mut trainer = Trainer::new(model, config, device);

        let (first, _) = trainer.train_epoch(&train);
        let mut last = first;
        for _ in 0..14 {
            last = trainer.train_epoch(&train).0;
        }
        assert!(last < first);
    }
}
