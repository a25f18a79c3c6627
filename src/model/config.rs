//! Training Configuration Module
//!
//! Defines the run configuration: where the bundles live, where the model is
//! written, training hyperparameters and Nadam settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::cnn::LanguageClassifierConfig;
use crate::utils::error::{LangIdError, Result};

/// Nadam hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub beta_1: f32,
    pub beta_2: f32,
    pub epsilon: f32,
    /// Decay of the momentum warm-up schedule
    pub schedule_decay: f32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            beta_1: 0.9,
            beta_2: 0.999,
            epsilon: 1e-7,
            schedule_decay: 0.004,
        }
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Directory holding train.npz, valid.npz and test.npz
    pub data_dir: PathBuf,

    /// Model path stem; the recorder adds `.mpk`, the config goes to `.json`
    pub output: PathBuf,

    /// Number of training epochs
    pub epochs: usize,

    /// Batch size for training
    pub batch_size: usize,

    /// Batch size for evaluation
    pub eval_batch_size: usize,

    /// Learning rate
    pub learning_rate: f64,

    /// Seed for the per-epoch shuffle order
    pub seed: u64,

    /// Drop augmented samples from the training bundle
    pub skip_augmentation: bool,

    /// Write `<bundle>.png` for each loaded bundle
    pub write_previews: bool,

    pub optimizer: OptimizerSettings,

    pub model: LanguageClassifierConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            output: PathBuf::from(super::DEFAULT_MODEL_STEM),
            epochs: 3,
            batch_size: 32,
            eval_batch_size: 32,
            learning_rate: 1e-4,
            seed: 42,
            skip_augmentation: false,
            write_previews: true,
            optimizer: OptimizerSettings::default(),
            model: LanguageClassifierConfig::new(),
        }
    }
}

impl TrainingConfig {
    /// Create a fast configuration for smoke tests
    pub fn debug() -> Self {
        Self {
            epochs: 1,
            batch_size: 4,
            eval_batch_size: 4,
            write_previews: false,
            ..Default::default()
        }
    }

    /// Path of a bundle inside `data_dir`
    pub fn bundle_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Where the run configuration is written next to the model
    pub fn config_path(&self) -> PathBuf {
        self.output.with_extension("json")
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.epochs == 0 {
            return Err("epochs must be greater than 0".to_string());
        }
        if self.batch_size == 0 || self.eval_batch_size == 0 {
            return Err("batch sizes must be greater than 0".to_string());
        }
        if !(self.learning_rate > 0.0) {
            return Err("learning_rate must be positive".to_string());
        }
        let opt = &self.optimizer;
        if !(0.0..1.0).contains(&opt.beta_1) || !(0.0..1.0).contains(&opt.beta_2) {
            return Err("beta_1 and beta_2 must be in range [0.0, 1.0)".to_string());
        }
        if !(opt.schedule_decay >= 0.0) {
            return Err("schedule_decay must not be negative".to_string());
        }
        if self.model.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }
        if self.model.input_size < 2 {
            return Err("input_size must be at least 2".to_string());
        }
        if self.model.conv_filters == 0 || self.model.dense_units == 0 {
            return Err("conv_filters and dense_units must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate().map_err(LangIdError::Config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.learning_rate, 1e-4);
        assert_eq!(config.optimizer.epsilon, 1e-7);
        assert_eq!(config.model.input_size, 192);
        assert_eq!(config.model.conv_filters, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_training_config_validation() {
        let mut config = TrainingConfig::default();
        config.epochs = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.learning_rate = 0.0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.optimizer.beta_2 = 1.0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.optimizer.schedule_decay = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths() {
        let config = TrainingConfig {
            data_dir: PathBuf::from("data"),
            ..Default::default()
        };
        assert_eq!(config.bundle_path("train.npz"), PathBuf::from("data/train.npz"));
        assert_eq!(config.config_path(), PathBuf::from("language.json"));
    }

    #[test]
    fn test_save_load_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.json");

        let mut config = TrainingConfig::debug();
        config.seed = 7;
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.epochs, 1);
        assert_eq!(loaded.model.num_classes, 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{ "epochs": 5 }"#).unwrap();
        assert_eq!(config.epochs, 5);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.output, PathBuf::from("language"));

        let config: TrainingConfig =
            serde_json::from_str(r#"{ "optimizer": { "beta_1": 0.8 } }"#).unwrap();
        assert_eq!(config.optimizer.beta_1, 0.8);
        assert_eq!(config.optimizer.schedule_decay, 0.004);
    }
}
