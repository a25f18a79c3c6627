//! Model module for the CNN using the Burn framework
//!
//! This module provides:
//! - The spectrogram classifier architecture
//! - Run configuration and hyperparameters

pub mod cnn;
pub mod config;

// Re-export main types for convenience
pub use cnn::{LanguageClassifier, LanguageClassifierConfig};
pub use config::{OptimizerSettings, TrainingConfig};

/// File stem the trained model is saved under
pub const DEFAULT_MODEL_STEM: &str = "language";
