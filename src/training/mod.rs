//! Training module for the language classifier
//!
//! This module provides:
//! - The Nadam optimizer
//! - Categorical cross-entropy loss
//! - The epoch loop with per-epoch validation
//! - Model persistence after training

pub mod optim;
pub mod trainer;

// Re-export main types for convenience
pub use optim::{Nadam, NadamConfig};
pub use trainer::{
    categorical_cross_entropy, evaluate_loss, run_training, EpochMetrics, Trainer,
    TrainingHistory,
};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
