//! Inference module for prediction and evaluation
//!
//! This module provides:
//! - Batched probability prediction over a dataset
//! - Loading a saved model for prediction
//! - Per-split classification reports

pub mod evaluator;
pub mod predictor;

// Re-export main types for convenience
pub use evaluator::{evaluate_split, print_report};
pub use predictor::{Predictor, DEFAULT_BATCH_SIZE};
