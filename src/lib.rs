//! # langid
//!
//! Spoken language classification from spectrogram images using the Burn framework.
//!
//! A small convolutional network is trained to tell English, German and Spanish
//! speech apart from 192x192 grayscale spectrograms shipped as NumPy `.npz` bundles.
//!
//! ## Modules
//!
//! - `dataset`: Bundle reading, label binarization, normalization and Burn batching
//! - `model`: The CNN architecture and its configuration
//! - `training`: Nadam optimizer and the training loop
//! - `inference`: Batched prediction and classification reports
//! - `utils`: Logging, metrics, and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use langid::dataset::{load_bundle, LabelBinarizer, LANGUAGES};
//!
//! let binarizer = LabelBinarizer::fit(&LANGUAGES);
//! let train = load_bundle(&binarizer, "train.npz", false)?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    load_bundle, Augmentation, LabelBinarizer, LanguageBatch, LanguageBatcher,
    LanguageBurnDataset, LanguageItem, LoadedSplit, SampleMetadata,
};
pub use inference::{evaluate_split, Predictor};
pub use model::cnn::{LanguageClassifier, LanguageClassifierConfig};
pub use training::{run_training, NadamConfig, TrainingConfig, TrainingHistory};
pub use utils::error::{LangIdError, Result};
pub use utils::metrics::{ClassificationReport, ConfusionMatrix};

/// Number of language classes
pub const NUM_CLASSES: usize = 3;

/// Spectrogram images are square, 192 pixels a side
pub const IMAGE_SIZE: usize = 192;

/// Spectrograms are single-channel
pub const IMAGE_CHANNELS: usize = 1;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
