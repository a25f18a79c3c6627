//! Dataset module for the language spectrogram bundles
//!
//! This module provides:
//! - `.npz`/`.npy` decoding
//! - Label binarization over the language vocabulary
//! - Bundle loading with optional removal of augmented samples
//! - Burn Dataset and Batcher implementations

pub mod binarizer;
pub mod burn_dataset;
pub mod loader;
pub mod npz;

pub use binarizer::LabelBinarizer;
pub use burn_dataset::{LanguageBatch, LanguageBatcher, LanguageBurnDataset, LanguageItem};
pub use loader::{
    load_bundle, load_bundle_with, Augmentation, AugmentationDetector, LoadOptions, LoadedSplit,
    SampleMetadata,
};

/// Language vocabulary the binarizer is fitted on
pub const LANGUAGES: [&str; 3] = ["en", "de", "es"];

/// Bundle file names inside the data directory
pub const TRAIN_BUNDLE: &str = "train.npz";
pub const VALID_BUNDLE: &str = "valid.npz";
pub const TEST_BUNDLE: &str = "test.npz";
