//! Error Handling Module
//!
//! Defines the error type for the langid library.
//! Every failure in the pipeline is fatal: errors propagate to `main`
//! and terminate the run.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for langid operations
#[derive(Error, Debug)]
pub enum LangIdError {
    /// Bundle file is missing on disk
    #[error("Bundle not found: {0}")]
    BundleNotFound(PathBuf),

    /// The zip container of a bundle could not be read
    #[error("Failed to read archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// A required array is not present in the bundle
    #[error("Array '{array}' missing from bundle '{path}'")]
    MissingArray { path: PathBuf, array: String },

    /// The `.npy` payload could not be decoded
    #[error("Malformed array '{array}': {reason}")]
    MalformedArray { array: String, reason: String },

    /// The `.npy` dtype is not one we can decode
    #[error("Unsupported dtype '{descr}' for array '{array}'")]
    UnsupportedDtype { array: String, descr: String },

    /// A label outside the fitted vocabulary
    #[error("Unknown label '{label}' (known classes: {known:?})")]
    UnknownLabel { label: String, known: Vec<String> },

    /// Parallel arrays disagree on sample count
    #[error("Sample count mismatch in '{split}': metadata={metadata}, labels={labels}, features={features}")]
    CountMismatch {
        split: String,
        metadata: usize,
        labels: usize,
        features: usize,
    },

    /// Array shape does not match what the pipeline expects
    #[error("Shape error: {0}")]
    Shape(String),

    /// A bundle holds no samples (possibly after filtering)
    #[error("Bundle '{0}' contains no samples")]
    EmptyBundle(PathBuf),

    /// Diagnostic image could not be written
    #[error("Failed to write image '{path}': {reason}")]
    ImageWrite { path: PathBuf, reason: String },

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LangIdError {
    fn from(err: serde_json::Error) -> Self {
        LangIdError::Serialization(err.to_string())
    }
}

/// Convenience Result type for langid operations
pub type Result<T> = std::result::Result<T, LangIdError>;
