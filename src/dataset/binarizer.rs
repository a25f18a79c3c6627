//! One-hot label encoding over a fixed vocabulary

use serde::{Deserialize, Serialize};

use crate::utils::argmax;
use crate::utils::error::{LangIdError, Result};

/// Maps class labels to one-hot vectors and back
///
/// Classes are kept sorted, so fitting `["en", "de", "es"]` yields the
/// column order `["de", "en", "es"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBinarizer {
    classes: Vec<String>,
}

impl LabelBinarizer {
    /// Fit the encoder on a label vocabulary (duplicates are ignored)
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    /// Sorted class names; column `i` of a one-hot row is `classes()[i]`
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Column index of a label
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| LangIdError::UnknownLabel {
                label: label.to_string(),
                known: self.classes.clone(),
            })
    }

    /// Encode one label
    pub fn encode(&self, label: &str) -> Result<Vec<f32>> {
        let idx = self.index_of(label)?;
        let mut row = vec![0.0; self.num_classes()];
        row[idx] = 1.0;
        Ok(row)
    }

    /// Encode a sequence of labels; the first unknown label fails the whole call
    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<Vec<f32>>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// Decode rows back to labels through their arg-max column
    pub fn inverse_transform(&self, rows: &[Vec<f32>]) -> Vec<String> {
        rows.iter()
            .map(|row| self.classes[argmax(row).min(self.classes.len().saturating_sub(1))].clone())
            .collect()
    }
}
