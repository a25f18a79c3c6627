//! Inference Predictor Module
//!
//! Runs a trained classifier over a dataset in fixed-size batches and returns
//! one probability distribution per sample.

use std::path::Path;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::Module,
    record::CompactRecorder,
    tensor::{backend::Backend, TensorData},
};
use tracing::debug;

use crate::dataset::{LanguageBatch, LanguageBatcher, LanguageBurnDataset};
use crate::model::{LanguageClassifier, LanguageClassifierConfig};
use crate::utils::argmax;
use crate::utils::error::{LangIdError, Result};

/// Default inference batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Batched prediction with a fitted model
pub struct Predictor<B: Backend> {
    model: LanguageClassifier<B>,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: LanguageClassifier<B>, device: B::Device) -> Self {
        Self {
            model,
            device,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Load a model saved with `CompactRecorder`
    pub fn load(path: &Path, config: &LanguageClassifierConfig, device: B::Device) -> Result<Self> {
        let model = config
            .init::<B>(&device)
            .load_file(path, &CompactRecorder::new(), &device)
            .map_err(|e| LangIdError::Model(format!("Failed to load {:?}: {:?}", path, e)))?;
        Ok(Self::new(model, device))
    }

    /// Class probabilities for every sample, in dataset order
    pub fn predict_proba(&self, dataset: &LanguageBurnDataset) -> Result<Vec<Vec<f32>>> {
        let batcher = LanguageBatcher::with_image_size(dataset.image_size());
        let len = dataset.len();
        let mut out = Vec::with_capacity(len);

        for start in (0..len).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(len);
            let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: LanguageBatch<B> = batcher.batch(items, &self.device);
            let probs = self.model.forward_softmax(batch.images);
            let [_, cols] = probs.dims();
            out.extend(probability_rows(probs.into_data().convert::<f32>(), cols)?);
        }

        debug!("Predicted {} samples", out.len());
        Ok(out)
    }

    /// Arg-max class of every sample
    pub fn predict_classes(&self, dataset: &LanguageBurnDataset) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(dataset)?
            .iter()
            .map(|p| argmax(p))
            .collect())
    }
}

/// Split a `[rows, cols]` probability tensor into one row per sample
fn probability_rows(data: TensorData, cols: usize) -> Result<Vec<Vec<f32>>> {
    let flat = data
        .to_vec::<f32>()
        .map_err(|e| LangIdError::Model(format!("Failed to read predictions: {:?}", e)))?;
    Ok(flat.chunks(cols.max(1)).map(<[f32]>::to_vec).collect())
}
