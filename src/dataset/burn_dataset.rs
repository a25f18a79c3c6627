//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait over an in-memory split and a `Batcher`
//! that stacks spectrograms into `[N, 1, H, W]` tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::loader::LoadedSplit;
use crate::utils::argmax;
use crate::IMAGE_CHANNELS;

/// A single spectrogram ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LanguageItem {
    /// Normalized pixels, row-major `[H * W]`
    pub image: Vec<f32>,
    /// One-hot label row
    pub one_hot: Vec<f32>,
    /// Class index (arg-max of `one_hot`)
    pub label: usize,
}

/// Burn view over a [`LoadedSplit`]
#[derive(Debug, Clone)]
pub struct LanguageBurnDataset {
    split: LoadedSplit,
}

impl LanguageBurnDataset {
    pub fn new(split: LoadedSplit) -> Self {
        Self { split }
    }

    pub fn split(&self) -> &LoadedSplit {
        &self.split
    }

    pub fn image_size(&self) -> usize {
        self.split.image_size
    }

    /// Class index of every sample, in order
    pub fn labels(&self) -> Vec<usize> {
        self.split.class_indices()
    }
}

impl Dataset<LanguageItem> for LanguageBurnDataset {
    fn get(&self, index: usize) -> Option<LanguageItem> {
        let image = self.split.image(index)?.to_vec();
        let one_hot = self.split.labels.get(index)?.clone();
        let label = argmax(&one_hot);
        Some(LanguageItem {
            image,
            one_hot,
            label,
        })
    }

    fn len(&self) -> usize {
        self.split.len()
    }
}

/// A batch of spectrograms
#[derive(Clone, Debug)]
pub struct LanguageBatch<B: Backend> {
    /// Images with shape `[batch_size, 1, height, width]`
    pub images: Tensor<B, 4>,
    /// One-hot labels with shape `[batch_size, num_classes]`
    pub one_hot: Tensor<B, 2>,
    /// Class indices with shape `[batch_size]`
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for spectrogram batches
#[derive(Clone, Debug)]
pub struct LanguageBatcher {
    image_size: usize,
}

impl LanguageBatcher {
    /// Batcher for square images of side `image_size`
    pub fn with_image_size(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, LanguageItem, LanguageBatch<B>> for LanguageBatcher {
    fn batch(&self, items: Vec<LanguageItem>, device: &B::Device) -> LanguageBatch<B> {
        let batch_size = items.len();
        let num_classes = items.first().map(|i| i.one_hot.len()).unwrap_or(0);

        let images_data: Vec<f32> = items.iter().flat_map(|i| i.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(
                images_data,
                [batch_size, IMAGE_CHANNELS, self.image_size, self.image_size],
            ),
            device,
        );

        let one_hot_data: Vec<f32> = items
            .iter()
            .flat_map(|i| i.one_hot.iter().copied())
            .collect();
        let one_hot = Tensor::<B, 2>::from_floats(
            TensorData::new(one_hot_data, [batch_size, num_classes]),
            device,
        );

        let targets_data: Vec<i64> = items.iter().map(|i| i.label as i64).collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LanguageBatch {
            images,
            one_hot,
            targets,
        }
    }
}
