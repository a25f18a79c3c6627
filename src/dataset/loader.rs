//! Bundle Loader
//!
//! Reads one dataset split (`train.npz`, `valid.npz`, `test.npz`) into memory:
//! metadata rows, one-hot labels and normalized spectrogram pixels.

use std::path::{Path, PathBuf};

use image::GrayImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::binarizer::LabelBinarizer;
use super::npz::NpzArchive;
use crate::utils::error::{LangIdError, Result};
use crate::utils::format_shape;
use crate::IMAGE_SIZE;

/// Metadata column holding the language label
pub const LANGUAGE_COLUMN: usize = 0;

/// Metadata column holding the source filename
pub const FILENAME_COLUMN: usize = 2;

/// Whether a sample is an original fragment or a synthetic variant of one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Augmentation {
    Original,
    Augmented,
}

/// Classifies sample filenames by the dataset's naming convention
///
/// Original samples end in a fragment index (`..._fragment12`) and carry no
/// augmentation marker (`aug`, `augmented`) as a delimited token.
#[derive(Debug, Clone)]
pub struct AugmentationDetector {
    fragment: Regex,
    marker: Regex,
}

impl AugmentationDetector {
    pub fn new() -> Result<Self> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|e| LangIdError::Config(format!("bad pattern: {}", e)))
        };
        Ok(Self {
            fragment: build(r"^.+fragment\d+$")?,
            marker: build(r"(?i)(^|[_.\-])aug(mented)?([_.\-]|\d|$)")?,
        })
    }

    pub fn classify(&self, filename: &str) -> Augmentation {
        if self.fragment.is_match(filename) && !self.marker.is_match(filename) {
            Augmentation::Original
        } else {
            Augmentation::Augmented
        }
    }
}

/// One metadata row of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    /// All string columns of the row, as stored
    pub columns: Vec<String>,
    /// Language label (column 0)
    pub language: String,
    /// Source filename (column 2)
    pub filename: String,
    /// Derived once from `filename` when the bundle is read
    pub augmentation: Augmentation,
}

impl SampleMetadata {
    pub fn from_columns(columns: Vec<String>, detector: &AugmentationDetector) -> Result<Self> {
        if columns.len() <= FILENAME_COLUMN {
            return Err(LangIdError::Shape(format!(
                "metadata rows need at least {} columns, got {}",
                FILENAME_COLUMN + 1,
                columns.len()
            )));
        }
        let language = columns[LANGUAGE_COLUMN].clone();
        let filename = columns[FILENAME_COLUMN].clone();
        let augmentation = detector.classify(&filename);
        Ok(Self {
            columns,
            language,
            filename,
            augmentation,
        })
    }

    pub fn is_augmented(&self) -> bool {
        self.augmentation == Augmentation::Augmented
    }
}

/// Options for reading a bundle
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Keep only original (non-augmented) samples
    pub skip_augmentation: bool,
    /// Side length of the square images
    pub image_size: usize,
    /// Write the first image next to the bundle as `<bundle>.png`
    pub write_preview: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            skip_augmentation: false,
            image_size: IMAGE_SIZE,
            write_preview: true,
        }
    }
}

/// A dataset split held in memory
#[derive(Debug, Clone)]
pub struct LoadedSplit {
    /// File name of the bundle, used in logs
    pub name: String,
    /// One-hot label rows
    pub labels: Vec<Vec<f32>>,
    /// Normalized pixels, `image_size * image_size` values per sample, row-major
    pub features: Vec<f32>,
    /// Metadata rows, parallel to `labels`
    pub metadata: Vec<SampleMetadata>,
    /// Side length of each image
    pub image_size: usize,
}

impl LoadedSplit {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Values per image
    pub fn pixels_per_image(&self) -> usize {
        self.image_size * self.image_size
    }

    /// Normalized pixels of sample `index`
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let n = self.pixels_per_image();
        self.features.get(index * n..(index + 1) * n)
    }

    /// Number of images stored in `features`
    pub fn feature_count(&self) -> usize {
        self.features.len() / self.pixels_per_image().max(1)
    }

    /// Logical feature shape `(N, H, W, 1)`
    pub fn feature_shape(&self) -> [usize; 4] {
        [self.feature_count(), self.image_size, self.image_size, 1]
    }

    /// Class index of each sample (arg-max of its one-hot row)
    pub fn class_indices(&self) -> Vec<usize> {
        self.labels.iter().map(|row| crate::utils::argmax(row)).collect()
    }

    /// Smallest and largest normalized pixel value
    pub fn value_range(&self) -> (f32, f32) {
        self.features
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Samples per class, in binarizer column order
    pub fn class_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; num_classes];
        for idx in self.class_indices() {
            if idx < num_classes {
                counts[idx] += 1;
            }
        }
        counts
    }

    /// Fail unless metadata, labels and features describe the same samples
    pub fn check_parity(&self) -> Result<()> {
        let features = self.feature_count();
        if self.metadata.len() != self.labels.len()
            || self.metadata.len() != features
            || self.features.len() != features * self.pixels_per_image()
        {
            return Err(LangIdError::CountMismatch {
                split: self.name.clone(),
                metadata: self.metadata.len(),
                labels: self.labels.len(),
                features,
            });
        }
        Ok(())
    }
}

/// Load a bundle with default options
///
/// Equivalent to [`load_bundle_with`] with `skip_augmentation` set and every
/// other option at its default.
pub fn load_bundle<P: AsRef<Path>>(
    binarizer: &LabelBinarizer,
    path: P,
    skip_augmentation: bool,
) -> Result<LoadedSplit> {
    let options = LoadOptions {
        skip_augmentation,
        ..Default::default()
    };
    load_bundle_with(binarizer, path, &options)
}

/// Read, filter, encode and normalize one bundle
pub fn load_bundle_with<P: AsRef<Path>>(
    binarizer: &LabelBinarizer,
    path: P,
    options: &LoadOptions,
) -> Result<LoadedSplit> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    info!("Loading bundle: {:?}", path);

    let mut archive = NpzArchive::open(path)?;
    let metadata_array = archive.read_array("labels")?;
    let features_array = archive.read_array("features")?;

    if metadata_array.shape.len() != 2 {
        return Err(LangIdError::Shape(format!(
            "'labels' must be 2-D, got shape {:?}",
            metadata_array.shape
        )));
    }
    let columns = metadata_array.shape[1];

    let pixels = options.image_size * options.image_size;
    let row_len: usize = features_array.shape.iter().skip(1).product();
    if features_array.shape.is_empty() || row_len != pixels {
        return Err(LangIdError::Shape(format!(
            "cannot reshape features of shape {:?} to (N, {}, {}, 1)",
            features_array.shape, options.image_size, options.image_size
        )));
    }

    let detector = AugmentationDetector::new()?;
    let mut metadata = metadata_array
        .into_text()?
        .chunks(columns.max(1))
        .map(|row| SampleMetadata::from_columns(row.to_vec(), &detector))
        .collect::<Result<Vec<_>>>()?;
    let mut raw_features = features_array.into_numeric()?;

    if metadata.len() != raw_features.len() / pixels {
        return Err(LangIdError::CountMismatch {
            split: name,
            metadata: metadata.len(),
            labels: metadata.len(),
            features: raw_features.len() / pixels,
        });
    }

    if options.skip_augmentation {
        let mask: Vec<bool> = metadata.iter().map(|m| !m.is_augmented()).collect();
        let before = metadata.len();
        metadata = apply_mask(metadata, &mask);
        raw_features = raw_features
            .chunks(pixels)
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .flat_map(|(img, _)| img.iter().copied())
            .collect();
        info!(
            "[{}] skipped {} augmented samples, {} remain",
            name,
            before - metadata.len(),
            metadata.len()
        );
    }

    let languages: Vec<&str> = metadata.iter().map(|m| m.language.as_str()).collect();
    let labels = binarizer.transform(&languages)?;

    let features: Vec<f32> = raw_features.into_iter().map(|v| v / 255.0).collect();

    let split = LoadedSplit {
        name,
        labels,
        features,
        metadata,
        image_size: options.image_size,
    };

    if split.is_empty() {
        return Err(LangIdError::EmptyBundle(path.to_path_buf()));
    }

    let (min, max) = split.value_range();
    info!(
        "[{}] labels: {}, features: {} (max: {}, min: {})",
        split.name,
        format_shape(&[split.labels.len(), binarizer.num_classes()]),
        format_shape(&split.feature_shape()),
        max,
        min
    );
    let counts: Vec<String> = binarizer
        .classes()
        .iter()
        .zip(split.class_counts(binarizer.num_classes()))
        .map(|(class, n)| format!("{}={}", class, n))
        .collect();
    info!("[{}] samples per class: {}", split.name, counts.join(", "));

    if options.write_preview {
        let preview = preview_path(path);
        write_preview(&split, 0, &preview)?;
        debug!("Wrote preview image {:?}", preview);
    }

    split.check_parity()?;

    Ok(split)
}

/// Keep the elements whose mask entry is true
fn apply_mask<T>(items: Vec<T>, mask: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(mask)
        .filter_map(|(item, &keep)| keep.then_some(item))
        .collect()
}

/// `<bundle path>.png`
pub fn preview_path(bundle: &Path) -> PathBuf {
    let mut os = bundle.as_os_str().to_owned();
    os.push(".png");
    PathBuf::from(os)
}

/// Render one normalized image as an 8-bit grayscale PNG
pub fn write_preview(split: &LoadedSplit, index: usize, path: &Path) -> Result<()> {
    let image_err = |reason: String| LangIdError::ImageWrite {
        path: path.to_path_buf(),
        reason,
    };

    let pixels = split
        .image(index)
        .ok_or_else(|| image_err(format!("sample {} out of range", index)))?;
    let bytes: Vec<u8> = pixels
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    let size = split.image_size as u32;
    let img = GrayImage::from_raw(size, size, bytes)
        .ok_or_else(|| image_err("pixel buffer does not match image size".to_string()))?;
    img.save(path).map_err(|e| image_err(e.to_string()))
}
