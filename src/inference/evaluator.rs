//! Split evaluation: predictions against one-hot truth, summarized as a
//! per-class precision / recall / F1 report.

use burn::tensor::backend::Backend;
use colored::Colorize;
use tracing::info;

use super::predictor::Predictor;
use crate::dataset::{LabelBinarizer, LanguageBurnDataset};
use crate::utils::error::Result;
use crate::utils::metrics::ClassificationReport;

/// Predict every sample of `dataset` and compare with its labels
pub fn evaluate_split<B: Backend>(
    predictor: &Predictor<B>,
    dataset: &LanguageBurnDataset,
    binarizer: &LabelBinarizer,
) -> Result<ClassificationReport> {
    let actual = predictor.predict_classes(dataset)?;
    let expected = dataset.labels();

    let report = ClassificationReport::from_predictions(&expected, &actual, binarizer.classes());
    info!(
        "[{}] accuracy {:.4} over {} samples",
        dataset.split().name,
        report.accuracy,
        report.total_support()
    );
    Ok(report)
}

/// Print a report under a markdown-style heading, followed by its confusion matrix
pub fn print_report(heading: &str, report: &ClassificationReport) {
    println!();
    println!("{}", format!("## {}", heading).cyan().bold());
    println!("{}", report);
    println!("{}", confusion_table(report));
}

fn confusion_table(report: &ClassificationReport) -> String {
    let names: Vec<String> = report.per_class.iter().map(|c| c.class_name.clone()).collect();
    report.confusion_matrix.display(&names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Augmentation, LoadedSplit, SampleMetadata, LANGUAGES};
    use crate::model::LanguageClassifierConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_support_sums_to_sample_count() {
        let binarizer = LabelBinarizer::fit(&LANGUAGES);
        let langs = ["en", "de", "es", "en", "en"];
        let metadata = langs
            .iter()
            .map(|l| SampleMetadata {
                columns: vec![l.to_string(), "s".into(), "f_fragment0".into()],
                language: l.to_string(),
                filename: "f_fragment0".into(),
                augmentation: Augmentation::Original,
            })
            .collect();
        let split = LoadedSplit {
            name: "valid.npz".into(),
            labels: binarizer.transform(&langs).unwrap(),
            features: vec![0.25; langs.len() * 16],
            metadata,
            image_size: 4,
        };
        let dataset = LanguageBurnDataset::new(split);

        let device = Default::default();
        let model = LanguageClassifierConfig::new()
            .with_input_size(4)
            .init::<TestBackend>(&device);
        let predictor = Predictor::new(model, device);

        let report = evaluate_split(&predictor, &dataset, &binarizer).unwrap();

        assert_eq!(report.total_support(), 5);
        assert_eq!(report.per_class.len(), 3);
        // de, en, es in binarizer column order
        let supports: Vec<usize> = report.per_class.iter().map(|c| c.support).collect();
        assert_eq!(supports, vec![1, 3, 1]);

        let table = confusion_table(&report);
        assert!(table.starts_with("Confusion matrix"));
        assert_eq!(table.lines().count(), 5);
        assert!(table.lines().nth(2).unwrap().trim_start().starts_with("de"));
    }
}
