//! Metrics Module for Model Evaluation
//!
//! Provides the evaluation metrics the pipeline reports:
//! - Confusion matrix
//! - Per-class precision, recall, F1-score and support
//! - A classification report rendered in the familiar tabular layout

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// Class name
    pub class_name: String,

    /// True positives
    pub true_positives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    ///
    /// Ill-defined ratios (zero denominators) are reported as 0.0.
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize, class_name: &str) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another one
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another one
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, support);

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            class_idx,
            class_name: class_name.to_string(),
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support,
        }
    }

    /// True when no sample was predicted as this class
    pub fn precision_ill_defined(&self) -> bool {
        self.true_positives + self.false_positives == 0
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), row-major
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(expected: &[usize], actual: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);

        for (&truth, &pred) in expected.iter().zip(actual.iter()) {
            cm.add(truth, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth < self.num_classes && predicted < self.num_classes {
            self.matrix[truth * self.num_classes + predicted] += 1;
        }
    }

    /// Get the count at (truth, predicted)
    pub fn get(&self, truth: usize, predicted: usize) -> usize {
        if truth < self.num_classes && predicted < self.num_classes {
            self.matrix[truth * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Render the matrix with class names as row/column headers
    pub fn display(&self, class_names: &[String]) -> String {
        let mut output = String::from("Confusion matrix (rows=expected, cols=predicted):\n");

        output.push_str("        ");
        for col in 0..self.num_classes {
            let name = class_names.get(col).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("{:>7}", name));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            let name = class_names.get(row).map(String::as_str).unwrap_or("?");
            output.push_str(&format!("{:>7} ", name));
            for col in 0..self.num_classes {
                output.push_str(&format!("{:>7}", self.get(row, col)));
            }
            output.push('\n');
        }

        output
    }
}

/// Aggregated row of a classification report (macro or weighted average)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1/support report for one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub confusion_matrix: ConfusionMatrix,
}

impl ClassificationReport {
    /// Build a report from expected and predicted class indices
    ///
    /// # Panics
    /// Panics if `expected` and `actual` differ in length.
    pub fn from_predictions(expected: &[usize], actual: &[usize], target_names: &[String]) -> Self {
        assert_eq!(
            expected.len(),
            actual.len(),
            "expected and predicted labels must have the same length"
        );

        let num_classes = target_names.len();
        let confusion_matrix = ConfusionMatrix::from_predictions(expected, actual, num_classes);

        let per_class: Vec<ClassMetrics> = target_names
            .iter()
            .enumerate()
            .map(|(idx, name)| ClassMetrics::from_confusion_matrix(&confusion_matrix, idx, name))
            .collect();

        for class in per_class.iter().filter(|c| c.precision_ill_defined() && c.support > 0) {
            warn!(
                "Precision is ill-defined for class '{}' (no predicted samples), reporting 0.0",
                class.class_name
            );
        }

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let n = num_classes.max(1) as f64;

        let macro_avg = AverageMetrics {
            precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
            recall: per_class.iter().map(|m| m.recall).sum::<f64>() / n,
            f1: per_class.iter().map(|m| m.f1).sum::<f64>() / n,
            support: total_support,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if total_support == 0 {
                return 0.0;
            }
            per_class.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total_support as f64
        };

        let weighted_avg = AverageMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total_support,
        };

        Self {
            accuracy: confusion_matrix.accuracy(),
            per_class,
            macro_avg,
            weighted_avg,
            confusion_matrix,
        }
    }

    /// Sum of per-class supports; equals the number of evaluated samples
    pub fn total_support(&self) -> usize {
        self.per_class.iter().map(|m| m.support).sum()
    }

    /// Render the report as a text table
    pub fn display(&self) -> String {
        let width = self
            .per_class
            .iter()
            .map(|m| m.class_name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        let mut output = String::new();
        output.push_str(&format!(
            "{:>width$} {:>9} {:>9} {:>9} {:>9}\n\n",
            "", "precision", "recall", "f1-score", "support",
            width = width
        ));

        for m in &self.per_class {
            output.push_str(&format!(
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                m.class_name, m.precision, m.recall, m.f1, m.support,
                width = width
            ));
        }
        output.push('\n');

        output.push_str(&format!(
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}\n",
            "accuracy", "", "", self.accuracy, self.total_support(),
            width = width
        ));
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            output.push_str(&format!(
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}\n",
                name, avg.precision, avg.recall, avg.f1, avg.support,
                width = width
            ));
        }

        output
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Running average for tracking loss and accuracy during an epoch
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` weighted by `weight` samples
    pub fn update(&mut self, value: f64, weight: usize) {
        self.sum += value * weight as f64;
        self.count += weight;
    }

    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["de".to_string(), "en".to_string(), "es".to_string()]
    }

    #[test]
    fn test_confusion_matrix() {
        let expected = vec![0, 0, 1, 1, 2, 2];
        let actual = vec![0, 1, 1, 1, 2, 0];

        let cm = ConfusionMatrix::from_predictions(&expected, &actual, 3);

        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(0, 1), 1);
        assert_eq!(cm.get(1, 1), 2);
        assert_eq!(cm.get(2, 0), 1);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.correct(), 4);
    }

    #[test]
    fn test_class_metrics() {
        // Class 0: TP=1, FP=1 (from class 2), FN=1 (predicted as 1)
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 2, 2], &[0, 1, 1, 1, 2, 0], 3);
        let m = ClassMetrics::from_confusion_matrix(&cm, 0, "de");

        assert_eq!(m.true_positives, 1);
        assert_eq!(m.false_positives, 1);
        assert_eq!(m.false_negatives, 1);
        assert_eq!(m.support, 2);
        assert!((m.precision - 0.5).abs() < 1e-9);
        assert!((m.recall - 0.5).abs() < 1e-9);
        assert!((m.f1 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_report_support_sums_to_sample_count() {
        let expected = vec![0, 1, 2, 2, 1, 0, 0];
        let actual = vec![0, 1, 1, 2, 0, 0, 2];
        let report = ClassificationReport::from_predictions(&expected, &actual, &names());

        assert_eq!(report.total_support(), expected.len());
        assert_eq!(report.macro_avg.support, expected.len());
        assert!((report.accuracy - 4.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_never_predicted_class_has_zero_precision() {
        // Nothing is ever predicted as "es"
        let report = ClassificationReport::from_predictions(&[0, 1, 2], &[0, 1, 1], &names());

        let es = &report.per_class[2];
        assert_eq!(es.precision, 0.0);
        assert_eq!(es.recall, 0.0);
        assert_eq!(es.f1, 0.0);
        assert_eq!(es.support, 1);
    }

    #[test]
    fn test_report_perfect_predictions() {
        let labels = vec![0, 1, 2, 1];
        let report = ClassificationReport::from_predictions(&labels, &labels, &names());

        assert_eq!(report.accuracy, 1.0);
        assert!((report.macro_avg.f1 - 1.0).abs() < 1e-9);
        assert!((report.weighted_avg.precision - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_display_layout() {
        let report = ClassificationReport::from_predictions(&[0, 1, 2], &[0, 1, 2], &names());
        let text = report.display();

        assert!(text.contains("precision"));
        assert!(text.contains("f1-score"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("weighted avg"));
        assert!(text.lines().any(|l| l.trim_start().starts_with("en")));
    }

    #[test]
    fn test_running_average_weights_by_batch_size() {
        let mut avg = RunningAverage::new();
        avg.update(1.0, 3);
        avg.update(0.0, 1);
        assert!((avg.average() - 0.75).abs() < 1e-9);
        assert_eq!(avg.count(), 4);
    }
}
