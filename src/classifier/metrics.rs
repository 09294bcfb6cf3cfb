//! Confusion-matrix metrics for held-out evaluation

use crate::core::{BinaryClassifier, Label, Result, Sample};
use serde::{Deserialize, Serialize};

/// Detailed evaluation metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl EvaluationMetrics {
    pub fn new(tp: usize, tn: usize, fp: usize, fn_: usize) -> Self {
        Self {
            true_positives: tp,
            true_negatives: tn,
            false_positives: fp,
            false_negatives: fn_,
        }
    }

    /// Tally predictions of `model` against the labels of `samples`
    pub fn evaluate<M: BinaryClassifier + ?Sized>(model: &M, samples: &[Sample]) -> Result<Self> {
        let mut metrics = Self::default();
        for sample in samples {
            let predicted = model.predict_label(&sample.features)?;
            metrics.record(predicted, sample.label);
        }
        Ok(metrics)
    }

    pub fn record(&mut self, predicted: Label, actual: Label) {
        match (predicted, actual) {
            (Label::Positive, Label::Positive) => self.true_positives += 1,
            (Label::Negative, Label::Negative) => self.true_negatives += 1,
            (Label::Positive, Label::Negative) => self.false_positives += 1,
            (Label::Negative, Label::Positive) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }

    /// Calculate accuracy: (TP + TN) / (TP + TN + FP + FN)
    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// Calculate precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// Calculate recall (sensitivity): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Calculate F1 score: 2 * (precision * recall) / (precision + recall)
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * (p * r) / (p + r)
        }
    }

    /// Calculate specificity: TN / (TN + FP)
    pub fn specificity(&self) -> f64 {
        ratio(self.true_negatives, self.true_negatives + self.false_positives)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_metrics_from_counts() {
        let m = EvaluationMetrics::new(8, 5, 2, 1);
        assert_eq!(m.total(), 16);
        assert_abs_diff_eq!(m.accuracy(), 13.0 / 16.0);
        assert_abs_diff_eq!(m.precision(), 0.8);
        assert_abs_diff_eq!(m.recall(), 8.0 / 9.0);
        assert_abs_diff_eq!(m.specificity(), 5.0 / 7.0);
        assert_abs_diff_eq!(m.f1_score(), 2.0 * 0.8 * (8.0 / 9.0) / (0.8 + 8.0 / 9.0));
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let m = EvaluationMetrics::default();
        assert_eq!(m.accuracy(), 0.0);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.f1_score(), 0.0);
    }

    #[test]
    fn test_record() {
        let mut m = EvaluationMetrics::default();
        m.record(Label::Positive, Label::Negative);
        m.record(Label::Negative, Label::Positive);
        m.record(Label::Positive, Label::Positive);
        assert_eq!(m, EvaluationMetrics::new(1, 0, 1, 1));
    }
}
