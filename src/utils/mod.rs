//! Utility functions shared by the classifiers

use crate::core::{ClassifierError, Label, Result, Sample};

/// Feature scaling utilities
pub mod scaling {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Per-feature z-score standardization fitted on training data.
    ///
    /// Constant features keep a unit scale so they map to 0.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct FeatureScaler {
        pub means: Vec<f64>,
        pub scales: Vec<f64>,
    }

    impl FeatureScaler {
        /// Compute means and standard deviations column by column
        pub fn fit(samples: &[Sample]) -> Result<Self> {
            let first = samples.first().ok_or(ClassifierError::EmptyDataset)?;
            let dim = first.features.len();
            let n = samples.len() as f64;

            let mut means = vec![0.0; dim];
            for sample in samples {
                if sample.features.len() != dim {
                    return Err(ClassifierError::DimensionMismatch {
                        expected: dim,
                        actual: sample.features.len(),
                    });
                }
                for (m, &x) in means.iter_mut().zip(&sample.features) {
                    *m += x;
                }
            }
            means.iter_mut().for_each(|m| *m /= n);

            let mut variances = vec![0.0; dim];
            for sample in samples {
                for ((v, &x), &m) in variances.iter_mut().zip(&sample.features).zip(&means) {
                    *v += (x - m).powi(2);
                }
            }

            let scales = variances
                .into_iter()
                .map(|v| {
                    let std = (v / n).sqrt();
                    if std < 1e-12 {
                        1.0
                    } else {
                        std
                    }
                })
                .collect();

            Ok(Self { means, scales })
        }

        pub fn dim(&self) -> usize {
            self.means.len()
        }

        /// Scale one feature vector
        pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>> {
            if features.len() != self.dim() {
                return Err(ClassifierError::DimensionMismatch {
                    expected: self.dim(),
                    actual: features.len(),
                });
            }
            Ok(features
                .iter()
                .zip(self.means.iter().zip(&self.scales))
                .map(|(&x, (&m, &s))| (x - m) / s)
                .collect())
        }
    }
}

/// Validation and preprocessing utilities
pub mod validation {
    use super::*;

    /// Count samples per class, returning (negative, positive, positive ratio)
    pub fn check_label_balance(samples: &[Sample]) -> (usize, usize, f64) {
        let positive = samples
            .iter()
            .filter(|s| s.label == Label::Positive)
            .count();
        let negative = samples.len() - positive;
        let ratio = if samples.is_empty() {
            0.0
        } else {
            positive as f64 / samples.len() as f64
        };
        (negative, positive, ratio)
    }

    /// Require a non-empty, rectangular training set
    pub fn validate_training_set(samples: &[Sample]) -> Result<usize> {
        let first = samples.first().ok_or(ClassifierError::EmptyDataset)?;
        let dim = first.features.len();
        if dim == 0 {
            return Err(ClassifierError::Dataset(
                "samples have no features".to_string(),
            ));
        }
        if let Some(bad) = samples.iter().find(|s| s.features.len() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                actual: bad.features.len(),
            });
        }
        if let Some(bad) = samples.iter().find(|s| s.features.iter().any(|x| !x.is_finite())) {
            return Err(ClassifierError::Dataset(format!(
                "non-finite feature value in {:?}",
                bad.features
            )));
        }
        Ok(dim)
    }

    /// Check a prediction input against the trained dimensionality
    pub fn check_dimension(features: &[f64], expected: usize) -> Result<()> {
        if features.len() != expected {
            return Err(ClassifierError::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }
        Ok(())
    }
}
