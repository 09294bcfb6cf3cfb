//! Core traits for datasets and classifiers

use crate::core::{ClassifierError, Label, Result, Sample, TrainingControl};

/// Dataset abstraction for labeled tabular data
pub trait Dataset: Send + Sync {
    /// Number of samples in the dataset
    fn len(&self) -> usize;

    /// Number of features (dimensionality)
    fn dim(&self) -> usize;

    /// Get a single sample by index
    ///
    /// # Panics
    /// Panics if index >= len()
    fn get_sample(&self, i: usize) -> &Sample;

    /// Clone the samples at the given indices, in order
    fn get_batch(&self, indices: &[usize]) -> Vec<Sample> {
        indices.iter().map(|&i| self.get_sample(i).clone()).collect()
    }

    /// Get all labels as a vector
    fn get_labels(&self) -> Vec<Label>;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capability set shared by every classifier variant
///
/// Feature importance is optional: callers must check
/// [`supports_feature_importance`](BinaryClassifier::supports_feature_importance)
/// before asking for it.
pub trait BinaryClassifier: Send + Sync {
    /// Train on the given samples, replacing any previous state
    fn fit(&mut self, samples: &[Sample], control: &TrainingControl) -> Result<()>;

    /// Whether `fit` has completed successfully
    fn is_fitted(&self) -> bool;

    /// Class probabilities `[p0, p1]`
    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]>;

    /// Predicted class label
    fn predict_label(&self, features: &[f64]) -> Result<Label>;

    fn supports_feature_importance(&self) -> bool {
        false
    }

    /// Per-feature importances in training feature order
    fn feature_importance(&self) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(ClassifierError::UntrainedModel);
        }
        Err(ClassifierError::UnsupportedCapability("feature importance"))
    }
}
