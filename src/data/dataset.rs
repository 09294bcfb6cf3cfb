//! In-memory labeled dataset encoded through a feature schema

use crate::core::{ClassifierError, Dataset, Label, Result, Sample};
use crate::schema::{FeatureSchema, RawRecord};

/// Ordered sequence of encoded samples plus the feature names they follow
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    feature_names: Vec<String>,
    samples: Vec<Sample>,
}

impl LabeledDataset {
    /// Create a dataset, checking every sample matches the feature count
    pub fn new(feature_names: Vec<String>, samples: Vec<Sample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(ClassifierError::EmptyDataset);
        }
        let dim = feature_names.len();
        if let Some(bad) = samples.iter().find(|s| s.features.len() != dim) {
            return Err(ClassifierError::DimensionMismatch {
                expected: dim,
                actual: bad.features.len(),
            });
        }
        Ok(Self {
            feature_names,
            samples,
        })
    }

    /// Encode raw rows whose label is given as the schema's literal class name
    pub fn from_records(schema: &FeatureSchema, rows: &[(RawRecord, String)]) -> Result<Self> {
        let mut samples = Vec::with_capacity(rows.len());
        for (i, (record, raw_label)) in rows.iter().enumerate() {
            let features = schema
                .encode_record(record)
                .map_err(|e| ClassifierError::Dataset(format!("row {}: {e}", i + 1)))?;
            let label = schema.label().encode(raw_label).ok_or_else(|| {
                ClassifierError::Dataset(format!(
                    "row {}: label {raw_label:?} is neither {:?} nor {:?}",
                    i + 1,
                    schema.label().negative,
                    schema.label().positive
                ))
            })?;
            samples.push(Sample::new(features.into_inner(), label));
        }
        Self::new(schema.field_names(), samples)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples per class, `[negative, positive]`
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0usize; 2];
        for sample in &self.samples {
            counts[sample.label.index()] += 1;
        }
        counts
    }
}

impl Dataset for LabeledDataset {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn dim(&self) -> usize {
        self.feature_names.len()
    }

    fn get_sample(&self, i: usize) -> &Sample {
        &self.samples[i]
    }

    fn get_labels(&self) -> Vec<Label> {
        self.samples.iter().map(|s| s.label).collect()
    }
}
