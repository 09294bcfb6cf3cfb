//! Classifier variants and the trained-model record
//!
//! Both variants implement [`BinaryClassifier`]; [`ClassifierModel`] is the
//! closed set the cache stores and serializes, tagged by algorithm name.

pub mod margin;
pub mod metrics;
pub mod tree;

pub use self::margin::{LinearSvm, MarginParams};
pub use self::metrics::EvaluationMetrics;
pub use self::tree::{Criterion, DecisionTree, TreeNode, TreeParams};

use crate::core::{
    BinaryClassifier, ClassifierError, FeatureContribution, Label, Result, Sample,
    TrainingControl,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Algorithm family of a classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Tree,
    Margin,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Tree => write!(f, "tree"),
            AlgorithmKind::Margin => write!(f, "margin"),
        }
    }
}

impl FromStr for AlgorithmKind {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tree" => Ok(AlgorithmKind::Tree),
            "margin" | "svm" => Ok(AlgorithmKind::Margin),
            other => Err(ClassifierError::InvalidParameter(format!(
                "unknown algorithm '{other}' (expected tree or margin)"
            ))),
        }
    }
}

/// Algorithm choice plus its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum ClassifierConfig {
    Tree(TreeParams),
    Margin(MarginParams),
}

impl ClassifierConfig {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            ClassifierConfig::Tree(_) => AlgorithmKind::Tree,
            ClassifierConfig::Margin(_) => AlgorithmKind::Margin,
        }
    }

    /// Default hyperparameters for an algorithm
    pub fn default_for(kind: AlgorithmKind) -> Self {
        match kind {
            AlgorithmKind::Tree => ClassifierConfig::Tree(TreeParams::default()),
            AlgorithmKind::Margin => ClassifierConfig::Margin(MarginParams::default()),
        }
    }

    /// Untrained classifier for this configuration
    pub fn build(&self) -> ClassifierModel {
        match self {
            ClassifierConfig::Tree(params) => ClassifierModel::Tree(DecisionTree::new(params.clone())),
            ClassifierConfig::Margin(params) => ClassifierModel::Margin(LinearSvm::new(params.clone())),
        }
    }
}

/// Classifier of either family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum ClassifierModel {
    Tree(DecisionTree),
    Margin(LinearSvm),
}

impl ClassifierModel {
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            ClassifierModel::Tree(_) => AlgorithmKind::Tree,
            ClassifierModel::Margin(_) => AlgorithmKind::Margin,
        }
    }

    /// Input width of the fitted classifier
    pub fn n_features(&self) -> Option<usize> {
        match self {
            ClassifierModel::Tree(tree) => tree.n_features(),
            ClassifierModel::Margin(svm) => svm.n_features(),
        }
    }

    pub fn verify(&self) -> Result<()> {
        match self {
            ClassifierModel::Tree(tree) => tree.verify(),
            ClassifierModel::Margin(svm) => svm.verify(),
        }
    }

    fn inner(&self) -> &dyn BinaryClassifier {
        match self {
            ClassifierModel::Tree(tree) => tree,
            ClassifierModel::Margin(svm) => svm,
        }
    }
}

impl BinaryClassifier for ClassifierModel {
    fn fit(&mut self, samples: &[Sample], control: &TrainingControl) -> Result<()> {
        match self {
            ClassifierModel::Tree(tree) => tree.fit(samples, control),
            ClassifierModel::Margin(svm) => svm.fit(samples, control),
        }
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn predict_proba(&self, features: &[f64]) -> Result<[f64; 2]> {
        self.inner().predict_proba(features)
    }

    fn predict_label(&self, features: &[f64]) -> Result<Label> {
        self.inner().predict_label(features)
    }

    fn supports_feature_importance(&self) -> bool {
        self.inner().supports_feature_importance()
    }

    fn feature_importance(&self) -> Result<Vec<f64>> {
        self.inner().feature_importance()
    }
}

/// Provenance and evaluation record stored next to a trained classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub algorithm: AlgorithmKind,
    /// Feature names in the order the classifier expects them
    pub feature_order: Vec<String>,
    pub hyperparameters: ClassifierConfig,
    pub schema_name: String,
    pub schema_version: u32,
    pub cache_key: String,
    pub trained_at: DateTime<Utc>,
    pub n_train: usize,
    pub n_test: usize,
    pub test_metrics: Option<EvaluationMetrics>,
    /// Human-readable description of the training data
    pub data_source: String,
    pub data_version: Option<String>,
}

/// Fitted classifier plus its metadata; the unit the cache shares and persists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub metadata: ModelMetadata,
    pub classifier: ClassifierModel,
}

impl TrainedModel {
    pub fn new(metadata: ModelMetadata, classifier: ClassifierModel) -> Result<Self> {
        if !classifier.is_fitted() {
            return Err(ClassifierError::UntrainedModel);
        }
        Ok(Self {
            metadata,
            classifier,
        })
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.classifier.kind()
    }

    /// Check that the classifier is usable and agrees with its metadata.
    ///
    /// Run on every model read from disk before it is served.
    pub fn verify(&self) -> Result<()> {
        self.classifier.verify()?;

        let kind = self.classifier.kind();
        if self.metadata.algorithm != kind || self.metadata.hyperparameters.kind() != kind {
            return Err(ClassifierError::CorruptModel(format!(
                "metadata describes a {} model, classifier is {kind}",
                self.metadata.algorithm
            )));
        }

        let width = self.classifier.n_features().unwrap_or(0);
        if width != self.metadata.feature_order.len() {
            return Err(ClassifierError::CorruptModel(format!(
                "classifier takes {width} features, metadata lists {}",
                self.metadata.feature_order.len()
            )));
        }
        Ok(())
    }

    /// Importances paired with feature names, sorted ascending.
    ///
    /// `None` when the classifier does not support importance.
    pub fn importance_ranking(&self) -> Result<Option<Vec<FeatureContribution>>> {
        if !self.classifier.supports_feature_importance() {
            return Ok(None);
        }
        let importances = self.classifier.feature_importance()?;
        if importances.len() != self.metadata.feature_order.len() {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.metadata.feature_order.len(),
                actual: importances.len(),
            });
        }

        let mut ranking: Vec<FeatureContribution> = self
            .metadata
            .feature_order
            .iter()
            .zip(importances)
            .map(|(feature, importance)| FeatureContribution {
                feature: feature.clone(),
                importance,
            })
            .collect();
        ranking.sort_by(|a, b| a.importance.total_cmp(&b.importance));
        Ok(Some(ranking))
    }
}
