//! High-level API for training and inference
//!
//! [`TrainingPipeline`] describes how a model is produced (schema, data,
//! split, algorithm) and doubles as the cache's [`ModelTrainer`].
//! [`InferenceService`] turns raw records into predictions, acquiring the
//! model through a shared [`ModelCache`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use binfer::api::{DatasetSource, InferenceService, TrainingPipeline};
//! use binfer::cache::ModelCache;
//! use binfer::classifier::{AlgorithmKind, ClassifierConfig};
//! use binfer::schema::{FeatureSchema, RawRecord};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(FeatureSchema::diabetes());
//! let pipeline = TrainingPipeline::new(
//!     Arc::clone(&schema),
//!     ClassifierConfig::default_for(AlgorithmKind::Tree),
//!     DatasetSource::DiabetesSample,
//! );
//! let service = InferenceService::with_pipeline(Arc::new(ModelCache::new("models")), pipeline);
//!
//! let mut record = RawRecord::new();
//! record.insert("Glucose".into(), 148.0.into());
//! // ... remaining fields
//! let prediction = service.predict(&record)?;
//! println!("label {} with confidence {:.2}", prediction.label, prediction.confidence);
//! # Ok(())
//! # }
//! ```

use crate::cache::{Acquired, CacheKey, ModelCache, ModelTrainer};
use crate::classifier::{
    AlgorithmKind, ClassifierConfig, ClassifierModel, EvaluationMetrics, ModelMetadata,
    TrainedModel,
};
use crate::core::{
    BinaryClassifier, ClassifierError, Dataset, FeatureContribution, PredictionResult, Result,
    TrainingControl,
};
use crate::data::sample::{diabetes_sample, loan_sample};
use crate::data::{stratified_split, LabeledDataset, LoadOptions, SplitConfig};
use crate::schema::{FeatureSchema, RawRecord};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Where a pipeline reads its labeled rows from
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// CSV file with a header row
    Csv { path: PathBuf, options: LoadOptions },
    /// Built-in loan application table
    LoanSample,
    /// Built-in synthetic diabetes table
    DiabetesSample,
    /// Raw rows supplied by the caller, label given as the class literal
    Records(Arc<Vec<(RawRecord, String)>>),
}

impl DatasetSource {
    /// Built-in table matching a preset schema, if there is one
    pub fn builtin_for(schema: &FeatureSchema) -> Option<Self> {
        if *schema == FeatureSchema::diabetes() {
            Some(DatasetSource::DiabetesSample)
        } else if *schema == FeatureSchema::loan_approval() {
            Some(DatasetSource::LoanSample)
        } else {
            None
        }
    }

    pub fn load(&self, schema: &FeatureSchema) -> Result<LabeledDataset> {
        match self {
            DatasetSource::Csv { path, options } => {
                LabeledDataset::from_csv_file(path, schema, *options)
            }
            DatasetSource::LoanSample => LabeledDataset::from_records(schema, &loan_sample()),
            DatasetSource::DiabetesSample => {
                LabeledDataset::from_records(schema, &diabetes_sample())
            }
            DatasetSource::Records(rows) => LabeledDataset::from_records(schema, rows),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DatasetSource::Csv { path, .. } => format!("csv:{}", path.display()),
            DatasetSource::LoanSample => "builtin:loan".to_string(),
            DatasetSource::DiabetesSample => "builtin:diabetes".to_string(),
            DatasetSource::Records(rows) => format!("records:{}", rows.len()),
        }
    }
}

/// Load -> split -> fit -> evaluate, with builder-style configuration
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    schema: Arc<FeatureSchema>,
    classifier: ClassifierConfig,
    source: DatasetSource,
    split: SplitConfig,
    data_version: Option<String>,
}

impl TrainingPipeline {
    pub fn new(
        schema: Arc<FeatureSchema>,
        classifier: ClassifierConfig,
        source: DatasetSource,
    ) -> Self {
        Self {
            schema,
            classifier,
            source,
            split: SplitConfig::default(),
            data_version: None,
        }
    }

    /// Set test fraction and shuffle seed
    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    /// Tag the training data; a new tag yields a new cache key
    pub fn with_data_version(mut self, version: impl Into<String>) -> Self {
        self.data_version = Some(version.into());
        self
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn classifier(&self) -> &ClassifierConfig {
        &self.classifier
    }

    pub fn source(&self) -> &DatasetSource {
        &self.source
    }

    pub fn split(&self) -> SplitConfig {
        self.split
    }

    /// Train a model outside of any cache
    pub fn run(&self, control: &TrainingControl) -> Result<TrainedModel> {
        let key = self.cache_key()?;
        self.train(&key, control)
    }
}

impl ModelTrainer for TrainingPipeline {
    fn cache_key(&self) -> Result<CacheKey> {
        CacheKey::derive(&self.schema, &self.classifier, self.data_version.as_deref())
    }

    fn train(&self, key: &CacheKey, control: &TrainingControl) -> Result<TrainedModel> {
        let dataset = self.source.load(&self.schema)?;
        let split = stratified_split(&dataset, self.split.test_fraction, self.split.seed)?;
        let train = dataset.get_batch(&split.train);
        let test = dataset.get_batch(&split.test);
        info!(
            "Training {} on {} samples ({} held out) from {}",
            self.classifier.kind(),
            train.len(),
            test.len(),
            self.source.describe()
        );

        let mut classifier = self.classifier.build();
        classifier.fit(&train, control)?;

        let test_metrics = if test.is_empty() {
            None
        } else {
            let metrics = EvaluationMetrics::evaluate(&classifier, &test)?;
            info!(
                "Test accuracy: {:.2}%, precision {:.3}, recall {:.3}, F1 {:.3}",
                metrics.accuracy() * 100.0,
                metrics.precision(),
                metrics.recall(),
                metrics.f1_score()
            );
            Some(metrics)
        };

        let metadata = ModelMetadata {
            algorithm: self.classifier.kind(),
            feature_order: dataset.feature_names().to_vec(),
            hyperparameters: self.classifier.clone(),
            schema_name: self.schema.name.clone(),
            schema_version: self.schema.version,
            cache_key: key.to_string(),
            trained_at: Utc::now(),
            n_train: train.len(),
            n_test: test.len(),
            test_metrics,
            data_source: self.source.describe(),
            data_version: self.data_version.clone(),
        };
        TrainedModel::new(metadata, classifier)
    }
}

/// Summary of the model a service is serving
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub cache_key: String,
    pub algorithm: AlgorithmKind,
    pub schema_name: String,
    pub schema_version: u32,
    pub feature_order: Vec<String>,
    pub hyperparameters: ClassifierConfig,
    pub trained_at: DateTime<Utc>,
    pub n_train: usize,
    pub n_test: usize,
    pub test_accuracy: Option<f64>,
    pub test_metrics: Option<EvaluationMetrics>,
    pub data_source: String,
    pub data_version: Option<String>,
    pub artifact: PathBuf,
    /// Set while the model lives only in memory because its artifact could
    /// not be written
    pub persist_error: Option<String>,
    /// Split levels on the longest path; tree models only
    pub tree_depth: Option<usize>,
    /// Support vectors kept by the solver; margin models only
    pub n_support_vectors: Option<usize>,
}

/// Predictions over raw records for one schema and one cached model
pub struct InferenceService {
    schema: Arc<FeatureSchema>,
    cache: Arc<ModelCache>,
    trainer: Arc<dyn ModelTrainer>,
}

impl InferenceService {
    pub fn new(
        schema: Arc<FeatureSchema>,
        cache: Arc<ModelCache>,
        trainer: Arc<dyn ModelTrainer>,
    ) -> Self {
        Self {
            schema,
            cache,
            trainer,
        }
    }

    /// Serve the model produced by `pipeline`, encoding with its schema
    pub fn with_pipeline(cache: Arc<ModelCache>, pipeline: TrainingPipeline) -> Self {
        let schema = Arc::clone(pipeline.schema());
        Self::new(schema, cache, Arc::new(pipeline))
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    pub fn cache_key(&self) -> Result<CacheKey> {
        self.trainer.cache_key()
    }

    /// Acquire the model through the cache, reporting where it came from
    pub fn acquire(&self, control: &TrainingControl) -> Result<Acquired> {
        let acquired = self.cache.acquire_with_control(self.trainer.as_ref(), control)?;
        self.check_feature_order(&acquired.model)?;
        Ok(acquired)
    }

    fn model(&self) -> Result<Arc<TrainedModel>> {
        let acquired = self.acquire(&TrainingControl::new())?;
        if let Some(err) = &acquired.persist_error {
            warn!("Serving model {} from memory only: {err}", acquired.model.metadata.cache_key);
        }
        Ok(acquired.model)
    }

    /// Why the served model has no artifact on disk, if its last write failed.
    ///
    /// Prediction keeps working in that state; the failure is reported here
    /// and in [`model_info`](Self::model_info) until [`persist`](Self::persist)
    /// succeeds.
    pub fn persist_error(&self) -> Result<Option<String>> {
        Ok(self.cache.persist_error(&self.cache_key()?))
    }

    /// Retry writing the resident model's artifact
    pub fn persist(&self) -> Result<()> {
        self.cache.persist(&self.cache_key()?)
    }

    fn check_feature_order(&self, model: &TrainedModel) -> Result<()> {
        let expected = self.schema.field_names();
        if model.metadata.feature_order != expected {
            return Err(ClassifierError::SchemaMismatch {
                expected: model.metadata.feature_order.clone(),
                actual: expected,
            });
        }
        Ok(())
    }

    /// Encode and classify one record.
    ///
    /// Encoding errors are reported before the model is touched, so invalid
    /// input never triggers training. A model that could not be saved is
    /// still used; see [`persist_error`](Self::persist_error).
    pub fn predict(&self, record: &RawRecord) -> Result<PredictionResult> {
        let features = self.schema.encode_record(record)?;
        let model = self.model()?;
        predict_encoded(&model, features.as_slice())
    }

    /// Classify several records; all are encoded before the model is acquired
    pub fn predict_batch(&self, records: &[RawRecord]) -> Result<Vec<PredictionResult>> {
        let encoded = records
            .iter()
            .map(|r| self.schema.encode_record(r))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let model = self.model()?;
        encoded
            .iter()
            .map(|features| predict_encoded(&model, features.as_slice()))
            .collect()
    }

    /// Importance ranking, ascending; `None` when the model has none
    pub fn feature_importance(&self) -> Result<Option<Vec<FeatureContribution>>> {
        self.model()?.importance_ranking()
    }

    pub fn model_info(&self) -> Result<ModelInfo> {
        let model = self.model()?;
        let key = self.cache_key()?;
        let metadata = &model.metadata;

        let (tree_depth, n_support_vectors) = match &model.classifier {
            ClassifierModel::Tree(tree) => (Some(tree.depth()), None),
            ClassifierModel::Margin(svm) => (None, svm.n_support_vectors()),
        };

        Ok(ModelInfo {
            cache_key: metadata.cache_key.clone(),
            algorithm: metadata.algorithm,
            schema_name: metadata.schema_name.clone(),
            schema_version: metadata.schema_version,
            feature_order: metadata.feature_order.clone(),
            hyperparameters: metadata.hyperparameters.clone(),
            trained_at: metadata.trained_at,
            n_train: metadata.n_train,
            n_test: metadata.n_test,
            test_accuracy: metadata.test_metrics.map(|m| m.accuracy()),
            test_metrics: metadata.test_metrics,
            data_source: metadata.data_source.clone(),
            data_version: metadata.data_version.clone(),
            artifact: self.cache.artifact_path(&key),
            persist_error: self.cache.persist_error(&key),
            tree_depth,
            n_support_vectors,
        })
    }

    /// Drop the cached model so the next call reloads or retrains
    pub fn invalidate(&self) -> Result<bool> {
        self.cache.invalidate(&self.cache_key()?)
    }
}

fn predict_encoded(model: &TrainedModel, features: &[f64]) -> Result<PredictionResult> {
    let probabilities = model.classifier.predict_proba(features)?;
    let label = model.classifier.predict_label(features)?;
    Ok(PredictionResult {
        label,
        confidence: probabilities[0].max(probabilities[1]),
        probabilities,
        feature_contributions: model.importance_ranking()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TreeParams;
    use crate::core::Label;
    use crate::schema::RawValue;
    use tempfile::tempdir;

    fn diabetes_pipeline() -> TrainingPipeline {
        TrainingPipeline::new(
            Arc::new(FeatureSchema::diabetes()),
            ClassifierConfig::Tree(TreeParams::default()),
            DatasetSource::DiabetesSample,
        )
    }

    fn patient(glucose: f64) -> RawRecord {
        let mut record = RawRecord::new();
        for (name, value) in [
            ("Pregnancies", 6.0),
            ("Glucose", glucose),
            ("BloodPressure", 72.0),
            ("SkinThickness", 35.0),
            ("Insulin", 0.0),
            ("BMI", 33.6),
            ("DiabetesPedigreeFunction", 0.627),
            ("Age", 50.0),
        ] {
            record.insert(name.to_string(), RawValue::Number(value));
        }
        record
    }

    #[test]
    fn test_pipeline_run_records_metadata() {
        let model = diabetes_pipeline().run(&TrainingControl::new()).unwrap();
        let meta = &model.metadata;

        assert_eq!(meta.algorithm, AlgorithmKind::Tree);
        assert_eq!(meta.feature_order, FeatureSchema::diabetes().field_names());
        assert_eq!(meta.n_train + meta.n_test, 60);
        assert_eq!(meta.data_source, "builtin:diabetes");
        assert!(meta.test_metrics.is_some());
        assert!(meta.cache_key.starts_with("diabetes-tree-"));
    }

    #[test]
    fn test_builtin_source_lookup() {
        assert!(matches!(
            DatasetSource::builtin_for(&FeatureSchema::diabetes()),
            Some(DatasetSource::DiabetesSample)
        ));
        assert!(matches!(
            DatasetSource::builtin_for(&FeatureSchema::loan_approval()),
            Some(DatasetSource::LoanSample)
        ));
    }

    #[test]
    fn test_data_version_changes_key() {
        let base = diabetes_pipeline().cache_key().unwrap();
        let tagged = diabetes_pipeline().with_data_version("v2").cache_key().unwrap();
        assert_ne!(base, tagged);
    }

    #[test]
    fn test_encoding_error_before_training() {
        let dir = tempdir().unwrap();
        let service =
            InferenceService::with_pipeline(Arc::new(ModelCache::new(dir.path())), diabetes_pipeline());

        let mut record = patient(148.0);
        record.insert("Glucose".into(), RawValue::Text("high".into()));
        assert!(matches!(
            service.predict(&record),
            Err(ClassifierError::Encoding(_))
        ));

        // nothing was trained or written
        let key = service.cache_key().unwrap();
        assert!(service.cache().get(&key).is_none());
        assert!(!service.cache().artifact_path(&key).exists());
    }

    #[test]
    fn test_predict_and_batch_agree() {
        let dir = tempdir().unwrap();
        let service =
            InferenceService::with_pipeline(Arc::new(ModelCache::new(dir.path())), diabetes_pipeline());

        let single = service.predict(&patient(180.0)).unwrap();
        let batch = service
            .predict_batch(&[patient(90.0), patient(180.0)])
            .unwrap();

        assert_eq!(batch[1], single);
        assert_eq!(single.label, Label::Positive);
        assert_eq!(batch[0].label, Label::Negative);
        assert!(single.feature_contributions.is_some());
    }

    #[test]
    fn test_schema_mismatch_detected() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(ModelCache::new(dir.path()));
        let trainer: Arc<dyn ModelTrainer> = Arc::new(diabetes_pipeline());

        // same trainer, but the service encodes with a different schema
        let service = InferenceService::new(Arc::new(FeatureSchema::loan_approval()), cache, trainer);
        let err = service.feature_importance().unwrap_err();
        assert!(matches!(err, ClassifierError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_model_info() {
        let dir = tempdir().unwrap();
        let service =
            InferenceService::with_pipeline(Arc::new(ModelCache::new(dir.path())), diabetes_pipeline());
        let info = service.model_info().unwrap();

        assert_eq!(info.algorithm, AlgorithmKind::Tree);
        assert_eq!(info.cache_key, service.cache_key().unwrap().to_string());
        assert!(info.tree_depth.is_some());
        assert!(info.n_support_vectors.is_none());
        assert!(info.artifact.exists());
        assert!(info.persist_error.is_none());
    }

    #[test]
    fn test_unsaved_model_still_serves() {
        // a regular file where the cache directory should be
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let service = InferenceService::with_pipeline(
            Arc::new(ModelCache::new(blocker.path())),
            diabetes_pipeline(),
        );

        let prediction = service.predict(&patient(180.0)).unwrap();
        assert_eq!(prediction.label, Label::Positive);

        let reason = service.persist_error().unwrap();
        assert!(reason.is_some());
        assert_eq!(service.model_info().unwrap().persist_error, reason);
        assert!(service.persist().is_err());
        assert!(service.persist_error().unwrap().is_some());
    }
}
