//! Binary-classification inference pipeline
//!
//! Raw records are encoded through a [`FeatureSchema`], classified by a
//! decision tree or a linear SVM, and models are trained at most once per
//! cache key and shared through a [`ModelCache`] backed by JSON artifacts.

pub mod api;
pub mod cache;
pub mod classifier;
pub mod core;
pub mod data;
pub mod kernel;
pub mod persistence;
pub mod schema;
pub mod solver;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{DatasetSource, InferenceService, ModelInfo, TrainingPipeline};
pub use crate::cache::{Acquired, CacheKey, CacheState, ModelCache, ModelOrigin, ModelTrainer};
pub use crate::classifier::{
    AlgorithmKind, ClassifierConfig, ClassifierModel, EvaluationMetrics, TrainedModel,
};
pub use crate::core::error::*;
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::data::{LabeledDataset, LoadOptions, SplitConfig};
pub use crate::schema::{FeatureSchema, RawRecord, RawValue};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
