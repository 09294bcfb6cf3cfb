use binfer::api::{DatasetSource, InferenceService, TrainingPipeline};
use binfer::cache::ModelCache;
use binfer::classifier::{ClassifierConfig, MarginParams, TreeParams};
use binfer::core::TrainingControl;
use binfer::data::sample::{diabetes_sample, loan_sample};
use binfer::schema::{FeatureSchema, RawRecord};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn service(
    dir: &std::path::Path,
    schema: FeatureSchema,
    config: ClassifierConfig,
    source: DatasetSource,
) -> InferenceService {
    let pipeline = TrainingPipeline::new(Arc::new(schema), config, source);
    let service = InferenceService::with_pipeline(Arc::new(ModelCache::new(dir)), pipeline);
    service
        .acquire(&TrainingControl::new())
        .expect("training failed");
    service
}

fn records(rows: Vec<(RawRecord, String)>) -> Vec<RawRecord> {
    rows.into_iter().map(|(record, _)| record).collect()
}

fn bench_predict(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");

    let tree = service(
        dir.path(),
        FeatureSchema::diabetes(),
        ClassifierConfig::Tree(TreeParams::default()),
        DatasetSource::DiabetesSample,
    );
    let patients = records(diabetes_sample());
    c.bench_function("tree_predict_single", |b| {
        b.iter(|| tree.predict(black_box(&patients[0])).map(|p| p.label))
    });
    c.bench_function("tree_predict_batch_60", |b| {
        b.iter(|| tree.predict_batch(black_box(&patients)).map(|p| p.len()))
    });

    let margin = service(
        dir.path(),
        FeatureSchema::loan_approval(),
        ClassifierConfig::Margin(MarginParams::default()),
        DatasetSource::LoanSample,
    );
    let applicants = records(loan_sample());
    c.bench_function("margin_predict_single", |b| {
        b.iter(|| margin.predict(black_box(&applicants[0])).map(|p| p.label))
    });
    c.bench_function("margin_predict_batch_120", |b| {
        b.iter(|| margin.predict_batch(black_box(&applicants)).map(|p| p.len()))
    });
}

fn bench_training(c: &mut Criterion) {
    let pipeline = TrainingPipeline::new(
        Arc::new(FeatureSchema::loan_approval()),
        ClassifierConfig::Margin(MarginParams::default()),
        DatasetSource::LoanSample,
    );
    c.bench_function("margin_train_loan", |b| {
        b.iter(|| pipeline.run(&TrainingControl::new()).map(|m| m.metadata.n_train))
    });
}

criterion_group!(benches, bench_predict, bench_training);
criterion_main!(benches);
