//! End-to-end tests for the binfer library
//!
//! These tests run the full path from raw records through the schema, the
//! training pipeline and the model cache to predictions.

use approx::assert_relative_eq;
use binfer::api::{DatasetSource, InferenceService, TrainingPipeline};
use binfer::cache::{ModelCache, ModelOrigin};
use binfer::classifier::{ClassifierConfig, ClassifierModel, MarginParams, TreeParams};
use binfer::core::{ClassifierError, EncodingError, Label, TrainingControl};
use binfer::data::sample::loan_sample;
use binfer::data::LoadOptions;
use binfer::persistence::load_model;
use binfer::schema::{FeatureSchema, RawRecord, RawValue};
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};

fn diabetes_service(dir: &std::path::Path) -> InferenceService {
    let pipeline = TrainingPipeline::new(
        Arc::new(FeatureSchema::diabetes()),
        ClassifierConfig::Tree(TreeParams::default()),
        DatasetSource::DiabetesSample,
    );
    InferenceService::with_pipeline(Arc::new(ModelCache::new(dir)), pipeline)
}

fn loan_service(dir: &std::path::Path) -> InferenceService {
    let pipeline = TrainingPipeline::new(
        Arc::new(FeatureSchema::loan_approval()),
        ClassifierConfig::Margin(MarginParams::default()),
        DatasetSource::LoanSample,
    );
    InferenceService::with_pipeline(Arc::new(ModelCache::new(dir)), pipeline)
}

fn reference_patient() -> RawRecord {
    let mut record = RawRecord::new();
    for (name, value) in [
        ("Pregnancies", 6.0),
        ("Glucose", 148.0),
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

fn favourable_applicant(credit_history: f64) -> RawRecord {
    let mut record = RawRecord::new();
    record.insert("Gender".into(), "Male".into());
    record.insert("Married".into(), "Yes".into());
    record.insert("Dependents".into(), "0".into());
    record.insert("Education".into(), "Graduate".into());
    record.insert("Self_Employed".into(), "No".into());
    record.insert("ApplicantIncome".into(), 6000.0.into());
    record.insert("CoapplicantIncome".into(), 2358.0.into());
    record.insert("LoanAmount".into(), 66.0.into());
    record.insert("Loan_Amount_Term".into(), 360.0.into());
    record.insert("Credit_History".into(), credit_history.into());
    record.insert("Property_Area".into(), "Semiurban".into());
    record
}

#[test]
fn test_diabetes_tree_end_to_end() {
    let dir = tempdir().unwrap();
    let service = diabetes_service(dir.path());

    let prediction = service.predict(&reference_patient()).unwrap();
    assert_eq!(prediction.label, Label::Positive);
    assert!(
        prediction.confidence >= 0.6,
        "confidence {} below 0.6",
        prediction.confidence
    );
    assert_relative_eq!(
        prediction.probabilities[0] + prediction.probabilities[1],
        1.0,
        epsilon = 1e-12
    );

    // glucose alone decides the synthetic outcome
    let model = service.acquire(&TrainingControl::new()).unwrap().model;
    match &model.classifier {
        ClassifierModel::Tree(tree) => {
            let (feature, threshold) = tree.root_split().unwrap();
            assert_eq!(feature, 1);
            assert!(threshold > 80.0 && threshold < 200.0);
            assert_eq!(tree.depth(), 1);
        }
        other => panic!("expected a tree, got {:?}", other.kind()),
    }

    let ranking = prediction.feature_contributions.unwrap();
    assert_eq!(ranking.len(), 8);
    let total: f64 = ranking.iter().map(|c| c.importance).sum();
    assert_relative_eq!(total, 1.0, epsilon = 1e-6);
    assert!(ranking.iter().all(|c| c.importance >= 0.0));
    assert!(ranking
        .windows(2)
        .all(|pair| pair[0].importance <= pair[1].importance));
    assert_eq!(ranking.last().unwrap().feature, "Glucose");
}

#[test]
fn test_diabetes_low_glucose_negative() {
    let dir = tempdir().unwrap();
    let service = diabetes_service(dir.path());

    let mut record = reference_patient();
    record.insert("Glucose".into(), RawValue::Number(85.0));
    let prediction = service.predict(&record).unwrap();
    assert_eq!(prediction.label, Label::Negative);
    assert!(prediction.confidence >= 0.6);
}

#[test]
fn test_loan_margin_credit_history_decides() {
    let dir = tempdir().unwrap();
    let service = loan_service(dir.path());

    let rejected = service.predict(&favourable_applicant(0.0)).unwrap();
    assert_eq!(rejected.label, Label::Negative);
    assert!(rejected.probabilities[0] > 0.5);

    let approved = service.predict(&favourable_applicant(1.0)).unwrap();
    assert_eq!(approved.label, Label::Positive);

    // margin models carry no importance ranking
    assert!(approved.feature_contributions.is_none());
    assert!(service.feature_importance().unwrap().is_none());
}

fn toggle(current: &str, a: &str, b: &str) -> RawValue {
    let next = if current == a { b } else { a };
    RawValue::Text(next.to_string())
}

/// Replacement value for a field, chosen from values seen during training
fn perturb(field: &str, value: &RawValue) -> RawValue {
    let text = match value {
        RawValue::Text(text) => text.as_str(),
        RawValue::Number(_) => "",
    };
    match field {
        "Gender" => toggle(text, "Male", "Female"),
        "Married" | "Self_Employed" => toggle(text, "Yes", "No"),
        "Dependents" => toggle(text, "0", "2"),
        "Education" => toggle(text, "Graduate", "Not Graduate"),
        "Property_Area" => toggle(text, "Rural", "Urban"),
        "ApplicantIncome" => RawValue::Number(2583.0),
        "CoapplicantIncome" => RawValue::Number(4196.0),
        "LoanAmount" => RawValue::Number(267.0),
        "Loan_Amount_Term" => RawValue::Number(180.0),
        "Credit_History" => match value {
            RawValue::Number(v) if *v == 1.0 => RawValue::Number(0.0),
            _ => RawValue::Number(1.0),
        },
        other => panic!("unexpected field {other}"),
    }
}

#[test]
fn test_loan_perturbation_credit_history_dominates() {
    let dir = tempdir().unwrap();
    let service = loan_service(dir.path());
    let schema = FeatureSchema::loan_approval();

    // one copy of every applicant profile, with and without credit history
    let base: Vec<RawRecord> = loan_sample()
        .into_iter()
        .take(12)
        .map(|(record, _)| record)
        .collect();
    let baseline = service.predict_batch(&base).unwrap();

    let mut flips = Vec::new();
    for field in schema.field_names() {
        let perturbed: Vec<RawRecord> = base
            .iter()
            .map(|record| {
                let mut record = record.clone();
                let replacement = perturb(&field, &record[&field]);
                record.insert(field.clone(), replacement);
                record
            })
            .collect();
        let predictions = service.predict_batch(&perturbed).unwrap();
        let changed = predictions
            .iter()
            .zip(&baseline)
            .filter(|(after, before)| after.label != before.label)
            .count();
        flips.push((field, changed));
    }

    let credit = flips
        .iter()
        .find(|(field, _)| field == "Credit_History")
        .map(|(_, n)| *n)
        .unwrap();
    assert_eq!(credit, base.len());
    for (field, changed) in &flips {
        if field != "Credit_History" {
            assert!(
                *changed < credit,
                "{field} flipped {changed} predictions, credit history {credit}"
            );
        }
    }
}

#[test]
fn test_invalid_category_reported_per_field() {
    let dir = tempdir().unwrap();
    let service = loan_service(dir.path());

    let mut record = favourable_applicant(1.0);
    record.insert("Property_Area".into(), "Downtown".into());
    match service.predict(&record) {
        Err(ClassifierError::Encoding(EncodingError::UnknownCategory { field, value })) => {
            assert_eq!(field, "Property_Area");
            assert_eq!(value, "Downtown");
        }
        other => panic!("expected an unknown category error, got {other:?}"),
    }
}

#[test]
fn test_artifact_reloaded_by_fresh_cache() {
    let dir = tempdir().unwrap();

    let first = diabetes_service(dir.path());
    let trained = first.acquire(&TrainingControl::new()).unwrap();
    assert_eq!(trained.origin, ModelOrigin::Trained);
    assert!(trained.persist_error.is_none());
    let expected = first.predict(&reference_patient()).unwrap();

    let artifact = first.cache().artifact_path(&first.cache_key().unwrap());
    let on_disk = load_model(&artifact).unwrap();
    assert_eq!(on_disk.metadata.cache_key, trained.model.metadata.cache_key);

    // a new process would start from an empty cache over the same directory
    let second = diabetes_service(dir.path());
    let loaded = second.acquire(&TrainingControl::new()).unwrap();
    assert_eq!(loaded.origin, ModelOrigin::Loaded);
    assert_eq!(
        loaded.model.metadata.trained_at,
        trained.model.metadata.trained_at
    );
    assert_eq!(second.predict(&reference_patient()).unwrap(), expected);
}

#[test]
fn test_csv_source_end_to_end() {
    let mut csv = NamedTempFile::with_suffix(".csv").unwrap();
    writeln!(
        csv,
        "Pregnancies,Glucose,BloodPressure,SkinThickness,Insulin,BMI,DiabetesPedigreeFunction,Age,Outcome"
    )
    .unwrap();
    for k in 0..40u32 {
        let glucose = 90 + (k * 7) % 100;
        let outcome = u32::from(glucose >= 140);
        writeln!(
            csv,
            "{},{glucose},{},{},0,{}.5,0.{},{},{outcome}",
            k % 6,
            62 + k % 20,
            20 + k % 15,
            24 + k % 12,
            1 + k % 8,
            22 + k % 30
        )
        .unwrap();
    }
    // an incomplete row is skipped when requested
    writeln!(csv, "1,,70,20,0,25.0,0.3,30,0").unwrap();
    csv.flush().unwrap();

    let dir = tempdir().unwrap();
    let pipeline = TrainingPipeline::new(
        Arc::new(FeatureSchema::diabetes()),
        ClassifierConfig::Tree(TreeParams::default()),
        DatasetSource::Csv {
            path: csv.path().to_path_buf(),
            options: LoadOptions {
                skip_incomplete_rows: true,
            },
        },
    )
    .with_data_version("csv-1");
    let service = InferenceService::with_pipeline(Arc::new(ModelCache::new(dir.path())), pipeline);

    let info = service.model_info().unwrap();
    assert_eq!(info.n_train + info.n_test, 40);
    assert_eq!(info.data_version.as_deref(), Some("csv-1"));
    assert!(info.data_source.starts_with("csv:"));

    let mut high = reference_patient();
    high.insert("Glucose".into(), RawValue::Number(185.0));
    assert_eq!(service.predict(&high).unwrap().label, Label::Positive);
}

#[test]
fn test_algorithms_cached_under_separate_keys() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(ModelCache::new(dir.path()));
    let schema = Arc::new(FeatureSchema::diabetes());

    let tree = InferenceService::with_pipeline(
        Arc::clone(&cache),
        TrainingPipeline::new(
            Arc::clone(&schema),
            ClassifierConfig::Tree(TreeParams::default()),
            DatasetSource::DiabetesSample,
        ),
    );
    let margin = InferenceService::with_pipeline(
        Arc::clone(&cache),
        TrainingPipeline::new(
            Arc::clone(&schema),
            ClassifierConfig::Margin(MarginParams::default()),
            DatasetSource::DiabetesSample,
        ),
    );

    assert_ne!(tree.cache_key().unwrap(), margin.cache_key().unwrap());
    let mut patient = reference_patient();
    patient.insert("Glucose".into(), RawValue::Number(195.0));
    let tree_label = tree.predict(&patient).unwrap().label;
    let margin_label = margin.predict(&patient).unwrap().label;
    assert_eq!(tree_label, Label::Positive);
    assert_eq!(margin_label, Label::Positive);

    let artifacts = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(artifacts, 2);
}
