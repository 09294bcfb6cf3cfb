//! Built-in sample tables for both domains
//!
//! Rows are returned raw, with the label as the schema's class literal, so
//! they go through exactly the same encoding as a CSV file would.

use crate::schema::{RawRecord, RawValue};

/// Applicant profiles: gender, married, dependents, education, self employed,
/// applicant income, coapplicant income, loan amount, property area
const LOAN_PROFILES: [(&str, &str, &str, &str, &str, f64, f64, f64, &str); 6] = [
    ("Male", "Yes", "1", "Graduate", "No", 4583.0, 1508.0, 128.0, "Rural"),
    ("Male", "Yes", "0", "Graduate", "Yes", 3000.0, 0.0, 66.0, "Urban"),
    ("Male", "Yes", "0", "Not Graduate", "No", 2583.0, 2358.0, 120.0, "Urban"),
    ("Male", "No", "0", "Graduate", "No", 6000.0, 0.0, 141.0, "Urban"),
    ("Male", "Yes", "2", "Graduate", "Yes", 5417.0, 4196.0, 267.0, "Urban"),
    ("Female", "No", "0", "Graduate", "No", 4583.0, 1508.0, 128.0, "Rural"),
];

const LOAN_REPEATS: usize = 10;

/// Loan applications in which approval follows credit history.
///
/// Every applicant profile appears both with and without a credit history,
/// so all other attributes are distributed identically across the classes.
pub fn loan_sample() -> Vec<(RawRecord, String)> {
    let mut rows = Vec::with_capacity(LOAN_PROFILES.len() * 2 * LOAN_REPEATS);
    for _ in 0..LOAN_REPEATS {
        for &(gender, married, dependents, education, self_employed, income, co_income, amount, area) in
            &LOAN_PROFILES
        {
            for credit_history in [1.0, 0.0] {
                let mut record = RawRecord::new();
                record.insert("Gender".into(), gender.into());
                record.insert("Married".into(), married.into());
                record.insert("Dependents".into(), dependents.into());
                record.insert("Education".into(), education.into());
                record.insert("Self_Employed".into(), self_employed.into());
                record.insert("ApplicantIncome".into(), income.into());
                record.insert("CoapplicantIncome".into(), co_income.into());
                record.insert("LoanAmount".into(), amount.into());
                record.insert("Loan_Amount_Term".into(), RawValue::Number(360.0));
                record.insert("Credit_History".into(), credit_history.into());
                record.insert("Property_Area".into(), area.into());

                let status = if credit_history == 1.0 { "Y" } else { "N" };
                rows.push((record, status.to_string()));
            }
        }
    }
    rows
}

const DIABETES_ROWS: usize = 60;

/// Glucose at or above this value is labeled diabetic in [`diabetes_sample`]
pub const DIABETES_GLUCOSE_CUTOFF: f64 = 126.0;

/// Synthetic patients whose outcome is decided by glucose alone.
///
/// The other measurements cycle with periods unrelated to glucose, so the
/// reference model is a single glucose split.
pub fn diabetes_sample() -> Vec<(RawRecord, String)> {
    (0..DIABETES_ROWS)
        .map(|k| {
            let glucose = 80.0 + ((k * 37) % 120) as f64;
            let mut record = RawRecord::new();
            record.insert("Pregnancies".into(), count((k * 5) % 11));
            record.insert("Glucose".into(), glucose.into());
            record.insert("BloodPressure".into(), count(60 + (k * 11) % 40));
            record.insert("SkinThickness".into(), count(10 + (k * 3) % 31));
            record.insert("Insulin".into(), count((k * 29) % 200));
            record.insert("BMI".into(), (20.5 + ((k * 7) % 23) as f64).into());
            record.insert(
                "DiabetesPedigreeFunction".into(),
                (0.1 + ((k * 17) % 19) as f64 * 0.05).into(),
            );
            record.insert("Age".into(), count(21 + (k * 13) % 47));

            let outcome = if glucose >= DIABETES_GLUCOSE_CUTOFF { "1" } else { "0" };
            (record, outcome.to_string())
        })
        .collect()
}

fn count(value: usize) -> RawValue {
    RawValue::Number(value as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dataset, Label};
    use crate::data::LabeledDataset;
    use crate::schema::FeatureSchema;

    #[test]
    fn test_loan_sample_encodes() {
        let dataset =
            LabeledDataset::from_records(&FeatureSchema::loan_approval(), &loan_sample()).unwrap();
        assert_eq!(dataset.len(), 120);
        assert_eq!(dataset.class_counts(), [60, 60]);

        // credit history column decides the label
        for sample in dataset.samples() {
            let approved = sample.features[9] == 1.0;
            assert_eq!(sample.label == Label::Positive, approved);
        }
    }

    #[test]
    fn test_diabetes_sample_encodes() {
        let dataset =
            LabeledDataset::from_records(&FeatureSchema::diabetes(), &diabetes_sample()).unwrap();
        assert_eq!(dataset.len(), DIABETES_ROWS);

        let [negatives, positives] = dataset.class_counts();
        assert!(negatives > 10 && positives > 10);
        for sample in dataset.samples() {
            let diabetic = sample.features[1] >= DIABETES_GLUCOSE_CUTOFF;
            assert_eq!(sample.label == Label::Positive, diabetic);
        }
    }

    #[test]
    fn test_samples_are_stable() {
        assert_eq!(diabetes_sample(), diabetes_sample());
        assert_eq!(loan_sample(), loan_sample());
    }
}
