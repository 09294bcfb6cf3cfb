//! Built-in schemas for the diabetes and loan-approval domains

use super::{FeatureSchema, FieldSpec, LabelSpec, NumericDomain};

const LOAN_TERMS: [f64; 8] = [12.0, 36.0, 60.0, 120.0, 180.0, 240.0, 360.0, 480.0];

impl FeatureSchema {
    /// Eight clinical measurements, label `Outcome` (0 = non-diabetic, 1 = diabetic)
    pub fn diabetes() -> Self {
        Self {
            name: "diabetes".to_string(),
            version: 1,
            fields: vec![
                FieldSpec::numeric("Pregnancies", NumericDomain::range(0.0, 20.0)),
                FieldSpec::numeric("Glucose", NumericDomain::range(0.0, 300.0)),
                FieldSpec::numeric("BloodPressure", NumericDomain::range(0.0, 200.0)),
                FieldSpec::numeric("SkinThickness", NumericDomain::range(0.0, 100.0)),
                FieldSpec::numeric("Insulin", NumericDomain::range(0.0, 900.0)),
                FieldSpec::numeric("BMI", NumericDomain::range(0.0, 70.0)),
                FieldSpec::numeric("DiabetesPedigreeFunction", NumericDomain::range(0.0, 3.0)),
                FieldSpec::numeric("Age", NumericDomain::range(0.0, 120.0)),
            ],
            label: LabelSpec::new("Outcome", "0", "1"),
        }
    }

    /// Loan application attributes, label `Loan_Status` (N = rejected, Y = approved)
    pub fn loan_approval() -> Self {
        Self {
            name: "loan approval".to_string(),
            version: 1,
            fields: vec![
                FieldSpec::categorical("Gender", &[("Male", 1.0), ("Female", 0.0)]),
                FieldSpec::categorical("Married", &[("Yes", 1.0), ("No", 0.0)]),
                FieldSpec::numeric(
                    "Dependents",
                    NumericDomain::one_of(&[0.0, 1.0, 2.0, 4.0]).with_alias("3+", 4.0),
                ),
                FieldSpec::categorical(
                    "Education",
                    &[("Graduate", 1.0), ("Not Graduate", 0.0)],
                ),
                FieldSpec::categorical("Self_Employed", &[("Yes", 1.0), ("No", 0.0)]),
                FieldSpec::numeric("ApplicantIncome", NumericDomain::at_least(0.0)),
                FieldSpec::numeric("CoapplicantIncome", NumericDomain::at_least(0.0)),
                // thousands
                FieldSpec::numeric("LoanAmount", NumericDomain::at_least(9.0)),
                FieldSpec::numeric("Loan_Amount_Term", NumericDomain::one_of(&LOAN_TERMS)),
                FieldSpec::numeric("Credit_History", NumericDomain::one_of(&[0.0, 1.0])),
                FieldSpec::categorical(
                    "Property_Area",
                    &[("Rural", 0.0), ("Semiurban", 1.0), ("Urban", 2.0)],
                ),
            ],
            label: LabelSpec::new("Loan_Status", "N", "Y"),
        }
    }
}
