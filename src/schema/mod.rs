//! Feature schema: ordered fields, validation bounds and encoding tables
//!
//! The schema is the single source of truth for how raw field values become
//! numbers. The same instance is used when encoding training rows and
//! inference requests, so the two paths cannot drift apart.
//!
//! ```rust
//! use binfer::schema::{FeatureSchema, RawRecord, RawValue};
//!
//! let schema = FeatureSchema::diabetes();
//! let mut record = RawRecord::new();
//! for name in schema.field_names() {
//!     record.insert(name, RawValue::Number(1.0));
//! }
//! let encoded = schema.encode_record(&record).unwrap();
//! assert_eq!(encoded.len(), 8);
//! ```

mod presets;

use crate::core::{ClassifierError, EncodingError, FeatureVector, Label, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Raw value of one field as collected by the input layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// Field name to raw value mapping for one subject
pub type RawRecord = BTreeMap<String, RawValue>;

/// A named code in a categorical table or a numeric alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub code: f64,
}

impl Category {
    pub fn new(label: impl Into<String>, code: f64) -> Self {
        Self {
            label: label.into(),
            code,
        }
    }
}

/// Accepted values of a numeric field
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericDomain {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Closed set of accepted values, checked after the bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<f64>>,
    /// Text spellings accepted in place of a number (e.g. "3+" -> 4)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<Category>,
}

impl NumericDomain {
    pub fn range(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            ..Self::default()
        }
    }

    pub fn one_of(values: &[f64]) -> Self {
        Self {
            allowed: Some(values.to_vec()),
            ..Self::default()
        }
    }

    pub fn with_alias(mut self, text: impl Into<String>, value: f64) -> Self {
        self.aliases.push(Category::new(text, value));
        self
    }

    fn encode(&self, field: &str, raw: &RawValue) -> std::result::Result<f64, EncodingError> {
        let value = match raw {
            RawValue::Number(v) => *v,
            RawValue::Text(text) => {
                let text = text.trim();
                match self.aliases.iter().find(|alias| alias.label == text) {
                    Some(alias) => alias.code,
                    None => text.parse::<f64>().map_err(|_| EncodingError::NotNumeric {
                        field: field.to_string(),
                        raw: text.to_string(),
                    })?,
                }
            }
        };
        self.check(field, value)?;
        Ok(value)
    }

    fn check(&self, field: &str, value: f64) -> std::result::Result<(), EncodingError> {
        if !value.is_finite() {
            return Err(EncodingError::NonFinite {
                field: field.to_string(),
            });
        }

        let below = self.min.map_or(false, |min| value < min);
        let above = self.max.map_or(false, |max| value > max);
        if below || above {
            return Err(EncodingError::OutOfBounds {
                field: field.to_string(),
                value,
                min: self.min.unwrap_or(f64::NEG_INFINITY),
                max: self.max.unwrap_or(f64::INFINITY),
            });
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|&a| a == value) {
                return Err(EncodingError::NotAllowed {
                    field: field.to_string(),
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Kind of a field together with its bounds or categories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Numeric(NumericDomain),
    Categorical { categories: Vec<Category> },
}

/// One named feature of the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn numeric(name: impl Into<String>, domain: NumericDomain) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Numeric(domain),
        }
    }

    pub fn categorical(name: impl Into<String>, categories: &[(&str, f64)]) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Categorical {
                categories: categories
                    .iter()
                    .map(|&(label, code)| Category::new(label, code))
                    .collect(),
            },
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Categorical { .. })
    }

    /// Encode one raw value of this field
    pub fn encode(&self, raw: &RawValue) -> std::result::Result<f64, EncodingError> {
        match &self.kind {
            FieldKind::Numeric(domain) => domain.encode(&self.name, raw),
            FieldKind::Categorical { categories } => match raw {
                RawValue::Text(text) => categories
                    .iter()
                    .find(|c| c.label == *text)
                    .map(|c| c.code)
                    .ok_or_else(|| EncodingError::UnknownCategory {
                        field: self.name.clone(),
                        value: text.clone(),
                    }),
                RawValue::Number(value) => Err(EncodingError::ExpectedCategory {
                    field: self.name.clone(),
                    value: *value,
                }),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ClassifierError::InvalidParameter(
                "field name must not be empty".to_string(),
            ));
        }

        match &self.kind {
            FieldKind::Numeric(domain) => {
                if let (Some(min), Some(max)) = (domain.min, domain.max) {
                    if min > max {
                        return Err(ClassifierError::InvalidParameter(format!(
                            "field '{}': min {min} exceeds max {max}",
                            self.name
                        )));
                    }
                }
                if matches!(&domain.allowed, Some(values) if values.is_empty()) {
                    return Err(ClassifierError::InvalidParameter(format!(
                        "field '{}': allowed set is empty",
                        self.name
                    )));
                }
                for alias in &domain.aliases {
                    domain.check(&self.name, alias.code)?;
                }
            }
            FieldKind::Categorical { categories } => {
                if categories.is_empty() {
                    return Err(ClassifierError::InvalidParameter(format!(
                        "field '{}': no categories declared",
                        self.name
                    )));
                }
                let mut labels = HashSet::new();
                let mut codes = Vec::with_capacity(categories.len());
                for category in categories {
                    if !labels.insert(category.label.as_str()) {
                        return Err(ClassifierError::InvalidParameter(format!(
                            "field '{}': duplicate category {:?}",
                            self.name, category.label
                        )));
                    }
                    if !category.code.is_finite() || codes.contains(&category.code) {
                        return Err(ClassifierError::InvalidParameter(format!(
                            "field '{}': category codes must be distinct finite numbers",
                            self.name
                        )));
                    }
                    codes.push(category.code);
                }
            }
        }
        Ok(())
    }
}

/// Label column and its two literal classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub column: String,
    /// Literal encoded as class 0
    pub negative: String,
    /// Literal encoded as class 1
    pub positive: String,
}

impl LabelSpec {
    pub fn new(
        column: impl Into<String>,
        negative: impl Into<String>,
        positive: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            negative: negative.into(),
            positive: positive.into(),
        }
    }

    /// Map a raw label literal to its class, `None` if it is neither literal
    pub fn encode(&self, raw: &str) -> Option<Label> {
        let raw = raw.trim();
        if raw == self.negative {
            Some(Label::Negative)
        } else if raw == self.positive {
            Some(Label::Positive)
        } else {
            None
        }
    }
}

/// Ordered set of named features plus the label definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub name: String,
    pub version: u32,
    fields: Vec<FieldSpec>,
    label: LabelSpec,
}

impl FeatureSchema {
    /// Build and validate a schema
    pub fn new(
        name: impl Into<String>,
        version: u32,
        fields: Vec<FieldSpec>,
        label: LabelSpec,
    ) -> Result<Self> {
        let schema = Self {
            name: name.into(),
            version,
            fields,
            label,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Load a schema definition from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let schema: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ClassifierError::InvalidParameter(format!(
                "invalid schema file {:?}: {e}",
                path.as_ref()
            ))
        })?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check field names are unique and every encoding table is a bijection
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(ClassifierError::InvalidParameter(
                "schema declares no fields".to_string(),
            ));
        }
        if self.label.negative == self.label.positive {
            return Err(ClassifierError::InvalidParameter(
                "label classes must be distinct".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            field.validate()?;
            if !names.insert(field.name.as_str()) {
                return Err(ClassifierError::InvalidParameter(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
        }
        if names.contains(self.label.column.as_str()) {
            return Err(ClassifierError::InvalidParameter(format!(
                "label column '{}' is also a feature",
                self.label.column
            )));
        }
        Ok(())
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn label(&self) -> &LabelSpec {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Encode a single value for the named field
    pub fn encode(&self, field: &str, raw: &RawValue) -> std::result::Result<f64, EncodingError> {
        self.field(field)
            .ok_or_else(|| EncodingError::UnexpectedField(field.to_string()))?
            .encode(raw)
    }

    /// Encode a full record into a schema-ordered feature vector
    pub fn encode_record(
        &self,
        record: &RawRecord,
    ) -> std::result::Result<FeatureVector, EncodingError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let raw = record
                .get(&field.name)
                .ok_or_else(|| EncodingError::MissingField(field.name.clone()))?;
            values.push(field.encode(raw)?);
        }

        if let Some(extra) = record.keys().find(|key| self.field(key).is_none()) {
            return Err(EncodingError::UnexpectedField(extra.clone()));
        }

        Ok(FeatureVector::new(values))
    }

    /// Lowercase identifier safe for file names
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches('-').to_string();
        if slug.is_empty() {
            "schema".to_string()
        } else {
            slug
        }
    }

    /// SHA-256 digest over the schema's JSON form, hex encoded.
    ///
    /// Covers the name, version, every field with its bounds, allowed
    /// values, aliases or categories, and the label definition.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self).map_err(|e| {
            ClassifierError::InvalidParameter(format!("cannot serialize schema {}: {e}", self.name))
        })?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diabetes_record() -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("Pregnancies".into(), 6.0.into());
        record.insert("Glucose".into(), 148.0.into());
        record.insert("BloodPressure".into(), 72.0.into());
        record.insert("SkinThickness".into(), 35.0.into());
        record.insert("Insulin".into(), 0.0.into());
        record.insert("BMI".into(), 33.6.into());
        record.insert("DiabetesPedigreeFunction".into(), 0.627.into());
        record.insert("Age".into(), 50.0.into());
        record
    }

    fn loan_record() -> RawRecord {
        let mut record = RawRecord::new();
        record.insert("Gender".into(), "Male".into());
        record.insert("Married".into(), "Yes".into());
        record.insert("Dependents".into(), "0".into());
        record.insert("Education".into(), "Graduate".into());
        record.insert("Self_Employed".into(), "No".into());
        record.insert("ApplicantIncome".into(), 5000.0.into());
        record.insert("CoapplicantIncome".into(), 0.0.into());
        record.insert("LoanAmount".into(), 100.0.into());
        record.insert("Loan_Amount_Term".into(), 360.0.into());
        record.insert("Credit_History".into(), 1.0.into());
        record.insert("Property_Area".into(), "Urban".into());
        record
    }

    #[test]
    fn test_encode_record_in_schema_order() {
        let schema = FeatureSchema::diabetes();
        let encoded = schema.encode_record(&diabetes_record()).unwrap();
        assert_eq!(
            encoded.as_slice(),
            &[6.0, 148.0, 72.0, 35.0, 0.0, 33.6, 0.627, 50.0]
        );
    }

    #[test]
    fn test_encode_is_pure() {
        let schema = FeatureSchema::loan_approval();
        let record = loan_record();
        let first = schema.encode_record(&record).unwrap();
        let second = schema.encode_record(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.as_slice(),
            &[1.0, 1.0, 0.0, 1.0, 0.0, 5000.0, 0.0, 100.0, 360.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_unknown_category_rejected_for_every_field() {
        let schema = FeatureSchema::loan_approval();
        for field in schema.fields().iter().filter(|f| f.is_categorical()) {
            let mut record = loan_record();
            record.insert(field.name.clone(), "Unknown".into());
            let err = schema.encode_record(&record).unwrap_err();
            assert_eq!(
                err,
                EncodingError::UnknownCategory {
                    field: field.name.clone(),
                    value: "Unknown".to_string()
                }
            );
        }
    }

    #[test]
    fn test_categories_are_case_sensitive() {
        let schema = FeatureSchema::loan_approval();
        let result = schema.encode("Gender", &"male".into());
        assert!(matches!(result, Err(EncodingError::UnknownCategory { .. })));
    }

    #[test]
    fn test_categorical_rejects_numbers() {
        let schema = FeatureSchema::loan_approval();
        let result = schema.encode("Gender", &RawValue::Number(1.0));
        assert!(matches!(
            result,
            Err(EncodingError::ExpectedCategory { .. })
        ));
    }

    #[test]
    fn test_numeric_bounds() {
        let schema = FeatureSchema::diabetes();
        assert_eq!(schema.encode("Glucose", &300.0.into()), Ok(300.0));
        assert!(matches!(
            schema.encode("Glucose", &300.5.into()),
            Err(EncodingError::OutOfBounds { .. })
        ));
        assert!(matches!(
            schema.encode("BMI", &(-0.1).into()),
            Err(EncodingError::OutOfBounds { .. })
        ));
        assert!(matches!(
            schema.encode("Age", &f64::NAN.into()),
            Err(EncodingError::NonFinite { .. })
        ));
    }

    #[test]
    fn test_numeric_text_parsing() {
        let schema = FeatureSchema::diabetes();
        assert_eq!(schema.encode("Age", &" 42 ".into()), Ok(42.0));
        assert_eq!(
            schema.encode("Age", &"forty".into()),
            Err(EncodingError::NotNumeric {
                field: "Age".to_string(),
                raw: "forty".to_string()
            })
        );
    }

    #[test]
    fn test_allowed_set_and_alias() {
        let schema = FeatureSchema::loan_approval();
        assert_eq!(schema.encode("Dependents", &"3+".into()), Ok(4.0));
        assert_eq!(schema.encode("Dependents", &"2".into()), Ok(2.0));
        assert!(matches!(
            schema.encode("Dependents", &3.0.into()),
            Err(EncodingError::NotAllowed { .. })
        ));
        assert!(matches!(
            schema.encode("Loan_Amount_Term", &100.0.into()),
            Err(EncodingError::NotAllowed { .. })
        ));
        assert!(matches!(
            schema.encode("LoanAmount", &8.0.into()),
            Err(EncodingError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_missing_and_unexpected_fields() {
        let schema = FeatureSchema::diabetes();

        let mut missing = diabetes_record();
        missing.remove("Insulin");
        assert_eq!(
            schema.encode_record(&missing),
            Err(EncodingError::MissingField("Insulin".to_string()))
        );

        let mut extra = diabetes_record();
        extra.insert("Outcome".into(), 1.0.into());
        assert_eq!(
            schema.encode_record(&extra),
            Err(EncodingError::UnexpectedField("Outcome".to_string()))
        );
    }

    #[test]
    fn test_label_spec() {
        let label = LabelSpec::new("Loan_Status", "N", "Y");
        assert_eq!(label.encode("Y"), Some(Label::Positive));
        assert_eq!(label.encode(" N "), Some(Label::Negative));
        assert_eq!(label.encode("y"), None);
    }

    #[test]
    fn test_validation_rejects_non_bijective_table() {
        let fields = vec![FieldSpec::categorical(
            "Married",
            &[("Yes", 1.0), ("No", 1.0)],
        )];
        let result = FeatureSchema::new("bad", 1, fields, LabelSpec::new("y", "0", "1"));
        assert!(matches!(result, Err(ClassifierError::InvalidParameter(_))));
    }

    #[test]
    fn test_validation_rejects_duplicate_fields() {
        let fields = vec![
            FieldSpec::numeric("Age", NumericDomain::range(0.0, 120.0)),
            FieldSpec::numeric("Age", NumericDomain::range(0.0, 120.0)),
        ];
        let result = FeatureSchema::new("bad", 1, fields, LabelSpec::new("y", "0", "1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_label_as_feature() {
        let fields = vec![FieldSpec::numeric("y", NumericDomain::at_least(0.0))];
        let result = FeatureSchema::new("bad", 1, fields, LabelSpec::new("y", "0", "1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(FeatureSchema::diabetes().validate().is_ok());
        assert!(FeatureSchema::loan_approval().validate().is_ok());
    }

    #[test]
    fn test_fingerprint_tracks_definition() {
        let a = FeatureSchema::diabetes();
        let base = a.fingerprint().unwrap();
        assert_eq!(base, a.clone().fingerprint().unwrap());
        assert_eq!(base, FeatureSchema::diabetes().fingerprint().unwrap());
        assert_eq!(base.len(), 64);

        let mut bumped = a.clone();
        bumped.version += 1;
        assert_ne!(base, bumped.fingerprint().unwrap());

        // tightening one bound is a different schema
        let mut tighter = a.clone();
        if let FieldKind::Numeric(domain) = &mut tighter.fields[1].kind {
            domain.max = domain.max.map(|max| max - 1.0);
        }
        assert_ne!(tighter, a);
        assert_ne!(base, tighter.fingerprint().unwrap());

        let mut relabeled = a.clone();
        relabeled.label.positive = "yes".into();
        assert_ne!(base, relabeled.fingerprint().unwrap());
    }

    #[test]
    fn test_slug() {
        assert_eq!(FeatureSchema::loan_approval().slug(), "loan-approval");
        assert_eq!(FeatureSchema::diabetes().slug(), "diabetes");
    }

    #[test]
    fn test_json_file_round_trip() {
        let schema = FeatureSchema::loan_approval();
        let file = tempfile::NamedTempFile::new().unwrap();
        serde_json::to_writer(file.as_file(), &schema).unwrap();

        let loaded = FeatureSchema::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, schema);
    }

    #[test]
    fn test_json_file_with_invalid_schema() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"{"name":"x","version":1,"fields":[],"label":{"column":"y","negative":"0","positive":"1"}}"#,
        )
        .unwrap();
        assert!(FeatureSchema::from_json_file(file.path()).is_err());
    }
}
