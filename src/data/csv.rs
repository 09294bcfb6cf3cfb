//! CSV loading for labeled training tables
//!
//! Supports files where:
//! - The first non-comment line is a header naming the columns
//! - Every schema field and the label column appear in the header (exact,
//!   case-sensitive match); extra columns such as IDs are ignored
//! - Lines starting with `#` and blank lines are skipped

use crate::core::{ClassifierError, Result, Sample};
use crate::data::LabeledDataset;
use crate::schema::{FeatureSchema, RawRecord, RawValue};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Options controlling how tolerant the loader is
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Skip rows with an empty cell in a required column instead of failing
    pub skip_incomplete_rows: bool,
}

impl LabeledDataset {
    /// Load a dataset from a CSV file, encoding every row through the schema
    pub fn from_csv_file<P: AsRef<Path>>(
        path: P,
        schema: &FeatureSchema,
        options: LoadOptions,
    ) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let dataset = Self::from_csv_reader(BufReader::new(file), schema, options)?;
        info!(
            "Loaded {} samples from {:?}",
            dataset.samples().len(),
            path.as_ref()
        );
        Ok(dataset)
    }

    /// Load a dataset from any buffered reader
    pub fn from_csv_reader<R: BufRead>(
        reader: R,
        schema: &FeatureSchema,
        options: LoadOptions,
    ) -> Result<Self> {
        let mut lines = reader.lines().enumerate();

        let header = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    let line = line.trim();
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }
                    break split_fields(line);
                }
                None => return Err(ClassifierError::EmptyDataset),
            }
        };

        let columns = ColumnMap::resolve(&header, schema)?;
        debug!("Resolved {} schema columns from header", schema.len());

        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in lines {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let cells = split_fields(line);
            if cells.len() != header.len() {
                return Err(ClassifierError::Dataset(format!(
                    "line {line_no}: expected {} fields, found {}",
                    header.len(),
                    cells.len()
                )));
            }

            if let Some(column) = columns.first_empty(&cells) {
                if options.skip_incomplete_rows {
                    skipped += 1;
                    continue;
                }
                return Err(ClassifierError::Dataset(format!(
                    "line {line_no}: empty value for '{column}'"
                )));
            }

            samples.push(columns.parse_row(&cells, schema, line_no)?);
        }

        if skipped > 0 {
            warn!("Skipped {skipped} incomplete rows");
        }
        if samples.is_empty() {
            return Err(ClassifierError::EmptyDataset);
        }

        Self::new(schema.field_names(), samples)
    }
}

/// Header positions of the schema fields and the label column
struct ColumnMap {
    fields: Vec<(String, usize)>,
    label: usize,
}

impl ColumnMap {
    fn resolve(header: &[String], schema: &FeatureSchema) -> Result<Self> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, name) in header.iter().enumerate() {
            if positions.insert(name.as_str(), i).is_some() {
                return Err(ClassifierError::Dataset(format!(
                    "duplicate column '{name}' in header"
                )));
            }
        }

        let lookup = |name: &str| {
            positions
                .get(name)
                .copied()
                .ok_or_else(|| ClassifierError::Dataset(format!("missing column '{name}'")))
        };

        let fields = schema
            .fields()
            .iter()
            .map(|f| lookup(&f.name).map(|pos| (f.name.clone(), pos)))
            .collect::<Result<Vec<_>>>()?;
        let label = lookup(&schema.label().column)?;

        Ok(Self { fields, label })
    }

    fn first_empty(&self, cells: &[String]) -> Option<&str> {
        if cells[self.label].is_empty() {
            return Some("label");
        }
        self.fields
            .iter()
            .find(|(_, pos)| cells[*pos].is_empty())
            .map(|(name, _)| name.as_str())
    }

    fn parse_row(&self, cells: &[String], schema: &FeatureSchema, line_no: usize) -> Result<Sample> {
        let record: RawRecord = self
            .fields
            .iter()
            .map(|(name, pos)| (name.clone(), RawValue::Text(cells[*pos].clone())))
            .collect();

        let features = schema
            .encode_record(&record)
            .map_err(|e| ClassifierError::Dataset(format!("line {line_no}: {e}")))?;

        let raw_label = &cells[self.label];
        let label = schema.label().encode(raw_label).ok_or_else(|| {
            ClassifierError::Dataset(format!(
                "line {line_no}: label {raw_label:?} is neither {:?} nor {:?}",
                schema.label().negative,
                schema.label().positive
            ))
        })?;

        Ok(Sample::new(features.into_inner(), label))
    }
}

/// Split a CSV line, honouring double-quoted fields
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dataset, Label};
    use std::io::Cursor;

    const LOAN_HEADER: &str = "Loan_ID,Gender,Married,Dependents,Education,Self_Employed,ApplicantIncome,CoapplicantIncome,LoanAmount,Loan_Amount_Term,Credit_History,Property_Area,Loan_Status";

    fn load(data: &str, options: LoadOptions) -> Result<LabeledDataset> {
        LabeledDataset::from_csv_reader(Cursor::new(data), &FeatureSchema::loan_approval(), options)
    }

    #[test]
    fn test_loan_csv_basic() {
        let data = format!(
            "{LOAN_HEADER}\n\
             LP001,Male,Yes,1,Graduate,No,4583,1508,128,360,1,Rural,N\n\
             LP002,Female,No,3+,Not Graduate,Yes,3000,0,66,360,0,Urban,Y\n"
        );
        let dataset = load(&data, LoadOptions::default()).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.dim(), 11);
        assert_eq!(
            dataset.get_sample(0).features,
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 4583.0, 1508.0, 128.0, 360.0, 1.0, 0.0]
        );
        assert_eq!(dataset.get_sample(1).features[2], 4.0);
        assert_eq!(dataset.get_labels(), vec![Label::Negative, Label::Positive]);
    }

    #[test]
    fn test_column_order_does_not_matter() {
        let data = "Outcome,Age,DiabetesPedigreeFunction,BMI,Insulin,SkinThickness,BloodPressure,Glucose,Pregnancies\n\
                    1,50,0.627,33.6,0,35,72,148,6\n";
        let dataset = LabeledDataset::from_csv_reader(
            Cursor::new(data),
            &FeatureSchema::diabetes(),
            LoadOptions::default(),
        )
        .unwrap();

        assert_eq!(
            dataset.get_sample(0).features,
            vec![6.0, 148.0, 72.0, 35.0, 0.0, 33.6, 0.627, 50.0]
        );
        assert_eq!(dataset.get_sample(0).label, Label::Positive);
    }

    #[test]
    fn test_missing_column() {
        let data = "Pregnancies,Glucose,Outcome\n1,100,0\n";
        let result = LabeledDataset::from_csv_reader(
            Cursor::new(data),
            &FeatureSchema::diabetes(),
            LoadOptions::default(),
        );
        match result {
            Err(ClassifierError::Dataset(msg)) => assert!(msg.contains("BloodPressure")),
            other => panic!("expected dataset error, got {other:?}"),
        }
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let data = LOAN_HEADER.replace("Gender", "gender") + "\n";
        assert!(matches!(
            load(&data, LoadOptions::default()),
            Err(ClassifierError::Dataset(_))
        ));
    }

    #[test]
    fn test_label_outside_classes() {
        let data = format!("{LOAN_HEADER}\nLP001,Male,Yes,1,Graduate,No,4583,1508,128,360,1,Rural,Maybe\n");
        match load(&data, LoadOptions::default()) {
            Err(ClassifierError::Dataset(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected dataset error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_cell_names_line() {
        let data = format!("{LOAN_HEADER}\nLP001,Robot,Yes,1,Graduate,No,4583,1508,128,360,1,Rural,Y\n");
        match load(&data, LoadOptions::default()) {
            Err(ClassifierError::Dataset(msg)) => {
                assert!(msg.contains("line 2"));
                assert!(msg.contains("Gender"));
            }
            other => panic!("expected dataset error, got {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_rows() {
        let data = format!(
            "{LOAN_HEADER}\n\
             LP001,Male,Yes,1,Graduate,No,4583,1508,,360,1,Rural,N\n\
             LP002,Male,Yes,0,Graduate,No,3000,0,66,360,1,Urban,Y\n"
        );

        assert!(matches!(
            load(&data, LoadOptions::default()),
            Err(ClassifierError::Dataset(_))
        ));

        let dataset = load(
            &data,
            LoadOptions {
                skip_incomplete_rows: true,
            },
        )
        .unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.get_sample(0).label, Label::Positive);
    }

    #[test]
    fn test_wrong_field_count() {
        let data = format!("{LOAN_HEADER}\nLP001,Male,Yes\n");
        assert!(matches!(
            load(&data, LoadOptions::default()),
            Err(ClassifierError::Dataset(_))
        ));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matches!(
            load("", LoadOptions::default()),
            Err(ClassifierError::EmptyDataset)
        ));
        assert!(matches!(
            load(&format!("# comment\n{LOAN_HEADER}\n\n"), LoadOptions::default()),
            Err(ClassifierError::EmptyDataset)
        ));
    }

    #[test]
    fn test_split_fields_quotes() {
        assert_eq!(split_fields("a, b ,c"), vec!["a", "b", "c"]);
        assert_eq!(
            split_fields(r#""Not Graduate","x,y","say ""hi""""#),
            vec!["Not Graduate", "x,y", r#"say "hi""#]
        );
        assert_eq!(split_fields("a,,b"), vec!["a", "", "b"]);
    }
}
