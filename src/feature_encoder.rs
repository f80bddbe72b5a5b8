//! Feature encoding for model inference.
//!
//! Turns an applicant record into the exact column layout a model was
//! trained on: categorical fields are expanded into drop-first indicator
//! columns named `{field}_{value}`, then the expansion is aligned against the
//! model's feature schema. Schema columns the expansion lacks are zero-filled,
//! expansion columns the schema lacks are dropped.

use crate::types::applicant::{
    ApplicantRecord, AttributeValue, INCOME_CATEGORICAL_FIELDS, REPAYMENT_CATEGORICAL_FIELDS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Ordered column names a model expects, fixed at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    columns: Vec<String>,
}

impl FeatureSchema {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Fixed-length feature vector aligned to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatureVector {
    columns: Arc<[String]>,
    values: Vec<f64>,
    zero_filled: usize,
}

impl EncodedFeatureVector {
    /// Column names, after sanitization when the encoder applies it.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a column by name.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    /// Number of schema columns with no counterpart in the record's expansion.
    pub fn zero_filled(&self) -> usize {
        self.zero_filled
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

/// Replace every character that is not alphanumeric with an underscore.
pub fn sanitize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// Aligns applicant records to one model's feature schema.
///
/// The same operation serves both models; each instance is parameterized by
/// the model's categorical-field list, its schema and whether column names
/// are sanitized.
#[derive(Debug, Clone)]
pub struct SchemaAligner {
    categorical_fields: Vec<String>,
    schema: FeatureSchema,
    sanitize_names: bool,
    output_columns: Arc<[String]>,
}

impl SchemaAligner {
    pub fn new(categorical_fields: &[&str], schema: FeatureSchema, sanitize_names: bool) -> Self {
        let output_columns: Arc<[String]> = if sanitize_names {
            schema
                .columns()
                .iter()
                .map(|c| sanitize_column_name(c))
                .collect()
        } else {
            schema.columns().iter().cloned().collect()
        };

        Self {
            categorical_fields: categorical_fields.iter().map(|f| f.to_string()).collect(),
            schema,
            sanitize_names,
            output_columns,
        }
    }

    /// Encoder for the repayment model. Its training artifact stored
    /// sanitized column names.
    pub fn repayment(schema: FeatureSchema) -> Self {
        Self::new(&REPAYMENT_CATEGORICAL_FIELDS, schema, true)
    }

    /// Encoder for the income model.
    pub fn income(schema: FeatureSchema) -> Self {
        Self::new(&INCOME_CATEGORICAL_FIELDS, schema, false)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Output column names, in schema order.
    pub fn columns(&self) -> &[String] {
        &self.output_columns
    }

    fn is_encoded_categorical(&self, field: &str) -> bool {
        self.categorical_fields.iter().any(|f| f == field)
    }

    /// Expand a record into named numeric columns.
    ///
    /// Numeric fields keep their name. Categorical fields in this encoder's
    /// list become one indicator per domain value except the first. Absent
    /// fields, non-finite numbers and categorical fields outside the list
    /// produce no columns.
    pub fn expand(&self, record: &ApplicantRecord) -> HashMap<String, f64> {
        let mut expanded = HashMap::new();

        for attribute in record.attributes() {
            match attribute.value {
                Some(AttributeValue::Numeric(v)) if v.is_finite() => {
                    expanded.insert(attribute.name.to_string(), v);
                }
                Some(AttributeValue::Categorical { label, domain })
                    if self.is_encoded_categorical(attribute.name) =>
                {
                    for value in domain.iter().skip(1) {
                        let indicator = if *value == label { 1.0 } else { 0.0 };
                        expanded.insert(format!("{}_{}", attribute.name, value), indicator);
                    }
                }
                _ => {}
            }
        }

        expanded
    }

    /// Encode a record into a vector whose columns exactly match the schema.
    ///
    /// With sanitized names, the schema may list columns either raw or
    /// already sanitized.
    pub fn encode(&self, record: &ApplicantRecord) -> EncodedFeatureVector {
        let mut expanded = self.expand(record);
        if self.sanitize_names {
            expanded = expanded
                .into_iter()
                .map(|(column, value)| (sanitize_column_name(&column), value))
                .collect();
        }
        let mut zero_filled = 0;

        let values: Vec<f64> = self
            .output_columns
            .iter()
            .map(|column| match expanded.get(column) {
                Some(&v) => v,
                None => {
                    zero_filled += 1;
                    0.0
                }
            })
            .collect();

        if zero_filled > 0 {
            debug!(
                zero_filled = zero_filled,
                columns = values.len(),
                "Schema columns zero-filled during alignment"
            );
        }

        EncodedFeatureVector {
            columns: self.output_columns.clone(),
            values,
            zero_filled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::applicant::{Education, Sector, YesNo};

    fn repayment_schema() -> FeatureSchema {
        FeatureSchema::new([
            "Age",
            "Income",
            "LoanAmount",
            "Education_High School",
            "Education_Master's",
            "Education_PhD",
            "HasMortgage_Yes",
            "HasCoSigner_Yes",
        ])
    }

    fn income_schema() -> FeatureSchema {
        FeatureSchema::new([
            "household_size_calculated",
            "fuel_expenditure",
            "Sector_Urban",
            "Land_Ownership_Yes",
            "Religion_of_HH_Head_Muslim",
        ])
    }

    #[test]
    fn test_encoded_vector_matches_schema_order() {
        let encoder = SchemaAligner::repayment(repayment_schema());
        let record = ApplicantRecord {
            education: Some(Education::Masters),
            ..ApplicantRecord::example()
        };

        let vector = encoder.encode(&record);

        assert_eq!(vector.len(), 8);
        assert_eq!(
            vector.values(),
            &[45.0, 500_000.0, 100_000.0, 0.0, 1.0, 0.0, 1.0, 0.0]
        );
        assert_eq!(vector.zero_filled(), 0);
    }

    #[test]
    fn test_repayment_columns_are_sanitized() {
        let encoder = SchemaAligner::repayment(repayment_schema());
        let vector = encoder.encode(&ApplicantRecord::example());

        assert_eq!(vector.columns()[3], "Education_High_School");
        assert_eq!(vector.columns()[4], "Education_Master_s");
        assert_eq!(vector.get("Education_Master_s"), Some(0.0));
    }

    #[test]
    fn test_pre_sanitized_schema_encodes_identically() {
        let sanitized = FeatureSchema::new(
            repayment_schema()
                .columns()
                .iter()
                .map(|c| sanitize_column_name(c)),
        );
        let record = ApplicantRecord {
            education: Some(Education::Masters),
            ..ApplicantRecord::example()
        };

        let raw = SchemaAligner::repayment(repayment_schema()).encode(&record);
        let pre = SchemaAligner::repayment(sanitized).encode(&record);
        assert_eq!(raw.values(), pre.values());
        assert_eq!(raw.columns(), pre.columns());
    }

    #[test]
    fn test_income_columns_keep_schema_names() {
        let encoder = SchemaAligner::income(income_schema());
        let vector = encoder.encode(&ApplicantRecord::example());

        assert_eq!(vector.columns(), income_schema().columns());
        assert_eq!(vector.values(), &[5.0, 1_250.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_first_category_is_dropped() {
        let encoder = SchemaAligner::income(income_schema());
        let expanded = encoder.expand(&ApplicantRecord {
            sector: Some(Sector::Rural),
            ..ApplicantRecord::example()
        });

        assert!(!expanded.contains_key("Sector_Rural"));
        assert_eq!(expanded.get("Sector_Urban"), Some(&0.0));
    }

    #[test]
    fn test_other_models_categoricals_are_not_expanded() {
        let encoder = SchemaAligner::repayment(repayment_schema());
        let expanded = encoder.expand(&ApplicantRecord::example());

        assert!(expanded.keys().all(|k| !k.starts_with("Sector")));
        assert!(expanded.contains_key("HasMortgage_Yes"));
    }

    #[test]
    fn test_missing_categorical_zero_fills_its_indicators() {
        let encoder = SchemaAligner::repayment(repayment_schema());
        let record = ApplicantRecord {
            education: None,
            has_mortgage: None,
            ..ApplicantRecord::example()
        };

        let vector = encoder.encode(&record);

        assert_eq!(vector.len(), repayment_schema().len());
        assert_eq!(vector.get("Education_High_School"), Some(0.0));
        assert_eq!(vector.get("Education_Master_s"), Some(0.0));
        assert_eq!(vector.get("Education_PhD"), Some(0.0));
        assert_eq!(vector.get("HasMortgage_Yes"), Some(0.0));
        assert_eq!(vector.zero_filled(), 4);
    }

    #[test]
    fn test_missing_numeric_zero_fills() {
        let encoder = SchemaAligner::income(income_schema());
        let record = ApplicantRecord {
            fuel_expenditure: None,
            land_ownership: Some(YesNo::No),
            ..ApplicantRecord::example()
        };

        let vector = encoder.encode(&record);
        assert_eq!(vector.get("fuel_expenditure"), Some(0.0));
        assert_eq!(vector.get("Land_Ownership_Yes"), Some(0.0));
        assert_eq!(vector.zero_filled(), 1);
    }

    #[test]
    fn test_empty_record_encodes_to_zeros() {
        let encoder = SchemaAligner::income(income_schema());
        let vector = encoder.encode(&ApplicantRecord::default());

        assert_eq!(vector.values(), &[0.0; 5]);
        assert_eq!(vector.zero_filled(), 5);
    }

    #[test]
    fn test_unknown_schema_column_is_zero() {
        let encoder = SchemaAligner::income(FeatureSchema::new(["not_a_field", "Sector_Urban"]));
        let vector = encoder.encode(&ApplicantRecord::example());
        assert_eq!(vector.values(), &[0.0, 0.0]);
    }

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("Education_Bachelor's"), "Education_Bachelor_s");
        assert_eq!(
            sanitize_column_name("LoanPurpose_Debt Consolidation"),
            "LoanPurpose_Debt_Consolidation"
        );
        assert_eq!(sanitize_column_name("EmploymentType_Self-employed"), "EmploymentType_Self_employed");
        assert_eq!(sanitize_column_name("Age"), "Age");
    }

    #[test]
    fn test_schema_deserializes_from_json_array() {
        let schema: FeatureSchema = serde_json::from_str(r#"["Age", "Income"]"#).unwrap();
        assert_eq!(schema.columns(), &["Age".to_string(), "Income".to_string()]);
    }
}
