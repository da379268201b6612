//! Result types returned by an extraction run.

use crate::config::FieldList;
use crate::error::DocumentError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the first column of every result table.
pub const FILE_NAME_COLUMN: &str = "file_name";

/// The parsed key/value result for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub file_name: String,
    /// Values for the requested fields; absent fields are stored as `null`.
    pub values: Map<String, Value>,
    /// Requested fields the model left out of its reply.
    pub missing_fields: Vec<String>,
    /// Model calls spent on this document (1 + re-prompts used).
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl ExtractionRecord {
    /// Value for `field`, or `None` if it is missing or null.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).filter(|v| !v.is_null())
    }
}

/// Tabular view of the records destined for export.
///
/// `columns` is `file_name` followed by the requested fields in request order;
/// each row has exactly `columns.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Assemble the table from successfully parsed records, in record order.
    pub fn from_records(fields: &FieldList, records: &[ExtractionRecord]) -> Self {
        let columns: Vec<String> = std::iter::once(FILE_NAME_COLUMN.to_string())
            .chain(fields.iter().map(str::to_string))
            .collect();

        let rows = records
            .iter()
            .map(|rec| {
                let file_name = Value::String(rec.file_name.clone());
                std::iter::once(file_name.clone())
                    .chain(fields.iter().map(|f| {
                        if f == FILE_NAME_COLUMN {
                            file_name.clone()
                        } else {
                            rec.values.get(f).cloned().unwrap_or(Value::Null)
                        }
                    }))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Share of rows with a non-null, non-empty value in `column`.
    ///
    /// `None` when the column does not exist or the table has no rows.
    pub fn fill_rate(&self, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        if self.rows.is_empty() {
            return None;
        }
        let filled = self
            .rows
            .iter()
            .filter(|row| match &row[idx] {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
            .count();
        Some(filled as f64 / self.rows.len() as f64)
    }
}

/// Fill rate of one requested field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFillRate {
    pub field: String,
    /// 0.0–1.0.
    pub rate: f64,
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total_documents: usize,
    pub extracted_documents: usize,
    pub failed_documents: usize,
    /// Per requested field, in request order (duplicates listed once).
    pub field_fill_rates: Vec<FieldFillRate>,
    /// Records whose values were swapped by the score-order correction.
    pub swapped_scores: usize,
    /// Documents whose text was cut to the configured cap.
    pub truncated_documents: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub text_duration_ms: u64,
    /// Time spent waiting on model calls only.
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl ExtractionStats {
    /// Parsed documents as a percentage of all documents in the batch.
    ///
    /// Failed documents stay in the denominator.
    pub fn success_percentage(&self) -> f64 {
        if self.total_documents == 0 {
            return 0.0;
        }
        self.extracted_documents as f64 / self.total_documents as f64 * 100.0
    }

    /// Fill rate of `field` as a percentage, if the field was requested.
    pub fn fill_percentage(&self, field: &str) -> Option<f64> {
        self.field_fill_rates
            .iter()
            .find(|r| r.field == field)
            .map(|r| r.rate * 100.0)
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub table: ResultTable,
    pub records: Vec<ExtractionRecord>,
    pub failures: Vec<DocumentError>,
    pub stats: ExtractionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(file: &str, values: Value) -> ExtractionRecord {
        ExtractionRecord {
            file_name: file.into(),
            values: values.as_object().cloned().unwrap_or_default(),
            missing_fields: vec![],
            attempts: 1,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn table_columns_follow_request_order() {
        let fields = FieldList::parse("postcode,address").unwrap();
        let recs = [record(
            "doc1.pdf",
            json!({"address": "1 Main St", "postcode": "AB1 2CD"}),
        )];
        let t = ResultTable::from_records(&fields, &recs);
        assert_eq!(t.columns, ["file_name", "postcode", "address"]);
        assert_eq!(t.rows[0], vec![json!("doc1.pdf"), json!("AB1 2CD"), json!("1 Main St")]);
    }

    #[test]
    fn single_field_gives_two_columns() {
        let fields = FieldList::parse("address").unwrap();
        let t = ResultTable::from_records(&fields, &[record("a.pdf", json!({"address": "x"}))]);
        assert_eq!(t.column_count(), 2);
    }

    #[test]
    fn missing_values_become_null() {
        let fields = FieldList::parse("address,postcode").unwrap();
        let t = ResultTable::from_records(&fields, &[record("a.pdf", json!({"address": "x"}))]);
        assert_eq!(t.rows[0][2], Value::Null);
    }

    #[test]
    fn duplicate_fields_repeat_the_value() {
        let fields = FieldList::parse("address,address").unwrap();
        let t = ResultTable::from_records(&fields, &[record("a.pdf", json!({"address": "x"}))]);
        assert_eq!(t.rows[0], vec![json!("a.pdf"), json!("x"), json!("x")]);
    }

    #[test]
    fn file_name_field_is_not_overridden_by_model() {
        let fields = FieldList::parse("file_name").unwrap();
        let t = ResultTable::from_records(
            &fields,
            &[record("real.pdf", json!({"file_name": "invented.pdf"}))],
        );
        assert_eq!(t.rows[0], vec![json!("real.pdf"), json!("real.pdf")]);
    }

    #[test]
    fn fill_rate_ignores_null_and_blank() {
        let fields = FieldList::parse("energy_rating").unwrap();
        let recs = [
            record("a.pdf", json!({"energy_rating": "C"})),
            record("b.pdf", json!({"energy_rating": null})),
            record("c.pdf", json!({"energy_rating": "  "})),
            record("d.pdf", json!({"energy_rating": "B"})),
        ];
        let t = ResultTable::from_records(&fields, &recs);
        assert_eq!(t.fill_rate("energy_rating"), Some(0.5));
        assert_eq!(t.fill_rate("nope"), None);
    }

    #[test]
    fn success_percentage_counts_failures_in_denominator() {
        let stats = ExtractionStats {
            total_documents: 4,
            extracted_documents: 3,
            failed_documents: 1,
            ..Default::default()
        };
        assert_eq!(stats.success_percentage(), 75.0);
        assert_eq!(ExtractionStats::default().success_percentage(), 0.0);
    }
}
