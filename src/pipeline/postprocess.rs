//! Post-processing: correct the current/potential score ordering.
//!
//! A certificate's potential score is at least its current score. Models
//! sometimes swap the two columns when reading the rating graphic; when both
//! values are numeric and current > potential, the two values are exchanged.
//! Nothing else is touched: no range check, no change to non-numeric values.

use crate::config::ScorePair;
use crate::output::ExtractionRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());

/// Numeric reading of a cell: JSON numbers, or strings that are a plain number.
pub fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim();
            if RE_NUMBER.is_match(t) {
                t.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Swap the score pair in every record where current > potential.
///
/// Returns how many records were changed. Record order is preserved.
pub fn enforce_score_order(records: &mut [ExtractionRecord], pair: &ScorePair) -> usize {
    let mut swapped = 0;
    for rec in records.iter_mut() {
        if swap_if_inverted(rec, &pair.current_score, &pair.potential_score) {
            debug!(
                "{}: swapped {} and {}",
                rec.file_name, pair.current_score, pair.potential_score
            );
            swapped += 1;
        }
    }
    swapped
}

fn swap_if_inverted(rec: &mut ExtractionRecord, current: &str, potential: &str) -> bool {
    let (Some(cur), Some(pot)) = (
        rec.values.get(current).and_then(numeric_value),
        rec.values.get(potential).and_then(numeric_value),
    ) else {
        return false;
    };
    if cur <= pot {
        return false;
    }

    let cur_value = rec.values.remove(current).unwrap_or(Value::Null);
    let pot_value = rec.values.remove(potential).unwrap_or(Value::Null);
    rec.values.insert(current.to_string(), pot_value);
    rec.values.insert(potential.to_string(), cur_value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(values: Value) -> ExtractionRecord {
        ExtractionRecord {
            file_name: "cert.pdf".into(),
            values: values.as_object().cloned().unwrap_or_default(),
            missing_fields: vec![],
            attempts: 1,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    #[test]
    fn inverted_scores_are_swapped() {
        let mut recs = vec![record(json!({"energy_score": 81, "potential_energy_score": 64}))];
        let n = enforce_score_order(&mut recs, &ScorePair::default());
        assert_eq!(n, 1);
        assert_eq!(recs[0].values["energy_score"], json!(64));
        assert_eq!(recs[0].values["potential_energy_score"], json!(81));
    }

    #[test]
    fn ordered_scores_are_untouched() {
        let original = record(json!({"energy_score": 64, "potential_energy_score": 64}));
        let mut recs = vec![original.clone()];
        assert_eq!(enforce_score_order(&mut recs, &ScorePair::default()), 0);
        assert_eq!(recs[0], original);
    }

    #[test]
    fn numeric_strings_count_and_keep_their_form() {
        let mut recs = vec![record(json!({"energy_score": "90", "potential_energy_score": "75"}))];
        enforce_score_order(&mut recs, &ScorePair::default());
        assert_eq!(recs[0].values["energy_score"], json!("75"));
        assert_eq!(recs[0].values["potential_energy_score"], json!("90"));
    }

    #[test]
    fn non_numeric_or_missing_values_are_skipped() {
        let mut recs = vec![
            record(json!({"energy_score": "n/a", "potential_energy_score": 10})),
            record(json!({"energy_score": 50})),
            record(json!({"energy_score": null, "potential_energy_score": 10})),
        ];
        let before = recs.clone();
        assert_eq!(enforce_score_order(&mut recs, &ScorePair::default()), 0);
        assert_eq!(recs, before);
    }

    #[test]
    fn law_holds_after_pass() {
        let pairs = [(1, 100), (100, 1), (55, 55), (72, 68), (0, 3)];
        let mut recs: Vec<_> = pairs
            .iter()
            .map(|(c, p)| record(json!({"energy_score": c, "potential_energy_score": p})))
            .collect();
        enforce_score_order(&mut recs, &ScorePair::default());
        for r in &recs {
            let c = numeric_value(&r.values["energy_score"]).unwrap();
            let p = numeric_value(&r.values["potential_energy_score"]).unwrap();
            assert!(c <= p, "{c} > {p}");
        }
    }

    #[test]
    fn numeric_value_parsing() {
        assert_eq!(numeric_value(&json!(12)), Some(12.0));
        assert_eq!(numeric_value(&json!(" 7.5 ")), Some(7.5));
        assert_eq!(numeric_value(&json!("C")), None);
        assert_eq!(numeric_value(&json!("NaN")), None);
        assert_eq!(numeric_value(&json!(true)), None);
    }
}
