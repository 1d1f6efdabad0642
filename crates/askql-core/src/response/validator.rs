//! Hallucination guard: the final check that an answer is grounded.
//!
//! Every number the model emitted must appear in the executed rows within
//! ±0.01, after stripping currency symbols, thousands separators, percent
//! signs and accounting parentheses. Column references must name real
//! columns. Failures at error level cause the orchestrator to replace the
//! answer with the generic fallback.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::db::types::scalar_as_f64;
use crate::executor::QueryResult;

/// Tolerance for matching response numbers against data numbers.
pub const NUMERIC_TOLERANCE: f64 = 0.01;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Optional accounting paren, optional currency, digits with optional
    // thousands separators and decimals, optional closing paren and percent.
    Regex::new(r"(\()?[$€£]?\s?(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+\.\d+|\d+)(\))?\s?(%)?")
        .expect("number extraction regex")
});

static COLUMN_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:column|field|metric|dimension)\s+['"`]?([A-Za-z_][A-Za-z0-9_]*)['"`]?"#)
        .expect("column reference regex")
});

/// Phrases that make an empty-result answer legitimate.
const NO_DATA_PHRASES: &[&str] = &[
    "no data",
    "no rows",
    "no results",
    "no matching",
    "nothing matched",
    "couldn't find",
    "could not find",
    "don't have",
    "do not have",
];

/// How much to trust the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Everything checked out.
    High,
    /// Minor mismatches; answer stands with caveats.
    Medium,
    /// Grounding failed; answer must be replaced.
    Low,
}

/// Result of validating one answer.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseValidation {
    /// False when any error-level finding exists.
    pub is_valid: bool,

    /// Non-fatal findings.
    pub warnings: Vec<String>,

    /// Fatal findings; the answer is not grounded.
    pub errors: Vec<String>,

    /// Rolled-up confidence.
    pub confidence: Confidence,
}

/// A number extracted from answer text, normalized to a signed double.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedNumber {
    /// The normalized value; accounting parentheses negate.
    pub value: f64,
    /// True when a `%` suffix was attached.
    pub is_percent: bool,
}

/// Pull every number out of answer text.
#[must_use]
pub fn extract_numbers(text: &str) -> Vec<ExtractedNumber> {
    let mut numbers = Vec::new();
    for caps in NUMBER_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match always has group 0");

        // Skip identifiers like "Q1" or "v2": a letter, digit or dot right
        // before the match means this is not a standalone number.
        if let Some(previous) = text[..whole.start()].chars().last() {
            if previous.is_alphanumeric() || previous == '.' || previous == '_' {
                continue;
            }
        }

        let raw = caps[2].replace(',', "");
        let Ok(mut value) = raw.parse::<f64>() else {
            continue;
        };
        let negated = caps.get(1).is_some() && caps.get(3).is_some();
        if negated {
            value = -value;
        }
        numbers.push(ExtractedNumber {
            value,
            is_percent: caps.get(4).is_some(),
        });
    }
    numbers
}

/// Every numeric value present in the rows (numeric strings included).
#[must_use]
pub fn data_numbers(result: &QueryResult) -> Vec<f64> {
    result
        .rows
        .iter()
        .flat_map(|row| row.values())
        .filter_map(scalar_as_f64)
        .collect()
}

fn matches_any(value: f64, haystack: &[f64]) -> bool {
    haystack.iter().any(|candidate| (candidate - value).abs() <= NUMERIC_TOLERANCE)
}

fn is_no_data_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    NO_DATA_PHRASES.iter().any(|p| lower.contains(p))
}

/// Validate an answer against the rows that produced it.
#[must_use]
pub fn validate(text: &str, result: &QueryResult, _question: &str) -> ResponseValidation {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let response_numbers = extract_numbers(text);
    let grounded = data_numbers(result);

    if !response_numbers.is_empty() {
        if result.row_count == 0 && !is_no_data_text(text) {
            errors.push(
                "answer cites specific numbers but the query returned no rows".to_string(),
            );
        } else {
            let unmatched: Vec<&ExtractedNumber> = response_numbers
                .iter()
                .filter(|n| !matches_any(n.value, &grounded))
                .collect();

            if !unmatched.is_empty() {
                if response_numbers.len() == 1 {
                    errors.push("the answer's only number does not appear in the data".to_string());
                } else if unmatched.len() == response_numbers.len() {
                    errors.push(format!(
                        "none of the {} numbers in the answer appear in the data",
                        response_numbers.len()
                    ));
                } else {
                    for number in unmatched {
                        warnings.push(format!(
                            "the value {} does not appear in the data",
                            number.value
                        ));
                    }
                }
            }
        }
    }

    check_column_references(text, result, &mut warnings);

    let confidence = if !errors.is_empty() {
        Confidence::Low
    } else if !warnings.is_empty() {
        Confidence::Medium
    } else {
        Confidence::High
    };

    ResponseValidation {
        is_valid: errors.is_empty(),
        warnings,
        errors,
        confidence,
    }
}

/// Referenced columns must exist, case-insensitively; fuzzy substring
/// matches are accepted.
fn check_column_references(text: &str, result: &QueryResult, warnings: &mut Vec<String>) {
    let columns: Vec<String> = result
        .rows
        .first()
        .map(|row| row.keys().map(|k| k.to_lowercase()).collect())
        .unwrap_or_default();
    if columns.is_empty() {
        return;
    }

    for caps in COLUMN_REF_RE.captures_iter(text) {
        let referenced = caps[1].to_lowercase();
        let known = columns
            .iter()
            .any(|c| c == &referenced || c.contains(&referenced) || referenced.contains(c.as_str()));
        if !known {
            warnings.push(format!("the answer references an unknown column '{}'", &caps[1]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    use crate::db::types::Row;

    fn result_with(values: &[(&str, serde_json::Value)]) -> QueryResult {
        let mut row: Row = IndexMap::new();
        for (name, value) in values {
            row.insert((*name).to_string(), value.clone());
        }
        QueryResult::from_rows(vec![row], vec!["sales".to_string()], 100)
    }

    // ========================================================================
    // Number extraction
    // ========================================================================

    #[test]
    fn test_extracts_plain_and_decimal() {
        let numbers = extract_numbers("Revenue was 1500 across 3.5 months");
        assert_eq!(numbers.len(), 2);
        assert_eq!(numbers[0].value, 1500.0);
        assert_eq!(numbers[1].value, 3.5);
    }

    #[test]
    fn test_extracts_currency_and_commas() {
        let numbers = extract_numbers("Total revenue reached $1,234,567.89 this quarter");
        assert_eq!(numbers.len(), 1);
        assert!((numbers[0].value - 1_234_567.89).abs() < 1e-9);
    }

    #[test]
    fn test_extracts_percent() {
        let numbers = extract_numbers("Growth of 12.5% month over month");
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].value, 12.5);
        assert!(numbers[0].is_percent);
    }

    #[test]
    fn test_accounting_parentheses_negate() {
        let numbers = extract_numbers("A net change of (2,500) on the quarter");
        assert_eq!(numbers.len(), 1);
        assert_eq!(numbers[0].value, -2500.0);
    }

    #[test]
    fn test_quarter_labels_not_numbers() {
        let numbers = extract_numbers("Q1 outperformed Q2");
        assert!(numbers.is_empty());
    }

    // ========================================================================
    // Grounding
    // ========================================================================

    #[test]
    fn test_grounded_answer_high_confidence() {
        let result = result_with(&[("product", json!("widget")), ("total_revenue", json!(1500))]);
        let validation = validate("Widget leads with 1500 in revenue.", &result, "top product?");
        assert!(validation.is_valid);
        assert_eq!(validation.confidence, Confidence::High);
    }

    #[test]
    fn test_tolerance_of_a_cent() {
        let result = result_with(&[("total", json!(1500.004))]);
        let validation = validate("The total is 1500.", &result, "total?");
        assert!(validation.is_valid);
    }

    #[test]
    fn test_fabricated_number_fails() {
        let result = result_with(&[("total_revenue", json!(1500))]);
        let validation = validate("Revenue hit 9999 this month.", &result, "revenue?");
        assert!(!validation.is_valid);
        assert_eq!(validation.confidence, Confidence::Low);
        assert_eq!(
            validation.errors,
            vec!["the answer's only number does not appear in the data".to_string()]
        );
    }

    #[test]
    fn test_all_numbers_unmatched_names_the_count() {
        let result = result_with(&[("total_revenue", json!(1500))]);
        let validation = validate("Totals were 9999 and 8888.", &result, "totals?");
        assert!(!validation.is_valid);
        assert_eq!(
            validation.errors,
            vec!["none of the 2 numbers in the answer appear in the data".to_string()]
        );
    }

    #[test]
    fn test_numeric_string_cells_ground_numbers() {
        let result = result_with(&[("total", json!("1500.00"))]);
        let validation = validate("The total is 1500.", &result, "total?");
        assert!(validation.is_valid);
    }

    #[test]
    fn test_partial_mismatch_warns() {
        let result = result_with(&[("a", json!(100)), ("b", json!(200))]);
        let validation = validate("Values were 100, 200 and 999.", &result, "values?");
        assert!(validation.is_valid);
        assert_eq!(validation.confidence, Confidence::Medium);
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn test_numbers_with_empty_result_fail() {
        let result = QueryResult::empty(vec!["sales".to_string()]);
        let validation = validate("You sold exactly 42 units.", &result, "units?");
        assert!(!validation.is_valid);
    }

    #[test]
    fn test_no_data_apology_with_empty_result_passes() {
        let result = QueryResult::empty(vec!["sales".to_string()]);
        let validation =
            validate("I found no data matching that period.", &result, "units in 1999?");
        assert!(validation.is_valid);
    }

    #[test]
    fn test_numberless_answer_passes() {
        let result = result_with(&[("product", json!("widget"))]);
        let validation = validate("Widget is your best seller.", &result, "top product?");
        assert!(validation.is_valid);
        assert_eq!(validation.confidence, Confidence::High);
    }

    // ========================================================================
    // Column references
    // ========================================================================

    #[test]
    fn test_known_column_reference_ok() {
        let result = result_with(&[("total_revenue", json!(10))]);
        let validation =
            validate("The metric total_revenue is 10.", &result, "revenue?");
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn test_fuzzy_column_reference_ok() {
        let result = result_with(&[("total_revenue", json!(10))]);
        let validation = validate("See the column revenue, at 10.", &result, "revenue?");
        assert!(validation.warnings.is_empty());
    }

    #[test]
    fn test_unknown_column_reference_warns() {
        let result = result_with(&[("total_revenue", json!(10))]);
        let validation = validate("The column margin shows 10.", &result, "margin?");
        assert_eq!(validation.warnings.len(), 1);
        assert_eq!(validation.confidence, Confidence::Medium);
    }
}
