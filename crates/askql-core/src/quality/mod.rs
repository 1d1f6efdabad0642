//! Post-query row inspection.
//!
//! Six checks over one result set: per-column nulls, per-column empty
//! strings (distinct from nulls), mixed scalar types, invalid date strings
//! in date-named columns, numeric outliers beyond three standard deviations,
//! and whole-row duplicates. Findings roll up into one disclosure sentence
//! the orchestrator prepends to the answer.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::db::types::{Row, scalar_as_f64};

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth knowing, not worth a caveat.
    Info,
    /// The answer deserves a caveat.
    Warning,
    /// The data is too damaged to trust silently.
    Critical,
}

/// What kind of problem a finding describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Null cells in a column.
    Nulls,
    /// Empty-string cells in a column.
    EmptyStrings,
    /// A column mixing numbers, strings or booleans.
    MixedTypes,
    /// Unparseable date strings in a date-named column.
    InvalidDates,
    /// Values beyond three standard deviations.
    Outliers,
    /// Identical whole rows.
    DuplicateRows,
}

/// One finding.
#[derive(Debug, Clone, Serialize)]
pub struct QualityIssue {
    /// Problem class.
    pub kind: IssueKind,

    /// Rolled-up severity.
    pub severity: Severity,

    /// Affected column; `None` for whole-row findings.
    pub column: Option<String>,

    /// Cells or rows affected.
    pub affected_count: usize,

    /// Cells or rows inspected.
    pub total_count: usize,

    /// `affected_count / total_count`, in percent.
    pub percentage: f64,

    /// Human description used in the disclosure.
    pub description: String,
}

/// The report for one result set.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DataQualityReport {
    /// All findings, worst first.
    pub issues: Vec<QualityIssue>,

    /// Leading caveat for the answer; present only when a warning or
    /// critical finding exists.
    pub disclosure_message: Option<String>,

    /// Rows untouched by any cell-level finding.
    pub complete_records: usize,
}

impl DataQualityReport {
    /// The worst severity present, if any finding exists.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

/// Outliers are only reported when they stay a small minority; beyond this
/// share the distribution itself is the story, not the points.
const OUTLIER_REPORT_CEILING: f64 = 10.0;

/// Minimum sample for a meaningful standard deviation.
const OUTLIER_MIN_SAMPLES: usize = 4;

/// Inspect one result set.
#[must_use]
pub fn analyze(rows: &[Row]) -> DataQualityReport {
    if rows.is_empty() {
        return DataQualityReport {
            issues: Vec::new(),
            disclosure_message: None,
            complete_records: 0,
        };
    }

    let total = rows.len();
    let columns = column_names(rows);
    let mut issues = Vec::new();
    // Row indices with at least one problematic cell, for complete_records.
    let mut problem_rows: BTreeSet<usize> = BTreeSet::new();

    for column in &columns {
        check_nulls(rows, column, &mut issues, &mut problem_rows);
        check_empty_strings(rows, column, &mut issues, &mut problem_rows);
        check_mixed_types(rows, column, &mut issues);
        if is_date_named(column) {
            check_invalid_dates(rows, column, &mut issues, &mut problem_rows);
        }
        check_outliers(rows, column, &mut issues, &mut problem_rows);
    }
    check_duplicate_rows(rows, &mut issues, &mut problem_rows);

    issues.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.percentage.total_cmp(&a.percentage)));

    let disclosure_message = build_disclosure(&issues, total);
    DataQualityReport {
        complete_records: total - problem_rows.len(),
        issues,
        disclosure_message,
    }
}

fn column_names(rows: &[Row]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for row in rows {
        for name in row.keys() {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
        }
    }
    names
}

fn ratio_severity(percentage: f64) -> Severity {
    if percentage > 50.0 {
        Severity::Critical
    } else if percentage > 20.0 {
        Severity::Warning
    } else {
        Severity::Info
    }
}

fn percent(affected: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (affected as f64 / total as f64) * 100.0
    }
}

fn check_nulls(
    rows: &[Row],
    column: &str,
    issues: &mut Vec<QualityIssue>,
    problem_rows: &mut BTreeSet<usize>,
) {
    let affected: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| matches!(row.get(column), Some(Value::Null) | None))
        .map(|(index, _)| index)
        .collect();
    if affected.is_empty() {
        return;
    }

    let percentage = percent(affected.len(), rows.len());
    problem_rows.extend(&affected);
    issues.push(QualityIssue {
        kind: IssueKind::Nulls,
        severity: ratio_severity(percentage),
        column: Some(column.to_string()),
        affected_count: affected.len(),
        total_count: rows.len(),
        percentage,
        description: format!(
            "{} of {} values in '{column}' are missing",
            affected.len(),
            rows.len()
        ),
    });
}

fn check_empty_strings(
    rows: &[Row],
    column: &str,
    issues: &mut Vec<QualityIssue>,
    problem_rows: &mut BTreeSet<usize>,
) {
    let affected: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            matches!(row.get(column), Some(Value::String(s)) if s.trim().is_empty())
        })
        .map(|(index, _)| index)
        .collect();
    if affected.is_empty() {
        return;
    }

    let percentage = percent(affected.len(), rows.len());
    problem_rows.extend(&affected);
    issues.push(QualityIssue {
        kind: IssueKind::EmptyStrings,
        severity: ratio_severity(percentage),
        column: Some(column.to_string()),
        affected_count: affected.len(),
        total_count: rows.len(),
        percentage,
        description: format!(
            "{} of {} values in '{column}' are empty text",
            affected.len(),
            rows.len()
        ),
    });
}

fn check_mixed_types(rows: &[Row], column: &str, issues: &mut Vec<QualityIssue>) {
    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut total = 0usize;
    for row in rows {
        let kind = match row.get(column) {
            Some(Value::Number(_)) => "number",
            Some(Value::String(s)) if !s.trim().is_empty() => "text",
            Some(Value::Bool(_)) => "boolean",
            _ => continue,
        };
        *kinds.entry(kind).or_default() += 1;
        total += 1;
    }
    if kinds.len() < 2 {
        return;
    }

    let majority = kinds.values().copied().max().unwrap_or(0);
    let minority = total - majority;
    let percentage = percent(minority, total);
    issues.push(QualityIssue {
        kind: IssueKind::MixedTypes,
        severity: if percentage > 20.0 { Severity::Warning } else { Severity::Info },
        column: Some(column.to_string()),
        affected_count: minority,
        total_count: total,
        percentage,
        description: format!(
            "'{column}' mixes {} value types ({})",
            kinds.len(),
            kinds.keys().copied().collect::<Vec<_>>().join(", ")
        ),
    });
}

/// Column names that should hold dates.
fn is_date_named(column: &str) -> bool {
    let lower = column.to_lowercase();
    ["date", "time", "created", "updated"].iter().any(|h| lower.contains(h))
}

fn parses_as_date(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        // Emptiness is the empty-string check's finding, not this one's.
        return true;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok()
        || NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").is_ok()
        || NaiveDate::parse_from_str(trimmed, "%d.%m.%Y").is_ok()
        || chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::DateTime::parse_from_rfc3339(trimmed).is_ok()
}

fn check_invalid_dates(
    rows: &[Row],
    column: &str,
    issues: &mut Vec<QualityIssue>,
    problem_rows: &mut BTreeSet<usize>,
) {
    let mut affected = Vec::new();
    let mut inspected = 0usize;
    for (index, row) in rows.iter().enumerate() {
        if let Some(Value::String(s)) = row.get(column) {
            inspected += 1;
            if !parses_as_date(s) {
                affected.push(index);
            }
        }
    }
    if affected.is_empty() {
        return;
    }

    let percentage = percent(affected.len(), inspected);
    problem_rows.extend(&affected);
    issues.push(QualityIssue {
        kind: IssueKind::InvalidDates,
        severity: if percentage > 20.0 { Severity::Warning } else { Severity::Info },
        column: Some(column.to_string()),
        affected_count: affected.len(),
        total_count: inspected,
        percentage,
        description: format!(
            "{} of {inspected} values in '{column}' are not recognizable dates",
            affected.len()
        ),
    });
}

fn check_outliers(
    rows: &[Row],
    column: &str,
    issues: &mut Vec<QualityIssue>,
    problem_rows: &mut BTreeSet<usize>,
) {
    let samples: Vec<(usize, f64)> = rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            row.get(column).and_then(scalar_as_f64).map(|v| (index, v))
        })
        .collect();
    if samples.len() < OUTLIER_MIN_SAMPLES {
        return;
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|(_, v)| v).sum::<f64>() / n;
    let variance = samples.iter().map(|(_, v)| (v - mean).powi(2)).sum::<f64>() / n;
    let sigma = variance.sqrt();
    if sigma == 0.0 {
        return;
    }

    let affected: Vec<usize> = samples
        .iter()
        .filter(|(_, v)| (v - mean).abs() > 3.0 * sigma)
        .map(|(index, _)| *index)
        .collect();
    if affected.is_empty() {
        return;
    }

    let percentage = percent(affected.len(), samples.len());
    if percentage > OUTLIER_REPORT_CEILING {
        return;
    }

    problem_rows.extend(&affected);
    issues.push(QualityIssue {
        kind: IssueKind::Outliers,
        severity: Severity::Info,
        column: Some(column.to_string()),
        affected_count: affected.len(),
        total_count: samples.len(),
        percentage,
        description: format!(
            "{} of {} values in '{column}' sit far outside the typical range",
            affected.len(),
            samples.len()
        ),
    });
}

fn check_duplicate_rows(
    rows: &[Row],
    issues: &mut Vec<QualityIssue>,
    problem_rows: &mut BTreeSet<usize>,
) {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let key = serde_json::to_string(row).unwrap_or_default();
        if first_seen.contains_key(&key) {
            duplicates.push(index);
        } else {
            first_seen.insert(key, index);
        }
    }
    if duplicates.is_empty() {
        return;
    }

    let percentage = percent(duplicates.len(), rows.len());
    problem_rows.extend(&duplicates);
    issues.push(QualityIssue {
        kind: IssueKind::DuplicateRows,
        severity: if percentage > 20.0 { Severity::Warning } else { Severity::Info },
        column: None,
        affected_count: duplicates.len(),
        total_count: rows.len(),
        percentage,
        description: format!("{} of {} rows are exact duplicates", duplicates.len(), rows.len()),
    });
}

/// One leading sentence summarizing the worst findings.
fn build_disclosure(issues: &[QualityIssue], total_rows: usize) -> Option<String> {
    let noteworthy: Vec<&QualityIssue> =
        issues.iter().filter(|i| i.severity >= Severity::Warning).collect();
    if noteworthy.is_empty() {
        return None;
    }

    let summary = noteworthy
        .iter()
        .take(2)
        .map(|i| i.description.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    Some(format!(
        "⚠️ Heads up before the numbers: {summary} (out of {total_rows} rows analyzed)."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> Row {
        let mut row = IndexMap::new();
        for (name, value) in pairs {
            row.insert((*name).to_string(), value.clone());
        }
        row
    }

    #[test]
    fn test_clean_data_has_no_disclosure() {
        let rows: Vec<Row> = (0..10)
            .map(|i| row(&[("product", json!(format!("p{i}"))), ("revenue", json!(i * 10))]))
            .collect();
        let report = analyze(&rows);
        assert!(report.disclosure_message.is_none());
        assert_eq!(report.complete_records, 10);
    }

    #[test]
    fn test_null_thresholds() {
        // 6 of 10 null: critical.
        let rows: Vec<Row> = (0..10)
            .map(|i| {
                let value = if i < 6 { Value::Null } else { json!(i) };
                row(&[("revenue", value)])
            })
            .collect();
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::Nulls).unwrap();
        assert_eq!(issue.severity, Severity::Critical);
        assert!(report.disclosure_message.is_some());
        assert_eq!(report.complete_records, 4);
    }

    #[test]
    fn test_small_null_share_is_info_only() {
        let rows: Vec<Row> = (0..10)
            .map(|i| {
                let value = if i == 0 { Value::Null } else { json!(i) };
                row(&[("revenue", value)])
            })
            .collect();
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::Nulls).unwrap();
        assert_eq!(issue.severity, Severity::Info);
        assert!(report.disclosure_message.is_none());
    }

    #[test]
    fn test_empty_strings_distinct_from_nulls() {
        let rows = vec![
            row(&[("product", json!(""))]),
            row(&[("product", json!("widget"))]),
            row(&[("product", Value::Null)]),
        ];
        let report = analyze(&rows);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::EmptyStrings));
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::Nulls));
        assert_eq!(report.complete_records, 1);
    }

    #[test]
    fn test_mixed_types_detected() {
        let rows = vec![
            row(&[("amount", json!(10))]),
            row(&[("amount", json!(20))]),
            row(&[("amount", json!("n/a"))]),
        ];
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::MixedTypes).unwrap();
        assert_eq!(issue.affected_count, 1);
        assert_eq!(issue.severity, Severity::Warning);
    }

    #[test]
    fn test_invalid_dates_in_date_named_column() {
        let rows = vec![
            row(&[("order_date", json!("2025-01-15"))]),
            row(&[("order_date", json!("not a date"))]),
            row(&[("order_date", json!("01/15/2025"))]),
        ];
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::InvalidDates).unwrap();
        assert_eq!(issue.affected_count, 1);
    }

    #[test]
    fn test_non_date_named_column_not_date_checked() {
        let rows = vec![row(&[("product", json!("not a date"))])];
        let report = analyze(&rows);
        assert!(!report.issues.iter().any(|i| i.kind == IssueKind::InvalidDates));
    }

    #[test]
    fn test_outlier_detection() {
        let mut rows: Vec<Row> = (0..20).map(|_| row(&[("amount", json!(100))])).collect();
        rows.push(row(&[("amount", json!(1_000_000))]));
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::Outliers).unwrap();
        assert_eq!(issue.affected_count, 1);
        assert_eq!(issue.severity, Severity::Info);
    }

    #[test]
    fn test_duplicate_rows_detected() {
        let rows = vec![
            row(&[("product", json!("widget")), ("revenue", json!(10))]),
            row(&[("product", json!("widget")), ("revenue", json!(10))]),
            row(&[("product", json!("gadget")), ("revenue", json!(20))]),
        ];
        let report = analyze(&rows);
        let issue = report.issues.iter().find(|i| i.kind == IssueKind::DuplicateRows).unwrap();
        assert_eq!(issue.affected_count, 1);
        assert_eq!(report.complete_records, 2);
    }

    #[test]
    fn test_complete_records_by_intersection() {
        // Row 0 has two problems; counting per-issue would double-subtract.
        let rows = vec![
            row(&[("product", json!("")), ("revenue", Value::Null)]),
            row(&[("product", json!("widget")), ("revenue", json!(10))]),
            row(&[("product", json!("gadget")), ("revenue", json!(20))]),
        ];
        let report = analyze(&rows);
        assert_eq!(report.complete_records, 2);
    }

    #[test]
    fn test_empty_result_set() {
        let report = analyze(&[]);
        assert!(report.issues.is_empty());
        assert!(report.disclosure_message.is_none());
        assert_eq!(report.complete_records, 0);
    }
}
