//! Static safety validation of planner-generated SQL.
//!
//! This is a pure function over text: no I/O, no schema lookups. The
//! executor assumes exactly what the validator guarantees (read-only shape,
//! no forbidden statements, a row cap) and nothing more.
//!
//! Rules run in order:
//!
//! 1. Reject unusable tier configuration (`max_rows == 0`).
//! 2. The statement must start with `SELECT` or `WITH` (leading comments
//!    ignored).
//! 3. A `FROM` clause must be present.
//! 4. No forbidden keyword may appear as a whole token.
//! 5. No known injection pattern may appear.
//! 6. A `LIMIT` is enforced: appended when absent, rewritten down when above
//!    the tier cap.
//! 7. JOIN usage must fit the tier's join policy.
//!
//! Rewriting is idempotent: validating `enhanced_sql` again returns it
//! unchanged.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::config::TierPolicy;

/// Statement keywords that must never reach a backend.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "EXEC", "EXECUTE",
    "GRANT", "REVOKE", "PRAGMA", "CALL", "RENAME", "REPLACE",
];

static FORBIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = FORBIDDEN_KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b")).expect("forbidden keyword regex")
});

static LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\s+(\d+)").expect("limit regex"));

static JOIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").expect("join regex"));

static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFROM\b").expect("from regex"));

static UNION_SELECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b").expect("union regex"));

static SELECT_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSELECT\s+\*").expect("select-star regex"));

static SUBQUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*SELECT\b").expect("subquery regex"));

/// Relative cost bucket for an accepted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostEstimate {
    /// Simple single-table scan.
    Low,
    /// One expensive construct.
    Medium,
    /// Multiple expensive constructs.
    High,
}

/// Result of validating one statement.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// True when no rule produced an error.
    pub is_valid: bool,

    /// Non-fatal findings, e.g. a rewritten LIMIT.
    pub warnings: Vec<String>,

    /// Fatal findings; `enhanced_sql` must not be executed when non-empty.
    pub errors: Vec<String>,

    /// Cost bucket from the heuristic.
    pub estimated_cost: CostEstimate,

    /// The statement as it should be executed: trimmed, semicolon-free,
    /// LIMIT-capped.
    pub enhanced_sql: String,
}

/// Validate a planner-generated statement against a tier's limits.
#[must_use]
pub fn validate(sql: &str, tier: &TierPolicy) -> ValidationReport {
    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    let mut enhanced = sql.trim().trim_end_matches(';').trim_end().to_string();

    if tier.max_rows == 0 {
        errors.push("tier allows zero result rows; no query can run".to_string());
        return finish(enhanced, warnings, errors);
    }

    // Rule 2: statement head.
    let head = strip_leading_comments(&enhanced);
    let head_upper = head.to_uppercase();
    if !(head_upper.starts_with("SELECT") || head_upper.starts_with("WITH")) {
        errors.push("only SELECT or WITH statements are allowed".to_string());
    }

    // Rule 3: FROM clause.
    if !FROM_RE.is_match(&enhanced) {
        errors.push("statement has no FROM clause".to_string());
    }

    // Rule 4: forbidden keywords.
    if let Some(found) = FORBIDDEN_RE.find(&enhanced) {
        errors.push(format!(
            "forbidden keyword {} is not allowed in analytical queries",
            found.as_str().to_uppercase()
        ));
    }

    // Rule 5: injection patterns.
    scan_injection_patterns(&enhanced, tier, &mut errors);

    // Rule 6: LIMIT enforcement (rewrites, so runs even with errors present
    // to keep the report deterministic; an errored report is never executed).
    enhanced = enforce_limit(enhanced, tier, &mut warnings);

    // Rule 7: join policy.
    let join_count = JOIN_RE.find_iter(&enhanced).count();
    if join_count > 0 && !tier.allow_joins {
        errors.push("joins are not available on this plan".to_string());
    } else if join_count as u64 > u64::from(tier.max_joins) {
        errors.push(format!(
            "query uses {join_count} joins; this plan allows {}",
            tier.max_joins
        ));
    }

    finish(enhanced, warnings, errors)
}

fn finish(enhanced: String, warnings: Vec<String>, errors: Vec<String>) -> ValidationReport {
    let estimated_cost = estimate_cost(&enhanced);
    ValidationReport {
        is_valid: errors.is_empty(),
        warnings,
        errors,
        estimated_cost,
        enhanced_sql: enhanced,
    }
}

/// Skip leading `--` line comments, `/* */` block comments and whitespace.
fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map_or("", |(_, tail)| tail).trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map_or("", |(_, tail)| tail).trim_start();
        } else {
            return rest;
        }
    }
}

fn scan_injection_patterns(sql: &str, tier: &TierPolicy, errors: &mut Vec<String>) {
    let compact: String = sql.chars().filter(|c| !c.is_whitespace()).collect();
    let compact_lower = compact.to_lowercase();

    if compact_lower.contains(";--") {
        errors.push("statement terminator followed by comment".to_string());
    }
    if sql.trim_end().ends_with("--") {
        errors.push("trailing line comment".to_string());
    }
    // A semicolon inside a block comment is a classic statement-splitting
    // smuggle; so is any interior semicolon at this point, since the outer
    // trailing one was already stripped.
    if let Some(open) = sql.find("/*") {
        let closed = sql[open..].find("*/").map(|i| open + i);
        match closed {
            Some(end) if sql[open..end].contains(';') => {
                errors.push("block comment spanning statements".to_string());
            },
            None => errors.push("unterminated block comment".to_string()),
            Some(_) => {},
        }
    }
    if sql.contains(';') {
        errors.push("multiple statements are not allowed".to_string());
    }
    if compact_lower.contains("'1'='1'") {
        errors.push("tautological predicate".to_string());
    }
    if tier.max_joins == 0 && UNION_SELECT_RE.is_match(sql) {
        errors.push("UNION is not available on this plan".to_string());
    }
}

/// Ensure exactly one effective LIMIT at or below the tier cap.
fn enforce_limit(sql: String, tier: &TierPolicy, warnings: &mut Vec<String>) -> String {
    let cap = tier.max_rows;
    let mut any_limit = false;
    let mut rewrote = false;

    let rewritten = LIMIT_RE
        .replace_all(&sql, |caps: &regex::Captures<'_>| {
            any_limit = true;
            let n: u64 = caps[1].parse().unwrap_or(u64::from(cap));
            if n > u64::from(cap) {
                rewrote = true;
                format!("LIMIT {cap}")
            } else {
                caps[0].to_string()
            }
        })
        .into_owned();

    if rewrote {
        warnings.push(format!("row limit reduced to the plan maximum of {cap}"));
    }
    if any_limit {
        rewritten
    } else {
        format!("{rewritten} LIMIT {cap}")
    }
}

fn estimate_cost(sql: &str) -> CostEstimate {
    let mut score = 0;
    if SELECT_STAR_RE.is_match(sql) {
        score += 1;
    }
    if SUBQUERY_RE.is_match(sql) {
        score += 1;
    }
    if JOIN_RE.find_iter(sql).count() >= 2 {
        score += 1;
    }
    match score {
        0 => CostEstimate::Low,
        1 => CostEstimate::Medium,
        _ => CostEstimate::High,
    }
}

/// The numeric value of the last LIMIT in a statement, if any.
#[must_use]
pub fn limit_of(sql: &str) -> Option<u32> {
    LIMIT_RE
        .captures_iter(sql)
        .last()
        .and_then(|caps| caps[1].parse().ok())
}

/// Whether any forbidden keyword appears as a whole token.
#[must_use]
pub fn contains_forbidden(sql: &str) -> bool {
    FORBIDDEN_RE.is_match(sql)
}
