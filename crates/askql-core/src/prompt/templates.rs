//! Fixed system prompts and prompt-building helpers.
//!
//! Every capability pins its own system role and output contract. User
//! prompts carry the schema rendered as one line per table so the model
//! never has to guess column names.

use itertools::Itertools;

use crate::sources::descriptor::TableHandle;

/// Sentinel the planner emits when the question needs a column the schema
/// lacks, e.g. `--MISSING:cost`. Extracted and stripped by the core.
pub const MISSING_SENTINEL: &str = "--MISSING:";

/// System role for SQL planning.
pub const PLAN_SQL_SYSTEM: &str = r"You are a read-only SQL planner for business analytics.

Rules:
1. Output exactly one SQL statement and nothing else: no prose, no markdown fences.
2. SELECT (or WITH ... SELECT) only. Never INSERT, UPDATE, DELETE, DROP, CREATE, ALTER or any other write or DDL statement.
3. Reference only the tables and columns listed in the schema.
4. Always end with a LIMIT clause.
5. If the question needs a column the schema does not have, emit one comment line per missing column in the form --MISSING:<column_name> before the statement, then plan the closest query the schema does support.";

/// System role for the model-side SQL review.
pub const VALIDATE_SQL_SYSTEM: &str = r#"You review SQL statements for correctness against a schema and a question.

Respond with strict JSON only, no markdown fences, in this shape:
{"isValid": true, "concerns": [], "recommendations": [], "correctedSQL": null}

Set isValid to false only for statements that would fail or answer the wrong question. Put the fixed statement in correctedSQL when you can repair it."#;

/// System role for multi-step decomposition.
pub const MULTI_STEP_SYSTEM: &str = r#"You decompose analytical questions into ordered sub-questions when one query cannot answer them.

Respond with strict JSON only, no markdown fences, in this shape:
{"needsMultiStep": false, "steps": []}

Each step: {"order": 1, "description": "...", "subQuestion": "...", "dependsOn": []}.
Every subQuestion must be answerable by a single SELECT over the schema. Use dependsOn to reference earlier step orders. Prefer a single step whenever possible."#;

/// System role for result analysis.
pub const ANALYZE_SYSTEM: &str = r#"You explain query results to business users. Ground every number you mention in the rows you are given; never invent values.

Respond with strict JSON only, no markdown fences, in this shape:
{"text": "...", "chart": null, "suggestions": [], "forecast": null}

chart, when useful and permitted, is {"type": "line|bar|area|pie", "x": "<column>", "y": "<column>"}.
suggestions, when permitted, are up to three short follow-up questions.
forecast, when permitted, is one short paragraph extrapolating the visible trend, clearly hedged."#;

/// System role for multi-step synthesis.
pub const SYNTHESIZE_SYSTEM: &str = r"You combine the results of several analytical steps into one coherent answer for a business user.

Ground every number in the step results you are given; never invent values. Answer the original question directly, then support it with the step findings in order. Respond with plain text only.";

/// Render table handles as schema lines for a prompt.
#[must_use]
pub fn schema_text<'a>(handles: impl IntoIterator<Item = &'a TableHandle>) -> String {
    handles
        .into_iter()
        .map(|handle| {
            let columns = handle
                .columns
                .iter()
                .map(|(name, schema)| format!("{name} {}", schema.data_type))
                .join(", ");
            format!("{}({columns})", handle.logical_name)
        })
        .join("\n")
}

/// User prompt for SQL planning.
#[must_use]
pub fn plan_sql_prompt(question: &str, schema: &str) -> String {
    format!("Schema:\n{schema}\n\nQuestion: {question}\n\nSQL:")
}

/// User prompt for the model-side SQL review.
#[must_use]
pub fn validate_sql_prompt(sql: &str, question: &str, schema: &str) -> String {
    format!("Schema:\n{schema}\n\nQuestion: {question}\n\nStatement to review:\n{sql}")
}

/// User prompt for multi-step decomposition.
#[must_use]
pub fn multi_step_prompt(question: &str, schema: &str, max_sub_steps: u32) -> String {
    format!(
        "Schema:\n{schema}\n\nQuestion: {question}\n\nDecompose into at most {max_sub_steps} steps."
    )
}

/// Extract `--MISSING:<name>` sentinels, returning the cleaned SQL and the
/// flagged column names in emission order.
#[must_use]
pub fn extract_missing_sentinels(raw: &str) -> (String, Vec<String>) {
    let mut missing = Vec::new();
    let mut kept_lines = Vec::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(MISSING_SENTINEL) {
            let name = rest.trim().trim_matches(|c: char| c == '`' || c == '"').to_string();
            if !name.is_empty() && !missing.contains(&name) {
                missing.push(name);
            }
        } else {
            kept_lines.push(line);
        }
    }
    (kept_lines.join("\n").trim().to_string(), missing)
}

/// Strip markdown code fences a model may wrap its output in.
#[must_use]
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag on the opening fence line.
    let body = rest.split_once('\n').map_or("", |(_, tail)| tail);
    body.strip_suffix("```").unwrap_or(body).trim()
}
