//! Query planning: single statements and validated multi-step outlines.
//!
//! The model proposes; this module disposes. Single-step planning extracts
//! and strips the missing-column sentinels. Multi-step planning accepts an
//! outline only when it is well-formed: within the tier's step budget, in
//! topological order, dependencies pointing strictly backwards. Anything
//! else degrades to single-step, which is always the default.

use std::collections::BTreeSet;
use std::sync::Arc;

use askql_error::Result;
use tracing::debug;

use crate::config::TierPolicy;
use crate::prompt::templates::extract_missing_sentinels;
use crate::prompt::{OutlineStep, PromptService};

/// Practical ceiling used when a tier leaves the step budget unbounded.
const UNBOUNDED_STEP_PROMPT_CAP: u32 = 10;

/// A planned single statement.
#[derive(Debug, Clone)]
pub struct SqlPlan {
    /// The statement, sentinel-free. May be empty when the model only
    /// emitted sentinels.
    pub sql: String,

    /// Columns the model flagged as absent, in emission order.
    pub missing_columns: Vec<String>,
}

/// How a question will be executed.
#[derive(Debug, Clone)]
pub enum PlanDecision {
    /// One statement answers it.
    SingleStep,
    /// An ordered list of sub-questions, each planned and run in turn.
    MultiStep(Vec<OutlineStep>),
}

/// Plans questions through the prompt service.
pub struct Planner {
    prompts: Arc<dyn PromptService>,
}

impl Planner {
    /// Create a planner over a prompt service.
    #[must_use]
    pub fn new(prompts: Arc<dyn PromptService>) -> Self {
        Self { prompts }
    }

    /// Plan one statement for a (sub-)question.
    ///
    /// # Errors
    ///
    /// Propagates prompt-service failures.
    pub async fn plan_single(&self, question: &str, schema: &str) -> Result<SqlPlan> {
        let raw = self.prompts.plan_sql(question, schema).await?;
        let (sql, missing_columns) = extract_missing_sentinels(&raw);
        Ok(SqlPlan {
            sql,
            missing_columns,
        })
    }

    /// Decide between single- and multi-step execution.
    ///
    /// # Errors
    ///
    /// Propagates prompt-service failures. A malformed outline is not an
    /// error; it degrades to [`PlanDecision::SingleStep`].
    pub async fn decide(
        &self,
        question: &str,
        schema: &str,
        tier: &TierPolicy,
    ) -> Result<PlanDecision> {
        if !tier.allow_multi_step {
            return Ok(PlanDecision::SingleStep);
        }

        let budget = tier.max_sub_steps.unwrap_or(UNBOUNDED_STEP_PROMPT_CAP);
        let outline = self.prompts.plan_multi_step(question, schema, budget).await?;
        if !outline.needs_multi_step {
            return Ok(PlanDecision::SingleStep);
        }

        match validate_outline(outline.steps, budget) {
            Some(steps) => {
                debug!(steps = steps.len(), "accepted multi-step outline");
                Ok(PlanDecision::MultiStep(steps))
            },
            None => {
                debug!("rejected malformed multi-step outline; using single step");
                Ok(PlanDecision::SingleStep)
            },
        }
    }
}

/// Accept an outline only when it is executable as-is.
///
/// Requirements: 2..=budget steps, unique orders, every `depends_on`
/// referencing a strictly earlier order. Steps come back sorted by order,
/// which together with backwards-only dependencies rules out cycles.
fn validate_outline(mut steps: Vec<OutlineStep>, budget: u32) -> Option<Vec<OutlineStep>> {
    if steps.len() < 2 || steps.len() as u64 > u64::from(budget) {
        return None;
    }

    steps.sort_by_key(|s| s.order);

    let mut seen = BTreeSet::new();
    for step in &steps {
        if step.sub_question.trim().is_empty() {
            return None;
        }
        if !seen.insert(step.order) {
            return None;
        }
        for dependency in &step.depends_on {
            if *dependency >= step.order || !seen.contains(dependency) {
                return None;
            }
        }
    }
    Some(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use askql_error::GatewayError;
    use async_trait::async_trait;

    use crate::config::{TierName, TierPolicy};
    use crate::executor::QueryResult;
    use crate::prompt::{
        Analysis, LlmSqlReview, MultiStepOutline, NarrativeRules, StepSummary,
    };

    struct ScriptedPrompts {
        plan: String,
        outline: MultiStepOutline,
    }

    #[async_trait]
    impl PromptService for ScriptedPrompts {
        async fn plan_sql(&self, _question: &str, _schema: &str) -> Result<String> {
            Ok(self.plan.clone())
        }

        async fn validate_sql(
            &self,
            _sql: &str,
            _question: &str,
            _schema: &str,
        ) -> Result<LlmSqlReview> {
            Ok(LlmSqlReview::not_applicable())
        }

        async fn plan_multi_step(
            &self,
            _question: &str,
            _schema: &str,
            _max_sub_steps: u32,
        ) -> Result<MultiStepOutline> {
            Ok(MultiStepOutline {
                needs_multi_step: self.outline.needs_multi_step,
                steps:            self.outline.steps.clone(),
            })
        }

        async fn analyze(
            &self,
            _question: &str,
            _result: &QueryResult,
            _rules: &NarrativeRules,
            _missing_columns: &[String],
        ) -> Result<Analysis> {
            Err(GatewayError::internal("not used"))
        }

        async fn synthesize(
            &self,
            _question: &str,
            _steps: &[StepSummary],
            _rules: &NarrativeRules,
        ) -> Result<String> {
            Err(GatewayError::internal("not used"))
        }
    }

    fn step(order: u32, depends_on: Vec<u32>) -> OutlineStep {
        OutlineStep {
            order,
            description: format!("step {order}"),
            sub_question: format!("sub-question {order}"),
            depends_on,
        }
    }

    fn planner(plan: &str, outline: MultiStepOutline) -> Planner {
        Planner::new(Arc::new(ScriptedPrompts {
            plan: plan.to_string(),
            outline,
        }))
    }

    #[tokio::test]
    async fn test_single_plan_extracts_sentinels() {
        let planner = planner(
            "--MISSING:cost\nSELECT product FROM sales LIMIT 10",
            MultiStepOutline::single_step(),
        );
        let plan = planner.plan_single("profit?", "sales(product text)").await.unwrap();
        assert_eq!(plan.sql, "SELECT product FROM sales LIMIT 10");
        assert_eq!(plan.missing_columns, vec!["cost"]);
    }

    #[tokio::test]
    async fn test_multi_step_denied_by_tier() {
        let outline = MultiStepOutline {
            needs_multi_step: true,
            steps:            vec![step(1, vec![]), step(2, vec![1])],
        };
        let planner = planner("SELECT 1 FROM t", outline);
        let decision = planner
            .decide("compare", "t(a int)", &TierPolicy::builtin(TierName::Starter))
            .await
            .unwrap();
        assert!(matches!(decision, PlanDecision::SingleStep));
    }

    #[tokio::test]
    async fn test_valid_outline_accepted() {
        let outline = MultiStepOutline {
            needs_multi_step: true,
            steps:            vec![step(2, vec![1]), step(1, vec![])],
        };
        let planner = planner("SELECT 1 FROM t", outline);
        let decision = planner
            .decide("compare", "t(a int)", &TierPolicy::builtin(TierName::Professional))
            .await
            .unwrap();
        let PlanDecision::MultiStep(steps) = decision else {
            panic!("expected multi-step");
        };
        // Sorted into execution order.
        assert_eq!(steps[0].order, 1);
        assert_eq!(steps[1].order, 2);
    }

    #[tokio::test]
    async fn test_over_budget_outline_degrades_to_single() {
        let outline = MultiStepOutline {
            needs_multi_step: true,
            steps:            vec![
                step(1, vec![]),
                step(2, vec![]),
                step(3, vec![]),
                step(4, vec![]),
            ],
        };
        let planner = planner("SELECT 1 FROM t", outline);
        // Professional allows 3 sub-steps.
        let decision = planner
            .decide("compare", "t(a int)", &TierPolicy::builtin(TierName::Professional))
            .await
            .unwrap();
        assert!(matches!(decision, PlanDecision::SingleStep));
    }

    #[tokio::test]
    async fn test_forward_dependency_rejected() {
        let outline = MultiStepOutline {
            needs_multi_step: true,
            steps:            vec![step(1, vec![2]), step(2, vec![])],
        };
        let planner = planner("SELECT 1 FROM t", outline);
        let decision = planner
            .decide("compare", "t(a int)", &TierPolicy::builtin(TierName::Professional))
            .await
            .unwrap();
        assert!(matches!(decision, PlanDecision::SingleStep));
    }

    #[tokio::test]
    async fn test_duplicate_orders_rejected() {
        let outline = MultiStepOutline {
            needs_multi_step: true,
            steps:            vec![step(1, vec![]), step(1, vec![])],
        };
        let planner = planner("SELECT 1 FROM t", outline);
        let decision = planner
            .decide("compare", "t(a int)", &TierPolicy::builtin(TierName::Professional))
            .await
            .unwrap();
        assert!(matches!(decision, PlanDecision::SingleStep));
    }

    #[test]
    fn test_unbounded_budget_uses_prompt_cap() {
        let steps: Vec<OutlineStep> = (1..=9).map(|i| step(i, vec![])).collect();
        assert!(validate_outline(steps, UNBOUNDED_STEP_PROMPT_CAP).is_some());
    }
}
