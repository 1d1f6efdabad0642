//! Tier policies: quotas and capabilities applied to a user.
//!
//! Per-tier behavior (row caps, join policy, charts, multi-step allowance,
//! execution deadline) lives in a single [`TierPolicy`] record that is
//! threaded through every component. Business logic never branches on the
//! tier name itself.

use std::time::Duration;

use askql_error::{GatewayError, Result};
use serde::{Deserialize, Serialize};

/// Canonical tier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    /// Entry tier: small row caps, no joins, no charts.
    Starter,
    /// Mid tier: joins, charts, suggestions, bounded multi-step.
    Professional,
    /// Top tier: unbounded hourly quota (spam-capped), forecasts.
    Enterprise,
}

impl TierName {
    /// Parse a tier name from its wire form.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` for unrecognized names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starter" => Ok(Self::Starter),
            "professional" => Ok(Self::Professional),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(GatewayError::config(format!("unknown tier: {other}"))),
        }
    }

    /// Wire form of the tier name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Professional => "professional",
            Self::Enterprise => "enterprise",
        }
    }

    /// The next tier up, if any. Used in rate-limit denial messages.
    #[must_use]
    pub const fn upgrade_target(self) -> Option<Self> {
        match self {
            Self::Starter => Some(Self::Professional),
            Self::Professional => Some(Self::Enterprise),
            Self::Enterprise => None,
        }
    }
}

impl std::fmt::Display for TierName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quotas and capabilities for one tier.
///
/// `max_queries_per_hour == None` means unbounded; only then does
/// `spam_window_cap` (per minute) apply. `max_sub_steps == None` means the
/// multi-step planner is not clamped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Which tier this policy describes.
    pub name: TierName,

    /// Hourly query quota; `None` is unbounded.
    pub max_queries_per_hour: Option<u32>,

    /// Per-minute burst cap, meaningful only when the hourly quota is
    /// unbounded.
    pub spam_window_cap: Option<u32>,

    /// Hard cap on rows any query may return.
    pub max_rows: u32,

    /// Whether generated SQL may contain JOINs at all.
    pub allow_joins: bool,

    /// Maximum whole-word JOIN occurrences when joins are allowed.
    pub max_joins: u32,

    /// Attach chart specs to responses.
    pub allow_charts: bool,

    /// Attach follow-up suggestions to responses.
    pub allow_suggestions: bool,

    /// Attach forecast sections to responses.
    pub allow_forecast: bool,

    /// Permit multi-step plans (and multi-source composites).
    pub allow_multi_step: bool,

    /// Clamp on multi-step plan length; `None` is unbounded.
    pub max_sub_steps: Option<u32>,

    /// Ask the model to double-check generated SQL before execution.
    pub llm_sql_validation: bool,

    /// Per-request execution deadline in seconds.
    pub exec_timeout_secs: u64,

    /// Word budget for synthesized answers.
    pub response_word_cap: u32,
}

impl TierPolicy {
    /// Built-in policy for a tier name.
    #[must_use]
    pub fn builtin(name: TierName) -> Self {
        match name {
            TierName::Starter => Self {
                name,
                max_queries_per_hour: Some(5),
                spam_window_cap: None,
                max_rows: 100,
                allow_joins: false,
                max_joins: 0,
                allow_charts: false,
                allow_suggestions: false,
                allow_forecast: false,
                allow_multi_step: false,
                max_sub_steps: Some(1),
                llm_sql_validation: false,
                exec_timeout_secs: 10,
                response_word_cap: 60,
            },
            TierName::Professional => Self {
                name,
                max_queries_per_hour: Some(25),
                spam_window_cap: None,
                max_rows: 1_000,
                allow_joins: true,
                max_joins: 2,
                allow_charts: true,
                allow_suggestions: true,
                allow_forecast: false,
                allow_multi_step: true,
                max_sub_steps: Some(3),
                llm_sql_validation: true,
                exec_timeout_secs: 30,
                response_word_cap: 180,
            },
            TierName::Enterprise => Self {
                name,
                max_queries_per_hour: None,
                spam_window_cap: Some(60),
                max_rows: 5_000,
                allow_joins: true,
                max_joins: 5,
                allow_charts: true,
                allow_suggestions: true,
                allow_forecast: true,
                allow_multi_step: true,
                max_sub_steps: None,
                llm_sql_validation: true,
                exec_timeout_secs: 60,
                response_word_cap: 320,
            },
        }
    }

    /// Request deadline as a [`Duration`].
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    /// Validate internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` when the policy is unusable,
    /// e.g. `max_rows == 0` or a bounded tier carrying a spam cap.
    pub fn validate(&self) -> Result<()> {
        if self.max_rows == 0 {
            return Err(GatewayError::config(format!(
                "tier {}: max_rows must be positive",
                self.name
            )));
        }
        if self.max_queries_per_hour.is_some() && self.spam_window_cap.is_some() {
            return Err(GatewayError::config(format!(
                "tier {}: spam_window_cap only applies to unbounded tiers",
                self.name
            )));
        }
        if let Some(0) = self.max_sub_steps {
            return Err(GatewayError::config(format!(
                "tier {}: max_sub_steps must be at least 1",
                self.name
            )));
        }
        if self.response_word_cap == 0 {
            return Err(GatewayError::config(format!(
                "tier {}: response_word_cap must be positive",
                self.name
            )));
        }
        if self.allow_joins && self.max_joins == 0 {
            return Err(GatewayError::config(format!(
                "tier {}: joins allowed but max_joins is 0",
                self.name
            )));
        }
        Ok(())
    }
}

/// The full set of tier policies known to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCatalog {
    /// Starter policy.
    pub starter:      TierPolicy,
    /// Professional policy.
    pub professional: TierPolicy,
    /// Enterprise policy.
    pub enterprise:   TierPolicy,
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            starter:      TierPolicy::builtin(TierName::Starter),
            professional: TierPolicy::builtin(TierName::Professional),
            enterprise:   TierPolicy::builtin(TierName::Enterprise),
        }
    }
}

impl TierCatalog {
    /// Look up the policy for a tier.
    #[must_use]
    pub const fn policy(&self, name: TierName) -> &TierPolicy {
        match name {
            TierName::Starter => &self.starter,
            TierName::Professional => &self.professional,
            TierName::Enterprise => &self.enterprise,
        }
    }

    /// Load a catalog from TOML, falling back to built-ins per tier.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` on parse failure or when any
    /// policy fails [`TierPolicy::validate`].
    pub fn from_toml_str(s: &str) -> Result<Self> {
        #[derive(Deserialize, Default)]
        struct Partial {
            starter:      Option<TierPolicy>,
            professional: Option<TierPolicy>,
            enterprise:   Option<TierPolicy>,
        }

        let partial: Partial = toml::from_str(s)
            .map_err(|e| GatewayError::config(format!("invalid tier catalog: {e}")))?;

        let catalog = Self {
            starter:      partial.starter.unwrap_or_else(|| TierPolicy::builtin(TierName::Starter)),
            professional: partial
                .professional
                .unwrap_or_else(|| TierPolicy::builtin(TierName::Professional)),
            enterprise:   partial
                .enterprise
                .unwrap_or_else(|| TierPolicy::builtin(TierName::Enterprise)),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validate every policy in the catalog.
    ///
    /// # Errors
    ///
    /// Propagates the first failing [`TierPolicy::validate`].
    pub fn validate(&self) -> Result<()> {
        self.starter.validate()?;
        self.professional.validate()?;
        self.enterprise.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_names() {
        assert_eq!(TierName::parse("starter").unwrap(), TierName::Starter);
        assert_eq!(TierName::parse("Professional").unwrap(), TierName::Professional);
        assert_eq!(TierName::parse(" enterprise ").unwrap(), TierName::Enterprise);
    }

    #[test]
    fn test_legacy_aliases_rejected() {
        assert!(TierName::parse("beginner").is_err());
        assert!(TierName::parse("pro").is_err());
        assert!(TierName::parse("elite").is_err());
    }

    #[test]
    fn test_builtin_table_matches_contract() {
        let starter = TierPolicy::builtin(TierName::Starter);
        assert_eq!(starter.max_queries_per_hour, Some(5));
        assert_eq!(starter.max_rows, 100);
        assert!(!starter.allow_joins);
        assert_eq!(starter.exec_timeout(), Duration::from_secs(10));

        let pro = TierPolicy::builtin(TierName::Professional);
        assert_eq!(pro.max_queries_per_hour, Some(25));
        assert_eq!(pro.max_rows, 1_000);
        assert_eq!(pro.max_joins, 2);
        assert!(pro.allow_charts && pro.allow_suggestions && !pro.allow_forecast);
        assert_eq!(pro.max_sub_steps, Some(3));

        let ent = TierPolicy::builtin(TierName::Enterprise);
        assert_eq!(ent.max_queries_per_hour, None);
        assert_eq!(ent.spam_window_cap, Some(60));
        assert_eq!(ent.max_rows, 5_000);
        assert!(ent.allow_forecast);
        assert_eq!(ent.max_sub_steps, None);
    }

    #[test]
    fn test_builtin_policies_validate() {
        TierCatalog::default().validate().unwrap();
    }

    #[test]
    fn test_zero_max_rows_rejected() {
        let mut policy = TierPolicy::builtin(TierName::Starter);
        policy.max_rows = 0;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_toml_override_keeps_builtin_defaults() {
        let toml_src = r#"
            [starter]
            name = "starter"
            max_queries_per_hour = 10
            max_rows = 200
            allow_joins = false
            max_joins = 0
            allow_charts = false
            allow_suggestions = false
            allow_forecast = false
            allow_multi_step = false
            max_sub_steps = 1
            llm_sql_validation = false
            exec_timeout_secs = 10
            response_word_cap = 60
        "#;
        let catalog = TierCatalog::from_toml_str(toml_src).unwrap();
        assert_eq!(catalog.starter.max_queries_per_hour, Some(10));
        assert_eq!(catalog.starter.max_rows, 200);
        // Untouched tiers stay at built-in values.
        assert_eq!(catalog.enterprise.max_rows, 5_000);
    }

    #[test]
    fn test_upgrade_targets() {
        assert_eq!(TierName::Starter.upgrade_target(), Some(TierName::Professional));
        assert_eq!(TierName::Enterprise.upgrade_target(), None);
    }
}
