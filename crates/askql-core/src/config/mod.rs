//! Configuration management.
//!
//! Two configuration surfaces:
//!
//! - **Tiers**: the [`TierCatalog`] of per-tier quotas and capabilities,
//!   built-in by default and overridable from a TOML file.
//! - **Prompt backend**: endpoint, credentials and retry behavior for the
//!   chat-completion model, read from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `ASKQL_TIERS_FILE` | Path to a TOML tier-catalog override | built-ins |
//! | `ASKQL_PROMPT_ENDPOINT` | Chat-completions URL | required |
//! | `ASKQL_PROMPT_API_KEY` | Bearer token, never logged | required |
//! | `ASKQL_PROMPT_MODEL` | Model identifier | `gpt-4o-mini` |
//! | `ASKQL_PROMPT_TIMEOUT_MS` | Per-call timeout | `20000` |
//! | `ASKQL_PROMPT_MAX_RETRIES` | Retry attempts on transient failure | `3` |

pub mod tier;

pub use tier::{TierCatalog, TierName, TierPolicy};

use askql_error::{GatewayError, Result};

/// Configuration for the HTTP prompt backend.
#[derive(Clone)]
pub struct PromptConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,

    /// Bearer token for the endpoint. Excluded from `Debug` output.
    pub api_key: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,

    /// Maximum retry attempts on transient failures.
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds (exponential backoff).
    pub retry_delay_ms: u64,
}

impl std::fmt::Debug for PromptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl PromptConfig {
    /// Build a config with defaults for everything but endpoint and key.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint:       endpoint.into(),
            api_key:        api_key.into(),
            model:          "gpt-4o-mini".to_string(),
            timeout_ms:     20_000,
            max_retries:    3,
            retry_delay_ms: 100,
        }
    }

    /// Read the prompt configuration from `ASKQL_PROMPT_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` when a required variable is
    /// missing or a numeric one fails to parse.
    pub fn from_env() -> Result<Self> {
        let endpoint = require_env("ASKQL_PROMPT_ENDPOINT")?;
        let api_key = require_env("ASKQL_PROMPT_API_KEY")?;
        let mut config = Self::new(endpoint, api_key);

        if let Ok(model) = std::env::var("ASKQL_PROMPT_MODEL") {
            config.model = model;
        }
        if let Ok(raw) = std::env::var("ASKQL_PROMPT_TIMEOUT_MS") {
            config.timeout_ms = parse_env_u64("ASKQL_PROMPT_TIMEOUT_MS", &raw)?;
        }
        if let Ok(raw) = std::env::var("ASKQL_PROMPT_MAX_RETRIES") {
            config.max_retries =
                u32::try_from(parse_env_u64("ASKQL_PROMPT_MAX_RETRIES", &raw)?)
                    .map_err(|_| GatewayError::config("ASKQL_PROMPT_MAX_RETRIES out of range"))?;
        }
        Ok(config)
    }
}

/// Load the tier catalog, honoring `ASKQL_TIERS_FILE` when set.
///
/// # Errors
///
/// Returns `GatewayError::Configuration` when the override file cannot be
/// read or parsed.
pub fn load_tier_catalog() -> Result<TierCatalog> {
    match std::env::var("ASKQL_TIERS_FILE") {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::config(format!("cannot read tier catalog {path}: {e}"))
            })?;
            TierCatalog::from_toml_str(&contents)
        },
        Err(_) => Ok(TierCatalog::default()),
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| GatewayError::config(format!("{name} is not set")))
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| GatewayError::config(format!("{name} must be an integer, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_config_defaults() {
        let config = PromptConfig::new("https://api.example.com/v1/chat", "sk-test");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_parse_env_u64_rejects_garbage() {
        assert!(parse_env_u64("X", "12").is_ok());
        assert!(parse_env_u64("X", "twelve").is_err());
    }
}
