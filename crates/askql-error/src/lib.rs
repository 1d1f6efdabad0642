//! Unified error types for the askql gateway crates.
//!
//! All pipeline crates depend on this crate for error handling. Errors fall
//! into two groups: the seven user-facing kinds the orchestrator maps to
//! response templates, and infrastructure variants that never reach a user
//! verbatim.
//!
//! # Error Hierarchy
//!
//! ```text
//! GatewayError
//! ├── Sql             - Query planning/execution failures
//! ├── NoData          - No active data source for the user
//! ├── Validation      - SQL safety or response validation failures
//! ├── MissingColumns  - Question needs columns the schema lacks
//! ├── DataQuality     - Result rows failed quality inspection
//! ├── TierLimit       - Capability not included in the caller's tier
//! ├── RateLimit       - Sliding-window quota exhausted
//! ├── ConnectionPool  - Pool creation/acquisition failures (internal)
//! ├── Database        - Driver-level errors (internal)
//! ├── Timeout         - Request deadline expired (internal)
//! ├── Configuration   - Invalid tier/prompt configuration (internal)
//! └── Internal        - Unexpected internal errors (internal)
//! ```

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Fallback text used when response validation rejects a synthesized answer.
pub const GENERIC_FALLBACK: &str = "I encountered an issue generating an accurate response. \
     Please try rephrasing your question or asking about a different aspect of your data.";

/// Fixed reply when the user has no active data source.
pub const NO_DATA_MESSAGE: &str = "I don't see any data to analyze yet. Please connect a \
     database or upload a file, and I'll get to work.";

/// Main error type for gateway operations.
///
/// The orchestrator catches at each pipeline seam and maps whatever it caught
/// onto one of these variants before anything is shown to a user.
#[derive(Error, Debug)]
pub enum GatewayError {
    // ========================================================================
    // User-facing kinds
    // ========================================================================
    /// Query planning or execution failure.
    ///
    /// Covers planner output that cannot be executed, driver errors during a
    /// live query, and deadline expiry inside the executor.
    #[error("SQL error: {message}")]
    Sql {
        /// Error message describing the failure.
        message:   String,
        /// SQL state code if the backend supplied one (e.g. "42P01").
        sql_state: Option<String>,
    },

    /// The user has no active data source to query.
    #[error("no active data source")]
    NoData,

    /// Validation failure, either of generated SQL or of a synthesized
    /// response.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure.
        message: String,
    },

    /// The question requires columns the connected schema does not have.
    #[error("missing columns: {}", columns.join(", "))]
    MissingColumns {
        /// The identifiers the planner flagged as absent.
        columns: Vec<String>,
    },

    /// The executed rows failed data-quality inspection badly enough to
    /// block synthesis.
    #[error("Data quality error: {message}")]
    DataQuality {
        /// Error message describing the quality failure.
        message: String,
    },

    /// The caller's tier does not include the requested capability.
    #[error("Tier limit: {message}")]
    TierLimit {
        /// Which capability was denied.
        message: String,
    },

    /// Sliding-window quota exhausted.
    #[error("Rate limit: {message}")]
    RateLimit {
        /// Human denial message naming the offending limit.
        message: String,
    },

    // ========================================================================
    // Infrastructure errors
    // ========================================================================
    /// Connection pool error.
    ///
    /// Returned when a pool cannot be created or a connection acquired.
    #[error("Connection pool error: {message}")]
    ConnectionPool {
        /// Error message.
        message: String,
    },

    /// Database driver error.
    #[error("Database error: {message}")]
    Database {
        /// Error message from the driver.
        message:   String,
        /// SQL state code if available.
        sql_state: Option<String>,
    },

    /// Operation exceeded the per-tier request deadline.
    #[error("Timeout after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message.
        message: String,
    },

    /// Unexpected internal error. Should be rare.
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
        /// Optional source error for debugging.
        #[source]
        source:  Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl GatewayError {
    // ========================================================================
    // Constructor helpers
    // ========================================================================

    /// Create a SQL error without a state code.
    #[must_use]
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message:   message.into(),
            sql_state: None,
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a missing-columns error.
    #[must_use]
    pub fn missing_columns(columns: Vec<String>) -> Self {
        Self::MissingColumns { columns }
    }

    /// Create a tier-limit error.
    #[must_use]
    pub fn tier_limit(message: impl Into<String>) -> Self {
        Self::TierLimit {
            message: message.into(),
        }
    }

    /// Create a rate-limit error.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    /// Create a database error without a state code.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message:   message.into(),
            sql_state: None,
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source:  None,
        }
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// The taxonomy code the orchestrator reports for this error.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Sql { .. } => "SQL_ERROR",
            Self::NoData => "NO_DATA",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::MissingColumns { .. } => "MISSING_COLUMNS",
            Self::DataQuality { .. } => "DATA_QUALITY",
            Self::TierLimit { .. } => "TIER_LIMIT",
            Self::RateLimit { .. } => "RATE_LIMIT",
            // Infrastructure failures surface as SQL errors: the user asked a
            // question and the query could not be run.
            Self::ConnectionPool { .. } | Self::Database { .. } | Self::Timeout { .. } => {
                "SQL_ERROR"
            },
            Self::Configuration { .. } | Self::Internal { .. } => "VALIDATION_ERROR",
        }
    }

    /// Check if this error is retryable as-is.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionPool { .. } | Self::Timeout { .. } | Self::Database { .. }
        )
    }

    /// User-facing template for this error.
    ///
    /// Never includes driver messages, SQL text, or stack traces.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Sql { .. } | Self::Database { .. } | Self::ConnectionPool { .. } => {
                "I ran into a problem executing that query against your data.".to_string()
            },
            Self::NoData => NO_DATA_MESSAGE.to_string(),
            Self::Validation { .. } | Self::Internal { .. } | Self::Configuration { .. } => {
                GENERIC_FALLBACK.to_string()
            },
            Self::MissingColumns { columns } => format!(
                "Your data doesn't include the column(s) I'd need for that: {}.",
                columns.join(", ")
            ),
            Self::DataQuality { message } => message.clone(),
            Self::TierLimit { message } | Self::RateLimit { message } => message.clone(),
            Self::Timeout { .. } => {
                "That question took too long to answer against your data.".to_string()
            },
        }
    }

    /// Suggested next steps to pair with `user_message`.
    #[must_use]
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Sql { .. }
            | Self::Database { .. }
            | Self::ConnectionPool { .. }
            | Self::Timeout { .. } => {
                vec!["Try a simpler version of the question", "Ask about a smaller date range"]
            },
            Self::NoData => vec!["Upload a CSV or Excel file", "Connect a PostgreSQL or MySQL database"],
            Self::Validation { .. } | Self::Internal { .. } | Self::Configuration { .. } => {
                vec!["Rephrase the question", "Ask about a different aspect of your data"]
            },
            Self::MissingColumns { .. } => {
                vec!["Add the missing column to your data", "Ask about the columns you do have"]
            },
            Self::DataQuality { .. } => vec!["Clean up the affected rows and re-upload"],
            Self::TierLimit { .. } => vec!["Upgrade your plan to unlock this capability"],
            Self::RateLimit { .. } => vec!["Wait a little before asking again"],
        }
    }
}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation {
            message: format!("invalid JSON at line {}, column {}: {e}", e.line(), e.column()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {e}"),
            source:  Some(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes() {
        assert_eq!(GatewayError::sql("boom").error_code(), "SQL_ERROR");
        assert_eq!(GatewayError::NoData.error_code(), "NO_DATA");
        assert_eq!(GatewayError::validation("bad").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            GatewayError::missing_columns(vec!["cost".into()]).error_code(),
            "MISSING_COLUMNS"
        );
        assert_eq!(GatewayError::tier_limit("no charts").error_code(), "TIER_LIMIT");
        assert_eq!(GatewayError::rate_limit("slow down").error_code(), "RATE_LIMIT");
    }

    #[test]
    fn test_infrastructure_maps_to_sql_error() {
        let err = GatewayError::Timeout { timeout_ms: 10_000 };
        assert_eq!(err.error_code(), "SQL_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message_hides_driver_detail() {
        let err = GatewayError::Database {
            message:   "FATAL: role \"admin\" does not exist".to_string(),
            sql_state: Some("28000".to_string()),
        };
        assert!(!err.user_message().contains("FATAL"));
        assert!(!err.user_message().contains("28000"));
    }

    #[test]
    fn test_no_data_template() {
        let msg = GatewayError::NoData.user_message();
        assert!(msg.contains("connect a database"));
        assert!(msg.contains("upload a file"));
    }

    #[test]
    fn test_suggestions_non_empty() {
        let errs = [
            GatewayError::sql("x"),
            GatewayError::NoData,
            GatewayError::validation("x"),
            GatewayError::rate_limit("x"),
        ];
        for err in errs {
            assert!(!err.suggestions().is_empty());
        }
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Validation { .. }));
    }
}
