//! SQL safety validation.

pub mod validator;

pub use validator::{
    CostEstimate, FORBIDDEN_KEYWORDS, ValidationReport, contains_forbidden, limit_of, validate,
};
