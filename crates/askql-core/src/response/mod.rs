//! Response validation (hallucination guard).

pub mod validator;

pub use validator::{
    Confidence, ExtractedNumber, ResponseValidation, data_numbers, extract_numbers, validate,
};
