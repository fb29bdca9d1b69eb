//! SQL helpers.

pub mod identifier;
pub mod sql_validator;

// Re-export commonly used types
pub use identifier::{bracketed, quote_identifier, QuoteStyle};
pub use sql_validator::SqlValidator;
