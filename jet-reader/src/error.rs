//! Reader error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, JetError>;

#[derive(Debug, Error)]
pub enum JetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The header does not carry a Jet or ACE signature.
    #[error("not a Jet database: {0}")]
    NotJet(String),

    #[error("page {0} is out of range")]
    PageOutOfRange(u32),

    #[error("page {page} is not a {expected} page")]
    UnexpectedPageType { page: u32, expected: &'static str },

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },
}
