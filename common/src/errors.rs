//! Application error types.
//!
//! Connection-level errors abort the remaining work for one connection during
//! a sync pass; every other variant is scoped to a single request or column.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error.
#[derive(Debug, Error)]
pub enum AppError {
    /// The backing source could not be reached or opened.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// A table or column is absent after full probing.
    #[error("not found: {0}")]
    NotFound(String),

    /// Execution fault on an otherwise valid reference.
    #[error("query error: {0}")]
    Query(String),

    /// The connection kind has no driver.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// No connection is registered under this logical name.
    #[error("unknown connection: {0}")]
    ConnectionNotFound(String),

    #[error("selection not found: {0}")]
    SelectionNotFound(i64),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsafe SQL: {0}")]
    UnsafeSql(String),

    /// Legacy database file unreadable or malformed.
    #[error("legacy file error: {0}")]
    LegacyFile(String),

    /// Selection store read or write failure.
    #[error("selection store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connectivity(_) => "CONNECTIVITY_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Query(_) => "QUERY_ERROR",
            AppError::Unsupported(_) => "UNSUPPORTED",
            AppError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            AppError::SelectionNotFound(_) => "SELECTION_NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UnsafeSql(_) => "UNSAFE_SQL",
            AppError::LegacyFile(_) => "LEGACY_FILE_ERROR",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_)
            | AppError::ConnectionNotFound(_)
            | AppError::SelectionNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::UnsafeSql(_) => StatusCode::BAD_REQUEST,
            AppError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::Connectivity(_) | AppError::LegacyFile(_) => StatusCode::BAD_GATEWAY,
            AppError::Query(_)
            | AppError::Store(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error aborts the rest of a connection's sync pass.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            AppError::Connectivity(_)
                | AppError::Unsupported(_)
                | AppError::ConnectionNotFound(_)
                | AppError::LegacyFile(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_level_classification() {
        assert!(AppError::Connectivity("down".into()).is_connection_level());
        assert!(AppError::Unsupported("QUICKBOOKS".into()).is_connection_level());
        assert!(AppError::LegacyFile("bad page".into()).is_connection_level());
        assert!(!AppError::NotFound("T.C".into()).is_connection_level());
        assert!(!AppError::Query("syntax".into()).is_connection_level());
        assert!(!AppError::Store("locked".into()).is_connection_level());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::SelectionNotFound(7).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::UnsafeSql("DROP".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unsupported("x".into()).status(), StatusCode::NOT_IMPLEMENTED);
    }
}
