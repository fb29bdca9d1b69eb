//! Catalog browsing and diagnostics models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Query parameters for listing tables.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTablesQuery {
    pub connection_name: String,
}

/// Query parameters for listing columns.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListColumnsQuery {
    pub connection_name: String,
    pub table_name: String,
    /// Keep only columns holding at least one meaningful value.
    #[serde(default)]
    pub data_only: bool,
}

/// A column with the first value found in it, for the column picker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnPreview {
    pub name: String,
    #[schema(value_type = Object)]
    pub first_value: Value,
}

/// Current scheduler activity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncStatusResponse {
    pub current_command: String,
}

/// Request body for an ad-hoc diagnostic query.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    #[validate(length(min = 1, message = "connection_name is required"))]
    pub connection_name: String,

    #[validate(length(min = 1, message = "SQL statement is required"))]
    pub sql: String,

    /// Maximum number of rows to return (default: 1000).
    #[serde(default = "default_limit")]
    pub limit: Option<u32>,
}

fn default_limit() -> Option<u32> {
    Some(1000)
}

/// Result of an ad-hoc query.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueryResult {
    pub columns: Vec<String>,

    /// Row data (each row is a vector of JSON values).
    #[schema(value_type = Vec<Vec<Object>>)]
    pub rows: Vec<Vec<Value>>,

    #[serde(default)]
    pub row_count: usize,

    #[serde(default)]
    pub execution_time_ms: u64,
}

/// Whether a value counts as data for the `data_only` column filter.
///
/// Nulls, blank strings and numeric zero do not.
pub fn is_meaningful(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => true,
    }
}
