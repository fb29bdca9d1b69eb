//! Column selection models.
//!
//! A selection is a persisted (connection, table, column) reference holding
//! the snapshot of values last fetched for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use validator::Validate;

/// Maximum number of values kept in a snapshot.
pub const SNAPSHOT_LIMIT: usize = 365;

/// A persisted column selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Selection {
    /// Surrogate id, monotonically assigned.
    pub id: i64,
    pub connection_name: String,
    pub table_name: String,
    pub column_name: String,
    /// Values in source row order at fetch time, at most [`SNAPSHOT_LIMIT`].
    #[schema(value_type = Vec<Object>)]
    pub snapshot: Vec<Value>,
    /// Unset until the first successful fetch.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Selection {
    /// Snapshot padded with nulls (or truncated) to exactly `width` positions.
    pub fn positional_values(&self, width: usize) -> Vec<Value> {
        let mut values: Vec<Value> = self.snapshot.iter().take(width).cloned().collect();
        values.resize(width, Value::Null);
        values
    }
}

/// Selections of one connection, in id order.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionGroup {
    pub connection_name: String,
    pub selections: Vec<Selection>,
}

/// Request body for creating a selection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSelectionRequest {
    #[validate(length(min = 1, max = 100, message = "connection_name must be 1-100 characters"))]
    pub connection_name: String,
    #[validate(length(min = 1, max = 256, message = "table_name must be 1-256 characters"))]
    pub table_name: String,
    #[validate(length(min = 1, max = 256, message = "column_name must be 1-256 characters"))]
    pub column_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selection(snapshot: Vec<Value>) -> Selection {
        Selection {
            id: 1,
            connection_name: "EPICOR".into(),
            table_name: "T".into(),
            column_name: "C".into(),
            snapshot,
            last_synced_at: None,
        }
    }

    #[test]
    fn test_positional_values_pads_with_nulls() {
        let values = selection(vec![json!(1), json!("a")]).positional_values(4);
        assert_eq!(values, vec![json!(1), json!("a"), Value::Null, Value::Null]);
    }

    #[test]
    fn test_positional_values_truncates() {
        let values = selection((0..10).map(|i| json!(i)).collect()).positional_values(3);
        assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn test_create_request_rejects_blank_column() {
        let req = CreateSelectionRequest {
            connection_name: "EPICOR".into(),
            table_name: "T".into(),
            column_name: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
