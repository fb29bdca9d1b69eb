//! Shared data models for the sync service.

pub mod catalog;
pub mod connection;
pub mod selection;

// Re-export commonly used types
pub use catalog::{
    is_meaningful, ColumnPreview, ListColumnsQuery, ListTablesQuery, QueryRequest, QueryResult,
    SyncStatusResponse,
};
pub use connection::{
    ConnectionItem, ConnectionKind, ConnectionSpec, ConnectionTestResult, DriverKind, SqlBackend,
    TestConnectionRequest,
};
pub use selection::{CreateSelectionRequest, Selection, SelectionGroup, SNAPSHOT_LIMIT};
