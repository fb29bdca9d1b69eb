//! Driver abstraction.
//!
//! Every connection kind is reached through a scoped [`SourceSession`]:
//! open it, run catalog and fetch calls, close it. Sessions are never pooled
//! across sync passes.

pub mod legacy_file;
pub mod relational;
pub mod sql_server;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use common::errors::{AppError, AppResult};
use common::models::{is_meaningful, ConnectionKind, ConnectionSpec, ConnectionTestResult, DriverKind};
use common::models::{QueryResult, SqlBackend, SNAPSHOT_LIMIT};

use self::legacy_file::LegacyFileDriver;
use self::relational::RelationalDriver;
use self::sql_server::SqlServerDriver;

/// An open session against one source.
#[async_trait]
pub trait SourceSession: Send {
    /// Table and view names visible to the session.
    async fn list_tables(&mut self) -> AppResult<Vec<String>>;

    /// Column names of `table` in declared order.
    async fn list_columns(&mut self, table: &str) -> AppResult<Vec<String>>;

    /// Up to `limit` values of one column, in source row order.
    async fn fetch_column_values(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> AppResult<Vec<Value>>;

    /// Whether the column holds at least one non-null, non-blank, non-zero value.
    async fn has_meaningful_values(&mut self, table: &str, column: &str) -> AppResult<bool> {
        let values = self.fetch_column_values(table, column, SNAPSHOT_LIMIT).await?;
        Ok(values.iter().any(is_meaningful))
    }

    /// Human-readable description of a fetch, shown as the live sync status.
    fn describe_fetch(&self, table: &str, column: &str, _limit: usize) -> String {
        format!("{table}.{column}")
    }

    /// Runs ad-hoc SQL for diagnostics.
    async fn run_query(&mut self, _sql: &str, _limit: usize) -> AppResult<QueryResult> {
        Err(AppError::Unsupported(
            "ad-hoc queries are not available for this connection".into(),
        ))
    }

    /// Cheap round trip proving the session is usable.
    async fn ping(&mut self) -> AppResult<()>;

    async fn close(self: Box<Self>) -> AppResult<()>;
}

/// Opens sessions by logical connection name.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open_session(&self, connection: &str) -> AppResult<Box<dyn SourceSession>>;
}

/// A registered connection and its driver.
pub enum Connection {
    Relational(RelationalDriver),
    SqlServer(SqlServerDriver),
    LegacyFile(LegacyFileDriver),
    Unimplemented { name: String },
}

impl Connection {
    pub fn from_spec(spec: &ConnectionSpec, connect_timeout: Duration) -> Self {
        match &spec.kind {
            ConnectionKind::Relational {
                dsn,
                default_schema,
            } => match SqlBackend::detect(dsn) {
                Some(SqlBackend::SqlServer) => Connection::SqlServer(SqlServerDriver::new(
                    &spec.name,
                    dsn,
                    default_schema.as_deref(),
                    connect_timeout,
                )),
                _ => Connection::Relational(RelationalDriver::new(
                    &spec.name,
                    dsn,
                    default_schema.as_deref(),
                    connect_timeout,
                )),
            },
            ConnectionKind::LegacyFile { path } => {
                Connection::LegacyFile(LegacyFileDriver::new(&spec.name, path.clone()))
            }
            ConnectionKind::Unimplemented => Connection::Unimplemented {
                name: spec.name.clone(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Connection::Relational(driver) => driver.name(),
            Connection::SqlServer(driver) => driver.name(),
            Connection::LegacyFile(driver) => driver.name(),
            Connection::Unimplemented { name } => name,
        }
    }

    pub fn driver_kind(&self) -> DriverKind {
        match self {
            Connection::Relational(_) | Connection::SqlServer(_) => DriverKind::Relational,
            Connection::LegacyFile(_) => DriverKind::LegacyFile,
            Connection::Unimplemented { .. } => DriverKind::Unimplemented,
        }
    }

    /// Opens a fresh session.
    pub async fn open(&self) -> AppResult<Box<dyn SourceSession>> {
        match self {
            Connection::Relational(driver) => Ok(Box::new(driver.open().await?)),
            Connection::SqlServer(driver) => Ok(Box::new(driver.open().await?)),
            Connection::LegacyFile(driver) => Ok(Box::new(driver.open().await?)),
            Connection::Unimplemented { name } => Err(AppError::Unsupported(format!(
                "{name} has no configured driver"
            ))),
        }
    }

    /// Opens, pings and closes a session. Never fails; errors are reported in the result.
    pub async fn test(&self) -> ConnectionTestResult {
        let start = Instant::now();
        let outcome = async {
            let mut session = self.open().await?;
            session.ping().await?;
            session.close().await
        }
        .await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(()) => ConnectionTestResult {
                connection_name: self.name().to_string(),
                connected: true,
                latency_ms,
                error: None,
            },
            Err(e) => {
                tracing::warn!(connection = %self.name(), error = %e, "connection test failed");
                ConnectionTestResult {
                    connection_name: self.name().to_string(),
                    connected: false,
                    latency_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Position of the requested column among a result's column names.
///
/// Exact names win, then case-insensitive ones. A single-column result is
/// accepted under any name and the mismatch is logged.
pub(crate) fn result_index(connection: &str, names: &[&str], column: &str) -> AppResult<usize> {
    if let Some(index) = names.iter().position(|n| *n == column) {
        return Ok(index);
    }
    if let Some(index) = names.iter().position(|n| n.eq_ignore_ascii_case(column)) {
        return Ok(index);
    }
    if let [returned] = names {
        tracing::warn!(
            connection,
            column,
            returned = *returned,
            "result column name differs from the request; using the single returned column"
        );
        return Ok(0);
    }
    Err(AppError::NotFound(format!("column {column} in result")))
}

/// Renders bytes as lowercase hex, the JSON form of binary values.
pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unimplemented_connection_reports_unsupported() {
        let spec = ConnectionSpec {
            name: "QUICKBOOKS".into(),
            kind: ConnectionKind::Unimplemented,
        };
        let connection = Connection::from_spec(&spec, Duration::from_secs(1));
        assert_eq!(connection.driver_kind(), DriverKind::Unimplemented);
        assert!(matches!(connection.open().await, Err(AppError::Unsupported(_))));

        let result = connection.test().await;
        assert!(!result.connected);
        assert!(result.error.unwrap().contains("QUICKBOOKS"));
    }

    #[test]
    fn test_sql_server_descriptors_get_the_tds_driver() {
        let spec = |dsn: &str| ConnectionSpec {
            name: "EPICOR".into(),
            kind: ConnectionKind::Relational {
                dsn: dsn.into(),
                default_schema: None,
            },
        };
        let timeout = Duration::from_secs(1);
        for dsn in [
            "mssql://sync:pw@p21/P21",
            "Server=tcp:p21,1433;Database=P21;User Id=sync;Password=pw",
        ] {
            let connection = Connection::from_spec(&spec(dsn), timeout);
            assert!(matches!(connection, Connection::SqlServer(_)));
            assert_eq!(connection.driver_kind(), DriverKind::Relational);
        }
        let postgres = Connection::from_spec(&spec("postgres://u@h/erp"), timeout);
        assert!(matches!(postgres, Connection::Relational(_)));
    }

    #[test]
    fn test_result_index() {
        assert_eq!(result_index("EPICOR", &["PartNum", "Qty"], "Qty").unwrap(), 1);
        assert_eq!(result_index("EPICOR", &["PARTNUM", "QTY"], "qty").unwrap(), 1);
        assert_eq!(result_index("EPICOR", &["q"], "Qty").unwrap(), 0);
        assert!(matches!(
            result_index("EPICOR", &["a", "b"], "Qty"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xff, 0x1a]), "00ff1a");
    }
}
