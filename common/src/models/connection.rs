//! Connection configuration models.
//!
//! Contains models for the fixed set of logical source connections.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Driver family behind a logical connection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// SQL-accessible system reached through the generic driver layer.
    Relational,
    /// Legacy desktop-database file read from disk.
    LegacyFile,
    /// Reserved name with no usable descriptor.
    Unimplemented,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Relational => write!(f, "relational"),
            DriverKind::LegacyFile => write!(f, "legacy_file"),
            DriverKind::Unimplemented => write!(f, "unimplemented"),
        }
    }
}

/// Connectivity descriptor of a connection (stored internally, never serialized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Connection URL understood by the SQL driver layer.
    Relational {
        dsn: String,
        /// Schema tried first when probing catalogs.
        default_schema: Option<String>,
    },
    /// Absolute path to the database file.
    LegacyFile { path: PathBuf },
    Unimplemented,
}

/// SQL backend named by a relational descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlBackend {
    Postgres,
    MySql,
    Sqlite,
    SqlServer,
}

/// Keys that mark an ADO.NET style SQL Server connection string.
const ADO_SERVER_KEYS: [&str; 5] = ["server", "data source", "address", "addr", "network address"];

impl SqlBackend {
    /// Recognizes connection URLs, JDBC SQL Server URLs and ADO.NET
    /// `Server=...;` strings.
    ///
    /// Bare ODBC data source names and `Driver=`/`DSN=` strings are not
    /// recognized; they need an ODBC driver manager.
    pub fn detect(dsn: &str) -> Option<Self> {
        let lower = dsn.trim().to_ascii_lowercase();
        if lower.starts_with("jdbc:sqlserver://") {
            return Some(SqlBackend::SqlServer);
        }
        if let Ok(url) = url::Url::parse(&lower) {
            return match url.scheme() {
                "postgres" | "postgresql" => Some(SqlBackend::Postgres),
                "mysql" => Some(SqlBackend::MySql),
                "sqlite" => Some(SqlBackend::Sqlite),
                "mssql" | "sqlserver" => Some(SqlBackend::SqlServer),
                _ => None,
            };
        }

        let keys: Vec<&str> = lower
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, _)| key.trim())
            .collect();
        if keys.iter().any(|k| *k == "dsn" || *k == "driver") {
            return None;
        }
        keys.iter()
            .any(|k| ADO_SERVER_KEYS.contains(k))
            .then_some(SqlBackend::SqlServer)
    }
}

/// One logical connection, immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    pub name: String,
    pub kind: ConnectionKind,
}

impl ConnectionSpec {
    /// Returns the driver family of this connection.
    pub fn driver_kind(&self) -> DriverKind {
        match self.kind {
            ConnectionKind::Relational { .. } => DriverKind::Relational,
            ConnectionKind::LegacyFile { .. } => DriverKind::LegacyFile,
            ConnectionKind::Unimplemented => DriverKind::Unimplemented,
        }
    }
}

/// Connection item for API responses (excludes the descriptor).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionItem {
    /// Logical connection name.
    pub name: String,
    /// Driver family.
    pub driver: DriverKind,
}

impl From<&ConnectionSpec> for ConnectionItem {
    fn from(spec: &ConnectionSpec) -> Self {
        Self {
            name: spec.name.clone(),
            driver: spec.driver_kind(),
        }
    }
}

/// Request body for testing a single connection.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TestConnectionRequest {
    #[validate(length(min = 1, message = "connection_name is required"))]
    pub connection_name: String,
}

/// Outcome of a connection test. Tests never fail as a whole; the error is reported inline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionTestResult {
    pub connection_name: String,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_hides_descriptor() {
        let spec = ConnectionSpec {
            name: "EPICOR".into(),
            kind: ConnectionKind::Relational {
                dsn: "postgres://user:secret@db/erp".into(),
                default_schema: None,
            },
        };
        let json = serde_json::to_string(&ConnectionItem::from(&spec)).unwrap();
        assert_eq!(json, r#"{"name":"EPICOR","driver":"relational"}"#);
    }

    #[test]
    fn test_detect_sql_backend() {
        assert_eq!(SqlBackend::detect("postgres://erp@db/epicor"), Some(SqlBackend::Postgres));
        assert_eq!(SqlBackend::detect("mysql://u@h/jobs"), Some(SqlBackend::MySql));
        assert_eq!(SqlBackend::detect("sqlite://./erp.db"), Some(SqlBackend::Sqlite));
        assert_eq!(SqlBackend::detect("mssql://sa:pw@p21/P21"), Some(SqlBackend::SqlServer));
        assert_eq!(
            SqlBackend::detect("jdbc:sqlserver://p21:1433;databaseName=P21"),
            Some(SqlBackend::SqlServer)
        );
        assert_eq!(
            SqlBackend::detect("Server=tcp:p21,1433;Database=P21;User Id=sa;Password=pw"),
            Some(SqlBackend::SqlServer)
        );
    }

    #[test]
    fn test_odbc_names_are_not_recognized() {
        assert_eq!(SqlBackend::detect("P21"), None);
        assert_eq!(SqlBackend::detect("DSN=P21"), None);
        assert_eq!(
            SqlBackend::detect("Driver={ODBC Driver 17 for SQL Server};Server=p21"),
            None
        );
        assert_eq!(SqlBackend::detect("oracle://u@h/erp"), None);
    }
}
