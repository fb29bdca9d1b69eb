//! Environment-driven configuration.
//!
//! The connection set is fixed; only each connection's descriptor comes from
//! the environment.

use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::models::connection::{ConnectionKind, ConnectionSpec, SqlBackend};

/// Logical connection names, in registration order.
pub const CONNECTION_NAMES: [&str; 4] = ["EPICOR", "POINT_OF_RENTAL", "QUICKBOOKS", "JOBSCOPE"];

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DATABASE_URL: &str = "sqlite://./dev.db";
const DEFAULT_SYNC_INTERVAL_MS: u64 = 2000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    /// Selection store location.
    pub database_url: String,
    pub sync_interval_ms: u64,
    pub connect_timeout_secs: u64,
    pub connections: Vec<ConnectionSpec>,
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn load_with_service(service_name: &str) -> AppResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| AppError::Config(format!("cannot resolve working directory: {e}")))?;
        Self::from_lookup(service_name, &cwd, |key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    ///
    /// Relative legacy-file paths are resolved against `base_dir`.
    pub fn from_lookup(
        service_name: &str,
        base_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> AppResult<Self> {
        let port = parse_or(&lookup, "SERVER_PORT", DEFAULT_PORT)?;
        let sync_interval_ms = parse_or(&lookup, "SYNC_INTERVAL_MS", DEFAULT_SYNC_INTERVAL_MS)?;
        if sync_interval_ms == 0 {
            return Err(AppError::Config("SYNC_INTERVAL_MS must be positive".into()));
        }
        let connect_timeout_secs =
            parse_or(&lookup, "CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?;

        let database_url = normalize_database_url(
            &non_empty(&lookup, "DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
        );

        Ok(Self {
            service_name: service_name.to_string(),
            host: non_empty(&lookup, "SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
            port,
            database_url,
            sync_interval_ms,
            connect_timeout_secs,
            connections: load_connections(base_dir, &lookup),
        })
    }
}

/// Resolves the descriptor of every fixed connection.
pub fn load_connections(
    base_dir: &Path,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Vec<ConnectionSpec> {
    CONNECTION_NAMES
        .iter()
        .map(|name| ConnectionSpec {
            name: (*name).to_string(),
            kind: connection_kind(name, base_dir, lookup),
        })
        .collect()
}

fn connection_kind(
    name: &str,
    base_dir: &Path,
    lookup: &impl Fn(&str) -> Option<String>,
) -> ConnectionKind {
    let prefix = env_prefix(name);

    if name == "POINT_OF_RENTAL" {
        let path = non_empty(lookup, "POR_PATH").or_else(|| non_empty(lookup, "POR_Path"));
        if let Some(path) = path {
            return ConnectionKind::LegacyFile {
                path: absolutize(base_dir, &path),
            };
        }
    }

    match non_empty(lookup, &format!("{prefix}_DSN")) {
        Some(dsn) if SqlBackend::detect(&dsn).is_some() => ConnectionKind::Relational {
            dsn,
            default_schema: non_empty(lookup, &format!("{prefix}_SCHEMA")),
        },
        Some(_) => {
            tracing::warn!(
                connection = name,
                "{prefix}_DSN is neither a connection URL nor a SQL Server connection string; \
                 connection left unimplemented"
            );
            ConnectionKind::Unimplemented
        }
        None => ConnectionKind::Unimplemented,
    }
}

fn env_prefix(name: &str) -> &str {
    match name {
        "POINT_OF_RENTAL" => "POR",
        "QUICKBOOKS" => "QB",
        other => other,
    }
}

fn absolutize(base_dir: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Accepts `file:` style locations for the selection store.
fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("file:") {
        Some(path) => format!("sqlite://{}", path.trim_start_matches("//")),
        None => url.to_string(),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> AppResult<T> {
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup("sync-service", Path::new("/srv"), lookup(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3001);
        assert_eq!(config.database_url, "sqlite://./dev.db");
        assert_eq!(config.sync_interval_ms, 2000);
        assert_eq!(config.connections.len(), 4);
        assert!(config
            .connections
            .iter()
            .all(|c| c.kind == ConnectionKind::Unimplemented));
    }

    #[test]
    fn test_connection_descriptors() {
        let vars = lookup(&[
            ("EPICOR_DSN", "postgres://erp@db/epicor"),
            ("EPICOR_SCHEMA", "Erp"),
            ("POR_Path", "data/por.mdb"),
            ("JOBSCOPE_DSN", "  "),
        ]);
        let connections = load_connections(Path::new("/srv"), &vars);

        assert_eq!(connections[0].name, "EPICOR");
        assert_eq!(
            connections[0].kind,
            ConnectionKind::Relational {
                dsn: "postgres://erp@db/epicor".into(),
                default_schema: Some("Erp".into()),
            }
        );
        assert_eq!(
            connections[1].kind,
            ConnectionKind::LegacyFile {
                path: PathBuf::from("/srv/data/por.mdb")
            }
        );
        assert_eq!(connections[2].kind, ConnectionKind::Unimplemented);
        assert_eq!(connections[3].kind, ConnectionKind::Unimplemented);
    }

    #[test]
    fn test_odbc_data_source_name_is_unimplemented() {
        let vars = lookup(&[
            ("EPICOR_DSN", "P21"),
            ("JOBSCOPE_DSN", "Server=tcp:jobscope,1433;Database=JS;User Id=sync;Password=pw"),
        ]);
        let connections = load_connections(Path::new("/srv"), &vars);
        assert_eq!(connections[0].kind, ConnectionKind::Unimplemented);
        assert!(matches!(connections[3].kind, ConnectionKind::Relational { .. }));
    }

    #[test]
    fn test_por_path_takes_precedence_over_dsn() {
        let vars = lookup(&[("POR_DSN", "mysql://por@db/por"), ("POR_PATH", "/data/por.mdb")]);
        let connections = load_connections(Path::new("/srv"), &vars);
        assert!(matches!(connections[1].kind, ConnectionKind::LegacyFile { .. }));
    }

    #[test]
    fn test_file_database_url_is_rewritten() {
        let config = AppConfig::from_lookup(
            "sync-service",
            Path::new("/srv"),
            lookup(&[("DATABASE_URL", "file:./selections.db")]),
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite://./selections.db");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let result =
            AppConfig::from_lookup("sync-service", Path::new("/srv"), lookup(&[("SERVER_PORT", "x")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
