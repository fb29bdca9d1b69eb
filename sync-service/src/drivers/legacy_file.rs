//! The Point of Rental `.mdb` file.
//!
//! A session owns one in-memory image of the file, read when the session
//! opens, so every pass sees the file as it is on disk at that moment.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde_json::{Number, Value};

use common::errors::{AppError, AppResult};
use common::models::is_meaningful;
use jet_reader::{Database, JetError, Value as JetValue};

use super::{hex, SourceSession};

/// Driver for a legacy database file.
pub struct LegacyFileDriver {
    name: String,
    path: PathBuf,
}

impl LegacyFileDriver {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn open(&self) -> AppResult<LegacyFileSession> {
        let path = self.path.clone();
        let database = tokio::task::spawn_blocking(move || Database::open(path))
            .await
            .map_err(|e| AppError::Internal(format!("legacy file reader panicked: {e}")))?
            .map_err(|e| match e {
                JetError::Io(io) => AppError::Connectivity(format!(
                    "{}: cannot read {}: {io}",
                    self.name,
                    self.path.display()
                )),
                other => AppError::LegacyFile(format!("{}: {other}", self.name)),
            })?;

        tracing::debug!(
            connection = %self.name,
            version = ?database.version(),
            "legacy file session opened"
        );
        Ok(LegacyFileSession {
            name: self.name.clone(),
            path: self.path.clone(),
            database,
        })
    }
}

pub struct LegacyFileSession {
    name: String,
    path: PathBuf,
    database: Database,
}

impl LegacyFileSession {
    fn column(&self, table: &str, column: &str, limit: usize) -> AppResult<Vec<JetValue>> {
        self.database
            .table(table)
            .and_then(|t| t.column_values(column, limit))
            .map_err(map_read_error)
    }
}

fn map_read_error(error: JetError) -> AppError {
    match error {
        JetError::TableNotFound(table) => AppError::NotFound(format!("table {table}")),
        JetError::ColumnNotFound { table, column } => {
            AppError::NotFound(format!("column {table}.{column}"))
        }
        other => AppError::Query(other.to_string()),
    }
}

/// JSON form of a decoded cell.
pub fn to_json(value: JetValue) -> Value {
    match value {
        JetValue::Null => Value::Null,
        JetValue::Bool(v) => Value::Bool(v),
        JetValue::Byte(v) => Value::from(v),
        JetValue::Int(v) => Value::from(v),
        JetValue::Long(v) => Value::from(v),
        JetValue::BigInt(v) => Value::from(v),
        JetValue::Float(v) => Number::from_f64(f64::from(v)).map_or(Value::Null, Value::Number),
        JetValue::Double(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        JetValue::DateTime(v) => {
            Value::String(v.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        JetValue::Text(s) => Value::String(s),
        JetValue::Binary(bytes) => Value::String(hex(&bytes)),
        exact @ (JetValue::Currency(_) | JetValue::Guid(_) | JetValue::Numeric(_)) => {
            Value::String(exact.to_string())
        }
    }
}

#[async_trait]
impl SourceSession for LegacyFileSession {
    async fn list_tables(&mut self) -> AppResult<Vec<String>> {
        Ok(self
            .database
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> AppResult<Vec<String>> {
        let table = self.database.table(table).map_err(map_read_error)?;
        Ok(table
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    async fn fetch_column_values(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> AppResult<Vec<Value>> {
        let values = self.column(table, column, limit)?;
        Ok(values.into_iter().map(to_json).collect())
    }

    async fn has_meaningful_values(&mut self, table: &str, column: &str) -> AppResult<bool> {
        let values = self.column(table, column, usize::MAX)?;
        Ok(values.into_iter().map(to_json).any(|v| is_meaningful(&v)))
    }

    fn describe_fetch(&self, table: &str, column: &str, limit: usize) -> String {
        format!("read {table}.{column} (first {limit} rows)")
    }

    async fn ping(&mut self) -> AppResult<()> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| {
                AppError::Connectivity(format!("{}: {} is gone: {e}", self.name, self.path.display()))
            })
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        tracing::debug!(connection = %self.name, "legacy file session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use jet_reader::testing::{build_database, TestTable};
    use jet_reader::ColumnType;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_file() -> (TempDir, PathBuf) {
        let contract = TestTable::new(
            "Contracts",
            &[
                ("CNTR", ColumnType::Text),
                ("Total", ColumnType::Currency),
                ("Empty", ColumnType::Text),
                ("Notes", ColumnType::Memo),
            ],
        )
        .row(vec![
            JetValue::Text("C100".into()),
            JetValue::Currency(1_234_500),
            JetValue::Null,
            JetValue::Text("x".repeat(300)),
        ])
        .row(vec![
            JetValue::Text("C101".into()),
            JetValue::Currency(0),
            JetValue::Text(" ".into()),
            JetValue::Null,
        ]);
        let items = TestTable::new("ItemFile", &[("NUM", ColumnType::Long)])
            .row(vec![JetValue::Long(7)]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("por.mdb");
        std::fs::write(&path, build_database(&[contract, items])).unwrap();
        (dir, path)
    }

    #[test]
    fn test_to_json() {
        assert_eq!(to_json(JetValue::Null), Value::Null);
        assert_eq!(to_json(JetValue::Int(-4)), json!(-4));
        assert_eq!(to_json(JetValue::Float(1.5)), json!(1.5));
        assert_eq!(to_json(JetValue::Double(f64::NAN)), Value::Null);
        assert_eq!(to_json(JetValue::Binary(vec![0xab, 0x01])), json!("ab01"));
        assert_eq!(to_json(JetValue::Currency(1_234_500)), json!("123.4500"));
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 250)
            .unwrap();
        assert_eq!(to_json(JetValue::DateTime(at)), json!("2024-03-01T08:30:00.250Z"));
    }

    #[tokio::test]
    async fn test_lists_tables_and_columns() {
        let (_dir, path) = write_file();
        let driver = LegacyFileDriver::new("POINT_OF_RENTAL", path);
        let mut session = driver.open().await.unwrap();

        assert_eq!(session.list_tables().await.unwrap(), vec!["Contracts", "ItemFile"]);
        assert_eq!(
            session.list_columns("contracts").await.unwrap(),
            vec!["CNTR", "Total", "Empty", "Notes"]
        );
        assert!(matches!(
            session.list_columns("Ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetches_column_values() {
        let (_dir, path) = write_file();
        let mut session = LegacyFileDriver::new("POINT_OF_RENTAL", path).open().await.unwrap();

        let ids = session
            .fetch_column_values("Contracts", "CNTR", 365)
            .await
            .unwrap();
        assert_eq!(ids, vec![json!("C100"), json!("C101")]);

        let notes = session
            .fetch_column_values("Contracts", "Notes", 1)
            .await
            .unwrap();
        assert_eq!(notes, vec![json!("x".repeat(300))]);

        assert!(matches!(
            session.fetch_column_values("Contracts", "Nope", 10).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_meaningful_values() {
        let (_dir, path) = write_file();
        let mut session = LegacyFileDriver::new("POINT_OF_RENTAL", path).open().await.unwrap();
        assert!(session.has_meaningful_values("Contracts", "Total").await.unwrap());
        assert!(!session.has_meaningful_values("Contracts", "Empty").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_is_connectivity_error() {
        let driver = LegacyFileDriver::new("POINT_OF_RENTAL", PathBuf::from("/nonexistent/por.mdb"));
        assert!(matches!(driver.open().await, Err(AppError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_non_jet_file_is_legacy_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("por.mdb");
        std::fs::write(&path, vec![0u8; 8192]).unwrap();
        let driver = LegacyFileDriver::new("POINT_OF_RENTAL", path);
        assert!(matches!(driver.open().await, Err(AppError::LegacyFile(_))));
    }

    #[tokio::test]
    async fn test_ping_notices_removed_file() {
        let (dir, path) = write_file();
        let mut session = LegacyFileDriver::new("POINT_OF_RENTAL", path.clone())
            .open()
            .await
            .unwrap();
        session.ping().await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(session.ping().await, Err(AppError::Connectivity(_))));
        drop(dir);
    }
}
