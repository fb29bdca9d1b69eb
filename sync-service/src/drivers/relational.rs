//! SQL sources reached through the sqlx `Any` driver.
//!
//! The backend is picked from the connection URL scheme; the dialect decides
//! identifier quoting, placeholders and catalog queries.

use std::sync::Once;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Column, Connection as _, Row};

use common::errors::{AppError, AppResult};
use common::models::{is_meaningful, QueryResult, SNAPSHOT_LIMIT};
use common::utils::{quote_identifier, QuoteStyle};

use super::{hex, result_index, SourceSession};
use crate::prober::{AttemptOutcome, CatalogColumn, CatalogSource, SchemaProber};

static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// SQL dialect of a relational connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &url::Url) -> Option<Self> {
        match url.scheme() {
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mysql" => Some(Dialect::MySql),
            "sqlite" => Some(Dialect::Sqlite),
            _ => None,
        }
    }

    /// SQLite turns an unknown double-quoted identifier into a string
    /// literal, so it gets backticks too.
    fn quote_style(self) -> QuoteStyle {
        match self {
            Dialect::MySql | Dialect::Sqlite => QuoteStyle::Backtick,
            Dialect::Postgres => QuoteStyle::DoubleQuote,
        }
    }

    pub fn quote(self, identifier: &str) -> String {
        quote_identifier(identifier, self.quote_style())
    }

    /// Bind placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${n}"),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Casts a catalog expression to plain text.
    fn text(self, expr: &str) -> String {
        match self {
            Dialect::Postgres => format!("{expr}::text"),
            Dialect::MySql => format!("CAST({expr} AS CHAR)"),
            Dialect::Sqlite => format!("CAST({expr} AS TEXT)"),
        }
    }

    /// Schema searched first when resolving table columns.
    fn default_schema(self, url: &url::Url) -> String {
        match self {
            Dialect::Postgres => "public".to_string(),
            Dialect::Sqlite => "main".to_string(),
            Dialect::MySql => {
                let database = url.path().trim_start_matches('/');
                if database.is_empty() {
                    "dbo".to_string()
                } else {
                    database.to_string()
                }
            }
        }
    }
}

/// Maps driver failures onto the error taxonomy.
fn map_sqlx(connection: &str, error: sqlx::Error) -> AppError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => AppError::Connectivity(format!("{connection}: {error}")),
        other => AppError::Query(other.to_string()),
    }
}

/// Driver for one relational connection.
pub struct RelationalDriver {
    name: String,
    dsn: String,
    dialect: Option<Dialect>,
    default_schema: String,
    connect_timeout: Duration,
}

impl RelationalDriver {
    pub fn new(
        name: &str,
        dsn: &str,
        schema_override: Option<&str>,
        connect_timeout: Duration,
    ) -> Self {
        let url = url::Url::parse(dsn).ok();
        let dialect = url.as_ref().and_then(Dialect::from_url);
        let default_schema = match (schema_override, dialect, &url) {
            (Some(schema), _, _) => schema.to_string(),
            (None, Some(dialect), Some(url)) => dialect.default_schema(url),
            _ => "dbo".to_string(),
        };
        if dialect.is_none() {
            tracing::warn!(connection = name, "connection URL scheme has no SQL driver");
        }
        Self {
            name: name.to_string(),
            dsn: dsn.to_string(),
            dialect,
            default_schema,
            connect_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn open(&self) -> AppResult<RelationalSession> {
        let dialect = self.dialect.ok_or_else(|| {
            AppError::Unsupported(format!(
                "{}: connection URL scheme is not supported",
                self.name
            ))
        })?;
        install_drivers();

        let conn = tokio::time::timeout(self.connect_timeout, AnyConnection::connect(&self.dsn))
            .await
            .map_err(|_| {
                AppError::Connectivity(format!(
                    "{}: connect timed out after {}s",
                    self.name,
                    self.connect_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::Connectivity(format!("{}: {e}", self.name)))?;

        tracing::debug!(connection = %self.name, ?dialect, "relational session opened");
        Ok(RelationalSession {
            name: self.name.clone(),
            conn,
            dialect,
            default_schema: self.default_schema.clone(),
        })
    }
}

/// One open connection; dropped sessions close their socket.
pub struct RelationalSession {
    name: String,
    conn: AnyConnection,
    dialect: Dialect,
    default_schema: String,
}

impl RelationalSession {
    fn select_sql(&self, table: &str, column: &str, limit: usize) -> String {
        format!(
            "SELECT {} FROM {} LIMIT {limit}",
            self.dialect.quote(column),
            self.dialect.quote(table)
        )
    }

    async fn fetch_strings(&mut self, sql: &str, binds: &[&str]) -> AppResult<Vec<String>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(bind.to_string());
        }
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx(&self.name, e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<String, _>(0)
                    .map_err(|e| AppError::Query(e.to_string()))
            })
            .collect()
    }

    async fn fetch_values(&mut self, sql: &str, column: &str) -> AppResult<Vec<Value>> {
        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx(&self.name, e))?;
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let names: Vec<&str> = first.columns().iter().map(|c| c.name()).collect();
        let index = result_index(&self.name, &names, column)?;
        rows.iter().map(|row| decode_value(row, index)).collect()
    }

    /// Classifies a failed fetch by re-reading the table's columns.
    async fn classify_failure(&mut self, table: &str, column: &str, error: AppError) -> AppError {
        if error.is_connection_level() {
            return error;
        }
        match self.list_columns(table).await {
            Err(AppError::NotFound(_)) => AppError::NotFound(format!("table {table}")),
            Ok(columns) if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) => {
                AppError::NotFound(format!("column {table}.{column}"))
            }
            _ => error,
        }
    }

    async fn list_tables_information_schema(&mut self) -> AppResult<Vec<String>> {
        let d = self.dialect;
        let schema = self.default_schema.clone();
        let name = d.text("TABLE_NAME");

        let mut tables = self
            .fetch_strings(
                &format!(
                    "SELECT {name} FROM INFORMATION_SCHEMA.TABLES \
                     WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE'",
                    d.placeholder(1)
                ),
                &[&schema],
            )
            .await?;

        let views = self
            .fetch_strings(
                &format!(
                    "SELECT {name} FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_SCHEMA = {}",
                    d.placeholder(1)
                ),
                &[&schema],
            )
            .await;
        match views {
            Ok(views) if !views.is_empty() => tables.extend(views),
            _ => {
                // Some catalogs keep views out of VIEWS; fall back to naming convention
                let named = self
                    .fetch_strings(
                        &format!(
                            "SELECT {name} FROM INFORMATION_SCHEMA.TABLES \
                             WHERE TABLE_SCHEMA = {} AND LOWER(TABLE_NAME) LIKE '%view%'",
                            d.placeholder(1)
                        ),
                        &[&schema],
                    )
                    .await
                    .unwrap_or_default();
                tables.extend(named);
            }
        }
        Ok(tables)
    }
}

/// Decodes one cell into a JSON scalar.
fn decode_value(row: &AnyRow, index: usize) -> AppResult<Value> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return Ok(v.map_or(Value::Null, |f| Value::from(f64::from(f))));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::Bool));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::String));
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(index) {
        return Ok(v.map_or(Value::Null, |bytes| Value::String(hex(&bytes))));
    }
    Err(AppError::Query(format!(
        "result column {index} has a type that cannot be represented"
    )))
}

#[async_trait]
impl CatalogSource for RelationalSession {
    async fn columns_for(
        &mut self,
        name: &str,
        schema: Option<&str>,
    ) -> AppResult<Vec<CatalogColumn>> {
        let d = self.dialect;

        if d == Dialect::Sqlite {
            let (sql, binds): (&str, Vec<&str>) = match schema {
                Some(schema) => (
                    "SELECT name FROM pragma_table_info(?, ?) ORDER BY cid",
                    vec![name, schema],
                ),
                None => ("SELECT name FROM pragma_table_info(?) ORDER BY cid", vec![name]),
            };
            let columns = self.fetch_strings(sql, &binds).await?;
            return Ok(columns
                .into_iter()
                .map(|name| CatalogColumn {
                    name,
                    schema: schema.map(str::to_string),
                })
                .collect());
        }

        let select = format!(
            "SELECT {}, {} FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = {}",
            d.text("COLUMN_NAME"),
            d.text("TABLE_SCHEMA"),
            d.placeholder(1)
        );
        let sql = match schema {
            Some(_) => format!(
                "{select} AND TABLE_SCHEMA = {} ORDER BY ORDINAL_POSITION",
                d.placeholder(2)
            ),
            None => format!("{select} ORDER BY TABLE_SCHEMA, ORDINAL_POSITION"),
        };

        let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(name.to_string());
        if let Some(schema) = schema {
            query = query.bind(schema.to_string());
        }
        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| map_sqlx(&self.name, e))?;
        Ok(rows
            .into_iter()
            .map(|(name, schema)| CatalogColumn {
                name,
                schema: Some(schema),
            })
            .collect())
    }
}

#[async_trait]
impl SourceSession for RelationalSession {
    async fn list_tables(&mut self) -> AppResult<Vec<String>> {
        let mut tables = match self.dialect {
            Dialect::Sqlite => {
                self.fetch_strings(
                    "SELECT name FROM sqlite_master \
                     WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
                    &[],
                )
                .await?
            }
            Dialect::Postgres | Dialect::MySql => self.list_tables_information_schema().await?,
        };
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    async fn list_columns(&mut self, table: &str) -> AppResult<Vec<String>> {
        let prober = SchemaProber::new(self.default_schema.clone());
        let result = prober.probe(self, table).await?;
        if result.attempts.len() > 1 {
            let failed: Vec<String> = result
                .attempts
                .iter()
                .filter(|a| matches!(a.outcome, AttemptOutcome::Error(_)))
                .map(|a| a.strategy.to_string())
                .collect();
            tracing::info!(
                connection = %self.name,
                table,
                strategy = %result.strategy,
                schema = result.matched_schema.as_deref().unwrap_or(""),
                attempts = result.attempts.len(),
                ?failed,
                "table resolved by a fallback lookup"
            );
        }
        Ok(result.columns)
    }

    async fn fetch_column_values(
        &mut self,
        table: &str,
        column: &str,
        limit: usize,
    ) -> AppResult<Vec<Value>> {
        let sql = self.select_sql(table, column, limit);
        let error = match self.fetch_values(&sql, column).await {
            Ok(values) => return Ok(values),
            Err(e) => e,
        };
        if error.is_connection_level() {
            return Err(error);
        }

        // Types the generic driver cannot decode are retried as text
        let d = self.dialect;
        let text_sql = format!(
            "SELECT {} AS {} FROM {} LIMIT {limit}",
            d.text(&d.quote(column)),
            d.quote(column),
            d.quote(table)
        );
        match self.fetch_values(&text_sql, column).await {
            Ok(values) => {
                tracing::debug!(connection = %self.name, table, column, "values fetched as text");
                Ok(values)
            }
            Err(_) => Err(self.classify_failure(table, column, error).await),
        }
    }

    async fn has_meaningful_values(&mut self, table: &str, column: &str) -> AppResult<bool> {
        let d = self.dialect;
        let quoted = d.quote(column);
        let sql = format!(
            "SELECT {quoted} FROM {} WHERE {quoted} IS NOT NULL LIMIT {SNAPSHOT_LIMIT}",
            d.quote(table)
        );
        let values = self.fetch_values(&sql, column).await?;
        Ok(values.iter().any(is_meaningful))
    }

    fn describe_fetch(&self, table: &str, column: &str, limit: usize) -> String {
        self.select_sql(table, column, limit)
    }

    async fn run_query(&mut self, sql: &str, limit: usize) -> AppResult<QueryResult> {
        let start = Instant::now();
        let rows: Vec<AnyRow> = sqlx::query(sql)
            .fetch(&mut self.conn)
            .take(limit)
            .try_collect()
            .await
            .map_err(|e| map_sqlx(&self.name, e))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let values = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
            .collect::<AppResult<Vec<Vec<Value>>>>()?;

        Ok(QueryResult {
            columns,
            row_count: values.len(),
            rows: values,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn ping(&mut self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&mut self.conn)
            .await
            .map_err(|e| map_sqlx(&self.name, e))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> AppResult<()> {
        let name = self.name;
        self.conn
            .close()
            .await
            .map_err(|e| AppError::Connectivity(format!("{name}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn seeded_database() -> (TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erp.db");
        let url = format!("sqlite://{}", path.display());

        let options = SqliteConnectOptions::from_str(&url)
            .unwrap()
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        for statement in [
            "CREATE TABLE Part (PartNum TEXT, Qty INTEGER, Price REAL, Blank TEXT, Photo BLOB)",
            "INSERT INTO Part VALUES ('A-1', 5, 2.5, NULL, x'00ff')",
            "INSERT INTO Part VALUES ('B-2', 0, 1.0, '  ', NULL)",
            "INSERT INTO Part VALUES ('C-3', 7, NULL, '', NULL)",
            "CREATE VIEW PartView AS SELECT PartNum FROM Part",
        ] {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        pool.close().await;
        (dir, url)
    }

    fn driver(url: &str) -> RelationalDriver {
        RelationalDriver::new("EPICOR", url, None, Duration::from_secs(5))
    }

    #[test]
    fn test_dialect_from_url() {
        let parse = |s: &str| Dialect::from_url(&url::Url::parse(s).unwrap());
        assert_eq!(parse("postgres://u@h/db"), Some(Dialect::Postgres));
        assert_eq!(parse("mysql://u@h/db"), Some(Dialect::MySql));
        assert_eq!(parse("sqlite://./x.db"), Some(Dialect::Sqlite));
        assert_eq!(parse("oracle://u@h/db"), None);
    }

    #[test]
    fn test_dialect_quoting_and_placeholders() {
        assert_eq!(Dialect::MySql.quote("Part"), "`Part`");
        assert_eq!(Dialect::Postgres.quote("Part"), "\"Part\"");
        assert_eq!(Dialect::Sqlite.quote("Part"), "`Part`");
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::MySql.placeholder(2), "?");
    }

    #[test]
    fn test_default_schema() {
        assert_eq!(driver("postgres://u@h/erp").default_schema, "public");
        assert_eq!(driver("mysql://u@h/erp").default_schema, "erp");
        assert_eq!(driver("sqlite://./x.db").default_schema, "main");
        let overridden = RelationalDriver::new("EPICOR", "postgres://u@h/erp", Some("Erp"), Duration::from_secs(1));
        assert_eq!(overridden.default_schema, "Erp");
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_unsupported() {
        let result = driver("oracle://u@h/erp").open().await;
        assert!(matches!(result, Err(AppError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_connectivity_error() {
        let result = driver("sqlite:///nonexistent-dir/erp.db?mode=ro").open().await;
        assert!(matches!(result, Err(AppError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_lists_tables_and_views() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        assert_eq!(session.list_tables().await.unwrap(), vec!["Part", "PartView"]);
        Box::new(session).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_lists_columns_in_declared_order() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        assert_eq!(
            session.list_columns("Part").await.unwrap(),
            vec!["PartNum", "Qty", "Price", "Blank", "Photo"]
        );
        assert!(matches!(
            session.list_columns("Ghost").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetches_values_in_row_order() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();

        let qty = session.fetch_column_values("Part", "Qty", 365).await.unwrap();
        assert_eq!(qty, vec![json!(5), json!(0), json!(7)]);

        let price = session.fetch_column_values("Part", "Price", 2).await.unwrap();
        assert_eq!(price, vec![json!(2.5), json!(1.0)]);

        let photo = session.fetch_column_values("Part", "Photo", 1).await.unwrap();
        assert_eq!(photo, vec![json!("00ff")]);
    }

    #[tokio::test]
    async fn test_single_column_result_is_accepted_under_another_name() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();

        let aliased = session
            .fetch_values("SELECT `Qty` AS q FROM `Part`", "Qty")
            .await
            .unwrap();
        assert_eq!(aliased, vec![json!(5), json!(0), json!(7)]);

        let recased = session.fetch_column_values("Part", "qty", 2).await.unwrap();
        assert_eq!(recased, vec![json!(5), json!(0)]);

        assert!(matches!(
            session
                .fetch_values("SELECT PartNum AS a, Qty AS b FROM Part", "Qty")
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_column_and_table_are_not_found() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        assert!(matches!(
            session.fetch_column_values("Part", "Weight", 10).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            session.fetch_column_values("Ghost", "Qty", 10).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_meaningful_values() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        assert!(session.has_meaningful_values("Part", "Qty").await.unwrap());
        assert!(!session.has_meaningful_values("Part", "Blank").await.unwrap());
    }

    #[tokio::test]
    async fn test_describe_fetch_is_the_sql() {
        let (_dir, url) = seeded_database().await;
        let session = driver(&url).open().await.unwrap();
        assert_eq!(
            session.describe_fetch("Part", "Qty", 365),
            "SELECT `Qty` FROM `Part` LIMIT 365"
        );
    }

    #[tokio::test]
    async fn test_run_query() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        let result = session
            .run_query("SELECT PartNum, Qty FROM Part ORDER BY Qty DESC", 2)
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["PartNum", "Qty"]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[0], vec![json!("C-3"), json!(7)]);
    }

    #[tokio::test]
    async fn test_ping() {
        let (_dir, url) = seeded_database().await;
        let mut session = driver(&url).open().await.unwrap();
        session.ping().await.unwrap();
    }
}
