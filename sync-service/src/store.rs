//! Selection store.
//!
//! Selections live in one SQLite table. Snapshots are stored as JSON arrays
//! and replaced wholesale on every sync.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use common::errors::{AppError, AppResult};
use common::models::{Selection, SelectionGroup, SNAPSHOT_LIMIT};

/// Row from the `selected_columns` table.
#[derive(sqlx::FromRow)]
struct SelectionRow {
    id: i64,
    connection_name: String,
    table_name: String,
    column_name: String,
    snapshot_json: String,
    last_synced_at: Option<String>,
}

impl SelectionRow {
    /// An unreadable snapshot reads as empty and an unreadable timestamp as
    /// never synced; the next successful sync rewrites both.
    fn into_selection(self) -> Selection {
        let snapshot = serde_json::from_str::<Vec<Value>>(&self.snapshot_json).unwrap_or_else(|e| {
            tracing::warn!(selection_id = self.id, error = %e, "malformed snapshot; treating as empty");
            Vec::new()
        });
        let last_synced_at = self.last_synced_at.and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(selection_id = self.id, error = %e, "malformed sync timestamp ignored");
                    None
                }
            }
        });
        Selection {
            id: self.id,
            connection_name: self.connection_name,
            table_name: self.table_name,
            column_name: self.column_name,
            snapshot,
            last_synced_at,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, connection_name, table_name, column_name, snapshot_json, last_synced_at FROM selected_columns";

fn store_err(context: &str) -> impl Fn(sqlx::Error) -> AppError + '_ {
    move |e| AppError::Store(format!("{context}: {e}"))
}

/// Persistent set of column selections.
#[derive(Clone)]
pub struct SelectionStore {
    pool: SqlitePool,
}

impl SelectionStore {
    /// Opens the store at `url`, creating the file if needed.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Config(format!("invalid DATABASE_URL {url}: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(store_err("cannot open selection store"))?;
        tracing::info!(url, "selection store opened");
        Ok(Self { pool })
    }

    /// A private in-memory store.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .unwrap();
        let store = Self { pool };
        store.migrate().await.unwrap();
        store
    }

    /// Creates the schema if it does not exist yet.
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS selected_columns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                connection_name TEXT NOT NULL,
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                snapshot_json TEXT NOT NULL DEFAULT '[]',
                last_synced_at TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to create selected_columns"))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_selected_columns_reference \
             ON selected_columns (connection_name, table_name, column_name)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to create selected_columns index"))?;
        Ok(())
    }

    /// Deletes every selection. Returns how many were removed.
    pub async fn purge_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM selected_columns")
            .execute(&self.pool)
            .await
            .map_err(store_err("failed to purge selections"))?;
        Ok(result.rows_affected())
    }

    /// Inserts a selection with an empty snapshot.
    pub async fn insert(&self, connection: &str, table: &str, column: &str) -> AppResult<Selection> {
        let result = sqlx::query(
            "INSERT INTO selected_columns (connection_name, table_name, column_name, snapshot_json) \
             VALUES (?, ?, ?, '[]')",
        )
        .bind(connection)
        .bind(table)
        .bind(column)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to insert selection"))?;

        Ok(Selection {
            id: result.last_insert_rowid(),
            connection_name: connection.to_string(),
            table_name: table.to_string(),
            column_name: column.to_string(),
            snapshot: Vec::new(),
            last_synced_at: None,
        })
    }

    pub async fn get(&self, id: i64) -> AppResult<Selection> {
        sqlx::query_as::<_, SelectionRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err("failed to read selection"))?
            .ok_or(AppError::SelectionNotFound(id))
            .map(SelectionRow::into_selection)
    }

    /// All selections in id order.
    pub async fn list(&self) -> AppResult<Vec<Selection>> {
        let rows = sqlx::query_as::<_, SelectionRow>(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(store_err("failed to list selections"))?;
        Ok(rows.into_iter().map(SelectionRow::into_selection).collect())
    }

    /// Selections grouped by connection, groups in order of first appearance.
    pub async fn list_grouped(&self) -> AppResult<Vec<SelectionGroup>> {
        let mut groups: Vec<SelectionGroup> = Vec::new();
        for selection in self.list().await? {
            match groups
                .iter_mut()
                .find(|g| g.connection_name == selection.connection_name)
            {
                Some(group) => group.selections.push(selection),
                None => groups.push(SelectionGroup {
                    connection_name: selection.connection_name.clone(),
                    selections: vec![selection],
                }),
            }
        }
        Ok(groups)
    }

    /// Replaces a selection's snapshot and stamps the sync time.
    ///
    /// Values beyond the snapshot limit are dropped.
    pub async fn update_snapshot(
        &self,
        id: i64,
        values: &[Value],
        synced_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let kept = &values[..values.len().min(SNAPSHOT_LIMIT)];
        let snapshot = serde_json::to_string(kept)
            .map_err(|e| AppError::Internal(format!("cannot encode snapshot: {e}")))?;

        let result = sqlx::query(
            "UPDATE selected_columns SET snapshot_json = ?, last_synced_at = ? WHERE id = ?",
        )
        .bind(snapshot)
        .bind(synced_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err("failed to update snapshot"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::SelectionNotFound(id));
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM selected_columns WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_err("failed to delete selection"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::SelectionNotFound(id));
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SelectionStore::in_memory().await;
        let created = store.insert("EPICOR", "Part", "PartNum").await.unwrap();
        assert!(created.snapshot.is_empty());
        assert!(created.last_synced_at.is_none());
        assert_eq!(store.get(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let store = SelectionStore::in_memory().await;
        let a = store.insert("EPICOR", "Part", "PartNum").await.unwrap();
        let b = store.insert("EPICOR", "Part", "PartNum").await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_grouped_in_first_appearance_order() {
        let store = SelectionStore::in_memory().await;
        store.insert("JOBSCOPE", "Jobs", "Id").await.unwrap();
        store.insert("EPICOR", "Part", "PartNum").await.unwrap();
        store.insert("JOBSCOPE", "Jobs", "Name").await.unwrap();

        let groups = store.list_grouped().await.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.connection_name.as_str()).collect();
        assert_eq!(names, vec!["JOBSCOPE", "EPICOR"]);
        let columns: Vec<_> = groups[0]
            .selections
            .iter()
            .map(|s| s.column_name.as_str())
            .collect();
        assert_eq!(columns, vec!["Id", "Name"]);
    }

    #[tokio::test]
    async fn test_update_snapshot_replaces_and_truncates() {
        let store = SelectionStore::in_memory().await;
        let s = store.insert("EPICOR", "Part", "Qty").await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let many: Vec<Value> = (0..400).map(|i| json!(i)).collect();
        store.update_snapshot(s.id, &many, at).await.unwrap();
        let stored = store.get(s.id).await.unwrap();
        assert_eq!(stored.snapshot.len(), SNAPSHOT_LIMIT);
        assert_eq!(stored.snapshot[364], json!(364));
        assert_eq!(stored.last_synced_at, Some(at));

        store
            .update_snapshot(s.id, &[json!("a"), Value::Null], at)
            .await
            .unwrap();
        assert_eq!(store.get(s.id).await.unwrap().snapshot, vec![json!("a"), Value::Null]);
    }

    #[tokio::test]
    async fn test_missing_selection() {
        let store = SelectionStore::in_memory().await;
        assert!(matches!(store.get(42).await, Err(AppError::SelectionNotFound(42))));
        assert!(matches!(
            store.update_snapshot(42, &[], Utc::now()).await,
            Err(AppError::SelectionNotFound(42))
        ));
        assert!(matches!(store.delete(42).await, Err(AppError::SelectionNotFound(42))));
    }

    #[tokio::test]
    async fn test_damaged_row_does_not_break_listing() {
        let store = SelectionStore::in_memory().await;
        let good = store.insert("EPICOR", "Part", "Qty").await.unwrap();
        sqlx::query(
            "INSERT INTO selected_columns (connection_name, table_name, column_name, snapshot_json, last_synced_at) \
             VALUES ('EPICOR', 'Part', 'PartNum', '[1, 2', 'yesterday')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], good);
        assert!(listed[1].snapshot.is_empty());
        assert!(listed[1].last_synced_at.is_none());

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        store.update_snapshot(listed[1].id, &[json!("A-1")], at).await.unwrap();
        let repaired = store.get(listed[1].id).await.unwrap();
        assert_eq!(repaired.snapshot, vec![json!("A-1")]);
        assert_eq!(repaired.last_synced_at, Some(at));
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let store = SelectionStore::in_memory().await;
        let a = store.insert("EPICOR", "Part", "PartNum").await.unwrap();
        store.insert("EPICOR", "Part", "Qty").await.unwrap();
        store.delete(a.id).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.purge_all().await.unwrap(), 1);
        assert!(store.list().await.unwrap().is_empty());
    }
}
