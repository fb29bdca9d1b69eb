//! 列同步服务模块
//!
//! HTTP 层调用的全部核心操作。每个操作按需打开一个会话，用完即关闭。

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::{
    ColumnPreview, ConnectionItem, ConnectionTestResult, CreateSelectionRequest, QueryRequest,
    QueryResult, Selection, SyncStatusResponse, SNAPSHOT_LIMIT,
};
use common::utils::SqlValidator;

use crate::drivers::{SessionProvider, SourceSession};
use crate::export;
use crate::registry::ConnectionRegistry;
use crate::scheduler::{fetch_and_store, SyncScheduler};
use crate::store::SelectionStore;

/// 列同步服务
pub struct SyncService {
    registry: Arc<ConnectionRegistry>,
    store: SelectionStore,
    scheduler: Arc<SyncScheduler>,
}

impl SyncService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: SelectionStore,
        scheduler: Arc<SyncScheduler>,
    ) -> Self {
        Self {
            registry,
            store,
            scheduler,
        }
    }

    /// 列出所有逻辑连接
    pub fn list_connections(&self) -> Vec<ConnectionItem> {
        self.registry.list()
    }

    /// 测试单个连接
    pub async fn test_connection(&self, name: &str) -> AppResult<ConnectionTestResult> {
        Ok(self.registry.get(name)?.test().await)
    }

    /// 并行测试全部连接
    pub async fn test_all(&self) -> Vec<ConnectionTestResult> {
        join_all(self.registry.connections().iter().map(|c| c.test())).await
    }

    /// 连接名 → 是否可达
    pub async fn connection_status(&self) -> BTreeMap<String, bool> {
        self.test_all()
            .await
            .into_iter()
            .map(|r| (r.connection_name, r.connected))
            .collect()
    }

    /// 列出连接中的表和视图
    pub async fn list_tables(&self, name: &str) -> AppResult<Vec<String>> {
        let mut session = self.registry.open_session(name).await?;
        let result = session.list_tables().await;
        close_session(name, session).await;
        result
    }

    /// 列出表的列及各列首个值；`data_only` 时只保留含有效数据的列
    pub async fn list_columns(
        &self,
        name: &str,
        table: &str,
        data_only: bool,
    ) -> AppResult<Vec<ColumnPreview>> {
        let mut session = self.registry.open_session(name).await?;
        let result = previews(session.as_mut(), table, data_only).await;
        close_session(name, session).await;
        result
    }

    /// 列出全部已选列
    pub async fn list_selections(&self) -> AppResult<Vec<Selection>> {
        self.store.list().await
    }

    /// 新建选择并立即同步一次
    ///
    /// 首次同步失败不会撤销选择，后续由调度器重试。
    pub async fn create_selection(&self, req: CreateSelectionRequest) -> AppResult<Selection> {
        req.validate()?;
        self.registry.get(&req.connection_name)?;

        let selection = self
            .store
            .insert(&req.connection_name, &req.table_name, &req.column_name)
            .await?;
        tracing::info!(
            selection_id = selection.id,
            connection = %selection.connection_name,
            table = %selection.table_name,
            column = %selection.column_name,
            "selection created"
        );

        match self.initial_fetch(&selection).await {
            Ok(count) => {
                tracing::debug!(selection_id = selection.id, values = count, "initial fetch done");
                self.store.get(selection.id).await
            }
            Err(e) => {
                tracing::warn!(
                    selection_id = selection.id,
                    connection = %selection.connection_name,
                    error = %e,
                    "initial fetch failed; selection kept with an empty snapshot"
                );
                Ok(selection)
            }
        }
    }

    async fn initial_fetch(&self, selection: &Selection) -> AppResult<usize> {
        let name = &selection.connection_name;
        let mut session = self.registry.open_session(name).await?;
        let result = fetch_and_store(session.as_mut(), &self.store, selection, SNAPSHOT_LIMIT).await;
        close_session(name, session).await;
        result
    }

    /// 删除选择
    pub async fn delete_selection(&self, id: i64) -> AppResult<()> {
        self.store.delete(id).await?;
        tracing::info!(selection_id = id, "selection deleted");
        Ok(())
    }

    /// 调度器当前状态
    pub fn current_status(&self) -> SyncStatusResponse {
        SyncStatusResponse {
            current_command: self.scheduler.status().to_string(),
        }
    }

    /// 导出全部选择为 CSV
    pub async fn export_csv(&self) -> AppResult<Vec<u8>> {
        let selections = self.store.list().await?;
        export::write_csv(&selections)
    }

    /// 诊断用的只读 SQL
    pub async fn run_query(&self, req: QueryRequest) -> AppResult<QueryResult> {
        req.validate()?;
        SqlValidator::validate(&req.sql)?;
        if !SqlValidator::is_select(&req.sql) {
            return Err(AppError::Validation("only SELECT or WITH queries are allowed".into()));
        }
        let limit = req.limit.unwrap_or(1000) as usize;

        let name = &req.connection_name;
        let mut session = self.registry.open_session(name).await?;
        let result = session.run_query(&req.sql, limit).await;
        close_session(name, session).await;
        result
    }
}

async fn previews(
    session: &mut dyn SourceSession,
    table: &str,
    data_only: bool,
) -> AppResult<Vec<ColumnPreview>> {
    let columns = session.list_columns(table).await?;
    let mut previews = Vec::with_capacity(columns.len());
    for column in columns {
        if data_only {
            match session.has_meaningful_values(table, &column).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.is_connection_level() => return Err(e),
                Err(e) => {
                    tracing::debug!(table, column = %column, error = %e, "column skipped");
                    continue;
                }
            }
        }
        let first_value = match session.fetch_column_values(table, &column, 1).await {
            Ok(values) => values.into_iter().next().unwrap_or(Value::Null),
            Err(e) if e.is_connection_level() => return Err(e),
            Err(e) => {
                tracing::debug!(table, column = %column, error = %e, "no preview value");
                Value::Null
            }
        };
        previews.push(ColumnPreview {
            name: column,
            first_value,
        });
    }
    Ok(previews)
}

async fn close_session(name: &str, session: Box<dyn SourceSession>) {
    if let Err(e) = session.close().await {
        tracing::warn!(connection = name, error = %e, "failed to close session");
    }
}
