//! Handler模块

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::models::{
    ColumnPreview, ConnectionItem, ConnectionTestResult, CreateSelectionRequest,
    ListColumnsQuery, ListTablesQuery, QueryRequest, QueryResult, Selection, SyncStatusResponse,
    TestConnectionRequest,
};
use common::response::ApiResponse;

use crate::state::AppState;

pub const SERVICE_NAME: &str = "sync-service";

/// 列出所有逻辑连接
#[utoipa::path(
    get,
    path = "/api/connections",
    tag = "connections",
    responses(
        (status = 200, description = "连接列表", body = ApiResponse<Vec<ConnectionItem>>)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ConnectionItem>>> {
    Json(ApiResponse::ok_with_service(
        state.service.list_connections(),
        SERVICE_NAME,
    ))
}

/// 测试单个连接
#[utoipa::path(
    post,
    path = "/api/connections/test",
    tag = "connections",
    request_body = TestConnectionRequest,
    responses(
        (status = 200, description = "连接测试结果", body = ApiResponse<ConnectionTestResult>),
        (status = 404, description = "连接未找到")
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Json(req): Json<TestConnectionRequest>,
) -> Result<Json<ApiResponse<ConnectionTestResult>>, AppError> {
    req.validate()?;
    let data = state.service.test_connection(&req.connection_name).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 并行测试全部连接
#[utoipa::path(
    get,
    path = "/api/connections/test",
    tag = "connections",
    responses(
        (status = 200, description = "全部连接的测试结果", body = ApiResponse<Vec<ConnectionTestResult>>)
    )
)]
pub async fn test_all_connections(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ConnectionTestResult>>> {
    Json(ApiResponse::ok_with_service(
        state.service.test_all().await,
        SERVICE_NAME,
    ))
}

/// 各连接是否可达
#[utoipa::path(
    get,
    path = "/api/connections/status",
    tag = "connections",
    responses(
        (status = 200, description = "连接名到可达性的映射", body = ApiResponse<BTreeMap<String, bool>>)
    )
)]
pub async fn connection_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<BTreeMap<String, bool>>> {
    Json(ApiResponse::ok_with_service(
        state.service.connection_status().await,
        SERVICE_NAME,
    ))
}

/// 列出表和视图
#[utoipa::path(
    get,
    path = "/api/tables",
    tag = "catalog",
    params(ListTablesQuery),
    responses(
        (status = 200, description = "表名列表", body = ApiResponse<Vec<String>>),
        (status = 404, description = "连接未找到"),
        (status = 501, description = "连接未实现")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Query(query): Query<ListTablesQuery>,
) -> Result<Json<ApiResponse<Vec<String>>>, AppError> {
    let data = state.service.list_tables(&query.connection_name).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 列出表的列及首个值
#[utoipa::path(
    get,
    path = "/api/columns",
    tag = "catalog",
    params(ListColumnsQuery),
    responses(
        (status = 200, description = "列预览", body = ApiResponse<Vec<ColumnPreview>>),
        (status = 404, description = "连接或表未找到")
    )
)]
pub async fn list_columns(
    State(state): State<AppState>,
    Query(query): Query<ListColumnsQuery>,
) -> Result<Json<ApiResponse<Vec<ColumnPreview>>>, AppError> {
    let data = state
        .service
        .list_columns(&query.connection_name, &query.table_name, query.data_only)
        .await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 列出已选列
#[utoipa::path(
    get,
    path = "/api/selected_columns",
    tag = "selections",
    responses(
        (status = 200, description = "已选列及其快照", body = ApiResponse<Vec<Selection>>)
    )
)]
pub async fn list_selections(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Selection>>>, AppError> {
    let data = state.service.list_selections().await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 新增已选列（立即同步一次）
#[utoipa::path(
    post,
    path = "/api/selected_columns",
    tag = "selections",
    request_body = CreateSelectionRequest,
    responses(
        (status = 200, description = "已创建", body = ApiResponse<Selection>),
        (status = 400, description = "参数无效"),
        (status = 404, description = "连接未找到")
    )
)]
pub async fn create_selection(
    State(state): State<AppState>,
    Json(req): Json<CreateSelectionRequest>,
) -> Result<Json<ApiResponse<Selection>>, AppError> {
    let data = state.service.create_selection(req).await?;
    Ok(Json(ApiResponse::ok_with_service(data, SERVICE_NAME)))
}

/// 删除已选列
#[utoipa::path(
    delete,
    path = "/api/selected_columns/{id}",
    tag = "selections",
    params(
        ("id" = i64, Path, description = "选择 ID")
    ),
    responses(
        (status = 200, description = "已删除", body = ApiResponse<bool>),
        (status = 404, description = "选择未找到")
    )
)]
pub async fn delete_selection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<bool>>, AppError> {
    state.service.delete_selection(id).await?;
    Ok(Json(ApiResponse::ok_with_service(true, SERVICE_NAME)))
}

/// 当前同步状态
#[utoipa::path(
    get,
    path = "/api/sync-status",
    tag = "sync",
    responses(
        (status = 200, description = "调度器正在执行的操作", body = ApiResponse<SyncStatusResponse>)
    )
)]
pub async fn sync_status(State(state): State<AppState>) -> Json<ApiResponse<SyncStatusResponse>> {
    Json(ApiResponse::ok_with_service(
        state.service.current_status(),
        SERVICE_NAME,
    ))
}

/// 导出 CSV
#[utoipa::path(
    get,
    path = "/api/download",
    tag = "sync",
    responses(
        (status = 200, description = "每个已选列一行，附 365 个位置值列", content_type = "text/csv")
    )
)]
pub async fn download(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.service.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"selected_columns.csv\"",
            ),
        ],
        body,
    ))
}

/// 执行诊断查询
#[utoipa::path(
    post,
    path = "/api/query-test",
    tag = "sync",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "查询结果", body = ApiResponse<QueryResult>),
        (status = 400, description = "SQL 不安全或无效"),
        (status = 501, description = "该连接不支持临时查询")
    )
)]
pub async fn query_test(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<ApiResponse<QueryResult>>, AppError> {
    let result = state.service.run_query(req).await?;
    let duration = result.execution_time_ms;
    Ok(Json(
        ApiResponse::ok_with_service(result, SERVICE_NAME).with_duration(duration),
    ))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        sync: state.service.current_status().current_command,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 调度器状态
    pub sync: String,
}
