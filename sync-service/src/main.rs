//! 列快照同步服务
//!
//! 定时从各数据源抓取已选列的数据快照，包括：
//! - 关系型数据源（PostgreSQL / MySQL / SQLite）
//! - 旧版桌面数据库文件（.mdb）
//! - 轮询调度与当前状态查询
//! - CSV 导出

mod drivers;
mod export;
mod handlers;
mod prober;
mod registry;
mod routes;
mod scheduler;
mod service;
mod state;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

use common::config::AppConfig;
use common::middleware::request_id::{request_id_layers, request_span};

use crate::handlers::SERVICE_NAME;
use crate::registry::ConnectionRegistry;
use crate::scheduler::SyncScheduler;
use crate::service::SyncService;
use crate::state::AppState;
use crate::store::SelectionStore;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "列同步服务 API",
        version = "0.1.0",
        description = "已选列的定时快照同步"
    ),
    paths(
        handlers::list_connections,
        handlers::test_connection,
        handlers::test_all_connections,
        handlers::connection_status,
        handlers::list_tables,
        handlers::list_columns,
        handlers::list_selections,
        handlers::create_selection,
        handlers::delete_selection,
        handlers::sync_status,
        handlers::download,
        handlers::query_test,
        handlers::health_check,
    ),
    components(schemas(
        common::models::ConnectionItem,
        common::models::DriverKind,
        common::models::ConnectionTestResult,
        common::models::TestConnectionRequest,
        common::models::ColumnPreview,
        common::models::Selection,
        common::models::CreateSelectionRequest,
        common::models::SyncStatusResponse,
        common::models::QueryRequest,
        common::models::QueryResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "connections", description = "连接端点"),
        (name = "catalog", description = "表与列浏览"),
        (name = "selections", description = "已选列管理"),
        (name = "sync", description = "同步状态与导出"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 只补充未设置的变量
    dotenvy::dotenv().ok();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME)?;

    // 已选列每次启动都重新定义
    let store = SelectionStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let purged = store.purge_all().await?;
    info!(purged, "selection store cleared");

    let registry = Arc::new(ConnectionRegistry::new(
        &config.connections,
        Duration::from_secs(config.connect_timeout_secs),
    ));
    let scheduler = Arc::new(SyncScheduler::new(store.clone(), registry.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(
        Arc::clone(&scheduler).run(Duration::from_millis(config.sync_interval_ms), shutdown_rx),
    );

    let service = SyncService::new(registry, store.clone(), scheduler);
    let addr = format!("{}:{}", config.host, config.port);
    let app = create_router(AppState::new(config, service));

    // 启动服务
    info!(service = SERVICE_NAME, address = %addr, "启动服务");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    shutdown_tx.send_replace(true);
    if let Err(e) = scheduler_task.await {
        tracing::warn!(error = %e, "scheduler task ended abnormally");
    }
    store.close().await;
    info!("服务已停止");
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(propagate_request_id)
        .layer(TraceLayer::new_for_http().make_span_with(request_span::<axum::body::Body>))
        .layer(set_request_id)
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
