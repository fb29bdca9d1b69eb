//! 同步服务路由模块

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

/// 创建路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/connections", get(handlers::list_connections))
        .route(
            "/api/connections/test",
            get(handlers::test_all_connections).post(handlers::test_connection),
        )
        .route("/api/connections/status", get(handlers::connection_status))
        .route("/api/tables", get(handlers::list_tables))
        .route("/api/columns", get(handlers::list_columns))
        .route(
            "/api/selected_columns",
            get(handlers::list_selections).post(handlers::create_selection),
        )
        .route("/api/selected_columns/{id}", delete(handlers::delete_selection))
        .route("/api/sync-status", get(handlers::sync_status))
        .route("/api/download", get(handlers::download))
        .route("/api/query-test", post(handlers::query_test))
        .route("/api/health", get(handlers::health_check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use jet_reader::testing::{build_database, TestTable};
    use jet_reader::{ColumnType, Value as JetValue};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use common::config::AppConfig;

    use crate::registry::ConnectionRegistry;
    use crate::scheduler::SyncScheduler;
    use crate::service::SyncService;
    use crate::store::SelectionStore;

    /// App whose POINT_OF_RENTAL connection reads a generated legacy file.
    async fn app() -> (TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let items = TestTable::new("ItemFile", &[("NUM", ColumnType::Text), ("QTY", ColumnType::Long)])
            .row(vec![JetValue::Text("SAW-01".into()), JetValue::Long(3)])
            .row(vec![JetValue::Text("LIFT-02".into()), JetValue::Long(0)]);
        std::fs::write(dir.path().join("por.mdb"), build_database(&[items])).unwrap();

        let config = AppConfig::from_lookup("sync-service", dir.path(), |key| match key {
            "POR_PATH" => Some("por.mdb".to_string()),
            _ => None,
        })
        .unwrap();

        let registry = Arc::new(ConnectionRegistry::new(
            &config.connections,
            Duration::from_secs(5),
        ));
        let store = SelectionStore::in_memory().await;
        let scheduler = Arc::new(SyncScheduler::new(store.clone(), registry.clone()));
        let service = SyncService::new(registry, store, scheduler);
        let app = router().with_state(AppState::new(config, service));
        (dir, app)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_connections() {
        let (_dir, app) = app().await;
        let (status, body) = send(&app, get("/api/connections")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 4);
        assert_eq!(body["data"][1], json!({"name": "POINT_OF_RENTAL", "driver": "legacy_file"}));
    }

    #[tokio::test]
    async fn test_tables_and_columns_of_legacy_file() {
        let (_dir, app) = app().await;
        let (status, body) = send(&app, get("/api/tables?connection_name=POINT_OF_RENTAL")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!(["ItemFile"]));

        let (_, body) = send(
            &app,
            get("/api/columns?connection_name=POINT_OF_RENTAL&table_name=ItemFile&data_only=true"),
        )
        .await;
        assert_eq!(
            body["data"],
            json!([
                {"name": "NUM", "first_value": "SAW-01"},
                {"name": "QTY", "first_value": 3}
            ])
        );
    }

    #[tokio::test]
    async fn test_unimplemented_connection_is_501() {
        let (_dir, app) = app().await;
        let (status, body) = send(&app, get("/api/tables?connection_name=QUICKBOOKS")).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert_eq!(body["error"]["code"], "UNSUPPORTED");
    }

    #[tokio::test]
    async fn test_selection_lifecycle_and_export() {
        let (_dir, app) = app().await;
        let (status, body) = send(
            &app,
            post_json(
                "/api/selected_columns",
                json!({"connection_name": "POINT_OF_RENTAL", "table_name": "ItemFile", "column_name": "NUM"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["snapshot"], json!(["SAW-01", "LIFT-02"]));
        let id = body["data"]["id"].as_i64().unwrap();

        let response = app.clone().oneshot(get("/api/download")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("POINT_OF_RENTAL,ItemFile,NUM,"));

        let delete = Request::builder()
            .method("DELETE")
            .uri(format!("/api/selected_columns/{id}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, get("/api/selected_columns")).await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_delete_missing_selection_is_404() {
        let (_dir, app) = app().await;
        let delete = Request::builder()
            .method("DELETE")
            .uri("/api/selected_columns/99")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "SELECTION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_selection_is_400() {
        let (_dir, app) = app().await;
        let (status, _) = send(
            &app,
            post_json(
                "/api/selected_columns",
                json!({"connection_name": "POINT_OF_RENTAL", "table_name": "", "column_name": "NUM"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sync_status_and_connection_status() {
        let (_dir, app) = app().await;
        let (_, body) = send(&app, get("/api/sync-status")).await;
        assert_eq!(body["data"]["current_command"], "Idle");

        let (_, body) = send(&app, get("/api/connections/status")).await;
        assert_eq!(body["data"]["POINT_OF_RENTAL"], true);
        assert_eq!(body["data"]["EPICOR"], false);
    }

    #[tokio::test]
    async fn test_query_test_unsupported_on_legacy_file() {
        let (_dir, app) = app().await;
        let (status, _) = send(
            &app,
            post_json(
                "/api/query-test",
                json!({"connection_name": "POINT_OF_RENTAL", "sql": "SELECT NUM FROM ItemFile"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }
}
