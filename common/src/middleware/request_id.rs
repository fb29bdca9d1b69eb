//! Request ID propagation.
//!
//! Every request gets an `x-request-id` (the caller's, or a fresh UUID), the
//! same id is echoed on the response, and the tracing span for the request
//! carries it so engine logs emitted while serving can be correlated.

use axum::http::{HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::Span;

/// Header name for request ID.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Layers that assign and echo the request ID.
///
/// Apply the set layer outside the trace layer so the span sees the id.
pub fn request_id_layers() -> (SetRequestIdLayer<MakeRequestUuid>, PropagateRequestIdLayer) {
    (
        SetRequestIdLayer::new(REQUEST_ID_HEADER.clone(), MakeRequestUuid),
        PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()),
    )
}

/// Span factory for `TraceLayer::make_span_with`.
pub fn request_span<B>(req: &Request<B>) -> Span {
    let request_id = req
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        uri = %req.uri(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_generates_and_echoes_request_id() {
        let (set_id, propagate_id) = request_id_layers();
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(propagate_id)
            .layer(set_id);

        let res = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = res.headers().get(&REQUEST_ID_HEADER).unwrap().to_str().unwrap();
        assert_eq!(id.len(), 36);
    }

    #[tokio::test]
    async fn test_keeps_caller_request_id() {
        let (set_id, propagate_id) = request_id_layers();
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(propagate_id)
            .layer(set_id);

        let req = Request::builder()
            .uri("/")
            .header(&REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.headers().get(&REQUEST_ID_HEADER).unwrap(), "abc-123");
    }
}
