use axum::http::StatusCode;

/// Axum handler: GET /health
pub async fn handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
