/*
 * Responsibility
 * - GET /health (liveness; no credentials required)
 */
use axum::{http::StatusCode, response::IntoResponse};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
