/*
 * Responsibility
 * - GET /health (疎通用)
 * - middleware を通す/通さない方針の確認用
 */
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;

pub fn register(router: Router) -> Router {
    router.route("/health", get(health))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
