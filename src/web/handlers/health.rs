//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::web::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let state = state.lock().await;
    let message_count = state
        .storage
        .inbox_stats()
        .map(|s| s.total)
        .unwrap_or(0);

    let body = serde_json::json!({
        "status": "ok",
        "site": state.site_name,
        "messages": message_count,
        "mail_notifications": state.notify_email.is_some(),
    });
    (StatusCode::OK, axum::Json(body))
}
