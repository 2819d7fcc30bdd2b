//! Admin inbox: listing, detail view, and same-sender history.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::lifecycle::Status;
use crate::web::config::{HISTORY_LIMIT, PAGE_SIZE};
use crate::web::state::SharedState;
use crate::web::utils::{
    acting_admin, api_error, message_summary_json, message_to_json, now_secs,
};

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    search: Option<String>,
    status: Option<String>,
    spam: Option<bool>,
    page: Option<u32>,
}

/// GET /api/admin/messages - filtered, paginated inbox plus counters.
pub async fn list_messages_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListMessagesQuery>,
) -> Response {
    // "archived" is a synthetic filter value, not a status.
    if let Some(status) = params.status.as_deref() {
        if status != "archived" && Status::parse(status).is_none() {
            return api_error(StatusCode::BAD_REQUEST, "unknown status filter");
        }
    }

    let criteria = crate::storage::SearchCriteria {
        search: params.search,
        status: params.status,
        spam_only: params.spam.unwrap_or(false),
        page: params.page.unwrap_or(1).max(1),
        per_page: PAGE_SIZE,
    };

    let st = state.lock().await;
    let page = match st.storage.search_messages(&criteria) {
        Ok(p) => p,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let stats = match st.storage.inbox_stats() {
        Ok(s) => s,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let messages: Vec<serde_json::Value> =
        page.messages.iter().map(message_summary_json).collect();
    let body = serde_json::json!({
        "messages": messages,
        "stats": stats,
        "page": page.page,
        "per_page": page.per_page,
        "total": page.total,
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}

/// GET /api/admin/messages/:id - full message; viewing marks it read.
pub async fn get_message_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let actor = acting_admin(&headers);
    let now = now_secs();

    let st = state.lock().await;
    // Idempotent: a second view never regresses the status or read_at.
    match st.storage.mark_read(id, &actor, now) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
    match st.storage.get_message(id) {
        Ok(Some(m)) => (StatusCode::OK, axum::Json(message_to_json(&m))).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/admin/messages/:id/history - up to 10 other messages from the
/// same email address, newest first.
pub async fn history_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Response {
    let st = state.lock().await;
    match st.storage.history_for(id, HISTORY_LIMIT) {
        Ok(history) => {
            let json: Vec<serde_json::Value> =
                history.iter().map(message_summary_json).collect();
            (StatusCode::OK, axum::Json(serde_json::json!(json))).into_response()
        }
        Err(crate::storage::StorageError::NotFound(_)) => {
            api_error(StatusCode::NOT_FOUND, "message not found")
        }
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
