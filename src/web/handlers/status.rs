//! Status actions, soft delete, and restore.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::lifecycle::{apply_action, StatusAction};
use crate::web::state::SharedState;
use crate::web::utils::{acting_admin, api_error, now_secs};

#[derive(Deserialize)]
pub struct StatusActionRequest {
    action: String,
}

/// POST /api/admin/messages/:id/status - apply a lifecycle action:
/// read | replied | closed | archive | unarchive | spam | ham.
pub async fn status_action_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<StatusActionRequest>,
) -> Response {
    let Some(action) = StatusAction::parse(&req.action) else {
        return api_error(StatusCode::BAD_REQUEST, "unknown action");
    };
    let actor = acting_admin(&headers);
    let now = now_secs();

    let st = state.lock().await;
    match apply_action(&st.storage, id, action, &actor, now) {
        Ok(true) => {
            crate::dlog!(
                "status: {} applied to {} by {}",
                action.as_str(),
                crate::logging::msg_id(id),
                actor
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "status": "ok" })),
            )
                .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /api/admin/messages/:id - soft delete; the row stays recoverable.
pub async fn delete_message_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;
    match st.storage.soft_delete_message(id, now) {
        Ok(true) => {
            crate::dlog!("delete: soft-deleted {}", crate::logging::msg_id(id));
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "status": "deleted" })),
            )
                .into_response()
        }
        Ok(false) => api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// POST /api/admin/messages/:id/restore - undo a soft delete. Restoring an
/// already-live message is a no-op success.
pub async fn restore_message_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Response {
    let now = now_secs();
    let st = state.lock().await;
    match st.storage.restore_message(id, now) {
        Ok(true) => {
            crate::dlog!("restore: restored {}", crate::logging::msg_id(id));
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "status": "restored" })),
            )
                .into_response()
        }
        Ok(false) => match st.storage.get_message_any(id) {
            Ok(Some(_)) => (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "status": "restored" })),
            )
                .into_response(),
            Ok(None) => api_error(StatusCode::NOT_FOUND, "message not found"),
            Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Err(e) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
