//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::web::config::MAX_ATTACHMENT_SIZE;
use crate::web::handlers;
use crate::web::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Public contact form
        .route("/api/contact", post(handlers::submit::submit_handler))
        // Admin inbox
        .route(
            "/api/admin/messages",
            get(handlers::inbox::list_messages_handler),
        )
        .route(
            "/api/admin/messages/:id",
            get(handlers::inbox::get_message_handler)
                .delete(handlers::status::delete_message_handler),
        )
        .route(
            "/api/admin/messages/:id/history",
            get(handlers::inbox::history_handler),
        )
        .route(
            "/api/admin/messages/:id/status",
            post(handlers::status::status_action_handler),
        )
        .route(
            "/api/admin/messages/:id/restore",
            post(handlers::status::restore_message_handler),
        )
        // Outbound mail
        .route(
            "/api/admin/messages/:id/reply",
            post(handlers::reply::reply_handler)
                .layer(DefaultBodyLimit::max(MAX_ATTACHMENT_SIZE as usize + 4096)),
        )
        .route(
            "/api/admin/send",
            post(handlers::reply::send_handler)
                .layer(DefaultBodyLimit::max(MAX_ATTACHMENT_SIZE as usize + 4096)),
        )
        .with_state(state)
}
