//! Shared utility functions for the web layer.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::storage::MessageRow;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Per-field validation errors, reported together so the caller can fix the
/// whole form in one round trip.
#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 422 response with an `errors` map keyed by field.
    pub fn into_response(self) -> Response {
        let body = serde_json::json!({ "errors": self.0 });
        (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(body)).into_response()
    }
}

/// The acting admin, taken from the `x-admin` header. Authentication is
/// handled upstream; this only identifies who acted for `handled_by`.
pub fn acting_admin(headers: &HeaderMap) -> String {
    headers
        .get("x-admin")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or("admin")
        .to_string()
}

/// Client IP as reported by the proxy, if any.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.chars().take(255).collect())
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Strip HTML tags, decoding nothing: the result is only used for plain-text
/// derivations (dedupe fingerprints, text alternatives), never rendered.
pub fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                // Tag boundaries act as separators so "<p>a</p><p>b</p>"
                // doesn't collapse into "ab".
                out.push(' ');
            }
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_ws(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Content fingerprint for public submissions: identical (lowercased email,
/// lowercased subject, whitespace-normalized body) triples collide.
pub fn submission_dedupe_hash(email: &str, subject: &str, body: &str) -> String {
    sha256_hex(&format!(
        "{}|{}|{}",
        email.to_lowercase(),
        subject.to_lowercase(),
        collapse_ws(body)
    ))
}

/// Fingerprint for reply history rows. Derived from a random token rather
/// than content: outbound replies are intentionally exempt from content
/// dedupe so identical follow-ups are never blocked.
pub fn reply_dedupe_hash(now: u64) -> String {
    let token: u64 = rand::random();
    sha256_hex(&format!("reply-{token:016x}-{now}"))
}

/// Fingerprint for admin-composed outbound messages. Content-based but with
/// a timestamp component, so near-identical admin messages don't collide.
pub fn compose_dedupe_hash(email: &str, subject: &str, now: u64) -> String {
    sha256_hex(&format!("{}|{}|{}", email.to_lowercase(), subject, now))
}

/// Full JSON representation of a message for the detail view.
pub fn message_to_json(m: &MessageRow) -> serde_json::Value {
    serde_json::json!({
        "id": m.id,
        "name": m.name,
        "email": m.email,
        "phone": m.phone,
        "subject": m.subject,
        "body": m.body,
        "status": m.status,
        "handled_by": m.handled_by,
        "is_spam": m.is_spam,
        "spam_reason": m.spam_reason,
        "duration_ms": m.duration_ms,
        "read_at": m.read_at,
        "replied_at": m.replied_at,
        "archived_at": m.archived_at,
        "created_at": m.created_at,
        "ip": m.ip,
        "user_agent": m.user_agent,
        "referer": m.referer,
        "locale": m.locale,
        "source": m.source,
        "has_attachment": m.attachment.is_some(),
        "attachment_name": m.attachment_name,
    })
}

const SNIPPET_LEN: usize = 140;

/// Compact JSON representation for list and history rows.
pub fn message_summary_json(m: &MessageRow) -> serde_json::Value {
    let snippet: String = strip_html(&m.body).chars().take(SNIPPET_LEN).collect();
    serde_json::json!({
        "id": m.id,
        "name": m.name,
        "email": m.email,
        "subject": m.subject,
        "status": m.status,
        "is_spam": m.is_spam,
        "duration_ms": m.duration_ms,
        "created_at": m.created_at,
        "source": m.source,
        "snippet": collapse_ws(&snippet),
        "has_attachment": m.attachment.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(collapse_ws(&strip_html("<p>Hello <b>world</b></p>")), "Hello world");
        assert_eq!(collapse_ws(&strip_html("no tags")), "no tags");
        assert_eq!(collapse_ws(&strip_html("<p>a</p><p>b</p>")), "a b");
    }

    #[test]
    fn test_submission_hash_normalization() {
        let a = submission_dedupe_hash("Alice@Example.com", "Hello", "line one\n  line two");
        let b = submission_dedupe_hash("alice@example.com", "hello", "line one line two");
        assert_eq!(a, b);

        let c = submission_dedupe_hash("alice@example.com", "hello!", "line one line two");
        assert_ne!(a, c);
    }

    #[test]
    fn test_reply_hash_is_unique_per_call() {
        assert_ne!(reply_dedupe_hash(1), reply_dedupe_hash(1));
    }

    #[test]
    fn test_compose_hash_varies_with_time() {
        let a = compose_dedupe_hash("a@example.com", "Hi", 1);
        let b = compose_dedupe_hash("a@example.com", "Hi", 2);
        assert_ne!(a, b);
    }
}
