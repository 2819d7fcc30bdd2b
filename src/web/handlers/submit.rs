//! Public contact form submission.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::classifier::{blocked_tld, classify};
use crate::mailer::OutgoingMail;
use crate::storage::{NewMessage, StorageError};
use crate::web::config::DEFAULT_LOCALE;
use crate::web::state::SharedState;
use crate::web::utils::{
    api_error, client_ip, collapse_ws, now_secs, strip_html, submission_dedupe_hash, user_agent,
    FieldErrors,
};

const NAME_MAX: usize = 120;
const EMAIL_MAX: usize = 160;
const PHONE_MAX: usize = 40;
const SUBJECT_MAX: usize = 160;
const BODY_MAX: usize = 5000;

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    phone: Option<String>,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    consent: bool,
    /// Honeypot field; humans never see it, so any value marks a bot.
    #[serde(default)]
    company: String,
    duration_ms: Option<u64>,
    referer: Option<String>,
    locale: Option<String>,
    utm: Option<serde_json::Value>,
}

fn validate(req: &SubmitRequest, blocked_tlds: &[String]) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if req.name.trim().is_empty() {
        errors.add("name", "name is required");
    } else if req.name.chars().count() > NAME_MAX {
        errors.add("name", format!("name must be at most {NAME_MAX} characters"));
    }

    let email = req.email.trim();
    if email.is_empty() {
        errors.add("email", "email is required");
    } else if email.chars().count() > EMAIL_MAX || email.parse::<lettre::Address>().is_err() {
        errors.add("email", "email address is invalid");
    } else if let Some(tld) = blocked_tld(email, blocked_tlds) {
        errors.add(
            "email",
            format!("email addresses ending in {tld} are not accepted"),
        );
    }

    if let Some(phone) = req.phone.as_deref() {
        if phone.chars().count() > PHONE_MAX {
            errors.add("phone", format!("phone must be at most {PHONE_MAX} characters"));
        }
    }

    if req.subject.trim().is_empty() {
        errors.add("subject", "subject is required");
    } else if req.subject.chars().count() > SUBJECT_MAX {
        errors.add(
            "subject",
            format!("subject must be at most {SUBJECT_MAX} characters"),
        );
    }

    if req.message.trim().is_empty() {
        errors.add("message", "message is required");
    } else if req.message.chars().count() > BODY_MAX {
        errors.add(
            "message",
            format!("message must be at most {BODY_MAX} characters"),
        );
    }

    if !req.consent {
        errors.add(
            "consent",
            "you must accept the privacy policy before sending",
        );
    }

    if req.duration_ms.is_none() {
        errors.add("duration_ms", "duration_ms is required");
    }

    errors
}

pub async fn submit_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<SubmitRequest>,
) -> Response {
    let now = now_secs();

    // Short lock: validation inputs only.
    let blocked_tlds = {
        let st = state.lock().await;
        st.blocked_tlds.clone()
    };

    let errors = validate(&req, &blocked_tlds);
    if !errors.is_empty() {
        return errors.into_response();
    }
    let duration_ms = req.duration_ms.unwrap_or(0);

    // The verdict is stored, never disclosed to the submitter.
    let verdict = classify(&req.company, duration_ms);

    let email = req.email.trim().to_string();
    let subject = req.subject.trim().to_string();
    let msg = NewMessage {
        name: req.name.trim().to_string(),
        email: email.clone(),
        phone: req.phone.as_deref().map(|p| p.trim().to_string()),
        subject: subject.clone(),
        body: req.message.clone(),
        // Guaranteed by validation: website rows always carry consent.
        consent: true,
        status: "new".to_string(),
        hp_filled: !req.company.trim().is_empty(),
        duration_ms,
        is_spam: verdict.is_spam,
        spam_reason: verdict.reason.clone(),
        dedupe_hash: submission_dedupe_hash(&email, &subject, &req.message),
        ip: client_ip(&headers),
        user_agent: user_agent(&headers),
        referer: req.referer.clone(),
        utm: req.utm.as_ref().map(|v| v.to_string()),
        locale: req
            .locale
            .as_deref()
            .map(|l| l.chars().take(8).collect())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        source: "website".to_string(),
        ..Default::default()
    };

    // Persist, then notify. The notification is best-effort; the message is
    // already durably saved when it goes out.
    let (id, mailer, notify_email, site_name) = {
        let st = state.lock().await;
        let id = match st.storage.insert_message(&msg, now) {
            Ok(id) => id,
            Err(StorageError::Duplicate(_)) => {
                let mut errors = FieldErrors::new();
                errors.add("message", "this identical message was already sent recently");
                return errors.into_response();
            }
            Err(e) => {
                crate::dlog!(
                    "submit: storage failure from ip={:?} ua={:?}: {}",
                    msg.ip,
                    msg.user_agent,
                    e
                );
                return api_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to store message");
            }
        };
        (
            id,
            st.mailer.clone(),
            st.notify_email.clone(),
            st.site_name.clone(),
        )
    };
    // Lock released

    crate::dlog!(
        "submit: stored message {} from {} (spam={})",
        crate::logging::msg_id(id),
        crate::logging::addr(&email),
        verdict.is_spam
    );

    if !verdict.is_spam {
        if let Some(notify_to) = notify_email {
            let mail = notification_mail(&msg, notify_to, &site_name);
            // Blocking SMTP I/O, no lock held.
            let result = tokio::task::spawn_blocking(move || mailer.send(&mail)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    crate::dlog!("submit: admin notification failed for {}: {}", id, e);
                }
                Err(e) => {
                    crate::dlog!("submit: notification task failed for {}: {}", id, e);
                }
            }
        }
    }

    (
        StatusCode::CREATED,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
        .into_response()
}

fn notification_mail(msg: &NewMessage, notify_to: String, site_name: &str) -> OutgoingMail {
    let text_body = format!(
        "New contact message\n\nFrom: {} <{}>\nPhone: {}\nSubject: {}\n\n{}",
        msg.name,
        msg.email,
        msg.phone.as_deref().unwrap_or("-"),
        msg.subject,
        msg.body,
    );
    let html_body = format!(
        "<h2>New contact message</h2>\
         <p><strong>From:</strong> {} &lt;{}&gt;<br>\
         <strong>Phone:</strong> {}<br>\
         <strong>Subject:</strong> {}</p>\
         <p>{}</p>",
        html_escape(&msg.name),
        html_escape(&msg.email),
        html_escape(msg.phone.as_deref().unwrap_or("-")),
        html_escape(&msg.subject),
        html_escape(&collapse_ws(&strip_html(&msg.body))),
    );
    OutgoingMail {
        to: notify_to,
        to_name: None,
        reply_to: Some((msg.email.clone(), msg.name.clone())),
        cc: Vec::new(),
        bcc: Vec::new(),
        subject: format!("New contact message: {}", msg.subject),
        html_body,
        text_body,
        attachment: None,
    }
}

/// Minimal escaping for sender-controlled values interpolated into the
/// notification HTML.
fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
