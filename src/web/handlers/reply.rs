//! Outbound mail: replying to a message and composing a new one.
//!
//! Both flows gate persistence on a successful send: the history row and the
//! originating message's transition only happen after SMTP accepts the mail.
//! A transport failure is returned as a retryable error with no state
//! change, so the admin can simply resubmit.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::Multipart;

use crate::mailer::{split_recipients, MailAttachment, OutgoingMail};
use crate::storage::{NewMessage, StorageError};
use crate::web::config::{DEFAULT_LOCALE, MAX_ATTACHMENT_SIZE};
use crate::web::state::SharedState;
use crate::web::utils::{
    acting_admin, api_error, client_ip, collapse_ws, compose_dedupe_hash, now_secs,
    reply_dedupe_hash, strip_html, user_agent, FieldErrors,
};

const SUBJECT_MAX: usize = 160;
const REPLY_BODY_MAX: usize = 10_000;
const COMPOSE_BODY_MAX: usize = 20_000;
const EMAIL_MAX: usize = 160;

/// File received on the reply/compose endpoints.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Validated reply form.
#[derive(Debug, Clone, Default)]
pub struct ReplyForm {
    pub subject: String,
    pub body: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachment: Option<UploadedFile>,
}

/// Validated compose form.
#[derive(Debug, Clone, Default)]
pub struct ComposeForm {
    pub to_name: Option<String>,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachment: Option<UploadedFile>,
}

struct RawForm {
    fields: HashMap<String, String>,
    file: Option<UploadedFile>,
}

/// Drain a multipart request into text fields plus an optional single
/// attachment, enforcing the size cap while reading.
async fn read_multipart(mut multipart: Multipart) -> Result<RawForm, Response> {
    let mut fields = HashMap::new();
    let mut file = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();
        if name == "attachment" {
            let filename = field
                .file_name()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "attachment.bin".to_string());
            let content_type = field
                .content_type()
                .map(|ct| ct.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            match field.bytes().await {
                Ok(bytes) => {
                    if bytes.len() as u64 > MAX_ATTACHMENT_SIZE {
                        return Err(api_error(
                            StatusCode::PAYLOAD_TOO_LARGE,
                            format!(
                                "attachment exceeds maximum size of {} bytes",
                                MAX_ATTACHMENT_SIZE
                            ),
                        ));
                    }
                    if !bytes.is_empty() {
                        file = Some(UploadedFile {
                            filename,
                            content_type,
                            data: bytes.to_vec(),
                        });
                    }
                }
                Err(e) => {
                    return Err(api_error(
                        StatusCode::BAD_REQUEST,
                        format!("failed to read attachment: {e}"),
                    ))
                }
            }
        } else {
            match field.text().await {
                Ok(value) => {
                    fields.insert(name, value);
                }
                Err(e) => {
                    return Err(api_error(
                        StatusCode::BAD_REQUEST,
                        format!("failed to read field '{name}': {e}"),
                    ))
                }
            }
        }
    }

    Ok(RawForm { fields, file })
}

fn parse_reply_form(raw: RawForm) -> Result<ReplyForm, FieldErrors> {
    let mut errors = FieldErrors::new();

    let subject = raw.fields.get("subject").map(|s| s.trim()).unwrap_or("");
    if subject.is_empty() {
        errors.add("subject", "subject is required");
    } else if subject.chars().count() > SUBJECT_MAX {
        errors.add(
            "subject",
            format!("subject must be at most {SUBJECT_MAX} characters"),
        );
    }

    let body = raw.fields.get("body").cloned().unwrap_or_default();
    if body.trim().is_empty() {
        errors.add("body", "body is required");
    } else if body.chars().count() > REPLY_BODY_MAX {
        errors.add(
            "body",
            format!("body must be at most {REPLY_BODY_MAX} characters"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ReplyForm {
        subject: subject.to_string(),
        body,
        cc: split_recipients(raw.fields.get("cc").map(String::as_str).unwrap_or("")),
        bcc: split_recipients(raw.fields.get("bcc").map(String::as_str).unwrap_or("")),
        attachment: raw.file,
    })
}

fn parse_compose_form(raw: RawForm) -> Result<ComposeForm, FieldErrors> {
    let mut errors = FieldErrors::new();

    let to_email = raw.fields.get("email").map(|s| s.trim()).unwrap_or("");
    if to_email.is_empty() {
        errors.add("email", "recipient email is required");
    } else if to_email.chars().count() > EMAIL_MAX
        || to_email.parse::<lettre::Address>().is_err()
    {
        errors.add("email", "recipient email address is invalid");
    }

    let subject = raw.fields.get("subject").map(|s| s.trim()).unwrap_or("");
    if subject.is_empty() {
        errors.add("subject", "subject is required");
    } else if subject.chars().count() > SUBJECT_MAX {
        errors.add(
            "subject",
            format!("subject must be at most {SUBJECT_MAX} characters"),
        );
    }

    let body = raw.fields.get("body").cloned().unwrap_or_default();
    if body.trim().is_empty() {
        errors.add("body", "body is required");
    } else if body.chars().count() > COMPOSE_BODY_MAX {
        errors.add(
            "body",
            format!("body must be at most {COMPOSE_BODY_MAX} characters"),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ComposeForm {
        to_name: raw
            .fields
            .get("name")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        to_email: to_email.to_string(),
        subject: subject.to_string(),
        body,
        cc: split_recipients(raw.fields.get("cc").map(String::as_str).unwrap_or("")),
        bcc: split_recipients(raw.fields.get("bcc").map(String::as_str).unwrap_or("")),
        attachment: raw.file,
    })
}

/// POST /api/admin/messages/:id/reply (multipart).
pub async fn reply_handler(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let raw = match read_multipart(multipart).await {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    let form = match parse_reply_form(raw) {
        Ok(form) => form,
        Err(errors) => return errors.into_response(),
    };
    let actor = acting_admin(&headers);
    let ip = client_ip(&headers);
    let ua = user_agent(&headers);
    process_reply(&state, id, &actor, form, ip, ua).await
}

/// Reply core, separated from multipart decoding so tests can drive it
/// directly.
pub async fn process_reply(
    state: &SharedState,
    id: i64,
    actor: &str,
    form: ReplyForm,
    ip: Option<String>,
    ua: Option<String>,
) -> Response {
    let now = now_secs();

    // Short lock: fetch the original, store the attachment, grab the mailer.
    let (original, mailer, site_name, stored_attachment) = {
        let st = state.lock().await;
        let original = match st.storage.get_message(id) {
            Ok(Some(m)) => m,
            Ok(None) => return api_error(StatusCode::NOT_FOUND, "message not found"),
            Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        let stored = match &form.attachment {
            Some(file) => match st.storage.save_attachment(&file.data, &file.filename) {
                Ok(rel) => Some((rel, file.filename.clone())),
                Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
            None => None,
        };
        (original, st.mailer.clone(), st.site_name.clone(), stored)
    };
    // Lock released

    let mail = OutgoingMail {
        to: original.email.clone(),
        to_name: Some(original.name.clone()),
        reply_to: None,
        cc: form.cc.clone(),
        bcc: form.bcc.clone(),
        subject: form.subject.clone(),
        html_body: form.body.clone(),
        text_body: collapse_ws(&strip_html(&form.body)),
        attachment: form.attachment.as_ref().map(|f| MailAttachment {
            filename: f.filename.clone(),
            content_type: f.content_type.clone(),
            data: f.data.clone(),
        }),
    };

    // The send is the gating step: nothing below runs when it fails, and the
    // admin can retry the whole action.
    let send_result = tokio::task::spawn_blocking(move || mailer.send(&mail)).await;
    match send_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            crate::dlog!(
                "reply: send failed for {} to {}: {}",
                crate::logging::msg_id(id),
                crate::logging::addr(&original.email),
                e
            );
            return api_error(StatusCode::BAD_GATEWAY, format!("failed to send reply: {e}"));
        }
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
        }
    }

    // Short lock: transition the original and record the reply as a new row
    // so the per-address history stays linear.
    let st = state.lock().await;
    match st.storage.mark_replied(id, actor, now) {
        Ok(true) => {}
        Ok(false) => return api_error(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }

    let history_row = NewMessage {
        name: format!("{site_name} (Admin)"),
        email: original.email.clone(),
        subject: form.subject.clone(),
        // Rich-text markup is kept on stored replies.
        body: form.body.clone(),
        consent: true,
        status: "replied".to_string(),
        handled_by: Some(actor.to_string()),
        replied_at: Some(now),
        dedupe_hash: reply_dedupe_hash(now),
        attachment: stored_attachment.as_ref().map(|(rel, _)| rel.clone()),
        attachment_name: stored_attachment.as_ref().map(|(_, name)| name.clone()),
        ip,
        user_agent: ua,
        locale: original.locale.clone(),
        source: "admin-reply".to_string(),
        ..Default::default()
    };
    let reply_id = match st.storage.insert_message(&history_row, now) {
        Ok(id) => id,
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    crate::dlog!(
        "reply: {} replied to {} (history row {})",
        actor,
        crate::logging::msg_id(id),
        crate::logging::msg_id(reply_id)
    );

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok", "message_id": reply_id })),
    )
        .into_response()
}

/// POST /api/admin/send (multipart) - compose a fresh outbound message,
/// independent of any existing row.
pub async fn send_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let raw = match read_multipart(multipart).await {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    let form = match parse_compose_form(raw) {
        Ok(form) => form,
        Err(errors) => return errors.into_response(),
    };
    let actor = acting_admin(&headers);
    let ip = client_ip(&headers);
    let ua = user_agent(&headers);
    process_send(&state, &actor, form, ip, ua).await
}

/// Compose core, separated from multipart decoding so tests can drive it
/// directly.
pub async fn process_send(
    state: &SharedState,
    actor: &str,
    form: ComposeForm,
    ip: Option<String>,
    ua: Option<String>,
) -> Response {
    let now = now_secs();

    let (mailer, stored_attachment) = {
        let st = state.lock().await;
        let stored = match &form.attachment {
            Some(file) => match st.storage.save_attachment(&file.data, &file.filename) {
                Ok(rel) => Some((rel, file.filename.clone())),
                Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
            None => None,
        };
        (st.mailer.clone(), stored)
    };

    let mail = OutgoingMail {
        to: form.to_email.clone(),
        to_name: form.to_name.clone(),
        reply_to: None,
        cc: form.cc.clone(),
        bcc: form.bcc.clone(),
        subject: form.subject.clone(),
        html_body: form.body.clone(),
        text_body: collapse_ws(&strip_html(&form.body)),
        attachment: form.attachment.as_ref().map(|f| MailAttachment {
            filename: f.filename.clone(),
            content_type: f.content_type.clone(),
            data: f.data.clone(),
        }),
    };

    let send_result = tokio::task::spawn_blocking(move || mailer.send(&mail)).await;
    match send_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            crate::dlog!(
                "send: failed to {}: {}",
                crate::logging::addr(&form.to_email),
                e
            );
            return api_error(StatusCode::BAD_GATEWAY, format!("failed to send: {e}"));
        }
        Err(e) => {
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
        }
    }

    let st = state.lock().await;
    let row = NewMessage {
        name: form
            .to_name
            .clone()
            .unwrap_or_else(|| form.to_email.clone()),
        email: form.to_email.clone(),
        subject: form.subject.clone(),
        // Composed messages are stored as their plain-text rendering.
        body: collapse_ws(&strip_html(&form.body)),
        consent: true,
        status: "replied".to_string(),
        handled_by: Some(actor.to_string()),
        replied_at: Some(now),
        dedupe_hash: compose_dedupe_hash(&form.to_email, &form.subject, now),
        attachment: stored_attachment.as_ref().map(|(rel, _)| rel.clone()),
        attachment_name: stored_attachment.as_ref().map(|(_, name)| name.clone()),
        ip,
        user_agent: ua,
        locale: DEFAULT_LOCALE.to_string(),
        source: "admin-send".to_string(),
        ..Default::default()
    };
    let id = match st.storage.insert_message(&row, now) {
        Ok(id) => id,
        Err(StorageError::Duplicate(_)) => {
            let mut errors = FieldErrors::new();
            errors.add("message", "this identical message was already sent recently");
            return errors.into_response();
        }
        Err(e) => return api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    crate::dlog!(
        "send: {} composed {} to {}",
        actor,
        crate::logging::msg_id(id),
        crate::logging::addr(&form.to_email)
    );

    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok", "message_id": id })),
    )
        .into_response()
}
