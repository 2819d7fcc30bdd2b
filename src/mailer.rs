//! Outbound email dispatch over SMTP.
//!
//! Handlers talk to the [`Mailer`] trait; production uses [`SmtpMailer`]
//! (lettre, blocking transport driven through `spawn_blocking` by the
//! callers), tests use [`RecordingMailer`].

use std::sync::Mutex;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum MailError {
    /// No transport configured, or the configuration is unusable.
    Config(String),
    /// The message itself could not be constructed.
    Build(String),
    /// The SMTP conversation failed. Retryable by the caller.
    Transport(String),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Config(msg) => write!(f, "mail configuration error: {msg}"),
            MailError::Build(msg) => write!(f, "mail build error: {msg}"),
            MailError::Transport(msg) => write!(f, "mail transport error: {msg}"),
        }
    }
}

impl std::error::Error for MailError {}

// ---------------------------------------------------------------------------
// Outgoing mail
// ---------------------------------------------------------------------------

/// Single file attached to an outgoing mail.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// A fully composed outgoing email.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub to_name: Option<String>,
    /// Reply-To address and display name, used on admin notifications so a
    /// reply goes straight to the original sender.
    pub reply_to: Option<(String, String)>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    /// Plain-text alternative, derived from the HTML body by the caller.
    pub text_body: String,
    pub attachment: Option<MailAttachment>,
}

/// Split a cc/bcc input on commas, semicolons, and whitespace, keeping only
/// syntactically valid addresses. Invalid entries are silently dropped.
pub fn split_recipients(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .flat_map(|part| part.split_whitespace())
        .filter(|part| part.parse::<Address>().is_ok())
        .map(|part| part.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Mailer trait and implementations
// ---------------------------------------------------------------------------

pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// SMTP settings resolved from CLI/env configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay hostname. When unset, every send fails as a transport error;
    /// data that depends on a successful send is then never written.
    pub host: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: String,
    pub from_name: String,
}

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, mail: &OutgoingMail) -> Result<Message, MailError> {
        let from_address: Address = self
            .config
            .from_address
            .parse()
            .map_err(|e| MailError::Config(format!("from address is invalid: {e}")))?;
        let from = Mailbox::new(Some(self.config.from_name.clone()), from_address);

        let to_address: Address = mail
            .to
            .parse()
            .map_err(|e| MailError::Build(format!("recipient address is invalid: {e}")))?;
        let to = Mailbox::new(mail.to_name.clone(), to_address);

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(mail.subject.clone());

        if let Some((reply_addr, reply_name)) = &mail.reply_to {
            let address: Address = reply_addr
                .parse()
                .map_err(|e| MailError::Build(format!("reply-to address is invalid: {e}")))?;
            builder = builder.reply_to(Mailbox::new(Some(reply_name.clone()), address));
        }
        // cc/bcc come out of split_recipients, already validated.
        for cc in &mail.cc {
            if let Ok(address) = cc.parse::<Address>() {
                builder = builder.cc(Mailbox::new(None, address));
            }
        }
        for bcc in &mail.bcc {
            if let Ok(address) = bcc.parse::<Address>() {
                builder = builder.bcc(Mailbox::new(None, address));
            }
        }

        let alternative = MultiPart::alternative()
            .singlepart(SinglePart::plain(mail.text_body.clone()))
            .singlepart(SinglePart::html(mail.html_body.clone()));

        let message = match &mail.attachment {
            Some(att) => {
                let content_type = ContentType::parse(&att.content_type)
                    .or_else(|_| ContentType::parse("application/octet-stream"))
                    .map_err(|e| MailError::Build(format!("attachment content type: {e}")))?;
                let part = Attachment::new(att.filename.clone()).body(att.data.clone(), content_type);
                builder.multipart(MultiPart::mixed().multipart(alternative).singlepart(part))
            }
            None => builder.multipart(alternative),
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let host = self
            .config
            .host
            .as_deref()
            .ok_or_else(|| MailError::Transport("no SMTP relay configured".to_string()))?;

        let message = self.build_message(mail)?;

        let mut builder = SmtpTransport::relay(host)
            .map_err(|e| MailError::Config(format!("smtp relay init failed: {e}")))?
            .port(self.config.port);
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let transport = builder.build();

        transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| MailError::Transport(format!("smtp send failed for '{}': {e}", mail.to)))
    }
}

/// Test double that records every send and can be told to fail.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingMail>>,
    fail: Mutex<Option<String>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent send fail with a transport error.
    pub fn fail_with(&self, reason: &str) {
        *self.fail.lock().unwrap() = Some(reason.to_string());
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent(&self) -> Option<OutgoingMail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if let Some(reason) = self.fail.lock().unwrap().clone() {
            return Err(MailError::Transport(reason));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
