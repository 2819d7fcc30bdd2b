//! Configuration types and constants for the contact-desk server.

use std::path::PathBuf;

use clap::Parser;

use crate::classifier::default_blocked_tlds;
use crate::mailer::SmtpConfig;

/// Inbox page size for the admin listing.
pub(crate) const PAGE_SIZE: u32 = 20;

/// Maximum attachment size accepted on the reply and compose endpoints.
pub(crate) const MAX_ATTACHMENT_SIZE: u64 = 10 * 1024 * 1024; // 10 MiB

/// Number of prior same-sender messages returned by the history endpoint.
pub(crate) const HISTORY_LIMIT: u32 = 10;

/// Locale recorded when a submission does not carry one.
pub(crate) const DEFAULT_LOCALE: &str = "nl";

/// Contact-message inbox server.
///
/// Public form submissions go through spam triage and deduplication into
/// SQLite; admins list, reply to (by email), and manage messages over a
/// REST API.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "contact-desk", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: CONTACT_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for database and attachments [env: CONTACT_HOME] [default: ~/.contact-desk]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// SMTP relay host for outbound mail [env: CONTACT_SMTP_HOST]
    #[arg(long)]
    pub smtp_host: Option<String>,

    /// From address on outbound mail [env: CONTACT_FROM_ADDRESS]
    #[arg(long)]
    pub from_address: Option<String>,

    /// Address that receives new-message notifications [env: CONTACT_NOTIFY_EMAIL]
    #[arg(long)]
    pub notify_email: Option<String>,

    /// Site name used on outbound mail and history rows [env: CONTACT_SITE_NAME]
    #[arg(long)]
    pub site_name: Option<String>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub smtp: SmtpConfig,
    pub notify_email: Option<String>,
    pub site_name: String,
    pub blocked_tlds: Vec<String>,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("CONTACT_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".contact-desk"))
                    .unwrap_or_else(|_| PathBuf::from(".contact-desk"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("CONTACT_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let site_name = cli
            .site_name
            .or_else(|| std::env::var("CONTACT_SITE_NAME").ok())
            .unwrap_or_else(|| "Contact Desk".to_string());

        let from_address = cli
            .from_address
            .or_else(|| std::env::var("CONTACT_FROM_ADDRESS").ok())
            .unwrap_or_else(|| "noreply@localhost".to_string());

        let notify_email = cli
            .notify_email
            .or_else(|| std::env::var("CONTACT_NOTIFY_EMAIL").ok());

        let smtp = SmtpConfig {
            host: cli
                .smtp_host
                .or_else(|| std::env::var("CONTACT_SMTP_HOST").ok()),
            port: std::env::var("CONTACT_SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            username: std::env::var("CONTACT_SMTP_USER").ok(),
            password: std::env::var("CONTACT_SMTP_PASS").ok(),
            from_address,
            from_name: site_name.clone(),
        };

        let blocked_tlds = std::env::var("CONTACT_BLOCKED_TLDS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|t| t.trim().to_lowercase())
                    .filter(|t| !t.is_empty())
                    .map(|t| {
                        if t.starts_with('.') {
                            t
                        } else {
                            format!(".{t}")
                        }
                    })
                    .collect()
            })
            .unwrap_or_else(default_blocked_tlds);

        Self {
            bind_addr,
            data_dir,
            smtp,
            notify_email,
            site_name,
            blocked_tlds,
        }
    }
}
