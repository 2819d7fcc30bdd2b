//! contact-desk web server: public contact form plus the admin inbox API,
//! persisting messages in SQLite and sending replies over SMTP.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;

use crate::mailer::SmtpMailer;
use crate::storage::{db_path, Storage};

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::dlog!("contact-desk starting");
    crate::dlog!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");
    let storage = Storage::open(&db_path(&config.data_dir)).expect("failed to open database");
    crate::dlog!("  database: {}", db_path(&config.data_dir).display());

    match &config.smtp.host {
        Some(host) => crate::dlog!("  smtp relay: {}", host),
        None => crate::dlog!("  smtp relay: none configured (outbound mail will fail)"),
    }
    match &config.notify_email {
        Some(addr) => crate::dlog!("  notifications: {}", crate::logging::addr(addr)),
        None => crate::dlog!("  notifications: disabled"),
    }

    let state: SharedState = Arc::new(tokio::sync::Mutex::new(AppState {
        storage,
        mailer: Arc::new(SmtpMailer::new(config.smtp)),
        site_name: config.site_name,
        notify_email: config.notify_email,
        blocked_tlds: config.blocked_tlds,
    }));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::dlog!("contact-desk listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
