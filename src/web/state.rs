//! Shared application state.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::mailer::Mailer;
use crate::storage::Storage;

pub struct AppState {
    pub storage: Storage,
    /// Shared so handlers can clone it out of the lock and run the blocking
    /// SMTP conversation without holding the state mutex.
    pub mailer: Arc<dyn Mailer>,
    pub site_name: String,
    pub notify_email: Option<String>,
    pub blocked_tlds: Vec<String>,
}

pub type SharedState = Arc<Mutex<AppState>>;
