//! Message lifecycle: the primary status plus the archived and spam
//! overlays, and the admin actions that move between them.
//!
//! Status transitions never delete data. `closed` is not terminal: a closed
//! message can still be replied to, which moves it back to `replied`.

use crate::storage::{Storage, StorageError};

/// Reason recorded when an admin flags a message as spam by hand.
pub const MANUAL_SPAM_REASON: &str = "manually marked";

/// Primary message status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Read,
    Replied,
    Closed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Read => "read",
            Status::Replied => "replied",
            Status::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Status::New),
            "read" => Some(Status::Read),
            "replied" => Some(Status::Replied),
            "closed" => Some(Status::Closed),
            _ => None,
        }
    }
}

/// Admin action on a message, as accepted by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Read,
    Replied,
    Closed,
    Archive,
    Unarchive,
    Spam,
    Ham,
}

impl StatusAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusAction::Read => "read",
            StatusAction::Replied => "replied",
            StatusAction::Closed => "closed",
            StatusAction::Archive => "archive",
            StatusAction::Unarchive => "unarchive",
            StatusAction::Spam => "spam",
            StatusAction::Ham => "ham",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(StatusAction::Read),
            "replied" => Some(StatusAction::Replied),
            "closed" => Some(StatusAction::Closed),
            "archive" => Some(StatusAction::Archive),
            "unarchive" => Some(StatusAction::Unarchive),
            "spam" => Some(StatusAction::Spam),
            "ham" => Some(StatusAction::Ham),
            _ => None,
        }
    }
}

/// Apply an admin action to a message.
///
/// `actor` is the acting admin, threaded in explicitly by the caller and
/// recorded in `handled_by` for the status transitions. The archive and spam
/// overlays leave `status` and `handled_by` untouched. Returns false when no
/// live row matched.
pub fn apply_action(
    storage: &Storage,
    id: i64,
    action: StatusAction,
    actor: &str,
    now: u64,
) -> Result<bool, StorageError> {
    match action {
        StatusAction::Read => storage.mark_read(id, actor, now),
        StatusAction::Replied => storage.mark_replied(id, actor, now),
        StatusAction::Closed => storage.mark_closed(id, actor, now),
        StatusAction::Archive => storage.set_archived(id, true, now),
        StatusAction::Unarchive => storage.set_archived(id, false, now),
        StatusAction::Spam => storage.mark_spam(id, MANUAL_SPAM_REASON, now),
        StatusAction::Ham => storage.mark_ham(id, now),
    }
}
