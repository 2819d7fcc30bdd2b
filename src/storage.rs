//! SQLite storage layer for the contact-message inbox.
//!
//! Handles schema creation, CRUD with soft-delete for contact messages,
//! the dedupe-hash uniqueness constraint, filtered inbox queries with
//! aggregate counters, and attachment files on disk.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    /// A non-deleted row with the same dedupe hash already exists.
    Duplicate(String),
    NotFound(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Duplicate(msg) => write!(f, "duplicate: {msg}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Contact message row stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub consent: bool,
    /// "new", "read", "replied", "closed"
    pub status: String,
    pub handled_by: Option<String>,
    pub read_at: Option<u64>,
    pub replied_at: Option<u64>,
    /// Orthogonal overlay; independent of `status`.
    pub archived_at: Option<u64>,
    pub hp_filled: bool,
    pub duration_ms: u64,
    pub is_spam: bool,
    pub spam_reason: Option<String>,
    pub dedupe_hash: String,
    pub attachment: Option<String>,
    pub attachment_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    /// JSON attribution blob, stored verbatim.
    pub utm: Option<String>,
    pub locale: String,
    /// "website", "admin-reply", "admin-send"
    pub source: String,
    pub user_id: Option<i64>,
    pub created_at: u64,
    pub updated_at: u64,
    pub deleted_at: Option<u64>,
}

/// Fields for inserting a new contact message. The id and audit columns are
/// assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub consent: bool,
    pub status: String,
    pub handled_by: Option<String>,
    pub replied_at: Option<u64>,
    pub hp_filled: bool,
    pub duration_ms: u64,
    pub is_spam: bool,
    pub spam_reason: Option<String>,
    pub dedupe_hash: String,
    pub attachment: Option<String>,
    pub attachment_name: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub utm: Option<String>,
    pub locale: String,
    pub source: String,
    pub user_id: Option<i64>,
}

/// Filter and pagination criteria for the inbox listing.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// Case-insensitive substring over name/email/subject/body.
    pub search: Option<String>,
    /// "new", "read", "replied", "closed", or the synthetic "archived".
    pub status: Option<String>,
    pub spam_only: bool,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

/// One page of inbox results plus the total count for the active filter.
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<MessageRow>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

/// Aggregate counters for the inbox header. Status counts exclude archived
/// messages; everything excludes soft-deleted rows.
#[derive(Debug, Clone, Serialize)]
pub struct InboxStats {
    pub total: u64,
    pub new: u64,
    pub read: u64,
    pub replied: u64,
    pub closed: u64,
    pub archived: u64,
    pub spam: u64,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

const MESSAGE_COLUMNS: &str = "id, name, email, phone, subject, body, consent, status, handled_by,
     read_at, replied_at, archived_at, hp_filled, duration_ms, is_spam, spam_reason,
     dedupe_hash, attachment, attachment_name, ip, user_agent, referer, utm,
     locale, source, user_id, created_at, updated_at, deleted_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        consent: row.get::<_, i32>(6)? != 0,
        status: row.get(7)?,
        handled_by: row.get(8)?,
        read_at: row.get::<_, Option<i64>>(9)?.map(|t| t as u64),
        replied_at: row.get::<_, Option<i64>>(10)?.map(|t| t as u64),
        archived_at: row.get::<_, Option<i64>>(11)?.map(|t| t as u64),
        hp_filled: row.get::<_, i32>(12)? != 0,
        duration_ms: row.get::<_, i64>(13)? as u64,
        is_spam: row.get::<_, i32>(14)? != 0,
        spam_reason: row.get(15)?,
        dedupe_hash: row.get(16)?,
        attachment: row.get(17)?,
        attachment_name: row.get(18)?,
        ip: row.get(19)?,
        user_agent: row.get(20)?,
        referer: row.get(21)?,
        utm: row.get(22)?,
        locale: row.get(23)?,
        source: row.get(24)?,
        user_id: row.get(25)?,
        created_at: row.get::<_, i64>(26)? as u64,
        updated_at: row.get::<_, i64>(27)? as u64,
        deleted_at: row.get::<_, Option<i64>>(28)?.map(|t| t as u64),
    })
}

/// Database filename inside the data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("contact-desk.db")
}

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
    /// Directory on disk where reply attachment files are stored.
    pub attachment_dir: PathBuf,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    /// Attachments are stored as files in an `attachments/` subdirectory
    /// alongside the database file.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let attachment_dir = path.parent().unwrap_or(Path::new(".")).join("attachments");
        std::fs::create_dir_all(&attachment_dir)?;
        let storage = Self {
            conn,
            attachment_dir,
        };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database with an explicit attachment directory.
    /// The caller is responsible for providing an appropriate path; this
    /// function never chooses a location autonomously.
    pub fn open_in_memory(attachment_dir: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        std::fs::create_dir_all(attachment_dir)?;
        let storage = Self {
            conn,
            attachment_dir: attachment_dir.to_path_buf(),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS contact_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL,
                phone           TEXT,
                subject         TEXT NOT NULL,
                body            TEXT NOT NULL,
                consent         INTEGER NOT NULL DEFAULT 0,
                status          TEXT NOT NULL DEFAULT 'new',
                handled_by      TEXT,
                read_at         INTEGER,
                replied_at      INTEGER,
                archived_at     INTEGER,
                hp_filled       INTEGER NOT NULL DEFAULT 0,
                duration_ms     INTEGER NOT NULL DEFAULT 0,
                is_spam         INTEGER NOT NULL DEFAULT 0,
                spam_reason     TEXT,
                dedupe_hash     TEXT NOT NULL,
                attachment      TEXT,
                attachment_name TEXT,
                ip              TEXT,
                user_agent      TEXT,
                referer         TEXT,
                utm             TEXT,
                locale          TEXT NOT NULL DEFAULT 'nl',
                source          TEXT NOT NULL DEFAULT 'website',
                user_id         INTEGER,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                deleted_at      INTEGER
            );

            -- Soft-deleted rows release their hash so the sender can resubmit.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_dedupe
                ON contact_messages(dedupe_hash) WHERE deleted_at IS NULL;

            CREATE INDEX IF NOT EXISTS idx_messages_status_spam
                ON contact_messages(status, is_spam);
            CREATE INDEX IF NOT EXISTS idx_messages_email
                ON contact_messages(email);
            CREATE INDEX IF NOT EXISTS idx_messages_created
                ON contact_messages(created_at);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Messages CRUD
    // -----------------------------------------------------------------------

    /// Insert a new message and return its id. A dedupe-hash collision with a
    /// non-deleted row fails with [`StorageError::Duplicate`]; the unique
    /// index makes this deterministic under concurrent submissions.
    pub fn insert_message(&self, msg: &NewMessage, now: u64) -> Result<i64, StorageError> {
        let result = self.conn.execute(
            "INSERT INTO contact_messages
             (name, email, phone, subject, body, consent, status, handled_by,
              replied_at, hp_filled, duration_ms, is_spam, spam_reason, dedupe_hash,
              attachment, attachment_name, ip, user_agent, referer, utm,
              locale, source, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?24)",
            params![
                msg.name,
                msg.email,
                msg.phone,
                msg.subject,
                msg.body,
                msg.consent as i32,
                msg.status,
                msg.handled_by,
                msg.replied_at.map(|t| t as i64),
                msg.hp_filled as i32,
                msg.duration_ms as i64,
                msg.is_spam as i32,
                msg.spam_reason,
                msg.dedupe_hash,
                msg.attachment,
                msg.attachment_name,
                msg.ip,
                msg.user_agent,
                msg.referer,
                msg.utm,
                msg.locale,
                msg.source,
                msg.user_id,
                now as i64,
            ],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Err(StorageError::Duplicate(
                    "a message with identical content already exists".to_string(),
                ))
            }
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    /// Fetch a message by id, excluding soft-deleted rows.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>, StorageError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM contact_messages
             WHERE id = ?1 AND deleted_at IS NULL"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![id], row_to_message).optional()?;
        Ok(row)
    }

    /// Fetch a message by id, including soft-deleted rows.
    pub fn get_message_any(&self, id: i64) -> Result<Option<MessageRow>, StorageError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM contact_messages WHERE id = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![id], row_to_message).optional()?;
        Ok(row)
    }

    /// Soft-delete a message. Returns false if no live row matched.
    pub fn soft_delete_message(&self, id: i64, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now as i64, id],
        )?;
        Ok(affected > 0)
    }

    /// Restore a soft-deleted message. Returns false if the row was not
    /// deleted (or does not exist).
    pub fn restore_message(&self, id: i64, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NOT NULL",
            params![now as i64, id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Lifecycle mutations
    // -----------------------------------------------------------------------

    /// Mark a message read. Idempotent: `read_at` is only set when null,
    /// status is only promoted from `new`, and `handled_by` is only set when
    /// unset. Repeated views are no-ops apart from `updated_at`.
    pub fn mark_read(&self, id: i64, actor: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages
             SET status = CASE WHEN status = 'new' THEN 'read' ELSE status END,
                 read_at = COALESCE(read_at, ?1),
                 handled_by = COALESCE(handled_by, ?2),
                 updated_at = ?1
             WHERE id = ?3 AND deleted_at IS NULL",
            params![now as i64, actor, id],
        )?;
        Ok(affected > 0)
    }

    /// Mark a message replied. Always overwrites `replied_at` and
    /// `handled_by`, so a re-reply refreshes the timestamp.
    pub fn mark_replied(&self, id: i64, actor: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages
             SET status = 'replied', replied_at = ?1, handled_by = ?2, updated_at = ?1
             WHERE id = ?3 AND deleted_at IS NULL",
            params![now as i64, actor, id],
        )?;
        Ok(affected > 0)
    }

    /// Close a message.
    pub fn mark_closed(&self, id: i64, actor: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages
             SET status = 'closed', handled_by = ?2, updated_at = ?1
             WHERE id = ?3 AND deleted_at IS NULL",
            params![now as i64, actor, id],
        )?;
        Ok(affected > 0)
    }

    /// Set or clear the archived overlay. Leaves `status` untouched.
    pub fn set_archived(&self, id: i64, archived: bool, now: u64) -> Result<bool, StorageError> {
        let archived_at: Option<i64> = if archived { Some(now as i64) } else { None };
        let affected = self.conn.execute(
            "UPDATE contact_messages SET archived_at = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![archived_at, now as i64, id],
        )?;
        Ok(affected > 0)
    }

    /// Manually flag a message as spam. An existing reason is kept; otherwise
    /// the given fallback reason is recorded.
    pub fn mark_spam(&self, id: i64, reason: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages
             SET is_spam = 1, spam_reason = COALESCE(spam_reason, ?1), updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![reason, now as i64, id],
        )?;
        Ok(affected > 0)
    }

    /// Clear the spam flag and its reason.
    pub fn mark_ham(&self, id: i64, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE contact_messages
             SET is_spam = 0, spam_reason = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now as i64, id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Inbox queries
    // -----------------------------------------------------------------------

    /// Build the WHERE tail and bind values shared by the page query and its
    /// total count.
    fn search_filter(criteria: &SearchCriteria) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut sql = String::from(" WHERE deleted_at IS NULL");
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(search) = criteria.search.as_deref() {
            let search = search.trim();
            if !search.is_empty() {
                sql.push_str(
                    " AND (lower(name) LIKE ? OR lower(email) LIKE ?
                       OR lower(subject) LIKE ? OR lower(body) LIKE ?)",
                );
                let pattern = format!("%{}%", search.to_lowercase());
                for _ in 0..4 {
                    bind_values.push(Box::new(pattern.clone()));
                }
            }
        }

        match criteria.status.as_deref() {
            // Synthetic pseudo-status: any archived message, whatever its status.
            Some("archived") => sql.push_str(" AND archived_at IS NOT NULL"),
            Some(status) => {
                sql.push_str(" AND status = ? AND archived_at IS NULL");
                bind_values.push(Box::new(status.to_string()));
            }
            None => {}
        }

        if criteria.spam_only {
            sql.push_str(" AND is_spam = 1");
        }

        (sql, bind_values)
    }

    /// Paginated, filtered inbox listing ordered by creation time descending
    /// with id as a stable tie-break.
    pub fn search_messages(&self, criteria: &SearchCriteria) -> Result<MessagePage, StorageError> {
        let (filter, mut bind_values) = Self::search_filter(criteria);

        let count_sql = format!("SELECT COUNT(*) FROM contact_messages{filter}");
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let total: i64 =
            self.conn
                .query_row(&count_sql, bind_refs.as_slice(), |row| row.get(0))?;

        let per_page = criteria.per_page.max(1);
        let page = criteria.page.max(1);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM contact_messages{filter}
             ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
        );
        bind_values.push(Box::new(per_page as i64));
        bind_values.push(Box::new(((page - 1) * per_page) as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(bind_refs.as_slice(), row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        Ok(MessagePage {
            messages,
            total: total as u64,
            page,
            per_page,
        })
    }

    /// Aggregate counters for the inbox header.
    pub fn inbox_stats(&self) -> Result<InboxStats, StorageError> {
        let count = |sql: &str| -> Result<u64, StorageError> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };
        let by_status = |status: &str| -> Result<u64, StorageError> {
            let n: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM contact_messages
                 WHERE deleted_at IS NULL AND status = ?1 AND archived_at IS NULL",
                params![status],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        };

        Ok(InboxStats {
            total: count("SELECT COUNT(*) FROM contact_messages WHERE deleted_at IS NULL")?,
            new: by_status("new")?,
            read: by_status("read")?,
            replied: by_status("replied")?,
            closed: by_status("closed")?,
            archived: count(
                "SELECT COUNT(*) FROM contact_messages
                 WHERE deleted_at IS NULL AND archived_at IS NOT NULL",
            )?,
            spam: count(
                "SELECT COUNT(*) FROM contact_messages
                 WHERE deleted_at IS NULL AND is_spam = 1",
            )?,
        })
    }

    /// Up to `limit` other messages sharing the given message's email
    /// address, newest first. Used for the conversation-context panel.
    pub fn history_for(&self, id: i64, limit: u32) -> Result<Vec<MessageRow>, StorageError> {
        let message = self
            .get_message(id)?
            .ok_or_else(|| StorageError::NotFound(format!("message {id}")))?;

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM contact_messages
             WHERE email = ?1 AND id != ?2 AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![message.email, id, limit as i64], row_to_message)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    /// Derive the filesystem path for a stored attachment, relative to the
    /// attachment directory.
    ///
    /// Uses a two-level directory prefix (`hash[0..2] / hash[2..4]`) to avoid
    /// large flat directories, and keeps a sanitized extension from the
    /// uploaded filename.
    fn attachment_rel_path(content_hash: &str, filename: &str) -> String {
        let ext: String = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                e.chars()
                    .filter(|c| c.is_ascii_alphanumeric())
                    .take(10)
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "bin".to_string());
        format!(
            "{}/{}/{}.{}",
            &content_hash[..2],
            &content_hash[2..4],
            content_hash,
            ext
        )
    }

    /// Write an uploaded attachment to disk, content-addressed so duplicate
    /// uploads are stored once. Returns the path relative to the attachment
    /// directory.
    pub fn save_attachment(&self, data: &[u8], filename: &str) -> Result<String, StorageError> {
        let content_hash = hex::encode(Sha256::digest(data));
        let rel = Self::attachment_rel_path(&content_hash, filename);
        let path = self.attachment_dir.join(&rel);
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, data)?;
        }
        Ok(rel)
    }

    /// Absolute path of a stored attachment.
    pub fn attachment_path(&self, rel: &str) -> PathBuf {
        self.attachment_dir.join(rel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Create an in-memory storage with a per-invocation temp directory for
    /// attachment files. Each call gets a unique directory so parallel tests
    /// don't collide.
    fn test_storage() -> Storage {
        let pid = std::process::id();
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("contact-desk-test-{pid}-{ts}"));
        Storage::open_in_memory(&dir).unwrap()
    }

    fn sample_message(hash: &str) -> NewMessage {
        NewMessage {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            subject: "Question".to_string(),
            body: "Hello there".to_string(),
            consent: true,
            status: "new".to_string(),
            duration_ms: 9000,
            dedupe_hash: hash.to_string(),
            locale: "nl".to_string(),
            source: "website".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_get() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        let loaded = storage.get_message(id).unwrap().unwrap();
        assert_eq!(loaded.name, "Alice");
        assert_eq!(loaded.status, "new");
        assert_eq!(loaded.created_at, now);
        assert!(loaded.consent);
        assert!(loaded.read_at.is_none());
        assert!(loaded.deleted_at.is_none());
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let storage = test_storage();
        let now = now_secs();

        storage.insert_message(&sample_message("h1"), now).unwrap();
        let err = storage.insert_message(&sample_message("h1"), now).unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));

        // Only one row exists.
        let stats = storage.inbox_stats().unwrap();
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn test_duplicate_allowed_after_soft_delete() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        storage.soft_delete_message(id, now).unwrap();

        // The partial unique index only covers live rows.
        storage.insert_message(&sample_message("h1"), now).unwrap();
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        assert!(storage.soft_delete_message(id, now).unwrap());
        assert!(storage.get_message(id).unwrap().is_none());
        assert!(storage.get_message_any(id).unwrap().is_some());

        // Second delete is a no-op.
        assert!(!storage.soft_delete_message(id, now).unwrap());

        assert!(storage.restore_message(id, now).unwrap());
        assert!(storage.get_message(id).unwrap().is_some());
        assert!(!storage.restore_message(id, now).unwrap());
    }

    #[test]
    fn test_mark_read_idempotent() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        assert!(storage.mark_read(id, "admin-1", now).unwrap());
        let first = storage.get_message(id).unwrap().unwrap();
        assert_eq!(first.status, "read");
        assert_eq!(first.read_at, Some(now));
        assert_eq!(first.handled_by.as_deref(), Some("admin-1"));

        // A later view by another admin changes nothing.
        assert!(storage.mark_read(id, "admin-2", now + 60).unwrap());
        let second = storage.get_message(id).unwrap().unwrap();
        assert_eq!(second.status, "read");
        assert_eq!(second.read_at, Some(now));
        assert_eq!(second.handled_by.as_deref(), Some("admin-1"));
    }

    #[test]
    fn test_mark_read_does_not_regress_status() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        storage.mark_replied(id, "admin-1", now).unwrap();
        storage.mark_read(id, "admin-1", now + 1).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert_eq!(row.status, "replied");
    }

    #[test]
    fn test_mark_replied_overwrites_timestamp() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        storage.mark_replied(id, "admin-1", now).unwrap();
        storage.mark_replied(id, "admin-2", now + 100).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert_eq!(row.replied_at, Some(now + 100));
        assert_eq!(row.handled_by.as_deref(), Some("admin-2"));
    }

    #[test]
    fn test_archive_is_independent_of_status() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        storage.mark_closed(id, "admin-1", now).unwrap();
        storage.set_archived(id, true, now).unwrap();

        let row = storage.get_message(id).unwrap().unwrap();
        assert_eq!(row.status, "closed");
        assert_eq!(row.archived_at, Some(now));

        storage.set_archived(id, false, now + 1).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert_eq!(row.status, "closed");
        assert!(row.archived_at.is_none());
    }

    #[test]
    fn test_spam_ham_round_trip() {
        let storage = test_storage();
        let now = now_secs();

        let id = storage.insert_message(&sample_message("h1"), now).unwrap();
        storage.mark_spam(id, "manually marked", now).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert!(row.is_spam);
        assert_eq!(row.spam_reason.as_deref(), Some("manually marked"));

        storage.mark_ham(id, now).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert!(!row.is_spam);
        assert!(row.spam_reason.is_none());
    }

    #[test]
    fn test_mark_spam_keeps_classifier_reason() {
        let storage = test_storage();
        let now = now_secs();

        let mut msg = sample_message("h1");
        msg.is_spam = true;
        msg.spam_reason = Some("honeypot field filled".to_string());
        let id = storage.insert_message(&msg, now).unwrap();

        storage.mark_spam(id, "manually marked", now).unwrap();
        let row = storage.get_message(id).unwrap().unwrap();
        assert_eq!(row.spam_reason.as_deref(), Some("honeypot field filled"));
    }

    #[test]
    fn test_search_filters() {
        let storage = test_storage();
        let now = now_secs();

        let mut a = sample_message("h1");
        a.subject = "Invoice question".to_string();
        let id_a = storage.insert_message(&a, now).unwrap();

        let mut b = sample_message("h2");
        b.email = "bob@example.org".to_string();
        b.subject = "Partnership".to_string();
        let id_b = storage.insert_message(&b, now + 1).unwrap();

        let mut c = sample_message("h3");
        c.is_spam = true;
        let id_c = storage.insert_message(&c, now + 2).unwrap();

        storage.mark_closed(id_a, "admin", now + 3).unwrap();
        storage.set_archived(id_a, true, now + 3).unwrap();

        // Free text matches subject, case-insensitively.
        let page = storage
            .search_messages(&SearchCriteria {
                search: Some("invoice".to_string()),
                page: 1,
                per_page: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.messages[0].id, id_a);

        // Status filter excludes archived rows.
        let page = storage
            .search_messages(&SearchCriteria {
                status: Some("closed".to_string()),
                page: 1,
                per_page: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 0);

        // The archived pseudo-status matches regardless of status.
        let page = storage
            .search_messages(&SearchCriteria {
                status: Some("archived".to_string()),
                page: 1,
                per_page: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.messages[0].id, id_a);

        // Spam toggle.
        let page = storage
            .search_messages(&SearchCriteria {
                spam_only: true,
                page: 1,
                per_page: 20,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.messages[0].id, id_c);

        let _ = id_b;
    }

    #[test]
    fn test_search_order_and_pagination() {
        let storage = test_storage();
        let now = now_secs();

        // Three rows with the same timestamp: id must break the tie,
        // newest insert first.
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                storage
                    .insert_message(&sample_message(&format!("h{i}")), now)
                    .unwrap(),
            );
        }

        let page = storage
            .search_messages(&SearchCriteria {
                page: 1,
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].id, ids[2]);
        assert_eq!(page.messages[1].id, ids[1]);

        let page = storage
            .search_messages(&SearchCriteria {
                page: 2,
                per_page: 2,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].id, ids[0]);
    }

    #[test]
    fn test_inbox_stats_exclude_archived_and_deleted() {
        let storage = test_storage();
        let now = now_secs();

        let id_new = storage.insert_message(&sample_message("h1"), now).unwrap();
        let id_replied = storage.insert_message(&sample_message("h2"), now).unwrap();
        let id_gone = storage.insert_message(&sample_message("h3"), now).unwrap();

        storage.mark_replied(id_replied, "admin", now).unwrap();
        storage.set_archived(id_replied, true, now).unwrap();
        storage.soft_delete_message(id_gone, now).unwrap();

        let stats = storage.inbox_stats().unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.new, 1);
        // Replied-and-archived counts under archived, not replied.
        assert_eq!(stats.replied, 0);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.spam, 0);

        let _ = id_new;
    }

    #[test]
    fn test_history_for() {
        let storage = test_storage();
        let now = now_secs();

        let first = storage.insert_message(&sample_message("h0"), now).unwrap();
        for i in 1..=12 {
            let mut msg = sample_message(&format!("h{i}"));
            msg.subject = format!("Follow-up {i}");
            storage.insert_message(&msg, now + i).unwrap();
        }
        let mut other = sample_message("other");
        other.email = "someone-else@example.com".to_string();
        storage.insert_message(&other, now + 99).unwrap();

        let history = storage.history_for(first, 10).unwrap();
        assert_eq!(history.len(), 10);
        // Newest first, own row and other senders excluded.
        assert_eq!(history[0].subject, "Follow-up 12");
        assert!(history.iter().all(|m| m.id != first));
        assert!(history.iter().all(|m| m.email == "alice@example.com"));
    }

    #[test]
    fn test_history_for_missing_message() {
        let storage = test_storage();
        let err = storage.history_for(999, 10).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_save_attachment() {
        let storage = test_storage();
        let rel = storage.save_attachment(b"pdf bytes", "Offer Letter.PDF").unwrap();
        assert!(rel.ends_with(".pdf"));
        let path = storage.attachment_path(&rel);
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"pdf bytes");

        // Content-addressed: same bytes, same path.
        let rel2 = storage.save_attachment(b"pdf bytes", "other.pdf").unwrap();
        assert_eq!(rel, rel2);
    }
}
