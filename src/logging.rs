//! Timestamped logging with source locations and ANSI colour support.
//!
//! Provides the [`dlog!`] macro for consistent log output in the format:
//!
//! ```text
//! 20260806T09:12:45.000 - src/web/handlers/submit.rs:88 - submit: stored message m-42
//! ```
//!
//! When stderr is a terminal, timestamps and source locations are dimmed and
//! message ids / email addresses get consistent colours based on their
//! content. Log lines always go to stderr.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Initialize the logging system. Call once at startup before any logging.
/// Detects whether stderr supports ANSI colours.
pub fn init() {
    let is_terminal = std::io::stderr().is_terminal();
    COLOUR_ENABLED.store(is_terminal, Ordering::Relaxed);
}

/// Returns whether ANSI colour output is enabled.
pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

// ANSI escape codes
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

/// Colour palette for address hashing.
const ID_COLOURS: &[&str] = &[
    "\x1b[91m", // bright red
    "\x1b[92m", // bright green
    "\x1b[94m", // bright blue
    "\x1b[95m", // bright magenta
    "\x1b[96m", // bright cyan
    "\x1b[32m", // green
    "\x1b[34m", // blue
    "\x1b[35m", // magenta
    "\x1b[36m", // cyan
];

/// Pick a deterministic colour for the given string.
fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const MSG_ID_COLOUR: &str = "\x1b[93m"; // bright yellow

/// Format a message id for log output, e.g. `m-42`.
pub fn msg_id(id: i64) -> String {
    if colour_enabled() {
        format!("{MSG_ID_COLOUR}m-{id}{RESET}")
    } else {
        format!("m-{id}")
    }
}

const ADDR_TRUNCATE_LEN: usize = 24;

/// Format an email address for log output with consistent colour, truncated
/// so a hostile sender cannot flood the log line.
pub fn addr(email: &str) -> String {
    let end = email
        .char_indices()
        .nth(ADDR_TRUNCATE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(email.len());
    let short = &email[..end];
    if colour_enabled() {
        let colour = hash_colour(email);
        format!("{colour}{short}{RESET}")
    } else {
        short.to_string()
    }
}

/// Format the current wall-clock time as `YYYYMMDDTHH:MM:SS.mmm`.
pub fn format_timestamp() -> String {
    let now = SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    let time_secs = secs % 86400;
    let hours = time_secs / 3600;
    let minutes = (time_secs % 3600) / 60;
    let seconds = time_secs % 60;

    // Civil date from days since epoch (Howard Hinnant's algorithm).
    let days = (secs / 86400) as i64;
    let z = days + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}{:02}{:02}T{:02}:{:02}:{:02}.{:03}",
        y, m, d, hours, minutes, seconds, millis
    )
}

/// Write a single log line to stderr.
///
/// Called by the [`dlog!`] macro; not intended for direct use.
pub fn emit(file: &str, line: u32, msg: &str) {
    let ts = format_timestamp();
    if colour_enabled() {
        eprintln!("{DIM}{ts}{RESET} {DIM}{file}:{line}{RESET} {msg}");
    } else {
        eprintln!("{ts} - {file}:{line} - {msg}");
    }
}

/// Emit a log line to stderr with timestamp and source location.
///
/// # Usage
///
/// ```ignore
/// dlog!("submit: stored message {}", logging::msg_id(id));
/// ```
#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {{
        $crate::logging::emit(file!(), line!(), &format!($($arg)*));
    }};
}
