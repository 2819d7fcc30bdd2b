//! Heuristic spam triage for public form submissions.
//!
//! The verdict is computed once at submission time and stored with the
//! message; it is never re-evaluated. False positives are acceptable because
//! an admin can reclassify with the "ham" action.

/// Submissions filled in faster than this are flagged as scripted.
pub const MIN_FILL_DURATION_MS: u64 = 2000;

/// Outcome of the submission-time heuristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpamVerdict {
    pub is_spam: bool,
    pub reason: Option<String>,
}

impl SpamVerdict {
    fn clean() -> Self {
        Self {
            is_spam: false,
            reason: None,
        }
    }

    fn spam(reason: String) -> Self {
        Self {
            is_spam: true,
            reason: Some(reason),
        }
    }
}

/// Classify a submission. Rules apply in order, first match wins:
///
/// 1. a non-empty honeypot field (invisible to humans) marks a bot;
/// 2. a fill duration under [`MIN_FILL_DURATION_MS`] marks a scripted
///    instant submission, with the observed duration in the reason.
pub fn classify(honeypot: &str, duration_ms: u64) -> SpamVerdict {
    if !honeypot.trim().is_empty() {
        return SpamVerdict::spam("honeypot field filled".to_string());
    }
    if duration_ms < MIN_FILL_DURATION_MS {
        return SpamVerdict::spam(format!("filled in too fast ({duration_ms} ms)"));
    }
    SpamVerdict::clean()
}

/// Default top-level-domain deny list for sender addresses.
pub fn default_blocked_tlds() -> Vec<String> {
    vec![".ru".to_string(), ".cn".to_string(), ".xyz".to_string()]
}

/// Returns the matching deny-list entry when the sender address ends in a
/// blocked top-level domain. Unlike the spam verdict this is a hard
/// validation failure: the submission is rejected before persistence.
pub fn blocked_tld<'a>(email: &str, deny_list: &'a [String]) -> Option<&'a str> {
    let email = email.to_lowercase();
    deny_list
        .iter()
        .find(|tld| email.ends_with(tld.as_str()))
        .map(|tld| tld.as_str())
}
