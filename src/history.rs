//! Version history of a document.
//!
//! History is a most-recent-first list of full-content snapshots. The
//! client only ever prepends to it; restoring a version reads from it
//! without changing it.

use crate::types::Version;

/// Current time in milliseconds since the unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Returns a new history with `content` prepended as the latest version.
///
/// Timestamps identify versions, so the new one is moved past the latest
/// existing timestamp when the clock has not advanced.
pub fn snapshot(history: &[Version], content: &str, timestamp: i64) -> Vec<Version> {
    let timestamp = match history.first() {
        Some(latest) => timestamp.max(latest.timestamp + 1),
        None => timestamp,
    };
    let mut next = Vec::with_capacity(history.len() + 1);
    next.push(Version {
        timestamp,
        content: content.to_string(),
    });
    next.extend_from_slice(history);
    next
}

/// Content to install as the live buffer
pub fn restore(version: &Version) -> String {
    version.content.clone()
}

pub fn find(history: &[Version], timestamp: i64) -> Option<&Version> {
    history.iter().find(|v| v.timestamp == timestamp)
}

/// Human facing number of the version at `index`, the oldest one is 1.
/// `None` if `index` is outside a history of `len` versions.
pub fn display_number(len: usize, index: usize) -> Option<usize> {
    if index >= len {
        return None;
    }
    Some(len - index)
}
