//! Bounded per-session conversation memory.
//!
//! A fixed-capacity sliding window over `{role, content}` entries, evicting
//! oldest-first. Mutation happens only through [`MemoryStore::append`] so the
//! append + trim pair is applied under one lock and overlapping requests for
//! the same session can never observe a half-trimmed window.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Maximum entries retained per session (last 5 user + 5 assistant turns).
pub const MEMORY_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    User,
    Assistant,
}

impl fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRole::User => write!(f, "user"),
            MemoryRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: MemoryRole,
    pub content: String,
}

/// Conversation memory for all sessions. Entries never cross sessions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, VecDeque<MemoryEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, evicting from the oldest end past [`MEMORY_CAP`].
    pub fn append(&self, session_id: &str, role: MemoryRole, content: &str) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let window = inner.entry(session_id.to_string()).or_default();
        window.push_back(MemoryEntry {
            role,
            content: content.to_string(),
        });
        while window.len() > MEMORY_CAP {
            window.pop_front();
        }
    }

    /// Current window, oldest first. Empty for unknown sessions.
    pub fn snapshot(&self, session_id: &str) -> Vec<MemoryEntry> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .get(session_id)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner.remove(session_id);
    }

    pub fn len(&self, session_id: &str) -> usize {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.get(session_id).map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, session_id: &str) -> bool {
        self.len(session_id) == 0
    }
}

/// Render a memory snapshot as prompt context, excluding a trailing user
/// entry (the question currently being answered). Returns None when nothing
/// remains to show.
pub fn context_excluding_pending_user(entries: &[MemoryEntry]) -> Option<String> {
    let visible = match entries.last() {
        Some(last) if last.role == MemoryRole::User => &entries[..entries.len() - 1],
        _ => entries,
    };
    if visible.is_empty() {
        return None;
    }
    Some(
        visible
            .iter()
            .map(|e| format!("{}: {}", e.role, e.content))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
