//! Session-boundary bookkeeping: id validation and the per-session
//! document-name registry the intent classifier reads.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::EngineError;

/// Session ids become path components of the persisted connection record
/// and vector-collection names, so the character set is restricted.
pub fn validate_session_id(session_id: &str) -> Result<(), EngineError> {
    if session_id.is_empty() {
        return Err(EngineError::validation("session_id must not be empty"));
    }
    if session_id.len() > 128 {
        return Err(EngineError::validation("session_id too long (max 128 chars)"));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EngineError::validation(
            "session_id may only contain ASCII letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

/// Names of documents uploaded into each session. The upload pipeline
/// itself is an external collaborator; the engine only needs the names as
/// classifier metadata.
#[derive(Default)]
pub struct DocumentRegistry {
    inner: Mutex<HashMap<String, Vec<String>>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document name; duplicates are ignored.
    pub fn register(&self, session_id: &str, file_name: &str) {
        let mut inner = self.inner.lock().expect("document registry poisoned");
        let docs = inner.entry(session_id.to_string()).or_default();
        if !docs.iter().any(|d| d == file_name) {
            docs.push(file_name.to_string());
        }
    }

    /// Document names in registration order. Empty for unknown sessions.
    pub fn list(&self, session_id: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("document registry poisoned");
        inner.get(session_id).cloned().unwrap_or_default()
    }

    pub fn clear(&self, session_id: &str) {
        let mut inner = self.inner.lock().expect("document registry poisoned");
        inner.remove(session_id);
    }
}
