use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ChatMessage;
use crate::error::ChatError;

/// Identifier of one persisted conversation. Doubles as its file stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Mint an id from the local clock, e.g. `20250131_140509_123456`.
    pub fn generate() -> Self {
        Self(Local::now().format("%Y%m%d_%H%M%S_%6f").to_string())
    }

    /// Validate an id coming from user input or a file name.
    pub fn parse(raw: &str) -> Result<Self, ChatError> {
        let id = raw.trim();
        let invalid = id.is_empty()
            || id == "."
            || id.contains("..")
            || id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
        if invalid {
            return Err(ChatError::InvalidSessionId(raw.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Explicit handle for the active conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<ChatMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::generate())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            messages: Vec::new(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for a persisted session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub last_modified: DateTime<Utc>,
    /// `None` when the document could not be read.
    pub message_count: Option<usize>,
}

/// On-disk JSON document for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    pub session_id: SessionId,
    pub saved_at: DateTime<Utc>,
    pub message_count: usize,
    pub messages: Vec<ChatMessage>,
}

impl SessionDocument {
    pub fn new(session_id: SessionId, messages: Vec<ChatMessage>) -> Self {
        Self {
            session_id,
            saved_at: Utc::now(),
            message_count: messages.len(),
            messages,
        }
    }
}

/// Header-only view used when listing, so attachments are not decoded.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionHeader {
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = SessionId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
        assert!(SessionId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_path_escapes() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("   ").is_err());
        assert!(SessionId::parse("../etc/passwd").is_err());
        assert!(SessionId::parse("a/b").is_err());
        assert!(SessionId::parse("a\\b").is_err());
        assert!(SessionId::parse("..").is_err());
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = SessionId::parse("  20250101_000000_000001 ").unwrap();
        assert_eq!(id.as_str(), "20250101_000000_000001");
    }

    #[test]
    fn test_empty_document_serializes() {
        let doc = SessionDocument::new(SessionId::parse("s1").unwrap(), Vec::new());
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["message_count"], 0);
        assert_eq!(json["messages"], serde_json::json!([]));
    }
}
