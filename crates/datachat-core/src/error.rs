use thiserror::Error;

/// Broad classes of failure surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unusable configuration. Fatal at startup.
    Configuration,
    /// Input rejected before any network call.
    Validation,
    /// Local persistence failure. The in-memory conversation stays usable.
    Io,
    /// The remote API failed or answered with something unusable.
    Remote,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request too large: estimated {estimate} tokens exceeds the limit of {limit}")]
    TooLarge { estimate: u64, limit: u64 },

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Unsupported attachment: {0}")]
    UnsupportedAttachment(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {id} is corrupt: {reason}")]
    CorruptSession { id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gemini API error: {0}")]
    Api(String),

    #[error("CSV error: {0}")]
    Csv(String),
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::TooLarge { .. }
            | Self::InvalidSessionId(_)
            | Self::UnsupportedAttachment(_)
            | Self::Csv(_) => ErrorKind::Validation,
            Self::SessionNotFound(_) | Self::CorruptSession { .. } | Self::Io(_) => ErrorKind::Io,
            Self::Http(_) | Self::Json(_) | Self::Api(_) => ErrorKind::Remote,
        }
    }

    pub fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::CorruptSession {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<csv::Error> for ChatError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
