use std::time::Duration;

use crate::error::{ChatError, Result};
use crate::models::{Attachment, ChatMessage, Role, Session, SessionId, SessionSummary};

use super::persistence::SessionRepository;

/// What `HistoryManager::initialize` found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// The newest session was loaded and is now active.
    Restored { id: SessionId, message_count: usize },
    /// Nothing to restore; a fresh session is active.
    Fresh,
    /// The newest session could not be read. It is left on disk untouched and a
    /// fresh session is active.
    Skipped { id: SessionId, reason: String },
    /// The store could not be listed at all. A fresh session is active.
    Unavailable { reason: String },
}

/// Ordered message list of the active session, written through to storage on
/// every mutation.
pub struct HistoryManager {
    store: Box<dyn SessionRepository>,
    session: Session,
}

impl HistoryManager {
    /// Start with a fresh, not yet persisted session.
    pub fn new(store: Box<dyn SessionRepository>) -> Self {
        Self {
            store,
            session: Session::new(),
        }
    }

    /// Make the most recently modified persisted session active, if any.
    pub fn initialize(&mut self) -> RestoreOutcome {
        let newest = match self.store.list_sessions() {
            Ok(sessions) => sessions.into_iter().next(),
            Err(e) => {
                tracing::warn!("Could not list saved sessions: {e}");
                return RestoreOutcome::Unavailable {
                    reason: e.to_string(),
                };
            }
        };

        let Some(summary) = newest else {
            tracing::info!("No saved sessions; starting {}", self.session.id);
            return RestoreOutcome::Fresh;
        };

        match self.store.load(&summary.id) {
            Ok(messages) => {
                let message_count = messages.len();
                self.session = Session {
                    id: summary.id.clone(),
                    messages,
                };
                RestoreOutcome::Restored {
                    id: summary.id,
                    message_count,
                }
            }
            Err(ChatError::SessionNotFound(_)) => RestoreOutcome::Fresh,
            Err(e) => {
                tracing::warn!("Skipping unreadable session {}: {e}", summary.id);
                RestoreOutcome::Skipped {
                    id: summary.id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Append a message stamped with the current time and persist the session.
    ///
    /// The append is kept even when the save fails; the save error is returned.
    pub fn add_message(
        &mut self,
        role: Role,
        content: impl Into<String>,
        image: Option<Attachment>,
        plots: Vec<Attachment>,
    ) -> Result<()> {
        let mut message = ChatMessage::new(role, content).with_plots(plots);
        message.image = image;
        self.push(message)
    }

    /// Append a prepared message and persist the session.
    pub fn push(&mut self, message: ChatMessage) -> Result<()> {
        self.session.messages.push(message);
        self.persist()
    }

    /// Empty the active session, keeping its id.
    pub fn clear(&mut self) -> Result<()> {
        self.session.messages.clear();
        self.persist()
    }

    pub fn current_messages(&self) -> &[ChatMessage] {
        &self.session.messages
    }

    pub fn message_count(&self) -> usize {
        self.session.messages.len()
    }

    pub fn last_n_messages(&self, n: usize) -> &[ChatMessage] {
        let messages = &self.session.messages;
        &messages[messages.len().saturating_sub(n)..]
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    /// Switch to a brand new, empty session. The old one stays on disk.
    pub fn start_new_session(&mut self) -> &SessionId {
        self.session = Session::new();
        tracing::info!("Started session {}", self.session.id);
        &self.session.id
    }

    /// Make a persisted session active. The current session is left as saved.
    pub fn switch_to(&mut self, id: &SessionId) -> Result<usize> {
        let messages = self.store.load(id)?;
        let count = messages.len();
        self.session = Session {
            id: id.clone(),
            messages,
        };
        Ok(count)
    }

    /// Delete a persisted session. Deleting the active one starts a new session.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<()> {
        self.store.delete(id)?;
        if *id == self.session.id {
            self.start_new_session();
        }
        Ok(())
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list_sessions()
    }

    /// Age-based sweep that never touches the active session.
    pub fn prune_expired(&self, age: Duration) -> Result<usize> {
        self.store.prune_older_than(age, Some(&self.session.id))
    }

    fn persist(&self) -> Result<()> {
        self.store
            .save(&self.session.id, &self.session.messages)
            .inspect_err(|e| {
                tracing::error!("Error saving session {}: {e}", self.session.id);
            })
    }
}
