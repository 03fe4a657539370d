use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, SessionDocument, SessionHeader, SessionId, SessionSummary};

const SESSION_EXT: &str = "json";

/// Storage seam for chat sessions.
///
/// Every call names its session explicitly; implementations keep no notion of
/// a "current" session.
pub trait SessionRepository: Send {
    /// Write the full message list for `id`, replacing any previous version.
    fn save(&self, id: &SessionId, messages: &[ChatMessage]) -> Result<()>;

    /// Read back the messages for `id` in their original order.
    fn load(&self, id: &SessionId) -> Result<Vec<ChatMessage>>;

    /// All persisted sessions, most recently modified first.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>>;

    /// Remove `id`. Removing a session that does not exist is not an error.
    fn delete(&self, id: &SessionId) -> Result<()>;

    /// Remove every session last modified more than `age` ago, except `active`.
    /// Returns how many were removed.
    fn prune_older_than(&self, age: Duration, active: Option<&SessionId>) -> Result<usize>;
}

/// One pretty-printed JSON document per session under a single directory.
pub struct JsonSessionStore {
    base_dir: PathBuf,
}

impl JsonSessionStore {
    /// Open (and create if needed) a store rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| {
            ChatError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create sessions directory {}: {e}",
                    base_dir.display()
                ),
            ))
        })?;
        tracing::info!("Session store ready at {}", base_dir.display());
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file backing `id`.
    pub fn session_path(&self, id: &SessionId) -> PathBuf {
        self.base_dir.join(format!("{}.{SESSION_EXT}", id.as_str()))
    }

    /// Sweep against an explicit clock.
    pub fn prune_at(
        &self,
        age: Duration,
        now: SystemTime,
        active: Option<&SessionId>,
    ) -> Result<usize> {
        let Some(cutoff) = now.checked_sub(age) else {
            return Ok(0);
        };

        let mut removed = 0;
        for (id, path, modified) in self.session_files()? {
            if active == Some(&id) || modified >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove expired session {id}: {e}"),
            }
        }

        if removed > 0 {
            tracing::info!(
                "Cleaned up {removed} session(s) older than {} day(s)",
                age.as_secs() / 86_400
            );
        }
        Ok(removed)
    }

    /// Every `<id>.json` in the directory with its modification time.
    fn session_files(&self) -> Result<Vec<(SessionId, PathBuf, SystemTime)>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            // Ids are trimmed on parse, so a padded name would not map back to this file.
            if stem.trim() != stem {
                tracing::debug!("Skipping padded session file name {}", path.display());
                continue;
            }
            let Ok(id) = SessionId::parse(stem) else {
                tracing::debug!("Skipping oddly named session file {}", path.display());
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("Could not stat {}: {e}", path.display());
                    continue;
                }
            };
            let modified = metadata.modified()?;
            files.push((id, path, modified));
        }
        Ok(files)
    }

    fn read_message_count(path: &Path) -> Option<usize> {
        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str::<SessionHeader>(&contents)
            .ok()
            .map(|h| h.message_count)
    }
}

/// Encoding a session is a local failure, never a remote one.
fn encode_failure(id: &SessionId, err: serde_json::Error) -> ChatError {
    ChatError::Io(std::io::Error::new(
        IoErrorKind::InvalidData,
        format!("Failed to serialize session {id}: {err}"),
    ))
}

impl SessionRepository for JsonSessionStore {
    fn save(&self, id: &SessionId, messages: &[ChatMessage]) -> Result<()> {
        let path = self.session_path(id);
        let document = SessionDocument::new(id.clone(), messages.to_vec());
        let contents =
            serde_json::to_string_pretty(&document).map_err(|e| encode_failure(id, e))?;

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)?;
        fs::rename(&tmp_path, &path)?;

        tracing::info!("Session saved: {id} ({} messages)", messages.len());
        Ok(())
    }

    fn load(&self, id: &SessionId) -> Result<Vec<ChatMessage>> {
        let path = self.session_path(id);
        let contents = match fs::read(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::warn!("Session file not found: {id}");
                return Err(ChatError::SessionNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let document: SessionDocument = serde_json::from_slice(&contents).map_err(|e| {
            tracing::error!("Session {id} could not be parsed: {e}");
            ChatError::corrupt(id.as_str(), e)
        })?;

        if document.session_id != *id {
            tracing::debug!(
                "Session file {id} carries id {}; trusting the file name",
                document.session_id
            );
        }

        tracing::info!("Session loaded: {id} ({} messages)", document.messages.len());
        Ok(document.messages)
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut sessions: Vec<SessionSummary> = self
            .session_files()?
            .into_iter()
            .map(|(id, path, modified)| SessionSummary {
                message_count: Self::read_message_count(&path),
                id,
                last_modified: DateTime::<Utc>::from(modified),
            })
            .collect();

        sessions.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(sessions)
    }

    fn delete(&self, id: &SessionId) -> Result<()> {
        match fs::remove_file(self.session_path(id)) {
            Ok(()) => {
                tracing::info!("Session deleted: {id}");
                Ok(())
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                tracing::debug!("Session {id} already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn prune_older_than(&self, age: Duration, active: Option<&SessionId>) -> Result<usize> {
        self.prune_at(age, SystemTime::now(), active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonSessionStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonSessionStore::new(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_new_creates_directory() {
        let (_dir, store) = store();
        assert!(store.base_dir().is_dir());
    }

    #[test]
    fn test_session_path_uses_id() {
        let (_dir, store) = store();
        let id = SessionId::parse("20250101_120000_000001").unwrap();
        assert!(store
            .session_path(&id)
            .ends_with("20250101_120000_000001.json"));
    }

    #[test]
    fn test_encode_failure_is_local() {
        let json_err = serde_json::from_str::<u8>("x").unwrap_err();
        let err = encode_failure(&SessionId::parse("s1").unwrap(), json_err);
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn test_save_leaves_no_tmp_file() {
        let (_dir, store) = store();
        let id = SessionId::parse("s1").unwrap();
        store.save(&id, &[ChatMessage::user("hi")]).unwrap();

        let names: Vec<String> = fs::read_dir(store.base_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["s1.json".to_string()]);
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let (_dir, store) = store();
        fs::write(store.base_dir().join("notes.txt"), "x").unwrap();
        fs::write(store.base_dir().join("half.json.tmp"), "x").unwrap();
        store.save(&SessionId::parse("s1").unwrap(), &[]).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id.as_str(), "s1");
        assert_eq!(sessions[0].message_count, Some(0));
    }

    #[test]
    fn test_list_reports_unreadable_count_as_none() {
        let (_dir, store) = store();
        fs::write(store.base_dir().join("broken.json"), "{ nope").unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].message_count, None);
    }

    #[test]
    fn test_prune_with_huge_age_removes_nothing() {
        let (_dir, store) = store();
        store.save(&SessionId::parse("s1").unwrap(), &[]).unwrap();
        let removed = store
            .prune_at(Duration::MAX, SystemTime::now(), None)
            .unwrap();
        assert_eq!(removed, 0);
    }
}
