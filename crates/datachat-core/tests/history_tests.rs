use std::fs::{self, File};
use std::time::{Duration, SystemTime};

use datachat_core::session::{JsonSessionStore, SessionRepository};
use datachat_core::*;
use tempfile::TempDir;

fn history_in(dir: &TempDir) -> HistoryManager {
    let store = JsonSessionStore::new(dir.path()).unwrap();
    HistoryManager::new(Box::new(store))
}

fn age_file(dir: &TempDir, id: &str, age: Duration) {
    let file = File::options()
        .write(true)
        .open(dir.path().join(format!("{id}.json")))
        .unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

/// Repository whose writes always fail.
struct ReadOnlyRepository;

impl SessionRepository for ReadOnlyRepository {
    fn save(&self, _id: &SessionId, _messages: &[ChatMessage]) -> Result<()> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
    }

    fn load(&self, id: &SessionId) -> Result<Vec<ChatMessage>> {
        Err(ChatError::SessionNotFound(id.to_string()))
    }

    fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        Ok(Vec::new())
    }

    fn delete(&self, _id: &SessionId) -> Result<()> {
        Ok(())
    }

    fn prune_older_than(&self, _age: Duration, _active: Option<&SessionId>) -> Result<usize> {
        Ok(0)
    }
}

// ========================================================================
// Startup restore
// ========================================================================

#[test]
fn test_initialize_with_no_sessions_is_fresh() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);

    assert_eq!(history.initialize(), RestoreOutcome::Fresh);
    assert_eq!(history.message_count(), 0);
}

#[test]
fn test_initialize_restores_newest_session() {
    let dir = TempDir::new().unwrap();
    let store = JsonSessionStore::new(dir.path()).unwrap();
    let older = SessionId::parse("older").unwrap();
    let newer = SessionId::parse("newer").unwrap();
    store.save(&older, &[ChatMessage::user("old")]).unwrap();
    store
        .save(
            &newer,
            &[ChatMessage::user("q"), ChatMessage::assistant("a")],
        )
        .unwrap();
    age_file(&dir, "older", Duration::from_secs(3600));

    let mut history = HistoryManager::new(Box::new(store));
    let outcome = history.initialize();

    assert_eq!(
        outcome,
        RestoreOutcome::Restored {
            id: newer.clone(),
            message_count: 2
        }
    );
    assert_eq!(history.session_id(), &newer);
    assert_eq!(history.current_messages()[1].content, "a");
}

#[test]
fn test_initialize_skips_corrupt_newest_session() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("garbled.json"), "not json at all").unwrap();

    let mut history = history_in(&dir);
    let outcome = history.initialize();

    assert!(matches!(outcome, RestoreOutcome::Skipped { ref id, .. } if id.as_str() == "garbled"));
    assert_eq!(history.message_count(), 0);
    assert_ne!(history.session_id().as_str(), "garbled");
    assert!(dir.path().join("garbled.json").exists());
}

// ========================================================================
// Write-through
// ========================================================================

#[test]
fn test_add_message_writes_through() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    history
        .add_message(Role::User, "hello", None, Vec::new())
        .unwrap();
    history
        .add_message(
            Role::Assistant,
            "here is your plot",
            None,
            vec![Attachment::png(vec![1, 2, 3])],
        )
        .unwrap();

    let store = JsonSessionStore::new(dir.path()).unwrap();
    let saved = store.load(history.session_id()).unwrap();
    assert_eq!(saved, history.current_messages());
    assert_eq!(saved[1].plots.len(), 1);
}

#[test]
fn test_timestamps_are_non_decreasing() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    for i in 0..4 {
        history
            .add_message(Role::User, format!("m{i}"), None, Vec::new())
            .unwrap();
    }
    let messages = history.current_messages();
    assert!(messages.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn test_clear_keeps_session_id() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    history
        .add_message(Role::User, "hello", None, Vec::new())
        .unwrap();
    let id = history.session_id().clone();

    history.clear().unwrap();

    assert_eq!(history.session_id(), &id);
    assert_eq!(history.message_count(), 0);
    let store = JsonSessionStore::new(dir.path()).unwrap();
    assert!(store.load(&id).unwrap().is_empty());
}

#[test]
fn test_failed_save_keeps_message_in_memory() {
    let mut history = HistoryManager::new(Box::new(ReadOnlyRepository));

    let err = history
        .add_message(Role::User, "unsaved", None, Vec::new())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(history.message_count(), 1);
    assert_eq!(history.current_messages()[0].content, "unsaved");
}

// ========================================================================
// Session switching
// ========================================================================

#[test]
fn test_switch_and_delete_sessions() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    history
        .add_message(Role::User, "first session", None, Vec::new())
        .unwrap();
    let first = history.session_id().clone();

    std::thread::sleep(Duration::from_millis(2));
    history.start_new_session();
    history
        .add_message(Role::User, "second session", None, Vec::new())
        .unwrap();
    let second = history.session_id().clone();
    assert_eq!(history.list_sessions().unwrap().len(), 2);

    assert_eq!(history.switch_to(&first).unwrap(), 1);
    assert_eq!(history.current_messages()[0].content, "first session");

    history.delete_session(&first).unwrap();
    assert_ne!(history.session_id(), &first);
    assert_eq!(history.message_count(), 0);

    let remaining = history.list_sessions().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second);
}

#[test]
fn test_switch_to_missing_session_keeps_current() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    history
        .add_message(Role::User, "stay", None, Vec::new())
        .unwrap();
    let id = history.session_id().clone();

    let err = history
        .switch_to(&SessionId::parse("ghost").unwrap())
        .unwrap_err();

    assert!(matches!(err, ChatError::SessionNotFound(_)));
    assert_eq!(history.session_id(), &id);
    assert_eq!(history.message_count(), 1);
}

#[test]
fn test_prune_expired_spares_active_session() {
    let dir = TempDir::new().unwrap();
    let mut history = history_in(&dir);
    history
        .add_message(Role::User, "active", None, Vec::new())
        .unwrap();
    let active = history.session_id().as_str().to_string();
    age_file(&dir, &active, Duration::from_secs(30 * 86_400));

    let store = JsonSessionStore::new(dir.path()).unwrap();
    store
        .save(&SessionId::parse("stale").unwrap(), &[])
        .unwrap();
    age_file(&dir, "stale", Duration::from_secs(30 * 86_400));

    let removed = history
        .prune_expired(Duration::from_secs(7 * 86_400))
        .unwrap();

    assert_eq!(removed, 1);
    assert!(dir.path().join(format!("{active}.json")).exists());
    assert!(!dir.path().join("stale.json").exists());
}
