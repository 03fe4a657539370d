use std::sync::{Arc, Mutex};
use std::time::Duration;

use datachat_core::llm::ResponseEvent;
use datachat_core::*;
use futures::channel::mpsc;
use tempfile::TempDir;
use tokio::sync::mpsc::unbounded_channel;

/// What the scripted backend saw.
#[derive(Default)]
struct Calls {
    streamed: Vec<Vec<ChatMessage>>,
    code_execution: Vec<Vec<ChatMessage>>,
}

/// Backend that replays canned answers and records every request.
struct ScriptedBackend {
    fragments: Vec<String>,
    plots: Vec<Attachment>,
    fail_with: Option<String>,
    calls: Arc<Mutex<Calls>>,
}

impl ScriptedBackend {
    fn answering(fragments: &[&str]) -> (Self, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let backend = Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            plots: Vec::new(),
            fail_with: None,
            calls: calls.clone(),
        };
        (backend, calls)
    }

    fn with_plots(mut self, plots: Vec<Attachment>) -> Self {
        self.plots = plots;
        self
    }

    fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::UnboundedReceiver<ResponseEvent>> {
        self.calls.lock().unwrap().streamed.push(messages.to_vec());
        let (tx, rx) = mpsc::unbounded();
        for fragment in &self.fragments {
            tx.unbounded_send(ResponseEvent::Fragment(fragment.clone()))
                .unwrap();
        }
        match &self.fail_with {
            Some(message) => tx
                .unbounded_send(ResponseEvent::Error(message.clone()))
                .unwrap(),
            None => tx
                .unbounded_send(ResponseEvent::Complete(FinalResponse {
                    text: self.fragments.concat(),
                    plots: Vec::new(),
                    executed_code: false,
                }))
                .unwrap(),
        }
        Ok(rx)
    }

    async fn generate_with_code_execution(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FinalResponse> {
        self.calls
            .lock()
            .unwrap()
            .code_execution
            .push(messages.to_vec());
        if let Some(message) = &self.fail_with {
            return Err(ChatError::Api(message.clone()));
        }
        Ok(FinalResponse {
            text: self.fragments.concat(),
            plots: self.plots.clone(),
            executed_code: true,
        })
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Repository whose every save fails.
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

fn history(dir: &TempDir) -> HistoryManager {
    HistoryManager::new(Box::new(JsonSessionStore::new(dir.path()).unwrap()))
}

async fn run(
    handler: &ResponseHandler,
    history: &mut HistoryManager,
    turn: UserTurn,
) -> (Result<Reply>, Vec<ChatEvent>) {
    let (tx, mut rx) = unbounded_channel();
    let result = handler.respond(history, turn, tx).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, events)
}

// ========================================================================
// Streaming turns
// ========================================================================

#[tokio::test]
async fn test_streamed_turn_records_both_messages() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["Par", "is"]);
    let handler = ResponseHandler::new(Box::new(backend));

    let (result, events) = run(
        &handler,
        &mut history,
        UserTurn::new("what is the capital of France"),
    )
    .await;

    let reply = result.unwrap();
    assert_eq!(reply.text, "Paris");
    assert!(!reply.used_code_execution);

    let fragments: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::Fragment(f) => Some(f.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments, vec!["Par", "is"]);
    assert!(matches!(events.last(), Some(ChatEvent::Complete { text, .. }) if text == "Paris"));

    let messages = history.current_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "Paris");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.streamed.len(), 1);
    assert!(calls.code_execution.is_empty());
}

#[tokio::test]
async fn test_request_includes_prior_history() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["ok"]);
    let handler = ResponseHandler::new(Box::new(backend));

    run(&handler, &mut history, UserTurn::new("first")).await.0.unwrap();
    run(&handler, &mut history, UserTurn::new("second")).await.0.unwrap();

    let calls = calls.lock().unwrap();
    let last: Vec<&str> = calls.streamed[1].iter().map(|m| m.content.as_str()).collect();
    assert_eq!(last, vec!["first", "ok", "second"]);
}

// ========================================================================
// Plot turns
// ========================================================================

#[tokio::test]
async fn test_plot_request_uses_code_execution() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let plots = vec![Attachment::png(vec![1]), Attachment::png(vec![2])];
    let (backend, calls) = ScriptedBackend::answering(&["Chart ready."]);
    let handler = ResponseHandler::new(Box::new(backend.with_plots(plots.clone())));

    let (result, events) = run(
        &handler,
        &mut history,
        UserTurn::new("show me a bar chart of sales"),
    )
    .await;

    let reply = result.unwrap();
    assert!(reply.used_code_execution);
    assert_eq!(reply.plots, plots);
    assert!(events.contains(&ChatEvent::Complete {
        text: "Chart ready.".into(),
        plots: plots.clone(),
    }));
    assert_eq!(history.current_messages()[1].plots, plots);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.code_execution.len(), 1);
    assert!(calls.streamed.is_empty());
}

#[tokio::test]
async fn test_plot_request_streams_when_code_execution_disabled() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["No chart."]);
    let handler = ResponseHandler::new(Box::new(backend)).with_code_execution(false);

    let reply = run(&handler, &mut history, UserTurn::new("plot it"))
        .await
        .0
        .unwrap();

    assert!(!reply.used_code_execution);
    assert_eq!(calls.lock().unwrap().streamed.len(), 1);
}

// ========================================================================
// Failures
// ========================================================================

#[tokio::test]
async fn test_oversized_turn_is_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["never"]);
    let handler = ResponseHandler::new(Box::new(backend)).with_budget(TokenBudget::new(10));

    // 44 chars is 11 estimated tokens
    let (result, events) = run(
        &handler,
        &mut history,
        UserTurn::new("x".repeat(44)),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ChatError::TooLarge { estimate: 11, limit: 10 }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(events.last(), Some(ChatEvent::Error(_))));
    assert_eq!(history.message_count(), 0);

    let calls = calls.lock().unwrap();
    assert!(calls.streamed.is_empty());
    assert!(calls.code_execution.is_empty());
}

#[tokio::test]
async fn test_turn_at_exact_limit_is_sent() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, _calls) = ScriptedBackend::answering(&["fine"]);
    let handler = ResponseHandler::new(Box::new(backend)).with_budget(TokenBudget::new(10));

    let (result, _) = run(&handler, &mut history, UserTurn::new("y".repeat(40))).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_remote_error_keeps_user_turn_only() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, _calls) = ScriptedBackend::answering(&["half an ans"]);
    let handler = ResponseHandler::new(Box::new(backend.failing("quota exceeded")));

    let (result, events) = run(&handler, &mut history, UserTurn::new("hello")).await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(matches!(events.last(), Some(ChatEvent::Error(e)) if e.contains("quota exceeded")));
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Complete { .. })));

    assert_eq!(history.message_count(), 1);
    assert_eq!(history.current_messages()[0].role, Role::User);
}

#[tokio::test]
async fn test_unsaved_turn_still_completes() {
    let mut history = HistoryManager::new(Box::new(ReadOnlyRepository));
    let (backend, calls) = ScriptedBackend::answering(&["still ", "here"]);
    let handler = ResponseHandler::new(Box::new(backend));

    let (result, events) = run(&handler, &mut history, UserTurn::new("hello")).await;

    assert_eq!(result.unwrap().text, "still here");
    assert_eq!(calls.lock().unwrap().streamed.len(), 1);

    let persistence_failures = events
        .iter()
        .filter(|e| matches!(e, ChatEvent::PersistenceFailed(_)))
        .count();
    assert_eq!(persistence_failures, 2);
    assert!(events.iter().any(|e| matches!(
        e,
        ChatEvent::Complete { text, .. } if text == "still here"
    )));
    assert!(!events.iter().any(|e| matches!(e, ChatEvent::Error(_))));

    let messages = history.current_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "still here");
}

// ========================================================================
// Attachments and data context
// ========================================================================

#[tokio::test]
async fn test_data_context_is_sent_but_not_stored() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["42"]);
    let handler = ResponseHandler::new(Box::new(backend));

    let dataset = CsvDataset::from_reader("d.csv", "a,b\n1,2\n".as_bytes()).unwrap();
    let turn = UserTurn::new("sum of a?").with_data_context(dataset.generate_context(100));
    run(&handler, &mut history, turn).await.0.unwrap();

    assert_eq!(history.current_messages()[0].content, "sum of a?");
    let calls = calls.lock().unwrap();
    let sent = &calls.streamed[0][0].content;
    assert!(sent.starts_with("You are a helpful data analyst"));
    assert!(sent.ends_with("User's question: sum of a?"));
}

#[tokio::test]
async fn test_image_travels_with_user_message() {
    let dir = TempDir::new().unwrap();
    let mut history = history(&dir);
    let (backend, calls) = ScriptedBackend::answering(&["a dog"]);
    let handler = ResponseHandler::new(Box::new(backend));
    let image = Attachment::new("image/jpeg", vec![0xFF, 0xD8]);

    run(
        &handler,
        &mut history,
        UserTurn::new("what animal?").with_image(image.clone()),
    )
    .await
    .0
    .unwrap();

    assert_eq!(history.current_messages()[0].image.as_ref(), Some(&image));
    assert_eq!(calls.lock().unwrap().streamed[0][0].image.as_ref(), Some(&image));
}
