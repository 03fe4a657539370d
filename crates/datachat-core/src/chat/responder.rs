use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::analysis::prompts::{csv_prompt, file_upload_prompt};
use crate::analysis::{KeywordPlotDetector, PlotIntent};
use crate::constants::ui;
use crate::error::{ChatError, Result};
use crate::llm::{estimate_messages, ChatBackend, FinalResponse, ResponseEvent, TokenBudget};
use crate::models::{Attachment, ChatMessage, Role};
use crate::session::HistoryManager;

/// Progress of one turn, for the front-end to render.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Status(String),
    Fragment(String),
    /// The turn continues but was not saved.
    PersistenceFailed(String),
    Complete { text: String, plots: Vec<Attachment> },
    Error(String),
}

/// One user submission.
#[derive(Debug, Clone, Default)]
pub struct UserTurn {
    pub text: String,
    pub image: Option<Attachment>,
    /// Output of `CsvDataset::generate_context`, when a dataset is loaded.
    pub data_context: Option<String>,
}

impl UserTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image: Attachment) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_data_context(mut self, context: impl Into<String>) -> Self {
        self.data_context = Some(context.into());
        self
    }

    /// The message as sent to the model. History keeps the bare text.
    fn request_message(&self) -> ChatMessage {
        let text = match (&self.data_context, &self.image) {
            (Some(context), _) => csv_prompt(context, &self.text),
            (None, Some(_)) => file_upload_prompt(&self.text),
            (None, None) => self.text.clone(),
        };
        let message = ChatMessage::user(text);
        match &self.image {
            Some(image) => message.with_image(image.clone()),
            None => message,
        }
    }
}

/// The assistant's answer to a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub plots: Vec<Attachment>,
    pub used_code_execution: bool,
}

/// Runs one user turn against the backend and records it in history.
pub struct ResponseHandler {
    backend: Box<dyn ChatBackend>,
    detector: Box<dyn PlotIntent>,
    budget: TokenBudget,
    code_execution: bool,
}

impl ResponseHandler {
    pub fn new(backend: Box<dyn ChatBackend>) -> Self {
        Self {
            backend,
            detector: Box::new(KeywordPlotDetector::new()),
            budget: TokenBudget::default(),
            code_execution: true,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn PlotIntent>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_code_execution(mut self, enabled: bool) -> Self {
        self.code_execution = enabled;
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub async fn respond(
        &self,
        history: &mut HistoryManager,
        turn: UserTurn,
        event_tx: UnboundedSender<ChatEvent>,
    ) -> Result<Reply> {
        let _ = event_tx.send(ChatEvent::Status(ui::THINKING.to_string()));

        let mut request = history.current_messages().to_vec();
        request.push(turn.request_message());

        if let Err(e) = self.budget.check(estimate_messages(&request)) {
            tracing::warn!("Rejected turn before sending: {e}");
            let _ = event_tx.send(ChatEvent::Error(e.to_string()));
            return Err(e);
        }

        let use_code = self.code_execution && self.detector.requires_plot(&turn.text);

        if let Err(e) = history.add_message(Role::User, turn.text, turn.image, Vec::new()) {
            let _ = event_tx.send(ChatEvent::PersistenceFailed(e.to_string()));
        }

        let outcome = if use_code {
            let _ = event_tx.send(ChatEvent::Status(ui::RUNNING_CODE.to_string()));
            self.backend.generate_with_code_execution(&request).await
        } else {
            let _ = event_tx.send(ChatEvent::Status(ui::GENERATING.to_string()));
            self.stream(&request, &event_tx).await
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error generating response: {e}");
                let _ = event_tx.send(ChatEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        if let Err(e) = history.add_message(
            Role::Assistant,
            response.text.clone(),
            None,
            response.plots.clone(),
        ) {
            let _ = event_tx.send(ChatEvent::PersistenceFailed(e.to_string()));
        }

        let _ = event_tx.send(ChatEvent::Status(ui::COMPLETE.to_string()));
        let _ = event_tx.send(ChatEvent::Complete {
            text: response.text.clone(),
            plots: response.plots.clone(),
        });

        Ok(Reply {
            text: response.text,
            plots: response.plots,
            used_code_execution: use_code,
        })
    }

    async fn stream(
        &self,
        request: &[ChatMessage],
        event_tx: &UnboundedSender<ChatEvent>,
    ) -> Result<FinalResponse> {
        let mut rx = self.backend.stream_reply(request).await?;

        while let Some(event) = rx.next().await {
            match event {
                ResponseEvent::Fragment(text) => {
                    let _ = event_tx.send(ChatEvent::Fragment(text));
                }
                ResponseEvent::Complete(response) => return Ok(response),
                ResponseEvent::Error(e) => return Err(ChatError::Api(e)),
            }
        }

        Err(ChatError::Api(
            "Response stream ended without completing".to_string(),
        ))
    }
}
