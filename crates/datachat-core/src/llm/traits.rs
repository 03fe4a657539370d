use futures::channel::mpsc;

use crate::error::ChatError;
use crate::models::{Attachment, ChatMessage};

use super::tokens::estimate_messages;

/// The finished answer to one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinalResponse {
    pub text: String,
    pub plots: Vec<Attachment>,
    /// True when the model ran code to produce the answer.
    pub executed_code: bool,
}

/// What a response stream yields: text fragments in order, then exactly one
/// `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Fragment(String),
    Complete(FinalResponse),
    Error(String),
}

/// Facade over the generative API. Implementations map the message history
/// to the remote request shape and back.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed reply. Dropping the receiver stops consumption; no
    /// cancel is sent upstream.
    async fn stream_reply(
        &self,
        messages: &[ChatMessage],
    ) -> Result<mpsc::UnboundedReceiver<ResponseEvent>, ChatError>;

    /// One blocking request with code execution enabled, for plot requests.
    async fn generate_with_code_execution(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FinalResponse, ChatError>;

    /// Token count for `messages`. Defaults to the local estimate.
    async fn count_tokens(&self, messages: &[ChatMessage]) -> Result<u64, ChatError> {
        Ok(estimate_messages(messages))
    }

    fn model_name(&self) -> &str;
}
