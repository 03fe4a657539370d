use crate::constants::limits::{CHARS_PER_TOKEN, IMAGE_TOKEN_COST, MAX_REQUEST_TOKENS};
use crate::error::ChatError;
use crate::models::ChatMessage;

/// Ceiling a request must fit under before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    limit: u64,
}

impl TokenBudget {
    pub const fn new(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// The limit itself is allowed.
    pub fn check(&self, estimate: u64) -> Result<(), ChatError> {
        if estimate > self.limit {
            return Err(ChatError::TooLarge {
                estimate,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(MAX_REQUEST_TOKENS)
    }
}

pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Estimate for a request built from `messages`. Plots are never resent, so
/// only uploaded images count.
pub fn estimate_messages(messages: &[ChatMessage]) -> u64 {
    messages
        .iter()
        .map(|m| {
            let image = if m.image.is_some() { IMAGE_TOKEN_COST } else { 0 };
            estimate_tokens(&m.content) + image
        })
        .sum()
}
