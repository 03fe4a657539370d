mod traits;
mod gemini;
pub mod tokens;
pub mod wire;

pub use traits::*;
pub use gemini::{to_contents, GeminiClient, SseParser};
pub use tokens::{estimate_messages, estimate_tokens, TokenBudget};
