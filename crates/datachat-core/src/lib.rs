pub mod analysis;
pub mod chat;
pub mod config;
pub mod constants;
pub mod error;
pub mod llm;
pub mod models;
pub mod session;

// Re-export key types
pub use analysis::{requires_plot, CsvDataset, KeywordPlotDetector, PlotIntent};
pub use chat::{ChatEvent, Reply, ResponseHandler, UserTurn};
pub use config::Settings;
pub use error::{ChatError, ErrorKind, Result};
pub use llm::{ChatBackend, FinalResponse, GeminiClient, ResponseEvent, TokenBudget};
pub use models::{Attachment, ChatMessage, Role, Session, SessionId, SessionSummary};
pub use session::{HistoryManager, JsonSessionStore, RestoreOutcome, SessionRepository};
