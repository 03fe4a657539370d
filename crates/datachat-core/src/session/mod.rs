mod history;
pub mod persistence;

pub use history::{HistoryManager, RestoreOutcome};
pub use persistence::{JsonSessionStore, SessionRepository};
