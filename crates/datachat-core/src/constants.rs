//! Centralized constants.
//! Model names, endpoints, limits and user-facing strings live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Vision + text model, used for every chat turn.
    pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
    pub const GEMINI_API_VERSION: &str = "v1beta";
    pub const API_KEY_HEADER: &str = "x-goog-api-key";
}

// ─── Environment ──────────────────────────────────────────────────────────────

pub mod env {
    pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
}

// ─── Limits ───────────────────────────────────────────────────────────────────

pub mod limits {
    /// Context window ceiling of the Gemini 2.5 models, inclusive.
    pub const MAX_REQUEST_TOKENS: u64 = 1_000_000;
    /// Rough chars-per-token ratio for local estimates.
    pub const CHARS_PER_TOKEN: u64 = 4;
    /// Flat token cost Gemini charges for one inline image.
    pub const IMAGE_TOKEN_COST: u64 = 258;
    pub const MAX_SESSION_AGE_DAYS: u64 = 7;
    pub const CSV_MAX_ROWS: usize = 1000;
    /// Row count above which a CSV is flagged as large.
    pub const CSV_LARGE_ROWS: usize = 1000;
    pub const CSV_HEAD_ROWS: usize = 3;
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const SESSIONS_DIR: &str = "chat_sessions";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_PREFIX: &str = "chatbot.log";
    pub const PLOTS_DIR: &str = "plots";
    pub const FILE_LOG_LEVEL: &str = "info";
    pub const CONSOLE_LOG_LEVEL: &str = "warn";
}

// ─── UI Strings ───────────────────────────────────────────────────────────────

pub mod ui {
    pub const APP_TITLE: &str = "Image CSV Chatbot";
    pub const POWERED_BY: &str = "Powered by Google Gemini AI";
    pub const THINKING: &str = "Thinking...";
    pub const GENERATING: &str = "Generating response...";
    pub const RUNNING_CODE: &str = "Running code to build your plot...";
    pub const COMPLETE: &str = "Complete!";

    pub fn api_error(error: &str) -> String {
        format!("Error: {error}\n\nPlease check your API key in the .env file and try again.")
    }
}
