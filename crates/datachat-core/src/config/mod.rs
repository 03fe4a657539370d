use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::prompts::DATA_ANALYST_ROLE;
use crate::constants::{defaults, endpoints, env, limits, models};
use crate::error::ChatError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub llm: LlmSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    pub chat: ChatSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    /// Let Gemini run Python to draw plots when a prompt asks for one.
    pub code_execution: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub sessions_dir: PathBuf,
    pub max_session_age_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_dir: PathBuf,
    pub file_level: String,
    pub console_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub show_timestamps: bool,
    pub csv_max_rows: usize,
    pub plots_dir: PathBuf,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: models::DEFAULT_MODEL.to_string(),
            api_key_env: env::API_KEY_VAR.to_string(),
            base_url: endpoints::GEMINI_BASE_URL.to_string(),
            code_execution: true,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from(defaults::SESSIONS_DIR),
            max_session_age_days: limits::MAX_SESSION_AGE_DAYS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(defaults::LOG_DIR),
            file_level: defaults::FILE_LOG_LEVEL.to_string(),
            console_level: defaults::CONSOLE_LOG_LEVEL.to_string(),
        }
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            csv_max_rows: limits::CSV_MAX_ROWS,
            plots_dir: PathBuf::from(defaults::PLOTS_DIR),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            chat: ChatSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datachat")
            .join("config.toml")
    }

    /// Load settings from the default location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing or unparsable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Ignoring unparsable config {}: {e}", path.display()),
                },
                Err(e) => tracing::warn!("Could not read config {}: {e}", path.display()),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> Result<(), ChatError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Read the API key from the environment variable named in settings.
    pub fn api_key(&self) -> Result<String, ChatError> {
        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ChatError::Config(format!(
                "{} not found in environment variables. \
                 Please create a .env file with your API key.",
                self.llm.api_key_env
            ))),
        }
    }

    pub fn max_session_age(&self) -> Duration {
        Duration::from_secs(self.storage.max_session_age_days.saturating_mul(86_400))
    }

    /// Build the Gemini client from the current settings.
    pub fn build_client(&self) -> Result<crate::llm::GeminiClient, ChatError> {
        let api_key = self.api_key()?;
        Ok(crate::llm::GeminiClient::new(api_key)
            .with_model(&self.llm.model)
            .with_base_url(&self.llm.base_url)
            .with_system_instruction(DATA_ANALYST_ROLE))
    }
}
