use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "souk_config.json";

const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 50;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 2_000;
const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4_096;
const DEFAULT_DATABASE_FILE: &str = "souk.sqlite3";

const MAX_MESSAGE_LENGTH_ENV: &str = "SOUK_MAX_MESSAGE_LENGTH";

/// Settings read from `<data_dir>/souk_config.json`. Every field is optional; unset
/// fields fall back to built-in defaults at the point of use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub retry_max_attempts: Option<u32>,
    pub retry_initial_backoff_ms: Option<u64>,
    pub retry_max_backoff_ms: Option<u64>,
    pub max_message_length: Option<usize>,
    pub database_file: Option<String>,
}

/// Missing or unparsable files yield the defaults.
pub fn load_config(data_dir: &Path) -> ChatConfig {
    let path = data_dir.join(CONFIG_FILE_NAME);
    let Ok(bytes) = std::fs::read(&path) else {
        return ChatConfig::default();
    };
    match serde_json::from_slice::<ChatConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config");
            ChatConfig::default()
        }
    }
}

/// The config payload written when no file exists yet, with every default spelled out.
pub fn default_config_json() -> String {
    let config = ChatConfig {
        retry_max_attempts: Some(DEFAULT_RETRY_MAX_ATTEMPTS),
        retry_initial_backoff_ms: Some(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
        retry_max_backoff_ms: Some(DEFAULT_RETRY_MAX_BACKOFF_MS),
        max_message_length: Some(DEFAULT_MAX_MESSAGE_LENGTH),
        database_file: Some(DEFAULT_DATABASE_FILE.to_string()),
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

impl ChatConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self
                .retry_max_attempts
                .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS)
                .max(1),
            initial_backoff: Duration::from_millis(
                self.retry_initial_backoff_ms
                    .unwrap_or(DEFAULT_RETRY_INITIAL_BACKOFF_MS),
            ),
            max_backoff: Duration::from_millis(
                self.retry_max_backoff_ms
                    .unwrap_or(DEFAULT_RETRY_MAX_BACKOFF_MS),
            ),
        }
    }

    /// Byte limit for message text. `SOUK_MAX_MESSAGE_LENGTH` wins over the file.
    pub fn max_message_length(&self) -> usize {
        let from_env = std::env::var(MAX_MESSAGE_LENGTH_ENV).ok();
        self.max_message_length_with_override(from_env.as_deref())
    }

    fn max_message_length_with_override(&self, from_env: Option<&str>) -> usize {
        if let Some(limit) = from_env.and_then(|v| v.trim().parse::<usize>().ok()) {
            if limit > 0 {
                return limit;
            }
        }
        self.max_message_length
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_MAX_MESSAGE_LENGTH)
    }

    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        let file = self
            .database_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE_FILE);
        data_dir.join(file)
    }
}
