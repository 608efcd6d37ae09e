//! Application-level configuration loading, including the question catalog.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::services::{
    questions::{Question, QuestionCatalog},
    retry::RetryPolicy,
    sync_engine::SyncSettings,
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SPECTRUM_BACK_CONFIG_PATH";
const DEFAULT_CACHE_DIR: &str = "data/cache";
const DEFAULT_ARCHIVE_LIMIT: usize = 5;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub sync: SyncSettings,
    pub retry: RetryPolicy,
    /// Directory of the file-backed local cache.
    pub cache_dir: PathBuf,
    /// Number of created events each device keeps in its archive.
    pub archive_limit: usize,
    /// Prefix of the participant links handed to organizers.
    pub public_base_url: String,
    pub questions: QuestionCatalog,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        questions = app_config.questions.len(),
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Link participants open to answer `event_id`.
    pub fn participant_url(&self, event_id: &str) -> String {
        format!(
            "{}/questions.html?id={event_id}",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    sync: SyncSettings,
    retry: RetryPolicy,
    cache_dir: Option<PathBuf>,
    archive_limit: Option<usize>,
    public_base_url: Option<String>,
    questions: Vec<Question>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let questions = if value.questions.is_empty() {
            QuestionCatalog::builtin()
        } else {
            QuestionCatalog::new(value.questions)
        };

        Self {
            sync: value.sync,
            retry: value.retry,
            cache_dir: value
                .cache_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            archive_limit: value.archive_limit.unwrap_or(DEFAULT_ARCHIVE_LIMIT),
            public_base_url: value
                .public_base_url
                .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_owned()),
            questions,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "sync": { "cachePollInterval": 1000 },
                "retry": { "maxAttempts": 3 },
                "archiveLimit": 2,
                "questions": [{ "text": "I like mornings", "value": 2 }]
            }"#,
        )
        .unwrap();
        let config = AppConfig::from(raw);

        assert_eq!(config.sync.cache_poll_interval, Duration::from_secs(1));
        assert_eq!(config.sync.remote_poll_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, RetryPolicy::default().base_delay);
        assert_eq!(config.archive_limit, 2);
        assert_eq!(config.questions.len(), 1);
        assert_eq!(config.cache_dir, PathBuf::from(DEFAULT_CACHE_DIR));
    }

    #[test]
    fn empty_question_list_uses_builtin_catalog() {
        let config = AppConfig::default();
        assert_eq!(config.questions.len(), QuestionCatalog::builtin().len());
    }

    #[test]
    fn participant_url_points_at_questions_page() {
        let config = AppConfig {
            public_base_url: "https://survey.example/".into(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.participant_url("abc123xyz"),
            "https://survey.example/questions.html?id=abc123xyz"
        );
    }
}
