use std::time::Duration;

use ::config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::extract::ExtractStrategy;

const ENV_PREFIX: &str = "MOCKTEST";
const SETTINGS_FILE: &str = "mocktest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY not found (set it in the environment or .env)")]
    MissingApiKey,
    #[error("invalid settings: {0}")]
    Invalid(#[from] ::config::ConfigError),
}

/// Runtime settings, resolved once at startup and handed to each component.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub google_api_key: Option<String>,
    pub db_path: Option<String>,
    pub model: String,
    pub api_base: String,
    pub max_attempts: u32,
    pub rate_limit_backoff_secs: u64,
    pub target_pause_secs: u64,
    pub question_count: u32,
    pub request_timeout_secs: u64,
    pub max_page_chars: usize,
    pub extract_strategy: ExtractStrategy,
}

impl Settings {
    /// Load `.env`, then defaults < `mocktest.toml` < `MOCKTEST_*` < `GOOGLE_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let env = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .try_parsing(true);
        Self::build(env, std::env::var("GOOGLE_API_KEY").ok(), true)
    }

    fn build(
        env: Environment,
        google_api_key: Option<String>,
        with_file: bool,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("model", "gemini-2.0-flash-lite-preview-02-05")?
            .set_default("api_base", "https://generativelanguage.googleapis.com/v1beta")?
            .set_default("max_attempts", 3)?
            .set_default("rate_limit_backoff_secs", 60)?
            .set_default("target_pause_secs", 15)?
            .set_default("question_count", 15)?
            .set_default("request_timeout_secs", 120)?
            .set_default("max_page_chars", 60_000)?
            .set_default("extract_strategy", "greedy")?;
        if with_file {
            builder = builder.add_source(File::with_name(SETTINGS_FILE).required(false));
        }
        let settings: Settings = builder
            .add_source(env)
            .set_override_option("google_api_key", google_api_key.filter(|k| !k.is_empty()))?
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// The API key, or `MissingApiKey` when the run cannot proceed without one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.google_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff_secs)
    }

    pub fn target_pause(&self) -> Duration {
        Duration::from_secs(self.target_pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// First five characters of a key, for console confirmation without leaking it.
pub fn key_preview(key: &str) -> String {
    let head: String = key.chars().take(5).collect();
    format!("{}...", head)
}
