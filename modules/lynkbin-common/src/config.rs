use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Classification oracle
    pub gemini_api_key: String,
    pub gemini_model: String,

    // Rendering
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub render_proxy: Option<String>,

    // Media
    pub media_scratch_dir: PathBuf,

    // Bounds
    pub render_timeout: Duration,
    pub fetch_timeout: Duration,
    pub oracle_timeout: Duration,
    pub max_note_chars: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            gemini_api_key: required_env("GEMINI_API_KEY")?,
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            render_proxy: optional_env("RENDER_PROXY"),
            media_scratch_dir: env::var("MEDIA_SCRATCH_DIR")
                .unwrap_or_else(|_| "downloads".to_string())
                .into(),
            render_timeout: Duration::from_secs(parse_env("RENDER_TIMEOUT_SECS", 30)?),
            fetch_timeout: Duration::from_secs(parse_env("FETCH_TIMEOUT_SECS", 60)?),
            oracle_timeout: Duration::from_secs(parse_env("ORACLE_TIMEOUT_SECS", 90)?),
            max_note_chars: parse_env("MAX_NOTE_CHARS", 3500)?,
        })
    }

    /// Log which settings are present without leaking secret values.
    pub fn log_redacted(&self) {
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  GEMINI_API_KEY: {}", preview(&self.gemini_api_key));
        tracing::info!("  GEMINI_MODEL: {}", self.gemini_model);
        tracing::info!("  BROWSERLESS_URL: {}", self.browserless_url);
        tracing::info!("  BROWSERLESS_TOKEN: {}", preview_opt(&self.browserless_token));
        tracing::info!("  RENDER_PROXY: {}", preview_opt(&self.render_proxy));
        tracing::info!("  MEDIA_SCRATCH_DIR: {}", self.media_scratch_dir.display());
    }
}

/// First few characters of a secret, for logs.
fn preview(val: &str) -> String {
    let head: String = val.chars().take(5).collect();
    format!("{head}...({} chars)", val.chars().count())
}

fn required_env(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}
