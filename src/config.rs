//! Environment-driven configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::llm::DEFAULT_ANTHROPIC_URL;
use crate::publish::DEFAULT_CHANGELOG_PATH;
use crate::quota::DEFAULT_FREE_LIMIT;

pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000);
pub const DEFAULT_STATE_FILE: &str = "changelog-bot-state.json";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_GITHUB_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration.
#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    pub anthropic_api_key: String,
    pub anthropic_url: String,
    /// `None` runs without signature verification.
    pub webhook_secret: Option<String>,
    pub bind: SocketAddr,
    pub state_file: PathBuf,
    pub free_limit: u64,
    pub model: String,
    pub llm_timeout: Duration,
    pub github_timeout: Duration,
    pub app_url: Option<String>,
    pub changelog_path: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("bind", &self.bind)
            .field("state_file", &self.state_file)
            .field("free_limit", &self.free_limit)
            .field("anthropic_url", &self.anthropic_url)
            .field("model", &self.model)
            .field("llm_timeout", &self.llm_timeout)
            .field("github_timeout", &self.github_timeout)
            .field("app_url", &self.app_url)
            .field("changelog_path", &self.changelog_path)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        Ok(Config {
            github_token: required("GITHUB_TOKEN")?,
            anthropic_api_key: required("ANTHROPIC_API_KEY")?,
            anthropic_url: get("CHANGELOG_BOT_ANTHROPIC_URL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string()),
            webhook_secret: get("GITHUB_WEBHOOK_SECRET"),
            bind: parse_var("CHANGELOG_BOT_BIND", get("CHANGELOG_BOT_BIND"))?
                .unwrap_or(DEFAULT_BIND),
            state_file: get("CHANGELOG_BOT_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            free_limit: parse_var("CHANGELOG_BOT_FREE_LIMIT", get("CHANGELOG_BOT_FREE_LIMIT"))?
                .unwrap_or(DEFAULT_FREE_LIMIT),
            model: get("CHANGELOG_BOT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            llm_timeout: Duration::from_secs(
                parse_var(
                    "CHANGELOG_BOT_LLM_TIMEOUT_SECS",
                    get("CHANGELOG_BOT_LLM_TIMEOUT_SECS"),
                )?
                .unwrap_or(DEFAULT_LLM_TIMEOUT_SECS),
            ),
            github_timeout: Duration::from_secs(
                parse_var(
                    "CHANGELOG_BOT_GITHUB_TIMEOUT_SECS",
                    get("CHANGELOG_BOT_GITHUB_TIMEOUT_SECS"),
                )?
                .unwrap_or(DEFAULT_GITHUB_TIMEOUT_SECS),
            ),
            app_url: get("CHANGELOG_BOT_APP_URL").map(|url| url.trim_end_matches('/').to_string()),
            changelog_path: get("CHANGELOG_BOT_CHANGELOG_PATH")
                .unwrap_or_else(|| DEFAULT_CHANGELOG_PATH.to_string()),
        })
    }
}

/// Parses a variable if set. A value that does not parse is an error, never
/// a silent fallback to the default.
fn parse_var<T: FromStr>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}
