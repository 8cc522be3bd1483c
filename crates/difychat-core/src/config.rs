//! Client configuration
//!
//! Loaded from `<config dir>/difychat/config.toml` (or an explicit path), then
//! overridden by `DIFY_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default API base URL (local Dify deployment)
pub const DEFAULT_BASE_URL: &str = "http://localhost:8090/v1";

/// User identity sent when the caller does not provide one
pub const DEFAULT_USER: &str = "default_user";

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "DIFY_API_BASE_URL";
/// Environment variable overriding `api_key`
pub const ENV_API_KEY: &str = "DIFY_API_KEY";
/// Environment variable overriding `default_user`
pub const ENV_USER: &str = "DIFY_USER";

/// Language used for operator-facing error text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh-CN")]
    Chinese,
}

/// Which endpoints carry `Authorization: Bearer <key>`
///
/// Deployments differ on this, so every endpoint has its own switch. Defaults
/// follow a gateway that authenticates upload/stop/suggestions only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub send_message: bool,
    pub upload_file: bool,
    pub stop_message: bool,
    pub suggested_questions: bool,
    pub feedback: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            send_message: false,
            upload_file: true,
            stop_message: true,
            suggested_questions: true,
            feedback: false,
        }
    }
}

impl AuthConfig {
    /// Bearer header on every endpoint
    pub fn all() -> Self {
        Self {
            send_message: true,
            upload_file: true,
            stop_message: true,
            suggested_questions: true,
            feedback: true,
        }
    }
}

/// Configuration for [`crate::DifyClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.dify.ai/v1` (no trailing slash)
    pub base_url: String,
    /// Bearer credential; can also be set later on the client
    pub api_key: Option<String>,
    /// Identity used when a call does not name a user
    pub default_user: String,
    /// Language of operator-facing error messages
    pub locale: Locale,
    /// Wrap `<think>` output in a collapsible "Thinking..." block
    pub rewrite_thinking: bool,
    pub auth: AuthConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            default_user: DEFAULT_USER.to_string(),
            locale: Locale::default(),
            rewrite_thinking: false,
            auth: AuthConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url`, everything else default
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Default config file location: `<config dir>/difychat/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("difychat").join("config.toml"))
    }

    /// Load from `path` (or the default location), then apply environment overrides
    ///
    /// A missing file at the default location is not an error; a missing file
    /// at an explicit path is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        info!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Parse TOML config content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Override fields from `DIFY_*` variables resolved through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            debug!("{} overrides base_url", ENV_BASE_URL);
            self.base_url = base_url;
        }
        if let Some(api_key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            debug!("{} overrides api_key", ENV_API_KEY);
            self.api_key = Some(api_key);
        }
        if let Some(user) = lookup(ENV_USER).filter(|v| !v.is_empty()) {
            self.default_user = user;
        }
    }

    /// Check the base URL and normalize it (no trailing slash, non-empty user)
    pub fn validate(&mut self) -> Result<()> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        let parsed = url::Url::parse(trimmed)
            .with_context(|| format!("Invalid base_url '{}'", self.base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("base_url must use http or https, got '{}'", parsed.scheme());
        }
        self.base_url = trimmed.to_string();

        if self.default_user.trim().is_empty() {
            self.default_user = DEFAULT_USER.to_string();
        }
        if self.api_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.api_key = None;
        }
        Ok(())
    }

    /// Absolute URL for an API path like `/chat-messages`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
