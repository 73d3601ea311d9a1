//! Configuration (layered: code > env > defaults).

pub mod servers;

pub use servers::{ServerKind, ToolServerConfig, ToolServersFile};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;

use crate::error::{McpezError, Result};
use crate::types::GenerationSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Chat endpoint settings for [`crate::engine::ChatEngine`].
#[derive(Clone, Builder)]
pub struct ChatConfig {
    #[builder(into)]
    pub api_key: Option<String>,
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into, default = DEFAULT_COMPLETIONS_PATH.to_string())]
    pub completions_path: String,
    #[builder(default)]
    pub settings: GenerationSettings,
    #[builder(into)]
    pub system_prompt: Option<String>,
    /// Bound on establishing each completion request.
    pub request_timeout: Option<Duration>,
    /// Bound on one whole round, body included.
    pub round_timeout: Option<Duration>,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("base_url", &self.base_url)
            .field("completions_path", &self.completions_path)
            .field("settings", &self.settings)
            .field("system_prompt", &self.system_prompt)
            .field("request_timeout", &self.request_timeout)
            .field("round_timeout", &self.round_timeout)
            .finish()
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ChatConfig {
    /// Load from environment variables, reading `.env` when present.
    ///
    /// `MCPEZ_*` variables take precedence over the `OPENAI_*` ones.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
        };

        let mut config = Self::default();
        config.api_key = var(&["MCPEZ_API_KEY", "OPENAI_API_KEY"]);
        if let Some(url) = var(&["MCPEZ_BASE_URL", "OPENAI_BASE_URL"]) {
            config.base_url = url;
        }
        if let Some(path) = var(&["MCPEZ_COMPLETIONS_PATH"]) {
            config.completions_path = path;
        }
        if let Some(model) = var(&["MCPEZ_MODEL", "OPENAI_MODEL"]) {
            config.settings.model = model;
        }
        config.system_prompt = var(&["MCPEZ_SYSTEM_PROMPT"]);

        if let Some(raw) = var(&["MCPEZ_TEMPERATURE"]) {
            config.settings.temperature = parse_var("MCPEZ_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = var(&["MCPEZ_MAX_TOKENS"]) {
            config.settings.max_tokens = parse_var("MCPEZ_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = var(&["MCPEZ_TOP_P"]) {
            config.settings.top_p = parse_var("MCPEZ_TOP_P", &raw)?;
        }
        if let Some(raw) = var(&["MCPEZ_STREAM"]) {
            config.settings.stream = parse_var("MCPEZ_STREAM", &raw)?;
        }
        if let Some(raw) = var(&["MCPEZ_REQUEST_TIMEOUT_MS"]) {
            config.request_timeout = Some(Duration::from_millis(parse_var("MCPEZ_REQUEST_TIMEOUT_MS", &raw)?));
        }
        if let Some(raw) = var(&["MCPEZ_ROUND_TIMEOUT_MS"]) {
            config.round_timeout = Some(Duration::from_millis(parse_var("MCPEZ_ROUND_TIMEOUT_MS", &raw)?));
        }
        Ok(config)
    }

    /// Full completions URL.
    pub fn completions_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.completions_path)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| McpezError::Configuration(format!("{key}={raw}: {e}")))
}
