//! Tests for environment-driven configuration.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use mcpez::config::{ChatConfig, DEFAULT_BASE_URL};
use mcpez::error::McpezError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 15] = [
    "MCPEZ_API_KEY",
    "OPENAI_API_KEY",
    "MCPEZ_BASE_URL",
    "OPENAI_BASE_URL",
    "MCPEZ_COMPLETIONS_PATH",
    "MCPEZ_MODEL",
    "OPENAI_MODEL",
    "MCPEZ_SYSTEM_PROMPT",
    "MCPEZ_TEMPERATURE",
    "MCPEZ_MAX_TOKENS",
    "MCPEZ_TOP_P",
    "MCPEZ_STREAM",
    "MCPEZ_REQUEST_TIMEOUT_MS",
    "MCPEZ_ROUND_TIMEOUT_MS",
    "MCPEZ_LOG",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        for key in keys {
            std::env::remove_var(key);
        }
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[test]
fn from_env_uses_defaults_when_unset() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);

    let config = ChatConfig::from_env().unwrap();

    assert_eq!(config.api_key, None);
    assert_eq!(config.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.completions_url(), "https://api.openai.com/v1/chat/completions");
    assert!(config.settings.stream);
    assert_eq!(config.round_timeout, None);
}

#[test]
fn from_env_prefers_mcpez_variables() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);

    std::env::set_var("OPENAI_API_KEY", "openai-key");
    std::env::set_var("MCPEZ_API_KEY", "mcpez-key");
    std::env::set_var("OPENAI_BASE_URL", "http://localhost:9999/v1/");
    std::env::set_var("MCPEZ_COMPLETIONS_PATH", "/v2/chat");
    std::env::set_var("OPENAI_MODEL", "gpt-4o");
    std::env::set_var("MCPEZ_TEMPERATURE", "0.2");
    std::env::set_var("MCPEZ_STREAM", "false");
    std::env::set_var("MCPEZ_ROUND_TIMEOUT_MS", "1500");

    let config = ChatConfig::from_env().unwrap();

    assert_eq!(config.api_key.as_deref(), Some("mcpez-key"));
    assert_eq!(config.completions_url(), "http://localhost:9999/v1/v2/chat");
    assert_eq!(config.settings.model, "gpt-4o");
    assert_eq!(config.settings.temperature, 0.2);
    assert!(!config.settings.stream);
    assert_eq!(config.round_timeout, Some(Duration::from_millis(1500)));
}

#[test]
fn from_env_rejects_unparseable_numbers() {
    let _env_lock = env_lock_guard();
    let _env_guard = EnvGuard::capture(&CONFIG_ENV_VARS);

    std::env::set_var("MCPEZ_MAX_TOKENS", "lots");

    let err = ChatConfig::from_env().unwrap_err();
    assert!(matches!(err, McpezError::Configuration(ref message) if message.contains("MCPEZ_MAX_TOKENS")));
}

#[test]
fn debug_output_redacts_the_api_key() {
    let config = ChatConfig::builder().api_key("sk-secret").build();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("sk-secret"));
}
