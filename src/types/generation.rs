//! Generation settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::message::ChatMessage;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Sampling settings sent with every completion request.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
pub struct GenerationSettings {
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(default = 0.7)]
    pub temperature: f64,
    #[builder(default = 128_000)]
    pub max_tokens: u32,
    #[builder(default = 1.0)]
    pub top_p: f64,
    #[builder(default = true)]
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Per-call overrides for [`crate::engine::ChatEngine::create_with`].
///
/// Unset fields fall back to the engine's settings. `messages` replaces the
/// engine history for this call only.
#[derive(Debug, Clone, Default, Builder)]
pub struct CreateOptions {
    #[builder(into)]
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub stream: Option<bool>,
    pub tool_choice: Option<ToolChoice>,
    pub messages: Option<Vec<ChatMessage>>,
}

impl CreateOptions {
    /// Resolve these overrides against base settings.
    pub fn apply(&self, base: &GenerationSettings) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone().unwrap_or_else(|| base.model.clone()),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
            top_p: self.top_p.unwrap_or(base.top_p),
            stream: self.stream.unwrap_or(base.stream),
        }
    }
}

/// How the model may pick tools.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
    Function(String),
}

impl ToolChoice {
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Auto => "auto".into(),
            Self::None => "none".into(),
            Self::Required => "required".into(),
            Self::Function(name) => serde_json::json!({
                "type": "function",
                "function": { "name": name },
            }),
        }
    }
}

/// Why a streamed choice finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}
