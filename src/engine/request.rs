//! Completion request bodies and the HTTP round trip.

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::Result;
use crate::types::{ChatMessage, GenerationSettings, ToolChoice};
use crate::util::http::{bearer_headers, status_to_error};
use crate::util::timeout::with_optional_timeout;

/// Body of a chat-completions request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

impl CompletionRequest {
    /// `tool_choice` is only sent alongside a non-empty catalogue.
    pub fn new(
        settings: &GenerationSettings,
        messages: Vec<ChatMessage>,
        tools: Vec<Value>,
        tool_choice: &ToolChoice,
    ) -> Self {
        let tool_choice = (!tools.is_empty()).then(|| tool_choice.to_value());
        Self {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            stream: settings.stream,
            tools,
            tool_choice,
        }
    }

    /// The follow-up request after a tool round: this round's messages, the
    /// assistant message and one tool message per call.
    pub fn continuation(&self, assistant: ChatMessage, results: Vec<ChatMessage>) -> Self {
        let mut next = self.clone();
        next.messages.push(assistant);
        next.messages.extend(results);
        if !next.tools.is_empty() {
            next.tool_choice = Some(ToolChoice::Auto.to_value());
        }
        next
    }
}

/// POST `request`; a non-success status becomes [`crate::McpezError::Api`].
pub(crate) async fn send(
    http: &reqwest::Client,
    config: &ChatConfig,
    request: &CompletionRequest,
) -> Result<reqwest::Response> {
    let url = config.completions_url();
    debug!(
        url = url.as_str(),
        model = request.model.as_str(),
        messages = request.messages.len(),
        tools = request.tools.len(),
        stream = request.stream,
        "completion request"
    );

    let pending = http
        .post(&url)
        .headers(bearer_headers(config.api_key.as_deref()))
        .json(request)
        .send();
    let response = with_optional_timeout(config.request_timeout, async { Ok(pending.await?) }).await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_to_error(status.as_u16(), &body));
    }
    Ok(response)
}
