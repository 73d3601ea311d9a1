//! Chat message types exchanged with the completion endpoint.

use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::with_text(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_text(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_text(Role::Assistant, text)
    }

    /// Create a tool result message answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_text(Role::Tool, content)
        }
    }

    /// Build the user message for a prompt and its attachments.
    ///
    /// Without attachments the content is plain text. With attachments it is a
    /// part list: the text (when non-blank), then images, audio and files.
    pub fn user_with_attachments(prompt: &str, attachments: &Attachments) -> Self {
        if attachments.is_empty() {
            return Self::user(prompt);
        }

        let mut parts = Vec::new();
        if !prompt.trim().is_empty() {
            parts.push(ContentPart::Text {
                text: prompt.to_string(),
            });
        }
        parts.extend(attachments.images.iter().map(|img| ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: img.url.clone(),
                detail: img.detail.clone().unwrap_or_else(default_detail),
            },
        }));
        parts.extend(attachments.audio.iter().map(|url| ContentPart::Audio {
            audio: MediaUrl { url: url.clone() },
        }));
        parts.extend(attachments.files.iter().map(|url| ContentPart::File {
            file: MediaUrl { url: url.clone() },
        }));

        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Extract the text content, concatenating all text parts.
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Message content: plain text or an ordered list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Concatenated text of this content.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Append streamed text.
    pub fn push_str(&mut self, fragment: &str) {
        match self {
            Self::Text(text) => text.push_str(fragment),
            Self::Parts(parts) => match parts.last_mut() {
                Some(ContentPart::Text { text }) => text.push_str(fragment),
                _ => parts.push(ContentPart::Text {
                    text: fragment.to_string(),
                }),
            },
        }
    }
}

fn nullable_content<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    Audio { audio: MediaUrl },
    File { file: MediaUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default = "default_detail")]
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaUrl {
    pub url: String,
}

fn default_detail() -> String {
    "auto".to_string()
}

/// A function call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    /// An empty call slot, filled in by streamed fragments.
    pub fn empty() -> Self {
        Self::new("", "", "")
    }

    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// A call is complete once its function name is known.
    pub fn is_complete(&self) -> bool {
        !self.function.name.is_empty()
    }
}

/// Function name and JSON-encoded arguments of a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

/// An image attachment with an optional detail hint.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub url: String,
    pub detail: Option<String>,
}

/// Media attached to a user prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attachments {
    pub images: Vec<ImageAttachment>,
    pub audio: Vec<String>,
    pub files: Vec<String>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.images.push(ImageAttachment {
            url: url.into(),
            detail: None,
        });
        self
    }

    pub fn image_with_detail(mut self, url: impl Into<String>, detail: impl Into<String>) -> Self {
        self.images.push(ImageAttachment {
            url: url.into(),
            detail: Some(detail.into()),
        });
        self
    }

    /// Attach raw image bytes as a base64 `data:` URL.
    pub fn image_bytes(self, mime_type: &str, bytes: &[u8]) -> Self {
        self.image(data_url(mime_type, bytes))
    }

    pub fn audio(mut self, url: impl Into<String>) -> Self {
        self.audio.push(url.into());
        self
    }

    pub fn file(mut self, url: impl Into<String>) -> Self {
        self.files.push(url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.audio.is_empty() && self.files.is_empty()
    }
}

/// Encode bytes as a `data:` URL.
pub fn data_url(mime_type: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime_type};base64,{encoded}")
}
