//! Streaming event types delivered on bus channels.

use serde::ser::{Serialize, SerializeMap, Serializer};

use super::message::{ChatMessage, ToolCall};

/// Built-in channel names.
pub mod channel {
    pub const CONTENT: &str = "content";
    pub const TOOL_CALLS: &str = "tool_calls";
    pub const TOOL_REQUEST: &str = "tool_request";
    pub const TOOL_RESPONSE: &str = "tool_response";
    pub const FINAL: &str = "final";

    /// Channels every bus declares, before filter channels.
    pub const BUILTIN: [&str; 5] = [CONTENT, TOOL_CALLS, TOOL_REQUEST, TOOL_RESPONSE, FINAL];
}

/// An event pushed onto a bus channel.
///
/// Messages are snapshots taken at push time; later deltas never mutate an
/// event that was already delivered.
///
/// Serializes as a record tagged by `type`, which is the channel name; a
/// filtered delta is tagged with its filter's name.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A content increment and the message so far.
    Content {
        content: String,
        message: ChatMessage,
    },
    /// Tool-call fragments merged; `tool_calls` is the whole buffer.
    ToolCalls {
        tool_calls: Vec<ToolCall>,
        message: ChatMessage,
        delta: serde_json::Value,
    },
    /// The model finished requesting tools.
    ToolRequest {
        tool_calls: Vec<ToolCall>,
        message: ChatMessage,
    },
    /// Results of one round of tool executions.
    ToolResponse {
        tool_results: Vec<ChatMessage>,
        tool_calls: Vec<ToolCall>,
    },
    /// The finished assistant message.
    Final { message: ChatMessage },
    /// A delta matched by a registered filter.
    Filtered {
        channel: String,
        message: ChatMessage,
        delta: serde_json::Value,
    },
}

impl StreamEvent {
    /// Channel this event belongs on.
    pub fn channel(&self) -> &str {
        match self {
            Self::Content { .. } => channel::CONTENT,
            Self::ToolCalls { .. } => channel::TOOL_CALLS,
            Self::ToolRequest { .. } => channel::TOOL_REQUEST,
            Self::ToolResponse { .. } => channel::TOOL_RESPONSE,
            Self::Final { .. } => channel::FINAL,
            Self::Filtered { channel, .. } => channel,
        }
    }

    /// Message snapshot carried by this event, if any.
    pub fn message(&self) -> Option<&ChatMessage> {
        match self {
            Self::Content { message, .. }
            | Self::ToolCalls { message, .. }
            | Self::ToolRequest { message, .. }
            | Self::Final { message }
            | Self::Filtered { message, .. } => Some(message),
            Self::ToolResponse { .. } => None,
        }
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.channel())?;
        match self {
            Self::Content { content, message } => {
                map.serialize_entry("content", content)?;
                map.serialize_entry("message", message)?;
            }
            Self::ToolCalls { tool_calls, message, delta } => {
                map.serialize_entry("tool_calls", tool_calls)?;
                map.serialize_entry("message", message)?;
                map.serialize_entry("delta", delta)?;
            }
            Self::ToolRequest { tool_calls, message } => {
                map.serialize_entry("tool_calls", tool_calls)?;
                map.serialize_entry("message", message)?;
            }
            Self::ToolResponse { tool_results, tool_calls } => {
                map.serialize_entry("tool_results", tool_results)?;
                map.serialize_entry("tool_calls", tool_calls)?;
            }
            Self::Final { message } => map.serialize_entry("message", message)?,
            Self::Filtered { message, delta, .. } => {
                map.serialize_entry("message", message)?;
                map.serialize_entry("delta", delta)?;
            }
        }
        map.end()
    }
}
