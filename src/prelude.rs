//! Convenience re-exports for common use.

pub use crate::config::{ChatConfig, ToolServerConfig, ToolServersFile};
pub use crate::engine::ChatEngine;
pub use crate::error::{McpezError, Result};
pub use crate::mcp::{McpClient, McpClientOptions, ToolFormat, ToolRouter};
pub use crate::stream::{BusItem, EventBus};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolExecutor, ToolSet};
pub use crate::types::{
    channel, Attachments, ChatMessage, CreateOptions, GenerationSettings, Role, StreamEvent,
    ToolCall, ToolChoice,
};
