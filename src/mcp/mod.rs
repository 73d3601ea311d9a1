//! Model Context Protocol client for SSE tool servers.

pub mod aggregate;
pub mod client;
pub mod protocol;
pub mod schema;
pub mod transport;

pub use aggregate::ToolRouter;
pub use client::{ConnectionState, McpClient, McpClientOptions};
pub use schema::ToolFormat;
pub use transport::{McpTransport, PushEvent, PushStream, SseTransport};
