//! mcpez: streaming chat completions with SSE tool servers.
//!
//! A [`engine::ChatEngine`] sends a chat-completions request, decodes the
//! server-sent response into events on an [`stream::EventBus`] and, when the
//! model asks for tools, runs them through a [`tools::ToolExecutor`] before
//! continuing the conversation. Tool servers speaking JSON-RPC over SSE are
//! reached with [`mcp::McpClient`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use mcpez::prelude::*;
//!
//! # async fn example() -> mcpez::Result<()> {
//! let client = McpClient::sse("http://localhost:8080/sse");
//! client.connect(Duration::from_secs(10)).await?;
//!
//! let engine = ChatEngine::new(ChatConfig::from_env()?).with_tool_executor(Arc::new(client));
//! let bus = engine.create("What does AAPL trade at?", &Attachments::new()).await?;
//! if let Ok(Some(message)) = bus.final_message().await {
//!     println!("{}", message.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod mcp;
pub mod prelude;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{McpezError, Result};
