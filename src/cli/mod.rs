//! CLI argument definitions for the `mcpez` binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::{ToolServerConfig, ToolServersFile};
use crate::error::Result;
use crate::mcp::ToolRouter;
use crate::types::CreateOptions;

/// Stream chat completions with SSE tool servers attached.
#[derive(Parser, Debug)]
#[command(name = "mcpez", version, about = "Streaming chat with SSE tool servers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prompt and stream the reply
    Chat(ChatArgs),
    /// List the tools the configured servers advertise
    Tools(ServerArgs),
}

/// Tool servers to attach.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// SSE tool server URL (repeatable)
    #[arg(long = "server", value_name = "URL")]
    pub servers: Vec<String>,

    /// Tool server definitions (TOML or JSON `mcpServers` map)
    #[arg(long, value_name = "PATH")]
    pub servers_file: Option<PathBuf>,

    /// Also load ~/.mcpez/servers.toml
    #[arg(long)]
    pub default_servers: bool,
}

impl ServerArgs {
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.servers_file.is_none() && !self.default_servers
    }

    /// Merge every source into one definition set. URLs given on the command
    /// line are named `server-1`, `server-2`, ...
    pub fn definitions(&self) -> Result<ToolServersFile> {
        let mut file = if self.default_servers {
            ToolServersFile::load_default()?
        } else {
            ToolServersFile::default()
        };
        if let Some(path) = &self.servers_file {
            file.servers.extend(ToolServersFile::load(path)?.servers);
        }
        for (i, url) in self.servers.iter().enumerate() {
            file.servers
                .insert(format!("server-{}", i + 1), ToolServerConfig::sse(url.clone()));
        }
        Ok(file)
    }

    /// Connect every configured server; `None` when none are configured.
    pub async fn connect(&self) -> Result<Option<Arc<ToolRouter>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let router = self.definitions()?.connect_all().await?;
        Ok(Some(Arc::new(router)))
    }
}

/// Arguments for the `chat` subcommand.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// User prompt
    pub prompt: String,

    /// Model override (defaults to MCPEZ_MODEL / OPENAI_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Temperature (0.0 - 2.0)
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Max tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    pub no_stream: bool,

    /// Print reasoning deltas to stderr
    #[arg(long)]
    pub show_reasoning: bool,

    #[command(flatten)]
    pub servers: ServerArgs,
}

impl ChatArgs {
    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.no_stream.then_some(false),
            ..CreateOptions::default()
        }
    }
}
