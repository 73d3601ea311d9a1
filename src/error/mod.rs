//! Error types for mcpez.

use thiserror::Error;

/// Primary error type for all mcpez operations.
#[derive(Error, Debug)]
pub enum McpezError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Protocol,
    Configuration,
    Serialization,
    ToolExecution,
    Unknown,
}

impl McpezError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Io(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Protocol(_) | Self::Stream(_) => ErrorCategory::Protocol,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, McpezError>;
