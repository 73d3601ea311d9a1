//! Tool-server definitions in the `mcpServers` layout.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{McpezError, Result};
use crate::mcp::client::DEFAULT_TIMEOUT;
use crate::mcp::{McpClient, McpClientOptions, SseTransport, ToolFormat, ToolRouter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    #[default]
    Sse,
    /// Locally spawned servers; listed for completeness but never connected.
    Stdio,
}

/// One entry of the `mcpServers` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolServerConfig {
    #[serde(default, rename = "type")]
    pub kind: ServerKind,
    #[serde(default, alias = "base_url", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, alias = "timeout_ms", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ToolFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ToolServerConfig {
    /// An SSE server at `base_url`.
    pub fn sse(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Entries with a base URL are SSE servers regardless of `type`.
    pub fn is_sse(&self) -> bool {
        self.base_url.is_some() || (self.kind == ServerKind::Sse && self.command.is_none())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Build an unconnected client for this entry.
    pub fn client(&self) -> Result<McpClient> {
        let url = self
            .base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| McpezError::Configuration("tool server entry has no baseUrl".into()))?;

        let mut transport = SseTransport::new();
        for (name, value) in &self.headers {
            transport = transport.with_header(name, value)?;
        }
        let options = McpClientOptions::builder()
            .timeout(self.timeout())
            .format(self.format.unwrap_or_default())
            .build();
        Ok(McpClient::new(url, Arc::new(transport), options))
    }
}

/// A document holding `{"mcpServers": {name: entry}}`, in TOML or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolServersFile {
    #[serde(rename = "mcpServers", alias = "mcp_servers", default)]
    pub servers: BTreeMap<String, ToolServerConfig>,
}

impl ToolServersFile {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| McpezError::Configuration(format!("invalid tool server TOML: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a file, choosing the parser by extension (`.json`, else TOML).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading tool server definitions");
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&raw),
            _ => Self::from_toml(&raw),
        }
    }

    /// Load the default file, or an empty set when it does not exist.
    pub fn load_default() -> Result<Self> {
        let path = default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| McpezError::Configuration(format!("cannot encode tool servers: {e}")))
    }

    /// Connect every SSE entry and register it on a router.
    ///
    /// Entries that fail to connect are logged and skipped; it is an error
    /// only when none connect.
    pub async fn connect_all(&self) -> Result<ToolRouter> {
        let mut router = ToolRouter::new();
        let mut connected = 0usize;
        for (name, entry) in &self.servers {
            if !entry.is_sse() {
                warn!(server = name.as_str(), "non-SSE tool server skipped");
                continue;
            }
            let client = match entry.client() {
                Ok(client) => client,
                Err(e) => {
                    warn!(server = name.as_str(), error = %e, "tool server skipped");
                    continue;
                }
            };
            match client.connect(entry.timeout()).await {
                Ok(()) => {
                    router.register(name.clone(), Arc::new(client));
                    connected += 1;
                }
                Err(e) => warn!(server = name.as_str(), error = %e, "tool server unavailable"),
            }
        }
        if connected == 0 && !self.servers.is_empty() {
            return Err(McpezError::Configuration("no tool server could be connected".into()));
        }
        Ok(router)
    }
}

/// `~/.mcpez/servers.toml`.
pub fn default_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".mcpez"))
        .unwrap_or_else(|| PathBuf::from(".mcpez"))
        .join("servers.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn parses_toml_with_either_key_spelling() {
        let file = ToolServersFile::from_toml(
            r#"
            [mcpServers.stocks]
            baseUrl = "https://tools.example.com/sse"
            timeoutMs = 5000
            format = "raw"

            [mcpServers.search]
            base_url = "http://localhost:8000/sse"
            headers = { Authorization = "Bearer abc" }
            "#,
        )
        .unwrap();

        let stocks = &file.servers["stocks"];
        assert_eq!(stocks.base_url.as_deref(), Some("https://tools.example.com/sse"));
        assert_eq!(stocks.timeout(), Duration::from_millis(5000));
        assert_eq!(stocks.format, Some(ToolFormat::Raw));

        let search = &file.servers["search"];
        assert_eq!(search.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(search.headers["Authorization"], "Bearer abc");
        assert!(search.is_sse());
    }

    #[test]
    fn parses_json_written_by_the_editor() {
        let file = ToolServersFile::from_json(
            r#"{"mcpServers": {
                "web": {"type": "sse", "baseUrl": "https://x/sse", "description": "web tools"},
                "local": {"type": "stdio", "command": "uvx", "args": ["tool"]}
            }}"#,
        )
        .unwrap();
        assert!(file.servers["web"].is_sse());
        assert!(!file.servers["local"].is_sse());
        assert_eq!(file.servers["local"].args, vec!["tool"]);
    }

    #[test]
    fn load_picks_parser_by_extension() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("servers.toml");
        let json_path = dir.path().join("servers.json");

        let original = ToolServersFile {
            servers: BTreeMap::from([("a".to_string(), ToolServerConfig::sse("https://a/sse"))]),
        };
        fs::write(&toml_path, original.to_toml().unwrap()).unwrap();
        fs::write(&json_path, r#"{"mcpServers": {"a": {"baseUrl": "https://a/sse"}}}"#).unwrap();

        assert_eq!(ToolServersFile::load(&toml_path).unwrap(), original);
        assert_eq!(ToolServersFile::load(&json_path).unwrap(), original);
    }

    #[test]
    fn entry_without_url_cannot_build_a_client() {
        let err = ToolServerConfig::default().client().unwrap_err();
        assert!(matches!(err, McpezError::Configuration(_)));
    }

    #[test]
    fn invalid_header_is_a_configuration_error() {
        let mut entry = ToolServerConfig::sse("https://a/sse");
        entry.headers.insert("bad header".into(), "x".into());
        assert!(matches!(entry.client(), Err(McpezError::Configuration(_))));
    }
}
