//! One executor in front of several tool servers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::tool_name;
use crate::error::{McpezError, Result};
use crate::tools::ToolExecutor;

/// Routes each call to the server that advertised the tool.
///
/// Catalogues are merged in registration order; when two servers advertise
/// the same name the first registration keeps it.
#[derive(Default)]
pub struct ToolRouter {
    servers: Vec<(String, Arc<dyn ToolExecutor>)>,
    routes: HashMap<String, usize>,
    catalogue: Vec<Value>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected server under `name`, taking its current catalogue.
    pub fn register(&mut self, name: impl Into<String>, server: Arc<dyn ToolExecutor>) {
        let name = name.into();
        let index = self.servers.len();
        for tool in server.tools() {
            let Some(tool_name) = tool_name(&tool).map(str::to_string) else {
                warn!(server = name.as_str(), "catalogue entry without a name skipped");
                continue;
            };
            if let Some(owner) = self.routes.get(&tool_name) {
                warn!(
                    tool = tool_name.as_str(),
                    server = name.as_str(),
                    kept = self.servers[*owner].0.as_str(),
                    "duplicate tool name ignored"
                );
                continue;
            }
            self.routes.insert(tool_name, index);
            self.catalogue.push(tool);
        }
        debug!(server = name.as_str(), routes = self.routes.len(), "tool server registered");
        self.servers.push((name, server));
    }

    pub fn with(mut self, name: impl Into<String>, server: Arc<dyn ToolExecutor>) -> Self {
        self.register(name, server);
        self
    }

    /// Name of the server that owns `tool`.
    pub fn server_for(&self, tool: &str) -> Option<&str> {
        self.routes
            .get(tool)
            .map(|index| self.servers[*index].0.as_str())
    }

    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|(name, _)| name.as_str())
    }
}

#[async_trait]
impl ToolExecutor for ToolRouter {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let index = self
            .routes
            .get(name)
            .ok_or_else(|| McpezError::tool(name, "no tool server provides this tool"))?;
        let (server, executor) = &self.servers[*index];
        debug!(tool = name, server = server.as_str(), "routing tool call");
        executor.execute(name, arguments).await
    }

    fn tools(&self) -> Vec<Value> {
        self.catalogue.clone()
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("servers", &self.server_names().collect::<Vec<_>>())
            .field("tools", &self.routes.len())
            .finish()
    }
}
