//! A [`ToolExecutor`] over in-process tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::arguments::ToolArguments;
use super::executor::ToolExecutor;
use super::tool::Tool;
use crate::error::{McpezError, Result};
use crate::mcp::schema::function_definition;

/// Ordered collection of local tools. Later registrations with a taken name
/// are ignored.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        if self.get(tool.name()).is_some() {
            debug!(tool = tool.name(), "duplicate tool name ignored");
            return false;
        }
        self.tools.push(tool);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolSet {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| McpezError::tool(name, "unknown tool"))?;
        tool.execute(&ToolArguments::new(arguments)).await
    }

    fn tools(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| function_definition(tool.name(), tool.description(), &tool.parameters().schema))
            .collect()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|tool| tool.name()))
            .finish()
    }
}
