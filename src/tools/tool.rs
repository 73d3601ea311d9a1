//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::arguments::ToolArguments;
use super::types::AgentToolParameters;
use crate::error::Result;

/// An in-process tool the model can call by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> &AgentToolParameters;

    async fn execute(&self, args: &ToolArguments) -> Result<Value>;
}

type ToolHandler =
    dyn Fn(ToolArguments) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync;

/// Closure-backed [`Tool`].
#[derive(Clone)]
pub struct AgentTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    handler: Arc<ToolHandler>,
}

impl AgentTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AgentToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    async fn execute(&self, args: &ToolArguments) -> Result<Value> {
        (self.handler)(args.clone()).await
    }
}

impl std::fmt::Debug for AgentTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}
