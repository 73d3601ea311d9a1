//! The capability the engine uses to run model-requested tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Executes tools by name and advertises the catalogue sent to the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `name` with already-parsed arguments.
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value>;

    /// Tool definitions to include in completion requests. Empty means none.
    fn tools(&self) -> Vec<Value> {
        Vec::new()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, arguments: Value) -> Result<Value> {
        (**self).execute(name, arguments).await
    }

    fn tools(&self) -> Vec<Value> {
        (**self).tools()
    }
}
