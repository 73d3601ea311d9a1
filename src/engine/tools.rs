//! Running one round of model-requested tool calls.

use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{McpezError, Result};
use crate::tools::{ToolArguments, ToolExecutor};
use crate::types::{ChatMessage, ToolCall};

/// Execute every call concurrently and return one tool message per call, in
/// call order. Failures become `{"error": ...}` results.
pub async fn execute_calls(executor: &dyn ToolExecutor, calls: &[ToolCall]) -> Vec<ChatMessage> {
    join_all(calls.iter().map(|call| async move {
        let content = match run_call(executor, call).await {
            Ok(value) => result_content(value),
            Err(e) => {
                warn!(tool = call.function.name.as_str(), id = call.id.as_str(), error = %e, "tool call failed");
                error_content(&e)
            }
        };
        ChatMessage::tool_result(call.id.clone(), content)
    }))
    .await
}

async fn run_call(executor: &dyn ToolExecutor, call: &ToolCall) -> Result<Value> {
    let args = ToolArguments::parse(&call.function.arguments)?;
    debug!(tool = call.function.name.as_str(), id = call.id.as_str(), "executing tool");
    executor.execute(&call.function.name, args.into_value()).await
}

/// Strings are passed through; anything else is serialized.
fn result_content(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn error_content(error: &McpezError) -> String {
    let message = match error {
        McpezError::ToolExecution { message, .. } => message.clone(),
        other => other.to_string(),
    };
    json!({ "error": message }).to_string()
}
