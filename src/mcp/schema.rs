//! Tool catalogue shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{Display, EnumString};

/// Shape in which a discovered catalogue is exposed to callers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ToolFormat {
    /// The server's `tools` array, untouched.
    #[serde(alias = "claude")]
    #[strum(to_string = "raw", serialize = "claude")]
    Raw,
    /// Chat-completions function definitions.
    #[default]
    #[serde(alias = "openai")]
    #[strum(to_string = "function", serialize = "openai")]
    Function,
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct McpToolSchema {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

/// Chat-completions definition for a tool with the given parameter schema.
pub fn function_definition(name: &str, description: &str, schema: &Value) -> Value {
    let properties = schema.get("properties").cloned().unwrap_or_else(|| json!({}));
    let required = schema.get("required").cloned().unwrap_or_else(|| json!([]));
    json!({
        "type": "function",
        "function": {
            "name": name,
            "description": description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            },
            "strict": true,
        },
    })
}

/// Convert a raw `tools` array into `format`.
///
/// Entries that are not tool objects are skipped in the function shape.
pub fn normalize(raw_tools: &[Value], format: ToolFormat) -> Vec<Value> {
    match format {
        ToolFormat::Raw => raw_tools.to_vec(),
        ToolFormat::Function => raw_tools
            .iter()
            .filter_map(|tool| serde_json::from_value::<McpToolSchema>(tool.clone()).ok())
            .map(|tool| {
                function_definition(
                    &tool.name,
                    tool.description.as_deref().unwrap_or_default(),
                    &tool.input_schema,
                )
            })
            .collect(),
    }
}

/// Name a catalogue entry is called by, in either shape.
pub fn tool_name(tool: &Value) -> Option<&str> {
    tool.get("function")
        .and_then(|function| function.get("name"))
        .or_else(|| tool.get("name"))
        .and_then(Value::as_str)
}
