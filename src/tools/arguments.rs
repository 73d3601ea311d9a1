//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::{McpezError, Result};

/// Parsed tool call arguments with typed accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Parse the JSON-encoded argument string streamed by the model.
    ///
    /// A blank string is an empty object.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(Value::Object(Default::default())));
        }
        let value = serde_json::from_str(trimmed).map_err(|e| {
            McpezError::InvalidArgument(format!("tool arguments are not valid JSON: {e}"))
        })?;
        Ok(Self::new(value))
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    fn field(&self, key: &str, kind: &str) -> Result<&Value> {
        self.value
            .get(key)
            .ok_or_else(|| McpezError::InvalidArgument(format!("missing {kind} argument: {key}")))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.field(key, "string")?
            .as_str()
            .ok_or_else(|| McpezError::InvalidArgument(format!("argument {key} is not a string")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.field(key, "integer")?
            .as_i64()
            .ok_or_else(|| McpezError::InvalidArgument(format!("argument {key} is not an integer")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.field(key, "number")?
            .as_f64()
            .ok_or_else(|| McpezError::InvalidArgument(format!("argument {key} is not a number")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.field(key, "boolean")?
            .as_bool()
            .ok_or_else(|| McpezError::InvalidArgument(format!("argument {key} is not a boolean")))
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            McpezError::InvalidArgument(format!("failed to deserialize arguments: {e}"))
        })
    }
}
