//! Parameter schemas for locally defined tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// JSON Schema describing a tool's parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentToolParameters {
    pub schema: Value,
}

impl AgentToolParameters {
    pub fn from_schema(schema: Value) -> Self {
        Self { schema }
    }

    /// A tool that takes no parameters.
    pub fn empty() -> Self {
        Self::object().build()
    }

    pub fn object() -> ParameterBuilder {
        ParameterBuilder::default()
    }
}

/// Builder for object parameter schemas.
#[derive(Debug, Default)]
pub struct ParameterBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterBuilder {
    /// Add a property with an arbitrary schema.
    pub fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    pub fn string(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "string", description, required)
    }

    pub fn number(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "number", description, required)
    }

    pub fn integer(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "integer", description, required)
    }

    pub fn boolean(self, name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        self.typed(name, "boolean", description, required)
    }

    pub fn string_enum(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[&str],
        required: bool,
    ) -> Self {
        let schema = json!({
            "type": "string",
            "description": description.into(),
            "enum": values,
        });
        self.property(name, schema, required)
    }

    fn typed(
        self,
        name: impl Into<String>,
        kind: &str,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let schema = json!({ "type": kind, "description": description.into() });
        self.property(name, schema, required)
    }

    pub fn build(self) -> AgentToolParameters {
        AgentToolParameters {
            schema: json!({
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }),
        }
    }
}
