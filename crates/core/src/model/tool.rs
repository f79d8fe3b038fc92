//! Tool abstractions for the unified LLM interface

use crate::schema::OutputSchema;
use compact_str::CompactString;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool for the LLM
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tool {
    /// The name of the tool
    pub name: CompactString,

    /// The description of the tool
    pub description: String,

    /// The parameters of the tool
    pub parameters: Schema,

    /// Whether to strictly validate the parameters
    pub strict: bool,
}

impl Tool {
    /// Build a tool whose parameters are described by `schema`.
    pub fn from_schema(
        name: impl Into<CompactString>,
        description: impl Into<String>,
        schema: &OutputSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: schema.to_json_schema(),
            strict: false,
        }
    }

    /// Build a tool whose parameters are the JSON schema of `T`.
    pub fn typed<T: JsonSchema>(
        name: impl Into<CompactString>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: schemars::schema_for!(T),
            strict: false,
        }
    }
}

/// A tool call made by the model
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ToolCall {
    /// The ID of the tool call
    #[serde(default, skip_serializing_if = "CompactString::is_empty")]
    pub id: CompactString,

    /// The index of the tool call (used in streaming)
    #[serde(default, skip_serializing)]
    pub index: u32,

    /// The type of tool (currently only "function")
    #[serde(default, rename = "type")]
    pub call_type: CompactString,

    /// The function to call
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a complete function call.
    pub fn function(
        id: impl Into<CompactString>,
        name: impl Into<CompactString>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            index: 0,
            call_type: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Merge two tool calls into one
    pub fn merge(&mut self, call: &Self) {
        if !call.id.is_empty() {
            self.id = call.id.clone();
        }
        if !call.call_type.is_empty() {
            self.call_type = call.call_type.clone();
        }
        if !call.function.name.is_empty() {
            self.function.name = call.function.name.clone();
        }
        self.function.arguments.push_str(&call.function.arguments);
    }

    /// Parse the JSON arguments. An empty argument string is an empty object.
    pub fn parse_arguments(&self) -> serde_json::Result<Value> {
        let raw = self.function.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(raw)
    }
}

/// A function call within a tool call
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FunctionCall {
    /// The name of the function to call
    #[serde(default, skip_serializing_if = "CompactString::is_empty")]
    pub name: CompactString,

    /// The arguments to pass to the function (JSON string)
    #[serde(default)]
    pub arguments: String,
}

/// Controls which tool is called by the model
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub enum ToolChoice {
    /// Model will not call any tool
    #[serde(rename = "none")]
    None,

    /// Model can pick between generating a message or calling tools
    #[serde(rename = "auto")]
    #[default]
    Auto,

    /// Model must call one or more tools
    #[serde(rename = "required")]
    Required,

    /// Model must call the specified function
    Function(CompactString),
}

impl From<&str> for ToolChoice {
    fn from(value: &str) -> Self {
        ToolChoice::Function(value.into())
    }
}
