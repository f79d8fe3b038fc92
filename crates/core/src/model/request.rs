//! Chat request type.

use crate::model::{Message, Tool, ToolChoice};
use compact_str::CompactString;
use schemars::Schema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A chat completion request.
///
/// Contains everything needed to make an LLM call: model, messages, tools,
/// sampling parameters and streaming hints. Provider implementations convert
/// this to their wire format.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Request {
    /// The model to use.
    pub model: CompactString,

    /// The conversation messages.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// The tools available for this request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    /// Controls which tool is called by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Requested output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,

    /// Whether to return usage information in stream mode.
    #[serde(default)]
    pub usage: bool,

    /// Upper bound for the whole call.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl Request {
    /// Create a new request for the given model.
    pub fn new(model: impl Into<CompactString>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Set the messages for this request.
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Set the tools for this request.
    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Set the tool choice for this request.
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Set the response format for this request.
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// The content of the latest user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::model::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Output format requested from the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text
    Text,
    /// Any JSON object
    JsonObject,
    /// JSON conforming to a schema
    JsonSchema {
        /// Schema name
        name: CompactString,
        /// The JSON schema
        schema: Schema,
        /// Whether the provider must adhere strictly
        #[serde(default)]
        strict: bool,
    },
}
