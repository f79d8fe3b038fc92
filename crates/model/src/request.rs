//! OpenAI-compatible request body.
//!
//! Fields use `Option` + `skip_serializing_if` so anything the caller did
//! not set is simply absent from the wire.

use bcore::model::{Message, ResponseFormat, Tool, ToolChoice};
use serde::Serialize;
use serde_json::{Value, json};

/// OpenAI-compatible chat completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// The messages to send.
    pub messages: Vec<Message>,
    /// The model identifier.
    pub model: String,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Response format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,
    /// Whether to stream the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Stream options (e.g. include_usage).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<Value>,
    /// Temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Tool choice control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// Tools the model may call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
}

impl Request {
    /// Enable streaming for the request.
    pub fn stream(mut self, usage: bool) -> Self {
        self.stream = Some(true);
        self.stream_options = if usage {
            Some(json!({ "include_usage": true }))
        } else {
            None
        };
        self
    }

    /// Set the tools for the request.
    fn with_tools(self, tools: Vec<Tool>) -> Self {
        let tools = tools
            .into_iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": json!(tool),
                })
            })
            .collect::<Vec<_>>();
        Self {
            tools: Some(json!(tools)),
            ..self
        }
    }

    /// Set the tool choice for the request.
    fn with_tool_choice(self, tool_choice: ToolChoice) -> Self {
        Self {
            tool_choice: match tool_choice {
                ToolChoice::None => Some(json!("none")),
                ToolChoice::Auto => Some(json!("auto")),
                ToolChoice::Required => Some(json!("required")),
                ToolChoice::Function(name) => Some(json!({
                    "type": "function",
                    "function": { "name": name }
                })),
            },
            ..self
        }
    }

    /// Set the response format for the request.
    fn with_response_format(self, format: ResponseFormat) -> Self {
        let format = match format {
            ResponseFormat::Text => json!({ "type": "text" }),
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
            ResponseFormat::JsonSchema {
                name,
                schema,
                strict,
            } => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": name,
                    "schema": schema,
                    "strict": strict,
                }
            }),
        };
        Self {
            response_format: Some(format),
            ..self
        }
    }
}

impl From<bcore::model::Request> for Request {
    fn from(req: bcore::model::Request) -> Self {
        let mut wire = Self {
            messages: req.messages,
            model: req.model.to_string(),
            max_tokens: req.max_tokens,
            response_format: None,
            stop: (!req.stop.is_empty()).then(|| json!(req.stop)),
            stream: None,
            stream_options: None,
            temperature: req.temperature,
            tool_choice: None,
            tools: None,
        };

        if let Some(tools) = req.tools {
            wire = wire.with_tools(tools);
        }
        if let Some(tool_choice) = req.tool_choice {
            wire = wire.with_tool_choice(tool_choice);
        }
        if let Some(format) = req.response_format {
            wire = wire.with_response_format(format);
        }

        wire
    }
}
