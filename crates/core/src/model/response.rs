//! Chat completion responses.

use crate::model::{Message, Role, ToolCall};
use serde::{Deserialize, Serialize};

/// Common metadata shared between streaming and non-streaming completions
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CompletionMeta {
    /// A unique identifier for the chat completion
    #[serde(default)]
    pub id: String,

    /// The object type
    #[serde(default)]
    pub object: String,

    /// Unix timestamp (in seconds) of when the response was created
    #[serde(default)]
    pub created: u64,

    /// The model used for the completion
    #[serde(default)]
    pub model: String,
}

/// Message content in a completion response
///
/// Used for both streaming deltas and non-streaming response messages.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Delta {
    /// The role of the message author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// The content of the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// The reasoning content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,

    /// Tool calls made by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A chat completion response from the LLM
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Response {
    /// Completion metadata
    #[serde(flatten)]
    pub meta: CompletionMeta,

    /// The list of completion choices
    pub choices: Vec<Choice>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: Usage,
}

impl Response {
    /// Wrap a single assistant message as a complete response.
    pub fn from_message(model: impl Into<String>, message: &Message) -> Self {
        let tool_calls = (!message.tool_calls.is_empty()).then(|| message.tool_calls.to_vec());
        let reason = if tool_calls.is_some() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        Self {
            meta: CompletionMeta {
                object: "chat.completion".into(),
                model: model.into(),
                ..Default::default()
            },
            choices: vec![Choice {
                index: 0,
                message: Delta {
                    role: Some(Role::Assistant),
                    content: Some(message.content.clone()),
                    reasoning_content: (!message.reasoning_content.is_empty())
                        .then(|| message.reasoning_content.clone()),
                    tool_calls,
                },
                finish_reason: Some(reason),
            }],
            usage: Usage::default(),
        }
    }

    /// The first choice as an assistant message
    pub fn message(&self) -> Option<Message> {
        let choice = self.choices.first()?;
        Some(Message::assistant(
            choice.message.content.clone().unwrap_or_default(),
            choice.message.reasoning_content.clone(),
            choice.message.tool_calls.as_deref(),
        ))
    }

    /// Get the content of the first choice
    pub fn content(&self) -> Option<&String> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
    }

    /// Get the reasoning content of the first choice
    pub fn reasoning(&self) -> Option<&String> {
        self.choices
            .first()
            .and_then(|choice| choice.message.reasoning_content.as_ref())
    }

    /// Get the tool calls from the response
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.choices
            .first()
            .and_then(|choice| choice.message.tool_calls.as_deref())
    }

    /// Get the reason the model stopped generating
    pub fn reason(&self) -> Option<&FinishReason> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_ref())
    }
}

/// A completion choice in a non-streaming response
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Choice {
    /// The index of this choice in the list
    #[serde(default)]
    pub index: u32,

    /// The generated message
    pub message: Delta,

    /// The reason the model stopped generating
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// The reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model finished naturally
    Stop,

    /// The model hit the max token limit
    Length,

    /// Content was filtered
    ContentFilter,

    /// The model is making tool calls
    ToolCalls,

    /// Insufficient system resources
    InsufficientSystemResource,
}

/// Token usage statistics
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Usage {
    /// Number of tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Number of tokens in the completion
    #[serde(default)]
    pub completion_tokens: u32,

    /// Total number of tokens used
    #[serde(default)]
    pub total_tokens: u32,
}
