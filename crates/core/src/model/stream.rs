//! Streaming response chunks.

use crate::model::{Delta, FinishReason, ToolCall, Usage};
use serde::{Deserialize, Serialize};

/// A streaming chat completion chunk
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StreamChunk {
    /// A unique identifier for the chat completion
    #[serde(default)]
    pub id: String,

    /// The model used for the completion
    #[serde(default)]
    pub model: String,

    /// The list of completion choices (with delta content)
    #[serde(default)]
    pub choices: Vec<StreamChoice>,

    /// Token usage statistics (only in final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// A chunk carrying only a content delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self::delta(Delta {
            content: Some(content.into()),
            ..Default::default()
        })
    }

    /// A chunk carrying tool-call deltas.
    pub fn tool_calls_delta(calls: Vec<ToolCall>) -> Self {
        Self::delta(Delta {
            tool_calls: Some(calls),
            ..Default::default()
        })
    }

    /// A chunk carrying only a finish reason.
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            choices: vec![StreamChoice {
                finish_reason: Some(reason),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn delta(delta: Delta) -> Self {
        Self {
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            ..Default::default()
        }
    }

    /// Get the content of the first choice
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Get the reasoning content of the first choice
    pub fn reasoning_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.reasoning_content.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Get the tool calls of the first choice
    pub fn tool_calls(&self) -> Option<&[ToolCall]> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.tool_calls.as_deref())
    }

    /// Get the reason the model stopped generating
    pub fn reason(&self) -> Option<&FinishReason> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_ref())
    }
}

/// A completion choice in a streaming response
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StreamChoice {
    /// The index of this choice in the list
    #[serde(default)]
    pub index: u32,

    /// The delta content for this chunk
    #[serde(default)]
    pub delta: Delta,

    /// The reason the model stopped generating
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}
