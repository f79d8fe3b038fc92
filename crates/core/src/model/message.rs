//! Chat messages and the stream accumulator.

use crate::model::{StreamChunk, ToolCall};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// A message in a conversation.
///
/// Histories are append-only: a message is never edited once it has been
/// pushed onto a conversation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
pub struct Message {
    /// The role of the message
    pub role: Role,

    /// The content of the message
    #[serde(default)]
    pub content: String,

    /// Optional participant name
    #[serde(default, skip_serializing_if = "CompactString::is_empty")]
    pub name: CompactString,

    /// The reasoning content
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning_content: String,

    /// The tool call id this message answers (tool role only)
    #[serde(default, skip_serializing_if = "CompactString::is_empty")]
    pub tool_call_id: CompactString,

    /// The tool calls requested by the assistant
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub tool_calls: SmallVec<[ToolCall; 4]>,
}

impl Message {
    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a new assistant message
    pub fn assistant(
        content: impl Into<String>,
        reasoning: Option<String>,
        tool_calls: Option<&[ToolCall]>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            reasoning_content: reasoning.unwrap_or_default(),
            tool_calls: tool_calls
                .map(|tc| tc.iter().cloned().collect())
                .unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Create a new tool message answering the call `call`
    pub fn tool(content: impl Into<String>, call: impl Into<CompactString>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: call.into(),
            ..Default::default()
        }
    }

    /// Create a message of the given role.
    pub fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ..Default::default()
        }
    }

    /// Append another fragment of the same message.
    ///
    /// Content and reasoning are concatenated, tool-call deltas are merged
    /// by their stream index.
    pub fn merge(&mut self, other: &Message) {
        self.content.push_str(&other.content);
        self.reasoning_content.push_str(&other.reasoning_content);
        if !other.tool_call_id.is_empty() {
            self.tool_call_id = other.tool_call_id.clone();
        }
        for call in &other.tool_calls {
            match self.tool_calls.iter_mut().find(|c| c.index == call.index) {
                Some(existing) => existing.merge(call),
                None => self.tool_calls.push(call.clone()),
            }
        }
    }

    /// Label used when rendering a transcript.
    pub fn label(&self) -> &'static str {
        match self.role {
            Role::System => "System",
            Role::User => "Human",
            Role::Assistant => "AI",
            Role::Tool => "Tool",
        }
    }
}

/// Render messages as a plain transcript, one `Label: content` per line.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A builder for messages
pub struct MessageBuilder {
    /// The message
    message: Message,
    /// The tool calls
    calls: BTreeMap<u32, ToolCall>,
}

impl MessageBuilder {
    /// Create a new message builder
    pub fn new(role: Role) -> Self {
        Self {
            message: Message {
                role,
                ..Default::default()
            },
            calls: BTreeMap::new(),
        }
    }

    /// Accept a chunk from the stream
    pub fn accept(&mut self, chunk: &StreamChunk) -> bool {
        if let Some(calls) = chunk.tool_calls() {
            for call in calls {
                let entry = self.calls.entry(call.index).or_insert_with(|| ToolCall {
                    index: call.index,
                    ..Default::default()
                });
                entry.merge(call);
            }
        }

        let mut has_content = false;
        if let Some(content) = chunk.content() {
            self.message.content.push_str(content);
            has_content = true;
        }

        if let Some(reason) = chunk.reasoning_content() {
            self.message.reasoning_content.push_str(reason);
        }

        has_content
    }

    /// Build the message
    pub fn build(mut self) -> Message {
        if !self.calls.is_empty() {
            self.message.tool_calls = self.calls.into_values().collect();
        }
        self.message
    }
}

/// The role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
pub enum Role {
    /// The user role
    #[serde(rename = "user", alias = "human")]
    #[default]
    User,
    /// The assistant role
    #[serde(rename = "assistant", alias = "ai")]
    Assistant,
    /// The system role
    #[serde(rename = "system")]
    System,
    /// The tool role
    #[serde(rename = "tool")]
    Tool,
}
