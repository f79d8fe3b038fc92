//! Unified LLM interface types and traits.
//!
//! Provides the shared types used across all LLM providers:
//! `Message`, `Response`, `StreamChunk`, `Tool`, `Request`, and the `Model` trait.

use anyhow::Result;
use compact_str::CompactString;
use futures_core::Stream;
pub use message::{Message, MessageBuilder, Role, transcript};
pub use request::{Request, ResponseFormat};
pub use response::{Choice, CompletionMeta, Delta, FinishReason, Response, Usage};
pub use stream::{StreamChoice, StreamChunk};
pub use tool::{FunctionCall, Tool, ToolCall, ToolChoice};

mod message;
mod request;
mod response;
mod stream;
mod tool;

/// Unified LLM provider trait.
///
/// Abstracts any OpenAI-compatible chat backend. All implementations take
/// `&Request` directly; there is no associated config type. Constructors are
/// inherent methods on each provider and never called polymorphically.
pub trait Model: Sized + Clone {
    /// Send a chat completion request.
    fn send(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;

    /// Stream a chat completion response.
    fn stream(&self, request: Request) -> impl Stream<Item = Result<StreamChunk>> + Send;

    /// Get the active/default model name.
    fn active_model(&self) -> CompactString;

    /// Whether the backend honours `response_format = json_schema`.
    fn native_structured_output(&self) -> bool {
        false
    }
}

/// `()` as a model that never answers.
impl Model for () {
    async fn send(&self, _request: &Request) -> Result<Response> {
        anyhow::bail!("no model configured")
    }

    fn stream(&self, _request: Request) -> impl Stream<Item = Result<StreamChunk>> + Send {
        async_stream::stream! {
            yield Err(anyhow::anyhow!("no model configured"));
        }
    }

    fn active_model(&self) -> CompactString {
        CompactString::new("")
    }
}
