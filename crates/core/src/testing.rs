//! Scripted model for tests.
//!
//! [`MockModel`] answers from a queue of scripted replies, falling back to a
//! responder closure. Latency can be injected per request and every request
//! is recorded for later inspection.

use crate::model::{
    FinishReason, Message, Model, Request, Response, StreamChunk, ToolCall,
};
use anyhow::Result;
use compact_str::CompactString;
use futures_core::Stream;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc, time::Duration};

type Responder = Arc<dyn Fn(&Request) -> Result<Message> + Send + Sync>;
type Latency = Arc<dyn Fn(&Request) -> Duration + Send + Sync>;

enum Reply {
    Message(Message),
    Error(String),
}

#[derive(Default)]
struct Inner {
    script: VecDeque<Reply>,
    responder: Option<Responder>,
    latency: Option<Latency>,
    requests: Vec<Request>,
    native: bool,
    chunk: usize,
}

/// A scripted, clonable model. Clones share their script and recordings.
#[derive(Clone)]
pub struct MockModel {
    name: CompactString,
    inner: Arc<Mutex<Inner>>,
}

impl MockModel {
    /// Create an empty mock answering as `name`.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(Inner {
                chunk: 4,
                ..Default::default()
            })),
        }
    }

    /// Queue a plain text reply.
    pub fn text(self, content: impl Into<String>) -> Self {
        self.reply(Message::assistant(content, None, None))
    }

    /// Queue a reply requesting one tool call.
    pub fn tool_call(
        self,
        id: impl Into<CompactString>,
        name: impl Into<CompactString>,
        arguments: serde_json::Value,
    ) -> Self {
        let call = ToolCall::function(id, name, arguments.to_string());
        self.reply(Message::assistant("", None, Some(&[call])))
    }

    /// Queue an arbitrary assistant message.
    pub fn reply(self, message: Message) -> Self {
        self.inner.lock().script.push_back(Reply::Message(message));
        self
    }

    /// Queue a provider failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.inner.lock().script.push_back(Reply::Error(message.into()));
        self
    }

    /// Answer with `f` once the script is exhausted.
    pub fn respond_with(
        self,
        f: impl Fn(&Request) -> Result<Message> + Send + Sync + 'static,
    ) -> Self {
        self.inner.lock().responder = Some(Arc::new(f));
        self
    }

    /// Sleep for `f(request)` before answering.
    pub fn latency(self, f: impl Fn(&Request) -> Duration + Send + Sync + 'static) -> Self {
        self.inner.lock().latency = Some(Arc::new(f));
        self
    }

    /// Claim support for provider-native structured output.
    pub fn native_structured(self, native: bool) -> Self {
        self.inner.lock().native = native;
        self
    }

    /// Characters per streamed content chunk.
    pub fn chunk_size(self, chars: usize) -> Self {
        self.inner.lock().chunk = chars.max(1);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<Request> {
        self.inner.lock().requests.clone()
    }

    /// Number of requests received so far.
    pub fn calls(&self) -> usize {
        self.inner.lock().requests.len()
    }

    fn next(&self, request: &Request) -> (Option<Duration>, Result<Message>) {
        let mut inner = self.inner.lock();
        inner.requests.push(request.clone());
        let latency = inner.latency.as_ref().map(|f| f(request));
        let reply = match inner.script.pop_front() {
            Some(Reply::Message(message)) => Ok(message),
            Some(Reply::Error(message)) => Err(anyhow::anyhow!(message)),
            None => match &inner.responder {
                Some(f) => f(request),
                None => Err(anyhow::anyhow!("mock model {} has no reply left", self.name)),
            },
        };
        (latency, reply)
    }

    fn model_name(&self, request: &Request) -> String {
        if request.model.is_empty() {
            self.name.to_string()
        } else {
            request.model.to_string()
        }
    }
}

impl Model for MockModel {
    async fn send(&self, request: &Request) -> Result<Response> {
        let (latency, reply) = self.next(request);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(Response::from_message(self.model_name(request), &reply?))
    }

    fn stream(&self, request: Request) -> impl Stream<Item = Result<StreamChunk>> + Send {
        let (latency, reply) = self.next(&request);
        let chunk = self.inner.lock().chunk;
        let model = self.model_name(&request);
        async_stream::try_stream! {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            let message = reply?;
            let chars: Vec<char> = message.content.chars().collect();
            for piece in chars.chunks(chunk) {
                let mut out = StreamChunk::text(piece.iter().collect::<String>());
                out.model = model.clone();
                yield out;
            }
            if !message.tool_calls.is_empty() {
                let calls = message
                    .tool_calls
                    .iter()
                    .enumerate()
                    .map(|(idx, call)| ToolCall { index: idx as u32, ..call.clone() })
                    .collect();
                yield StreamChunk::tool_calls_delta(calls);
                yield StreamChunk::finish(FinishReason::ToolCalls);
            } else {
                yield StreamChunk::finish(FinishReason::Stop);
            }
        }
    }

    fn active_model(&self) -> CompactString {
        self.name.clone()
    }

    fn native_structured_output(&self) -> bool {
        self.inner.lock().native
    }
}
