//! Hooks around model calls and tool failures.
//!
//! Middleware runs in registration order. Each one may rewrite the outbound
//! [`Request`] before it reaches the provider, and may turn a recoverable
//! tool failure into the text the model sees. The stored conversation is
//! never touched.

use crate::tool::ToolError;
use bcore::{
    Result,
    model::{Message, Model, Request, Role, ToolCall, transcript},
};
use chain::{ChatModel, PromptTemplate};
use compact_str::CompactString;
use futures_util::future::BoxFuture;
use serde_json::json;

/// A hook around the agent loop.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite the request before it is sent.
    fn wrap_request<'a>(&'a self, request: Request) -> BoxFuture<'a, Result<Request>> {
        Box::pin(async move { Ok(request) })
    }

    /// Text reported to the model for a recoverable tool failure. `None`
    /// leaves it to the next middleware or the default `Error: ...`.
    fn tool_error(&self, _call: &ToolCall, _error: &ToolError) -> Option<String> {
        None
    }
}

/// Reports tool failures with a fixed hint asking the model to retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolErrorMessage;

impl Middleware for ToolErrorMessage {
    fn name(&self) -> &str {
        "ToolErrorMessage"
    }

    fn tool_error(&self, _call: &ToolCall, error: &ToolError) -> Option<String> {
        Some(format!(
            "Tool error: Please check your input and try again. ({error})"
        ))
    }
}

const CLASSIFIER_PROMPT: &str = "You classify the complexity of a user question.\n\
- simple: a single fact or common-sense answer, a short translation or edit, \
a brief direct reply with no multi-step reasoning or design.\n\
- complex: multi-step reasoning, solution or architecture design, long-form \
writing, non-trivial code or debugging, rigorous math, weighing trade-offs.\n\
Answer with exactly one word: simple or complex.";

/// Question complexity as judged by the router model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Complex,
}

impl Complexity {
    /// Read a classifier reply. Anything unrecognised counts as complex.
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim().to_lowercase();
        if reply.contains("simple") {
            Complexity::Simple
        } else {
            Complexity::Complex
        }
    }
}

/// Routes each request to a model picked by a classifier.
///
/// The latest user message is sent to the router model; simple questions go
/// to `simple`, everything else to `complex`.
#[derive(Clone)]
pub struct SelectModel<M> {
    router: ChatModel<M>,
    simple: CompactString,
    complex: CompactString,
}

impl<M: Model + Send + Sync + 'static> SelectModel<M> {
    pub fn new(
        router: ChatModel<M>,
        simple: impl Into<CompactString>,
        complex: impl Into<CompactString>,
    ) -> Self {
        Self {
            router: router.with_max_tokens(64),
            simple: simple.into(),
            complex: complex.into(),
        }
    }

    /// Classify `text` with the router model.
    pub async fn classify(&self, text: &str) -> Result<Complexity> {
        let reply = self
            .router
            .generate(vec![Message::system(CLASSIFIER_PROMPT), Message::user(text)])
            .await?;
        Ok(Complexity::parse(&reply.content))
    }

    fn latest_text(request: &Request) -> String {
        match request.last_user_text() {
            Some(text) => text.to_owned(),
            None => request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        }
    }
}

impl<M: Model + Send + Sync + 'static> Middleware for SelectModel<M> {
    fn name(&self) -> &str {
        "SelectModel"
    }

    fn wrap_request<'a>(&'a self, mut request: Request) -> BoxFuture<'a, Result<Request>> {
        Box::pin(async move {
            let complexity = self.classify(&Self::latest_text(&request)).await?;
            request.model = match complexity {
                Complexity::Simple => self.simple.clone(),
                Complexity::Complex => self.complex.clone(),
            };
            tracing::debug!(?complexity, model = %request.model, "model selected");
            Ok(request)
        })
    }
}

/// Default prompt for [`Summarize`]; `{messages}` receives the transcript.
pub const SUMMARY_PROMPT: &str = "Condense the conversation below into a short summary. \
Keep the key facts, preferences, constraints, decisions and conclusions.\n{messages}";

/// Replaces older messages with a summary once a conversation grows long.
///
/// When more than `trigger` non-system messages would be sent, all but the
/// latest `keep` are summarised by a separate model and sent as one user
/// message instead. Tool results are never separated from the call that
/// requested them.
#[derive(Clone)]
pub struct Summarize<M> {
    summarizer: ChatModel<M>,
    trigger: usize,
    keep: usize,
    prefix: String,
    prompt: String,
}

impl<M: Model + Send + Sync + 'static> Summarize<M> {
    pub fn new(summarizer: ChatModel<M>, trigger: usize, keep: usize) -> Self {
        Self {
            summarizer,
            trigger,
            keep,
            prefix: "Summary of the conversation so far: ".into(),
            prompt: SUMMARY_PROMPT.into(),
        }
    }

    /// Text placed before the summary.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use `prompt`, which must mention `{messages}`.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Index of the first message to keep verbatim in `messages`, or `None`
    /// when nothing needs summarising.
    pub fn cut(&self, messages: &[Message]) -> Option<usize> {
        if messages.len() <= self.trigger {
            return None;
        }
        let mut cut = messages.len().saturating_sub(self.keep);
        while cut > 0 && messages.get(cut).is_some_and(|m| m.role == Role::Tool) {
            cut -= 1;
        }
        (cut > 0).then_some(cut)
    }
}

impl<M: Model + Send + Sync + 'static> Middleware for Summarize<M> {
    fn name(&self) -> &str {
        "Summarize"
    }

    fn wrap_request<'a>(&'a self, mut request: Request) -> BoxFuture<'a, Result<Request>> {
        Box::pin(async move {
            let system = request
                .messages
                .iter()
                .take_while(|m| m.role == Role::System)
                .count();
            let Some(cut) = self.cut(&request.messages[system..]) else {
                return Ok(request);
            };

            let older = &request.messages[system..system + cut];
            let prompt = PromptTemplate::new(&self.prompt)?
                .format(&json!({ "messages": transcript(older) }))?;
            let summary = self.summarizer.generate(vec![Message::user(prompt)]).await?;
            tracing::debug!(summarized = cut, "conversation summarized");

            let mut messages = request.messages[..system].to_vec();
            messages.push(Message::user(format!("{}{}", self.prefix, summary.content)));
            messages.extend_from_slice(&request.messages[system + cut..]);
            request.messages = messages;
            Ok(request)
        })
    }
}
