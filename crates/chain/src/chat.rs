//! The model-call stage.

use crate::{Data, DataStream, Runnable, structured::StructuredOutput};
use bcore::{
    Error, OutputSchema, Result,
    model::{
        Message, MessageBuilder, Model, Request, ResponseFormat, Role, StreamChunk, Tool,
        ToolChoice,
    },
};
use compact_str::CompactString;
use futures_util::{StreamExt, future::BoxFuture};
use std::{future::Future, time::Duration};
use tokio_util::sync::CancellationToken;

/// Await `fut`, bounded by `timeout` and raced against `cancel`.
pub async fn bounded<F: Future>(
    fut: F,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Result<F::Output> {
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout(limit)),
            None => Ok(fut.await),
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled),
            out = timed => out,
        },
        None => timed.await,
    }
}

/// Send `request` and return the assistant reply.
///
/// The request's own timeout bounds the call. Provider failures become
/// [`Error::Request`].
pub async fn complete<M: Model>(
    model: &M,
    request: &Request,
    cancel: Option<&CancellationToken>,
) -> Result<Message> {
    tracing::debug!(
        model = %request.model,
        messages = request.messages.len(),
        tools = request.tools.as_ref().map_or(0, Vec::len),
        "model call"
    );
    let response = bounded(model.send(request), request.timeout, cancel)
        .await?
        .map_err(Error::request)?;
    let mut message = response
        .message()
        .ok_or_else(|| Error::Request("response carried no choices".into()))?;
    for (idx, call) in message.tool_calls.iter_mut().enumerate() {
        call.index = idx as u32;
    }
    Ok(message)
}

/// Turn one stream chunk into a message fragment.
fn fragment(chunk: &StreamChunk) -> Option<Message> {
    let mut builder = MessageBuilder::new(Role::Assistant);
    builder.accept(chunk);
    let message = builder.build();
    if message.content.is_empty()
        && message.reasoning_content.is_empty()
        && message.tool_calls.is_empty()
    {
        return None;
    }
    Some(message)
}

/// Settings applied to every request a [`ChatModel`] sends.
#[derive(Debug, Clone, Default)]
pub struct CallConfig {
    pub model: Option<CompactString>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    pub timeout: Option<Duration>,
}

/// A model handle usable as a pipeline stage.
///
/// Configuration methods return adjusted copies; the underlying provider is
/// shared, never global.
#[derive(Clone)]
pub struct ChatModel<M> {
    model: M,
    config: CallConfig,
    cancel: Option<CancellationToken>,
}

impl<M: Model + Send + Sync + 'static> ChatModel<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            config: CallConfig::default(),
            cancel: None,
        }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Target a specific model name instead of the provider default.
    pub fn with_model(mut self, name: impl Into<CompactString>) -> Self {
        self.config.model = Some(name.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    /// Bound every call (and every streamed chunk) by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Abort calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Offer `tools` to the model.
    pub fn bind_tools(mut self, tools: impl IntoIterator<Item = Tool>) -> Self {
        self.config.tools = tools.into_iter().collect();
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.config.tool_choice = Some(choice);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.config.response_format = Some(format);
        self
    }

    /// Coerce replies into `schema`.
    pub fn with_structured_output(
        self,
        schema: OutputSchema,
        strategy: crate::Strategy,
    ) -> StructuredOutput<M> {
        StructuredOutput::new(self, schema, strategy)
    }

    /// The request this handle would send for `messages`.
    pub fn request(&self, messages: Vec<Message>) -> Request {
        let config = &self.config;
        Request {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| self.model.active_model()),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop: config.stop.clone(),
            tools: (!config.tools.is_empty()).then(|| config.tools.clone()),
            tool_choice: config.tool_choice.clone(),
            response_format: config.response_format.clone(),
            usage: false,
            timeout: config.timeout,
        }
    }

    /// Send a prepared request.
    pub async fn send(&self, request: &Request) -> Result<Message> {
        complete(&self.model, request, self.cancel.as_ref()).await
    }

    /// Send `messages` with this handle's settings.
    pub async fn generate(&self, messages: Vec<Message>) -> Result<Message> {
        self.send(&self.request(messages)).await
    }

    /// Stream reply fragments for `messages`.
    ///
    /// Each chunk receipt is bounded by the configured timeout. At least one
    /// fragment is always yielded, so an empty reply concatenates to an
    /// empty assistant message.
    pub fn stream_messages(&self, messages: Vec<Message>) -> DataStream<'_> {
        let request = self.request(messages);
        let limit = request.timeout;
        let cancel = self.cancel.clone();
        tracing::debug!(model = %request.model, "model stream");

        Box::pin(async_stream::try_stream! {
            let chunks = self.model.stream(request);
            futures_util::pin_mut!(chunks);
            let mut yielded = false;
            while let Some(chunk) = bounded(chunks.next(), limit, cancel.as_ref()).await? {
                let chunk = chunk.map_err(Error::request)?;
                if let Some(message) = fragment(&chunk) {
                    yielded = true;
                    yield Data::Message(message);
                }
            }

            if !yielded {
                yield Data::Message(Message::with_role(Role::Assistant, ""));
            }
        })
    }
}

impl<M: Model + Send + Sync + 'static> Runnable for ChatModel<M> {
    fn name(&self) -> &str {
        "ChatModel"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let reply = self.generate(input.into_messages()).await?;
            Ok(Data::Message(reply))
        })
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        self.stream_messages(input.into_messages())
    }
}
