//! The agent loop.
//!
//! A run alternates between asking the model and executing the tools it
//! requests until the model answers without tool calls, the iteration
//! budget runs out, or something fails:
//!
//! ```text
//! AwaitingModel --no calls--> Done
//! AwaitingModel --calls-----> AwaitingTools --results--> AwaitingModel
//! any state ----error-------> Failed
//! ```

use crate::{
    Agent, Middleware, ToolContext, ToolError, ToolSet,
    checkpoint::{Checkpoint, Checkpointer, STRUCTURED_RESPONSE},
    progress::{Progress, ProgressSender},
    tool::render,
};
use bcore::{
    Error, FieldError, OutputSchema, Result,
    model::{Message, Model, Request, Role, ToolCall, ToolChoice},
};
use chain::{ChatModel, Strategy, bounded, complete, structured};
use compact_str::CompactString;
use futures_core::Stream;
use futures_util::future::{Either, join_all};
use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{
    OwnedMutexGuard,
    mpsc::{self, UnboundedSender},
};
use tokio_util::sync::CancellationToken;

/// Where a run stands.
#[derive(Debug, Clone)]
pub enum LoopState {
    /// The conversation is about to be sent to the model.
    AwaitingModel,
    /// The last reply requested these tool calls.
    AwaitingTools(SmallVec<[ToolCall; 4]>),
    /// The last assistant message is the final answer.
    Done,
    Failed(Error),
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Done | LoopState::Failed(_))
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Continue this thread: load its checkpoint first and save it after.
    pub thread_id: Option<CompactString>,
    /// Caller record handed to every tool.
    pub context: Value,
    /// Observer for tool progress.
    pub progress: Option<UnboundedSender<Progress>>,
    pub cancel: Option<CancellationToken>,
}

impl RunConfig {
    /// Options continuing `thread`.
    pub fn thread(id: impl Into<CompactString>) -> Self {
        Self {
            thread_id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_progress(mut self, tx: UnboundedSender<Progress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Full history, including earlier runs on the same thread.
    pub messages: Vec<Message>,
    /// The final assistant message.
    pub answer: Message,
    /// The coerced answer when the agent has a response format.
    pub structured: Option<Value>,
    /// Model calls made by this run.
    pub iterations: usize,
}

impl RunOutput {
    /// Text of the final answer.
    pub fn text(&self) -> &str {
        &self.answer.content
    }
}

/// A failed run, with the history as it stood at the failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("agent run failed: {error}")]
pub struct RunError {
    #[source]
    pub error: Error,
    pub messages: Vec<Message>,
    pub thread_id: Option<CompactString>,
}

/// Items of [`Runtime::stream`].
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// A message the loop appended (model reply or tool result).
    Message(Message),
    Done(RunOutput),
}

/// How the final answer is coerced, settled once per run.
enum Coercion {
    None,
    Tool(OutputSchema),
    Provider(OutputSchema),
}

impl Coercion {
    fn schema_tool(&self) -> Option<&OutputSchema> {
        match self {
            Coercion::Tool(schema) => Some(schema),
            _ => None,
        }
    }
}

/// Mutable state of one run.
struct Turn<'a> {
    config: &'a RunConfig,
    messages: Vec<Message>,
    events: Option<UnboundedSender<Message>>,
    iterations: usize,
    rejections: usize,
    structured: Option<Value>,
}

impl Turn<'_> {
    fn push(&mut self, message: Message) {
        if let Some(tx) = &self.events {
            tx.send(message.clone()).ok();
        }
        self.messages.push(message);
    }

    fn answer(&self) -> Result<Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned()
            .ok_or_else(|| Error::Request("run finished without an assistant message".into()))
    }
}

type ThreadLocks = Mutex<HashMap<CompactString, Arc<tokio::sync::Mutex<()>>>>;

/// The single-writer lock of one thread.
///
/// Dropping it removes the thread's entry once no other run holds or waits
/// on the lock.
struct ThreadLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a ThreadLocks,
    thread: CompactString,
}

impl Drop for ThreadLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        if locks
            .get(&self.thread)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.thread);
        }
    }
}

/// Answer every tool call of the last assistant message that has no tool
/// message yet, so the history stays valid for the next request.
fn close_open_calls(messages: &mut Vec<Message>, error: &Error) {
    let Some(pos) = messages
        .iter()
        .rposition(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
    else {
        return;
    };

    let answered: Vec<&str> = messages[pos + 1..]
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.tool_call_id.as_str())
        .collect();
    let open: Vec<CompactString> = messages[pos]
        .tool_calls
        .iter()
        .filter(|call| !answered.contains(&call.id.as_str()))
        .map(|call| call.id.clone())
        .collect();
    for id in open {
        messages.push(Message::tool(format!("Error: {error}"), id));
    }
}

/// Drives an [`Agent`] against a model, its tools and a checkpoint store.
pub struct Runtime<M, C = ()> {
    chat: ChatModel<M>,
    agent: Agent,
    tools: ToolSet,
    middleware: Vec<Arc<dyn Middleware>>,
    checkpointer: C,
    locks: ThreadLocks,
}

impl<M: Model + Send + Sync + 'static> Runtime<M> {
    /// A runtime with no tools, no middleware and no checkpoint store.
    pub fn new(chat: ChatModel<M>, agent: Agent) -> Self {
        Self {
            chat,
            agent,
            tools: ToolSet::new(),
            middleware: Vec::new(),
            checkpointer: (),
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<M: Model + Send + Sync + 'static, C: Checkpointer> Runtime<M, C> {
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Append a middleware. Middleware runs in the order added.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Replace the checkpoint store.
    pub fn with_checkpointer<D: Checkpointer>(self, checkpointer: D) -> Runtime<M, D> {
        Runtime {
            chat: self.chat,
            agent: self.agent,
            tools: self.tools,
            middleware: self.middleware,
            checkpointer,
            locks: self.locks,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn checkpointer(&self) -> &C {
        &self.checkpointer
    }

    /// Run the loop on `input` until a terminal state.
    pub async fn run(
        &self,
        input: Vec<Message>,
        config: RunConfig,
    ) -> std::result::Result<RunOutput, RunError> {
        self.execute(input, config, None).await
    }

    /// Like [`Runtime::run`], yielding each appended message as it happens
    /// and the output last.
    pub fn stream<'a>(
        &'a self,
        input: Vec<Message>,
        config: RunConfig,
    ) -> impl Stream<Item = std::result::Result<AgentEvent, RunError>> + Send + 'a {
        async_stream::stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let run = self.execute(input, config, Some(tx));
            futures_util::pin_mut!(run);

            let outcome = loop {
                let next = tokio::select! {
                    biased;
                    Some(message) = rx.recv() => Either::Left(message),
                    outcome = &mut run => Either::Right(outcome),
                };
                match next {
                    Either::Left(message) => yield Ok(AgentEvent::Message(message)),
                    Either::Right(outcome) => break outcome,
                }
            };

            while let Ok(message) = rx.try_recv() {
                yield Ok(AgentEvent::Message(message));
            }
            yield outcome.map(AgentEvent::Done);
        }
    }

    /// Threads with a run in progress or queued.
    pub fn active_threads(&self) -> usize {
        self.locks.lock().len()
    }

    /// Hold the single-writer lock of `thread`.
    async fn lock(&self, thread: &str) -> ThreadLock<'_> {
        let lock = self.locks.lock().entry(thread.into()).or_default().clone();
        ThreadLock {
            guard: Some(lock.lock_owned().await),
            locks: &self.locks,
            thread: thread.into(),
        }
    }

    fn coercion(&self) -> Result<Coercion> {
        let Some((schema, strategy)) = &self.agent.response_format else {
            return Ok(Coercion::None);
        };
        let native = self.chat.provider().native_structured_output();
        Ok(match strategy.resolve(native)? {
            Strategy::Provider => Coercion::Provider(schema.clone()),
            _ => Coercion::Tool(schema.clone()),
        })
    }

    async fn execute(
        &self,
        input: Vec<Message>,
        config: RunConfig,
        events: Option<UnboundedSender<Message>>,
    ) -> std::result::Result<RunOutput, RunError> {
        let thread = config.thread_id.clone();
        let _guard = match &thread {
            Some(id) => Some(self.lock(id).await),
            None => None,
        };
        let fail = |error: Error, messages: Vec<Message>| RunError {
            error,
            messages,
            thread_id: thread.clone(),
        };

        let mut checkpoint = match &thread {
            Some(id) => match self.checkpointer.load(id).await {
                Ok(saved) => saved.unwrap_or_default(),
                Err(error) => return Err(fail(error, input)),
            },
            None => Checkpoint::default(),
        };

        let mut turn = Turn {
            config: &config,
            messages: std::mem::take(&mut checkpoint.messages),
            events,
            iterations: 0,
            rejections: 0,
            structured: None,
        };
        turn.messages.extend(input);
        tracing::debug!(
            agent = %self.agent.name,
            thread = ?thread,
            history = turn.messages.len(),
            "run started"
        );

        let outcome = match self.coercion() {
            Ok(coercion) => self.drive(&mut turn, &coercion).await,
            Err(error) => Err(error),
        };
        if let Err(error) = &outcome {
            close_open_calls(&mut turn.messages, error);
        }

        if let Some(id) = &thread {
            checkpoint.messages = turn.messages.clone();
            checkpoint.steps += 1;
            if let Some(value) = &turn.structured {
                checkpoint
                    .state
                    .insert(STRUCTURED_RESPONSE.into(), value.clone());
            }
            if let Err(error) = self.checkpointer.save(id, checkpoint).await {
                if outcome.is_ok() {
                    return Err(fail(error, turn.messages));
                }
                tracing::warn!(%error, thread = %id, "checkpoint not saved");
            }
        }

        match outcome {
            Ok(answer) => Ok(RunOutput {
                messages: turn.messages,
                answer,
                structured: turn.structured,
                iterations: turn.iterations,
            }),
            Err(error) => {
                tracing::warn!(agent = %self.agent.name, %error, "run failed");
                Err(fail(error, turn.messages))
            }
        }
    }

    /// Step the state machine until it reaches a terminal state.
    async fn drive(&self, turn: &mut Turn<'_>, coercion: &Coercion) -> Result<Message> {
        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::AwaitingModel => self
                    .await_model(turn, coercion)
                    .await
                    .unwrap_or_else(LoopState::Failed),
                LoopState::AwaitingTools(calls) => self
                    .await_tools(turn, coercion, calls)
                    .await
                    .unwrap_or_else(LoopState::Failed),
                LoopState::Done => return turn.answer(),
                LoopState::Failed(error) => return Err(error),
            };
        }
    }

    async fn await_model(&self, turn: &mut Turn<'_>, coercion: &Coercion) -> Result<LoopState> {
        let limit = self.agent.max_iterations;
        if turn.iterations >= limit {
            return Err(Error::BudgetExceeded { limit });
        }
        turn.iterations += 1;

        let request = self.request(&turn.messages, coercion).await?;
        let reply = complete(self.chat.provider(), &request, turn.config.cancel.as_ref()).await?;
        tracing::debug!(
            agent = %self.agent.name,
            iteration = turn.iterations,
            tool_calls = reply.tool_calls.len(),
            "model replied"
        );

        let calls = reply.tool_calls.clone();
        let content = reply.content.clone();
        turn.push(reply);
        if !calls.is_empty() {
            return Ok(LoopState::AwaitingTools(calls));
        }

        match coercion {
            Coercion::None => Ok(LoopState::Done),
            Coercion::Provider(schema) => match structured::check_answer(schema, &content) {
                Ok(value) => {
                    turn.structured = Some(value);
                    Ok(LoopState::Done)
                }
                Err(errors) => self.reject(turn, schema, errors, content, None),
            },
            Coercion::Tool(schema) => {
                let errors = vec![FieldError::new(
                    "$",
                    format!("expected a call to the {} tool", schema.name),
                )];
                self.reject(turn, schema, errors, content, None)
            }
        }
    }

    async fn await_tools(
        &self,
        turn: &mut Turn<'_>,
        coercion: &Coercion,
        calls: SmallVec<[ToolCall; 4]>,
    ) -> Result<LoopState> {
        let schema = coercion.schema_tool();
        let is_schema = |call: &ToolCall| schema.is_some_and(|s| s.name == call.function.name);

        for call in calls.iter().filter(|&c| !is_schema(c)) {
            let name = &call.function.name;
            if !self.agent.tools.contains(name) || !self.tools.contains(name) {
                return Err(Error::UnknownTool(name.clone()));
            }
        }

        let requested: Vec<&ToolCall> = calls.iter().filter(|&c| !is_schema(c)).collect();
        let mut results = self.dispatch(turn, &requested).await?.into_iter();

        let mut next = LoopState::AwaitingModel;
        for call in &calls {
            let Some(schema) = schema.filter(|_| is_schema(call)) else {
                if let Some(message) = results.next() {
                    turn.push(message);
                }
                continue;
            };

            match structured::check_arguments(schema, call) {
                Ok(value) => {
                    turn.push(Message::tool(
                        format!("Returning structured response: {value}"),
                        call.id.clone(),
                    ));
                    if turn.structured.is_none() {
                        turn.structured = Some(value);
                    }
                    next = LoopState::Done;
                }
                Err(errors) => {
                    let raw = call.function.arguments.clone();
                    self.reject(turn, schema, errors, raw, Some(&call.id))?;
                }
            }
        }
        Ok(next)
    }

    /// Record a rejected structured answer: one corrective follow-up, then
    /// a validation failure.
    fn reject(
        &self,
        turn: &mut Turn<'_>,
        schema: &OutputSchema,
        errors: Vec<FieldError>,
        raw: String,
        call_id: Option<&CompactString>,
    ) -> Result<LoopState> {
        turn.rejections += 1;
        tracing::debug!(attempt = turn.rejections, errors = errors.len(), "structured answer rejected");
        if turn.rejections >= structured::ATTEMPTS {
            return Err(Error::Validation { errors, raw });
        }

        let text = structured::retry_prompt(schema, &errors);
        turn.push(match call_id {
            Some(id) => Message::tool(text, id.clone()),
            None => Message::user(text),
        });
        Ok(LoopState::AwaitingModel)
    }

    /// Execute `calls`, returning one tool message per call in request order.
    async fn dispatch(&self, turn: &Turn<'_>, calls: &[&ToolCall]) -> Result<Vec<Message>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let config = turn.config;
        let snapshot: Arc<[Message]> = Arc::from(turn.messages.clone());
        let context = |call: &ToolCall| ToolContext {
            messages: snapshot.clone(),
            context: config.context.clone(),
            thread_id: config.thread_id.clone(),
            call_id: call.id.clone(),
            progress: ProgressSender::new(
                config.progress.clone(),
                call.function.name.clone(),
                call.id.clone(),
            ),
        };

        let cancel = config.cancel.as_ref();
        let outcomes = if self.agent.parallel_tools {
            let runs = calls
                .iter()
                .copied()
                .map(|call| self.tools.call(call, context(call)));
            bounded(join_all(runs), None, cancel).await?
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in calls.iter().copied() {
                outcomes.push(bounded(self.tools.call(call, context(call)), None, cancel).await?);
            }
            outcomes
        };

        calls
            .iter()
            .zip(outcomes)
            .map(|(call, outcome)| self.tool_message(call, outcome))
            .collect()
    }

    fn tool_message(
        &self,
        call: &ToolCall,
        outcome: std::result::Result<Value, ToolError>,
    ) -> Result<Message> {
        let name = call.function.name.as_str();
        match outcome {
            Ok(value) => Ok(Message::tool(render(&value), call.id.clone())),
            Err(error) if error.is_fatal() => Err(error.into_error(name)),
            Err(error) => {
                tracing::warn!(tool = name, %error, "tool failed");
                let text = self
                    .middleware
                    .iter()
                    .find_map(|m| m.tool_error(call, &error))
                    .unwrap_or_else(|| format!("Error: {error}"));
                Ok(Message::tool(text, call.id.clone()))
            }
        }
    }

    /// The request for the next model call.
    ///
    /// The system prompt is prepended here and never stored. Reasoning text
    /// is only resent with messages that requested tools.
    async fn request(&self, history: &[Message], coercion: &Coercion) -> Result<Request> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !self.agent.system_prompt.is_empty() {
            messages.push(Message::system(self.agent.system_prompt.clone()));
        }
        messages.extend(history.iter().cloned().map(|mut m| {
            if m.tool_calls.is_empty() {
                m.reasoning_content = String::new();
            }
            m
        }));

        let mut request = self.chat.request(messages);
        let mut tools = self.tools.resolve(&self.agent.tools);
        match coercion {
            Coercion::Tool(schema) => {
                tools.push(structured::schema_tool(schema));
                request.tool_choice = Some(ToolChoice::Required);
            }
            Coercion::Provider(schema) => {
                request.response_format = Some(structured::response_format(schema));
            }
            Coercion::None => {}
        }
        if !tools.is_empty() {
            request.tools = Some(tools);
        }

        for middleware in &self.middleware {
            request = middleware.wrap_request(request).await?;
        }
        Ok(request)
    }
}
