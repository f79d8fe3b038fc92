//! Tool registry and the context handed to tool handlers.

use crate::progress::ProgressSender;
use bcore::{
    Error, FieldError, OutputSchema,
    model::{Message, Tool, ToolCall},
};
use compact_str::CompactString;
use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{collections::BTreeMap, future::Future, sync::Arc};

/// A tool failure.
///
/// `Failed` and `InvalidArguments` are reported back to the model as a tool
/// message so it can correct itself. `Fatal` ends the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Fatal(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Convert into the crate-wide error, attributing it to `tool`.
    pub fn into_error(self, tool: &str) -> Error {
        match self {
            Self::Fatal(message) => Error::FatalTool {
                tool: tool.into(),
                message,
            },
            other => Error::ToolExecution {
                tool: tool.into(),
                message: other.to_string(),
            },
        }
    }

    fn from_fields(errors: &[FieldError]) -> Self {
        let listed = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::InvalidArguments(listed)
    }
}

/// What a tool sees besides its arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// The conversation up to and including the requesting message.
    pub messages: Arc<[Message]>,
    /// Caller-supplied context record, `Null` when none was given.
    pub context: Value,
    /// Thread the run belongs to, if any.
    pub thread_id: Option<CompactString>,
    /// Id of the call being executed.
    pub call_id: CompactString,
    pub progress: ProgressSender,
}

impl ToolContext {
    /// A context with no conversation, caller record or observer.
    pub fn detached(call_id: impl Into<CompactString>) -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            context: Value::Null,
            thread_id: None,
            call_id: call_id.into(),
            progress: ProgressSender::disconnected(),
        }
    }
}

/// A type-erased async tool handler.
pub type Handler = Arc<
    dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync,
>;

#[derive(Clone)]
struct Entry {
    tool: Tool,
    schema: Option<OutputSchema>,
    handler: Handler,
}

/// Named tools with their handlers.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<CompactString, Entry>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool with its handler. Arguments reach the handler as
    /// parsed JSON, unchecked.
    pub fn register<F, Fut>(&mut self, tool: Tool, handler: F)
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.insert(tool, None, handler);
    }

    /// Register a tool whose arguments are checked against `schema` before
    /// the handler runs.
    pub fn register_schema<F, Fut>(
        &mut self,
        name: impl Into<CompactString>,
        description: impl Into<String>,
        schema: OutputSchema,
        handler: F,
    ) where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let tool = Tool::from_schema(name, description, &schema);
        self.insert(tool, Some(schema), handler);
    }

    /// Register a tool taking `T` as its arguments.
    pub fn register_typed<T, F, Fut>(
        &mut self,
        name: impl Into<CompactString>,
        description: impl Into<String>,
        handler: F,
    ) where
        T: JsonSchema + DeserializeOwned + Send + 'static,
        F: Fn(T, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let tool = Tool::typed::<T>(name, description);
        let handler = Arc::new(handler);
        self.insert(tool, None, move |args: Value, ctx: ToolContext| {
            let handler = handler.clone();
            async move {
                let args = serde_json::from_value::<T>(args)
                    .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
                handler(args, ctx).await
            }
        });
    }

    fn insert<F, Fut>(&mut self, tool: Tool, schema: Option<OutputSchema>, handler: F)
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        let name = tool.name.clone();
        let handler: Handler = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        if self
            .tools
            .insert(
                name.clone(),
                Entry {
                    tool,
                    schema,
                    handler,
                },
            )
            .is_some()
        {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// The declaration of `name`.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name).map(|entry| &entry.tool)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(CompactString::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations for `names`, skipping unregistered ones.
    pub fn resolve(&self, names: &[CompactString]) -> Vec<Tool> {
        names
            .iter()
            .filter_map(|name| self.get(name))
            .cloned()
            .collect()
    }

    /// Execute `call`. The tool must be registered.
    pub async fn call(&self, call: &ToolCall, ctx: ToolContext) -> Result<Value, ToolError> {
        let name = call.function.name.as_str();
        let Some(entry) = self.tools.get(name) else {
            return Err(ToolError::fatal(format!("tool {name} is not registered")));
        };

        let args = call
            .parse_arguments()
            .map_err(|e| ToolError::InvalidArguments(format!("arguments are not JSON: {e}")))?;
        let args = match &entry.schema {
            Some(schema) => schema
                .validate(&args)
                .map_err(|errors| ToolError::from_fields(&errors))?,
            None => args,
        };

        tracing::debug!(tool = name, call = %call.id, "tool call");
        (entry.handler)(args, ctx).await
    }

    /// Run tool `name` outside an agent loop.
    pub async fn invoke(&self, name: &str, args: Value) -> bcore::Result<Value> {
        if !self.contains(name) {
            return Err(Error::UnknownTool(name.into()));
        }
        let call = ToolCall::function("direct", name, args.to_string());
        self.call(&call, ToolContext::detached("direct"))
            .await
            .map_err(|e| e.into_error(name))
    }
}

/// Render a tool result as message text. Strings stay raw.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
