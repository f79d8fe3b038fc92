//! Braid runtime: the tool-calling agent loop.
//!
//! The [`Runtime`] drives an [`Agent`] against a chat model. It holds the
//! tool handlers, the middleware stack and the checkpoint store, and keeps
//! one writer per conversation thread.
//!
//! # Example
//!
//! ```rust,ignore
//! use braid_runtime::{Agent, InMemoryCheckpointer, RunConfig, Runtime, ToolSet};
//! use chain::ChatModel;
//!
//! let mut tools = ToolSet::new();
//! tools.register_typed::<Compare, _, _>("compare", "Compare two numbers", compare);
//! let runtime = Runtime::new(ChatModel::new(model), Agent::new("assistant").tool("compare"))
//!     .with_tools(tools)
//!     .with_checkpointer(InMemoryCheckpointer::new());
//! let out = runtime.run(vec![Message::user("is 1.9 > 1.11?")], RunConfig::thread("1")).await?;
//! ```

pub use agent::{Agent, DEFAULT_MAX_ITERATIONS};
pub use checkpoint::{Checkpoint, Checkpointer, InMemoryCheckpointer, STRUCTURED_RESPONSE};
pub use middleware::{
    Complexity, Middleware, SUMMARY_PROMPT, SelectModel, Summarize, ToolErrorMessage,
};
pub use progress::{Progress, ProgressSender};
pub use runtime::{AgentEvent, LoopState, RunConfig, RunError, RunOutput, Runtime};
pub use tool::{Handler, ToolContext, ToolError, ToolSet, render};

mod agent;
mod checkpoint;
mod middleware;
mod progress;
mod runtime;
mod tool;
