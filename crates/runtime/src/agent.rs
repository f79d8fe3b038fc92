//! Agent configuration.
//!
//! An [`Agent`] is pure config: name, system prompt, tool names and loop
//! limits. Tool handlers live in the [`ToolSet`](crate::ToolSet) the
//! runtime is built with.

use bcore::OutputSchema;
use chain::Strategy;
use compact_str::CompactString;
use smallvec::SmallVec;

/// Model calls allowed per run unless configured otherwise.
pub const DEFAULT_MAX_ITERATIONS: usize = 16;

/// An agent configuration.
#[derive(Debug, Clone)]
pub struct Agent {
    /// Agent identifier, used in logs.
    pub name: CompactString,
    /// System prompt sent before each model request. Never stored in the
    /// conversation.
    pub system_prompt: String,
    /// Names of tools this agent can use (resolved by the runtime).
    pub tools: SmallVec<[CompactString; 8]>,
    /// Upper bound on model calls in one run.
    pub max_iterations: usize,
    /// Run the tools of one round concurrently.
    pub parallel_tools: bool,
    /// Coerce the final answer into a schema.
    pub response_format: Option<(OutputSchema, Strategy)>,
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: CompactString::default(),
            system_prompt: String::new(),
            tools: SmallVec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            parallel_tools: true,
            response_format: None,
        }
    }
}

impl Agent {
    /// Create a new agent with the given name.
    pub fn new(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the system prompt.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Add a tool by name.
    pub fn tool(mut self, name: impl Into<CompactString>) -> Self {
        self.tools.push(name.into());
        self
    }

    pub fn max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    /// Run tools one after another, in request order.
    pub fn sequential_tools(mut self) -> Self {
        self.parallel_tools = false;
        self
    }

    /// Coerce the final answer into `schema`.
    pub fn response_format(mut self, schema: OutputSchema, strategy: Strategy) -> Self {
        self.response_format = Some((schema, strategy));
        self
    }
}
