//! Error taxonomy shared by chains and the agent loop.

use crate::schema::FieldError;
use compact_str::CompactString;
use std::time::Duration;

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by pipelines, structured output and the agent loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network, provider-side or transport failure.
    #[error("request failed: {0}")]
    Request(String),

    /// An outbound call exceeded its time bound.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled by its caller.
    #[error("cancelled")]
    Cancelled,

    /// Structured output did not match its schema after the retry.
    #[error("output failed validation: {}", join_errors(.errors))]
    Validation {
        /// Field-level errors of the last attempt
        errors: Vec<FieldError>,
        /// The raw model text of the last attempt
        raw: String,
    },

    /// A template could not be parsed or rendered.
    #[error("format error: {0}")]
    Format(String),

    /// Model output could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The model asked for a tool that is not registered.
    #[error("unknown tool: {0}")]
    UnknownTool(CompactString),

    /// A recoverable tool failure.
    #[error("tool {tool} failed: {message}")]
    ToolExecution {
        /// Tool name
        tool: CompactString,
        /// Failure description
        message: String,
    },

    /// A tool failure that aborts the run.
    #[error("tool {tool} failed fatally: {message}")]
    FatalTool {
        /// Tool name
        tool: CompactString,
        /// Failure description
        message: String,
    },

    /// The iteration cap was reached before a final answer.
    #[error("iteration budget of {limit} model calls exhausted")]
    BudgetExceeded {
        /// Configured cap
        limit: usize,
    },

    /// The model does not support the requested feature.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The checkpoint store failed.
    #[error("checkpoint store: {0}")]
    Checkpoint(String),

    /// A pipeline stage failed.
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        /// Name of the failing stage
        stage: CompactString,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Map a provider error into a request error.
    pub fn request(err: anyhow::Error) -> Self {
        Self::Request(format!("{err:#}"))
    }

    /// Attribute this error to `stage`, unless it already names one.
    pub fn in_stage(self, stage: impl Into<CompactString>) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage attribution.
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The failing stage name, if attributed.
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
