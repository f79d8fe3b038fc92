//! Composable pipelines over chat models.
//!
//! Every stage implements [`Runnable`]: prompt templates, the model call,
//! output parsers, lambdas, branches and sequences of all of these. A
//! pipeline can be invoked once, streamed fragment by fragment, or run over
//! a batch of inputs with bounded concurrency.

pub use branch::Branch;
pub use chat::{CallConfig, ChatModel, bounded, complete};
pub use data::Data;
pub use lambda::{Assign, Lambda, Passthrough};
pub use parser::{JsonOutputParser, ListOutputParser, StrOutputParser, extract_json};
pub use prompt::{ChatPromptTemplate, PromptTemplate};
pub use runnable::{BatchOptions, DataStream, Runnable, RunnableExt};
pub use sequence::Sequence;
pub use structured::{Strategy, StructuredOutput};

mod branch;
mod chat;
mod data;
mod lambda;
mod parser;
mod prompt;
mod runnable;
mod sequence;
pub mod structured;
