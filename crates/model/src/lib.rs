//! OpenAI-compatible model providers for braid.
//!
//! [`HttpProvider`] is the shared transport, [`OpenAI`] implements
//! [`bcore::model::Model`] on top of it and [`ProviderConfig`] describes an
//! endpoint as it appears in configuration files.

pub use config::{ProviderConfig, expand_env_vars};
pub use http::{HttpProvider, SseBuffer};
pub use openai::{OpenAI, completions_url, endpoint};
pub use reqwest::Client;

mod config;
mod http;
mod openai;
pub mod request;
