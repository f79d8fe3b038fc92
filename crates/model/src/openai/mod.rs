//! OpenAI-compatible chat provider.
//!
//! Any backend speaking the chat-completions protocol (OpenAI, SiliconFlow,
//! DeepSeek, Ollama) is driven through [`OpenAI`]; only the endpoint and the
//! credentials differ.

use crate::http::HttpProvider;
use anyhow::Result;
use compact_str::CompactString;
use reqwest::Client;

mod provider;

/// OpenAI-compatible endpoint URLs.
pub mod endpoint {
    /// OpenAI chat completions.
    pub const OPENAI: &str = "https://api.openai.com/v1/chat/completions";
    /// SiliconFlow chat completions.
    pub const SILICONFLOW: &str = "https://api.siliconflow.cn/v1/chat/completions";
    /// DeepSeek chat completions.
    pub const DEEPSEEK: &str = "https://api.deepseek.com/chat/completions";
    /// Ollama local chat completions.
    pub const OLLAMA: &str = "http://localhost:11434/v1/chat/completions";
}

/// An OpenAI-compatible LLM provider bound to one default model.
#[derive(Clone)]
pub struct OpenAI {
    /// Shared HTTP transport.
    http: HttpProvider,
    /// Model used when a request leaves `model` empty.
    model: CompactString,
    /// Whether the backend honours `json_schema` response formats.
    structured: bool,
}

impl OpenAI {
    /// Create a provider against the official OpenAI API.
    pub fn api(client: Client, key: &str, model: &str) -> Result<Self> {
        Self::custom(client, key, endpoint::OPENAI, model)
    }

    /// Create a provider against any chat-completions endpoint.
    ///
    /// `base` may be the full endpoint or a base URL such as
    /// `https://api.siliconflow.cn/v1`.
    pub fn custom(client: Client, key: &str, base: &str, model: &str) -> Result<Self> {
        Ok(Self {
            http: HttpProvider::bearer(client, key, &completions_url(base))?,
            model: model.into(),
            structured: false,
        })
    }

    /// Create a provider for a local endpoint without authentication.
    pub fn no_auth(client: Client, base: &str, model: &str) -> Self {
        Self {
            http: HttpProvider::no_auth(client, &completions_url(base)),
            model: model.into(),
            structured: false,
        }
    }

    /// Declare provider-native structured output support.
    pub fn with_structured_output(mut self, supported: bool) -> Self {
        self.structured = supported;
        self
    }

    /// The endpoint requests are posted to.
    pub fn endpoint(&self) -> &str {
        self.http.endpoint()
    }
}

/// Resolve a base URL to its chat-completions endpoint.
pub fn completions_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_owned()
    } else {
        format!("{base}/chat/completions")
    }
}
