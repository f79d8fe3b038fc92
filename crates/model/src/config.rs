//! Provider configuration.
//!
//! One flat record per endpoint, as it appears in TOML. String values may
//! reference environment variables as `${VAR}`; [`ProviderConfig::expand`]
//! substitutes them before validation.

use crate::openai::{OpenAI, endpoint};
use anyhow::{Context, Result, bail};
use compact_str::CompactString;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of one OpenAI-compatible endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Model identifier sent with every request.
    pub model: CompactString,
    /// Base URL or full chat-completions endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key. Empty means no authentication.
    #[serde(default)]
    pub api_key: String,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens per completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Whether the endpoint supports `json_schema` response formats.
    #[serde(default)]
    pub structured_output: bool,
}

impl ProviderConfig {
    /// A config for `model` at `base_url`, other fields defaulted.
    pub fn new(model: impl Into<CompactString>, base_url: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: String::new(),
            temperature: None,
            max_tokens: None,
            timeout_secs: default_timeout(),
            structured_output: false,
        }
    }

    /// Substitute `${VAR}` references in string fields.
    pub fn expand(mut self) -> Self {
        self.model = expand_env_vars(&self.model).into();
        self.base_url = expand_env_vars(&self.base_url);
        self.api_key = expand_env_vars(&self.api_key);
        self
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            bail!("model must not be empty");
        }
        let url = url::Url::parse(&self.base_url)
            .with_context(|| format!("invalid base_url {:?}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("base_url must be http or https, got {}", url.scheme());
        }
        if let Some(t) = self.temperature.filter(|t| !(0.0..=2.0).contains(t)) {
            bail!("temperature must be within 0.0..=2.0, got {t}");
        }
        if self.max_tokens == Some(0) {
            bail!("max_tokens must be positive");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be positive");
        }
        Ok(())
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the provider described by this config.
    pub fn build(&self, client: Client) -> Result<OpenAI> {
        self.validate()?;
        let provider = if self.api_key.is_empty() {
            OpenAI::no_auth(client, &self.base_url, &self.model)
        } else {
            OpenAI::custom(client, &self.api_key, &self.base_url, &self.model)?
        };
        Ok(provider.with_structured_output(self.structured_output))
    }
}

fn default_base_url() -> String {
    endpoint::OPENAI.to_owned()
}

fn default_timeout() -> u64 {
    60
}

/// Replace `${VAR}` with the value of the environment variable `VAR`.
///
/// Unset variables expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            if let Ok(val) = std::env::var(&var_name) {
                result.push_str(&val);
            }
        } else {
            result.push(ch);
        }
    }

    result
}
