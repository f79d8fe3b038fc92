//! Configuration for the CLI

use anyhow::{Context, Result, bail};
use bcore::model::Model;
use chain::ChatModel;
use compact_str::CompactString;
use model::{Client, OpenAI, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "braid.toml";

/// Settings of one run of the CLI.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// The endpoint every command talks to
    #[serde(flatten)]
    pub provider: ProviderConfig,

    /// Model for questions the router judges simple
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_model: Option<CompactString>,

    /// Model used to classify questions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_model: Option<CompactString>,
}

impl Settings {
    /// Load settings from `path`, `braid.toml` or the environment, in that
    /// order of preference.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()),
        };

        let settings = match file {
            Some(file) => {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                Self::from_toml(&text).with_context(|| format!("invalid {}", file.display()))?
            }
            None => Self::from_env(|name| std::env::var(name).ok())?,
        };
        tracing::debug!(model = %settings.provider.model, "settings loaded");
        Ok(settings)
    }

    /// Parse a TOML document. `${VAR}` references are expanded.
    pub fn from_toml(text: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text)?;
        settings.provider = settings.provider.expand();
        settings.validate()?;
        Ok(settings)
    }

    /// Read `BRAID_*` variables through `var`.
    pub fn from_env(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            var(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{name} is not set"))
        };

        let mut provider = ProviderConfig::new(required("BRAID_MODEL")?, required("BRAID_BASE_URL")?);
        provider.api_key = required("BRAID_API_KEY")?;
        provider.temperature = parse(&var, "BRAID_TEMPERATURE")?;
        provider.max_tokens = parse(&var, "BRAID_MAX_TOKENS")?;
        if let Some(secs) = parse(&var, "BRAID_TIMEOUT_SECS")? {
            provider.timeout_secs = secs;
        }
        if let Some(native) = parse(&var, "BRAID_STRUCTURED_OUTPUT")? {
            provider.structured_output = native;
        }

        let settings = Self {
            provider,
            fast_model: var("BRAID_FAST_MODEL").map(Into::into),
            router_model: var("BRAID_ROUTER_MODEL").map(Into::into),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        self.provider.validate()?;
        for (key, name) in [("fast_model", &self.fast_model), ("router_model", &self.router_model)] {
            if name.as_ref().is_some_and(|n| n.trim().is_empty()) {
                bail!("{key} must not be empty");
            }
        }
        Ok(())
    }

    /// The configured chat model with sampling and timeout applied.
    pub fn chat(&self) -> Result<ChatModel<OpenAI>> {
        let provider = self.provider.build(Client::new())?;
        Ok(self.configure(ChatModel::new(provider)))
    }

    /// Apply the configured sampling options and timeout to `chat`.
    pub fn configure<M: Model + Send + Sync + 'static>(&self, chat: ChatModel<M>) -> ChatModel<M> {
        let mut chat = chat.with_timeout(self.provider.timeout());
        if let Some(temperature) = self.provider.temperature {
            chat = chat.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.provider.max_tokens {
            chat = chat.with_max_tokens(max_tokens);
        }
        chat
    }

    /// Model for simple questions, defaulting to the main model.
    pub fn fast_model(&self) -> &str {
        self.fast_model.as_deref().unwrap_or(self.provider.model.as_str())
    }

    /// Model used for routing, defaulting to the fast model.
    pub fn router_model(&self) -> &str {
        self.router_model.as_deref().unwrap_or_else(|| self.fast_model())
    }
}

fn parse<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match var(name).filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{name}: invalid value {value:?}: {e}")),
        None => Ok(None),
    }
}
