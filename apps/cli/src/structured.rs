//! Structured output command

use crate::Settings;
use anyhow::Result;
use bcore::OutputSchema;
use chain::{Strategy, StructuredOutput};
use clap::{Args, ValueEnum};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A person mentioned in free text
#[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Person {
    /// Full name
    pub name: String,
    /// Age in years
    pub age: Option<u32>,
    /// City the person lives in
    pub city: Option<String>,
}

/// How the model is made to answer in JSON
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum StrategyArg {
    /// Native response format when supported, a schema tool otherwise
    #[default]
    Auto,
    /// The provider's native response format
    Provider,
    /// A forced call to a schema tool
    Tool,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => Strategy::Auto,
            StrategyArg::Provider => Strategy::Provider,
            StrategyArg::Tool => Strategy::Tool,
        }
    }
}

/// Structured command arguments
#[derive(Debug, Args)]
pub struct StructuredCmd {
    /// The coercion strategy
    #[arg(long, value_enum, default_value_t)]
    pub strategy: StrategyArg,

    /// Text describing a person
    pub text: String,
}

impl StructuredCmd {
    /// Extract a [`Person`] from the text
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let extract = StructuredOutput::new(
            settings.chat()?,
            OutputSchema::of::<Person>(),
            self.strategy.into(),
        );
        let person: Person = extract.invoke_as(self.text.as_str()).await?;
        println!("{}", serde_json::to_string_pretty(&person)?);
        Ok(())
    }
}
