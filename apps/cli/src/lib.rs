//! braid CLI

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use std::{io::Write, path::PathBuf};
use tracing_subscriber::{EnvFilter, fmt};
pub use {
    agent::{AgentAnswer, AgentCmd, MemoryCmd},
    config::Settings,
    pipeline::{BatchCmd, BranchCmd, ChainCmd, InvokeCmd, PromptCmd, Translation},
    structured::{Person, StrategyArg, StructuredCmd},
    tools::{ToolsCmd, agent_tools, review_tools},
};

mod agent;
mod config;
mod pipeline;
mod structured;
mod tools;

/// braid CLI
#[derive(Debug, Parser)]
#[command(name = "braid", version, about)]
pub struct App {
    /// Stream replies as they are generated
    #[arg(short, long, global = true)]
    pub stream: bool,

    /// Configuration file (defaults to ./braid.toml, then BRAID_* variables)
    #[arg(short, long, global = true, env = "BRAID_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (use -v, -vv, -vvv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message to the model
    Invoke(InvokeCmd),

    /// Answer several questions concurrently
    Batch(BatchCmd),

    /// Render a prompt template without calling the model
    Prompt(PromptCmd),

    /// Translate text with a prompt, model and parser chain
    Chain(ChainCmd),

    /// Route a question to a specialist chain
    Branch(BranchCmd),

    /// Let the model call tools, executing them by hand
    Tools(ToolsCmd),

    /// Extract a typed record from free text
    Structured(StructuredCmd),

    /// Chat with a summarizing, checkpointed memory
    Memory(MemoryCmd),

    /// Run the tool-calling agent
    Agent(AgentCmd),
}

impl App {
    /// Initialize tracing subscriber based on verbosity
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let directive = match self.verbose {
                0 => "info",
                1 => "braid_cli=debug,braid_runtime=debug,braid_chain=debug",
                2 => "braid_cli=trace,braid_runtime=trace,braid_chain=trace",
                3 => "debug",
                _ => "trace",
            };
            EnvFilter::new(directive)
        });

        fmt()
            .without_time()
            .with_env_filter(filter)
            .with_target(self.verbose != 0)
            .init();
    }

    /// Load the settings named by `--config`, `braid.toml` or the environment
    pub fn settings(&self) -> Result<Settings> {
        Settings::load(self.config.as_deref())
    }

    /// Run the selected command
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        match &self.command {
            Command::Invoke(cmd) => cmd.run(settings, self.stream).await,
            Command::Batch(cmd) => cmd.run(settings).await,
            Command::Prompt(cmd) => cmd.run(),
            Command::Chain(cmd) => cmd.run(settings, self.stream).await,
            Command::Branch(cmd) => cmd.run(settings).await,
            Command::Tools(cmd) => cmd.run(settings).await,
            Command::Structured(cmd) => cmd.run(settings).await,
            Command::Memory(cmd) => cmd.run(settings).await,
            Command::Agent(cmd) => cmd.run(settings, self.stream).await,
        }
    }
}

/// Print a stream of pipeline fragments as they arrive.
async fn print_stream(mut fragments: chain::DataStream<'_>) -> Result<()> {
    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        print!("{}", fragment?);
        stdout.flush()?;
    }
    println!();
    Ok(())
}
