//! Agent and memory commands

use crate::{Settings, tools::agent_tools};
use anyhow::Result;
use bcore::{
    OutputSchema,
    model::{Message, Model, Role},
};
use chain::Strategy;
use clap::Args;
use futures_util::StreamExt;
use runtime::{
    Agent, AgentEvent, Checkpointer, InMemoryCheckpointer, Progress, RunConfig, RunOutput,
    Runtime, SelectModel, Summarize, ToolErrorMessage,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const AGENT_PROMPT: &str = "You are a helpful assistant. Use the tools to look up facts \
about the user and to compare numbers instead of guessing.";

/// Final answer of the agent when `--structured` is given
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AgentAnswer {
    /// The answer to the question
    pub answer: String,
    /// The larger of the compared numbers, if any were compared
    pub larger: Option<f64>,
}

/// Agent command arguments
#[derive(Debug, Args)]
pub struct AgentCmd {
    /// Id of the user the tools act for
    #[arg(long, default_value = "1")]
    pub user_id: String,

    /// Coerce the final answer into JSON
    #[arg(long)]
    pub structured: bool,

    /// Model calls allowed in one run
    #[arg(long, default_value_t = runtime::DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// The question to answer
    #[arg(default_value = "Which city do I live in, and which is larger, 9.11 or 9.9?")]
    pub question: String,
}

impl AgentCmd {
    /// Run the agent on the question
    pub async fn run(&self, settings: &Settings, stream: bool) -> Result<()> {
        let mut agent = Agent::new("assistant")
            .system_prompt(AGENT_PROMPT)
            .tool("compare_two_numbers")
            .tool("user_location")
            .max_iterations(self.max_iterations);
        if self.structured {
            agent = agent.response_format(OutputSchema::of::<AgentAnswer>(), Strategy::Auto);
        }

        let mut runtime = Runtime::new(settings.chat()?, agent)
            .with_tools(agent_tools())
            .with_middleware(ToolErrorMessage);
        if settings.fast_model.is_some() {
            let router = settings.chat()?.with_model(settings.router_model());
            runtime = runtime.with_middleware(SelectModel::new(
                router,
                settings.fast_model(),
                settings.provider.model.clone(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(print_progress(rx));
        let config = RunConfig::default()
            .with_context(json!({ "user_id": self.user_id }))
            .with_progress(tx)
            .with_cancellation(cancel_on_ctrl_c());

        let input = vec![Message::user(&self.question)];
        let output = if stream {
            let mut events = std::pin::pin!(runtime.stream(input, config));
            let mut output = None;
            while let Some(event) = events.next().await {
                match event? {
                    AgentEvent::Message(message) => print_step(&message),
                    AgentEvent::Done(done) => output = Some(done),
                }
            }
            output
        } else {
            Some(runtime.run(input, config).await?)
        };

        printer.await.ok();
        if let Some(output) = output {
            print_output(&output)?;
        }
        Ok(())
    }
}

/// Memory command arguments
#[derive(Debug, Args)]
pub struct MemoryCmd {
    /// Conversation thread
    #[arg(long, default_value = "default")]
    pub thread: String,

    /// Summarize once more than this many messages would be sent
    #[arg(long, default_value_t = 8)]
    pub trigger: usize,

    /// Messages kept verbatim after summarizing
    #[arg(long, default_value_t = 4)]
    pub keep: usize,
}

impl MemoryCmd {
    /// Chat interactively on one checkpointed thread
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let summarizer = settings.chat()?.with_model(settings.fast_model());
        let runtime = Runtime::new(
            settings.chat()?,
            Agent::new("memo").system_prompt("You are a helpful assistant. Keep answers short."),
        )
        .with_middleware(Summarize::new(summarizer, self.trigger, self.keep))
        .with_checkpointer(InMemoryCheckpointer::new());

        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("> ");
            stdout.flush()?;

            let mut input = String::new();
            if stdin.lock().read_line(&mut input)? == 0 {
                break;
            }

            let input = input.trim();
            match input {
                "" => continue,
                "/quit" | "/exit" => break,
                "/history" => {
                    print_history(&runtime, &self.thread).await?;
                    continue;
                }
                _ => {}
            }

            let config = RunConfig::thread(self.thread.as_str());
            match runtime.run(vec![Message::user(input)], config).await {
                Ok(output) => println!("{}", output.text()),
                Err(e) => eprintln!("error: {e:#}"),
            }
        }
        Ok(())
    }
}

async fn print_history<M>(
    runtime: &Runtime<M, InMemoryCheckpointer>,
    thread: &str,
) -> Result<()>
where
    M: Model + Send + Sync + 'static,
{
    let Some(checkpoint) = runtime.checkpointer().load(thread).await? else {
        println!("(empty)");
        return Ok(());
    };
    for message in &checkpoint.messages {
        println!("{:>9}: {}", message.label(), message.content);
    }
    println!("({} messages, {} runs)", checkpoint.messages.len(), checkpoint.steps);
    Ok(())
}

async fn print_progress(mut rx: mpsc::UnboundedReceiver<Progress>) {
    while let Some(progress) = rx.recv().await {
        eprintln!("[{}] {}: {}", progress.tool, progress.status, progress.message);
    }
}

fn print_step(message: &Message) {
    match message.role {
        Role::Assistant if !message.tool_calls.is_empty() => {
            for call in &message.tool_calls {
                println!("-> {}({})", call.function.name, call.function.arguments);
            }
        }
        Role::Tool => println!("<- {}", message.content),
        _ => {}
    }
}

fn print_output(output: &RunOutput) -> Result<()> {
    match &output.structured {
        Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
        None => println!("{}", output.text()),
    }
    tracing::debug!(iterations = output.iterations, "run finished");
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    token
}
