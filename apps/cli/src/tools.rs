//! Tool command and the demo tools

use crate::Settings;
use anyhow::{Result, bail};
use bcore::model::Message;
use clap::Args;
use compact_str::CompactString;
use runtime::{ToolContext, ToolError, ToolSet, render};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

const POSITIVE_REVIEWS: [&str; 3] = [
    "Sound quality is excellent and the battery lasts all week.",
    "Setup took two minutes, works flawlessly with my phone.",
    "Comfortable enough to wear through a long flight.",
];

const NEGATIVE_REVIEWS: [&str; 2] = [
    "The left earbud stopped charging after a month.",
    "Noise cancelling is weak on trains.",
];

/// Arguments of `get_reviews`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReviewArgs {
    /// Fetch positive reviews when true, negative ones otherwise
    pub positive: bool,
}

/// Arguments of `compare_two_numbers`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompareArgs {
    pub a: f64,
    pub b: f64,
}

/// Arguments of `user_location`, which takes none
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// The product review tools.
pub fn review_tools() -> ToolSet {
    let mut tools = ToolSet::new();
    tools.register_typed::<ReviewArgs, _, _>(
        "get_reviews",
        "Fetch customer reviews of the product, either positive or negative.",
        |args, _ctx| async move {
            let reviews: &[&str] = if args.positive {
                &POSITIVE_REVIEWS
            } else {
                &NEGATIVE_REVIEWS
            };
            Ok(json!(reviews))
        },
    );
    tools
}

/// The agent tools: number comparison and the caller's location.
pub fn agent_tools() -> ToolSet {
    let mut tools = ToolSet::new();
    tools.register_typed::<CompareArgs, _, _>(
        "compare_two_numbers",
        "Compare two numbers. Returns 1 if a > b, 0 if equal, -1 if a < b.",
        |args, _ctx| async move {
            let order = args
                .a
                .partial_cmp(&args.b)
                .ok_or_else(|| ToolError::failed("numbers must not be NaN"))?;
            Ok(json!(order as i8))
        },
    );
    tools.register_typed::<NoArgs, _, _>(
        "user_location",
        "Look up the city the current user lives in.",
        |_args, ctx: ToolContext| async move {
            ctx.progress.emit("starting", "looking up the user");
            let user_id = ctx.context["user_id"].as_str().map(str::to_owned);
            ctx.progress.emit("progress", "50%");
            match user_id.as_deref() {
                Some("1") => Ok(json!("Beijing")),
                Some(_) => Ok(json!("Shanghai")),
                None => Err(ToolError::failed("no user_id in the run context")),
            }
        },
    );
    tools
}

/// Tools command arguments
#[derive(Debug, Args)]
pub struct ToolsCmd {
    /// Tool rounds allowed before giving up
    #[arg(long, default_value_t = 4)]
    pub rounds: usize,

    /// The question to answer
    #[arg(default_value = "Summarize what customers like and dislike about the product.")]
    pub question: String,
}

impl ToolsCmd {
    /// Run the question through the model, executing tool calls by hand
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let tools = review_tools();
        let names: Vec<CompactString> = tools.names().into_iter().map(Into::into).collect();
        let chat = settings.chat()?.bind_tools(tools.resolve(&names));

        let mut messages = vec![Message::user(&self.question)];
        for _ in 0..self.rounds {
            let reply = chat.generate(messages.clone()).await?;
            if reply.tool_calls.is_empty() {
                println!("{}", reply.content);
                return Ok(());
            }

            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                println!("-> {}({})", call.function.name, call.function.arguments);
                let output = match tools.call(&call, ToolContext::detached(call.id.clone())).await {
                    Ok(value) => render(&value),
                    Err(e) => format!("Error: {e}"),
                };
                messages.push(Message::tool(output, call.id));
            }
        }
        bail!("no answer after {} tool rounds", self.rounds)
    }
}

