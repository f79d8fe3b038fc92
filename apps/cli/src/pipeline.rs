//! Pipeline commands

use crate::{Settings, print_stream};
use anyhow::Result;
use bcore::model::Message;
use chain::{
    BatchOptions, Branch, ChatPromptTemplate, Data, Lambda, Passthrough, Runnable, RunnableExt,
    Sequence, StrOutputParser,
};
use clap::Args;
use serde_json::{Value, json};

/// Invoke command arguments
#[derive(Debug, Args)]
pub struct InvokeCmd {
    /// System prompt sent before the message
    #[arg(long)]
    pub system: Option<String>,

    /// The message to send
    pub message: String,
}

impl InvokeCmd {
    /// Run the invoke command
    pub async fn run(&self, settings: &Settings, stream: bool) -> Result<()> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(&self.message));

        let chain = settings.chat()?.pipe(StrOutputParser);
        if stream {
            print_stream(chain.stream(Data::Messages(messages))).await
        } else {
            println!("{}", chain.invoke(Data::Messages(messages)).await?);
            Ok(())
        }
    }
}

/// Batch command arguments
#[derive(Debug, Args)]
pub struct BatchCmd {
    /// Questions answered at the same time at most
    #[arg(short = 'j', long, default_value_t = 4)]
    pub concurrency: usize,

    /// The questions to answer
    #[arg(required = true)]
    pub questions: Vec<String>,
}

impl BatchCmd {
    /// Run the batch command
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let chain = settings.chat()?.pipe(StrOutputParser);
        let inputs = self.questions.iter().map(|q| Data::from(q.as_str())).collect();
        let results = chain
            .batch(inputs, BatchOptions::max_concurrency(self.concurrency))
            .await;

        for (question, result) in self.questions.iter().zip(results) {
            println!("> {question}");
            match result {
                Ok(answer) => println!("{answer}\n"),
                Err(e) => println!("error: {e}\n"),
            }
        }
        Ok(())
    }
}

/// Arguments shared by the translation commands
#[derive(Debug, Args)]
pub struct Translation {
    /// The role the model plays
    #[arg(long, default_value = "professional translator")]
    pub role: String,

    /// The target language
    #[arg(short, long, default_value = "English")]
    pub language: String,

    /// The text to translate
    pub text: String,
}

impl Translation {
    /// The translation prompt.
    pub fn prompt() -> Result<ChatPromptTemplate> {
        Ok(ChatPromptTemplate::new()
            .system("You are a {role}. Reply with the translation only.")?
            .human("Translate the following text into {language}:\n{text}")?)
    }

    /// Template values for these arguments.
    pub fn values(&self) -> Value {
        json!({ "role": self.role, "language": self.language, "text": self.text })
    }
}

/// Prompt command arguments
#[derive(Debug, Args)]
pub struct PromptCmd {
    #[command(flatten)]
    pub translation: Translation,
}

impl PromptCmd {
    /// Print the rendered translation prompt
    pub fn run(&self) -> Result<()> {
        let prompt = Translation::prompt()?;
        println!("{}", prompt.format(&self.translation.values())?);
        Ok(())
    }
}

/// Chain command arguments
#[derive(Debug, Args)]
pub struct ChainCmd {
    #[command(flatten)]
    pub translation: Translation,
}

impl ChainCmd {
    /// Run the translation chain
    pub async fn run(&self, settings: &Settings, stream: bool) -> Result<()> {
        let chain = Translation::prompt()?
            .pipe(settings.chat()?)
            .pipe(StrOutputParser);
        let input = Data::Json(self.translation.values());
        if stream {
            print_stream(chain.stream(input)).await
        } else {
            println!("{}", chain.invoke(input).await?);
            Ok(())
        }
    }
}

/// Branch command arguments
#[derive(Debug, Args)]
pub struct BranchCmd {
    /// The question to route
    pub question: String,
}

const CLASSIFY_PROMPT: &str = "Classify the question as math, history or other. \
Answer with exactly one word.";

impl BranchCmd {
    /// Classify the question, then answer it with the matching chain
    pub async fn run(&self, settings: &Settings) -> Result<()> {
        let chat = settings.chat()?;
        let classify = ChatPromptTemplate::new()
            .system(CLASSIFY_PROMPT)?
            .human("{question}")?
            .pipe(chat.clone().with_max_tokens(8))
            .pipe(StrOutputParser)
            .pipe(Lambda::new("normalize", |topic: Data| -> bcore::Result<Data> {
                Ok(Data::from(topic.into_text().trim().to_lowercase()))
            }));

        let route = Branch::new(expert(&chat, "helpful assistant")?)
            .case(topic_is("math"), expert(&chat, "mathematician who shows each step")?)
            .case(topic_is("history"), expert(&chat, "historian who cites dates")?);
        let chain = Passthrough::assign().with("topic", classify).pipe(route);

        let answer = chain.invoke(Data::Json(json!({ "question": self.question }))).await?;
        println!("{answer}");
        Ok(())
    }
}

fn expert<M>(chat: &chain::ChatModel<M>, role: &str) -> Result<Sequence>
where
    M: bcore::model::Model + Clone + Send + Sync + 'static,
{
    Ok(ChatPromptTemplate::new()
        .system(&format!("You are a {role}. Answer concisely."))?
        .human("{question}")?
        .pipe(chat.clone())
        .pipe(StrOutputParser))
}

fn topic_is(topic: &'static str) -> impl Fn(&Data) -> bool + Send + Sync + 'static {
    move |data| match data {
        Data::Json(value) => value["topic"].as_str().is_some_and(|t| t.contains(topic)),
        _ => false,
    }
}
