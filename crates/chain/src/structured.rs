//! Structured output coercion.
//!
//! A reply is coerced into an [`OutputSchema`] either through the
//! provider's own JSON-schema mode or by forcing a call to a synthetic tool
//! whose parameters are the schema. A reply that fails validation gets one
//! corrective follow-up; a second failure is final.

use crate::{ChatModel, Data, Runnable, parser::extract_json};
use bcore::{
    Error, FieldError, OutputSchema, Result,
    model::{Message, Model, ResponseFormat, Tool, ToolCall, ToolChoice},
};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Attempts per coercion: the first answer plus one retry.
pub const ATTEMPTS: usize = 2;

/// How a schema is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Provider-native constrained decoding. Fails on providers without it.
    Provider,
    /// A forced call to a synthetic tool.
    Tool,
    /// `Provider` when supported, otherwise `Tool`.
    #[default]
    Auto,
}

impl Strategy {
    /// Settle `Auto` and reject `Provider` on unsupported models.
    pub fn resolve(self, native: bool) -> Result<Strategy> {
        match (self, native) {
            (Strategy::Auto, true) | (Strategy::Provider, true) => Ok(Strategy::Provider),
            (Strategy::Auto, false) | (Strategy::Tool, _) => Ok(Strategy::Tool),
            (Strategy::Provider, false) => Err(Error::Unsupported(
                "model does not support provider-native structured output".into(),
            )),
        }
    }
}

/// The synthetic tool presenting `schema` to the model.
pub fn schema_tool(schema: &OutputSchema) -> Tool {
    let description = if schema.description.is_empty() {
        format!("Return the final answer as {}", schema.name)
    } else {
        schema.description.clone()
    };
    Tool::from_schema(schema.name.clone(), description, &schema.as_object())
}

/// The provider response format enforcing `schema`.
///
/// Falls back to a non-strict format when the schema holds free-form objects.
pub fn response_format(schema: &OutputSchema) -> ResponseFormat {
    let (schema_json, strict) = match schema.to_strict_json_schema() {
        Some(strict) => (strict, true),
        None => (schema.as_object().to_json_schema(), false),
    };
    ResponseFormat::JsonSchema {
        name: schema.name.clone(),
        schema: schema_json,
        strict,
    }
}

/// Validate a textual answer.
pub fn check_answer(
    schema: &OutputSchema,
    raw: &str,
) -> std::result::Result<Value, Vec<FieldError>> {
    let value = extract_json(raw).map_err(|e| vec![e])?;
    schema.validate(&schema.unwrap_object(value))
}

/// Validate the arguments of a call to [`schema_tool`].
pub fn check_arguments(
    schema: &OutputSchema,
    call: &ToolCall,
) -> std::result::Result<Value, Vec<FieldError>> {
    let value = call
        .parse_arguments()
        .map_err(|e| vec![FieldError::new("$", format!("invalid JSON: {e}"))])?;
    schema.validate(&schema.unwrap_object(value))
}

/// Follow-up text explaining why an answer was rejected.
pub fn retry_prompt(schema: &OutputSchema, errors: &[FieldError]) -> String {
    let listed = errors
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "The previous answer does not match the {} schema:\n{listed}\nAnswer again with a corrected value.",
        schema.name
    )
}

/// A model handle that answers with schema-conforming JSON.
#[derive(Clone)]
pub struct StructuredOutput<M> {
    chat: ChatModel<M>,
    schema: OutputSchema,
    strategy: Strategy,
}

impl<M: Model + Send + Sync + 'static> StructuredOutput<M> {
    pub fn new(chat: ChatModel<M>, schema: OutputSchema, strategy: Strategy) -> Self {
        Self {
            chat,
            schema,
            strategy,
        }
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    /// Coerce the reply to `messages`.
    pub async fn coerce(&self, messages: Vec<Message>) -> Result<Value> {
        let strategy = self
            .strategy
            .resolve(self.chat.provider().native_structured_output())?;
        let chat = match strategy {
            Strategy::Provider => self
                .chat
                .clone()
                .with_response_format(response_format(&self.schema)),
            _ => self
                .chat
                .clone()
                .bind_tools([schema_tool(&self.schema)])
                .with_tool_choice(ToolChoice::Function(self.schema.name.clone())),
        };

        let mut conversation = messages;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut reply = chat.generate(conversation.clone()).await?;
            let call = reply
                .tool_calls
                .iter()
                .find(|c| c.function.name == self.schema.name)
                .cloned();

            let (raw, checked) = match (strategy, &call) {
                (Strategy::Tool, Some(call)) => (
                    call.function.arguments.clone(),
                    check_arguments(&self.schema, call),
                ),
                (Strategy::Tool, None) => (
                    reply.content.clone(),
                    Err(vec![FieldError::new(
                        "$",
                        format!("expected a call to the {} tool", self.schema.name),
                    )]),
                ),
                _ => (reply.content.clone(), check_answer(&self.schema, &reply.content)),
            };

            let errors = match checked {
                Ok(value) => return Ok(value),
                Err(errors) => errors,
            };
            tracing::debug!(attempt, errors = errors.len(), "structured output rejected");
            if attempt == ATTEMPTS {
                return Err(Error::Validation { errors, raw });
            }

            // Only the answered call stays in the history.
            reply
                .tool_calls
                .retain(|c| call.as_ref().is_some_and(|call| call.id == c.id));
            let follow_up = retry_prompt(&self.schema, &errors);
            conversation.push(reply);
            conversation.push(match call {
                Some(call) => Message::tool(follow_up, call.id),
                None => Message::user(follow_up),
            });
        }
    }

    /// Coerce and deserialize into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(&self, input: impl Into<Data>) -> Result<T> {
        let value = self.coerce(input.into().into_messages()).await?;
        serde_json::from_value(value).map_err(|e| Error::Parse(e.to_string()))
    }
}

impl<M: Model + Send + Sync + 'static> Runnable for StructuredOutput<M> {
    fn name(&self) -> &str {
        "StructuredOutput"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let value = self.coerce(input.into_messages()).await?;
            Ok(Data::Json(value))
        })
    }
}
