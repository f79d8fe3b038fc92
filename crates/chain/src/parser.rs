//! Output parsers.

use crate::{Data, DataStream, Runnable};
use bcore::{Error, FieldError, OutputSchema, Result};
use futures_util::{StreamExt, future::BoxFuture};
use serde_json::Value;

/// Extracts the text of a model reply.
///
/// Streams fragment by fragment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrOutputParser;

impl StrOutputParser {
    fn parse(input: Data) -> Data {
        Data::Text(input.into_text())
    }
}

impl Runnable for StrOutputParser {
    fn name(&self) -> &str {
        "StrOutputParser"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move { Ok(Self::parse(input)) })
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        Box::pin(input.map(|fragment| fragment.map(Self::parse)))
    }
}

/// Splits a reply on commas into a JSON array of trimmed strings.
///
/// Streams one single-item array per completed item, so concatenated
/// fragments equal the invoke result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOutputParser;

impl ListOutputParser {
    /// Split `text` into items.
    pub fn parse(text: &str) -> Vec<String> {
        text.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Prompt text asking for this format.
    pub fn format_instructions() -> &'static str {
        "Your response should be a list of comma separated values, eg: `foo, bar, baz`"
    }
}

fn item(text: &str) -> Data {
    Data::Json(Value::Array(vec![Value::String(text.to_owned())]))
}

impl Runnable for ListOutputParser {
    fn name(&self) -> &str {
        "ListOutputParser"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let items = Self::parse(&input.into_text());
            Ok(Data::Json(Value::from(items)))
        })
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut input = input;
            let mut pending = String::new();
            let mut emitted = false;
            while let Some(fragment) = input.next().await {
                pending.push_str(&fragment?.into_text());
                while let Some(pos) = pending.find(',') {
                    let head: String = pending.drain(..=pos).collect();
                    let head = head[..head.len() - 1].trim();
                    if !head.is_empty() {
                        emitted = true;
                        yield item(head);
                    }
                }
            }

            let tail = pending.trim();
            if !tail.is_empty() {
                yield item(tail);
            } else if !emitted {
                yield Data::Json(Value::Array(Vec::new()));
            }
        })
    }
}

/// Parses a reply as JSON, optionally validating it against a schema.
#[derive(Debug, Clone, Default)]
pub struct JsonOutputParser {
    schema: Option<OutputSchema>,
}

impl JsonOutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate parsed values against `schema`.
    pub fn with_schema(schema: OutputSchema) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    /// Prompt text describing the expected output.
    pub fn format_instructions(&self) -> String {
        match &self.schema {
            Some(schema) => schema.format_instructions(),
            None => "Return a JSON object.".to_owned(),
        }
    }

    /// Parse and validate `text`.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let value = extract_json(text).map_err(|e| Error::Parse(e.to_string()))?;
        self.check(value, text)
    }

    fn check(&self, value: Value, raw: &str) -> Result<Value> {
        match &self.schema {
            Some(schema) => schema.validate(&value).map_err(|errors| Error::Validation {
                errors,
                raw: raw.to_owned(),
            }),
            None => Ok(value),
        }
    }
}

impl Runnable for JsonOutputParser {
    fn name(&self) -> &str {
        "JsonOutputParser"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let value = match input {
                Data::Json(Value::String(text)) => self.parse(&text)?,
                Data::Json(value) => {
                    let raw = value.to_string();
                    self.check(value, &raw)?
                }
                other => self.parse(&other.into_text())?,
            };
            Ok(Data::Json(value))
        })
    }
}

/// Pull a JSON value out of model text.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, or JSON surrounded
/// by prose (the outermost object or array is taken).
pub fn extract_json(text: &str) -> std::result::Result<Value, FieldError> {
    let trimmed = strip_fence(text.trim());
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find(['{', '[']);
    let end = trimmed.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    let reason = match serde_json::from_str::<Value>(trimmed) {
        Err(e) => e.to_string(),
        Ok(_) => "unreadable JSON".to_owned(),
    };
    Err(FieldError::new("$", format!("invalid JSON: {reason}")))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
