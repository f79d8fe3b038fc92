//! Prompt templates.
//!
//! Placeholders are written `{name}`; `{{` and `}}` stand for literal
//! braces. Templates are parsed once at construction so malformed input is
//! rejected early, and formatting only checks that every placeholder is
//! bound. Extra bindings are ignored.

use crate::{Data, Runnable};
use bcore::{
    Error, Result,
    model::{Message, Role, transcript},
};
use compact_str::CompactString;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Var(CompactString),
}

/// A text template with named placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    partials: Map<String, Value>,
}

impl PromptTemplate {
    /// Parse `template`.
    pub fn new(template: &str) -> Result<Self> {
        Ok(Self {
            segments: parse(template)?,
            partials: Map::new(),
        })
    }

    /// Bind `name` ahead of time. Call-time bindings take precedence.
    pub fn partial(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.partials.insert(name.to_owned(), value.into());
        self
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Var(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render with `values`, which must be a JSON object.
    pub fn format(&self, values: &Value) -> Result<String> {
        let values = bindings(values)?;
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = values
                        .get(name.as_str())
                        .or_else(|| self.partials.get(name.as_str()))
                        .ok_or_else(|| {
                            Error::Format(format!("missing value for placeholder `{name}`"))
                        })?;
                    render(value, &mut out);
                }
            }
        }
        Ok(out)
    }

    /// Bindings from a stage input. Text binds the single placeholder.
    fn bindings_from(&self, input: Data) -> Result<Value> {
        match input {
            Data::Json(value @ Value::Object(_)) => Ok(value),
            other => {
                let text = other.into_text();
                match self.variables()[..] {
                    [name] => Ok(Value::Object(Map::from_iter([(
                        name.to_owned(),
                        Value::String(text),
                    )]))),
                    [] => Ok(Value::Object(Map::new())),
                    _ => Err(Error::Format(
                        "template has several placeholders; bind them with a JSON object".into(),
                    )),
                }
            }
        }
    }
}

impl Runnable for PromptTemplate {
    fn name(&self) -> &str {
        "PromptTemplate"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let values = self.bindings_from(input)?;
            self.format(&values).map(Data::Text)
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Message(Role, PromptTemplate),
    Placeholder { name: CompactString, optional: bool },
}

/// A template producing role-tagged messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatPromptTemplate {
    entries: Vec<Entry>,
}

impl ChatPromptTemplate {
    /// An empty template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(role, template)` pairs.
    pub fn from_messages<'a>(messages: impl IntoIterator<Item = (Role, &'a str)>) -> Result<Self> {
        messages
            .into_iter()
            .try_fold(Self::new(), |acc, (role, template)| acc.message(role, template))
    }

    /// Append a message template.
    pub fn message(mut self, role: Role, template: &str) -> Result<Self> {
        self.entries
            .push(Entry::Message(role, PromptTemplate::new(template)?));
        Ok(self)
    }

    pub fn system(self, template: &str) -> Result<Self> {
        self.message(Role::System, template)
    }

    pub fn human(self, template: &str) -> Result<Self> {
        self.message(Role::User, template)
    }

    pub fn ai(self, template: &str) -> Result<Self> {
        self.message(Role::Assistant, template)
    }

    /// Splice the message list bound to `name`.
    pub fn placeholder(mut self, name: &str) -> Self {
        self.entries.push(Entry::Placeholder {
            name: name.into(),
            optional: false,
        });
        self
    }

    /// Like [`ChatPromptTemplate::placeholder`], but absence splices nothing.
    pub fn optional_placeholder(mut self, name: &str) -> Self {
        self.entries.push(Entry::Placeholder {
            name: name.into(),
            optional: true,
        });
        self
    }

    /// Placeholder names across all entries.
    pub fn variables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            let found = match entry {
                Entry::Message(_, template) => template.variables(),
                Entry::Placeholder { name, .. } => vec![name.as_str()],
            };
            for name in found {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Render to messages.
    pub fn format_messages(&self, values: &Value) -> Result<Vec<Message>> {
        let map = bindings(values)?;
        let mut messages = Vec::new();
        for entry in &self.entries {
            match entry {
                Entry::Message(role, template) => {
                    messages.push(Message::with_role(*role, template.format(values)?));
                }
                Entry::Placeholder { name, optional } => match map.get(name.as_str()) {
                    Some(value) => messages.extend(spliced(name, value)?),
                    None if *optional => {}
                    None => {
                        return Err(Error::Format(format!(
                            "missing value for placeholder `{name}`"
                        )));
                    }
                },
            }
        }
        Ok(messages)
    }

    /// Render to a `Role: content` transcript.
    pub fn format(&self, values: &Value) -> Result<String> {
        self.format_messages(values).map(|m| transcript(&m))
    }
}

impl Runnable for ChatPromptTemplate {
    fn name(&self) -> &str {
        "ChatPromptTemplate"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let values = match input {
                Data::Json(value @ Value::Object(_)) => value,
                other => match self.variables()[..] {
                    [name] => {
                        let value = match other {
                            Data::Messages(m) => serde_json::to_value(m).unwrap_or_default(),
                            other => Value::String(other.into_text()),
                        };
                        Value::Object(Map::from_iter([(name.to_owned(), value)]))
                    }
                    [] => Value::Object(Map::new()),
                    _ => {
                        return Err(Error::Format(
                            "template has several placeholders; bind them with a JSON object"
                                .into(),
                        ));
                    }
                },
            };
            self.format_messages(&values).map(Data::Messages)
        })
    }
}

fn bindings(values: &Value) -> Result<&Map<String, Value>> {
    values
        .as_object()
        .ok_or_else(|| Error::Format("template bindings must be a JSON object".into()))
}

fn spliced(name: &str, value: &Value) -> Result<Vec<Message>> {
    match value {
        Value::String(text) => Ok(vec![Message::user(text.clone())]),
        value => serde_json::from_value(value.clone()).map_err(|e| {
            Error::Format(format!("placeholder `{name}` must be a list of messages: {e}"))
        }),
    }
}

fn render(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        other => out.push_str(&other.to_string()),
    }
}

fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(Error::Format(format!("unclosed placeholder in {template:?}")));
                }
                let name = name.trim();
                if name.is_empty() || name.contains('{') {
                    return Err(Error::Format(format!("invalid placeholder in {template:?}")));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name.into()));
            }
            '}' => {
                return Err(Error::Format(format!(
                    "single `}}` in {template:?}; write `}}}}` for a literal brace"
                )));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
