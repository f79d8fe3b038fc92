//! The value flowing between pipeline stages.

use bcore::model::{Message, Role, transcript};
use serde_json::Value;
use std::fmt;

/// Input and output of every stage.
///
/// Streams carry fragments of a `Data`; [`Data::concat`] folds them back
/// into the whole.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Plain text
    Text(String),
    /// One chat message
    Message(Message),
    /// A conversation
    Messages(Vec<Message>),
    /// Any JSON value, usually an object of template bindings
    Json(Value),
}

impl Data {
    /// Append a later fragment to this one.
    ///
    /// Text and message fragments concatenate, message lists and JSON
    /// arrays extend, JSON objects merge with later keys winning. Any
    /// other pairing keeps the later fragment.
    pub fn concat(self, next: Data) -> Data {
        match (self, next) {
            (Data::Text(mut a), Data::Text(b)) => {
                a.push_str(&b);
                Data::Text(a)
            }
            (Data::Message(mut a), Data::Message(b)) => {
                a.merge(&b);
                Data::Message(a)
            }
            (Data::Messages(mut a), Data::Messages(b)) => {
                a.extend(b);
                Data::Messages(a)
            }
            (Data::Json(Value::Array(mut a)), Data::Json(Value::Array(b))) => {
                a.extend(b);
                Data::Json(Value::Array(a))
            }
            (Data::Json(Value::Object(mut a)), Data::Json(Value::Object(b))) => {
                a.extend(b);
                Data::Json(Value::Object(a))
            }
            (_, next) => next,
        }
    }

    /// Fold a sequence of fragments. `None` when there are none.
    pub fn concat_all(fragments: impl IntoIterator<Item = Data>) -> Option<Data> {
        fragments.into_iter().reduce(Data::concat)
    }

    /// The text carried by this value, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(text) => Some(text),
            Data::Message(message) => Some(&message.content),
            Data::Json(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Render as text. Conversations become transcripts, JSON compact text.
    pub fn into_text(self) -> String {
        match self {
            Data::Text(text) => text,
            Data::Message(message) => message.content,
            Data::Messages(messages) => transcript(&messages),
            Data::Json(Value::String(text)) => text,
            Data::Json(value) => value.to_string(),
        }
    }

    /// Interpret as a conversation.
    ///
    /// Text becomes one user message. A JSON array is read as messages
    /// when it has that shape.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Data::Text(text) => vec![Message::user(text)],
            Data::Message(message) => vec![message],
            Data::Messages(messages) => messages,
            Data::Json(Value::String(text)) => vec![Message::user(text)],
            Data::Json(value) => match serde_json::from_value::<Vec<Message>>(value.clone()) {
                Ok(messages) => messages,
                Err(_) => vec![Message::user(value.to_string())],
            },
        }
    }

    /// Interpret as JSON. Text is kept as a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Data::Json(value) => value,
            Data::Text(text) => Value::String(text),
            Data::Message(message) => serde_json::to_value(message).unwrap_or_default(),
            Data::Messages(messages) => serde_json::to_value(messages).unwrap_or_default(),
        }
    }

    /// The latest user text in this value, used by routing predicates.
    pub fn user_text(&self) -> Option<&str> {
        match self {
            Data::Text(text) => Some(text),
            Data::Message(m) if m.role == Role::User => Some(&m.content),
            Data::Messages(messages) => messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str()),
            Data::Json(Value::String(text)) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Text(text) => f.write_str(text),
            Data::Message(message) => f.write_str(&message.content),
            Data::Messages(messages) => f.write_str(&transcript(messages)),
            Data::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(text) => f.write_str(&text),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Data::Text(text.to_owned())
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Data::Text(text)
    }
}

impl From<Message> for Data {
    fn from(message: Message) -> Self {
        Data::Message(message)
    }
}

impl From<Vec<Message>> for Data {
    fn from(messages: Vec<Message>) -> Self {
        Data::Messages(messages)
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Data::Json(value)
    }
}
