//! Output schemas and the field validator.
//!
//! An [`OutputSchema`] is a closed description of the value a model is
//! expected to produce: either an object with ordered, typed fields or a
//! list of scalar items. [`OutputSchema::validate`] checks a raw JSON value
//! against it, filling declared defaults, and reports every field-level
//! problem at once.

use compact_str::CompactString;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// Key under which list-shaped outputs travel when wrapped in an object.
pub const LIST_KEY: &str = "items";

/// The type tag of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<FieldKind>),
    Object,
    Enum(Vec<String>),
}

impl FieldKind {
    fn check(&self, path: &str, value: &Value, errors: &mut Vec<FieldError>) {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Enum(values) => value
                .as_str()
                .is_some_and(|s| values.iter().any(|v| v == s)),
            Self::Array(item) => {
                let Some(elements) = value.as_array() else {
                    errors.push(FieldError::mistyped(path, self, value));
                    return;
                };
                for (idx, element) in elements.iter().enumerate() {
                    item.check(&format!("{path}[{idx}]"), element, errors);
                }
                true
            }
        };

        if !ok {
            errors.push(FieldError::mistyped(path, self, value));
        }
    }

    fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Integer => json!({ "type": "integer" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Object => json!({ "type": "object" }),
            Self::Enum(values) => json!({ "type": "string", "enum": values }),
            Self::Array(item) => json!({ "type": "array", "items": item.json_schema() }),
        }
    }

    /// Strict-mode rendering, or `None` for free-form objects, which strict
    /// mode cannot express.
    fn strict_json_schema(&self) -> Option<Value> {
        match self {
            Self::Object => None,
            Self::Array(item) => {
                Some(json!({ "type": "array", "items": item.strict_json_schema()? }))
            }
            _ => Some(self.json_schema()),
        }
    }

    fn from_json_schema(value: &Value) -> Self {
        if let Some(values) = value.get("enum").and_then(Value::as_array) {
            return Self::Enum(
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect(),
            );
        }

        let ty = match value.get("type") {
            Some(Value::String(ty)) => ty.as_str(),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null")
                .unwrap_or("object"),
            _ => "object",
        };

        match ty {
            "string" => Self::String,
            "integer" => Self::Integer,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "array" => Self::Array(Box::new(
                value
                    .get("items")
                    .map(Self::from_json_schema)
                    .unwrap_or(Self::Object),
            )),
            _ => Self::Object,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Integer => f.write_str("integer"),
            Self::Number => f.write_str("number"),
            Self::Boolean => f.write_str("boolean"),
            Self::Object => f.write_str("object"),
            Self::Enum(values) => write!(f, "one of [{}]", values.join(", ")),
            Self::Array(item) => write!(f, "array of {item}"),
        }
    }
}

/// A named field of an object schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: CompactString,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Field {
    /// A required field of the given kind.
    pub fn new(name: impl Into<CompactString>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: String::new(),
        }
    }

    pub fn string(name: impl Into<CompactString>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<CompactString>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: impl Into<CompactString>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<CompactString>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn array(name: impl Into<CompactString>, item: FieldKind) -> Self {
        Self::new(name, FieldKind::Array(Box::new(item)))
    }

    pub fn one_of<S: Into<String>>(
        name: impl Into<CompactString>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, FieldKind::Enum(values.into_iter().map(Into::into).collect()))
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Use `value` when the field is absent. Implies optional.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.required = false;
        self.default = Some(value.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One problem found while validating a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending field, `$` for the root
    pub field: CompactString,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<CompactString>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "required field is missing")
    }

    fn mistyped(field: &str, kind: &FieldKind, value: &Value) -> Self {
        Self::new(field, format!("expected {kind}, found {}", type_name(value)))
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// The shape of a schema's root value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// An object with ordered fields
    Object(Vec<Field>),
    /// A list whose items share one kind
    List(FieldKind),
}

/// Description of a structured model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: CompactString,
    #[serde(default)]
    pub description: String,
    pub shape: Shape,
}

impl OutputSchema {
    /// An object schema with no fields yet.
    pub fn object(name: impl Into<CompactString>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape: Shape::Object(Vec::new()),
        }
    }

    /// A list schema.
    pub fn list(name: impl Into<CompactString>, item: FieldKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            shape: Shape::List(item),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a field. No-op for list schemas.
    pub fn field(mut self, field: Field) -> Self {
        if let Shape::Object(fields) = &mut self.shape {
            fields.push(field);
        }
        self
    }

    /// The fields of an object schema.
    pub fn fields(&self) -> &[Field] {
        match &self.shape {
            Shape::Object(fields) => fields,
            Shape::List(_) => &[],
        }
    }

    /// Derive a schema from a `schemars` type description.
    pub fn of<T: JsonSchema>() -> Self {
        let schema = schemars::schema_for!(T);
        let name = schema
            .get("title")
            .and_then(Value::as_str)
            .map(CompactString::from)
            .unwrap_or_else(|| T::schema_name().as_ref().into());
        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        if schema.get("type").and_then(Value::as_str) == Some("array") {
            let item = schema
                .get("items")
                .map(FieldKind::from_json_schema)
                .unwrap_or(FieldKind::String);
            return Self::list(name, item).describe(description);
        }

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut out = Self::object(name).describe(description);
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, prop) in props {
                let mut field = Field::new(key.as_str(), FieldKind::from_json_schema(prop));
                field.required = required.contains(&key.as_str());
                field.default = prop.get("default").cloned();
                field.description = prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                out = out.field(field);
            }
        }
        out
    }

    /// Check `value` against the schema.
    ///
    /// Returns the value with declared defaults filled in, or every field
    /// error found. Keys not named by the schema are kept as-is.
    pub fn validate(&self, value: &Value) -> Result<Value, Vec<FieldError>> {
        let mut errors = Vec::new();
        match &self.shape {
            Shape::List(item) => {
                FieldKind::Array(Box::new(item.clone())).check("$", value, &mut errors);
                if errors.is_empty() {
                    return Ok(value.clone());
                }
                Err(errors)
            }
            Shape::Object(fields) => {
                let Some(object) = value.as_object() else {
                    return Err(vec![FieldError::mistyped("$", &FieldKind::Object, value)]);
                };

                let mut out = object.clone();
                for field in fields {
                    match object.get(field.name.as_str()) {
                        None | Some(Value::Null) => {
                            if let Some(default) = &field.default {
                                out.insert(field.name.to_string(), default.clone());
                            } else if field.required {
                                errors.push(FieldError::missing(&field.name));
                            }
                        }
                        Some(v) => field.kind.check(&field.name, v, &mut errors),
                    }
                }

                if errors.is_empty() {
                    Ok(Value::Object(out))
                } else {
                    Err(errors)
                }
            }
        }
    }

    /// Render the schema as JSON Schema.
    pub fn to_json_schema(&self) -> Schema {
        let mut root = match &self.shape {
            Shape::List(item) => FieldKind::Array(Box::new(item.clone())).json_schema(),
            Shape::Object(fields) => {
                let mut properties = Map::new();
                let mut required = Vec::new();
                for field in fields {
                    let mut prop = field.kind.json_schema();
                    if !field.description.is_empty() {
                        prop["description"] = Value::String(field.description.clone());
                    }
                    if let Some(default) = &field.default {
                        prop["default"] = default.clone();
                    }
                    if field.required {
                        required.push(Value::String(field.name.to_string()));
                    }
                    properties.insert(field.name.to_string(), prop);
                }
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
        };

        root["title"] = Value::String(self.name.to_string());
        if !self.description.is_empty() {
            root["description"] = Value::String(self.description.clone());
        }
        match root {
            Value::Object(map) => Schema::from(map),
            _ => Schema::default(),
        }
    }

    /// Render the schema for strict structured outputs.
    ///
    /// The root is always an object that forbids extra keys. Every field is
    /// listed as required; optional fields accept `null` instead, and
    /// defaults are left to [`OutputSchema::validate`]. Returns `None` when a
    /// field is a free-form object.
    pub fn to_strict_json_schema(&self) -> Option<Schema> {
        let Shape::Object(fields) = &self.as_object().shape else {
            return None;
        };

        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in fields {
            let mut prop = field.kind.strict_json_schema()?;
            if !field.required {
                nullable(&mut prop);
            }
            if !field.description.is_empty() {
                prop["description"] = Value::String(field.description.clone());
            }
            required.push(Value::String(field.name.to_string()));
            properties.insert(field.name.to_string(), prop);
        }

        let mut root = json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
            "title": self.name.as_str(),
        });
        if !self.description.is_empty() {
            root["description"] = Value::String(self.description.clone());
        }
        match root {
            Value::Object(map) => Some(Schema::from(map)),
            _ => None,
        }
    }

    /// An object-shaped view of this schema, as tool arguments must be.
    ///
    /// List schemas are wrapped in a single `items` field.
    pub fn as_object(&self) -> OutputSchema {
        match &self.shape {
            Shape::Object(_) => self.clone(),
            Shape::List(item) => OutputSchema::object(self.name.clone())
                .describe(self.description.clone())
                .field(Field::array(LIST_KEY, item.clone()).describe(self.description.clone())),
        }
    }

    /// Undo [`OutputSchema::as_object`] on a value shaped by it.
    pub fn unwrap_object(&self, value: Value) -> Value {
        match (&self.shape, value) {
            (Shape::List(_), Value::Object(mut map)) => {
                map.remove(LIST_KEY).unwrap_or(Value::Object(map))
            }
            (_, value) => value,
        }
    }

    /// Prompt text instructing a model to answer in this shape.
    pub fn format_instructions(&self) -> String {
        let schema = serde_json::to_string(&self.to_json_schema()).unwrap_or_default();
        format!(
            "Respond only with a JSON value that conforms to the JSON Schema below. \
             Do not add explanations or any text outside the JSON.\n\n```json\n{schema}\n```"
        )
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Let a property schema also accept `null`.
fn nullable(prop: &mut Value) {
    if let Some(Value::String(ty)) = prop.get("type").cloned() {
        prop["type"] = json!([ty, "null"]);
    }
    if let Some(Value::Array(values)) = prop.get_mut("enum") {
        values.push(Value::Null);
    }
}
