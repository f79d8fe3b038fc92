//! Tests for structured output coercion.

use bcore::{
    Error, Field, FieldKind, OutputSchema,
    model::{Message, ResponseFormat, Role, ToolCall, ToolChoice},
    testing::MockModel,
};
use braid_chain::{ChatModel, Data, Runnable, Strategy};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

fn person() -> OutputSchema {
    OutputSchema::object("Person")
        .describe("A person mentioned in the text")
        .field(Field::string("name"))
        .field(Field::integer("age"))
        .field(Field::string("email").optional())
}

fn prompt() -> Vec<Message> {
    vec![Message::user("John is 30, reach him at john@example.com")]
}

// --- strategy ---

#[test]
fn auto_prefers_provider_when_native() {
    assert_eq!(Strategy::Auto.resolve(true).unwrap(), Strategy::Provider);
    assert_eq!(Strategy::Auto.resolve(false).unwrap(), Strategy::Tool);
    assert_eq!(Strategy::Tool.resolve(true).unwrap(), Strategy::Tool);
}

#[tokio::test]
async fn provider_strategy_unsupported() {
    let model = MockModel::new("plain").text("{}");
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Provider);
    let err = structured.coerce(prompt()).await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert_eq!(model.calls(), 0);
}

// --- tool strategy ---

#[tokio::test]
async fn tool_strategy_returns_arguments() {
    let model = MockModel::new("m").tool_call(
        "call_1",
        "Person",
        json!({"name": "John", "age": 30, "email": "john@example.com"}),
    );
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    let value = structured.coerce(prompt()).await.unwrap();
    assert_eq!(value, json!({"name": "John", "age": 30, "email": "john@example.com"}));

    let request = &model.requests()[0];
    let tools = request.tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "Person");
    assert_eq!(request.tool_choice, Some(ToolChoice::Function("Person".into())));
}

#[tokio::test]
async fn optional_field_may_be_absent() {
    let model = MockModel::new("m").tool_call("c", "Person", json!({"name": "Ann", "age": 41}));
    let structured = ChatModel::new(model).with_structured_output(person(), Strategy::Tool);
    let value = structured.coerce(prompt()).await.unwrap();
    assert_eq!(value["name"], "Ann");
    assert!(value.get("email").is_none());
}

#[tokio::test]
async fn one_retry_then_success() {
    let model = MockModel::new("m")
        .tool_call("call_1", "Person", json!({"name": "John"}))
        .tool_call("call_2", "Person", json!({"name": "John", "age": 30}));
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    let value = structured.coerce(prompt()).await.unwrap();
    assert_eq!(value["age"], 30);
    assert_eq!(model.calls(), 2);

    // The retry carries the rejected call and a tool message naming the problem.
    let retry = &model.requests()[1].messages;
    assert_eq!(retry.len(), 3);
    assert_eq!(retry[1].role, Role::Assistant);
    let feedback = &retry[2];
    assert_eq!(feedback.role, Role::Tool);
    assert_eq!(feedback.tool_call_id, "call_1");
    assert!(feedback.content.contains("age"));
}

#[tokio::test]
async fn retry_keeps_only_the_answered_call() {
    let calls = [
        ToolCall::function("call_x", "lookup", r#"{"q":"john"}"#),
        ToolCall::function("call_1", "Person", r#"{"name":"John"}"#),
    ];
    let model = MockModel::new("m")
        .reply(Message::assistant("", None, Some(&calls)))
        .tool_call("call_2", "Person", json!({"name": "John", "age": 30}));
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    structured.coerce(prompt()).await.unwrap();

    let retry = &model.requests()[1].messages;
    let ids: Vec<_> = retry[1].tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["call_1"]);
    assert_eq!(retry[2].tool_call_id, "call_1");
    assert_eq!(retry.len(), 3);
}

#[tokio::test]
async fn stray_calls_are_dropped_before_a_user_retry() {
    let model = MockModel::new("m")
        .tool_call("call_x", "lookup", json!({"q": "john"}))
        .tool_call("call_1", "Person", json!({"name": "John", "age": 30}));
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    structured.coerce(prompt()).await.unwrap();

    let retry = &model.requests()[1].messages;
    assert!(retry[1].tool_calls.is_empty());
    assert_eq!(retry[2].role, Role::User);
}

#[tokio::test]
async fn second_failure_is_final() {
    let model = MockModel::new("m")
        .tool_call("c1", "Person", json!({"name": "John"}))
        .tool_call("c2", "Person", json!({"name": "John", "age": "thirty"}))
        .tool_call("c3", "Person", json!({"name": "John", "age": 30}));
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    let err = structured.coerce(prompt()).await.unwrap_err();
    let Error::Validation { errors, raw } = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert_eq!(model.calls(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "age");
    assert!(raw.contains("thirty"));
}

#[tokio::test]
async fn plain_text_reply_is_retried() {
    let model = MockModel::new("m")
        .text("I think John is 30.")
        .tool_call("c", "Person", json!({"name": "John", "age": 30}));
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Tool);
    structured.coerce(prompt()).await.unwrap();
    let retry = &model.requests()[1].messages;
    assert_eq!(retry.last().unwrap().role, Role::User);
}

#[tokio::test]
async fn list_schema_unwraps_items() {
    let schema = OutputSchema::list("Cities", FieldKind::String);
    let model = MockModel::new("m").tool_call("c", "Cities", json!({"items": ["Oslo", "Lima"]}));
    let structured = ChatModel::new(model.clone()).with_structured_output(schema, Strategy::Tool);
    let value = structured.coerce(vec![Message::user("two cities")]).await.unwrap();
    assert_eq!(value, json!(["Oslo", "Lima"]));
}

// --- provider strategy ---

#[tokio::test]
async fn provider_strategy_parses_content() {
    let model = MockModel::new("native")
        .native_structured(true)
        .text("```json\n{\"name\": \"John\", \"age\": 30}\n```");
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Auto);
    let value = structured.coerce(prompt()).await.unwrap();
    assert_eq!(value, json!({"name": "John", "age": 30}));

    let request = &model.requests()[0];
    assert!(request.tools.is_none());
    assert!(matches!(
        &request.response_format,
        Some(ResponseFormat::JsonSchema { name, strict: true, .. }) if name == "Person"
    ));
}

#[tokio::test]
async fn provider_strategy_unwraps_list_answers() {
    let model = MockModel::new("native")
        .native_structured(true)
        .text(r#"{"items": ["Oslo", "Lima"]}"#);
    let schema = OutputSchema::list("Cities", FieldKind::String);
    let structured = ChatModel::new(model.clone()).with_structured_output(schema, Strategy::Provider);
    let value = structured.coerce(vec![Message::user("two cities")]).await.unwrap();
    assert_eq!(value, json!(["Oslo", "Lima"]));

    let Some(ResponseFormat::JsonSchema { schema, strict, .. }) =
        &model.requests()[0].response_format
    else {
        panic!("expected a json_schema response format");
    };
    assert!(*strict);
    assert_eq!(schema.as_value()["additionalProperties"], false);
}

#[tokio::test]
async fn provider_strategy_accepts_null_optionals() {
    let model = MockModel::new("native")
        .native_structured(true)
        .text(r#"{"name": "John", "age": 30, "email": null}"#);
    let structured = ChatModel::new(model).with_structured_output(person(), Strategy::Provider);
    let value = structured.coerce(prompt()).await.unwrap();
    assert_eq!(value, json!({"name": "John", "age": 30, "email": null}));
}

#[tokio::test]
async fn free_form_fields_use_a_loose_format() {
    let model = MockModel::new("native")
        .native_structured(true)
        .text(r#"{"name": "x", "meta": {"k": 1}}"#);
    let schema = OutputSchema::object("Record")
        .field(Field::string("name"))
        .field(Field::new("meta", FieldKind::Object));
    let structured = ChatModel::new(model.clone()).with_structured_output(schema, Strategy::Provider);
    structured.coerce(vec![Message::user("record")]).await.unwrap();
    assert!(matches!(
        &model.requests()[0].response_format,
        Some(ResponseFormat::JsonSchema { strict: false, .. })
    ));
}

#[tokio::test]
async fn provider_strategy_retries_with_user_message() {
    let model = MockModel::new("native")
        .native_structured(true)
        .text("not json")
        .text("{\"name\": \"John\", \"age\": 30}");
    let structured = ChatModel::new(model.clone()).with_structured_output(person(), Strategy::Provider);
    structured.coerce(prompt()).await.unwrap();
    assert_eq!(model.calls(), 2);
    let retry = &model.requests()[1].messages;
    assert_eq!(retry.last().unwrap().role, Role::User);
}

// --- typed ---

#[derive(Debug, Deserialize, JsonSchema, PartialEq)]
/// Contact details.
struct Contact {
    name: String,
    phone: String,
}

#[tokio::test]
async fn invoke_as_deserializes() {
    let schema = OutputSchema::of::<Contact>();
    assert_eq!(schema.name, "Contact");
    let model = MockModel::new("m").reply(Message::assistant(
        "",
        None,
        Some(&[ToolCall::function(
            "c",
            "Contact",
            r#"{"name": "Ann", "phone": "555-0100"}"#,
        )]),
    ));
    let structured = ChatModel::new(model).with_structured_output(schema, Strategy::Tool);
    let contact: Contact = structured.invoke_as("Ann, 555-0100").await.unwrap();
    assert_eq!(
        contact,
        Contact {
            name: "Ann".into(),
            phone: "555-0100".into()
        }
    );
}

#[tokio::test]
async fn runnable_yields_json() {
    let model = MockModel::new("m").tool_call("c", "Person", json!({"name": "J", "age": 1}));
    let structured = ChatModel::new(model).with_structured_output(person(), Strategy::Tool);
    let out = structured.invoke(Data::from("who?")).await.unwrap();
    assert_eq!(out, Data::Json(json!({"name": "J", "age": 1})));
}
