//! Tests for the wire request body and SSE decoding.

use bcore::model::{Message, Request, ResponseFormat, Tool, ToolChoice};
use bcore::{Field, FieldKind, OutputSchema};
use braid_model::{SseBuffer, request};
use serde_json::json;

fn contact() -> OutputSchema {
    OutputSchema::object("ContactInfo")
        .field(Field::string("name"))
        .field(Field::string("email"))
}

#[test]
fn minimal_body_omits_unset_fields() {
    let req = Request::new("glm-4").with_messages(vec![Message::user("hi")]);
    let body = serde_json::to_value(request::Request::from(req)).unwrap();
    assert_eq!(body["model"], "glm-4");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hi");
    for key in ["tools", "tool_choice", "temperature", "max_tokens", "stream", "stop"] {
        assert!(body.get(key).is_none(), "{key} should be absent");
    }
}

#[test]
fn sampling_parameters_serialize() {
    let mut req = Request::new("m");
    req.temperature = Some(0.5);
    req.max_tokens = Some(5000);
    req.stop = vec!["\n\n".into()];
    let body = serde_json::to_value(request::Request::from(req)).unwrap();
    assert_eq!(body["temperature"], 0.5);
    assert_eq!(body["max_tokens"], 5000);
    assert_eq!(body["stop"], json!(["\n\n"]));
}

#[test]
fn tools_are_wrapped_as_functions() {
    let req = Request::new("m")
        .with_tools(vec![Tool::from_schema("contact", "Extract a contact", &contact())])
        .with_tool_choice(ToolChoice::from("contact"));
    let body = serde_json::to_value(request::Request::from(req)).unwrap();
    assert_eq!(body["tools"][0]["type"], "function");
    assert_eq!(body["tools"][0]["function"]["name"], "contact");
    assert_eq!(
        body["tools"][0]["function"]["parameters"]["required"],
        json!(["name", "email"])
    );
    assert_eq!(
        body["tool_choice"],
        json!({"type": "function", "function": {"name": "contact"}})
    );
}

#[test]
fn tool_choice_keywords() {
    for (choice, expected) in [
        (ToolChoice::None, "none"),
        (ToolChoice::Auto, "auto"),
        (ToolChoice::Required, "required"),
    ] {
        let req = Request::new("m").with_tool_choice(choice);
        let body = serde_json::to_value(request::Request::from(req)).unwrap();
        assert_eq!(body["tool_choice"], expected);
    }
}

#[test]
fn json_schema_response_format() {
    let req = Request::new("m").with_response_format(ResponseFormat::JsonSchema {
        name: "ContactInfo".into(),
        schema: contact().to_strict_json_schema().unwrap(),
        strict: true,
    });
    let body = serde_json::to_value(request::Request::from(req)).unwrap();
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["response_format"]["json_schema"]["name"], "ContactInfo");
    assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    assert_eq!(
        body["response_format"]["json_schema"]["schema"]["type"],
        "object"
    );
}

#[test]
fn strict_schema_requires_every_field() {
    let answer = OutputSchema::object("AgentAnswer")
        .field(Field::string("answer"))
        .field(Field::number("larger").optional().describe("The larger number"))
        .field(Field::one_of("unit", ["m", "km"]).with_default("m"));
    let req = Request::new("m").with_response_format(ResponseFormat::JsonSchema {
        name: "AgentAnswer".into(),
        schema: answer.to_strict_json_schema().unwrap(),
        strict: true,
    });
    let body = serde_json::to_value(request::Request::from(req)).unwrap();
    let schema = &body["response_format"]["json_schema"]["schema"];

    assert_eq!(schema["additionalProperties"], false);
    assert_eq!(schema["required"], json!(["answer", "larger", "unit"]));
    assert_eq!(schema["properties"]["answer"]["type"], "string");
    assert_eq!(schema["properties"]["larger"]["type"], json!(["number", "null"]));
    assert_eq!(schema["properties"]["larger"]["description"], "The larger number");
    assert_eq!(schema["properties"]["unit"]["enum"], json!(["m", "km", null]));
    assert!(schema["properties"]["unit"].get("default").is_none());
}

#[test]
fn strict_schema_wraps_lists_and_skips_free_objects() {
    let cities = OutputSchema::list("Cities", FieldKind::String)
        .to_strict_json_schema()
        .unwrap();
    let cities = serde_json::to_value(cities).unwrap();
    assert_eq!(cities["type"], "object");
    assert_eq!(cities["required"], json!(["items"]));
    assert_eq!(cities["properties"]["items"]["items"]["type"], "string");

    let loose = OutputSchema::object("Loose")
        .field(Field::string("name"))
        .field(Field::new("extra", FieldKind::Object));
    assert!(loose.to_strict_json_schema().is_none());
    let nested = OutputSchema::list("Rows", FieldKind::Object);
    assert!(nested.to_strict_json_schema().is_none());
}

#[test]
fn stream_sets_usage_option() {
    let body = request::Request::from(Request::new("m")).stream(true);
    let body = serde_json::to_value(body).unwrap();
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"], json!({"include_usage": true}));
}

// --- SSE ---

const CHUNK: &str = r#"{"id":"1","model":"m","choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;

#[test]
fn sse_decodes_data_lines_and_skips_done() {
    let mut buffer = SseBuffer::default();
    let text = format!("data: {CHUNK}\n\ndata: [DONE]\n\n");
    let chunks = buffer.push(&text);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content(), Some("Hel"));
    assert!(buffer.finish().is_none());
}

#[test]
fn sse_reassembles_split_events() {
    let mut buffer = SseBuffer::default();
    let text = format!("data: {CHUNK}\n\n");
    let (head, tail) = text.split_at(20);
    assert!(buffer.push(head).is_empty());
    let chunks = buffer.push(tail);
    assert_eq!(chunks.len(), 1);
}

#[test]
fn sse_ignores_comments_and_garbage() {
    let mut buffer = SseBuffer::default();
    let chunks = buffer.push(": keep-alive\n\ndata: {not json}\n\n");
    assert!(chunks.is_empty());
}

#[test]
fn sse_flushes_unterminated_tail() {
    let mut buffer = SseBuffer::default();
    assert!(buffer.push(&format!("data: {CHUNK}")).is_empty());
    assert!(buffer.finish().is_some());
}
