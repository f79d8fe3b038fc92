//! Tests for messages, stream accumulation and wire types.

use braid_core::model::{
    FinishReason, Message, MessageBuilder, Request, ResponseFormat, Response, Role, StreamChunk,
    Tool, ToolCall, ToolChoice, transcript,
};
use braid_core::OutputSchema;

#[test]
fn builder_merges_tool_call_deltas_by_index() {
    let mut builder = MessageBuilder::new(Role::Assistant);
    let first = ToolCall {
        index: 0,
        ..ToolCall::function("call_1", "lookup", "{\"q\":")
    };
    let second = ToolCall {
        id: "".into(),
        index: 0,
        call_type: "".into(),
        function: braid_core::model::FunctionCall {
            name: "".into(),
            arguments: "\"rust\"}".into(),
        },
    };
    builder.accept(&StreamChunk::text("Looking"));
    builder.accept(&StreamChunk::tool_calls_delta(vec![first]));
    builder.accept(&StreamChunk::tool_calls_delta(vec![second]));
    let message = builder.build();

    assert_eq!(message.content, "Looking");
    assert_eq!(message.tool_calls.len(), 1);
    assert_eq!(message.tool_calls[0].id, "call_1");
    assert_eq!(message.tool_calls[0].function.arguments, "{\"q\":\"rust\"}");
}

#[test]
fn empty_arguments_parse_as_object() {
    let call = ToolCall::function("1", "now", "");
    assert_eq!(call.parse_arguments().unwrap(), serde_json::json!({}));
}

#[test]
fn transcript_labels_roles() {
    let messages = [
        Message::system("be brief"),
        Message::user("hi"),
        Message::assistant("hello", None, None),
    ];
    assert_eq!(transcript(&messages), "System: be brief\nHuman: hi\nAI: hello");
}

#[test]
fn response_round_trips_message() {
    let call = ToolCall::function("c1", "add", "{\"a\":1}");
    let message = Message::assistant("", None, Some(&[call]));
    let response = Response::from_message("m", &message);
    assert_eq!(response.reason(), Some(&FinishReason::ToolCalls));
    assert_eq!(response.message().unwrap().tool_calls[0].function.name, "add");
}

#[test]
fn parse_openai_response() {
    let body = r#"{
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1,
        "model": "glm-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hi"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
    }"#;
    let response: Response = serde_json::from_str(body).unwrap();
    assert_eq!(response.content().unwrap(), "hi");
    assert_eq!(response.usage.total_tokens, 4);
}

#[test]
fn parse_stream_chunk_with_tool_delta() {
    let body = r#"{
        "id": "chatcmpl-1",
        "model": "glm-4",
        "choices": [{
            "index": 0,
            "delta": {"tool_calls": [{"index": 1, "id": "c", "type": "function",
                      "function": {"name": "f", "arguments": "{}"}}]},
            "finish_reason": null
        }]
    }"#;
    let chunk: StreamChunk = serde_json::from_str(body).unwrap();
    assert_eq!(chunk.tool_calls().unwrap()[0].index, 1);
    assert!(chunk.content().is_none());
}

#[test]
fn request_skips_unset_fields() {
    let request = Request::new("m").with_messages(vec![Message::user("x")]);
    let value = serde_json::to_value(&request).unwrap();
    assert!(value.get("tools").is_none());
    assert!(value.get("temperature").is_none());
    assert!(value.get("timeout").is_none());
}

#[test]
fn request_carries_tools_and_format() {
    let schema = OutputSchema::of::<Vec<String>>();
    let request = Request::new("m")
        .with_tools(vec![Tool::from_schema("steps", "", &schema)])
        .with_tool_choice(ToolChoice::from("steps"))
        .with_response_format(ResponseFormat::JsonObject);
    assert_eq!(request.tools.as_ref().unwrap()[0].name, "steps");
    assert!(matches!(request.response_format, Some(ResponseFormat::JsonObject)));
}

#[test]
fn last_user_text_skips_other_roles() {
    let request = Request::new("m").with_messages(vec![
        Message::user("first"),
        Message::user("second"),
        Message::assistant("answer", None, None),
    ]);
    assert_eq!(request.last_user_text(), Some("second"));
}
