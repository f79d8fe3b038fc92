//! Tests for composed pipelines: invoke, stream, batch and branch.

use bcore::{
    Error,
    model::{Message, Role, ToolCall},
    testing::MockModel,
};
use braid_chain::{
    BatchOptions, Branch, ChatModel, ChatPromptTemplate, Data, Lambda, ListOutputParser,
    Passthrough, PromptTemplate, Runnable, RunnableExt, Sequence, StrOutputParser,
};
use futures_util::StreamExt;
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

fn echo_model() -> MockModel {
    MockModel::new("echo")
        .chunk_size(3)
        .respond_with(|req| {
            let text = req.last_user_text().unwrap_or_default();
            Ok(Message::assistant(format!("echo: {text}"), None, None))
        })
}

fn label(text: &'static str) -> Lambda {
    Lambda::new(text, move |_| Ok(Data::from(text)))
}

async fn collect(stream: braid_chain::DataStream<'_>) -> Vec<Data> {
    stream.map(|d| d.unwrap()).collect().await
}

// --- invoke / stream ---

#[tokio::test]
async fn prompt_model_parser_invoke() {
    let chain = PromptTemplate::new("joke about {topic}")
        .unwrap()
        .pipe(ChatModel::new(echo_model()))
        .pipe(StrOutputParser);
    let out = chain.invoke(Data::Json(json!({"topic": "bears"}))).await.unwrap();
    assert_eq!(out, Data::Text("echo: joke about bears".into()));
}

#[tokio::test]
async fn stream_concatenates_to_invoke() {
    let chain = ChatPromptTemplate::new()
        .human("{q}")
        .unwrap()
        .pipe(ChatModel::new(echo_model()))
        .pipe(StrOutputParser);
    let input = Data::Json(json!({"q": "what is rust"}));

    let invoked = chain.invoke(input.clone()).await.unwrap();
    let fragments = collect(chain.stream(input)).await;
    assert!(fragments.len() > 1, "model output should arrive in pieces");
    assert_eq!(Data::concat_all(fragments).unwrap(), invoked);
}

#[tokio::test]
async fn stream_concatenates_to_invoke_for_messages() {
    let model = ChatModel::new(echo_model());
    let input = Data::from("hello there");
    let invoked = model.invoke(input.clone()).await.unwrap();
    let streamed = Data::concat_all(collect(model.stream(input)).await).unwrap();
    assert_eq!(streamed, invoked);
}

#[tokio::test]
async fn streamed_tool_calls_keep_their_order() {
    let calls = [
        ToolCall::function("call_a", "lookup", r#"{"q":"rust"}"#),
        ToolCall::function("call_b", "compare", r#"{"a":1,"b":2}"#),
    ];
    let reply = Message::assistant("", None, Some(&calls));
    let model = ChatModel::new(MockModel::new("tools").reply(reply.clone()).reply(reply));

    let invoked = model.invoke(Data::from("go")).await.unwrap();
    let streamed = Data::concat_all(collect(model.stream(Data::from("go"))).await).unwrap();
    assert_eq!(streamed, invoked);

    let Data::Message(message) = streamed else {
        panic!("expected a message, got {streamed:?}");
    };
    let ids: Vec<_> = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["call_a", "call_b"]);
    assert_eq!(message.tool_calls[1].index, 1);
}

#[tokio::test]
async fn stream_through_list_parser_matches_invoke() {
    let model = MockModel::new("list")
        .chunk_size(2)
        .respond_with(|_| Ok(Message::assistant("plan, build, test, ship", None, None)));
    let chain = ChatModel::new(model).pipe(ListOutputParser);

    let invoked = chain.invoke(Data::from("steps?")).await.unwrap();
    let fragments = collect(chain.stream(Data::from("steps?"))).await;
    assert_eq!(fragments.len(), 4);
    assert_eq!(Data::concat_all(fragments).unwrap(), invoked);
    assert_eq!(invoked, Data::Json(json!(["plan", "build", "test", "ship"])));
}

#[tokio::test]
async fn empty_sequence_is_identity() {
    let out = Sequence::new().invoke(Data::from("same")).await.unwrap();
    assert_eq!(out, Data::from("same"));
}

#[tokio::test]
async fn pipe_flattens_sequences() {
    let chain = label("a").pipe(label("b")).pipe(label("c"));
    assert_eq!(chain.stage_names(), ["a", "b", "c"]);
}

// --- errors ---

#[tokio::test]
async fn first_failing_stage_is_named() {
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = ran.clone();
    let chain = Passthrough
        .pipe(Lambda::new("explode", |_| Err(Error::Parse("boom".into()))))
        .pipe(Lambda::new("after", move |d| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(d)
        }));

    let err = chain.invoke(Data::from("x")).await.unwrap_err();
    assert_eq!(err.stage(), Some("explode"));
    assert!(matches!(err.root(), Error::Parse(_)));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn nested_sequences_wrap_once() {
    let inner = Passthrough.pipe(Lambda::new("inner", |_| Err(Error::Parse("bad".into()))));
    let outer = Sequence::new().then(Passthrough).then(inner);
    let err = outer.invoke(Data::from("x")).await.unwrap_err();
    assert_eq!(err.stage(), Some("inner"));
    let Error::Stage { source, .. } = &err else {
        panic!("expected stage error");
    };
    assert!(!matches!(**source, Error::Stage { .. }));
}

#[tokio::test]
async fn model_failure_is_a_request_error() {
    let chain = ChatModel::new(MockModel::new("down").fail("503 overloaded")).pipe(StrOutputParser);
    let err = chain.invoke(Data::from("hi")).await.unwrap_err();
    assert_eq!(err.stage(), Some("ChatModel"));
    assert!(matches!(err.root(), Error::Request(m) if m.contains("503")));
}

#[tokio::test]
async fn stream_errors_are_attributed() {
    let chain = ChatModel::new(MockModel::new("down").fail("reset")).pipe(StrOutputParser);
    let results: Vec<_> = chain.stream(Data::from("hi")).collect().await;
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.stage(), Some("ChatModel"));
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out() {
    let model = MockModel::new("slow")
        .text("late")
        .latency(|_| Duration::from_secs(30));
    let chat = ChatModel::new(model).with_timeout(Duration::from_secs(5));
    let err = chat.invoke(Data::from("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
}

#[tokio::test]
async fn cancelled_call_fails_fast() {
    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let chat = ChatModel::new(MockModel::new("m").text("never")).with_cancellation(token);
    let err = chat.invoke(Data::from("hi")).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

// --- batch ---

#[tokio::test(start_paused = true)]
async fn batch_preserves_input_order() {
    let model = MockModel::new("echo")
        .respond_with(|req| {
            Ok(Message::assistant(
                req.last_user_text().unwrap_or_default().to_owned(),
                None,
                None,
            ))
        })
        .latency(|req| match req.last_user_text() {
            Some("a") => Duration::from_millis(300),
            Some("b") => Duration::from_millis(100),
            _ => Duration::from_millis(10),
        });
    let chain = ChatModel::new(model).pipe(StrOutputParser);

    let inputs = vec![Data::from("a"), Data::from("b"), Data::from("c")];
    let out = chain.batch(inputs, BatchOptions::default()).await;
    let out: Vec<_> = out.into_iter().map(Result::unwrap).collect();
    assert_eq!(out, [Data::from("a"), Data::from("b"), Data::from("c")]);
}

#[tokio::test(start_paused = true)]
async fn batch_respects_max_concurrency() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (now, max) = (in_flight.clone(), peak.clone());
    let stage = Lambda::from_async("slow", move |d| {
        let (now, max) = (now.clone(), max.clone());
        async move {
            let current = now.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            now.fetch_sub(1, Ordering::SeqCst);
            Ok(d)
        }
    });

    let inputs: Vec<_> = (0..6).map(|i| Data::Json(json!(i))).collect();
    let out = stage.batch(inputs, BatchOptions::max_concurrency(2)).await;
    assert_eq!(out.len(), 6);
    assert_eq!(*out[5].as_ref().unwrap(), Data::Json(json!(5)));
    assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_reports_per_item_errors() {
    let stage = Lambda::new("odd", |d| match d {
        Data::Json(v) if v.as_i64().is_some_and(|n| n % 2 == 1) => Err(Error::Parse("odd".into())),
        other => Ok(other),
    });
    let inputs: Vec<_> = (0..3).map(|i| Data::Json(json!(i))).collect();
    let out = stage.batch(inputs, BatchOptions::default()).await;
    assert!(out[0].is_ok());
    assert!(out[1].is_err());
    assert!(out[2].is_ok());
}

// --- branch ---

#[tokio::test]
async fn branch_picks_first_matching_case() {
    let branch = Branch::new(label("default"))
        .case(|_| false, label("A"))
        .case(|_| true, label("B"))
        .case(|_| true, label("C"));
    let out = branch.invoke(Data::from("x")).await.unwrap();
    assert_eq!(out, Data::from("B"));
}

#[tokio::test]
async fn branch_falls_back_to_default() {
    let branch = Branch::new(label("default")).case(|_| false, label("A"));
    assert_eq!(branch.invoke(Data::from("x")).await.unwrap(), Data::from("default"));
}

#[tokio::test]
async fn branch_routes_on_classification() {
    let classifier = MockModel::new("router").respond_with(|req| {
        let text = req.last_user_text().unwrap_or_default();
        let topic = if text.contains("rust") { "code" } else { "other" };
        Ok(Message::assistant(topic, None, None))
    });
    let route = ChatModel::new(classifier).pipe(StrOutputParser);
    let branch = Branch::new(label("general"))
        .case(|d| d.as_text() == Some("code"), label("engineer"));
    let chain = route.pipe(branch);

    assert_eq!(chain.invoke(Data::from("rust lifetimes")).await.unwrap(), Data::from("engineer"));
    assert_eq!(chain.invoke(Data::from("poems")).await.unwrap(), Data::from("general"));
}

#[tokio::test]
async fn assign_adds_computed_keys() {
    let chain = Passthrough::assign()
        .with("upper", Lambda::new("upper", |d| {
            let text = d.into_json()["word"].as_str().unwrap_or_default().to_uppercase();
            Ok(Data::from(text))
        }))
        .with("len", Lambda::new("len", |d| {
            let len = d.into_json()["word"].as_str().map_or(0, str::len);
            Ok(Data::Json(json!(len)))
        }));
    let out = chain.invoke(Data::Json(json!({"word": "hey"}))).await.unwrap();
    assert_eq!(out, Data::Json(json!({"word": "hey", "upper": "HEY", "len": 3})));
}

#[tokio::test]
async fn model_requests_carry_config() {
    let model = MockModel::new("m").text("ok");
    let chat = ChatModel::new(model.clone())
        .with_model("glm-4")
        .with_temperature(0.9)
        .with_max_tokens(5000);
    chat.invoke(Data::Messages(vec![Message::system("s"), Message::user("u")]))
        .await
        .unwrap();
    let request = &model.requests()[0];
    assert_eq!(request.model, "glm-4");
    assert_eq!(request.temperature, Some(0.9));
    assert_eq!(request.max_tokens, Some(5000));
    assert_eq!(request.messages[0].role, Role::System);
}
