//! Tests for the scripted `MockModel`.

use braid_core::model::{Message, MessageBuilder, Model, Request, Role};
use braid_core::testing::MockModel;
use futures_util::StreamExt;
use std::time::Duration;

#[tokio::test]
async fn scripted_replies_in_order() {
    let model = MockModel::new("mock").text("one").text("two");
    let request = Request::new("mock").with_messages(vec![Message::user("hi")]);
    assert_eq!(model.send(&request).await.unwrap().content().unwrap(), "one");
    assert_eq!(model.send(&request).await.unwrap().content().unwrap(), "two");
    assert!(model.send(&request).await.is_err());
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn responder_after_script() {
    let model = MockModel::new("echo").respond_with(|req| {
        Ok(Message::assistant(
            req.last_user_text().unwrap_or_default().to_uppercase(),
            None,
            None,
        ))
    });
    let request = Request::new("echo").with_messages(vec![Message::user("abc")]);
    assert_eq!(model.send(&request).await.unwrap().content().unwrap(), "ABC");
}

#[tokio::test]
async fn stream_chunks_concatenate_to_reply() {
    let model = MockModel::new("mock").text("hello world").chunk_size(3);
    let stream = model.stream(Request::new("mock"));
    futures_util::pin_mut!(stream);
    let mut builder = MessageBuilder::new(Role::Assistant);
    let mut pieces = 0;
    while let Some(chunk) = stream.next().await {
        if builder.accept(&chunk.unwrap()) {
            pieces += 1;
        }
    }
    assert_eq!(pieces, 4);
    assert_eq!(builder.build().content, "hello world");
}

#[tokio::test(start_paused = true)]
async fn latency_is_injected() {
    let model = MockModel::new("slow")
        .text("late")
        .latency(|_| Duration::from_secs(5));
    let start = tokio::time::Instant::now();
    model.send(&Request::new("slow")).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));
}
