//! Tests for checkpoint stores.

use bcore::model::Message;
use braid_runtime::{Checkpoint, Checkpointer, InMemoryCheckpointer, STRUCTURED_RESPONSE};
use serde_json::json;

fn checkpoint(texts: &[&str]) -> Checkpoint {
    Checkpoint {
        messages: texts.iter().map(|t| Message::user(*t)).collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn unit_store_forgets() {
    ().save("t", checkpoint(&["hello"])).await.unwrap();
    assert!(().load("t").await.unwrap().is_none());
}

#[tokio::test]
async fn in_memory_round_trip() {
    let store = InMemoryCheckpointer::new();
    assert!(store.load("t").await.unwrap().is_none());

    let mut saved = checkpoint(&["hello"]);
    saved.state.insert(STRUCTURED_RESPONSE.into(), json!({"ok": true}));
    saved.steps = 3;
    store.save("t", saved.clone()).await.unwrap();
    assert_eq!(store.load("t").await.unwrap(), Some(saved));
}

#[tokio::test]
async fn save_replaces() {
    let store = InMemoryCheckpointer::new();
    store.save("t", checkpoint(&["one"])).await.unwrap();
    store.save("t", checkpoint(&["one", "two"])).await.unwrap();
    assert_eq!(store.load("t").await.unwrap().unwrap().messages.len(), 2);
}

#[tokio::test]
async fn clones_share_threads() {
    let store = InMemoryCheckpointer::new();
    let other = store.clone();
    other.save("b", checkpoint(&["x"])).await.unwrap();
    other.save("a", checkpoint(&["y"])).await.unwrap();
    assert_eq!(store.threads().await, ["a", "b"]);

    assert!(store.clear("a").await);
    assert!(!store.clear("a").await);
    assert_eq!(other.threads().await, ["b"]);
}

#[test]
fn checkpoint_serializes() {
    let saved = checkpoint(&["hi"]);
    let text = serde_json::to_string(&saved).unwrap();
    let back: Checkpoint = serde_json::from_str(&text).unwrap();
    assert_eq!(back, saved);
}
