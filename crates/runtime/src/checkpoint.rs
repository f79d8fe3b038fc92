//! Thread-keyed conversation checkpoints.
//!
//! A checkpoint holds the full history of a thread plus values the loop
//! accumulates across runs. The runtime loads it before a run and writes the
//! updated history back once the run reaches a terminal state.

use bcore::{Result, model::Message};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashMap, future::Future, sync::Arc};
use tokio::sync::RwLock;

/// Key under which the last structured response is stored.
pub const STRUCTURED_RESPONSE: &str = "structured_response";

/// Saved state of one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub messages: Vec<Message>,
    /// Accumulated values, e.g. [`STRUCTURED_RESPONSE`].
    #[serde(default)]
    pub state: Map<String, Value>,
    /// Number of runs that reached a terminal state.
    #[serde(default)]
    pub steps: usize,
}

/// Checkpoint store.
///
/// Uses RPITIT so implementations stay unboxed.
pub trait Checkpointer: Send + Sync {
    /// The latest checkpoint of `thread`, if one was saved.
    fn load(&self, thread: &str) -> impl Future<Output = Result<Option<Checkpoint>>> + Send;

    /// Replace the checkpoint of `thread`.
    fn save(&self, thread: &str, checkpoint: Checkpoint) -> impl Future<Output = Result<()>> + Send;
}

/// No store: every run starts from an empty history.
impl Checkpointer for () {
    async fn load(&self, _thread: &str) -> Result<Option<Checkpoint>> {
        Ok(None)
    }

    async fn save(&self, _thread: &str, _checkpoint: Checkpoint) -> Result<()> {
        Ok(())
    }
}

/// Process-local store. Clones share the same threads.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointer {
    threads: Arc<RwLock<HashMap<CompactString, Checkpoint>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every saved thread, sorted.
    pub async fn threads(&self) -> Vec<CompactString> {
        let mut ids: Vec<_> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop the checkpoint of `thread`. Returns whether one existed.
    pub async fn clear(&self, thread: &str) -> bool {
        self.threads.write().await.remove(thread).is_some()
    }
}

impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread: &str) -> Result<Option<Checkpoint>> {
        Ok(self.threads.read().await.get(thread).cloned())
    }

    async fn save(&self, thread: &str, checkpoint: Checkpoint) -> Result<()> {
        self.threads.write().await.insert(thread.into(), checkpoint);
        Ok(())
    }
}
