//! Predicate-guarded dispatch.

use crate::{Data, DataStream, Runnable};
use bcore::Result;
use futures_util::future::BoxFuture;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Data) -> bool + Send + Sync>;

/// Runs the first case whose predicate holds, or the default.
///
/// Predicates are evaluated in insertion order and evaluation stops at the
/// first match.
#[derive(Clone)]
pub struct Branch {
    cases: Vec<(Predicate, Arc<dyn Runnable>)>,
    default: Arc<dyn Runnable>,
}

impl Branch {
    /// A branch with only its default.
    pub fn new(default: impl Runnable + 'static) -> Self {
        Self {
            cases: Vec::new(),
            default: Arc::new(default),
        }
    }

    /// Append a case.
    pub fn case(
        mut self,
        predicate: impl Fn(&Data) -> bool + Send + Sync + 'static,
        runnable: impl Runnable + 'static,
    ) -> Self {
        self.cases.push((Arc::new(predicate), Arc::new(runnable)));
        self
    }

    /// The runnable chosen for `input`.
    pub fn select(&self, input: &Data) -> &Arc<dyn Runnable> {
        self.cases
            .iter()
            .find(|(predicate, _)| predicate(input))
            .map(|(_, runnable)| runnable)
            .unwrap_or(&self.default)
    }
}

impl Runnable for Branch {
    fn name(&self) -> &str {
        "Branch"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        let chosen = self.select(&input);
        tracing::debug!(chosen = chosen.name(), "branch");
        chosen.invoke(input)
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        self.select(&input).stream(input)
    }
}
