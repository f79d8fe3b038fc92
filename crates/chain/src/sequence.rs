//! Ordered composition of stages.

use crate::{Data, DataStream, Runnable};
use bcore::Result;
use futures_util::{TryStreamExt, future::BoxFuture};
use std::sync::Arc;

/// Stages run in order, each output feeding the next input.
///
/// A failing stage ends the run; its error is attributed to that stage
/// once, so nested sequences report the innermost failing stage.
#[derive(Clone, Default)]
pub struct Sequence {
    stages: Vec<Arc<dyn Runnable>>,
}

impl Sequence {
    /// An empty sequence. Invoking it returns the input unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn then(mut self, stage: impl Runnable + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Append an already shared stage.
    pub fn then_shared(mut self, stage: Arc<dyn Runnable>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a stage, keeping the sequence flat.
    pub fn pipe(self, next: impl Runnable + 'static) -> Self {
        self.then(next)
    }

    /// Names of the stages in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Runnable for Sequence {
    fn name(&self) -> &str {
        "Sequence"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let mut data = input;
            for stage in &self.stages {
                tracing::trace!(stage = stage.name(), "invoke");
                data = stage
                    .invoke(data)
                    .await
                    .map_err(|e| e.in_stage(stage.name()))?;
            }
            Ok(data)
        })
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        let Some((first, rest)) = self.stages.split_first() else {
            return Box::pin(futures_util::stream::once(async move { Ok(input) }));
        };

        let name = first.name();
        let mut output: DataStream<'_> =
            Box::pin(first.stream(input).map_err(move |e| e.in_stage(name)));
        for stage in rest {
            let name = stage.name();
            output = Box::pin(stage.transform(output).map_err(move |e| e.in_stage(name)));
        }
        output
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        let mut output = input;
        for stage in &self.stages {
            let name = stage.name();
            output = Box::pin(stage.transform(output).map_err(move |e| e.in_stage(name)));
        }
        output
    }
}
