//! The stage interface and its three invocation modes.

use crate::{Data, Sequence};
use bcore::{Error, Result};
use futures_util::{
    StreamExt,
    future::{BoxFuture, join_all},
    stream::{self, BoxStream},
};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// A stream of output fragments.
pub type DataStream<'a> = BoxStream<'a, Result<Data>>;

/// Options for [`Runnable::batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Upper bound on invocations in flight. `None` runs every input at once.
    pub max_concurrency: Option<usize>,
}

impl BatchOptions {
    /// At most `limit` invocations in flight.
    pub fn max_concurrency(limit: usize) -> Self {
        Self {
            max_concurrency: Some(limit),
        }
    }
}

/// One unit of work in a pipeline.
///
/// Only [`Runnable::invoke`] is required. Streaming defaults to a single
/// fragment holding the invoke result, so that concatenating a stream always
/// yields what invoke would have returned.
pub trait Runnable: Send + Sync {
    /// Name used when attributing errors.
    fn name(&self) -> &str;

    /// Run once on a whole input.
    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>>;

    /// Run once, yielding output fragments as they become available.
    fn stream(&self, input: Data) -> DataStream<'_> {
        Box::pin(stream::once(self.invoke(input)))
    }

    /// Run on a stream of input fragments.
    ///
    /// The default waits for the whole input, then streams. Stages that can
    /// work fragment by fragment override this.
    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut input = input;
            let mut whole: Option<Data> = None;
            while let Some(fragment) = input.next().await {
                let fragment = fragment?;
                whole = Some(match whole {
                    Some(acc) => acc.concat(fragment),
                    None => fragment,
                });
            }

            if let Some(whole) = whole {
                let mut output = self.stream(whole);
                while let Some(fragment) = output.next().await {
                    yield fragment?;
                }
            }
        })
    }

    /// Run every input independently, at most `max_concurrency` at a time.
    ///
    /// Results are in input order regardless of completion order.
    fn batch(&self, inputs: Vec<Data>, options: BatchOptions) -> BoxFuture<'_, Vec<Result<Data>>> {
        Box::pin(async move {
            let limit = options.max_concurrency.unwrap_or(inputs.len()).max(1);
            tracing::debug!(stage = self.name(), inputs = inputs.len(), limit, "batch");
            let gate = Semaphore::new(limit);
            let runs = inputs.into_iter().map(|input| {
                let gate = &gate;
                async move {
                    let _permit = gate.acquire().await.map_err(|_| Error::Cancelled)?;
                    self.invoke(input).await
                }
            });
            join_all(runs).await
        })
    }
}

impl<R: Runnable + ?Sized> Runnable for Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        (**self).invoke(input)
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        (**self).stream(input)
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        (**self).transform(input)
    }

    fn batch(&self, inputs: Vec<Data>, options: BatchOptions) -> BoxFuture<'_, Vec<Result<Data>>> {
        (**self).batch(inputs, options)
    }
}

impl<R: Runnable + ?Sized> Runnable for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        (**self).invoke(input)
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        (**self).stream(input)
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        (**self).transform(input)
    }

    fn batch(&self, inputs: Vec<Data>, options: BatchOptions) -> BoxFuture<'_, Vec<Result<Data>>> {
        (**self).batch(inputs, options)
    }
}

/// Composition helpers for every runnable.
pub trait RunnableExt: Runnable + Sized + 'static {
    /// Feed this stage's output into `next`.
    fn pipe(self, next: impl Runnable + 'static) -> Sequence {
        Sequence::new().then(self).then(next)
    }

    /// Erase the concrete type.
    fn boxed(self) -> Arc<dyn Runnable> {
        Arc::new(self)
    }
}

impl<R: Runnable + Sized + 'static> RunnableExt for R {}
