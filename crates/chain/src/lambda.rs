//! Function stages.

use crate::{Data, DataStream, Runnable};
use bcore::{Error, Result};
use compact_str::CompactString;
use futures_util::future::{BoxFuture, join_all};
use serde_json::{Map, Value};
use std::{future::Future, sync::Arc};

type LambdaFn = Arc<dyn Fn(Data) -> BoxFuture<'static, Result<Data>> + Send + Sync>;

/// A stage wrapping a function.
#[derive(Clone)]
pub struct Lambda {
    name: CompactString,
    f: LambdaFn,
}

impl Lambda {
    /// Wrap a synchronous function.
    pub fn new(
        name: impl Into<CompactString>,
        f: impl Fn(Data) -> Result<Data> + Send + Sync + 'static,
    ) -> Self {
        let f = Arc::new(f);
        Self {
            name: name.into(),
            f: Arc::new(move |input| -> BoxFuture<'static, Result<Data>> {
                let f = f.clone();
                Box::pin(async move { f(input) })
            }),
        }
    }

    /// Wrap an asynchronous function.
    pub fn from_async<F, Fut>(name: impl Into<CompactString>, f: F) -> Self
    where
        F: Fn(Data) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Data>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |input| -> BoxFuture<'static, Result<Data>> { Box::pin(f(input)) }),
        }
    }
}

impl Runnable for Lambda {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        (self.f)(input)
    }
}

/// Returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Passthrough {
    /// Keep the input and add keys computed from it.
    pub fn assign() -> Assign {
        Assign::default()
    }
}

impl Runnable for Passthrough {
    fn name(&self) -> &str {
        "Passthrough"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move { Ok(input) })
    }

    fn stream(&self, input: Data) -> DataStream<'_> {
        Box::pin(futures_util::stream::once(async move { Ok(input) }))
    }

    fn transform<'a>(&'a self, input: DataStream<'a>) -> DataStream<'a> {
        input
    }
}

/// Adds keys to an object input, each computed by a runnable from the
/// whole input. Computations run concurrently.
#[derive(Clone, Default)]
pub struct Assign {
    keys: Vec<(String, Arc<dyn Runnable>)>,
}

impl Assign {
    /// Compute `key` with `runnable`.
    pub fn with(mut self, key: impl Into<String>, runnable: impl Runnable + 'static) -> Self {
        self.keys.push((key.into(), Arc::new(runnable)));
        self
    }
}

impl Runnable for Assign {
    fn name(&self) -> &str {
        "Assign"
    }

    fn invoke(&self, input: Data) -> BoxFuture<'_, Result<Data>> {
        Box::pin(async move {
            let mut object = match &input {
                Data::Json(Value::Object(map)) => map.clone(),
                Data::Json(other) => {
                    return Err(Error::Format(format!(
                        "assign needs an object input, got {other}"
                    )));
                }
                other => Map::from_iter([("input".to_owned(), other.clone().into_json())]),
            };

            let runs = self.keys.iter().map(|(key, runnable)| {
                let input = input.clone();
                async move {
                    let out = runnable
                        .invoke(input)
                        .await
                        .map_err(|e| e.in_stage(key.as_str()))?;
                    Ok::<_, Error>((key.clone(), out.into_json()))
                }
            });
            for result in join_all(runs).await {
                let (key, value) = result?;
                object.insert(key, value);
            }
            Ok(Data::Json(Value::Object(object)))
        })
    }
}
