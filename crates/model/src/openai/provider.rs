//! Model trait implementation for the OpenAI-compatible provider.

use super::OpenAI;
use crate::request::Request;
use anyhow::Result;
use bcore::model::{Model, Response, StreamChunk};
use compact_str::CompactString;
use futures_core::Stream;

impl OpenAI {
    fn body(&self, mut request: bcore::model::Request) -> Request {
        if request.model.is_empty() {
            request.model = self.model.clone();
        }
        Request::from(request)
    }
}

impl Model for OpenAI {
    async fn send(&self, request: &bcore::model::Request) -> Result<Response> {
        tracing::debug!(model = %request.model, endpoint = self.endpoint(), "send");
        let body = self.body(request.clone());
        self.http.send(&body, request.timeout).await
    }

    fn stream(
        &self,
        request: bcore::model::Request,
    ) -> impl Stream<Item = Result<StreamChunk>> + Send {
        tracing::debug!(model = %request.model, endpoint = self.endpoint(), "stream");
        // No whole-body timeout here; chunk pacing is bounded by the caller.
        let usage = request.usage;
        let body = self.body(request).stream(usage);
        self.http.stream_sse(&body, None)
    }

    fn active_model(&self) -> CompactString {
        self.model.clone()
    }

    fn native_structured_output(&self) -> bool {
        self.structured
    }
}
