//! Shared HTTP transport for OpenAI-compatible providers.
//!
//! `HttpProvider` wraps a `reqwest::Client` with pre-configured headers and
//! endpoint URL. Provides `send()` for non-streaming and `stream_sse()` for
//! Server-Sent Events streaming.

use anyhow::{Result, bail};
use async_stream::try_stream;
use bcore::model::{Response, StreamChunk};
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{
    Client, Method, RequestBuilder,
    header::{self, HeaderMap, HeaderValue},
};
use serde::Serialize;
use std::time::Duration;

/// Shared HTTP transport for OpenAI-compatible providers.
///
/// Holds a `reqwest::Client`, pre-built headers (auth + content-type),
/// and the target endpoint URL.
#[derive(Clone)]
pub struct HttpProvider {
    client: Client,
    headers: HeaderMap,
    endpoint: String,
}

impl HttpProvider {
    /// Create a provider with Bearer token authentication.
    pub fn bearer(client: Client, key: &str, endpoint: &str) -> Result<Self> {
        let mut provider = Self::no_auth(client, endpoint);
        provider
            .headers
            .insert(header::AUTHORIZATION, format!("Bearer {key}").parse()?);
        Ok(provider)
    }

    /// Create a provider without authentication (e.g. Ollama).
    pub fn no_auth(client: Client, endpoint: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        Self {
            client,
            headers,
            endpoint: endpoint.to_owned(),
        }
    }

    fn post(&self, body: &impl Serialize, timeout: Option<Duration>) -> RequestBuilder {
        let request = self
            .client
            .request(Method::POST, &self.endpoint)
            .headers(self.headers.clone())
            .json(body);
        match timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Send a non-streaming request and deserialize the response as JSON.
    ///
    /// Non-success statuses are errors carrying the response body.
    pub async fn send(&self, body: &impl Serialize, timeout: Option<Duration>) -> Result<Response> {
        tracing::trace!("request: {}", serde_json::to_string(body)?);
        let sent = self.post(body, timeout).send().await?;
        let response = check_status(&self.endpoint, sent).await?;
        let text = response.text().await?;
        tracing::trace!("response: {text}");
        serde_json::from_str(&text).map_err(Into::into)
    }

    /// Stream an SSE response (OpenAI-compatible format).
    ///
    /// Parses `data: ` prefixed lines, skips `[DONE]` sentinel, and
    /// deserializes each chunk as [`StreamChunk`].
    pub fn stream_sse<B: Serialize>(
        &self,
        body: &B,
        timeout: Option<Duration>,
    ) -> impl Stream<Item = Result<StreamChunk>> + Send + use<'_, B> {
        if let Ok(body) = serde_json::to_string(body) {
            tracing::trace!("request: {}", body);
        }
        let request = self.post(body, timeout);
        let endpoint = self.endpoint.clone();

        try_stream! {
            let response = check_status(&endpoint, request.send().await?).await?;
            let mut events = SseBuffer::default();
            let mut stream = response.bytes_stream();
            while let Some(next) = stream.next().await {
                let bytes = next?;
                let text = String::from_utf8_lossy(&bytes);
                tracing::trace!("chunk: {}", text);
                for chunk in events.push(&text) {
                    yield chunk;
                }
            }
            for chunk in events.finish() {
                yield chunk;
            }
        }
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

async fn check_status(endpoint: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    bail!("{endpoint} returned {status}: {text}")
}

/// Line buffer for server-sent events.
///
/// Network reads may split an event anywhere; only complete lines are
/// decoded, the tail waits for the next read.
#[derive(Default)]
pub struct SseBuffer {
    pending: String,
}

impl SseBuffer {
    /// Feed raw text, returning every chunk completed by it.
    pub fn push(&mut self, text: &str) -> Vec<StreamChunk> {
        self.pending.push_str(text);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if let Some(chunk) = decode_line(&line) {
                out.push(chunk);
            }
        }
        out
    }

    /// Decode whatever is left once the body ends.
    pub fn finish(&mut self) -> Option<StreamChunk> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }
}

fn decode_line(line: &str) -> Option<StreamChunk> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data.starts_with("[DONE]") {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::warn!("failed to parse chunk: {e}, data: {data}");
            None
        }
    }
}
