#![allow(dead_code)]

use crate::error::{InferenceError, Result};
use crate::transport::{Body, Headers, HttpResponse, HttpTransport, Method, RequestInit};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// A request as seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Body>,
}

impl RecordedRequest {
    pub fn json_body(&self) -> Value {
        self.body
            .as_ref()
            .and_then(Body::as_json)
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
struct MockResponse {
    status: u16,
    headers: Headers,
    chunks: Vec<Bytes>,
}

/// Transport that replays queued responses in order and records every
/// request.
pub struct MockTransport {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicU32,
    delay_ms: u64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
            delay_ms: 0,
        }
    }

    fn push(self, status: u16, headers: Headers, chunks: Vec<Bytes>) -> Self {
        self.responses.lock().unwrap().push_back(MockResponse {
            status,
            headers,
            chunks,
        });
        self
    }

    pub fn with_response(self, status: u16, content_type: &str, body: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), content_type.into());
        self.push(status, headers, vec![Bytes::from(body.to_string())])
    }

    pub fn with_json(self, status: u16, body: Value) -> Self {
        self.with_response(status, "application/json", &body.to_string())
    }

    pub fn with_json_and_request_id(self, status: u16, body: Value, request_id: &str) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), "application/json".into());
        headers.insert("x-request-id".into(), request_id.into());
        self.push(status, headers, vec![Bytes::from(body.to_string())])
    }

    pub fn with_bytes(self, status: u16, content_type: &str, body: &'static [u8]) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), content_type.into());
        self.push(status, headers, vec![Bytes::from_static(body)])
    }

    /// Queue an event-stream response delivered in the given chunks.
    pub fn with_sse(self, chunks: &[&str]) -> Self {
        let mut headers = Headers::new();
        headers.insert("content-type".into(), "text/event-stream".into());
        let chunks = chunks.iter().map(|c| Bytes::from(c.to_string())).collect();
        self.push(200, headers, chunks)
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, index: usize) -> RecordedRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<HttpResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            method: init.method,
            headers: init.headers.clone(),
            body: init.body.clone(),
        });
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| InferenceError::Transport(format!("no mock response for {url}")))?;
        let body = stream::iter(response.chunks.into_iter().map(Ok)).boxed();
        Ok(HttpResponse::new(response.status, response.headers, body))
    }
}
