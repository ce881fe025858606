//! Pluggable HTTP transport.
//!
//! The client never talks to the network directly. Every outbound call goes
//! through an [`HttpTransport`], a fetch-like `(url, init) -> response`
//! function that callers can replace for proxying, recording, or testing.
//! [`ReqwestTransport`] is the default implementation (feature
//! `reqwest-transport`).

use crate::error::{InferenceError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Header map. Request headers keep the casing they were inserted with;
/// response headers are stored lower-cased.
pub type Headers = BTreeMap<String, String>;

/// Lazily-read response body.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// Request body: serialized JSON text or a raw binary upload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
}

impl Body {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Text(text) => Bytes::from(text.clone()),
            Self::Binary(bytes) => bytes.clone(),
        }
    }

    /// The body as JSON, when it is valid JSON text.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            Self::Text(text) => serde_json::from_str(text).ok(),
            Self::Binary(_) => None,
        }
    }
}

/// Cookie policy requested by the caller. Only recorded on the request; it is
/// up to the transport to honour it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Include,
}

/// Everything needed to issue one HTTP call, apart from the URL.
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    pub method: Method,
    pub headers: Headers,
    pub body: Option<Body>,
    pub credentials: Option<Credentials>,
    pub signal: Option<CancellationToken>,
}

impl RequestInit {
    pub fn get(headers: Headers) -> Self {
        Self {
            method: Method::Get,
            headers,
            ..Default::default()
        }
    }
}

/// HTTP response with a streaming body.
pub struct HttpResponse {
    status: u16,
    headers: Headers,
    body: ByteStream,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    /// Build a response; header names are lower-cased.
    pub fn new(status: u16, headers: Headers, body: ByteStream) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response whose body is already in memory.
    pub fn from_bytes(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, stream::once(async move { Ok(body) }).boxed())
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Provider-side correlation id, empty when absent.
    pub fn request_id(&self) -> String {
        self.header("x-request-id").unwrap_or_default().to_string()
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read the body as JSON, falling back to a JSON string holding the raw
    /// text when it does not parse. Used for error diagnostics.
    pub async fn json_or_text(self) -> Result<Value> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }
}

/// A fetch-like function: issue `init` against `url` and return the response.
///
/// Implementations must not interpret status codes; non-2xx responses are
/// returned as `Ok`. Only failures below HTTP map to
/// [`InferenceError::Transport`]. Cancellation is applied by the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<HttpResponse>;
}

/// Run `fut` unless `signal` fires first.
pub(crate) async fn with_cancellation<T>(
    signal: Option<&CancellationToken>,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match signal {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => Err(InferenceError::Aborted),
                res = fut => res,
            }
        }
        None => fut.await,
    }
}

/// Sleep for `duration` unless `signal` fires first.
pub(crate) async fn sleep_with_cancellation(
    signal: Option<&CancellationToken>,
    duration: std::time::Duration,
) -> Result<()> {
    with_cancellation(signal, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

/// [`HttpTransport`] backed by a shared [`reqwest::Client`].
#[cfg(feature = "reqwest-transport")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest-transport")]
impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest-transport")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<HttpResponse> {
        let method = match init.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, url);
        for (name, value) in &init.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &init.body {
            builder = builder.body(body.to_bytes());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| InferenceError::Transport(e.to_string())))
            .boxed();

        Ok(HttpResponse::new(status, headers, body))
    }
}
