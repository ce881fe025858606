//! Error types for the inference client.

use crate::transport::Headers;
use serde_json::Value;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Headers that carry credentials, matched case-insensitively.
pub const CREDENTIAL_HEADERS: [&str; 2] = ["Authorization", "X-Key"];

/// Value written over a credential in error snapshots.
pub const REDACTED: &str = "[redacted]";

/// What a redacted `Authorization: Bearer` header reads as.
pub const REDACTED_AUTHORIZATION: &str = "Bearer [redacted]";

/// Outbound request captured for diagnostics.
///
/// Every header in [`CREDENTIAL_HEADERS`] is redacted when the snapshot is
/// built. An auth scheme prefix (`Bearer`, `Key`) is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequestSnapshot {
    pub url: String,
    pub method: String,
    pub headers: Option<Headers>,
    pub body: Option<Value>,
}

impl HttpRequestSnapshot {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: None,
            body: None,
        }
    }

    /// Attach request headers, redacting credentials.
    pub fn with_headers(mut self, headers: &Headers) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| {
                let value = if is_credential_header(name) {
                    redact(value)
                } else {
                    value.clone()
                };
                (name.clone(), value)
            })
            .collect();
        self.headers = Some(headers);
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }
}

fn is_credential_header(name: &str) -> bool {
    CREDENTIAL_HEADERS
        .iter()
        .any(|credential| credential.eq_ignore_ascii_case(name))
}

fn redact(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} {REDACTED}"),
        None => REDACTED.to_string(),
    }
}

/// Response half of an HTTP error. `body` holds parsed JSON when the response
/// was JSON, otherwise the raw text as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponseSnapshot {
    pub request_id: String,
    pub status: u16,
    pub body: Value,
}

/// Message plus the request/response pair that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpErrorContext {
    pub message: String,
    pub request: HttpRequestSnapshot,
    pub response: HttpResponseSnapshot,
}

/// Unified error type for resolution, request building, transport, and
/// output decoding failures.
///
/// Only the single cold-start retry in the request executor recovers from an
/// error automatically; every variant here reaches the caller unchanged.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Caller-supplied arguments violate an invariant (URL used as a model id,
    /// both `endpoint_url` and a provider given, task/provider mismatch, ...).
    #[error("{0}")]
    Input(String),

    /// A hub lookup (model mapping, default task, model tree) failed or
    /// returned malformed data.
    #[error("{}", .0.message)]
    HubApi(Box<HttpErrorContext>),

    /// The inference provider answered with a non-2xx status.
    #[error("{}", .0.message)]
    ProviderApi(Box<HttpErrorContext>),

    /// The provider answered 2xx with a payload that does not match its
    /// documented contract.
    #[error("{0}")]
    ProviderOutput(String),

    /// A task wrapper could not decode the normalized result into its typed
    /// output.
    #[error(
        "Expected {expected}. Use the raw request() call if the provider returns a different shape."
    )]
    OutputValidation {
        expected: String,
        #[source]
        cause: serde_json::Error,
    },

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's cancellation token fired before the operation finished.
    #[error("Request aborted")]
    Aborted,

    /// Network-level failure below HTTP (connection reset, DNS, TLS, ...).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl InferenceError {
    pub(crate) fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub(crate) fn provider_output(message: impl Into<String>) -> Self {
        Self::ProviderOutput(message.into())
    }

    pub(crate) fn hub_api(
        message: impl Into<String>,
        request: HttpRequestSnapshot,
        response: HttpResponseSnapshot,
    ) -> Self {
        Self::HubApi(Box::new(HttpErrorContext {
            message: message.into(),
            request,
            response,
        }))
    }

    pub(crate) fn provider_api(
        message: impl Into<String>,
        request: HttpRequestSnapshot,
        response: HttpResponseSnapshot,
    ) -> Self {
        Self::ProviderApi(Box::new(HttpErrorContext {
            message: message.into(),
            request,
            response,
        }))
    }

    /// HTTP context for [`HubApi`](Self::HubApi) and
    /// [`ProviderApi`](Self::ProviderApi) errors.
    pub fn http_context(&self) -> Option<&HttpErrorContext> {
        match self {
            Self::HubApi(ctx) | Self::ProviderApi(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<u16> {
        self.http_context().map(|ctx| ctx.response.status)
    }

    /// Returns `true` for transient transport failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
