//! Request executor: sends built requests, retries cold starts, classifies
//! failures, and decodes event streams.

use crate::api::{InferenceTask, Options, RequestArgs};
use crate::error::{HttpRequestSnapshot, HttpResponseSnapshot, InferenceError, Result};
use crate::helper::{Blob, InferenceOutput, ProviderHelper, ProviderResponse, ResponseContext};
use crate::request_options::{RequestBuilder, ResolvedRequest};
use crate::sse::decode_events;
use crate::transport::{Body, HttpResponse, HttpTransport, with_cancellation};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lazily decoded stream of JSON events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Status codes that, on a chat call, mean the provider cannot serve chat for
/// the model.
const CHAT_UNSUPPORTED_STATUSES: [u16; 4] = [400, 422, 404, 500];

/// Raw 2xx reply plus the request that produced it.
#[derive(Debug)]
pub struct InnerResponse {
    pub data: ProviderResponse,
    pub request: ResolvedRequest,
}

/// Issues requests through an [`HttpTransport`].
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    builder: RequestBuilder,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, builder: RequestBuilder) -> Self {
        Self { transport, builder }
    }

    pub fn builder(&self) -> &RequestBuilder {
        &self.builder
    }

    /// Build, send, and normalize a request through `helper`.
    pub async fn request(
        &self,
        args: &RequestArgs,
        helper: &dyn ProviderHelper,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<InferenceOutput> {
        let start = Instant::now();
        let result = async {
            let inner = self.inner_request(args, helper, task, options).await?;
            let config = self.builder.config();
            let ctx = ResponseContext {
                url: &inner.request.url,
                headers: &inner.request.init.headers,
                router_url: &config.router_url,
                output_type: options.output_type.unwrap_or_default(),
                transport: self.transport.as_ref(),
                signal: options.signal.as_ref(),
                poll_interval: config.poll_interval(),
            };
            helper.get_response(inner.data, &ctx).await
        }
        .await;
        record_request(helper, task, start, result.is_ok());
        result
    }

    /// Send the request and return the raw 2xx reply.
    ///
    /// A 503 is retried once unless `retry_on_error` is `false`. JSON replies
    /// (and every chat reply) are parsed; anything else is returned as a
    /// blob.
    #[tracing::instrument(skip_all, fields(provider = %helper.provider(), task = ?task))]
    pub async fn inner_request(
        &self,
        args: &RequestArgs,
        helper: &dyn ProviderHelper,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<InnerResponse> {
        let request = self
            .builder
            .make_request_options(args, helper, task, options)
            .await?;
        let signal = options.signal.as_ref();
        let chat = is_chat(task, &request.url);
        let response = self.send(&request, helper, options).await?;

        if !response.ok() {
            return Err(classify_error(response, &request, args, helper, chat, signal).await?);
        }

        let is_json = response.is_json();
        let content_type = response
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = with_cancellation(signal, response.bytes()).await?;
        let data = if chat || is_json {
            let value = serde_json::from_slice(&bytes).map_err(|_| {
                InferenceError::provider_output(format!(
                    "Failed to parse response from {} as JSON",
                    helper.provider()
                ))
            })?;
            ProviderResponse::Json(value)
        } else {
            ProviderResponse::Blob(Blob::new(bytes, content_type))
        };
        Ok(InnerResponse { data, request })
    }

    /// Send the request and decode the reply as server-sent JSON events.
    ///
    /// `[DONE]` ends the stream; an event carrying an `error` field ends it
    /// with an error. Cancellation is checked before every event.
    #[tracing::instrument(skip_all, fields(provider = %helper.provider(), task = ?task))]
    pub async fn inner_streaming_request(
        &self,
        args: &RequestArgs,
        helper: &dyn ProviderHelper,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<EventStream<Value>> {
        let start = Instant::now();
        let result = self.open_stream(args, helper, task, options).await;
        record_request(helper, task, start, result.is_ok());
        result
    }

    async fn open_stream(
        &self,
        args: &RequestArgs,
        helper: &dyn ProviderHelper,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<EventStream<Value>> {
        let request = self
            .builder
            .make_request_options(args, helper, task, options)
            .await?;
        let signal = options.signal.as_ref();
        let chat = is_chat(task, &request.url);
        let response = self.send(&request, helper, options).await?;

        if !response.ok() {
            return Err(classify_error(response, &request, args, helper, chat, signal).await?);
        }

        let content_type = response.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("text/event-stream") {
            let snapshot = request_snapshot(&request);
            let status = response.status();
            let request_id = response.request_id();
            let body = with_cancellation(signal, response.json_or_text()).await?;
            return Err(InferenceError::provider_api(
                format!(
                    "Server does not support event stream content type, it returned {content_type}"
                ),
                snapshot,
                HttpResponseSnapshot {
                    request_id,
                    status,
                    body,
                },
            ));
        }

        let request_id = response.request_id();
        let status = response.status();
        let state = StreamState {
            events: decode_events(response.into_stream()),
            signal: options.signal.clone(),
            request: request_snapshot(&request),
            request_id,
            status,
            finished: false,
        };
        Ok(Box::pin(stream::unfold(state, next_event)))
    }

    async fn send(
        &self,
        request: &ResolvedRequest,
        helper: &dyn ProviderHelper,
        options: &Options,
    ) -> Result<HttpResponse> {
        let signal = options.signal.as_ref();
        let mut retried = false;
        loop {
            let response =
                with_cancellation(signal, self.transport.fetch(&request.url, &request.init))
                    .await?;
            if response.status() == 503 && options.retry_on_error() && !retried {
                retried = true;
                tracing::warn!(
                    provider = %helper.provider(),
                    url = %request.url,
                    "Model is loading (503), retrying once"
                );
                metrics::counter!(
                    "inference_request.retries",
                    "provider" => helper.provider().as_str()
                )
                .increment(1);
                continue;
            }
            return Ok(response);
        }
    }
}

fn record_request(
    helper: &dyn ProviderHelper,
    task: Option<InferenceTask>,
    start: Instant,
    ok: bool,
) {
    let provider = helper.provider().as_str();
    let task = task.map(|t| t.as_str()).unwrap_or("none");
    metrics::histogram!(
        "inference_request.duration_seconds",
        "provider" => provider,
        "task" => task
    )
    .record(start.elapsed().as_secs_f64());
    metrics::counter!(
        "inference_request.total",
        "provider" => provider,
        "task" => task,
        "status" => if ok { "success" } else { "failure" }
    )
    .increment(1);
}

/// Chat calls are classified by task, or by a chat completions endpoint URL.
fn is_chat(task: Option<InferenceTask>, url: &str) -> bool {
    task == Some(InferenceTask::Conversational) || url.ends_with("/chat/completions")
}

fn request_snapshot(request: &ResolvedRequest) -> HttpRequestSnapshot {
    HttpRequestSnapshot::new(&request.url, request.init.method.as_str())
        .with_headers(&request.init.headers)
        .with_body(request.init.body.as_ref().and_then(Body::as_json))
}

/// `error`, `error.message`, `detail`, or `message`, whichever is a string.
fn error_message(body: &Value) -> Option<&str> {
    body.get("error")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/error/message").and_then(Value::as_str))
        .or_else(|| body.get("detail").and_then(Value::as_str))
        .or_else(|| body.get("message").and_then(Value::as_str))
}

/// Turn a non-2xx response into a [`InferenceError::ProviderApi`].
async fn classify_error(
    response: HttpResponse,
    request: &ResolvedRequest,
    args: &RequestArgs,
    helper: &dyn ProviderHelper,
    chat: bool,
    signal: Option<&CancellationToken>,
) -> Result<InferenceError> {
    let status = response.status();
    let request_id = response.request_id();
    let content_type = response.content_type().unwrap_or_default().to_string();
    let is_json = content_type.starts_with("application/json")
        || content_type.starts_with("application/problem+json");
    let body = with_cancellation(signal, response.json_or_text()).await?;

    let message = if is_json && chat && CHAT_UNSUPPORTED_STATUSES.contains(&status) {
        let model = args
            .model
            .as_deref()
            .or(args.endpoint_url.as_deref())
            .unwrap_or_default();
        let detail = body.get("error").unwrap_or(&body);
        format!(
            "Provider {} does not seem to support chat completion for model {model}. Error: {detail}",
            helper.provider()
        )
    } else if is_json {
        match error_message(&body) {
            Some(detail) => format!("Failed to perform inference: {detail}"),
            None => {
                "Failed to perform inference: an HTTP error occurred when requesting the provider."
                    .to_string()
            }
        }
    } else {
        match body.as_str().filter(|text| {
            content_type.starts_with("text/plain") && !text.trim().is_empty()
        }) {
            Some(text) => format!("Failed to perform inference: {text}"),
            None => {
                "Failed to perform inference: an HTTP error occurred when requesting the provider."
                    .to_string()
            }
        }
    };
    tracing::debug!(status, provider = %helper.provider(), "Provider request failed");
    Ok(InferenceError::provider_api(
        message,
        request_snapshot(request),
        HttpResponseSnapshot {
            request_id,
            status,
            body,
        },
    ))
}

struct StreamState {
    events: BoxStream<'static, Result<crate::sse::SseEvent>>,
    signal: Option<CancellationToken>,
    request: HttpRequestSnapshot,
    request_id: String,
    status: u16,
    finished: bool,
}

impl StreamState {
    fn forwarded_error(&self, data: Value, message: &str) -> InferenceError {
        InferenceError::provider_api(
            format!("Error forwarded from backend: {message}"),
            self.request.clone(),
            HttpResponseSnapshot {
                request_id: self.request_id.clone(),
                status: self.status,
                body: data,
            },
        )
    }
}

async fn next_event(mut state: StreamState) -> Option<(Result<Value>, StreamState)> {
    if state.finished {
        return None;
    }
    loop {
        let next = match &state.signal {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Some(Err(InferenceError::Aborted)),
                    event = state.events.next() => event,
                }
            }
            None => state.events.next().await,
        };
        let event = match next {
            None => return None,
            Some(Err(e)) => {
                state.finished = true;
                return Some((Err(e), state));
            }
            Some(Ok(event)) => event,
        };
        if event.data.is_empty() {
            continue;
        }
        if event.is_done() {
            return None;
        }

        let item = match serde_json::from_str::<Value>(&event.data) {
            Err(_) => Err(InferenceError::provider_output(format!(
                "Failed to parse stream event: {}",
                event.data
            ))),
            Ok(data) => match data.get("error").filter(|e| !e.is_null()) {
                Some(error) => {
                    let message = error
                        .as_str()
                        .or_else(|| error.get("message").and_then(Value::as_str))
                        .map(str::to_string)
                        .unwrap_or_else(|| error.to_string());
                    Err(state.forwarded_error(data, &message))
                }
                None => Ok(data),
            },
        };
        if item.is_err() {
            state.finished = true;
        }
        return Some((item, state));
    }
}
