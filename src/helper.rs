//! Provider helper contract and the behaviour shared between providers.
//!
//! A [`ProviderHelper`] encapsulates one provider's conventions for one task:
//! where to send the request, which headers and body to send, and how to turn
//! the raw reply into a normalized [`InferenceOutput`]. Providers that speak
//! the OpenAI chat or completions contract build on [`ConversationalTask`]
//! and [`TextGenerationTask`] and only override what differs.

use crate::api::{
    AuthMethod, InferenceProvider, InferenceTask, OutputType, ProviderMappingEntry, RequestBody,
};
use crate::error::{HttpRequestSnapshot, HttpResponseSnapshot, InferenceError, Result};
use crate::transport::{
    Body, Headers, HttpTransport, RequestInit, sleep_with_cancellation, with_cancellation,
};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Inputs to URL construction.
#[derive(Debug, Clone, Copy)]
pub struct UrlParams<'a> {
    pub auth_method: AuthMethod,
    /// Provider model id, or the caller's endpoint URL when one was given.
    pub model: &'a str,
    pub task: Option<InferenceTask>,
    pub router_url: &'a str,
    /// Set when hf-inference must run the model under a pipeline other than
    /// its default one.
    pub pipeline_task: Option<InferenceTask>,
}

/// Inputs to header construction.
#[derive(Debug, Clone, Copy)]
pub struct HeaderParams<'a> {
    pub access_token: Option<&'a str>,
    pub auth_method: AuthMethod,
}

impl<'a> HeaderParams<'a> {
    /// Token to put on the wire. Cookie-authenticated and anonymous requests
    /// carry none.
    pub fn credential(&self) -> Option<&'a str> {
        match self.auth_method {
            AuthMethod::HfToken | AuthMethod::ProviderKey => {
                self.access_token.filter(|token| !token.is_empty())
            }
            AuthMethod::CredentialsInclude | AuthMethod::None => None,
        }
    }
}

/// Inputs to payload construction.
#[derive(Debug, Clone, Copy)]
pub struct BodyParams<'a> {
    pub args: &'a RequestBody,
    pub model: &'a str,
    pub mapping: Option<&'a ProviderMappingEntry>,
    pub task: Option<InferenceTask>,
    pub hub_url: &'a str,
}

impl BodyParams<'_> {
    /// JSON arguments, or an empty map for binary bodies.
    pub fn json_args(&self) -> Map<String, Value> {
        match self.args {
            RequestBody::Json(map) => map.clone(),
            RequestBody::Binary { .. } => Map::new(),
        }
    }

    pub fn inputs(&self) -> Option<&Value> {
        match self.args {
            RequestBody::Json(map) => map.get("inputs"),
            RequestBody::Binary { .. } => None,
        }
    }
}

/// Downloaded media.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// `data:<mime>;base64,<payload>`
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            BASE64.encode(&self.bytes)
        )
    }
}

/// Raw 2xx reply, as read by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    Json(Value),
    Blob(Blob),
}

/// Normalized result of a helper.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Json(Value),
    Blob(Blob),
    /// A URL or data URL, for media requested as [`OutputType::Url`] or
    /// [`OutputType::DataUrl`].
    Text(String),
}

impl InferenceOutput {
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => Value::String(text),
            Self::Blob(blob) => Value::String(blob.to_data_url()),
        }
    }
}

/// What a helper needs to finish a response: follow-up requests for polling
/// and media downloads, and the caller's output preferences.
pub struct ResponseContext<'a> {
    /// URL of the original request.
    pub url: &'a str,
    /// Headers of the original request, reused for polling.
    pub headers: &'a Headers,
    pub router_url: &'a str,
    pub output_type: OutputType,
    pub transport: &'a dyn HttpTransport,
    pub signal: Option<&'a CancellationToken>,
    pub poll_interval: Duration,
}

impl ResponseContext<'_> {
    /// Sleep one poll interval, honouring cancellation.
    pub(crate) async fn wait(&self) -> Result<()> {
        sleep_with_cancellation(self.signal, self.poll_interval).await
    }

    /// GET `url` with the original request headers and parse JSON.
    pub(crate) async fn get_json(&self, url: &str, failure: &str) -> Result<Value> {
        self.get_json_with(url, self.headers, failure).await
    }

    pub(crate) async fn get_json_with(
        &self,
        url: &str,
        headers: &Headers,
        failure: &str,
    ) -> Result<Value> {
        let init = RequestInit::get(headers.clone());
        let response = with_cancellation(self.signal, self.transport.fetch(url, &init)).await?;
        tracing::debug!(url, status = response.status(), "Polled job status");
        if !response.ok() {
            let status = response.status();
            let request_id = response.request_id();
            let body = with_cancellation(self.signal, response.json_or_text()).await?;
            return Err(InferenceError::provider_api(
                failure,
                HttpRequestSnapshot::new(url, "GET").with_headers(headers),
                HttpResponseSnapshot {
                    request_id,
                    status,
                    body,
                },
            ));
        }
        let bytes = with_cancellation(self.signal, response.bytes()).await?;
        serde_json::from_slice(&bytes).map_err(|_| {
            InferenceError::provider_output(format!("{failure}: response is not valid JSON"))
        })
    }

    /// Download media. `data:` URLs are decoded in place.
    pub(crate) async fn fetch_media(&self, url: &str) -> Result<Blob> {
        if let Some(blob) = decode_data_url(url)? {
            return Ok(blob);
        }
        let init = RequestInit::get(Headers::new());
        let response = with_cancellation(self.signal, self.transport.fetch(url, &init)).await?;
        if !response.ok() {
            let status = response.status();
            let request_id = response.request_id();
            let body = with_cancellation(self.signal, response.json_or_text()).await?;
            return Err(InferenceError::provider_api(
                format!("Failed to fetch generation output from {url}"),
                HttpRequestSnapshot::new(url, "GET"),
                HttpResponseSnapshot {
                    request_id,
                    status,
                    body,
                },
            ));
        }
        let content_type = response
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = with_cancellation(self.signal, response.bytes()).await?;
        Ok(Blob::new(bytes, content_type))
    }

    /// Deliver media hosted at `url` in the requested representation.
    /// `raw` is the provider's final JSON document.
    pub(crate) async fn media_output(&self, url: &str, raw: Value) -> Result<InferenceOutput> {
        match self.output_type {
            OutputType::Url => Ok(InferenceOutput::Text(url.to_string())),
            OutputType::Json => Ok(InferenceOutput::Json(raw)),
            OutputType::Blob => Ok(InferenceOutput::Blob(self.fetch_media(url).await?)),
            OutputType::DataUrl => Ok(InferenceOutput::Text(
                self.fetch_media(url).await?.to_data_url(),
            )),
        }
    }

    /// Deliver base64-encoded media in the requested representation.
    pub(crate) fn base64_output(
        &self,
        data: &str,
        mime: &str,
        raw: Value,
    ) -> Result<InferenceOutput> {
        match self.output_type {
            OutputType::Json => Ok(InferenceOutput::Json(raw)),
            OutputType::Url | OutputType::DataUrl => {
                Ok(InferenceOutput::Text(format!("data:{mime};base64,{data}")))
            }
            OutputType::Blob => {
                let bytes = BASE64.decode(data).map_err(|e| {
                    InferenceError::provider_output(format!(
                        "Invalid base64 media in response: {e}"
                    ))
                })?;
                Ok(InferenceOutput::Blob(Blob::new(bytes, mime)))
            }
        }
    }

    /// Deliver media the provider returned directly as the response body.
    pub(crate) fn blob_output(&self, blob: Blob) -> InferenceOutput {
        match self.output_type {
            OutputType::Url | OutputType::DataUrl => InferenceOutput::Text(blob.to_data_url()),
            OutputType::Blob | OutputType::Json => InferenceOutput::Blob(blob),
        }
    }

    /// Scheme and host of the original request, for job status URLs that
    /// providers return relative to their own host. Requests that went through
    /// the router keep the router's `/{provider}` prefix.
    pub(crate) fn job_base_url(&self, provider: InferenceProvider) -> Result<String> {
        if self.url.starts_with(self.router_url) {
            return Ok(format!("{}/{}", self.router_url, provider));
        }
        let parsed = url::Url::parse(self.url)
            .map_err(|e| {
                InferenceError::provider_output(format!("Invalid request URL {}: {e}", self.url))
            })?;
        let host = parsed.host_str().unwrap_or_default();
        Ok(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }
}

/// Parse a `data:` URL. Returns `Ok(None)` for any other URL.
pub(crate) fn decode_data_url(url: &str) -> Result<Option<Blob>> {
    let Some(rest) = url.strip_prefix("data:") else {
        return Ok(None);
    };
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| InferenceError::provider_output("Malformed data URL in response"))?;
    let (mime, is_base64) = match meta.strip_suffix(";base64") {
        Some(mime) => (mime, true),
        None => (meta, false),
    };
    let mime = if mime.is_empty() { "text/plain" } else { mime };
    let bytes = if is_base64 {
        BASE64.decode(payload).map_err(|e| {
            InferenceError::provider_output(format!("Invalid base64 media in response: {e}"))
        })?
    } else {
        payload.as_bytes().to_vec()
    };
    Ok(Some(Blob::new(bytes, mime)))
}

/// `Authorization: Bearer` when the request carries a token, and a JSON
/// content type unless the body is binary.
pub fn default_headers(params: &HeaderParams<'_>, is_binary: bool) -> Headers {
    let mut headers = Headers::new();
    if let Some(token) = params.credential() {
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));
    }
    if !is_binary {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    headers
}

/// Strategy for one (provider, task) pair.
#[async_trait]
pub trait ProviderHelper: Send + Sync {
    fn provider(&self) -> InferenceProvider;

    /// Provider's own API root, used with provider-key auth.
    fn base_url(&self) -> &str;

    /// Provider can only be called directly with its own key and a
    /// `{provider}/`-prefixed model id.
    fn client_side_routing_only(&self) -> bool {
        false
    }

    fn make_base_url(&self, params: &UrlParams<'_>) -> String {
        if params.auth_method == AuthMethod::ProviderKey {
            self.base_url().to_string()
        } else {
            format!("{}/{}", params.router_url, self.provider())
        }
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String;

    fn make_url(&self, params: &UrlParams<'_>) -> String {
        let base = self.make_base_url(params);
        let route = self.make_route(params);
        format!("{}/{}", base, route.trim_start_matches('/'))
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        default_headers(params, is_binary)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value>;

    /// Binary uploads pass through untouched; everything else is the JSON
    /// payload.
    fn make_body(&self, params: &BodyParams<'_>) -> Result<Body> {
        if let RequestBody::Binary { data, .. } = params.args {
            return Ok(Body::Binary(data.clone()));
        }
        Ok(Body::Text(self.prepare_payload(params)?.to_string()))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput>;
}

/// `{...args minus inputs/parameters, ...parameters}` with `inputs` stored
/// under `input_key` (when present).
pub(crate) fn flatten_args(args: &Map<String, Value>, input_key: &str) -> Map<String, Value> {
    let mut payload: Map<String, Value> = args
        .iter()
        .filter(|(key, _)| key.as_str() != "inputs" && key.as_str() != "parameters")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if let Some(Value::Object(parameters)) = args.get("parameters") {
        payload.extend(parameters.clone());
    }
    if let Some(inputs) = args.get("inputs") {
        payload.insert(input_key.to_string(), inputs.clone());
    }
    payload
}

/// OpenAI completions payload from text-generation arguments:
/// `max_new_tokens` becomes `max_tokens` and `inputs` becomes `prompt`.
pub(crate) fn completions_payload(args: &Map<String, Value>, model: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("model".to_string(), Value::String(model.to_string()));
    payload.extend(
        args.iter()
            .filter(|(key, _)| key.as_str() != "inputs" && key.as_str() != "parameters")
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    if let Some(Value::Object(parameters)) = args.get("parameters") {
        payload.extend(rename_max_new_tokens(parameters));
    }
    if let Some(inputs) = args.get("inputs") {
        payload.insert("prompt".to_string(), inputs.clone());
    }
    payload
}

fn rename_max_new_tokens(parameters: &Map<String, Value>) -> Map<String, Value> {
    parameters
        .iter()
        .map(|(key, value)| {
            let key = if key == "max_new_tokens" { "max_tokens" } else { key };
            (key.to_string(), value.clone())
        })
        .collect()
}

/// Chat payload wrapping a text-generation prompt as a single user message.
pub(crate) fn single_message_chat_payload(
    args: &Map<String, Value>,
    model: &str,
) -> Map<String, Value> {
    let prompt = args.get("inputs").cloned().unwrap_or(Value::Null);
    let mut payload = Map::new();
    payload.insert(
        "messages".to_string(),
        serde_json::json!([{"content": prompt, "role": "user"}]),
    );
    if let Some(Value::Object(parameters)) = args.get("parameters") {
        payload.extend(rename_max_new_tokens(parameters));
    }
    payload.extend(
        args.iter()
            .filter(|(key, _)| key.as_str() != "inputs" && key.as_str() != "parameters")
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    payload.insert("model".to_string(), Value::String(model.to_string()));
    payload
}

/// `{generated_text}` from an OpenAI completions reply (`choices[0].text`).
pub(crate) fn completion_text(response: &Value, provider: &str) -> Result<Value> {
    response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("text"))
        .and_then(Value::as_str)
        .map(|text| serde_json::json!({"generated_text": text}))
        .ok_or_else(|| {
            InferenceError::provider_output(format!(
                "Received malformed response from {provider} text generation API"
            ))
        })
}

/// `{generated_text}` from an OpenAI chat reply (`choices[0].message.content`).
pub(crate) fn chat_message_text(response: &Value, provider: &str) -> Result<Value> {
    response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(Value::as_str)
        .map(|text| serde_json::json!({"generated_text": text}))
        .ok_or_else(|| {
            InferenceError::provider_output(format!(
                "Received malformed response from {provider} text generation API"
            ))
        })
}

/// `response[...pointer]` as a string, or a provider output error.
pub(crate) fn required_str<'v>(
    response: &'v Value,
    pointer: &str,
    expected: &str,
) -> Result<&'v str> {
    response
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            InferenceError::provider_output(format!("Expected {expected}, got: {response}"))
        })
}

pub(crate) fn expect_json(response: ProviderResponse, expected: &str) -> Result<Value> {
    match response {
        ProviderResponse::Json(value) => Ok(value),
        ProviderResponse::Blob(blob) => Err(InferenceError::provider_output(format!(
            "Expected {expected}, got a {} response",
            blob.content_type
        ))),
    }
}

/// Shape check for an OpenAI chat completion. `system_fingerprint` may be
/// absent or null.
pub(crate) fn is_chat_completion(value: &Value) -> bool {
    value.get("choices").is_some_and(Value::is_array)
        && value.get("created").is_some_and(Value::is_number)
        && value.get("id").is_some_and(Value::is_string)
        && value.get("model").is_some_and(Value::is_string)
        && value
            .get("system_fingerprint")
            .is_none_or(|fp| fp.is_null() || fp.is_string())
        && value.get("usage").is_some_and(Value::is_object)
}

/// OpenAI-compatible chat completions, `POST {base}/v1/chat/completions`.
#[derive(Debug, Clone)]
pub struct ConversationalTask {
    provider: InferenceProvider,
    base_url: String,
    route: String,
    client_side_routing_only: bool,
}

impl ConversationalTask {
    pub fn new(provider: InferenceProvider, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            route: "v1/chat/completions".to_string(),
            client_side_routing_only: false,
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    #[must_use]
    pub fn client_side_routing(mut self) -> Self {
        self.client_side_routing_only = true;
        self
    }

    /// `{...args, model}`
    pub fn payload(&self, params: &BodyParams<'_>) -> Map<String, Value> {
        let mut payload = params.json_args();
        payload.insert("model".to_string(), Value::String(params.model.to_string()));
        payload
    }

    pub fn validate(&self, response: ProviderResponse) -> Result<InferenceOutput> {
        let value = expect_json(response, "ChatCompletionOutput")?;
        if is_chat_completion(&value) {
            Ok(InferenceOutput::Json(value))
        } else {
            Err(InferenceError::provider_output("Expected ChatCompletionOutput"))
        }
    }
}

#[async_trait]
impl ProviderHelper for ConversationalTask {
    fn provider(&self) -> InferenceProvider {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client_side_routing_only(&self) -> bool {
        self.client_side_routing_only
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        self.route.clone()
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        Ok(Value::Object(self.payload(params)))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        _ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        self.validate(response)
    }
}

/// Request/response convention of a [`TextGenerationTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStyle {
    /// OpenAI completions: `prompt` in, `choices[0].text` out.
    Completions,
    /// Prompt sent as a single user chat message, `choices[0].message.content`
    /// out.
    Chat,
    /// `{...args, model}` in, `[{generated_text}]` out.
    Passthrough,
}

/// OpenAI-compatible text completions, `POST {base}/v1/completions`.
///
/// The output is always normalized to `{generated_text}`.
#[derive(Debug, Clone)]
pub struct TextGenerationTask {
    provider: InferenceProvider,
    base_url: String,
    route: String,
    style: CompletionStyle,
}

impl TextGenerationTask {
    pub fn new(provider: InferenceProvider, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            route: "v1/completions".to_string(),
            style: CompletionStyle::Completions,
        }
    }

    #[must_use]
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    /// Serve text generation through the chat route.
    #[must_use]
    pub fn chat_backed(mut self) -> Self {
        self.style = CompletionStyle::Chat;
        self.route = "v1/chat/completions".to_string();
        self
    }

    #[must_use]
    pub fn passthrough(mut self) -> Self {
        self.style = CompletionStyle::Passthrough;
        self
    }

    pub fn style(&self) -> CompletionStyle {
        self.style
    }

    pub fn validate(&self, response: ProviderResponse) -> Result<InferenceOutput> {
        const EXPECTED: &str = "Array<{generated_text: string}>";
        let value = expect_json(response, EXPECTED)?;
        match self.style {
            CompletionStyle::Completions => {
                completion_text(&value, self.provider.as_str()).map(InferenceOutput::Json)
            }
            CompletionStyle::Chat => {
                chat_message_text(&value, self.provider.as_str()).map(InferenceOutput::Json)
            }
            CompletionStyle::Passthrough => {
                let items = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                let valid = !items.is_empty()
                    && items
                        .iter()
                        .all(|item| item.get("generated_text").is_some_and(Value::is_string));
                match items.into_iter().next() {
                    Some(first) if valid => Ok(InferenceOutput::Json(first)),
                    _ => Err(InferenceError::provider_output(format!("Expected {EXPECTED}"))),
                }
            }
        }
    }
}

#[async_trait]
impl ProviderHelper for TextGenerationTask {
    fn provider(&self) -> InferenceProvider {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        self.route.clone()
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let args = params.json_args();
        let payload = match self.style {
            CompletionStyle::Completions => completions_payload(&args, params.model),
            CompletionStyle::Chat => single_message_chat_payload(&args, params.model),
            CompletionStyle::Passthrough => {
                let mut payload = args;
                payload.insert("model".to_string(), Value::String(params.model.to_string()));
                payload
            }
        };
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        _ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        self.validate(response)
    }
}

/// OpenAI-style image generation, `POST {base}/v1/images/generations`,
/// answering with base64 images in `data[0].b64_json`.
#[derive(Debug, Clone)]
pub struct ImageGenerationTask {
    provider: InferenceProvider,
    base_url: String,
    response_format: &'static str,
}

impl ImageGenerationTask {
    /// `response_format` is the value the provider expects for base64 output.
    pub fn new(
        provider: InferenceProvider,
        base_url: impl Into<String>,
        response_format: &'static str,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            response_format,
        }
    }
}

#[async_trait]
impl ProviderHelper for ImageGenerationTask {
    fn provider(&self) -> InferenceProvider {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        "v1/images/generations".to_string()
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = flatten_args(&params.json_args(), "prompt");
        payload.insert(
            "response_format".to_string(),
            Value::String(self.response_format.to_string()),
        );
        payload.insert("model".to_string(), Value::String(params.model.to_string()));
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let value = expect_json(response, "{data: [{b64_json: string}]}")?;
        let data = value
            .pointer("/data/0/b64_json")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                InferenceError::provider_output(format!(
                    "Received malformed response from {} text-to-image API",
                    self.provider
                ))
            })?
            .to_string();
        ctx.base64_output(&data, "image/jpeg", value)
    }
}

/// OpenAI-style embeddings, `POST {base}/v1/embeddings`. Returns one vector
/// per input.
#[derive(Debug, Clone)]
pub struct EmbeddingsTask {
    provider: InferenceProvider,
    base_url: String,
}

impl EmbeddingsTask {
    pub fn new(provider: InferenceProvider, base_url: impl Into<String>) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProviderHelper for EmbeddingsTask {
    fn provider(&self) -> InferenceProvider {
        self.provider
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        "v1/embeddings".to_string()
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        Ok(serde_json::json!({
            "input": params.inputs().cloned().unwrap_or(Value::Null),
            "model": params.model,
        }))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        _ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let value = expect_json(response, "{data: [{embedding: number[]}]}")?;
        let embeddings = value
            .get("data")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.get("embedding").filter(|e| e.is_array()).cloned())
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| {
                InferenceError::provider_output(format!(
                    "Received malformed response from {} embeddings API",
                    self.provider
                ))
            })?;
        Ok(InferenceOutput::Json(Value::Array(embeddings)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::mock::MockTransport;

    pub(crate) const ROUTER: &str = "https://router.test";

    pub(crate) fn url_params(
        auth_method: AuthMethod,
        model: &str,
        task: InferenceTask,
    ) -> UrlParams<'_> {
        UrlParams {
            auth_method,
            model,
            task: Some(task),
            router_url: ROUTER,
            pipeline_task: None,
        }
    }

    pub(crate) fn body_params<'a>(
        args: &'a RequestBody,
        model: &'a str,
        task: InferenceTask,
    ) -> BodyParams<'a> {
        BodyParams {
            args,
            model,
            mapping: None,
            task: Some(task),
            hub_url: "https://hub.test",
        }
    }

    pub(crate) fn context<'a>(
        url: &'a str,
        headers: &'a Headers,
        transport: &'a MockTransport,
        output_type: OutputType,
    ) -> ResponseContext<'a> {
        ResponseContext {
            url,
            headers,
            router_url: ROUTER,
            output_type,
            transport,
            signal: None,
            poll_interval: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;

    fn chat_completion() -> Value {
        json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}}],
            "created": 1700000000,
            "id": "cmpl-1",
            "model": "m",
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    }

    #[test]
    fn default_url_goes_through_router_unless_provider_key() {
        let helper =
            ConversationalTask::new(InferenceProvider::Cerebras, "https://api.cerebras.ai");
        let routed = url_params(AuthMethod::HfToken, "llama", InferenceTask::Conversational);
        assert_eq!(
            helper.make_url(&routed),
            "https://router.test/cerebras/v1/chat/completions"
        );
        let direct = url_params(AuthMethod::ProviderKey, "llama", InferenceTask::Conversational);
        assert_eq!(
            helper.make_url(&direct),
            "https://api.cerebras.ai/v1/chat/completions"
        );
    }

    #[test]
    fn leading_slashes_in_route_are_collapsed() {
        let helper = ConversationalTask::new(InferenceProvider::ZaiOrg, "https://api.z.ai")
            .with_route("/api/paas/v4/chat/completions");
        let params = url_params(AuthMethod::ProviderKey, "glm", InferenceTask::Conversational);
        assert_eq!(
            helper.make_url(&params),
            "https://api.z.ai/api/paas/v4/chat/completions"
        );
    }

    #[test]
    fn default_headers_depend_on_auth_and_body_kind() {
        let params = HeaderParams {
            access_token: Some("hf_x"),
            auth_method: AuthMethod::HfToken,
        };
        let headers = default_headers(&params, false);
        assert_eq!(headers["Authorization"], "Bearer hf_x");
        assert_eq!(headers["Content-Type"], "application/json");

        let binary = default_headers(&params, true);
        assert!(!binary.contains_key("Content-Type"));

        let anonymous = default_headers(
            &HeaderParams {
                access_token: None,
                auth_method: AuthMethod::None,
            },
            false,
        );
        assert!(!anonymous.contains_key("Authorization"));

        let cookie = default_headers(
            &HeaderParams {
                access_token: None,
                auth_method: AuthMethod::CredentialsInclude,
            },
            false,
        );
        assert!(!cookie.contains_key("Authorization"));
        assert_eq!(cookie["Content-Type"], "application/json");
    }

    #[test]
    fn conversational_payload_injects_model_only() {
        let args = RequestBody::Json(
            json!({"messages": [{"role": "user", "content": "hi"}], "max_tokens": 5})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let helper = ConversationalTask::new(InferenceProvider::Groq, "https://api.groq.com");
        let body = helper
            .make_body(&body_params(&args, "llama-3", InferenceTask::Conversational))
            .unwrap();
        let payload = body.as_json().unwrap();
        let keys: Vec<_> = payload.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["messages", "max_tokens", "model"]);
        assert_eq!(payload["model"], "llama-3");
    }

    #[test]
    fn binary_body_passes_through() {
        let args = RequestBody::Binary {
            data: Bytes::from_static(b"RIFF"),
            content_type: Some("audio/wav".into()),
        };
        let helper =
            TextGenerationTask::new(InferenceProvider::Together, "https://api.together.xyz");
        let body = helper
            .make_body(&body_params(&args, "m", InferenceTask::TextGeneration))
            .unwrap();
        assert_eq!(body, Body::Binary(Bytes::from_static(b"RIFF")));
    }

    #[test]
    fn chat_completion_shape_is_checked() {
        let helper =
            ConversationalTask::new(InferenceProvider::Cerebras, "https://api.cerebras.ai");
        assert!(helper.validate(ProviderResponse::Json(chat_completion())).is_ok());

        let mut with_null_fingerprint = chat_completion();
        with_null_fingerprint["system_fingerprint"] = Value::Null;
        assert!(
            helper
                .validate(ProviderResponse::Json(with_null_fingerprint))
                .is_ok()
        );

        let mut missing_usage = chat_completion();
        missing_usage.as_object_mut().unwrap().remove("usage");
        let err = helper
            .validate(ProviderResponse::Json(missing_usage))
            .unwrap_err();
        assert!(matches!(err, InferenceError::ProviderOutput(_)));
        assert_eq!(err.to_string(), "Expected ChatCompletionOutput");
    }

    #[test]
    fn text_generation_accepts_array_or_object() {
        let helper =
            TextGenerationTask::new(InferenceProvider::HfInference, "https://x").passthrough();
        let out = helper
            .validate(ProviderResponse::Json(
                json!([{"generated_text": "a"}, {"generated_text": "b"}]),
            ))
            .unwrap();
        assert_eq!(out, InferenceOutput::Json(json!({"generated_text": "a"})));
        let out = helper
            .validate(ProviderResponse::Json(json!({"generated_text": "solo"})))
            .unwrap();
        assert_eq!(out, InferenceOutput::Json(json!({"generated_text": "solo"})));
        assert!(helper.validate(ProviderResponse::Json(json!([]))).is_err());
        assert!(helper
            .validate(ProviderResponse::Json(json!([{"generated_text": 3}])))
            .is_err());
    }

    #[test]
    fn flatten_args_merges_parameters_and_renames_inputs() {
        let args = json!({"inputs": "a cat", "parameters": {"seed": 3}, "num_images": 1});
        let payload = flatten_args(args.as_object().unwrap(), "prompt");
        assert_eq!(Value::Object(payload), json!({"num_images": 1, "seed": 3, "prompt": "a cat"}));
    }

    #[test]
    fn completions_payload_renames_max_new_tokens() {
        let args =
            json!({"inputs": "Once", "parameters": {"max_new_tokens": 8, "temperature": 0.1}});
        let payload = completions_payload(args.as_object().unwrap(), "m");
        assert_eq!(
            Value::Object(payload),
            json!({"model": "m", "max_tokens": 8, "temperature": 0.1, "prompt": "Once"})
        );
    }

    #[test]
    fn chat_backed_text_generation_wraps_prompt() {
        let helper =
            TextGenerationTask::new(InferenceProvider::Hyperbolic, "https://api.hyperbolic.xyz")
                .chat_backed();
        let args = RequestBody::Json(
            json!({"inputs": "Hello", "parameters": {"max_new_tokens": 4}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let payload = helper
            .prepare_payload(&body_params(&args, "qwen", InferenceTask::TextGeneration))
            .unwrap();
        assert_eq!(
            payload,
            json!({
                "messages": [{"content": "Hello", "role": "user"}],
                "max_tokens": 4,
                "model": "qwen"
            })
        );
        let params = url_params(AuthMethod::ProviderKey, "qwen", InferenceTask::TextGeneration);
        assert_eq!(
            helper.make_url(&params),
            "https://api.hyperbolic.xyz/v1/chat/completions"
        );
        let out = helper
            .validate(ProviderResponse::Json(json!({
                "choices": [{"message": {"role": "assistant", "content": "there"}}],
                "model": "qwen"
            })))
            .unwrap();
        assert_eq!(out, InferenceOutput::Json(json!({"generated_text": "there"})));
    }

    #[test]
    fn data_urls_decode_locally() {
        let blob = decode_data_url("data:image/png;base64,aGk=").unwrap().unwrap();
        assert_eq!(blob.content_type, "image/png");
        assert_eq!(blob.bytes, Bytes::from_static(b"hi"));
        assert!(decode_data_url("https://cdn.test/x.png").unwrap().is_none());
        assert!(decode_data_url("data:image/png;base64").is_err());
    }

    #[tokio::test]
    async fn media_output_honours_output_type() {
        let headers = Headers::new();
        let transport = MockTransport::new().with_bytes(200, "image/png", b"PNG");
        let raw = json!({"images": [{"url": "https://cdn.test/a.png"}]});

        let ctx = context("https://router.test/fal-ai/x", &headers, &transport, OutputType::Url);
        assert_eq!(
            ctx.media_output("https://cdn.test/a.png", raw.clone()).await.unwrap(),
            InferenceOutput::Text("https://cdn.test/a.png".into())
        );
        assert_eq!(transport.call_count(), 0);

        let ctx =
            context("https://router.test/fal-ai/x", &headers, &transport, OutputType::DataUrl);
        assert_eq!(
            ctx.media_output("https://cdn.test/a.png", raw.clone()).await.unwrap(),
            InferenceOutput::Text("data:image/png;base64,UE5H".into())
        );
        assert_eq!(transport.call_count(), 1);

        let ctx = context("https://router.test/fal-ai/x", &headers, &transport, OutputType::Json);
        assert_eq!(
            ctx.media_output("https://cdn.test/a.png", raw.clone()).await.unwrap(),
            InferenceOutput::Json(raw)
        );
    }

    #[tokio::test]
    async fn failed_media_download_is_a_provider_api_error() {
        let headers = Headers::new();
        let transport = MockTransport::new().with_response(403, "text/plain", "expired");
        let ctx = context("https://api.test/x", &headers, &transport, OutputType::Blob);
        let err = ctx.fetch_media("https://cdn.test/a.png").await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn base64_output_decodes_for_blobs() {
        let headers = Headers::new();
        let transport = MockTransport::new();
        let ctx = context("https://api.test/x", &headers, &transport, OutputType::Blob);
        let out = ctx.base64_output("aGk=", "image/jpeg", Value::Null).unwrap();
        assert_eq!(out, InferenceOutput::Blob(Blob::new(Bytes::from_static(b"hi"), "image/jpeg")));
        assert!(ctx.base64_output("!!!", "image/jpeg", Value::Null).is_err());
    }

    #[test]
    fn job_base_url_keeps_router_prefix() {
        let headers = Headers::new();
        let transport = MockTransport::new();
        let ctx = context(
            "https://router.test/wavespeed/api/v3/model",
            &headers,
            &transport,
            OutputType::Blob,
        );
        assert_eq!(
            ctx.job_base_url(InferenceProvider::Wavespeed).unwrap(),
            "https://router.test/wavespeed"
        );
        let ctx = context(
            "http://127.0.0.1:9000/api/v3/model",
            &headers,
            &transport,
            OutputType::Blob,
        );
        assert_eq!(
            ctx.job_base_url(InferenceProvider::Wavespeed).unwrap(),
            "http://127.0.0.1:9000"
        );
    }
}
