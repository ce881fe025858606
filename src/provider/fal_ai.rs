//! fal.ai: synchronous image, speech and transcription endpoints on
//! `fal.run`, and queued video generation on `queue.fal.run`.

use crate::api::{AuthMethod, InferenceProvider, InferenceTask, RequestBody};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, HeaderParams, InferenceOutput, ProviderHelper, ProviderResponse, ResponseContext,
    UrlParams, expect_json, flatten_args,
};
use crate::transport::{Body, Headers};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use std::sync::Arc;

pub const FAL_AI_API_BASE_URL: &str = "https://fal.run";
pub const FAL_AI_QUEUE_BASE_URL: &str = "https://queue.fal.run";

/// Audio content types accepted for transcription.
pub const FAL_AI_SUPPORTED_BLOB_TYPES: [&str; 4] =
    ["audio/mpeg", "audio/mp4", "audio/wav", "audio/x-wav"];

/// fal.ai expects `Key <token>` for its own keys.
fn fal_headers(params: &HeaderParams<'_>, is_binary: bool) -> Headers {
    let mut headers = Headers::new();
    if let Some(token) = params.credential() {
        let authorization = if params.auth_method == AuthMethod::ProviderKey {
            format!("Key {token}")
        } else {
            format!("Bearer {token}")
        };
        headers.insert("Authorization".to_string(), authorization);
    }
    if !is_binary {
        headers.insert("Content-Type".to_string(), "application/json".to_string());
    }
    headers
}

fn malformed(expected: &str, value: &Value) -> InferenceError {
    InferenceError::provider_output(format!(
        "Expected {expected} format from fal.ai, got: {value}"
    ))
}

/// Which fal.ai endpoint family a helper targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FalKind {
    TextToImage,
    TextToSpeech,
    AutomaticSpeechRecognition,
}

/// Synchronous endpoints, `POST https://fal.run/{model}`.
pub struct FalAiTask {
    kind: FalKind,
}

impl FalAiTask {
    pub fn text_to_image() -> Self {
        Self {
            kind: FalKind::TextToImage,
        }
    }

    pub fn text_to_speech() -> Self {
        Self {
            kind: FalKind::TextToSpeech,
        }
    }

    pub fn automatic_speech_recognition() -> Self {
        Self {
            kind: FalKind::AutomaticSpeechRecognition,
        }
    }

    fn image_payload(&self, params: &BodyParams<'_>) -> Value {
        let mut payload = flatten_args(&params.json_args(), "prompt");
        payload.insert("sync_mode".to_string(), Value::Bool(true));
        if let Some(mapping) = params.mapping.filter(|m| m.is_lora()) {
            if let Some(weights) = mapping.adapter_weights_path.as_deref() {
                payload.insert(
                    "loras".to_string(),
                    json!([{
                        "path": format!("{}/{}/resolve/main/{}", params.hub_url, mapping.hf_model_id, weights),
                        "scale": 1,
                    }]),
                );
                if mapping.provider_id == "fal-ai/lora" {
                    payload.insert(
                        "model_name".to_string(),
                        Value::String("stabilityai/stable-diffusion-xl-base-1.0".to_string()),
                    );
                }
            }
        }
        Value::Object(payload)
    }
}

#[async_trait]
impl ProviderHelper for FalAiTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::FalAi
    }

    fn base_url(&self) -> &str {
        FAL_AI_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        format!("/{}", params.model)
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        // Transcription audio is embedded in a JSON body.
        let is_binary = is_binary && self.kind != FalKind::AutomaticSpeechRecognition;
        fal_headers(params, is_binary)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        Ok(match self.kind {
            FalKind::TextToImage => self.image_payload(params),
            FalKind::TextToSpeech => Value::Object(flatten_args(&params.json_args(), "text")),
            FalKind::AutomaticSpeechRecognition => Value::Object(params.json_args()),
        })
    }

    fn make_body(&self, params: &BodyParams<'_>) -> Result<Body> {
        match (self.kind, params.args) {
            (FalKind::AutomaticSpeechRecognition, RequestBody::Binary { data, content_type }) => {
                let content_type = content_type.as_deref().unwrap_or_default();
                if !FAL_AI_SUPPORTED_BLOB_TYPES.contains(&content_type) {
                    return Err(InferenceError::input(format!(
                        "Provider fal-ai does not support blob type {content_type} - supported content types are: {}",
                        FAL_AI_SUPPORTED_BLOB_TYPES.join(", ")
                    )));
                }
                let payload = json!({
                    "audio_url": format!("data:{content_type};base64,{}", BASE64.encode(data)),
                });
                Ok(Body::Text(payload.to_string()))
            }
            (_, RequestBody::Binary { data, .. }) => Ok(Body::Binary(data.clone())),
            _ => Ok(Body::Text(self.prepare_payload(params)?.to_string())),
        }
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        match self.kind {
            FalKind::TextToImage => {
                let value = expect_json(response, "{ images: Array<{ url: string }> }")?;
                let url = value
                    .pointer("/images/0/url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("{ images: Array<{ url: string }> }", &value))?
                    .to_string();
                ctx.media_output(&url, value).await
            }
            FalKind::TextToSpeech => {
                let value = expect_json(response, "{ audio: { url: string } }")?;
                let url = value
                    .pointer("/audio/url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("{ audio: { url: string } }", &value))?
                    .to_string();
                ctx.media_output(&url, value).await
            }
            FalKind::AutomaticSpeechRecognition => {
                let value = expect_json(response, "{ text: string }")?;
                let text = value
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("{ text: string }", &value))?;
                Ok(InferenceOutput::Json(json!({ "text": text })))
            }
        }
    }
}

/// Queued video generation. The submission returns a `response_url`; its
/// path, rebased on the host the request went to, is polled at `/status`
/// until `COMPLETED` and then fetched for the result.
pub struct FalAiTextToVideoTask;

#[async_trait]
impl ProviderHelper for FalAiTextToVideoTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::FalAi
    }

    fn base_url(&self) -> &str {
        FAL_AI_QUEUE_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        if params.auth_method == AuthMethod::ProviderKey {
            format!("/{}", params.model)
        } else {
            format!("/{}?_subdomain=queue", params.model)
        }
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        fal_headers(params, is_binary)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        Ok(Value::Object(flatten_args(&params.json_args(), "prompt")))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let queued =
            expect_json(response, "{ request_id: string, status: string, response_url: string }")?;
        if queued.get("request_id").and_then(Value::as_str).is_none() {
            return Err(InferenceError::provider_output(
                "No request ID found in the response",
            ));
        }
        let response_url = queued
            .get("response_url")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("{ response_url: string }", &queued))?;
        let model_path = url::Url::parse(response_url)
            .map_err(|e| {
                InferenceError::provider_output(format!(
                    "Invalid fal.ai response_url {response_url}: {e}"
                ))
            })?
            .path()
            .to_string();
        let query = url::Url::parse(ctx.url)
            .ok()
            .and_then(|u| u.query().map(|q| format!("?{q}")))
            .unwrap_or_default();
        let base = ctx.job_base_url(InferenceProvider::FalAi)?;
        let status_url = format!("{base}{model_path}/status{query}");
        let result_url = format!("{base}{model_path}{query}");

        let mut status = queued
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        while status != "COMPLETED" {
            ctx.wait().await?;
            let polled = ctx
                .get_json(&status_url, "Failed to fetch response status from fal-ai API")
                .await?;
            status = polled
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("{ status: string }", &polled))?
                .to_string();
            tracing::debug!(%status, "fal.ai queue status");
        }

        let result = ctx
            .get_json(&result_url, "Failed to fetch result from fal-ai API")
            .await?;
        let video_url = result
            .pointer("/video/url")
            .and_then(Value::as_str)
            .filter(|u| crate::api::is_url(u))
            .ok_or_else(|| malformed("{ video: { url: string } }", &result))?
            .to_string();
        ctx.media_output(&video_url, result).await
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::TextToImage,
            Arc::new(FalAiTask::text_to_image()),
        ),
        (
            InferenceTask::TextToSpeech,
            Arc::new(FalAiTask::text_to_speech()),
        ),
        (
            InferenceTask::AutomaticSpeechRecognition,
            Arc::new(FalAiTask::automatic_speech_recognition()),
        ),
        (InferenceTask::TextToVideo, Arc::new(FalAiTextToVideoTask)),
    ]
}
