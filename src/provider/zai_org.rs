//! Z.ai (GLM models): chat completions and async image generation.

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, ConversationalTask, HeaderParams, InferenceOutput, ProviderHelper,
    ProviderResponse, ResponseContext, UrlParams, default_headers, expect_json, flatten_args,
};
use crate::transport::Headers;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const ZAI_API_BASE_URL: &str = "https://api.z.ai";

fn with_channel_headers(mut headers: Headers) -> Headers {
    headers.insert("x-source-channel".to_string(), "hugging_face".to_string());
    headers.insert("accept-language".to_string(), "en-US,en".to_string());
    headers
}

pub struct ZaiConversationalTask {
    inner: ConversationalTask,
}

impl ZaiConversationalTask {
    pub fn new() -> Self {
        Self {
            inner: ConversationalTask::new(InferenceProvider::ZaiOrg, ZAI_API_BASE_URL)
                .with_route("/api/paas/v4/chat/completions"),
        }
    }
}

impl Default for ZaiConversationalTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderHelper for ZaiConversationalTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::ZaiOrg
    }

    fn base_url(&self) -> &str {
        ZAI_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        self.inner.make_route(params)
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        with_channel_headers(default_headers(params, is_binary))
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        self.inner.prepare_payload(params)
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        _ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        self.inner.validate(response)
    }
}

/// Async image generation: submit, then poll
/// `/api/paas/v4/async-result/{id}` until `SUCCESS` or `FAIL`.
pub struct ZaiTextToImageTask;

impl ZaiTextToImageTask {
    fn malformed(value: &Value) -> InferenceError {
        InferenceError::provider_output(format!(
            "Received malformed response from ZAI text-to-image API: expected {{ image_result: Array<{{ url: string }}> }}, got: {value}"
        ))
    }
}

#[async_trait]
impl ProviderHelper for ZaiTextToImageTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::ZaiOrg
    }

    fn base_url(&self) -> &str {
        ZAI_API_BASE_URL
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        "/api/paas/v4/async/images/generations".to_string()
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        with_channel_headers(default_headers(params, is_binary))
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = flatten_args(&params.json_args(), "prompt");
        payload.insert("model".to_string(), Value::String(params.model.to_string()));
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let submitted = expect_json(response, "{ id: string, task_status: string }")?;
        let (Some(task_id), Some(status)) = (
            submitted.get("id").and_then(Value::as_str),
            submitted.get("task_status").and_then(Value::as_str),
        ) else {
            return Err(InferenceError::provider_output(format!(
                "Received malformed response from ZAI text-to-image API: expected {{ id: string, task_status: string }}, got: {submitted}"
            )));
        };
        if status == "FAIL" {
            return Err(InferenceError::provider_output(
                "ZAI API returned task status: FAIL",
            ));
        }

        let poll_url = format!(
            "{}/api/paas/v4/async-result/{}",
            ctx.job_base_url(InferenceProvider::ZaiOrg)?,
            task_id
        );
        let poll_headers = with_channel_headers(ctx.headers.clone());
        loop {
            ctx.wait().await?;
            let result = ctx
                .get_json_with(
                    &poll_url,
                    &poll_headers,
                    "Failed to fetch result from ZAI text-to-image API",
                )
                .await?;
            match result.get("task_status").and_then(Value::as_str) {
                Some("PROCESSING") => continue,
                Some("FAIL") => {
                    return Err(InferenceError::provider_output(
                        "ZAI text-to-image API task failed",
                    ));
                }
                Some("SUCCESS") => {
                    let url = result
                        .pointer("/image_result/0/url")
                        .and_then(Value::as_str)
                        .filter(|url| url.starts_with("http"))
                        .ok_or_else(|| Self::malformed(&result))?
                        .to_string();
                    return ctx.media_output(&url, result).await;
                }
                _ => return Err(Self::malformed(&result)),
            }
        }
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ZaiConversationalTask::new()),
        ),
        (InferenceTask::TextToImage, Arc::new(ZaiTextToImageTask)),
    ]
}
