//! WaveSpeed AI: async text-to-image and text-to-video jobs.
//!
//! Submission answers with `data.urls.get`; that path is polled on the host
//! the request went to until the job reports `completed` or `failed`.

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, InferenceOutput, ProviderHelper, ProviderResponse, ResponseContext, UrlParams,
    expect_json, flatten_args, required_str,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub const WAVESPEED_API_BASE_URL: &str = "https://api.wavespeed.ai";

pub struct WavespeedTask {
    task: InferenceTask,
}

impl WavespeedTask {
    pub fn new(task: InferenceTask) -> Self {
        Self { task }
    }

    pub fn task(&self) -> InferenceTask {
        self.task
    }
}

#[async_trait]
impl ProviderHelper for WavespeedTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Wavespeed
    }

    fn base_url(&self) -> &str {
        WAVESPEED_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        format!("/api/v3/{}", params.model)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut args = params.json_args();
        if let Some(Value::Object(parameters)) = args.get_mut("parameters") {
            parameters.remove("images");
        }
        let mut payload = flatten_args(&args, "prompt");
        if let Some(mapping) = params.mapping.filter(|m| m.is_lora()) {
            payload.insert(
                "loras".to_string(),
                json!([{"path": mapping.hf_model_id, "scale": 1}]),
            );
        }
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let submitted = expect_json(response, "{ data: { urls: { get: string } } }")?;
        let get_url =
            required_str(&submitted, "/data/urls/get", "{ data: { urls: { get: string } } }")?;
        let result_path = url::Url::parse(get_url)
            .map_err(|e| {
                InferenceError::provider_output(format!(
                    "Invalid WaveSpeed result URL {get_url}: {e}"
                ))
            })?
            .path()
            .to_string();
        let result_url = format!(
            "{}{}",
            ctx.job_base_url(InferenceProvider::Wavespeed)?,
            result_path
        );

        loop {
            let result = ctx
                .get_json(&result_url, "Failed to fetch response status from WaveSpeed AI API")
                .await?;
            let task = result.get("data").unwrap_or(&Value::Null);
            match task.get("status").and_then(Value::as_str) {
                Some("completed") => {
                    let media_url = task
                        .pointer("/outputs/0")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            InferenceError::provider_output(
                                "Received malformed response from WaveSpeed AI API: No output URL in completed response",
                            )
                        })?
                        .to_string();
                    return ctx.media_output(&media_url, result).await;
                }
                Some("failed") => {
                    let message = task
                        .get("error")
                        .and_then(Value::as_str)
                        .filter(|e| !e.is_empty())
                        .unwrap_or("Task failed");
                    return Err(InferenceError::provider_output(message));
                }
                Some("created" | "processing") => ctx.wait().await?,
                _ => {
                    return Err(InferenceError::provider_output(format!(
                        "Received malformed response from WaveSpeed AI API: {result}"
                    )));
                }
            }
        }
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::TextToImage,
            Arc::new(WavespeedTask::new(InferenceTask::TextToImage)),
        ),
        (
            InferenceTask::TextToVideo,
            Arc::new(WavespeedTask::new(InferenceTask::TextToVideo)),
        ),
    ]
}
