//! Replicate predictions API. Requests are made with `Prefer: wait`, so the
//! prediction normally completes within the submission call and `output`
//! already holds the media URL.

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, HeaderParams, InferenceOutput, ProviderHelper, ProviderResponse, ResponseContext,
    UrlParams, default_headers, expect_json, flatten_args,
};
use crate::transport::Headers;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const REPLICATE_API_BASE_URL: &str = "https://api.replicate.com";

pub struct ReplicateTask {
    task: InferenceTask,
}

impl ReplicateTask {
    pub fn new(task: InferenceTask) -> Self {
        Self { task }
    }

    /// Input field holding the prompt.
    fn input_key(&self) -> &'static str {
        match self.task {
            InferenceTask::TextToSpeech => "text",
            _ => "prompt",
        }
    }

    /// `output` as a single URL: either the string itself or the first
    /// element of an array.
    fn output_url(value: &Value) -> Option<&str> {
        match value.get("output")? {
            Value::String(url) => Some(url),
            Value::Array(items) => items.first()?.as_str(),
            _ => None,
        }
    }
}

#[async_trait]
impl ProviderHelper for ReplicateTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Replicate
    }

    fn base_url(&self) -> &str {
        REPLICATE_API_BASE_URL
    }

    /// Versioned models (`owner/name:version`) go through the generic
    /// predictions endpoint; others through the model's own.
    fn make_route(&self, params: &UrlParams<'_>) -> String {
        if params.model.contains(':') {
            "v1/predictions".to_string()
        } else {
            format!("v1/models/{}/predictions", params.model)
        }
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        let mut headers = default_headers(params, is_binary);
        headers.insert("Prefer".to_string(), "wait".to_string());
        headers
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert(
            "input".to_string(),
            Value::Object(flatten_args(&params.json_args(), self.input_key())),
        );
        if let Some((_, version)) = params.model.split_once(':') {
            payload.insert("version".to_string(), Value::String(version.to_string()));
        }
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let value = expect_json(response, "{ output: string | string[] }")?;
        let url = Self::output_url(&value)
            .ok_or_else(|| {
                InferenceError::provider_output(format!(
                    "Received malformed response from Replicate {} API: {value}",
                    self.task
                ))
            })?
            .to_string();
        ctx.media_output(&url, value).await
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    [
        InferenceTask::TextToImage,
        InferenceTask::TextToSpeech,
        InferenceTask::TextToVideo,
    ]
    .into_iter()
    .map(|task| (task, Arc::new(ReplicateTask::new(task)) as Arc<dyn ProviderHelper>))
    .collect()
}
