//! Hyperbolic: chat, chat-backed text generation, and image generation.

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, ConversationalTask, InferenceOutput, ProviderHelper, ProviderResponse,
    ResponseContext, TextGenerationTask, UrlParams, expect_json, flatten_args,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const HYPERBOLIC_API_BASE_URL: &str = "https://api.hyperbolic.xyz";

/// `POST /v1/images/generations` with `model_name`; answers with base64
/// images in `images[0].image`.
pub struct HyperbolicTextToImageTask;

#[async_trait]
impl ProviderHelper for HyperbolicTextToImageTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Hyperbolic
    }

    fn base_url(&self) -> &str {
        HYPERBOLIC_API_BASE_URL
    }

    fn make_route(&self, _params: &UrlParams<'_>) -> String {
        "/v1/images/generations".to_string()
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = flatten_args(&params.json_args(), "prompt");
        payload.insert("model_name".to_string(), Value::String(params.model.to_string()));
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let value = expect_json(response, "Hyperbolic text-to-image response format")?;
        let image = value
            .pointer("/images/0/image")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                InferenceError::provider_output("Expected Hyperbolic text-to-image response format")
            })?
            .to_string();
        ctx.base64_output(&image, "image/jpeg", value)
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ConversationalTask::new(
                InferenceProvider::Hyperbolic,
                HYPERBOLIC_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(
                TextGenerationTask::new(InferenceProvider::Hyperbolic, HYPERBOLIC_API_BASE_URL)
                    .chat_backed(),
            ),
        ),
        (InferenceTask::TextToImage, Arc::new(HyperbolicTextToImageTask)),
    ]
}
