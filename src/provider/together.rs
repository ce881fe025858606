//! Together AI: chat, completions and base64 image generation.

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::Result;
use crate::helper::{
    BodyParams, ConversationalTask, ImageGenerationTask, InferenceOutput, ProviderHelper,
    ProviderResponse, ResponseContext, TextGenerationTask, UrlParams,
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

pub const TOGETHER_API_BASE_URL: &str = "https://api.together.xyz";

/// Chat completions. Together takes a JSON schema response format as
/// `{type, schema}` rather than OpenAI's `{type, json_schema: {schema}}`.
pub struct TogetherConversationalTask {
    inner: ConversationalTask,
}

impl TogetherConversationalTask {
    pub fn new() -> Self {
        Self {
            inner: ConversationalTask::new(InferenceProvider::Together, TOGETHER_API_BASE_URL),
        }
    }
}

impl Default for TogetherConversationalTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderHelper for TogetherConversationalTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Together
    }

    fn base_url(&self) -> &str {
        TOGETHER_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        self.inner.make_route(params)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = self.inner.payload(params);
        let schema = payload
            .get("response_format")
            .filter(|format| format.get("type").and_then(Value::as_str) == Some("json_schema"))
            .and_then(|format| format.pointer("/json_schema/schema"))
            .cloned();
        if let Some(schema) = schema {
            payload.insert(
                "response_format".to_string(),
                json!({"type": "json_schema", "schema": schema}),
            );
        }
        Ok(Value::Object(payload))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        _ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        self.inner.validate(response)
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(TogetherConversationalTask::new()),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(TextGenerationTask::new(
                InferenceProvider::Together,
                TOGETHER_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextToImage,
            Arc::new(ImageGenerationTask::new(
                InferenceProvider::Together,
                TOGETHER_API_BASE_URL,
                "base64",
            )),
        ),
    ]
}
