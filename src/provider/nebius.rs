//! Nebius AI Studio: chat, completions, image generation and embeddings.

use crate::api::{InferenceProvider, InferenceTask, RequestBody};
use crate::error::Result;
use crate::helper::{
    BodyParams, ConversationalTask, EmbeddingsTask, ImageGenerationTask, InferenceOutput,
    ProviderHelper, ProviderResponse, ResponseContext, TextGenerationTask, UrlParams,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const NEBIUS_API_BASE_URL: &str = "https://api.studio.nebius.ai";

/// Chat completions. A JSON schema response format is also passed as
/// `guided_json`, which Nebius uses for constrained decoding.
pub struct NebiusConversationalTask {
    inner: ConversationalTask,
}

impl NebiusConversationalTask {
    pub fn new() -> Self {
        Self {
            inner: ConversationalTask::new(InferenceProvider::Nebius, NEBIUS_API_BASE_URL),
        }
    }
}

impl Default for NebiusConversationalTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderHelper for NebiusConversationalTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::Nebius
    }

    fn base_url(&self) -> &str {
        NEBIUS_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        self.inner.make_route(params)
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        let mut payload = self.inner.payload(params);
        let schema = match params.args {
            RequestBody::Json(args) => args
                .get("response_format")
                .filter(|format| format.get("type").and_then(Value::as_str) == Some("json_schema"))
                .and_then(|format| format.pointer("/json_schema/schema"))
                .cloned(),
            RequestBody::Binary { .. } => None,
        };
        if let Some(schema) = schema {
            payload.insert("guided_json".to_string(), schema);
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
            Arc::new(NebiusConversationalTask::new()),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(TextGenerationTask::new(
                InferenceProvider::Nebius,
                NEBIUS_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextToImage,
            Arc::new(ImageGenerationTask::new(
                InferenceProvider::Nebius,
                NEBIUS_API_BASE_URL,
                "b64_json",
            )),
        ),
        (
            InferenceTask::FeatureExtraction,
            Arc::new(EmbeddingsTask::new(
                InferenceProvider::Nebius,
                NEBIUS_API_BASE_URL,
            )),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OutputType;
    use crate::helper::test_support::{body_params, context};
    use crate::mock::MockTransport;
    use crate::transport::Headers;
    use serde_json::json;

    #[test]
    fn json_schema_is_mirrored_into_guided_json() {
        let args = RequestBody::Json(
            json!({
                "messages": [],
                "response_format": {"type": "json_schema", "json_schema": {"schema": {"type": "object"}}}
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let payload = NebiusConversationalTask::new()
            .prepare_payload(&body_params(&args, "m", InferenceTask::Conversational))
            .unwrap();
        assert_eq!(payload["guided_json"], json!({"type": "object"}));
        assert_eq!(payload["response_format"]["type"], "json_schema");
    }

    #[tokio::test]
    async fn embeddings_return_one_vector_per_input() {
        let helper = EmbeddingsTask::new(InferenceProvider::Nebius, NEBIUS_API_BASE_URL);
        let args = RequestBody::Json(json!({"inputs": ["a", "b"]}).as_object().cloned().unwrap());
        let payload = helper
            .prepare_payload(&body_params(&args, "bge", InferenceTask::FeatureExtraction))
            .unwrap();
        assert_eq!(payload, json!({"input": ["a", "b"], "model": "bge"}));

        let headers = Headers::new();
        let transport = MockTransport::new();
        let ctx = context(
            "https://api.studio.nebius.ai/v1/embeddings",
            &headers,
            &transport,
            OutputType::Json,
        );
        let out = helper
            .get_response(
                ProviderResponse::Json(json!({
                    "data": [{"embedding": [0.1, 0.2]}, {"embedding": [0.3, 0.4]}]
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out, InferenceOutput::Json(json!([[0.1, 0.2], [0.3, 0.4]])));

        let err = helper
            .get_response(ProviderResponse::Json(json!({"data": [{"vector": []}]})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nebius embeddings API"));
    }
}
