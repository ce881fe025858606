//! hf-inference: Hugging Face's own serverless inference, reached only
//! through the router and addressed by hub model id.
//!
//! One helper type serves every hub pipeline task; the route is `models/{model}` except
//! for chat (`models/{model}/v1/chat/completions`) and for models run under
//! a pipeline other than their default one (`pipeline/{task}/{model}`).

use crate::api::{InferenceProvider, InferenceTask, is_url};
use crate::config::HF_ROUTER_URL;
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, ConversationalTask, InferenceOutput, ProviderHelper, ProviderResponse,
    ResponseContext, TextGenerationTask, UrlParams,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Default base URL, for the default router.
pub const HF_INFERENCE_API_BASE_URL: &str = "https://router.huggingface.co/hf-inference";

/// Tasks served by hf-inference.
pub const HF_INFERENCE_TASKS: [InferenceTask; 28] = [
    InferenceTask::Conversational,
    InferenceTask::TextGeneration,
    InferenceTask::TextClassification,
    InferenceTask::TokenClassification,
    InferenceTask::FillMask,
    InferenceTask::Summarization,
    InferenceTask::Translation,
    InferenceTask::QuestionAnswering,
    InferenceTask::ZeroShotClassification,
    InferenceTask::FeatureExtraction,
    InferenceTask::SentenceSimilarity,
    InferenceTask::TableQuestionAnswering,
    InferenceTask::TextToImage,
    InferenceTask::TextToSpeech,
    InferenceTask::TextToAudio,
    InferenceTask::ImageClassification,
    InferenceTask::ZeroShotImageClassification,
    InferenceTask::ImageSegmentation,
    InferenceTask::ObjectDetection,
    InferenceTask::ImageToText,
    InferenceTask::ImageToImage,
    InferenceTask::DocumentQuestionAnswering,
    InferenceTask::VisualQuestionAnswering,
    InferenceTask::AudioClassification,
    InferenceTask::AudioToAudio,
    InferenceTask::AutomaticSpeechRecognition,
    InferenceTask::TabularClassification,
    InferenceTask::TabularRegression,
];

/// Chat URL for a caller-supplied endpoint: trailing slashes are dropped,
/// `/v1` gains `/chat/completions`, and a bare root gains
/// `/v1/chat/completions`.
pub fn chat_completions_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        format!("{trimmed}/chat/completions")
    } else if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1/chat/completions")
    }
}

pub struct HfInferenceTask {
    task: InferenceTask,
    chat: ConversationalTask,
    text_generation: TextGenerationTask,
}

impl HfInferenceTask {
    pub fn new(task: InferenceTask) -> Self {
        Self {
            task,
            chat: ConversationalTask::new(
                InferenceProvider::HfInference,
                HF_INFERENCE_API_BASE_URL,
            ),
            text_generation: TextGenerationTask::new(
                InferenceProvider::HfInference,
                HF_INFERENCE_API_BASE_URL,
            )
            .passthrough(),
        }
    }

    pub fn task(&self) -> InferenceTask {
        self.task
    }
}

#[async_trait]
impl ProviderHelper for HfInferenceTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::HfInference
    }

    fn base_url(&self) -> &str {
        HF_INFERENCE_API_BASE_URL
    }

    /// Always the router, whatever the auth method.
    fn make_base_url(&self, params: &UrlParams<'_>) -> String {
        let router = if params.router_url.is_empty() {
            HF_ROUTER_URL
        } else {
            params.router_url
        };
        format!("{router}/{}", InferenceProvider::HfInference)
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        if let Some(pipeline) = params.pipeline_task {
            return format!("pipeline/{}/{}", pipeline, params.model);
        }
        if self.task == InferenceTask::Conversational {
            return format!("models/{}/v1/chat/completions", params.model);
        }
        format!("models/{}", params.model)
    }

    fn make_url(&self, params: &UrlParams<'_>) -> String {
        if is_url(params.model) {
            if self.task == InferenceTask::Conversational {
                return chat_completions_endpoint(params.model);
            }
            return params.model.to_string();
        }
        format!(
            "{}/{}",
            self.make_base_url(params),
            self.make_route(params)
        )
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        if self.task == InferenceTask::Conversational {
            return Ok(Value::Object(self.chat.payload(params)));
        }
        Ok(Value::Object(params.json_args()))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        match self.task {
            InferenceTask::Conversational => self.chat.validate(response),
            InferenceTask::TextGeneration => self.text_generation.validate(response),
            InferenceTask::TextToImage => match response {
                ProviderResponse::Blob(blob) => Ok(ctx.blob_output(blob)),
                // Some pipelines answer with hosted image URLs instead of bytes.
                ProviderResponse::Json(value) => {
                    let url = value
                        .pointer("/output/0")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            InferenceError::provider_output(format!(
                                "Received malformed response from hf-inference text-to-image API: {value}"
                            ))
                        })?
                        .to_string();
                    ctx.media_output(&url, value).await
                }
            },
            // Audio comes back as bytes, or as `{output: url | [url]}`.
            InferenceTask::TextToSpeech | InferenceTask::TextToAudio => match response {
                ProviderResponse::Blob(blob) => Ok(ctx.blob_output(blob)),
                ProviderResponse::Json(value) => {
                    let url = match value.get("output") {
                        Some(Value::String(url)) => Some(url.clone()),
                        Some(Value::Array(urls)) => {
                            urls.first().and_then(Value::as_str).map(str::to_string)
                        }
                        _ => None,
                    };
                    let Some(url) = url else {
                        return Err(self.malformed("Blob or object with output", &value));
                    };
                    ctx.media_output(&url, value).await
                }
            },
            InferenceTask::ImageToImage => match response {
                ProviderResponse::Blob(blob) => Ok(ctx.blob_output(blob)),
                ProviderResponse::Json(value) => Err(self.malformed("Blob", &value)),
            },
            _ => Ok(match response {
                ProviderResponse::Json(value) => InferenceOutput::Json(value),
                ProviderResponse::Blob(blob) => InferenceOutput::Blob(blob),
            }),
        }
    }
}

impl HfInferenceTask {
    fn malformed(&self, expected: &str, value: &Value) -> InferenceError {
        InferenceError::provider_output(format!(
            "Received malformed response from hf-inference {} API: expected {expected}, got: {value}",
            self.task
        ))
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    InferenceTask::iter()
        .filter(|task| HF_INFERENCE_TASKS.contains(task))
        .map(|task| (task, Arc::new(HfInferenceTask::new(task)) as Arc<dyn ProviderHelper>))
        .collect()
}
