//! OVHcloud AI Endpoints: OpenAI chat and completions.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper, TextGenerationTask};
use std::sync::Arc;

pub const OVHCLOUD_API_BASE_URL: &str = "https://oai.endpoints.kepler.ai.cloud.ovh.net";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ConversationalTask::new(
                InferenceProvider::Ovhcloud,
                OVHCLOUD_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(TextGenerationTask::new(
                InferenceProvider::Ovhcloud,
                OVHCLOUD_API_BASE_URL,
            )),
        ),
    ]
}
