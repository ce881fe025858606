//! Featherless AI: OpenAI chat and completions.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper, TextGenerationTask};
use std::sync::Arc;

pub const FEATHERLESS_API_BASE_URL: &str = "https://api.featherless.ai";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ConversationalTask::new(
                InferenceProvider::FeatherlessAi,
                FEATHERLESS_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(TextGenerationTask::new(
                InferenceProvider::FeatherlessAi,
                FEATHERLESS_API_BASE_URL,
            )),
        ),
    ]
}
