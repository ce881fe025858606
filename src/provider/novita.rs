//! Novita, OpenAI-compatible under `v3/openai/`.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper, TextGenerationTask};
use std::sync::Arc;

pub const NOVITA_API_BASE_URL: &str = "https://api.novita.ai";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(
                ConversationalTask::new(InferenceProvider::Novita, NOVITA_API_BASE_URL)
                    .with_route("v3/openai/chat/completions"),
            ),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(
                TextGenerationTask::new(InferenceProvider::Novita, NOVITA_API_BASE_URL)
                    .with_route("v3/openai/completions"),
            ),
        ),
    ]
}
