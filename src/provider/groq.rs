//! Groq. Its OpenAI-compatible API lives under `openai/`, and it has no
//! legacy completions endpoint, so text generation goes through chat.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper, TextGenerationTask};
use std::sync::Arc;

pub const GROQ_API_BASE_URL: &str = "https://api.groq.com";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(
                ConversationalTask::new(InferenceProvider::Groq, GROQ_API_BASE_URL)
                    .with_route("openai/v1/chat/completions"),
            ),
        ),
        (
            InferenceTask::TextGeneration,
            Arc::new(
                TextGenerationTask::new(InferenceProvider::Groq, GROQ_API_BASE_URL)
                    .chat_backed()
                    .with_route("openai/v1/chat/completions"),
            ),
        ),
    ]
}
