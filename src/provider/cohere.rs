//! Cohere, through its OpenAI compatibility layer.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper};
use std::sync::Arc;

pub const COHERE_API_BASE_URL: &str = "https://api.cohere.com";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![(
        InferenceTask::Conversational,
        Arc::new(
            ConversationalTask::new(InferenceProvider::Cohere, COHERE_API_BASE_URL)
                .with_route("compatibility/v1/chat/completions"),
        ),
    )]
}
