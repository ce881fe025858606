//! Fireworks AI chat completions under the `inference/` prefix.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper};
use std::sync::Arc;

pub const FIREWORKS_AI_API_BASE_URL: &str = "https://api.fireworks.ai";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![(
        InferenceTask::Conversational,
        Arc::new(
            ConversationalTask::new(InferenceProvider::FireworksAi, FIREWORKS_AI_API_BASE_URL)
                .with_route("inference/v1/chat/completions"),
        ),
    )]
}
