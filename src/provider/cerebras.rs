//! Cerebras: OpenAI-compatible chat completions.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper};
use std::sync::Arc;

pub const CEREBRAS_API_BASE_URL: &str = "https://api.cerebras.ai";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![(
        InferenceTask::Conversational,
        Arc::new(ConversationalTask::new(
            InferenceProvider::Cerebras,
            CEREBRAS_API_BASE_URL,
        )),
    )]
}
