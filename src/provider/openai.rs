//! OpenAI. Reachable only with an OpenAI key and an `openai/`-prefixed model
//! id; the router does not proxy it.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ProviderHelper};
use std::sync::Arc;

pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![(
        InferenceTask::Conversational,
        Arc::new(
            ConversationalTask::new(InferenceProvider::Openai, OPENAI_API_BASE_URL)
                .client_side_routing(),
        ),
    )]
}
