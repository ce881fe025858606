//! SambaNova: chat completions and embeddings.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, EmbeddingsTask, ProviderHelper};
use std::sync::Arc;

pub const SAMBANOVA_API_BASE_URL: &str = "https://api.sambanova.ai";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ConversationalTask::new(
                InferenceProvider::Sambanova,
                SAMBANOVA_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::FeatureExtraction,
            Arc::new(EmbeddingsTask::new(
                InferenceProvider::Sambanova,
                SAMBANOVA_API_BASE_URL,
            )),
        ),
    ]
}
