//! Nscale: chat completions and base64 image generation.

use crate::api::{InferenceProvider, InferenceTask};
use crate::helper::{ConversationalTask, ImageGenerationTask, ProviderHelper};
use std::sync::Arc;

pub const NSCALE_API_BASE_URL: &str = "https://inference.api.nscale.com";

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![
        (
            InferenceTask::Conversational,
            Arc::new(ConversationalTask::new(
                InferenceProvider::Nscale,
                NSCALE_API_BASE_URL,
            )),
        ),
        (
            InferenceTask::TextToImage,
            Arc::new(ImageGenerationTask::new(
                InferenceProvider::Nscale,
                NSCALE_API_BASE_URL,
                "b64_json",
            )),
        ),
    ]
}
