//! Provider registry: `(provider, task)` to [`ProviderHelper`].

use crate::api::{InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::ProviderHelper;
use crate::provider;
use std::collections::BTreeMap;
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Message for an external provider used without a task.
pub(crate) const TASK_REQUIRED: &str =
    "you need to provide a task name when using an external provider, e.g. 'text-to-image'";

/// Error for a provider name this crate does not know.
pub(crate) fn unsupported_provider(name: &str) -> InferenceError {
    let available = InferenceProvider::iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    InferenceError::input(format!(
        "Provider '{name}' not supported. Available providers: {available}"
    ))
}

/// Lookup table of helpers. [`ProviderRegistry::builtin`] holds every
/// built-in provider; [`register`](Self::register) adds or replaces entries.
#[derive(Clone)]
pub struct ProviderRegistry {
    helpers: BTreeMap<InferenceProvider, BTreeMap<InferenceTask, Arc<dyn ProviderHelper>>>,
}

impl ProviderRegistry {
    /// A registry with no helpers.
    pub fn empty() -> Self {
        Self {
            helpers: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let groups = [
            provider::black_forest_labs::helpers(),
            provider::cerebras::helpers(),
            provider::cohere::helpers(),
            provider::fal_ai::helpers(),
            provider::featherless_ai::helpers(),
            provider::fireworks_ai::helpers(),
            provider::groq::helpers(),
            provider::hf_inference::helpers(),
            provider::hyperbolic::helpers(),
            provider::nebius::helpers(),
            provider::novita::helpers(),
            provider::nscale::helpers(),
            provider::openai::helpers(),
            provider::ovhcloud::helpers(),
            provider::replicate::helpers(),
            provider::sambanova::helpers(),
            provider::together::helpers(),
            provider::wavespeed::helpers(),
            provider::zai_org::helpers(),
        ];
        let mut registry = Self::empty();
        for (task, helper) in groups.into_iter().flatten() {
            registry.insert(task, helper);
        }
        registry
    }

    fn insert(&mut self, task: InferenceTask, helper: Arc<dyn ProviderHelper>) {
        self.helpers
            .entry(helper.provider())
            .or_default()
            .insert(task, helper);
    }

    /// Register a helper for `task` under the helper's own provider. A second
    /// helper for the same pair replaces the first.
    #[must_use]
    pub fn register(mut self, task: InferenceTask, helper: Arc<dyn ProviderHelper>) -> Self {
        self.insert(task, helper);
        self
    }

    /// Helper for `provider` and `task`. hf-inference accepts a missing task
    /// and serves it as plain `models/{model}` inference.
    pub fn get_provider_helper(
        &self,
        provider: InferenceProvider,
        task: Option<InferenceTask>,
    ) -> Result<Arc<dyn ProviderHelper>> {
        let task = match task {
            Some(task) => task,
            None if provider == InferenceProvider::HfInference => {
                return Ok(Arc::new(provider::HfInferenceTask::new(
                    InferenceTask::TextClassification,
                )));
            }
            None => return Err(InferenceError::input(TASK_REQUIRED)),
        };
        let tasks = self
            .helpers
            .get(&provider)
            .ok_or_else(|| unsupported_provider(provider.as_str()))?;
        tasks.get(&task).cloned().ok_or_else(|| {
            let available = tasks
                .keys()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            InferenceError::input(format!(
                "Task '{task}' not supported for provider '{provider}'. Available tasks: {available}"
            ))
        })
    }

    pub fn providers(&self) -> impl Iterator<Item = InferenceProvider> + '_ {
        self.helpers.keys().copied()
    }

    pub fn tasks(&self, provider: InferenceProvider) -> Vec<InferenceTask> {
        self.helpers
            .get(&provider)
            .map(|tasks| tasks.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn supports(&self, provider: InferenceProvider, task: InferenceTask) -> bool {
        self.helpers
            .get(&provider)
            .is_some_and(|tasks| tasks.contains_key(&task))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (provider, tasks) in &self.helpers {
            map.entry(provider, &tasks.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthMethod, RequestBody};
    use crate::helper::test_support::{body_params, url_params};
    use serde_json::json;

    #[test]
    fn every_provider_is_registered() {
        let registry = ProviderRegistry::builtin();
        let registered: Vec<_> = registry.providers().collect();
        let all: Vec<_> = InferenceProvider::iter().collect();
        assert_eq!(registered, all);
    }

    #[test]
    fn urls_start_with_base_url() {
        let registry = ProviderRegistry::builtin();
        for provider in registry.providers() {
            for task in registry.tasks(provider) {
                let helper = registry.get_provider_helper(provider, Some(task)).unwrap();
                let direct = url_params(AuthMethod::ProviderKey, "org/model", task);
                let base = helper.make_base_url(&direct);
                if provider != InferenceProvider::HfInference {
                    assert_eq!(base, helper.base_url(), "{provider}/{task}");
                }
                assert!(helper.make_url(&direct).starts_with(&base), "{provider}/{task}");

                let routed = url_params(AuthMethod::HfToken, "org/model", task);
                let url = helper.make_url(&routed);
                assert!(
                    url.starts_with(&format!("https://router.test/{provider}/")),
                    "{provider}/{task}: {url}"
                );
            }
        }
    }

    #[test]
    fn bodies_are_json_unless_binary() {
        let registry = ProviderRegistry::builtin();
        let args = RequestBody::Json(json!({"inputs": "hello"}).as_object().cloned().unwrap());
        for provider in registry.providers() {
            for task in registry.tasks(provider) {
                let helper = registry.get_provider_helper(provider, Some(task)).unwrap();
                let body = helper.make_body(&body_params(&args, "org/model", task)).unwrap();
                assert!(body.as_json().is_some(), "{provider}/{task}");
            }
        }
    }

    #[test]
    fn unknown_task_lists_available_tasks() {
        let err = ProviderRegistry::builtin()
            .get_provider_helper(InferenceProvider::Cerebras, Some(InferenceTask::TextToImage))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Task 'text-to-image' not supported for provider 'cerebras'. Available tasks: conversational"
        );
    }

    #[test]
    fn external_provider_requires_task() {
        let registry = ProviderRegistry::builtin();
        let err = registry
            .get_provider_helper(InferenceProvider::Together, None)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), TASK_REQUIRED);
        assert!(
            registry
                .get_provider_helper(InferenceProvider::HfInference, None)
                .is_ok()
        );
    }

    #[test]
    fn unknown_provider_name_is_rejected() {
        let err = "acme-ai".parse::<crate::api::ProviderPolicy>().unwrap_err();
        assert!(err.to_string().starts_with(
            "Provider 'acme-ai' not supported. Available providers: black-forest-labs, cerebras"
        ));
    }

    #[test]
    fn empty_registry_reports_unsupported_provider() {
        let err = ProviderRegistry::empty()
            .get_provider_helper(InferenceProvider::Groq, Some(InferenceTask::Conversational))
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("Provider 'groq' not supported"));
    }
}
