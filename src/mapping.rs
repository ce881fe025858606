//! Model/provider mapping resolution.
//!
//! Decides which provider serves a request when the caller leaves it to
//! `auto`, and translates a hub model id into the provider's own model id.
//! Remote mappings are fetched once per model and kept in a [`MappingCache`].
//! A [`HardcodedModelMapping`] table is consulted before any remote lookup.

use crate::api::{InferenceProvider, InferenceTask, ProviderMappingEntry, ProviderPolicy};
use crate::cache::MappingCache;
use crate::error::{InferenceError, Result};
use crate::hub::HubClient;
use crate::registry::unsupported_provider;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tasks hf-inference serves interchangeably for sentence-transformers models.
pub const EQUIVALENT_SENTENCE_TRANSFORMERS_TASKS: [InferenceTask; 2] = [
    InferenceTask::FeatureExtraction,
    InferenceTask::SentenceSimilarity,
];

/// All providers serving one model, in the order the hub listed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMapping {
    entries: Vec<(String, ProviderMappingEntry)>,
}

impl ProviderMapping {
    pub fn new(entries: Vec<(String, ProviderMappingEntry)>) -> Self {
        Self { entries }
    }

    /// Parse the hub's `inferenceProviderMapping` field, either an object
    /// keyed by provider or an array of entries carrying a `provider` key.
    /// Returns `None` when any entry is malformed.
    pub(crate) fn from_hub_value(value: &Value) -> Option<Self> {
        let entries = match value {
            Value::Object(map) => map
                .iter()
                .map(|(provider, entry)| {
                    serde_json::from_value(entry.clone())
                        .ok()
                        .map(|entry| (provider.clone(), entry))
                })
                .collect::<Option<Vec<_>>>()?,
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    let provider = item.get("provider")?.as_str()?.to_string();
                    serde_json::from_value(item.clone())
                        .ok()
                        .map(|entry| (provider, entry))
                })
                .collect::<Option<Vec<_>>>()?,
            _ => return None,
        };
        Some(Self { entries })
    }

    /// The provider the hub lists first.
    pub fn first_provider(&self) -> Option<&str> {
        self.entries.first().map(|(provider, _)| provider.as_str())
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderMappingEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name == provider)
            .map(|(_, entry)| entry)
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(provider, _)| provider.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Local overrides for trying models before the hub knows about them.
/// An override always wins over the remote mapping.
#[derive(Debug, Clone, Default)]
pub struct HardcodedModelMapping {
    entries: HashMap<(InferenceProvider, String), ProviderMappingEntry>,
}

impl HardcodedModelMapping {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        provider: InferenceProvider,
        hf_model_id: impl Into<String>,
        mut entry: ProviderMappingEntry,
    ) -> Self {
        let hf_model_id = hf_model_id.into();
        if entry.hf_model_id.is_empty() {
            entry.hf_model_id = hf_model_id.clone();
        }
        self.entries.insert((provider, hf_model_id), entry);
        self
    }

    pub fn get(
        &self,
        provider: InferenceProvider,
        hf_model_id: &str,
    ) -> Option<&ProviderMappingEntry> {
        self.entries.get(&(provider, hf_model_id.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parameters of a single mapping lookup.
#[derive(Debug, Clone, Copy)]
pub struct MappingQuery<'a> {
    pub model_id: &'a str,
    pub provider: InferenceProvider,
    pub task: InferenceTask,
    pub access_token: Option<&'a str>,
    pub signal: Option<&'a CancellationToken>,
}

/// Resolves providers and provider-side model ids.
pub struct MappingResolver {
    hub: Arc<HubClient>,
    cache: Arc<MappingCache>,
    overrides: Arc<HardcodedModelMapping>,
}

impl MappingResolver {
    pub fn new(
        hub: Arc<HubClient>,
        cache: Arc<MappingCache>,
        overrides: Arc<HardcodedModelMapping>,
    ) -> Self {
        Self {
            hub,
            cache,
            overrides,
        }
    }

    pub fn hub(&self) -> &HubClient {
        &self.hub
    }

    /// Pick the provider for a request.
    ///
    /// An endpoint URL always means hf-inference. Otherwise an explicit
    /// provider is used as-is, and `auto` (the default) takes the first
    /// provider in the model's hub mapping.
    pub async fn resolve_provider(
        &self,
        provider: Option<ProviderPolicy>,
        model_id: Option<&str>,
        endpoint_url: Option<&str>,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<InferenceProvider> {
        if endpoint_url.is_some() {
            return match provider {
                Some(ProviderPolicy::Provider(p)) if p != InferenceProvider::HfInference => Err(
                    InferenceError::input("Cannot use endpointUrl with a third-party provider."),
                ),
                _ => Ok(InferenceProvider::HfInference),
            };
        }

        let policy = provider.unwrap_or_else(|| {
            tracing::debug!("No provider given, defaulting to 'auto'");
            ProviderPolicy::Auto
        });
        match policy {
            ProviderPolicy::Provider(p) => Ok(p),
            ProviderPolicy::Auto => {
                let model_id = model_id.ok_or_else(|| {
                    InferenceError::input("Specifying a model is required when provider is 'auto'")
                })?;
                let mapping = self
                    .fetch_inference_provider_mapping_for_model(model_id, access_token, signal)
                    .await?;
                let first = mapping.first_provider().ok_or_else(|| {
                    InferenceError::input(format!(
                        "No Inference Provider available for model {model_id}."
                    ))
                })?;
                tracing::debug!(model = model_id, provider = first, "Auto-selected provider");
                first.parse().map_err(|_| unsupported_provider(first))
            }
        }
    }

    /// Provider mapping for `model_id`, fetched on first use and cached for the
    /// lifetime of the cache.
    pub async fn fetch_inference_provider_mapping_for_model(
        &self,
        model_id: &str,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<Arc<ProviderMapping>> {
        if let Some(mapping) = self.cache.get(model_id) {
            metrics::counter!("hub_mapping.cache", "result" => "hit").increment(1);
            return Ok(mapping);
        }
        metrics::counter!("hub_mapping.cache", "result" => "miss").increment(1);

        let mapping = Arc::new(
            self.hub
                .fetch_model_mapping(model_id, access_token, signal)
                .await?,
        );
        tracing::info!(
            model = model_id,
            providers = mapping.len(),
            "Cached inference provider mapping"
        );
        self.cache.insert(model_id, mapping.clone());
        Ok(mapping)
    }

    /// Mapping entry for one (model, provider, task), or `None` if the
    /// provider does not serve the model.
    ///
    /// A hard-coded override is returned without any network call. A remote
    /// entry must match the requested task; for hf-inference,
    /// feature-extraction and sentence-similarity are interchangeable.
    pub async fn get_inference_provider_mapping(
        &self,
        query: &MappingQuery<'_>,
    ) -> Result<Option<ProviderMappingEntry>> {
        if let Some(entry) = self.overrides.get(query.provider, query.model_id) {
            tracing::debug!(
                model = query.model_id,
                provider = %query.provider,
                "Using hard-coded mapping"
            );
            return Ok(Some(entry.clone()));
        }

        let mapping = self
            .fetch_inference_provider_mapping_for_model(
                query.model_id,
                query.access_token,
                query.signal,
            )
            .await?;
        let Some(entry) = mapping.get(query.provider.as_str()) else {
            return Ok(None);
        };

        if !task_matches(query.provider, query.task, &entry.task) {
            return Err(InferenceError::input(format!(
                "Model {} is not supported for task {} and provider {}. Supported task: {}.",
                query.model_id, query.task, query.provider, entry.task
            )));
        }
        if entry.status == crate::api::MappingStatus::Staging {
            tracing::warn!(
                "Model {} is in staging mode for provider {}. Meant for test purposes only.",
                query.model_id,
                query.provider
            );
        }

        let mut entry = entry.clone();
        entry.hf_model_id = query.model_id.to_string();
        if entry.is_lora() && entry.adapter_weights_path.is_none() {
            let path = self
                .hub
                .fetch_adapter_weights_path(query.model_id, query.signal)
                .await?;
            entry.adapter_weights_path = Some(path);
        }
        Ok(Some(entry))
    }

    /// Full mapping entry used to build a request.
    ///
    /// hf-inference serves hub ids directly. Every other provider needs a task
    /// to look the model up.
    pub async fn resolve_model_entry(
        &self,
        model_id: &str,
        provider: InferenceProvider,
        task: Option<InferenceTask>,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<ProviderMappingEntry> {
        if provider == InferenceProvider::HfInference {
            return Ok(ProviderMappingEntry::identity(model_id, model_id, task));
        }
        let task = task.ok_or_else(|| InferenceError::input(crate::registry::TASK_REQUIRED))?;
        let query = MappingQuery {
            model_id,
            provider,
            task,
            access_token,
            signal,
        };
        self.get_inference_provider_mapping(&query)
            .await?
            .ok_or_else(|| {
                InferenceError::input(format!(
                    "Model {model_id} is not supported by provider {provider}."
                ))
            })
    }

    /// The provider's own id for `model_id`.
    pub async fn get_provider_model_id(
        &self,
        model_id: &str,
        provider: InferenceProvider,
        task: Option<InferenceTask>,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<String> {
        self.resolve_model_entry(model_id, provider, task, access_token, signal)
            .await
            .map(|entry| entry.provider_id)
    }
}

fn task_matches(provider: InferenceProvider, requested: InferenceTask, supported: &str) -> bool {
    if provider == InferenceProvider::HfInference
        && EQUIVALENT_SENTENCE_TRANSFORMERS_TASKS.contains(&requested)
    {
        return EQUIVALENT_SENTENCE_TRANSFORMERS_TASKS
            .iter()
            .any(|task| task.as_str() == supported);
    }
    requested.as_str() == supported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::mock::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    fn resolver(
        transport: Arc<MockTransport>,
        overrides: HardcodedModelMapping,
    ) -> MappingResolver {
        let hub = HubClient::new(
            transport,
            "https://hub.test",
            Arc::new(TtlCache::new(Duration::from_secs(600), 1000)),
        );
        MappingResolver::new(
            Arc::new(hub),
            Arc::new(MappingCache::new()),
            Arc::new(overrides),
        )
    }

    fn two_providers() -> Value {
        json!({"inferenceProviderMapping": {
            "together": {"providerId": "together/m", "status": "live", "task": "conversational"},
            "nebius": {"providerId": "nebius/m", "status": "staging", "task": "conversational"}
        }})
    }

    #[tokio::test]
    async fn auto_picks_first_provider_in_mapping_order() {
        let transport = Arc::new(MockTransport::new().with_json(200, two_providers()));
        let resolver = resolver(transport, HardcodedModelMapping::new());
        let provider = resolver
            .resolve_provider(None, Some("org/model"), None, None, None)
            .await
            .unwrap();
        assert_eq!(provider, InferenceProvider::Together);
    }

    #[tokio::test]
    async fn auto_without_model_is_an_input_error() {
        let transport = Arc::new(MockTransport::new());
        let resolver = resolver(transport.clone(), HardcodedModelMapping::new());
        let err = resolver
            .resolve_provider(Some(ProviderPolicy::Auto), None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Input(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn auto_with_empty_mapping_is_an_input_error() {
        let transport = Arc::new(
            MockTransport::new().with_json(200, json!({"inferenceProviderMapping": {}})),
        );
        let err = resolver(transport, HardcodedModelMapping::new())
            .resolve_provider(None, Some("org/model"), None, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No Inference Provider available for model org/model.");
    }

    #[tokio::test]
    async fn endpoint_url_forces_hf_inference() {
        let transport = Arc::new(MockTransport::new());
        let resolver = resolver(transport, HardcodedModelMapping::new());
        let provider = resolver
            .resolve_provider(None, None, Some("https://my.endpoint"), None, None)
            .await
            .unwrap();
        assert_eq!(provider, InferenceProvider::HfInference);

        let err = resolver
            .resolve_provider(
                Some(InferenceProvider::Together.into()),
                None,
                Some("https://my.endpoint"),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Input(_)));
    }

    #[tokio::test]
    async fn mapping_is_fetched_once_per_model() {
        let transport = Arc::new(MockTransport::new().with_json(200, two_providers()));
        let resolver = resolver(transport.clone(), HardcodedModelMapping::new());
        let first = resolver
            .fetch_inference_provider_mapping_for_model("org/model", None, None)
            .await
            .unwrap();
        let second = resolver
            .fetch_inference_provider_mapping_for_model("org/model", None, None)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn override_wins_without_network_call() {
        let transport = Arc::new(MockTransport::new().with_json(200, two_providers()));
        let overrides = HardcodedModelMapping::new().with(
            InferenceProvider::Together,
            "org/model",
            ProviderMappingEntry::identity(
                "",
                "local/dev-model",
                Some(InferenceTask::Conversational),
            ),
        );
        let resolver = resolver(transport.clone(), overrides);
        let entry = resolver
            .get_inference_provider_mapping(&MappingQuery {
                model_id: "org/model",
                provider: InferenceProvider::Together,
                task: InferenceTask::Conversational,
                access_token: None,
                signal: None,
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.provider_id, "local/dev-model");
        assert_eq!(entry.hf_model_id, "org/model");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn task_mismatch_names_supported_task() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!({"inferenceProviderMapping": {
                "together": {"providerId": "black-forest-labs/FLUX.1-dev", "status": "live", "task": "text-to-image"}
            }}),
        ));
        let err = resolver(transport, HardcodedModelMapping::new())
            .get_provider_model_id(
                "black-forest-labs/Flux.1-dev",
                InferenceProvider::Together,
                Some(InferenceTask::Conversational),
                None,
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Model black-forest-labs/Flux.1-dev is not supported for task conversational and provider together. Supported task: text-to-image."
        );
    }

    #[tokio::test]
    async fn sentence_transformer_tasks_are_equivalent_on_hf_inference() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!({"inferenceProviderMapping": {
                "hf-inference": {"providerId": "org/st", "status": "live", "task": "sentence-similarity"}
            }}),
        ));
        let entry = resolver(transport, HardcodedModelMapping::new())
            .get_inference_provider_mapping(&MappingQuery {
                model_id: "org/st",
                provider: InferenceProvider::HfInference,
                task: InferenceTask::FeatureExtraction,
                access_token: None,
                signal: None,
            })
            .await
            .unwrap();
        assert_eq!(entry.unwrap().task, "sentence-similarity");
    }

    #[tokio::test]
    async fn staging_entries_are_usable() {
        let transport = Arc::new(MockTransport::new().with_json(200, two_providers()));
        let id = resolver(transport, HardcodedModelMapping::new())
            .get_provider_model_id(
                "org/model",
                InferenceProvider::Nebius,
                Some(InferenceTask::Conversational),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(id, "nebius/m");
    }

    #[tokio::test]
    async fn external_provider_requires_task() {
        let transport = Arc::new(MockTransport::new());
        let err = resolver(transport, HardcodedModelMapping::new())
            .get_provider_model_id("org/model", InferenceProvider::FalAi, None, None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("you need to provide a task name"));
    }

    #[tokio::test]
    async fn hf_inference_uses_hub_id_unmodified() {
        let transport = Arc::new(MockTransport::new());
        let id = resolver(transport.clone(), HardcodedModelMapping::new())
            .get_provider_model_id(
                "openai-community/gpt2",
                InferenceProvider::HfInference,
                None,
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(id, "openai-community/gpt2");
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn lora_entry_without_weights_path_reads_model_tree() {
        let transport = Arc::new(
            MockTransport::new()
                .with_json(
                    200,
                    json!({"inferenceProviderMapping": {
                        "fal-ai": {"providerId": "fal-ai/lora", "status": "live", "task": "text-to-image", "adapter": "lora"}
                    }}),
                )
                .with_json(200, json!([{"type": "file", "path": "adapter.safetensors"}])),
        );
        let entry = resolver(transport.clone(), HardcodedModelMapping::new())
            .resolve_model_entry(
                "user/my-lora",
                InferenceProvider::FalAi,
                Some(InferenceTask::TextToImage),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(entry.adapter_weights_path.as_deref(), Some("adapter.safetensors"));
        assert_eq!(
            transport.request(1).url,
            "https://hub.test/api/models/user/my-lora/tree/main"
        );
    }

    #[test]
    fn array_form_mapping_is_accepted() {
        let mapping = ProviderMapping::from_hub_value(&json!([
            {"provider": "groq", "providerId": "llama", "status": "live", "task": "conversational"},
            {"provider": "novita", "providerId": "n", "status": "live", "task": "conversational"}
        ]))
        .unwrap();
        assert_eq!(mapping.providers().collect::<Vec<_>>(), vec!["groq", "novita"]);
    }

    #[test]
    fn malformed_entry_rejects_mapping() {
        assert!(ProviderMapping::from_hub_value(&json!({"groq": {"status": "live"}})).is_none());
        assert!(ProviderMapping::from_hub_value(&json!("nope")).is_none());
    }
}
