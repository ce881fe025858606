//! Lookups against the model hub: provider mappings, pipeline tags, default
//! models per task, and repository trees.

use crate::api::{InferenceTask, is_hub_token};
use crate::cache::TtlCache;
use crate::error::{HttpRequestSnapshot, HttpResponseSnapshot, InferenceError, Result};
use crate::mapping::ProviderMapping;
use crate::transport::{Headers, HttpTransport, RequestInit, with_cancellation};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

/// Cached pipeline tag per `{model}:{token}`; `None` when the hub did not
/// report one.
pub type DefaultTaskCache = TtlCache<Option<String>>;

#[derive(Debug, Deserialize)]
struct TaskModels {
    #[serde(default)]
    models: Vec<TaskModel>,
}

#[derive(Debug, Deserialize)]
struct TaskModel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

struct Fetched {
    request: HttpRequestSnapshot,
    status: u16,
    ok: bool,
    request_id: String,
    body: Bytes,
}

impl Fetched {
    fn response_snapshot(&self) -> HttpResponseSnapshot {
        HttpResponseSnapshot {
            request_id: self.request_id.clone(),
            status: self.status,
            body: serde_json::from_slice(&self.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&self.body).into_owned())
            }),
        }
    }

    fn error(&self, message: impl Into<String>) -> InferenceError {
        InferenceError::hub_api(message, self.request.clone(), self.response_snapshot())
    }

    /// `error` field of a JSON error body, if any.
    fn error_detail(&self) -> Option<String> {
        let body: Value = serde_json::from_slice(&self.body).ok()?;
        body.get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Client for the hub's model metadata API.
pub struct HubClient {
    transport: Arc<dyn HttpTransport>,
    hub_url: String,
    task_cache: Arc<DefaultTaskCache>,
    default_models: OnceCell<HashMap<String, String>>,
}

impl HubClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        hub_url: impl Into<String>,
        task_cache: Arc<DefaultTaskCache>,
    ) -> Self {
        Self {
            transport,
            hub_url: hub_url.into(),
            task_cache,
            default_models: OnceCell::new(),
        }
    }

    pub fn hub_url(&self) -> &str {
        &self.hub_url
    }

    async fn get(
        &self,
        url: String,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<Fetched> {
        let mut headers = Headers::new();
        if let Some(token) = access_token.filter(|t| is_hub_token(t)) {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        let request = HttpRequestSnapshot::new(&url, "GET").with_headers(&headers);
        let init = RequestInit::get(headers);

        let response = with_cancellation(signal, self.transport.fetch(&url, &init)).await?;
        let status = response.status();
        let ok = response.ok();
        let request_id = response.request_id();
        let body = with_cancellation(signal, response.bytes()).await?;
        Ok(Fetched {
            request,
            status,
            ok,
            request_id,
            body,
        })
    }

    /// Fetch the provider mapping of `model_id`, preserving the server's
    /// provider order. Uncached; see [`MappingResolver`](crate::mapping::MappingResolver).
    pub async fn fetch_model_mapping(
        &self,
        model_id: &str,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<ProviderMapping> {
        let url = format!(
            "{}/api/models/{}?expand[]=inferenceProviderMapping",
            self.hub_url, model_id
        );
        let fetched = self.get(url, access_token, signal).await?;

        if fetched.status == 404 {
            return Err(fetched.error(format!("Model {model_id} does not exist")));
        }
        if !fetched.ok {
            let message = match fetched.error_detail() {
                Some(detail) => format!(
                    "Failed to fetch inference provider mapping for model {model_id}: {detail}"
                ),
                None => format!("Failed to fetch inference provider mapping for model {model_id}"),
            };
            return Err(fetched.error(message));
        }

        let payload: Value = serde_json::from_slice(&fetched.body).map_err(|_| {
            fetched.error(format!(
                "Failed to fetch inference provider mapping for model {model_id}: malformed API response, invalid JSON"
            ))
        })?;
        payload
            .get("inferenceProviderMapping")
            .and_then(ProviderMapping::from_hub_value)
            .ok_or_else(|| {
                fetched.error(format!(
                    "We have not been able to find inference provider information for model {model_id}."
                ))
            })
    }

    /// Pipeline tag of `model`, cached per model and token.
    ///
    /// Lookup failures are cached as `None`; only cancellation is reported as
    /// an error. URL models have no task.
    pub async fn get_default_task(
        &self,
        model: &str,
        access_token: Option<&str>,
        signal: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        if crate::api::is_url(model) {
            return Ok(None);
        }
        let key = format!("{}:{}", model, access_token.unwrap_or_default());
        if let Some(task) = self.task_cache.get(&key) {
            return Ok(task);
        }

        let url = format!("{}/api/models/{}?expand[]=pipeline_tag", self.hub_url, model);
        let task = match self.get(url, access_token, signal).await {
            Ok(fetched) if fetched.ok => serde_json::from_slice::<Value>(&fetched.body)
                .ok()
                .and_then(|v| v.get("pipeline_tag").and_then(Value::as_str).map(str::to_string)),
            Ok(_) => None,
            Err(InferenceError::Aborted) => return Err(InferenceError::Aborted),
            Err(e) => {
                tracing::debug!(model, error = %e, "Pipeline tag lookup failed");
                None
            }
        };
        self.task_cache.insert(key, task.clone());
        Ok(task)
    }

    /// First recommended model for `task`, from `/api/tasks`. The task table
    /// is fetched once per client.
    pub async fn fetch_default_model(
        &self,
        task: InferenceTask,
        signal: Option<&CancellationToken>,
    ) -> Result<Option<String>> {
        let defaults = self
            .default_models
            .get_or_try_init(|| async {
                let url = format!("{}/api/tasks", self.hub_url);
                let fetched = self.get(url, None, signal).await?;
                if !fetched.ok {
                    return Err(
                        fetched.error("Failed to load tasks definitions from Hugging Face Hub.")
                    );
                }
                let tasks: HashMap<String, TaskModels> = serde_json::from_slice(&fetched.body)
                    .map_err(|_| {
                        fetched.error("Failed to load tasks definitions from Hugging Face Hub.")
                    })?;
                tracing::info!(tasks = tasks.len(), "Loaded default models per task");
                Ok(tasks
                    .into_iter()
                    .filter_map(|(task, entry)| {
                        entry.models.into_iter().next().map(|m| (task, m.id))
                    })
                    .collect())
            })
            .await?;
        Ok(defaults.get(task.as_str()).cloned())
    }

    /// Path of the first `.safetensors` file on the `main` branch of
    /// `model_id`. Used for LoRA adapters without an explicit weights path.
    pub async fn fetch_adapter_weights_path(
        &self,
        model_id: &str,
        signal: Option<&CancellationToken>,
    ) -> Result<String> {
        let url = format!("{}/api/models/{}/tree/main", self.hub_url, model_id);
        let fetched = self.get(url, None, signal).await?;
        if !fetched.ok {
            return Err(fetched.error(format!("Unable to fetch the model tree for {model_id}.")));
        }
        let tree: Vec<TreeEntry> = serde_json::from_slice(&fetched.body)
            .map_err(|_| fetched.error(format!("Unable to fetch the model tree for {model_id}.")))?;
        tree.into_iter()
            .find(|entry| entry.kind == "file" && entry.path.ends_with(".safetensors"))
            .map(|entry| entry.path)
            .ok_or_else(|| {
                fetched.error(format!(
                    "No .safetensors file found in the model tree for {model_id}."
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;
    use std::time::Duration;

    fn hub(transport: Arc<MockTransport>) -> HubClient {
        HubClient::new(
            transport,
            "https://hub.test",
            Arc::new(DefaultTaskCache::new(Duration::from_secs(600), 1000)),
        )
    }

    #[tokio::test]
    async fn mapping_preserves_server_order() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!({"inferenceProviderMapping": {
                "together": {"providerId": "t/m", "status": "live", "task": "conversational"},
                "cerebras": {"providerId": "c/m", "status": "live", "task": "conversational"}
            }}),
        ));
        let mapping = hub(transport.clone())
            .fetch_model_mapping("org/model", Some("hf_abc"), None)
            .await
            .unwrap();
        assert_eq!(mapping.first_provider(), Some("together"));
        assert_eq!(mapping.get("cerebras").unwrap().provider_id, "c/m");

        let request = transport.request(0);
        assert_eq!(
            request.url,
            "https://hub.test/api/models/org/model?expand[]=inferenceProviderMapping"
        );
        assert_eq!(request.headers["Authorization"], "Bearer hf_abc");
    }

    #[tokio::test]
    async fn provider_keys_are_not_sent_to_the_hub() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!({"inferenceProviderMapping": {}}),
        ));
        hub(transport.clone())
            .fetch_model_mapping("org/model", Some("sk-provider"), None)
            .await
            .unwrap();
        assert!(!transport.request(0).headers.contains_key("Authorization"));
    }

    #[tokio::test]
    async fn missing_model_is_a_hub_error() {
        let transport = Arc::new(
            MockTransport::new().with_response(404, "application/json", r#"{"error":"nope"}"#),
        );
        let err = hub(transport)
            .fetch_model_mapping("org/missing", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::HubApi(_)));
        assert_eq!(err.to_string(), "Model org/missing does not exist");
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn malformed_mapping_is_a_hub_error() {
        let transport = Arc::new(MockTransport::new().with_response(200, "text/html", "<html>"));
        let err = hub(transport)
            .fetch_model_mapping("org/model", None, None)
            .await
            .unwrap_err();
        let ctx = err.http_context().unwrap();
        assert!(ctx.message.contains("invalid JSON"));
        assert_eq!(ctx.response.body, json!("<html>"));

        let transport = Arc::new(MockTransport::new().with_json(200, json!({"id": "org/model"})));
        let err = hub(transport)
            .fetch_model_mapping("org/model", None, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "We have not been able to find inference provider information for model org/model."
        );
    }

    #[tokio::test]
    async fn default_task_is_cached_per_model_and_token() {
        let transport = Arc::new(
            MockTransport::new().with_json(200, json!({"pipeline_tag": "sentence-similarity"})),
        );
        let hub = hub(transport.clone());
        for _ in 0..3 {
            let task = hub.get_default_task("org/st", Some("hf_a"), None).await.unwrap();
            assert_eq!(task.as_deref(), Some("sentence-similarity"));
        }
        assert_eq!(transport.call_count(), 1);
        assert_eq!(hub.get_default_task("https://x.test/model", None, None).await.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn default_task_failures_cache_none() {
        let transport = Arc::new(MockTransport::new().with_response(500, "text/plain", "down"));
        let hub = hub(transport.clone());
        assert_eq!(hub.get_default_task("org/m", None, None).await.unwrap(), None);
        assert_eq!(hub.get_default_task("org/m", None, None).await.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn default_model_comes_from_task_table() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!({
                "text-classification": {"models": [{"id": "distilbert/sst2"}, {"id": "other"}]},
                "fill-mask": {"models": []}
            }),
        ));
        let hub = hub(transport.clone());
        assert_eq!(
            hub.fetch_default_model(InferenceTask::TextClassification, None).await.unwrap(),
            Some("distilbert/sst2".to_string())
        );
        assert_eq!(hub.fetch_default_model(InferenceTask::FillMask, None).await.unwrap(), None);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn adapter_weights_path_is_first_safetensors_file() {
        let transport = Arc::new(MockTransport::new().with_json(
            200,
            json!([
                {"type": "directory", "path": "x.safetensors"},
                {"type": "file", "path": "README.md"},
                {"type": "file", "path": "pytorch_lora_weights.safetensors"}
            ]),
        ));
        let path = hub(transport)
            .fetch_adapter_weights_path("org/lora", None)
            .await
            .unwrap();
        assert_eq!(path, "pytorch_lora_weights.safetensors");
    }

    #[tokio::test]
    async fn adapter_without_weights_is_a_hub_error() {
        let transport = Arc::new(
            MockTransport::new().with_json(200, json!([{"type": "file", "path": "README.md"}])),
        );
        let err = hub(transport)
            .fetch_adapter_weights_path("org/lora", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No .safetensors file found in the model tree for org/lora."
        );
    }
}
