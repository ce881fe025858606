//! Shared wiremock fixtures: one server plays both the hub and the router.

#![allow(dead_code)]

use serde_json::{Value, json};
use uni_inference::api::{InferenceProvider, ProviderMappingEntry, RequestArgs};
use uni_inference::client::{InferenceClient, InferenceClientBuilder};
use uni_inference::config::ClientConfig;
use uni_inference::mapping::HardcodedModelMapping;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const HUB_TOKEN: &str = "hf_test_token";

/// Config pointing hub and router at `server`, polling every millisecond.
pub fn config_for(server: &MockServer) -> ClientConfig {
    ClientConfig {
        hub_url: server.uri(),
        router_url: server.uri(),
        poll_interval_ms: 1,
        ..Default::default()
    }
}

pub fn builder_for(server: &MockServer) -> InferenceClientBuilder {
    InferenceClient::builder().config(config_for(server))
}

pub fn client_for(server: &MockServer) -> InferenceClient {
    builder_for(server).build().unwrap()
}

/// Client whose mapping for `(provider, model)` is hard-coded to
/// `provider_id`, so no hub lookup is needed.
pub fn mapped_client(
    server: &MockServer,
    provider: InferenceProvider,
    model: &str,
    provider_id: &str,
    task: uni_inference::api::InferenceTask,
) -> InferenceClient {
    builder_for(server)
        .hardcoded_mapping(HardcodedModelMapping::new().with(
            provider,
            model,
            ProviderMappingEntry::identity(model, provider_id, Some(task)),
        ))
        .build()
        .unwrap()
}

/// Mount the hub's provider mapping for `model`.
pub async fn mount_mapping(server: &MockServer, model: &str, mapping: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/models/{model}")))
        .and(query_param("expand[]", "inferenceProviderMapping"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"inferenceProviderMapping": mapping})),
        )
        .mount(server)
        .await;
}

pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "created": 1700000000,
        "model": "test-model",
        "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4},
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "message": {"role": "assistant", "content": content}
        }]
    })
}

pub fn chat_args(model: &str) -> RequestArgs {
    RequestArgs::new()
        .model(model)
        .access_token(HUB_TOKEN)
        .arg("messages", json!([{"role": "user", "content": "Hello"}]))
}

/// An event-stream body from `data:` payloads.
pub fn sse_body(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect()
}

pub fn sse_response(payloads: &[&str]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(payloads), "text/event-stream")
}
