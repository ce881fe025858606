//! Black Forest Labs (FLUX): text-to-image via a submit-and-poll API.
//!
//! The submission reply carries a `polling_url`; the job is polled until it
//! reports `Ready` and the image is read from `result.sample`.

use crate::api::{AuthMethod, InferenceProvider, InferenceTask};
use crate::error::{InferenceError, Result};
use crate::helper::{
    BodyParams, HeaderParams, InferenceOutput, ProviderHelper, ProviderResponse, ResponseContext,
    UrlParams, default_headers, expect_json, flatten_args, required_str,
};
use crate::transport::Headers;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const BLACK_FOREST_LABS_API_BASE_URL: &str = "https://api.us1.bfl.ai";

/// Statuses after which polling stops with an error.
const FAILED_STATUSES: [&str; 5] = [
    "Error",
    "Failed",
    "Request Moderated",
    "Content Moderated",
    "Task not found",
];

fn malformed(payload: &Value) -> InferenceError {
    InferenceError::provider_output(format!(
        "Received malformed response from Black Forest Labs text-to-image API: {payload}"
    ))
}

pub struct BlackForestLabsTextToImageTask;

#[async_trait]
impl ProviderHelper for BlackForestLabsTextToImageTask {
    fn provider(&self) -> InferenceProvider {
        InferenceProvider::BlackForestLabs
    }

    fn base_url(&self) -> &str {
        BLACK_FOREST_LABS_API_BASE_URL
    }

    fn make_route(&self, params: &UrlParams<'_>) -> String {
        format!("/v1/{}", params.model)
    }

    fn prepare_headers(&self, params: &HeaderParams<'_>, is_binary: bool) -> Headers {
        if params.auth_method != AuthMethod::ProviderKey {
            return default_headers(params, is_binary);
        }
        let mut headers = default_headers(
            &HeaderParams {
                access_token: None,
                auth_method: AuthMethod::None,
            },
            is_binary,
        );
        if let Some(token) = params.credential() {
            headers.insert("X-Key".to_string(), token.to_string());
        }
        headers
    }

    fn prepare_payload(&self, params: &BodyParams<'_>) -> Result<Value> {
        Ok(Value::Object(flatten_args(&params.json_args(), "prompt")))
    }

    async fn get_response(
        &self,
        response: ProviderResponse,
        ctx: &ResponseContext<'_>,
    ) -> Result<InferenceOutput> {
        let submitted = expect_json(response, "{ polling_url: string }")?;
        let polling_url = required_str(&submitted, "/polling_url", "{ polling_url: string }")?
            .to_string();

        loop {
            ctx.wait().await?;
            let payload = ctx
                .get_json(&polling_url, "Failed to fetch result from black forest labs API")
                .await?;
            let Some(status) = payload.get("status").and_then(Value::as_str) else {
                return Err(malformed(&payload));
            };
            if status == "Ready" {
                let sample = payload
                    .pointer("/result/sample")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed(&payload))?
                    .to_string();
                return ctx.media_output(&sample, payload).await;
            }
            if FAILED_STATUSES.contains(&status) {
                return Err(InferenceError::provider_output(format!(
                    "Black Forest Labs text-to-image job ended with status {status}"
                )));
            }
            tracing::debug!(status, "Black Forest Labs job not ready");
        }
    }
}

pub(crate) fn helpers() -> Vec<(InferenceTask, Arc<dyn ProviderHelper>)> {
    vec![(
        InferenceTask::TextToImage,
        Arc::new(BlackForestLabsTextToImageTask),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OutputType;
    use crate::helper::test_support::{context, url_params};
    use crate::mock::MockTransport;
    use serde_json::json;

    #[test]
    fn provider_key_uses_x_key_header() {
        let direct = BlackForestLabsTextToImageTask.prepare_headers(
            &HeaderParams {
                access_token: Some("bfl-key"),
                auth_method: AuthMethod::ProviderKey,
            },
            false,
        );
        assert_eq!(direct["X-Key"], "bfl-key");
        assert!(!direct.contains_key("Authorization"));

        let routed = BlackForestLabsTextToImageTask.prepare_headers(
            &HeaderParams {
                access_token: Some("hf_x"),
                auth_method: AuthMethod::HfToken,
            },
            false,
        );
        assert_eq!(routed["Authorization"], "Bearer hf_x");
        assert_eq!(routed["Content-Type"], "application/json");
    }

    #[test]
    fn route_embeds_model() {
        let params = url_params(AuthMethod::ProviderKey, "flux-dev", InferenceTask::TextToImage);
        assert_eq!(
            BlackForestLabsTextToImageTask.make_url(&params),
            "https://api.us1.bfl.ai/v1/flux-dev"
        );
    }

    #[tokio::test]
    async fn polls_until_ready() {
        let headers = Headers::new();
        let transport = MockTransport::new()
            .with_json(200, json!({"status": "Pending"}))
            .with_json(
                200,
                json!({"status": "Ready", "result": {"sample": "https://cdn.test/s.jpg"}}),
            );
        let ctx =
            context("https://api.us1.bfl.ai/v1/flux-dev", &headers, &transport, OutputType::Url);
        let out = BlackForestLabsTextToImageTask
            .get_response(
                ProviderResponse::Json(json!({
                    "id": "1",
                    "polling_url": "https://api.us1.bfl.ai/v1/get_result?id=1"
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out, InferenceOutput::Text("https://cdn.test/s.jpg".into()));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(
            transport.request(1).url,
            "https://api.us1.bfl.ai/v1/get_result?id=1"
        );
    }

    #[tokio::test]
    async fn poll_payload_without_status_is_malformed() {
        let headers = Headers::new();
        let transport = MockTransport::new()
            .with_json(200, json!({"unexpected": true}))
            .with_json(
                200,
                json!({"status": "Ready", "result": {"sample": "https://cdn.test/s.jpg"}}),
            );
        let ctx = context(
            "https://api.us1.bfl.ai/v1/flux-dev",
            &headers,
            &transport,
            OutputType::Url,
        );
        let err = BlackForestLabsTextToImageTask
            .get_response(
                ProviderResponse::Json(
                    json!({"polling_url": "https://api.us1.bfl.ai/v1/get_result?id=1"}),
                ),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ProviderOutput(_)));
        assert!(
            err.to_string()
                .starts_with("Received malformed response from Black Forest Labs")
        );
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn non_string_status_is_malformed() {
        let headers = Headers::new();
        let transport = MockTransport::new().with_json(200, json!({"status": 3}));
        let ctx = context(
            "https://api.us1.bfl.ai/v1/flux-dev",
            &headers,
            &transport,
            OutputType::Url,
        );
        let err = BlackForestLabsTextToImageTask
            .get_response(
                ProviderResponse::Json(
                    json!({"polling_url": "https://api.us1.bfl.ai/v1/get_result?id=1"}),
                ),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ProviderOutput(_)));
    }

    #[test]
    fn cookie_auth_sends_no_credentials() {
        let headers = BlackForestLabsTextToImageTask.prepare_headers(
            &HeaderParams {
                access_token: None,
                auth_method: AuthMethod::CredentialsInclude,
            },
            false,
        );
        assert!(!headers.contains_key("Authorization"));
        assert!(!headers.contains_key("X-Key"));
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[tokio::test]
    async fn moderated_job_is_an_error() {
        let headers = Headers::new();
        let transport = MockTransport::new().with_json(200, json!({"status": "Content Moderated"}));
        let ctx =
            context("https://api.us1.bfl.ai/v1/flux-dev", &headers, &transport, OutputType::Blob);
        let err = BlackForestLabsTextToImageTask
            .get_response(
                ProviderResponse::Json(
                    json!({"polling_url": "https://api.us1.bfl.ai/v1/get_result?id=1"}),
                ),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Content Moderated"));
    }
}
