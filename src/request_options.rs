//! Request builder: turns [`RequestArgs`] into a provider-specific URL and
//! [`RequestInit`].

use crate::api::{
    AuthMethod, InferenceProvider, InferenceTask, Options, ProviderMappingEntry, RequestArgs,
    is_hub_token, is_url,
};
use crate::config::ClientConfig;
use crate::error::{InferenceError, Result};
use crate::helper::{BodyParams, HeaderParams, ProviderHelper, UrlParams};
use crate::mapping::{EQUIVALENT_SENTENCE_TRANSFORMERS_TASKS, MappingResolver};
use crate::transport::{Credentials, Method, RequestInit};
use std::sync::Arc;

/// A fully prepared request.
#[derive(Debug, Clone)]
pub struct ResolvedRequest {
    pub url: String,
    pub init: RequestInit,
}

/// Model resolution result handed to
/// [`make_request_options_from_resolved_model`](RequestBuilder::make_request_options_from_resolved_model).
#[derive(Debug, Clone, Default)]
pub struct ResolvedModel {
    /// Provider-side model id.
    pub model: String,
    pub mapping: Option<ProviderMappingEntry>,
    /// hf-inference pipeline to run the model under, when it differs from the
    /// model's default one.
    pub pipeline_task: Option<InferenceTask>,
}

impl ResolvedModel {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Endpoint URLs go in `endpoint_url`, never in `model`.
pub fn reject_model_url(args: &RequestArgs) -> Result<()> {
    if args.model.as_deref().is_some_and(is_url) {
        return Err(InferenceError::input(
            "Model URLs are no longer supported. Use endpointUrl instead.",
        ));
    }
    Ok(())
}

/// Auth method for a request. Client-side routed providers only accept their
/// own keys; otherwise a hub token, a provider key, cookies, or nothing, in
/// that order.
pub fn auth_method(
    helper: &dyn ProviderHelper,
    access_token: Option<&str>,
    include_credentials: bool,
) -> Result<AuthMethod> {
    if helper.client_side_routing_only() {
        if access_token.is_some_and(is_hub_token) {
            return Err(InferenceError::input(format!(
                "Provider {} is closed-source and does not support HF tokens.",
                helper.provider()
            )));
        }
        return Ok(AuthMethod::ProviderKey);
    }
    Ok(match access_token {
        Some(token) if is_hub_token(token) => AuthMethod::HfToken,
        Some(_) => AuthMethod::ProviderKey,
        None if include_credentials => AuthMethod::CredentialsInclude,
        None => AuthMethod::None,
    })
}

/// Builds [`ResolvedRequest`]s. Cheap to clone.
#[derive(Clone)]
pub struct RequestBuilder {
    config: Arc<ClientConfig>,
    resolver: Arc<MappingResolver>,
}

impl RequestBuilder {
    pub fn new(config: Arc<ClientConfig>, resolver: Arc<MappingResolver>) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    /// Token for a request: its own, else the client's.
    pub fn access_token<'a>(&'a self, args: &'a RequestArgs) -> Option<&'a str> {
        args.access_token
            .as_deref()
            .or(self.config.access_token.as_deref())
    }

    /// Validate `args`, resolve the model, and build the request.
    ///
    /// Every input check runs before any network call.
    pub async fn make_request_options(
        &self,
        args: &RequestArgs,
        helper: &dyn ProviderHelper,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<ResolvedRequest> {
        let provider = helper.provider();
        let signal = options.signal.as_ref();
        let access_token = self.access_token(args);

        if args.endpoint_url.is_some() && provider != InferenceProvider::HfInference {
            return Err(InferenceError::input(
                "Cannot use endpointUrl with a third-party provider.",
            ));
        }
        reject_model_url(args)?;

        if let Some(endpoint) = args.endpoint_url.as_deref() {
            let model = args.model.as_deref().unwrap_or(endpoint);
            return self.make_request_options_from_resolved_model(
                &ResolvedModel::new(model),
                helper,
                args,
                task,
                options,
            );
        }

        if helper.client_side_routing_only() && args.model.is_none() {
            return Err(InferenceError::input(format!(
                "Provider {provider} requires a model ID to be passed directly."
            )));
        }

        let model = match args.model.clone() {
            Some(model) => model,
            None => {
                let task = task.ok_or_else(|| {
                    InferenceError::input("No model provided, and no task has been specified.")
                })?;
                self.resolver
                    .hub()
                    .fetch_default_model(task, signal)
                    .await?
                    .ok_or_else(|| {
                        InferenceError::input(format!(
                            "No default model defined for task {task}, please define the model explicitly."
                        ))
                    })?
            }
        };

        let resolved = if helper.client_side_routing_only() {
            let prefix = format!("{provider}/");
            let provider_model = model.strip_prefix(&prefix).ok_or_else(|| {
                InferenceError::input(format!(
                    "Models from {provider} must be prefixed by \"{prefix}\". Got \"{model}\"."
                ))
            })?;
            ResolvedModel::new(provider_model)
        } else {
            let entry = self
                .resolver
                .resolve_model_entry(&model, provider, task, access_token, signal)
                .await?;
            let pipeline_task = self
                .pipeline_task(&model, provider, task, access_token, options)
                .await?;
            ResolvedModel {
                model: entry.provider_id.clone(),
                mapping: Some(entry),
                pipeline_task,
            }
        };
        self.make_request_options_from_resolved_model(&resolved, helper, args, task, options)
    }

    /// hf-inference runs sentence-transformers models under either
    /// feature-extraction or sentence-similarity. When the requested one is
    /// not the model's default, it has to be named in the route.
    async fn pipeline_task(
        &self,
        model: &str,
        provider: InferenceProvider,
        task: Option<InferenceTask>,
        access_token: Option<&str>,
        options: &Options,
    ) -> Result<Option<InferenceTask>> {
        let Some(task) = task.filter(|t| {
            provider == InferenceProvider::HfInference
                && EQUIVALENT_SENTENCE_TRANSFORMERS_TASKS.contains(t)
        }) else {
            return Ok(None);
        };
        let default = self
            .resolver
            .hub()
            .get_default_task(model, access_token, options.signal.as_ref())
            .await?;
        Ok(default
            .filter(|default| default != task.as_str())
            .map(|_| task))
    }

    /// Build the request for an already-resolved model. Performs no I/O.
    pub fn make_request_options_from_resolved_model(
        &self,
        resolved: &ResolvedModel,
        helper: &dyn ProviderHelper,
        args: &RequestArgs,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<ResolvedRequest> {
        let access_token = self.access_token(args);
        let auth_method = auth_method(helper, access_token, options.include_credentials)?;

        let url_model = args.endpoint_url.as_deref().unwrap_or(&resolved.model);
        let url = helper.make_url(&UrlParams {
            auth_method,
            model: url_model,
            task,
            router_url: &self.config.router_url,
            pipeline_task: resolved.pipeline_task,
        });

        let is_binary = args.is_binary();
        let mut headers = helper.prepare_headers(
            &HeaderParams {
                access_token,
                auth_method,
            },
            is_binary,
        );
        if let Some(bill_to) = options.bill_to.as_deref() {
            headers.insert("X-HF-Bill-To".to_string(), bill_to.to_string());
        }
        headers.insert("User-Agent".to_string(), self.config.user_agent.clone());

        let body = helper.make_body(&BodyParams {
            args: &args.body,
            model: &resolved.model,
            mapping: resolved.mapping.as_ref(),
            task,
            hub_url: &self.config.hub_url,
        })?;

        tracing::debug!(
            provider = %helper.provider(),
            auth = %auth_method,
            url = %url,
            "Built inference request"
        );
        Ok(ResolvedRequest {
            url,
            init: RequestInit {
                method: Method::Post,
                headers,
                body: Some(body),
                credentials: options.include_credentials.then_some(Credentials::Include),
                signal: options.signal.clone(),
            },
        })
    }
}
