//! [`InferenceClient`]: the entry point tying provider resolution, request
//! building, and execution together.

use crate::api::{InferenceProvider, InferenceTask, Options, RequestArgs};
use crate::cache::{MappingCache, TtlCache};
use crate::config::ClientConfig;
use crate::error::{InferenceError, Result};
use crate::helper::{InferenceOutput, ProviderHelper};
use crate::hub::HubClient;
use crate::mapping::{HardcodedModelMapping, MappingResolver};
use crate::registry::ProviderRegistry;
use crate::request::{EventStream, RequestExecutor};
use crate::request_options::{RequestBuilder, ResolvedRequest, reject_model_url};
use crate::transport::HttpTransport;
use serde_json::Value;
use std::sync::Arc;

/// Client for hosted inference providers.
///
/// Cheap to clone; clones share the transport and both caches. Build one per
/// application with [`InferenceClient::builder`].
#[derive(Clone)]
pub struct InferenceClient {
    registry: Arc<ProviderRegistry>,
    resolver: Arc<MappingResolver>,
    executor: RequestExecutor,
}

impl InferenceClient {
    pub fn builder() -> InferenceClientBuilder {
        InferenceClientBuilder::default()
    }

    /// Client configured from `HF_ENDPOINT`, `HF_ROUTER_URL`, and `HF_TOKEN`,
    /// using the `reqwest` transport.
    #[cfg(feature = "reqwest-transport")]
    pub fn from_env() -> Result<Self> {
        Self::builder().config(ClientConfig::from_env()).build()
    }

    pub fn config(&self) -> &ClientConfig {
        self.executor.builder().config()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &MappingResolver {
        &self.resolver
    }

    /// Resolve the provider for `args` and return its helper for `task`.
    pub async fn provider_helper(
        &self,
        args: &RequestArgs,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<(InferenceProvider, Arc<dyn ProviderHelper>)> {
        reject_model_url(args)?;
        let provider = self
            .resolver
            .resolve_provider(
                args.provider,
                args.model.as_deref(),
                args.endpoint_url.as_deref(),
                self.executor.builder().access_token(args),
                options.signal.as_ref(),
            )
            .await?;
        let helper = self.registry.get_provider_helper(provider, task)?;
        Ok((provider, helper))
    }

    /// Build the request `request` would send, without sending it.
    pub async fn make_request_options(
        &self,
        args: &RequestArgs,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<ResolvedRequest> {
        let (_, helper) = self.provider_helper(args, task, options).await?;
        self.executor
            .builder()
            .make_request_options(args, helper.as_ref(), task, options)
            .await
    }

    /// Run inference and return the provider's normalized output.
    #[tracing::instrument(skip_all, fields(model = ?args.model, task = ?task))]
    pub async fn request(
        &self,
        args: &RequestArgs,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<InferenceOutput> {
        let (provider, helper) = self.provider_helper(args, task, options).await?;
        tracing::debug!(%provider, "Dispatching request");
        self.executor
            .request(args, helper.as_ref(), task, options)
            .await
    }

    /// Run inference and return the decoded server-sent events as JSON.
    ///
    /// The caller is responsible for asking the provider to stream (usually
    /// `"stream": true` in the arguments).
    #[tracing::instrument(skip_all, fields(model = ?args.model, task = ?task))]
    pub async fn streaming_request(
        &self,
        args: &RequestArgs,
        task: Option<InferenceTask>,
        options: &Options,
    ) -> Result<EventStream<Value>> {
        let (provider, helper) = self.provider_helper(args, task, options).await?;
        tracing::debug!(%provider, "Dispatching streaming request");
        self.executor
            .inner_streaming_request(args, helper.as_ref(), task, options)
            .await
    }
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("config", self.config())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`InferenceClient`].
///
/// ```rust,no_run
/// # use uni_inference::client::InferenceClient;
/// # use uni_inference::config::ClientConfig;
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = InferenceClient::builder()
///     .config(ClientConfig::from_env())
///     .access_token("hf_...")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct InferenceClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    registry: Option<ProviderRegistry>,
    overrides: HardcodedModelMapping,
    mapping_cache: Option<Arc<MappingCache>>,
}

impl InferenceClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a JSON document.
    pub fn config_from_str(mut self, s: &str) -> Result<Self> {
        self.config = ClientConfig::from_json_str(s)?;
        Ok(self)
    }

    /// Token used by requests that do not carry their own.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    /// Replace the outbound HTTP function, e.g. for proxying or tests.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the provider registry. Defaults to
    /// [`ProviderRegistry::builtin`].
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add or replace the helper serving `task` for the helper's provider.
    pub fn register_helper(mut self, task: InferenceTask, helper: Arc<dyn ProviderHelper>) -> Self {
        let registry = self.registry.take().unwrap_or_default();
        self.registry = Some(registry.register(task, helper));
        self
    }

    /// Mapping entries that win over the hub's, for trying models that are
    /// not registered yet.
    pub fn hardcoded_mapping(mut self, overrides: HardcodedModelMapping) -> Self {
        self.overrides = overrides;
        self
    }

    /// Share a mapping cache between clients.
    pub fn mapping_cache(mut self, cache: Arc<MappingCache>) -> Self {
        self.mapping_cache = Some(cache);
        self
    }

    /// Validate the configuration and construct the client.
    ///
    /// Without an explicit transport the `reqwest` transport is used; when
    /// that feature is disabled a transport is required.
    pub fn build(self) -> Result<InferenceClient> {
        self.config.validate()?;
        let config = Arc::new(self.config.normalized());
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };

        let task_cache = Arc::new(TtlCache::new(
            config.default_task_ttl(),
            config.default_task_capacity,
        ));
        let hub = Arc::new(HubClient::new(
            transport.clone(),
            config.hub_url.clone(),
            task_cache,
        ));
        let resolver = Arc::new(MappingResolver::new(
            hub,
            self.mapping_cache.unwrap_or_default(),
            Arc::new(self.overrides),
        ));
        let registry = Arc::new(self.registry.unwrap_or_default());
        tracing::debug!(
            hub_url = %config.hub_url,
            router_url = %config.router_url,
            "Built inference client"
        );

        Ok(InferenceClient {
            registry,
            executor: RequestExecutor::new(
                transport,
                RequestBuilder::new(config, resolver.clone()),
            ),
            resolver,
        })
    }
}

#[cfg(feature = "reqwest-transport")]
fn default_transport() -> Result<Arc<dyn HttpTransport>> {
    Ok(Arc::new(crate::transport::ReqwestTransport::new()))
}

#[cfg(not(feature = "reqwest-transport"))]
fn default_transport() -> Result<Arc<dyn HttpTransport>> {
    Err(InferenceError::Config(
        "No HTTP transport configured; enable `reqwest-transport` or call transport()".to_string(),
    ))
}
