//! Public API types: providers, tasks, request arguments and options.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// A third-party or first-party backend that executes inference over HTTP.
///
/// The string form (`"fal-ai"`, `"hf-inference"`, ...) is the identifier used
/// by the hub's provider mapping and by the router URL.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InferenceProvider {
    BlackForestLabs,
    Cerebras,
    Cohere,
    FalAi,
    FeatherlessAi,
    FireworksAi,
    Groq,
    HfInference,
    Hyperbolic,
    Nebius,
    Novita,
    Nscale,
    Openai,
    Ovhcloud,
    Replicate,
    Sambanova,
    Together,
    Wavespeed,
    ZaiOrg,
}

impl InferenceProvider {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Provider selection requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderPolicy {
    /// Use the first provider listed in the model's hub mapping.
    #[default]
    Auto,
    Provider(InferenceProvider),
}

impl From<InferenceProvider> for ProviderPolicy {
    fn from(provider: InferenceProvider) -> Self {
        Self::Provider(provider)
    }
}

impl std::str::FromStr for ProviderPolicy {
    type Err = crate::error::InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(Self::Auto);
        }
        s.parse::<InferenceProvider>()
            .map(Self::Provider)
            .map_err(|_| crate::registry::unsupported_provider(s))
    }
}

/// Category of ML task. Selects the provider helper and the output shape.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InferenceTask {
    Conversational,
    TextGeneration,
    TextClassification,
    TokenClassification,
    FillMask,
    Summarization,
    Translation,
    QuestionAnswering,
    ZeroShotClassification,
    FeatureExtraction,
    SentenceSimilarity,
    TableQuestionAnswering,
    TextToImage,
    TextToVideo,
    TextToSpeech,
    TextToAudio,
    ImageClassification,
    ZeroShotImageClassification,
    ImageSegmentation,
    ObjectDetection,
    ImageToText,
    ImageToImage,
    DocumentQuestionAnswering,
    VisualQuestionAnswering,
    AudioClassification,
    AudioToAudio,
    AutomaticSpeechRecognition,
    TabularClassification,
    TabularRegression,
}

impl InferenceTask {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Task-appropriate payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON arguments: `inputs`, `prompt`, `messages`, `parameters`, and any
    /// provider-specific extras, merged into the provider payload.
    Json(Map<String, Value>),
    /// Raw binary upload (audio, image), sent as-is unless the provider
    /// requires it embedded in JSON.
    Binary {
        data: Bytes,
        content_type: Option<String>,
    },
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::Json(Map::new())
    }
}

/// Uniform request arguments shared by every task.
///
/// `endpoint_url` and a provider other than `hf-inference` are mutually
/// exclusive, and `model` must be a hub id (or provider-prefixed id for
/// client-side routed providers), never a URL.
#[derive(Debug, Clone, Default)]
pub struct RequestArgs {
    pub access_token: Option<String>,
    pub model: Option<String>,
    pub endpoint_url: Option<String>,
    /// `None` behaves like [`ProviderPolicy::Auto`].
    pub provider: Option<ProviderPolicy>,
    pub body: RequestBody,
}

impl RequestArgs {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: impl Into<ProviderPolicy>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    #[must_use]
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Set a top-level JSON argument. Switches a binary body back to JSON.
    #[must_use]
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !matches!(self.body, RequestBody::Json(_)) {
            self.body = RequestBody::default();
        }
        if let RequestBody::Json(map) = &mut self.body {
            map.insert(key.into(), value.into());
        }
        self
    }

    #[must_use]
    pub fn inputs(self, inputs: impl Into<Value>) -> Self {
        self.arg("inputs", inputs)
    }

    /// Set one field of an object-valued `inputs`, replacing any non-object
    /// `inputs` already set.
    #[must_use]
    pub fn input_field(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut inputs = match self.json_arg("inputs") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        inputs.insert(key.into(), value.into());
        self.arg("inputs", Value::Object(inputs))
    }

    /// Image embedded as base64 in `inputs.image`, for the image tasks that
    /// take a JSON body (visual and document question answering, zero-shot
    /// image classification).
    #[must_use]
    pub fn image(self, image: impl AsRef<[u8]>) -> Self {
        self.input_field("image", BASE64.encode(image))
    }

    #[must_use]
    pub fn question(self, question: impl Into<String>) -> Self {
        self.input_field("question", question.into())
    }

    /// Binary media sent as base64 text in `inputs`, so that `parameters`
    /// can travel alongside it.
    #[must_use]
    pub fn encoded_inputs(self, data: impl AsRef<[u8]>) -> Self {
        self.arg("inputs", BASE64.encode(data))
    }

    #[must_use]
    pub fn parameters(self, parameters: Map<String, Value>) -> Self {
        self.arg("parameters", Value::Object(parameters))
    }

    #[must_use]
    pub fn json(mut self, args: Map<String, Value>) -> Self {
        self.body = RequestBody::Json(args);
        self
    }

    #[must_use]
    pub fn data(mut self, data: impl Into<Bytes>, content_type: Option<String>) -> Self {
        self.body = RequestBody::Binary {
            data: data.into(),
            content_type,
        };
        self
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.body, RequestBody::Binary { .. })
    }

    fn json_arg(&self, key: &str) -> Option<&Value> {
        match &self.body {
            RequestBody::Json(map) => map.get(key),
            RequestBody::Binary { .. } => None,
        }
    }
}

/// Representation requested for media outputs (images, audio, video).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputType {
    /// Download the media and return its bytes.
    #[default]
    Blob,
    /// Return the provider-hosted URL without downloading.
    Url,
    /// Download and return a `data:<mime>;base64,...` URL.
    DataUrl,
    /// Return the provider's final JSON document.
    Json,
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Retry once on HTTP 503. Defaults to `true`.
    pub retry_on_error: Option<bool>,
    /// Send cookies with the request, and authenticate with them when no token
    /// is given.
    pub include_credentials: bool,
    /// Organisation to bill, sent as `X-HF-Bill-To`.
    pub bill_to: Option<String>,
    pub output_type: Option<OutputType>,
    /// Aborts every network call and poll delay when cancelled.
    pub signal: Option<CancellationToken>,
}

impl Options {
    pub fn retry_on_error(&self) -> bool {
        self.retry_on_error.unwrap_or(true)
    }
}

/// Whether `token` was issued by the hub (`hf_` prefix).
///
/// Hub tokens go through the router; anything else is taken to be a
/// provider's own API key. Every token-format check goes through here.
pub fn is_hub_token(token: &str) -> bool {
    token.starts_with("hf_")
}

/// Whether `model` is an endpoint URL or absolute path rather than a model id.
pub fn is_url(model: &str) -> bool {
    model.starts_with("http:") || model.starts_with("https:") || model.starts_with('/')
}

/// How the request authenticates. Derived per request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AuthMethod {
    /// Hub token, request goes through the router.
    HfToken,
    /// Provider's own API key, request goes straight to the provider.
    ProviderKey,
    /// Cookie authentication.
    CredentialsInclude,
    None,
}

/// Lifecycle of a provider mapping entry on the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    #[default]
    Live,
    Staging,
}

/// How one provider serves one hub model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMappingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_weights_path: Option<String>,
    /// Filled in by the resolver; absent from the hub payload.
    #[serde(default)]
    pub hf_model_id: String,
    /// The provider's own model id.
    pub provider_id: String,
    #[serde(default)]
    pub status: MappingStatus,
    /// Task string as reported by the hub. May name tasks this crate has no
    /// helper for.
    pub task: String,
}

impl ProviderMappingEntry {
    /// Entry for a model used under its own id (hf-inference, client-side
    /// routing, endpoint URLs).
    pub fn identity(
        hf_model_id: impl Into<String>,
        provider_id: impl Into<String>,
        task: Option<InferenceTask>,
    ) -> Self {
        Self {
            adapter: None,
            adapter_weights_path: None,
            hf_model_id: hf_model_id.into(),
            provider_id: provider_id.into(),
            status: MappingStatus::Live,
            task: task.map(|t| t.as_str().to_string()).unwrap_or_default(),
        }
    }

    pub fn is_lora(&self) -> bool {
        self.adapter.as_deref() == Some("lora")
    }
}
