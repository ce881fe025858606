//! Provider helper implementations, one module per inference provider.
//!
//! Each module exposes its provider's base URL as a constant and registers
//! its helpers through a crate-private `helpers()` function collected by
//! [`ProviderRegistry`](crate::registry::ProviderRegistry).
//!
//! ## OpenAI-compatible providers
//!
//! | Module | Provider | Tasks |
//! |--------|----------|-------|
//! | `cerebras` | Cerebras | conversational |
//! | `cohere` | Cohere | conversational |
//! | `featherless_ai` | Featherless AI | conversational, text-generation |
//! | `fireworks_ai` | Fireworks AI | conversational |
//! | `groq` | Groq | conversational, text-generation |
//! | `hyperbolic` | Hyperbolic | conversational, text-generation, text-to-image |
//! | `nebius` | Nebius AI Studio | conversational, text-generation, text-to-image, feature-extraction |
//! | `novita` | Novita | conversational, text-generation |
//! | `nscale` | Nscale | conversational, text-to-image |
//! | `openai` | OpenAI (client-side routing only) | conversational |
//! | `ovhcloud` | OVHcloud AI Endpoints | conversational, text-generation |
//! | `sambanova` | SambaNova | conversational, feature-extraction |
//! | `together` | Together AI | conversational, text-generation, text-to-image |
//!
//! ## Providers with their own contracts
//!
//! | Module | Provider | Notes |
//! |--------|----------|-------|
//! | `black_forest_labs` | Black Forest Labs | async job, `polling_url` |
//! | `fal_ai` | fal.ai | queue jobs for video, JSON-embedded audio for transcription |
//! | `hf_inference` | Hugging Face serverless | router only, every hub pipeline task |
//! | `replicate` | Replicate | predictions API with `Prefer: wait` |
//! | `wavespeed` | WaveSpeed AI | async job |
//! | `zai_org` | Z.ai | async image job |

pub mod black_forest_labs;
pub mod cerebras;
pub mod cohere;
pub mod fal_ai;
pub mod featherless_ai;
pub mod fireworks_ai;
pub mod groq;
pub mod hf_inference;
pub mod hyperbolic;
pub mod nebius;
pub mod novita;
pub mod nscale;
pub mod openai;
pub mod ovhcloud;
pub mod replicate;
pub mod sambanova;
pub mod together;
pub mod wavespeed;
pub mod zai_org;

pub use black_forest_labs::BlackForestLabsTextToImageTask;
pub use fal_ai::{FalAiTask, FalAiTextToVideoTask};
pub use hf_inference::HfInferenceTask;
pub use hyperbolic::HyperbolicTextToImageTask;
pub use nebius::NebiusConversationalTask;
pub use replicate::ReplicateTask;
pub use together::TogetherConversationalTask;
pub use wavespeed::WavespeedTask;
pub use zai_org::{ZaiConversationalTask, ZaiTextToImageTask};
