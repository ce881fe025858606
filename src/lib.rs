//! Client library routing inference requests to hosted model providers.
//!
//! Uni-Inference exposes one request shape for many inference backends
//! (hf-inference, Together, fal.ai, Replicate, Groq, and others) and
//! normalizes each provider's reply into a stable output per task.
//!
//! # Key concepts
//!
//! - **[`InferenceClient`](client::InferenceClient)**: owns the HTTP
//!   transport, the provider registry, and the mapping caches.
//! - **Providers and tasks**: every supported `(provider, task)` pair has a
//!   [`ProviderHelper`](helper::ProviderHelper) that builds the URL, headers,
//!   and body and normalizes the response, polling asynchronous jobs where the
//!   provider runs one.
//! - **Mapping**: hub model ids are translated to provider model ids through
//!   the hub's provider mapping, fetched once per model and cached. With no
//!   provider given, the first provider in the mapping is used.
//! - **Task wrappers**: [`chat_completion`](client::InferenceClient::chat_completion),
//!   [`text_to_image`](client::InferenceClient::text_to_image), and friends
//!   decode outputs into typed structs from [`tasks`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use uni_inference::api::{Options, RequestArgs};
//! use uni_inference::client::InferenceClient;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = InferenceClient::from_env()?;
//!
//! let args = RequestArgs::new()
//!     .model("meta-llama/Llama-3.1-8B-Instruct")
//!     .provider("together".parse::<uni_inference::api::ProviderPolicy>()?)
//!     .arg("messages", json!([{"role": "user", "content": "Hello!"}]));
//! let reply = client.chat_completion(&args, &Options::default()).await?;
//! println!("{:?}", reply.choices[0].message.content);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod helper;
pub mod hub;
pub mod mapping;
pub mod provider;
pub mod registry;
pub mod request;
pub mod request_options;
pub mod sse;
pub mod tasks;
pub mod transport;
pub mod validate;

pub use client::{InferenceClient, InferenceClientBuilder};
pub use error::{InferenceError, Result};

#[cfg(test)]
mod mock;
