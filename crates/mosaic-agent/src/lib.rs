//! # mosaic-agent
//!
//! The inference provider boundary for Mosaic.
//!
//! Every model call in the system goes through [`InferenceProvider::infer`]
//! with a prompt and an [`InferenceRole`]. Calls are stateless: no
//! conversation history is kept, so each prompt must carry all the context
//! the model needs (signature, constraints, prior violations).
//!
//! - [`AnthropicProvider`]: production HTTP provider with backoff and a
//!   shared circuit breaker
//! - [`FnProvider`]: closure-backed provider for tests and dry runs

mod auth;
mod circuit_breaker;
mod client;
mod mock;
mod provider;
mod types;

pub use auth::api_key;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{shared_circuit_breaker, AnthropicProvider};
pub use mock::FnProvider;
pub use provider::{InferenceProvider, InferenceRole};
pub use types::*;
