//! Provider plumbing between the [`Gateway`](crate::gateway::Gateway) and the
//! hosted model:
//!
//! - [`provider`]: the [`ModelProvider`] trait implemented by
//!   [`GeminiClient`](crate::GeminiClient) and by test stubs, and the
//!   [`Connector`] that turns a credential into a provider.
//! - [`errors`]: classification of provider error strings into credential
//!   failures and transient failures. Nothing here retries.

pub mod errors;
pub mod provider;

pub use errors::{FailureClass, classify};
pub use provider::{Connector, GeminiConnector, ModelProvider, ProviderFuture};
