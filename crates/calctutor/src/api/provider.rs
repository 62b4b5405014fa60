//! The seam between the gateway and a concrete model backend.
//!
//! [`ModelProvider`] uses boxed futures so it stays dyn-compatible; the
//! tutor holds providers as `Arc<dyn ModelProvider>` and tests swap in stubs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::{Credential, GeminiClient, GenerateContentRequest, Generation};

/// Boxed future returned by [`ModelProvider`] methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// A hosted text-generation backend.
///
/// Errors are plain strings; the gateway classifies them with
/// [`classify`](super::errors::classify).
pub trait ModelProvider: Send + Sync {
    /// Issue one generation request for `model`.
    fn generate<'a>(
        &'a self,
        model: &'a str,
        request: &'a GenerateContentRequest,
    ) -> ProviderFuture<'a, Generation>;

    /// Lightweight existence check for `model` with this provider's
    /// credential. Succeeds only if the credential is accepted.
    fn check_model<'a>(&'a self, model: &'a str) -> ProviderFuture<'a, ()>;
}

impl ModelProvider for GeminiClient {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        request: &'a GenerateContentRequest,
    ) -> ProviderFuture<'a, Generation> {
        Box::pin(GeminiClient::generate(self, model, request))
    }

    fn check_model<'a>(&'a self, model: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.get_model(model))
    }
}

/// Builds a provider bound to one credential.
///
/// In the interactive mode every session connects with its own key; in the
/// preconfigured mode the tutor connects once at startup.
pub trait Connector: Send + Sync {
    fn connect(&self, credential: Credential) -> Result<Arc<dyn ModelProvider>, String>;
}

/// Connector for the Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiConnector {
    pub api_base: String,
    pub timeout: Duration,
}

impl GeminiConnector {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into(),
            timeout,
        }
    }
}

impl Default for GeminiConnector {
    fn default() -> Self {
        Self::new(crate::GEMINI_API_BASE, crate::DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Connector for GeminiConnector {
    fn connect(&self, credential: Credential) -> Result<Arc<dyn ModelProvider>, String> {
        let client = GeminiClient::with_base(credential, self.api_base.clone(), self.timeout)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_connector_builds_client() {
        let connector = GeminiConnector::new("http://127.0.0.1:9/", Duration::from_secs(1));
        assert!(connector.connect(Credential::new("key")).is_ok());
    }

    #[test]
    fn client_base_url_is_normalized() {
        let client = GeminiClient::with_base(
            Credential::new("key"),
            "http://localhost:8080/",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.model_url("gemma-3-27b-it"),
            "http://localhost:8080/v1beta/models/gemma-3-27b-it"
        );
    }
}
