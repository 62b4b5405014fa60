//! Conversational calculus tutor core.
//!
//! `calctutor` teaches a fixed catalog of derivative exercises by forwarding
//! chat turns to a hosted model (Google's Generative Language API) together
//! with a strict instruction document. It never computes a derivative itself;
//! it only asks the model to explain one.
//!
//! # Getting started
//!
//! ```ignore
//! use calctutor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = TutorConfig::default();
//!     let tutor = Tutor::from_config(config)?;
//!
//!     let mut session = tutor.new_session();
//!     session
//!         .configure_credential(&tutor, "AIza...")
//!         .await
//!         .map_err(|e| e.to_string())?;
//!
//!     let reply = session.send(&tutor, "1").await.map_err(|e| e.to_string())?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Exercise data:** [`catalog::load`] reads a JSON array of records through
//!   a configurable [`FieldMapping`](catalog::FieldMapping).
//!   [`CatalogStore`](catalog::CatalogStore) memoizes loads by path.
//!
//! - **Instruction text:** [`PolicyDocument`](prompt::PolicyDocument) holds the
//!   scope, formatting and step-numbering rules plus every fixed reply string.
//!   [`prompt::build`] renders it together with the catalog.
//!
//! - **Conversation history:** [`Session`](session::Session) is the ordered,
//!   append-only turn log.
//!
//! - **Model calls:** [`Gateway`](gateway::Gateway) turns a system prompt and
//!   session history into one `generateContent` request and maps every
//!   outcome to a [`Reply`](gateway::Reply). Providers implement
//!   [`ModelProvider`](api::provider::ModelProvider); [`GeminiClient`] is the
//!   HTTP implementation.
//!
//! - **Putting it together:** [`Tutor`](tutor::Tutor) holds the loaded catalog,
//!   configuration and provider connector;
//!   [`TutorSession`](tutor::TutorSession) holds one user's turns and
//!   credential state.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`catalog`] | Exercise records, field mappings, memoized loading |
//! | [`prompt`] | Policy document and deterministic system prompt assembly |
//! | [`session`] | Chat turns and the append-only session log |
//! | [`gateway`] | Single-shot model call, transcript construction, fallback replies |
//! | [`api`] | Provider trait, connectors, error classification |
//! | [`config`] | [`TutorConfig`](config::TutorConfig) and credential modes |
//! | [`tutor`] | Shared tutor context and per-user sessions |
//! | [`logs`] | Tracing layer that captures log lines for the browser |

pub mod api;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod logs;
pub mod prelude;
pub mod prompt;
pub mod session;
pub mod tutor;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

/// Base URL of the Generative Language API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Model used for every tutoring call unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gemma-3-27b-it";

/// Default upper bound for a single model call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ── Credentials ────────────────────────────────────────────────────

/// An opaque bearer credential for the model provider.
///
/// The key never appears in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a key. Surrounding whitespace from copy/paste is trimmed.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw key, for placing into a request header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ── Request types ──────────────────────────────────────────────────

/// The provider's two role labels.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    User,
    Model,
}

impl fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRole::User => write!(f, "user"),
            ProviderRole::Model => write!(f, "model"),
        }
    }
}

/// One text part of a content entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// One role-tagged entry of the transcript.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Content {
    pub role: ProviderRole,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ProviderRole::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all parts.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// `generateContent` request body.
#[derive(Serialize, Debug, Default, Clone)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawGenerateResponse {
    #[serde(default)]
    candidates: Option<Vec<RawCandidate>>,
    #[serde(default)]
    prompt_feedback: Option<RawPromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawCandidate {
    #[serde(default)]
    content: Option<RawCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawCandidateContent {
    #[serde(default)]
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Token usage reported by the provider.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

/// Clean return type from [`GeminiClient::generate`] and every
/// [`ModelProvider`](api::provider::ModelProvider).
///
/// `parts` is empty when the provider produced no content, which is how a
/// safety block shows up.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub parts: Vec<String>,
    pub finish_reason: Option<String>,
    pub block_reason: Option<String>,
    pub usage: Option<UsageMetadata>,
}

impl Generation {
    /// A generation with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![text.into()],
            ..Default::default()
        }
    }

    /// A generation with no content parts.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            block_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn joined_text(&self) -> String {
        self.parts.join("")
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the Generative Language API.
pub struct GeminiClient {
    pub(crate) client: reqwest::Client,
    pub(crate) credential: Credential,
    pub(crate) api_base: String,
}

impl GeminiClient {
    /// Create a client against the public endpoint with the default timeout.
    pub fn new(credential: Credential) -> Result<Self, String> {
        Self::with_base(credential, GEMINI_API_BASE, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client against a custom base URL (proxies, test servers).
    pub fn with_base(
        credential: Credential,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("calctutor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            credential,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn model_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}", self.api_base)
    }

    /// Send a `generateContent` request.
    pub async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<Generation, String> {
        debug!(
            "LLM request: model={}, contents={}",
            model,
            body.contents.len()
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(format!("{}:generateContent", self.model_url(model)))
            .header("x-goog-api-key", self.credential.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("Gemini API HTTP {status}: {text}"));
        }

        parse_generation(&text)
    }

    /// Look up the model with this client's credential.
    ///
    /// Used as a lightweight existence check to validate a key.
    pub async fn get_model(&self, model: &str) -> Result<(), String> {
        let resp = self
            .client
            .get(self.model_url(model))
            .header("x-goog-api-key", self.credential.expose())
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        if status.is_success() {
            debug!("Model lookup ok: {model}");
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(format!("Gemini API HTTP {status}: {text}"))
    }
}

/// Parse a `generateContent` response body.
///
/// Only the first candidate is used. Missing candidates or missing parts
/// produce an empty [`Generation`], not an error.
pub fn parse_generation(body: &str) -> Result<Generation, String> {
    let parsed: RawGenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(ref usage) = parsed.usage_metadata {
        debug!(
            "Token usage: prompt={}, candidates={}, total={}",
            usage.prompt_token_count.unwrap_or(0),
            usage.candidates_token_count.unwrap_or(0),
            usage.total_token_count.unwrap_or(0),
        );
    }

    let block_reason = parsed.prompt_feedback.and_then(|f| f.block_reason);
    let candidate = parsed.candidates.and_then(|c| c.into_iter().next());

    let (parts, finish_reason) = match candidate {
        Some(c) => {
            let parts: Vec<String> = c
                .content
                .and_then(|content| content.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| p.text)
                .collect();
            (parts, c.finish_reason)
        }
        None => (Vec::new(), None),
    };

    debug!(
        "LLM output: {} part(s), finish_reason={}",
        parts.len(),
        finish_reason.as_deref().unwrap_or("(none)")
    );

    Ok(Generation {
        parts,
        finish_reason,
        block_reason,
        usage: parsed.usage_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_constructors() {
        let user = Content::user("hello");
        assert_eq!(user.role, ProviderRole::User);
        assert_eq!(user.joined_text(), "hello");

        let model = Content::model("ack");
        assert_eq!(model.role, ProviderRole::Model);
    }

    #[test]
    fn request_serializes_provider_shape() {
        let req = GenerateContentRequest {
            contents: vec![Content::user("hi"), Content::model("hello")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["contents"][1]["role"], "model");
    }

    #[test]
    fn credential_debug_is_redacted() {
        let key = Credential::new("  AIzaSecret  ");
        assert_eq!(key.expose(), "AIzaSecret");
        assert_eq!(format!("{key:?}"), "Credential(***)");
    }

    #[test]
    fn parse_generation_joins_first_candidate() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Paso 1"}, {"text": "\n$$ x $$"}]},
                 "finishReason": "STOP"},
                {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4, "totalTokenCount": 14}
        }"#;
        let generation = parse_generation(body).unwrap();
        assert_eq!(generation.joined_text(), "Paso 1\n$$ x $$");
        assert_eq!(generation.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(generation.usage.unwrap().total_token_count, Some(14));
    }

    #[test]
    fn parse_generation_without_parts_is_empty() {
        let body = r#"{
            "candidates": [{"finishReason": "SAFETY"}],
            "promptFeedback": {"blockReason": "SAFETY"}
        }"#;
        let generation = parse_generation(body).unwrap();
        assert!(generation.is_empty());
        assert_eq!(generation.block_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn parse_generation_without_candidates_is_empty() {
        let generation = parse_generation("{}").unwrap();
        assert!(generation.is_empty());
    }

    #[test]
    fn parse_generation_rejects_garbage() {
        let err = parse_generation("<html>").unwrap_err();
        assert!(err.starts_with("failed to parse response"));
    }
}
