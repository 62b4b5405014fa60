//! Single-shot model calls.
//!
//! [`Gateway::complete`] turns a system prompt and a session history into
//! one `generateContent` request and always produces a [`Reply`]: real model
//! text, or one of the fixed fallback replies from the
//! [`PolicyDocument`]. No failure escapes this boundary, nothing is retried,
//! and the call is bounded by a timeout.
//!
//! Transcript layout:
//!
//! ```text
//! user:  <system prompt>
//! model: <acknowledgment>
//! user/model: <history turns, in order>
//! ```
//!
//! The leading pair is rebuilt on every call and never stored in the session.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::errors::{FailureClass, classify, is_network_error};
use crate::api::provider::ModelProvider;
use crate::prompt::PolicyDocument;
use crate::session::{ChatRole, ChatTurn};
use crate::{Content, DEFAULT_MODEL, DEFAULT_REQUEST_TIMEOUT, GenerateContentRequest};

/// Recoverable failure of a model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The provider rejected the credential. The user must re-enter it.
    InvalidCredential,
    /// Anything else. The user may simply send another turn.
    Transient { detail: String },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::InvalidCredential => write!(f, "credential rejected by the provider"),
            ErrorKind::Transient { detail } => write!(f, "transient provider failure: {detail}"),
        }
    }
}

/// How a reply came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The model produced text.
    Answered,
    /// The provider returned no content (safety filtering). Not an error.
    SafetyBlocked,
    /// The call failed; the reply text is a fixed fallback.
    Failed(ErrorKind),
}

/// What the user sees for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub outcome: ReplyOutcome,
}

impl Reply {
    pub fn error(&self) -> Option<&ErrorKind> {
        match &self.outcome {
            ReplyOutcome::Failed(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }
}

/// Wraps one provider for single-shot completions.
pub struct Gateway<'a> {
    provider: &'a dyn ModelProvider,
    policy: &'a PolicyDocument,
    model: String,
    timeout: Duration,
}

impl<'a> Gateway<'a> {
    pub fn new(provider: &'a dyn ModelProvider, policy: &'a PolicyDocument) -> Self {
        Self {
            provider,
            policy,
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// The full transcript for one request.
    pub fn transcript(&self, system_prompt: &str, history: &[ChatTurn]) -> Vec<Content> {
        let mut contents = Vec::with_capacity(history.len() + 2);
        contents.push(Content::user(system_prompt));
        contents.push(Content::model(self.policy.acknowledgment.as_str()));
        contents.extend(history.iter().map(|turn| match turn.role {
            ChatRole::User => Content::user(turn.text.as_str()),
            ChatRole::Assistant => Content::model(turn.text.as_str()),
        }));
        contents
    }

    /// Run one completion. Never fails; see [`ReplyOutcome`].
    pub async fn complete(&self, system_prompt: &str, history: &[ChatTurn]) -> Reply {
        let request = GenerateContentRequest {
            contents: self.transcript(system_prompt, history),
        };
        debug!(
            "Gateway call: model={}, history={} turn(s)",
            self.model,
            history.len()
        );

        let result = match tokio::time::timeout(
            self.timeout,
            self.provider.generate(&self.model, &request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "model call timed out after {:.0}s",
                self.timeout.as_secs_f64()
            )),
        };

        let replies = &self.policy.replies;
        match result {
            Ok(generation) if generation.is_empty() => {
                info!(
                    "Model returned no content (block_reason={}, finish_reason={})",
                    generation.block_reason.as_deref().unwrap_or("none"),
                    generation.finish_reason.as_deref().unwrap_or("none"),
                );
                Reply {
                    text: replies.safety_blocked.clone(),
                    outcome: ReplyOutcome::SafetyBlocked,
                }
            }
            Ok(generation) => Reply {
                text: generation.joined_text(),
                outcome: ReplyOutcome::Answered,
            },
            Err(e) => match classify(&e) {
                FailureClass::Credential => {
                    warn!("Model provider rejected the credential: {e}");
                    Reply {
                        text: replies.invalid_credential.clone(),
                        outcome: ReplyOutcome::Failed(ErrorKind::InvalidCredential),
                    }
                }
                FailureClass::Transient => {
                    let origin = if is_network_error(&e) {
                        "network"
                    } else {
                        "provider"
                    };
                    warn!("Model call failed ({origin}): {e}");
                    Reply {
                        text: replies.technical_difficulties.clone(),
                        outcome: ReplyOutcome::Failed(ErrorKind::Transient { detail: e }),
                    }
                }
            },
        }
    }
}
