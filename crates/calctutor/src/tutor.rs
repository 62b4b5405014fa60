//! Shared tutor context and per-user sessions.
//!
//! A [`Tutor`] is built once per process: it resolves the policy document,
//! loads the catalog and, in the preconfigured mode, connects the shared
//! provider. Catalog failure does not abort construction; the tutor starts
//! in a degraded state where [`availability`](Tutor::availability) reports
//! the failure and every turn is refused.
//!
//! A [`TutorSession`] holds one user's turns and credential state. A turn is
//! split in two so callers that keep sessions behind a lock do not hold it
//! across the model call:
//!
//! ```ignore
//! let turn = session.begin_turn(&tutor, "1")?;   // appends the user turn
//! let reply = turn.run(&tutor).await;            // no session borrow
//! session.finish_turn(&turn, &reply);            // appends the assistant turn
//! ```
//!
//! [`TutorSession::send`] does all three for single-owner callers.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::errors::{FailureClass, classify};
use crate::api::provider::{Connector, GeminiConnector, ModelProvider};
use crate::catalog::{Catalog, CatalogStore, LoadFailure};
use crate::config::TutorConfig;
use crate::gateway::{ErrorKind, Gateway, Reply};
use crate::prompt::{self, PolicyDocument};
use crate::Credential;
use crate::session::{ChatRole, ChatTurn, Session};

// ── Status types ───────────────────────────────────────────────────

/// Whether the tutor can serve turns at all.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Ready,
    CatalogUnavailable { reason: String },
}

impl Availability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What one session is waiting for, if anything.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ready,
    AwaitingCredential,
    CatalogUnavailable,
}

/// Why a turn was refused before reaching the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The input was empty or whitespace.
    BlankInput,
    /// The catalog failed to load at startup.
    CatalogUnavailable,
    /// Interactive mode and no validated credential yet.
    AwaitingCredential,
    /// Another turn of this session is in flight.
    Busy,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::BlankInput => write!(f, "message is empty"),
            SendError::CatalogUnavailable => write!(f, "exercise catalog unavailable"),
            SendError::AwaitingCredential => write!(f, "no validated API key for this session"),
            SendError::Busy => write!(f, "a turn is already in progress"),
        }
    }
}

impl std::error::Error for SendError {}

/// Why a submitted credential was not installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The submitted key was empty.
    Missing,
    /// The provider refused the key (or could not be reached to check it).
    Rejected { detail: String },
    /// The process runs with a preconfigured key.
    NotInteractive,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialError::Missing => write!(f, "no API key supplied"),
            CredentialError::Rejected { detail } => write!(f, "API key rejected: {detail}"),
            CredentialError::NotInteractive => {
                write!(f, "credentials are preconfigured for this deployment")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

// ── Tutor ──────────────────────────────────────────────────────────

/// Process-wide tutor context.
pub struct Tutor {
    config: TutorConfig,
    policy: PolicyDocument,
    catalog: Result<Arc<Catalog>, LoadFailure>,
    connector: Arc<dyn Connector>,
    /// The provider shared by every session in the preconfigured mode.
    shared_provider: Option<Arc<dyn ModelProvider>>,
}

impl Tutor {
    /// Build a tutor that talks to the Generative Language API.
    pub fn from_config(config: TutorConfig) -> Result<Self, String> {
        let connector = GeminiConnector::new(config.api_base.clone(), config.request_timeout());
        Self::with_connector(config, Arc::new(connector), &CatalogStore::new())
    }

    /// Build a tutor with an explicit connector and catalog store.
    ///
    /// Fails only on configuration errors (unreadable policy file, missing
    /// preconfigured key). A catalog failure is kept and reported through
    /// [`availability`](Self::availability).
    pub fn with_connector(
        config: TutorConfig,
        connector: Arc<dyn Connector>,
        store: &CatalogStore,
    ) -> Result<Self, String> {
        let policy = config.resolve_policy()?;
        let catalog = store.load(&config.catalog_path, &config.field_mapping);

        let shared_provider = match config.credential_source.resolve()? {
            Some(credential) => {
                info!("Using preconfigured API key for model {}", config.model);
                Some(connector.connect(credential)?)
            }
            None => None,
        };

        Ok(Self {
            config,
            policy,
            catalog,
            connector,
            shared_provider,
        })
    }

    /// Replace the shared provider. Only meaningful in the preconfigured
    /// mode; tests use it to inject stubs.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.shared_provider = Some(provider);
        self
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn is_interactive(&self) -> bool {
        self.config.credential_source.is_interactive()
    }

    /// The loaded catalog, if loading succeeded.
    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_deref().ok()
    }

    pub fn availability(&self) -> Availability {
        match &self.catalog {
            Ok(_) => Availability::Ready,
            Err(e) => Availability::CatalogUnavailable {
                reason: e.to_string(),
            },
        }
    }

    /// The system prompt for the next model call.
    pub fn system_prompt(&self) -> String {
        prompt::build(self.catalog(), &self.policy)
    }

    /// A gateway over `provider` with this tutor's model and timeout.
    pub fn gateway<'a>(&'a self, provider: &'a dyn ModelProvider) -> Gateway<'a> {
        Gateway::new(provider, &self.policy)
            .with_model(self.config.model.as_str())
            .with_timeout(self.config.request_timeout())
    }

    /// Open a session, greeting included.
    pub fn new_session(&self) -> TutorSession {
        TutorSession {
            session: Session::with_greeting(self.policy.replies.greeting.as_str()),
            provider: self.shared_provider.clone(),
            interactive: self.is_interactive(),
            pending: false,
            epoch: 0,
        }
    }

    /// Check `key` against the provider and return a provider bound to it.
    ///
    /// Interactive mode only. The check is a model lookup for the configured
    /// model, bounded by the request timeout.
    pub async fn validate_credential(
        &self,
        key: &str,
    ) -> Result<Arc<dyn ModelProvider>, CredentialError> {
        if !self.is_interactive() {
            return Err(CredentialError::NotInteractive);
        }
        let credential = Credential::new(key);
        if credential.is_empty() {
            return Err(CredentialError::Missing);
        }

        let provider = self
            .connector
            .connect(credential)
            .map_err(|detail| CredentialError::Rejected { detail })?;

        let check = tokio::time::timeout(
            self.config.request_timeout(),
            provider.check_model(&self.config.model),
        )
        .await
        .unwrap_or_else(|_| Err("credential check timed out".to_string()));

        match check {
            Ok(()) => {
                info!("API key validated for model {}", self.config.model);
                Ok(provider)
            }
            Err(detail) => {
                let class = match classify(&detail) {
                    FailureClass::Credential => "rejected",
                    FailureClass::Transient => "unverifiable",
                };
                warn!("API key {class}: {detail}");
                Err(CredentialError::Rejected { detail })
            }
        }
    }
}

// ── Sessions ───────────────────────────────────────────────────────

/// One user's conversation and credential state.
pub struct TutorSession {
    session: Session,
    provider: Option<Arc<dyn ModelProvider>>,
    /// Interactive sessions own their provider; preconfigured ones share it.
    interactive: bool,
    pending: bool,
    /// Bumped on reset so a turn started before the reset is discarded.
    epoch: u64,
}

/// A turn whose user message is recorded and whose model call is due.
pub struct PendingTurn {
    provider: Arc<dyn ModelProvider>,
    system_prompt: String,
    history: Vec<ChatTurn>,
    epoch: u64,
}

impl PendingTurn {
    /// Call the model. Never fails; see [`ReplyOutcome`](crate::gateway::ReplyOutcome).
    pub async fn run(&self, tutor: &Tutor) -> Reply {
        tutor
            .gateway(self.provider.as_ref())
            .complete(&self.system_prompt, &self.history)
            .await
    }
}

impl TutorSession {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Every turn, greeting included.
    pub fn turns(&self) -> &[ChatTurn] {
        self.session.all()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn credential_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn status(&self, tutor: &Tutor) -> SessionStatus {
        if !tutor.availability().is_ready() {
            SessionStatus::CatalogUnavailable
        } else if !self.credential_configured() {
            SessionStatus::AwaitingCredential
        } else {
            SessionStatus::Ready
        }
    }

    /// The banner text for a session that cannot chat yet.
    pub fn status_message<'a>(&self, tutor: &'a Tutor) -> Option<&'a str> {
        let replies = &tutor.policy().replies;
        match self.status(tutor) {
            SessionStatus::Ready => None,
            SessionStatus::AwaitingCredential => Some(replies.awaiting_credential.as_str()),
            SessionStatus::CatalogUnavailable => Some(replies.catalog_unavailable.as_str()),
        }
    }

    /// Install a provider returned by [`Tutor::validate_credential`].
    pub fn install_provider(&mut self, provider: Arc<dyn ModelProvider>) {
        self.provider = Some(provider);
    }

    /// Validate `key` and install it for this session.
    pub async fn configure_credential(
        &mut self,
        tutor: &Tutor,
        key: &str,
    ) -> Result<(), CredentialError> {
        let provider = tutor.validate_credential(key).await?;
        self.install_provider(provider);
        Ok(())
    }

    /// Record the user's message and prepare the model call.
    pub fn begin_turn(&mut self, tutor: &Tutor, text: &str) -> Result<PendingTurn, SendError> {
        if text.trim().is_empty() {
            debug!("Ignoring blank chat input");
            return Err(SendError::BlankInput);
        }
        if !tutor.availability().is_ready() {
            return Err(SendError::CatalogUnavailable);
        }
        let Some(provider) = self.provider.clone() else {
            return Err(SendError::AwaitingCredential);
        };
        if self.pending {
            return Err(SendError::Busy);
        }

        self.session.append(ChatRole::User, text);
        self.pending = true;
        Ok(PendingTurn {
            provider,
            system_prompt: tutor.system_prompt(),
            history: self.session.upstream().to_vec(),
            epoch: self.epoch,
        })
    }

    /// Record the reply for `turn`.
    ///
    /// Returns `false` (and records nothing) if the session was reset while
    /// the turn was in flight. An interactive session whose key was rejected
    /// mid-conversation drops it and waits for a new one.
    pub fn finish_turn(&mut self, turn: &PendingTurn, reply: &Reply) -> bool {
        if turn.epoch != self.epoch {
            debug!("Discarding reply for a turn started before reset");
            return false;
        }
        self.pending = false;
        self.session.append(ChatRole::Assistant, reply.text.as_str());
        if self.interactive && reply.error() == Some(&ErrorKind::InvalidCredential) {
            info!("Dropping rejected API key; session awaits a new one");
            self.provider = None;
        }
        true
    }

    /// Run one complete turn: user message in, assistant reply out.
    pub async fn send(&mut self, tutor: &Tutor, text: &str) -> Result<Reply, SendError> {
        let turn = self.begin_turn(tutor, text)?;
        let reply = turn.run(tutor).await;
        self.finish_turn(&turn, &reply);
        Ok(reply)
    }

    /// Clear every turn. Credential state is untouched.
    pub fn reset(&mut self) {
        self.session.reset();
        self.pending = false;
        self.epoch += 1;
    }
}
