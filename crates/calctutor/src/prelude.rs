//! Convenience re-exports for common `calctutor` types.
//!
//! ```ignore
//! use calctutor::prelude::*;
//! ```
//!
//! Wire-level types (raw response structs, [`parse_generation`](crate::parse_generation))
//! are left out; import those from the crate root when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Credential, GeminiClient, Generation, DEFAULT_MODEL};

// ── Data and prompt ─────────────────────────────────────────────────
pub use crate::catalog::{Catalog, CatalogStore, ExerciseRecord, FieldMapping, LoadFailure};
pub use crate::prompt::{FixedReplies, PolicyDocument, SystemPromptBuilder};

// ── Conversation ────────────────────────────────────────────────────
pub use crate::gateway::{ErrorKind, Gateway, Reply, ReplyOutcome};
pub use crate::session::{ChatRole, ChatTurn, Session};
pub use crate::tutor::{
    Availability, CredentialError, PendingTurn, SendError, SessionStatus, Tutor, TutorSession,
};

// ── Configuration and providers ─────────────────────────────────────
pub use crate::api::{Connector, GeminiConnector, ModelProvider, ProviderFuture};
pub use crate::config::{CredentialSource, TutorConfig};

// ── Logging ─────────────────────────────────────────────────────────
pub use crate::logs::{LogBuffer, LogCaptureLayer, LogLevel, LogLine};
