//! Serializable projection of one [`TutorSession`] for WebSocket and REST
//! transport.
//!
//! Besides the turns, a snapshot carries what the page needs to decide what
//! to show: whether a turn is in flight, whether the session still needs an
//! API key, the catalog availability and the most recent warnings logged for
//! this session.

use calctutor::logs::{LogBuffer, LogLevel, LogLine};
use calctutor::session::ChatTurn;
use calctutor::tutor::{Availability, SessionStatus, Tutor, TutorSession};
use serde::Serialize;

/// Maximum number of log lines included in a snapshot.
const SNAPSHOT_MAX_LOGS: usize = 50;

#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,

    // ── Conversation ──
    pub turns: Vec<ChatTurn>,
    pub pending: bool,

    // ── Gating ──
    pub status: SessionStatus,
    /// Banner text explaining what the session is waiting for.
    pub status_message: Option<String>,
    pub credential_configured: bool,
    /// `interactive` or `preconfigured`.
    pub credential_mode: &'static str,
    pub availability: Availability,
    pub model: String,

    // ── Logs (this session's warnings and errors, capped) ──
    pub logs: Vec<LogLine>,
}

impl SessionSnapshot {
    /// Build a snapshot. Call while holding the session lock.
    pub fn from_session(
        session_id: &str,
        session: &TutorSession,
        tutor: &Tutor,
        logs: &LogBuffer,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            turns: session.turns().to_vec(),
            pending: session.is_pending(),
            status: session.status(tutor),
            status_message: session.status_message(tutor).map(str::to_string),
            credential_configured: session.credential_configured(),
            credential_mode: tutor.config().credential_source.label(),
            availability: tutor.availability(),
            model: tutor.model().to_string(),
            logs: logs.recent_for_session(session_id, LogLevel::Warn, SNAPSHOT_MAX_LOGS),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
