//! Server-to-client WebSocket messages.
//!
//! All sessions share one `tokio::sync::broadcast` channel. Every message
//! except [`WsMessage::Snapshot`] names its session; each socket forwards
//! only the messages for the session it was opened on.

use calctutor::gateway::{ErrorKind, ReplyOutcome};
use calctutor::session::ChatTurn;
use serde::Serialize;
use tokio::sync::broadcast;

/// A message sent from the server to WebSocket clients.
///
/// Discriminated on the `type` field when serialized to JSON.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Full session snapshot (sent on connect and after a lag).
    Snapshot { data: serde_json::Value },
    /// A turn was appended.
    Turn {
        session_id: String,
        turn: ChatTurn,
        /// How an assistant turn came about; absent for user turns.
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<&'static str>,
    },
    /// A model call started or finished.
    Pending { session_id: String, pending: bool },
    /// The session was cleared.
    Reset { session_id: String },
    /// The session's credential state changed.
    Credential {
        session_id: String,
        configured: bool,
    },
    /// A chat message was refused before reaching the model.
    Rejected {
        session_id: String,
        reason: String,
        message: String,
    },
}

impl WsMessage {
    /// The session this message belongs to. `None` for snapshots, which are
    /// sent directly to one socket.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            WsMessage::Snapshot { .. } => None,
            WsMessage::Turn { session_id, .. }
            | WsMessage::Pending { session_id, .. }
            | WsMessage::Reset { session_id }
            | WsMessage::Credential { session_id, .. }
            | WsMessage::Rejected { session_id, .. } => Some(session_id),
        }
    }
}

/// Wire label for a reply outcome.
pub fn outcome_label(outcome: &ReplyOutcome) -> &'static str {
    match outcome {
        ReplyOutcome::Answered => "answered",
        ReplyOutcome::SafetyBlocked => "safety_blocked",
        ReplyOutcome::Failed(ErrorKind::InvalidCredential) => "invalid_credential",
        ReplyOutcome::Failed(ErrorKind::Transient { .. }) => "transient",
    }
}

/// Publishes session events on the shared channel.
///
/// Send errors are ignored: no subscribers is fine.
#[derive(Clone)]
pub struct SessionBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl SessionBroadcaster {
    pub fn new(sender: broadcast::Sender<WsMessage>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    fn broadcast(&self, msg: WsMessage) {
        let _ = self.sender.send(msg);
    }

    pub fn turn(&self, session_id: &str, turn: ChatTurn, outcome: Option<&ReplyOutcome>) {
        self.broadcast(WsMessage::Turn {
            session_id: session_id.to_string(),
            turn,
            outcome: outcome.map(outcome_label),
        });
    }

    pub fn pending(&self, session_id: &str, pending: bool) {
        self.broadcast(WsMessage::Pending {
            session_id: session_id.to_string(),
            pending,
        });
    }

    pub fn reset(&self, session_id: &str) {
        self.broadcast(WsMessage::Reset {
            session_id: session_id.to_string(),
        });
    }

    pub fn credential(&self, session_id: &str, configured: bool) {
        self.broadcast(WsMessage::Credential {
            session_id: session_id.to_string(),
            configured,
        });
    }

    pub fn rejected(&self, session_id: &str, reason: &str, message: &str) {
        self.broadcast(WsMessage::Rejected {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_message_serializes_with_type_tag() {
        let msg = WsMessage::Turn {
            session_id: "ses-1".into(),
            turn: ChatTurn::assistant("Paso 1"),
            outcome: Some("answered"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "turn");
        assert_eq!(json["session_id"], "ses-1");
        assert_eq!(json["turn"]["role"], "assistant");
        assert_eq!(json["outcome"], "answered");
    }

    #[test]
    fn user_turn_omits_outcome() {
        let msg = WsMessage::Turn {
            session_id: "ses-1".into(),
            turn: ChatTurn::user("1"),
            outcome: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("outcome").is_none());
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome_label(&ReplyOutcome::SafetyBlocked), "safety_blocked");
        assert_eq!(
            outcome_label(&ReplyOutcome::Failed(ErrorKind::Transient {
                detail: "x".into()
            })),
            "transient"
        );
    }

    #[test]
    fn broadcaster_tags_session() {
        let (tx, mut rx) = broadcast::channel(8);
        let broadcaster = SessionBroadcaster::new(tx);
        broadcaster.pending("ses-9", true);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.session_id(), Some("ses-9"));
        assert!(matches!(msg, WsMessage::Pending { pending: true, .. }));
    }
}
