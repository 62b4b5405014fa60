//! REST API endpoint handlers.
//!
//! The WebSocket channel pushes the same events; these endpoints cover
//! request/response use (page load, form posts, scripted clients). Turn and
//! reset logic lives here and is shared with [`ws`](crate::ws).

use std::sync::{Arc, MutexGuard};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use calctutor::gateway::{ErrorKind, Reply, ReplyOutcome};
use calctutor::logs::LogBuffer;
use calctutor::session::ChatTurn;
use calctutor::tutor::{
    Availability, CredentialError, PendingTurn, SendError, Tutor, TutorSession,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{Instrument, debug, error, info_span};

use crate::broadcast::{SessionBroadcaster, outcome_label};
use crate::sessions::{SessionRegistry, SharedSession};
use crate::snapshot::SessionSnapshot;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub tutor: Arc<Tutor>,
    pub sessions: Arc<SessionRegistry>,
    pub broadcaster: SessionBroadcaster,
    pub logs: LogBuffer,
}

impl AppState {
    pub fn session(&self, id: &str) -> Result<SharedSession, ApiError> {
        self.sessions.get(id).ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "unknown_session", "no such session")
        })
    }

    pub fn snapshot(&self, id: &str, session: &SharedSession) -> SessionSnapshot {
        SessionSnapshot::from_session(id, &lock(session), &self.tutor, &self.logs)
    }
}

pub(crate) fn lock(session: &SharedSession) -> MutexGuard<'_, TutorSession> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Errors ─────────────────────────────────────────────────────────

/// A JSON error body: `{"error": <code>, "message": <text>}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Map a refused turn to a status code and the policy's banner text.
    pub fn from_send(err: &SendError, tutor: &Tutor) -> Self {
        let replies = &tutor.policy().replies;
        match err {
            SendError::BlankInput => {
                Self::new(StatusCode::BAD_REQUEST, "blank_input", err.to_string())
            }
            SendError::CatalogUnavailable => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "catalog_unavailable",
                replies.catalog_unavailable.as_str(),
            ),
            SendError::AwaitingCredential => Self::new(
                StatusCode::CONFLICT,
                "awaiting_credential",
                replies.awaiting_credential.as_str(),
            ),
            SendError::Busy => Self::new(StatusCode::CONFLICT, "busy", err.to_string()),
        }
    }

    pub fn from_credential(err: &CredentialError, tutor: &Tutor) -> Self {
        let replies = &tutor.policy().replies;
        match err {
            CredentialError::Missing => Self::new(
                StatusCode::BAD_REQUEST,
                "credential_missing",
                replies.credential_missing.as_str(),
            ),
            CredentialError::Rejected { .. } => Self::new(
                StatusCode::UNAUTHORIZED,
                "credential_rejected",
                replies.credential_rejected.as_str(),
            ),
            CredentialError::NotInteractive => {
                Self::new(StatusCode::CONFLICT, "not_interactive", err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.code, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ── Shared turn logic ──────────────────────────────────────────────

/// Run one chat turn for `session_id`, broadcasting every step.
///
/// The session lock is held only to record the user turn and the reply. The
/// model call and the reply bookkeeping run on their own task and complete
/// even if the caller is dropped mid-turn.
pub(crate) async fn run_turn(
    app: &AppState,
    session_id: &str,
    session: &SharedSession,
    text: &str,
) -> Result<Reply, SendError> {
    let turn = lock(session).begin_turn(&app.tutor, text)?;
    app.broadcaster.turn(session_id, ChatTurn::user(text), None);
    app.broadcaster.pending(session_id, true);

    let span = info_span!("turn", session_id = session_id);
    let task = tokio::spawn(
        complete_turn(app.clone(), session_id.to_string(), session.clone(), turn)
            .instrument(span),
    );
    Ok(task.await.unwrap_or_else(|e| {
        error!("Turn task for session {session_id} failed: {e}");
        Reply {
            text: app.tutor.policy().replies.technical_difficulties.clone(),
            outcome: ReplyOutcome::Failed(ErrorKind::Transient {
                detail: e.to_string(),
            }),
        }
    }))
}

async fn complete_turn(
    app: AppState,
    session_id: String,
    session: SharedSession,
    turn: PendingTurn,
) -> Reply {
    let reply = turn.run(&app.tutor).await;

    let (recorded, configured) = {
        let mut s = lock(&session);
        let recorded = s.finish_turn(&turn, &reply);
        (recorded, s.credential_configured())
    };
    if recorded {
        app.broadcaster.turn(
            &session_id,
            ChatTurn::assistant(reply.text.as_str()),
            Some(&reply.outcome),
        );
        if reply.error() == Some(&ErrorKind::InvalidCredential) && !configured {
            app.broadcaster.credential(&session_id, false);
        }
    }
    app.broadcaster.pending(&session_id, false);
    reply
}

/// Clear a session's turns and tell its sockets.
pub(crate) fn reset_session(app: &AppState, session_id: &str, session: &SharedSession) {
    lock(session).reset();
    app.broadcaster.reset(session_id);
    debug!("Session {session_id} reset");
}

// ── Status and catalog ─────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub availability: Availability,
    pub message: Option<String>,
    pub credential_mode: &'static str,
    pub model: String,
    pub exercises: usize,
    pub sessions: usize,
}

/// GET /api/status: Service availability.
pub async fn get_status(State(app): State<AppState>) -> Json<StatusResponse> {
    let availability = app.tutor.availability();
    let message = (!availability.is_ready())
        .then(|| app.tutor.policy().replies.catalog_unavailable.clone());
    Json(StatusResponse {
        availability,
        message,
        credential_mode: app.tutor.config().credential_source.label(),
        model: app.tutor.model().to_string(),
        exercises: app.tutor.catalog().map_or(0, |c| c.len()),
        sessions: app.sessions.len(),
    })
}

#[derive(Serialize)]
pub struct ExerciseSummary {
    pub id: String,
    pub function: String,
}

/// GET /api/exercises: Catalog listing for the exercise panel.
///
/// Returns 503 when the catalog failed to load.
pub async fn get_exercises(
    State(app): State<AppState>,
) -> Result<Json<Vec<ExerciseSummary>>, ApiError> {
    let catalog = app.tutor.catalog().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "catalog_unavailable",
            app.tutor.policy().replies.catalog_unavailable.as_str(),
        )
    })?;
    let listing = catalog
        .iter()
        .map(|r| ExerciseSummary {
            id: r.id.clone(),
            function: r.function.clone(),
        })
        .collect();
    Ok(Json(listing))
}

// ── Sessions ───────────────────────────────────────────────────────

/// POST /api/sessions: Open a session. The greeting is its first turn.
pub async fn create_session(State(app): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let (id, session) = app.sessions.create(&app.tutor);
    debug!("Session {id} created");
    let snapshot = app.snapshot(&id, &session);
    (
        StatusCode::CREATED,
        Json(json!({ "session_id": id, "snapshot": snapshot.to_json() })),
    )
}

/// GET /api/sessions/{id}: Session snapshot.
pub async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = app.session(&id)?;
    Ok(Json(app.snapshot(&id, &session).to_json()))
}

/// DELETE /api/sessions/{id}: Close a session. Returns 204.
///
/// A turn still in flight finishes on its own task and its reply is dropped
/// with the session.
pub async fn delete_session(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !app.sessions.remove(&id) {
        return Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "unknown_session",
            "no such session",
        ));
    }
    debug!("Session {id} closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for POST /api/sessions/{id}/chat.
#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub outcome: &'static str,
    pub credential_configured: bool,
}

/// POST /api/sessions/{id}/chat: Run one turn and return the reply.
///
/// Model failures still return 200 with the fallback text; only refused
/// turns (blank input, missing key, unavailable catalog) are errors.
pub async fn post_chat(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session = app.session(&id)?;
    let reply = run_turn(&app, &id, &session, &body.message)
        .await
        .map_err(|e| ApiError::from_send(&e, &app.tutor))?;
    let credential_configured = lock(&session).credential_configured();
    Ok(Json(ChatResponse {
        outcome: outcome_label(&reply.outcome),
        reply: reply.text,
        credential_configured,
    }))
}

/// POST /api/sessions/{id}/reset: Clear the turns. Returns 204.
pub async fn post_reset(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = app.session(&id)?;
    reset_session(&app, &id, &session);
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for POST /api/sessions/{id}/credential.
#[derive(Deserialize)]
pub struct CredentialRequest {
    #[serde(default)]
    pub api_key: String,
}

/// POST /api/sessions/{id}/credential: Validate and install an API key.
///
/// Returns 204 when the key was accepted, 400 for an empty key, 401 when
/// the provider refused it and 409 when keys are preconfigured.
pub async fn post_credential(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CredentialRequest>,
) -> Result<StatusCode, ApiError> {
    let session = app.session(&id)?;
    let provider = app
        .tutor
        .validate_credential(&body.api_key)
        .instrument(info_span!("credential", session_id = id.as_str()))
        .await
        .map_err(|e| ApiError::from_credential(&e, &app.tutor))?;
    lock(&session).install_provider(provider);
    app.broadcaster.credential(&id, true);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_deserializes() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"1"}"#).unwrap();
        assert_eq!(req.message, "1");
    }

    #[test]
    fn credential_request_defaults_to_empty_key() {
        let req: CredentialRequest = serde_json::from_str("{}").unwrap();
        assert!(req.api_key.is_empty());
    }

    #[test]
    fn error_body_carries_code_and_message() {
        let err = ApiError::new(StatusCode::CONFLICT, "busy", "a turn is already in progress");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
