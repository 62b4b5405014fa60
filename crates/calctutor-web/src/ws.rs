//! WebSocket upgrade handler and message dispatch.
//!
//! A socket is opened on one session (`/ws/{id}`) and receives:
//! 1. A full [`SessionSnapshot`](crate::snapshot::SessionSnapshot) on connect.
//! 2. Every [`WsMessage`] broadcast for that session afterwards.
//!
//! Clients send `{"type":"chat","message":...}` or `{"type":"reset"}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use calctutor::tutor::SendError;
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{self, AppState};
use crate::broadcast::WsMessage;
use crate::sessions::SharedSession;

/// GET /ws/{id}: WebSocket upgrade handler. 404 for an unknown session.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(app): State<AppState>,
) -> Response {
    match app.session(&id) {
        Ok(session) => ws
            .on_upgrade(move |socket| handle_socket(socket, app, id, session))
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, app: AppState, id: String, session: SharedSession) {
    let (mut sink, mut stream) = socket.split();

    // Subscribe before the snapshot so nothing falls between the two.
    let mut broadcast_rx = app.broadcaster.subscribe();

    let snapshot_msg = WsMessage::Snapshot {
        data: app.snapshot(&id, &session).to_json(),
    };
    if ws_send(&mut sink, &snapshot_msg).await.is_err() {
        return;
    }

    debug!("WebSocket client connected to session {id}");

    // Forward this session's broadcast messages to the client.
    let forward_app = app.clone();
    let forward_id = id.clone();
    let forward_session = session.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(msg) => {
                    if msg.session_id() != Some(forward_id.as_str()) {
                        continue;
                    }
                    if ws_send(&mut sink, &msg).await.is_err() {
                        break; // Client disconnected.
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("WebSocket client lagged by {n} messages, resending snapshot");
                    let msg = WsMessage::Snapshot {
                        data: forward_app
                            .snapshot(&forward_id, &forward_session)
                            .to_json(),
                    };
                    if ws_send(&mut sink, &msg).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Handle incoming messages from this client.
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => handle_client_message(&text, &app, &id, &session),
            Message::Close(_) => break,
            _ => {} // Ignore binary, ping, pong.
        }
    }

    debug!("WebSocket client disconnected from session {id}");
    forward_task.abort();
}

/// Process a JSON message received from a client.
fn handle_client_message(text: &str, app: &AppState, id: &str, session: &SharedSession) {
    #[derive(serde::Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum ClientMessage {
        Chat { message: String },
        Reset,
    }

    let Ok(msg) = serde_json::from_str::<ClientMessage>(text) else {
        debug!("Ignoring malformed WebSocket message");
        return;
    };

    match msg {
        ClientMessage::Chat { message } => {
            // Run the turn off the read loop so the socket stays responsive.
            let app = app.clone();
            let id = id.to_string();
            let session = session.clone();
            tokio::spawn(async move {
                match api::run_turn(&app, &id, &session, &message).await {
                    Ok(_) | Err(SendError::BlankInput) => {}
                    Err(e) => {
                        let err = api::ApiError::from_send(&e, &app.tutor);
                        app.broadcaster.rejected(&id, err.code, &err.message);
                    }
                }
            });
        }
        ClientMessage::Reset => api::reset_session(app, id, session),
    }
}

/// Serialize a `WsMessage` and send it over the WebSocket sink.
async fn ws_send(sink: &mut SplitSink<WebSocket, Message>, msg: &WsMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).unwrap_or_default();
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
