//! Browser-facing chat service for the calculus tutor.
//!
//! `calctutor-web` wraps a [`Tutor`] in an axum server: a REST API for
//! sessions, credentials and turns, plus a per-session WebSocket that pushes
//! every turn as it is recorded. Any static page can sit in front of it.
//!
//! # Quick start
//!
//! ```ignore
//! use calctutor::prelude::*;
//! use calctutor_web::{WebConfig, WsMessage, spawn_web};
//! use std::sync::Arc;
//!
//! let tutor = Arc::new(Tutor::from_config(TutorConfig::default())?);
//! let (ws_tx, _) = tokio::sync::broadcast::channel::<WsMessage>(256);
//!
//! let addr = spawn_web(tutor, ws_tx, WebConfig::default()).await?;
//! println!("Web UI: http://{addr}");
//! ```
//!
//! # Architecture
//!
//! ```text
//! browser ──POST /api/sessions/{id}/chat──▶ TutorSession::begin_turn ─▶ Gateway ─▶ provider
//!    ▲                                        │                            │
//!    └──────────── /ws/{id} ◀── WsMessage ◀───┴──── finish_turn ◀─────────┘
//! ```
//!
//! Sessions are kept in memory only. They are dropped on `DELETE`, after a
//! period of disuse, or when the process exits.

use std::time::Duration;

mod api;
pub mod broadcast;
mod server;
pub mod sessions;
pub mod snapshot;
mod ws;

pub use broadcast::{SessionBroadcaster, WsMessage};
pub use snapshot::SessionSnapshot;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use calctutor::logs::LogBuffer;
use calctutor::tutor::Tutor;

use crate::api::AppState;
use crate::sessions::{DEFAULT_SESSION_IDLE_TIMEOUT, SessionRegistry};

/// Configuration for the web server.
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3001`.
    pub bind_addr: SocketAddr,
    /// Directory with the chat page and its assets.
    ///
    /// If `None`, only API/WS endpoints are served.
    pub static_dir: Option<PathBuf>,
    /// Captured log lines surfaced in session snapshots. Default: an empty
    /// buffer that nothing writes to.
    pub logs: LogBuffer,
    /// Sessions unused for longer than this are evicted when a new one is
    /// opened. Default: one hour.
    pub session_idle_timeout: Duration,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            static_dir: None,
            logs: LogBuffer::default(),
            session_idle_timeout: DEFAULT_SESSION_IDLE_TIMEOUT,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// The server runs until the Tokio runtime shuts down.
///
/// # Arguments
///
/// * `tutor`: Shared tutor context; every session is opened on it.
/// * `broadcast_tx`: Sender half of the WebSocket broadcast channel.
///   Subscribe to it to observe session events outside the server.
/// * `config`: Server configuration.
pub async fn spawn_web(
    tutor: Arc<Tutor>,
    broadcast_tx: tokio::sync::broadcast::Sender<WsMessage>,
    config: WebConfig,
) -> Result<SocketAddr, String> {
    let app = AppState {
        tutor,
        sessions: Arc::new(SessionRegistry::with_idle_timeout(
            config.session_idle_timeout,
        )),
        broadcaster: SessionBroadcaster::new(broadcast_tx),
        logs: config.logs,
    };
    let router = server::build_router(app, config.static_dir);
    server::start_server(router, config.bind_addr).await
}
