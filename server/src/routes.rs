//! HTTP bootstrap routes and the per-connection WebSocket plumbing.
//!
//! Bootstrap is plain request/response: `/join` hands out a fresh session,
//! `/ping/{id}` and `/update/{id}` refresh it (one handler, two names),
//! `/leave/{id}` removes it. `/ws/{id}` upgrades to the persistent duplex
//! connection that carries envelopes.
//!
//! All routes are GETs so the relay can be poked from a browser.

use crate::broadcast::BroadcastRouter;
use crate::registry::{RegistryError, SessionRegistry};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;
use shared::{Envelope, Message, Session, SessionReply};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Handles shared by every route handler and connection task.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RwLock<SessionRegistry>>,
    pub router: Arc<BroadcastRouter>,
    /// Producer side of the relay-wide inbound queue the reconciler drains.
    pub inbound_tx: mpsc::UnboundedSender<Envelope>,
}

impl AppState {
    pub fn new(
        registry: Arc<RwLock<SessionRegistry>>,
        router: Arc<BroadcastRouter>,
        inbound_tx: mpsc::UnboundedSender<Envelope>,
    ) -> Self {
        Self {
            registry,
            router,
            inbound_tx,
        }
    }

    /// Removes the session and enqueues its disconnect notice, but only on
    /// the first removal. The leave request and the transport disconnect
    /// both funnel through here, so whichever lands second is a no-op and
    /// exactly one notice reaches the reconciler.
    pub async fn retire_session(&self, session_id: &str) -> Option<Session> {
        let removed = self.registry.write().await.remove(session_id);
        match removed {
            Ok(session) => {
                let notice = Envelope::new(session_id, Message::DisconnectNotice);
                if self.inbound_tx.send(notice).is_err() {
                    warn!("Inbound queue closed; disconnect notice for {} dropped", session_id);
                }
                Some(session)
            }
            Err(_) => None,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/join", get(join))
        .route("/ping/{id}", get(refresh))
        .route("/update/{id}", get(refresh))
        .route("/leave/{id}", get(leave))
        .route("/ws/{id}", get(ws_upgrade))
        .with_state(state)
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "hello": "world" }))
}

#[derive(Debug, Deserialize)]
struct JoinParams {
    requested_name: Option<String>,
}

async fn join(
    State(state): State<AppState>,
    Query(params): Query<JoinParams>,
) -> Json<SessionReply> {
    let mut registry = state.registry.write().await;
    loop {
        let id = Uuid::new_v4().to_string();
        let display_name = params.requested_name.clone().unwrap_or_else(|| id.clone());
        match registry.register(id, display_name) {
            Ok(session) => {
                return Json(SessionReply {
                    session: Some(session),
                })
            }
            // uuid collision: roll a fresh identifier instead of reusing
            Err(e @ RegistryError::DuplicateSession(_)) => debug!("Regenerating session id: {}", e),
            Err(e) => {
                warn!("Join rejected: {}", e);
                return Json(SessionReply { session: None });
            }
        }
    }
}

async fn refresh(State(state): State<AppState>, Path(id): Path<String>) -> Json<SessionReply> {
    let session = state.registry.write().await.touch(&id).ok();
    if session.is_none() {
        debug!("Refresh for unknown session {}", id);
    }
    Json(SessionReply { session })
}

async fn leave(State(state): State<AppState>, Path(id): Path<String>) -> Json<SessionReply> {
    let session = state.retire_session(&id).await;
    Json(SessionReply { session })
}

async fn ws_upgrade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // The id should come from /join, but the binding is not enforced.
    if state.registry.read().await.get(&id).is_none() {
        warn!("WebSocket connect for unregistered session {}", id);
    }
    ws.on_upgrade(move |socket| handle_socket(state, id, socket))
}

/// Runs one connection: a write task draining the session's outbound
/// channel, and a read loop decoding frames into the inbound queue.
async fn handle_socket(state: AppState, session_id: String, socket: WebSocket) {
    info!("Connection open for session {}", session_id);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Arc<String>>();
    state.router.add(session_id.clone(), outbound_tx).await;

    let (mut sink, mut stream) = socket.split();

    let writer_id = session_id.clone();
    let write_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = frame.as_str().to_owned();
            if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                debug!("Write to session {} failed: {}", writer_id, e);
                break;
            }
        }
    });

    // Frames from one connection are processed in arrival order.
    while let Some(result) = stream.next().await {
        match result {
            Ok(WsMessage::Text(raw)) => {
                let envelope = shared::decode(raw.as_str());
                match envelope.body {
                    Message::PositionReport(_) => {
                        // A connection speaks only for the id it upgraded
                        // under; frames claiming another session are dropped.
                        if envelope.session_id != session_id {
                            warn!(
                                "Dropping report claiming {} on connection {}",
                                envelope.session_id, session_id
                            );
                            continue;
                        }
                        if state.inbound_tx.send(envelope).is_err() {
                            warn!("Inbound queue closed; dropping connection {}", session_id);
                            break;
                        }
                    }
                    Message::Unrecognized(ref raw) => {
                        warn!("Unrecognized frame from {}: {:?}", session_id, raw);
                    }
                    other => {
                        debug!("Ignoring {} frame from {}", kind_name(&other), session_id);
                    }
                }
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read error on session {}: {}", session_id, e);
                break;
            }
        }
    }

    // Transport-level disconnect: the one trusted signal for reclaiming the
    // session. The explicit leave route may already have retired it, in
    // which case this is a no-op.
    info!("Connection closed for session {}", session_id);
    state.router.remove(&session_id).await;
    state.retire_session(&session_id).await;
    write_task.await.ok();
}

fn kind_name(message: &Message) -> &'static str {
    match message {
        Message::PositionReport(_) => "position-report",
        Message::AllPositionsSnapshot(_) => "all-positions-snapshot",
        Message::DisconnectNotice => "disconnect-notice",
        Message::Unrecognized(_) => "unrecognized",
    }
}
