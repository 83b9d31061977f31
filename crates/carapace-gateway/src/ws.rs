//! The WebSocket data plane.
//!
//! One connection serves one session. The socket is split into a reader
//! task (frames → typed inbound queue) and a writer task (typed outbound
//! queue → frames); [`WsChannel`] wraps the two queues as a
//! [`Channel`], which is what the approval gate and the agent loop see.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use async_trait::async_trait;
use carapace_core::{
    Channel, ClientMessage, CoreError, CoreResult, HistoryEntry, ServerMessage, SessionId,
};

use crate::commands::handle_command;
use crate::routes::bearer_token;
use crate::state::AppState;

const QUEUE_DEPTH: usize = 64;

/// A [`Channel`] over the per-connection message queues.
pub struct WsChannel {
    outbound: mpsc::Sender<ServerMessage>,
    inbound: Mutex<mpsc::Receiver<ClientMessage>>,
}

impl WsChannel {
    /// Wrap an outbound sender and inbound receiver.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<ServerMessage>, inbound: mpsc::Receiver<ClientMessage>) -> Self {
        Self {
            outbound,
            inbound: Mutex::new(inbound),
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn send(&self, message: ServerMessage) -> CoreResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| CoreError::ChannelClosed)
    }

    async fn receive(&self) -> Option<ClientMessage> {
        self.inbound.lock().await.recv().await
    }

    async fn close(&self) {
        self.inbound.lock().await.close();
    }
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct WsQuery {
    token: Option<String>,
}

/// `GET /chat/{id}`: authenticated WebSocket upgrade.
///
/// The token is taken from the `token` query parameter or the
/// `Authorization` header of the upgrade request.
pub(crate) async fn ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorized = query.token.as_deref() == Some(state.token.as_str())
        || bearer_token(&headers) == Some(state.token.as_str());
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let session_id = SessionId(id);
    if state.sessions.load_state(&session_id).is_err() {
        return StatusCode::NOT_FOUND.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: SessionId) {
    info!(session_id = %session_id, "websocket connected");
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(QUEUE_DEPTH);
    let (in_tx, in_rx) = mpsc::channel::<ClientMessage>(QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(frame) = message.to_frame() else {
                continue;
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let parse_errors = out_tx.clone();
    let reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let Ok(message) = frame else { break };
            match message {
                Message::Text(text) => match ClientMessage::parse(&text) {
                    Ok(parsed) => {
                        if in_tx.send(parsed).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = parse_errors
                            .send(ServerMessage::Error {
                                detail: format!("invalid message: {e}"),
                            })
                            .await;
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        // Dropping in_tx drains receive() to None: the connection loop and
        // any pending approval wait observe the disconnect.
    });

    let channel = WsChannel::new(out_tx, in_rx);
    connection_loop(&state, session_id, &channel).await;

    channel.close().await;
    reader.abort();
    drop(channel);
    let _ = writer.await;
}

/// Serve one connection: slash commands inline, agent turns under the
/// session lock.
async fn connection_loop(state: &AppState, mut session_id: SessionId, channel: &WsChannel) {
    loop {
        let Some(message) = channel.receive().await else {
            info!(session_id = %session_id, "websocket disconnected");
            return;
        };

        let input = match message {
            ClientMessage::Message { content } => content.trim().to_string(),
            ClientMessage::Command { name, args } => {
                let mut line = format!("/{name}");
                if !args.is_empty() {
                    line.push(' ');
                    line.push_str(&args.join(" "));
                }
                line
            }
            ClientMessage::ApprovalResponse { tool_call_id, .. } => {
                // No approval is pending outside a turn; discard late ones.
                debug!(session_id = %session_id, %tool_call_id, "discarding approval response with no pending request");
                continue;
            }
        };

        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            let reply = handle_command(state, &session_id, &input).await;
            let _ = channel.send(reply.message).await;
            if let Some(new_id) = reply.switch_to {
                session_id = new_id;
            }
            if reply.disconnect {
                return;
            }
            continue;
        }

        run_turn(state, &session_id, channel, &input).await;
    }
}

async fn run_turn(state: &AppState, session_id: &SessionId, channel: &WsChannel, input: &str) {
    let mut handle = match state.sessions.open(session_id).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "failed to open session for turn");
            let _ = channel
                .send(ServerMessage::Error {
                    detail: e.to_string(),
                })
                .await;
            return;
        }
    };

    let outcome = state
        .agent
        .run_turn(&state.gate, &state.sessions, &mut handle, channel, input)
        .await;

    if let Err(e) = state.sessions.touch(&mut handle) {
        warn!(session_id = %session_id, error = %e, "failed to touch session");
    }

    match outcome {
        Ok(reply) => {
            let _ = channel.send(ServerMessage::Done { content: reply }).await;
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "agent turn failed");
            if let Err(append_err) = state
                .sessions
                .append_history(session_id, &HistoryEntry::error(e.to_string()))
            {
                warn!(error = %append_err, "failed to record turn error");
            }
            let _ = channel
                .send(ServerMessage::Error {
                    detail: e.to_string(),
                })
                .await;
        }
    }
}
