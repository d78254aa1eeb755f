//! Channel connection lifecycle.
//!
//! Flow:
//! 1. Client upgrades at `server.channel_path`, with credentials either in
//!    an `Authorization: Basic` header or as `?auth=<base64 user:pass>`
//! 2. Gateway resolves the role the same way the basic-auth gate does.
//!    Unauthorized connections get a `rejected` frame and are closed
//! 3. Open: gateway sends `welcome`, then relays role-filtered backend
//!    events; client sends `command` and `ping` frames
//! 4. Closing on client disconnect, idle timeout or a close request from
//!    the registry (backend loss, shutdown).  The backend subscription is
//!    released exactly once, when the connection task ends

use std::time::{Duration, Instant};

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use ng_backend::Subscription;
use ng_domain::config::MAX_TTL_SECS;
use ng_domain::trace::TraceEvent;
use ng_protocol::{BackendEvent, ClientMessage, CloseReason, Role, ServerMessage, Topic};

use crate::state::AppState;

/// How long a closing connection's writer may take to flush.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle states of a channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Authorizing,
    Open,
    Closing,
    Closed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query params
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
pub struct ChannelQuery {
    /// base64 `user:password`, for clients that cannot set headers on the
    /// upgrade request.
    pub auth: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET `<channel_path>`: upgrade to WebSocket.
///
/// The upgrade always completes; authorization happens on the open socket
/// so a rejection can carry a reason frame.
pub async fn channel_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    ws.on_upgrade(move |socket| run_connection(socket, state, authorization, query.auth))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_connection(
    socket: WebSocket,
    state: AppState,
    authorization: Option<String>,
    query_auth: Option<String>,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let mut phase = ChannelState::Connecting;
    tracing::debug!(connection_id = %connection_id, state = ?phase, "channel upgraded");

    let (mut ws_sink, ws_stream) = socket.split();

    // ── Authorizing ──────────────────────────────────────────────────
    phase = ChannelState::Authorizing;
    tracing::debug!(connection_id = %connection_id, state = ?phase, "authorizing channel");
    let decision = match authorization.as_deref() {
        Some(h) => state.gate.resolve(Some(h)),
        None => state.gate.resolve_encoded_pair(query_auth.as_deref()),
    };
    if !decision.granted {
        TraceEvent::ChannelRejected {
            connection_id: connection_id.clone(),
            reason: "invalid or missing credentials".into(),
        }
        .emit();
        let rejected = ServerMessage::Rejected {
            reason: "invalid or missing credentials".into(),
        };
        let _ = send_ws_message(&mut ws_sink, &rejected).await;
        let _ = ws_sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: CloseReason::Unauthorized.as_str().into(),
            })))
            .await;
        phase = ChannelState::Closed;
        tracing::debug!(connection_id = %connection_id, state = ?phase, "channel rejected");
        return;
    }
    let role = decision.role;

    // ── Open ─────────────────────────────────────────────────────────
    let mut subscription = state.hub.subscribe();
    let close_rx = state.channels.register(&connection_id, role);
    let opened_at = Instant::now();

    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(state.config.channel.outbound_buffer);
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(write_loop(ws_sink, out_rx, writer_done.clone()));

    let welcome = ServerMessage::Welcome {
        connection_id: connection_id.clone(),
        role,
        topics: state.visibility.topics_for(role),
        gateway_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let _ = out_tx.send(welcome).await;

    phase = ChannelState::Open;
    tracing::debug!(connection_id = %connection_id, state = ?phase, role = %role, "channel open");
    TraceEvent::ChannelOpened {
        connection_id: connection_id.clone(),
        role: role.to_string(),
    }
    .emit();

    let conn = Connection {
        id: connection_id.clone(),
        role,
        state: state.clone(),
        out_tx: out_tx.clone(),
    };
    let reason = conn
        .open_loop(ws_stream, &mut subscription, close_rx)
        .await;

    // ── Closing ──────────────────────────────────────────────────────
    phase = ChannelState::Closing;
    tracing::debug!(connection_id = %connection_id, state = ?phase, reason = %reason, "channel closing");
    state.channels.deregister(&connection_id);
    subscription.release();

    if reason != CloseReason::ClientDisconnect {
        let _ = out_tx.try_send(ServerMessage::Closing { reason });
    }
    drop(out_tx);
    drop(conn);
    writer_done.cancel();
    let mut writer = writer;
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        // Stuck on a client that does not read.
        writer.abort();
        tracing::debug!(connection_id = %connection_id, "channel writer aborted");
    }

    phase = ChannelState::Closed;
    tracing::debug!(connection_id = %connection_id, state = ?phase, "channel closed");
    TraceEvent::ChannelClosed {
        connection_id,
        role: role.to_string(),
        reason: reason.to_string(),
        open_secs: opened_at.elapsed().as_secs() as i64,
    }
    .emit();
}

struct Connection {
    id: String,
    role: Role,
    state: AppState,
    out_tx: mpsc::Sender<ServerMessage>,
}

impl Connection {
    /// Runs until something closes the connection and returns why.
    async fn open_loop(
        &self,
        mut ws_stream: SplitStream<WebSocket>,
        subscription: &mut Subscription,
        mut close_rx: oneshot::Receiver<CloseReason>,
    ) -> CloseReason {
        let idle = Duration::from_secs(
            self.state
                .config
                .channel
                .idle_timeout_secs
                .min(MAX_TTL_SECS),
        );
        let idle_deadline = tokio::time::sleep(idle);
        tokio::pin!(idle_deadline);

        loop {
            tokio::select! {
                biased;

                requested = &mut close_rx => {
                    return requested.unwrap_or(CloseReason::Shutdown);
                }
                _ = &mut idle_deadline => return CloseReason::IdleTimeout,
                inbound = ws_stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        idle_deadline.as_mut().reset(tokio::time::Instant::now() + idle);
                        self.handle_text(&text);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        return CloseReason::ClientDisconnect;
                    }
                    Some(Ok(_)) => {
                        // Binary and WS-level ping/pong still count as activity.
                        idle_deadline.as_mut().reset(tokio::time::Instant::now() + idle);
                    }
                },
                event = subscription.recv() => match event {
                    Some(event) => {
                        if let Err(reason) = self.deliver(&event) {
                            return reason;
                        }
                    }
                    None => return CloseReason::Shutdown,
                },
            }
        }
    }

    /// Queue one event if the role may see it.  Never waits on the client:
    /// a full queue ends the connection as a slow consumer.
    fn deliver(&self, event: &BackendEvent) -> Result<(), CloseReason> {
        let Some(payload) = self.state.visibility.payload_for(self.role, event) else {
            return Ok(());
        };
        let msg = ServerMessage::Event {
            topic: event.topic,
            at: event.at,
            payload,
        };
        match self.out_tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.id, "outbound queue full, closing channel");
                Err(CloseReason::SlowConsumer)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CloseReason::ClientDisconnect),
        }
    }

    fn handle_text(&self, text: &str) {
        let msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "ignoring unparseable message");
                return;
            }
        };

        match msg {
            ClientMessage::Ping { timestamp } => {
                let _ = self.out_tx.try_send(ServerMessage::Pong { timestamp });
            }
            ClientMessage::Command { id, method, params } => {
                if !self.state.visibility.may_command(self.role, &method) {
                    let _ = self.out_tx.try_send(ServerMessage::CommandResult {
                        id,
                        method,
                        ok: false,
                        result: None,
                        error: Some("command not permitted for this role".into()),
                    });
                    return;
                }
                self.spawn_command(id, method, params);
            }
        }
    }

    /// Fire-and-forget: the result goes back to this connection and a
    /// summary is broadcast on the `command` topic.
    fn spawn_command(&self, id: Option<String>, method: String, params: Value) {
        let backend = self.state.backend.clone();
        let hub = self.state.hub.clone();
        let out_tx = self.out_tx.clone();
        let connection_id = self.id.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = backend.call(&method, params).await;
            let ok = outcome.is_ok();

            TraceEvent::CommandForwarded {
                connection_id: connection_id.clone(),
                method: method.clone(),
                ok,
                duration_ms: started.elapsed().as_millis() as u64,
            }
            .emit();

            hub.publish(BackendEvent::new(
                Topic::Command,
                json!({ "connection_id": connection_id, "method": method, "ok": ok }),
            ));

            let reply = match outcome {
                Ok(result) => ServerMessage::CommandResult {
                    id,
                    method,
                    ok: true,
                    result: Some(result),
                    error: None,
                },
                Err(e) => ServerMessage::CommandResult {
                    id,
                    method,
                    ok: false,
                    result: None,
                    error: Some(e.to_string()),
                },
            };
            // The connection may have closed meanwhile.
            let _ = out_tx.send(reply).await;
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forwards queued frames to the socket.  Once `done` fires, whatever is
/// already queued is flushed and the socket is closed.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMessage>,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            msg = out_rx.recv() => match msg {
                Some(msg) => {
                    if send_ws_message(&mut sink, &msg).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = done.cancelled() => {
                while let Ok(msg) = out_rx.try_recv() {
                    if send_ws_message(&mut sink, &msg).await.is_err() {
                        return;
                    }
                }
                break;
            }
        }
    }
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await;
}

async fn send_ws_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &ServerMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
