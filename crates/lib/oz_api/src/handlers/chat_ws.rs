//! `GET /ws/chat-sessions/{session_id}/`: persistent per-session chat.
//!
//! The upgrade is always accepted. A rejected caller gets a single close
//! frame carrying the rejection code; an admitted one joins the session's
//! broadcast group until the socket ends.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use oz_core::auth::AuthError;
use oz_core::chat::{
    Admission, AuthorizedConnection, ChatError, ChatService, ConnectionAttempt, RejectReason,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::middleware::auth::resolve_caller;

/// Closed because persisting or fanning out a message failed.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Closed because the outbound queue overflowed.
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// What to do with an upgraded socket.
enum Verdict {
    Admit(AuthorizedConnection),
    Reject(RejectReason),
    Fail,
}

pub async fn chat_ws_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let verdict = admission_verdict(&state, &headers, session_id).await;
    let chat = state.chat.clone();
    ws.on_upgrade(move |socket| async move {
        match verdict {
            Verdict::Admit(authorized) => run_connection(chat, socket, authorized).await,
            Verdict::Reject(reason) => {
                close_socket(socket, reason.close_code(), reason.as_str()).await;
            }
            Verdict::Fail => close_socket(socket, CLOSE_INTERNAL_ERROR, "internal_error").await,
        }
    })
}

async fn admission_verdict(state: &AppState, headers: &HeaderMap, session_id: String) -> Verdict {
    let caller = match resolve_caller(state, headers).await {
        Ok(caller) => caller,
        Err(AuthError::Store(e)) => {
            error!(error = %e, "identity lookup failed during chat upgrade");
            return Verdict::Fail;
        }
        Err(e) => {
            debug!(error = %e, "chat upgrade with invalid credentials");
            None
        }
    };
    match state
        .chat
        .authorize(ConnectionAttempt::new(caller, session_id))
        .await
    {
        Ok(Admission::Authorized(authorized)) => Verdict::Admit(authorized),
        Ok(Admission::Rejected(reason)) => Verdict::Reject(reason),
        Err(e) => {
            error!(error = %e, "chat session lookup failed during upgrade");
            Verdict::Fail
        }
    }
}

async fn close_socket(mut socket: WebSocket, code: u16, reason: &'static str) {
    let _ = socket.send(close_message(code, reason)).await;
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

async fn run_connection(chat: ChatService, socket: WebSocket, authorized: AuthorizedConnection) {
    let (mut conn, outbound_rx) = chat.admit(authorized);
    let session_id = conn.membership().session_id();
    let connection_id = conn.membership().connection_id();
    let user_id = conn.authorized().caller.id;
    info!(%session_id, %connection_id, %user_id, "chat connection admitted");

    let (sink, mut stream) = socket.split();
    let (close_tx, close_rx) = oneshot::channel();
    let mut close_tx = Some(close_tx);
    let mut writer = tokio::spawn(write_loop(sink, outbound_rx, close_rx));
    let mut writer_done = false;

    loop {
        let incoming = tokio::select! {
            incoming = stream.next() => incoming,
            _ = &mut writer => {
                writer_done = true;
                break;
            }
        };
        match incoming {
            Some(Ok(Message::Text(text))) => match chat.relay(&mut conn, text.as_str()).await {
                Ok(_) => {}
                Err(ChatError::MalformedPayload(reason)) => {
                    debug!(%session_id, %connection_id, %reason, "dropping malformed chat frame");
                }
                Err(e) => {
                    error!(%session_id, %connection_id, error = %e, "chat relay failed, closing connection");
                    if let Some(tx) = close_tx.take() {
                        let _ = tx.send((CLOSE_INTERNAL_ERROR, "internal_error"));
                    }
                    break;
                }
            },
            Some(Ok(Message::Binary(_))) => {
                debug!(%session_id, %connection_id, "dropping binary chat frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(%session_id, %connection_id, error = %e, "chat socket read failed");
                break;
            }
        }
    }

    // Stop the writer before leaving the group so a normal close is not
    // mistaken for an eviction.
    drop(close_tx);
    if !writer_done {
        let _ = writer.await;
    }
    drop(conn);
    info!(%session_id, %connection_id, "chat connection closed");
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<String>,
    mut close_rx: oneshot::Receiver<(u16, &'static str)>,
) {
    loop {
        tokio::select! {
            biased;
            close = &mut close_rx => {
                if let Ok((code, reason)) = close {
                    let _ = sink.send(close_message(code, reason)).await;
                }
                return;
            }
            payload = outbound_rx.recv() => match payload {
                Some(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        return;
                    }
                }
                None => {
                    warn!("chat connection evicted as slow consumer");
                    let _ = sink
                        .send(close_message(CLOSE_POLICY_VIOLATION, "slow_consumer"))
                        .await;
                    return;
                }
            },
        }
    }
}
