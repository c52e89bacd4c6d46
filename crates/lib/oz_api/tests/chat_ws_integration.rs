//! Integration tests: real sockets against `axum::serve` on an ephemeral port.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::http::{Method, StatusCode};
use common::{app, call, signup_and_login};
use futures_util::{SinkExt, StreamExt};
use oz_core::auth::TokenDelivery;
use oz_core::store::{ChatStore, MemoryStore};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, session_id: &str, bearer: Option<&str>) -> Socket {
    let url = format!("ws://{addr}/ws/chat-sessions/{session_id}/");
    let mut req = url.into_client_request().unwrap();
    if let Some(token) = bearer {
        req.headers_mut().insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
    }
    let (socket, _) = connect_async(req).await.expect("upgrade");
    socket
}

/// Next frame, with a timeout so a missing frame fails instead of hanging.
async fn next_frame(socket: &mut Socket) -> Message {
    tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("socket error")
}

async fn expect_close(socket: &mut Socket) -> u16 {
    match next_frame(socket).await {
        Message::Close(Some(frame)) => u16::from(frame.code),
        other => panic!("expected close frame, got {other:?}"),
    }
}

async fn expect_text(socket: &mut Socket) -> Value {
    match next_frame(socket).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn create_session(app: &Router, access: &str, title: &str) -> String {
    let reply = call(
        app,
        Method::POST,
        "/chat-sessions",
        Some(access),
        None,
        Some(json!({ "title": title })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    reply.body["id"].as_str().unwrap().to_string()
}

async fn setup() -> (Router, std::sync::Arc<MemoryStore>, SocketAddr) {
    let (app, store) = app(TokenDelivery::Body);
    let addr = serve(app.clone()).await;
    (app, store, addr)
}

#[tokio::test]
async fn owner_only_and_broadcast_to_self() {
    let (app, store, addr) = setup().await;
    let (u1, u1_access, _) = signup_and_login(&app, "u1@example.com").await;
    let (_, u2_access, _) = signup_and_login(&app, "u2@example.com").await;
    let s1 = create_session(&app, &u1_access, "s1").await;

    let mut intruder = connect(addr, &s1, Some(&u2_access)).await;
    assert_eq!(expect_close(&mut intruder).await, 4403);

    let mut owner = connect(addr, &s1, Some(&u1_access)).await;
    owner.send(Message::text(r#"{"message":"hi"}"#)).await.unwrap();
    assert_eq!(expect_text(&mut owner).await, json!({ "message": "hi" }));

    let session_id = s1.parse().unwrap();
    let stored = store.list_chat_messages(session_id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "hi");
    assert_eq!(stored[0].user_id.to_string(), u1);
    assert_eq!(stored[0].sender.as_str(), "user");
}

#[tokio::test]
async fn rejection_close_codes() {
    let (app, _, addr) = setup().await;
    let (_, access, _) = signup_and_login(&app, "rej@example.com").await;
    let session = create_session(&app, &access, "mine").await;

    let mut anonymous = connect(addr, &session, None).await;
    assert_eq!(expect_close(&mut anonymous).await, 4401);

    let mut garbage = connect(addr, &session, Some("not-a-token")).await;
    assert_eq!(expect_close(&mut garbage).await, 4401);

    let unknown = uuid::Uuid::new_v4().to_string();
    let mut missing = connect(addr, &unknown, Some(&access)).await;
    assert_eq!(expect_close(&mut missing).await, 4404);

    let mut malformed = connect(addr, "not-a-uuid", Some(&access)).await;
    assert_eq!(expect_close(&mut malformed).await, 4404);
}

#[tokio::test]
async fn order_is_preserved_for_every_member() {
    let (app, store, addr) = setup().await;
    let (_, access, _) = signup_and_login(&app, "order@example.com").await;
    let session = create_session(&app, &access, "ordered").await;

    let mut sender = connect(addr, &session, Some(&access)).await;
    let mut watcher = connect(addr, &session, Some(&access)).await;

    // Make sure the watcher has joined before anything is sent.
    sender.send(Message::text(r#"{"message":"sync"}"#)).await.unwrap();
    assert_eq!(expect_text(&mut sender).await["message"], "sync");
    assert_eq!(expect_text(&mut watcher).await["message"], "sync");

    for body in ["a", "b", "c"] {
        sender
            .send(Message::text(json!({ "message": body }).to_string()))
            .await
            .unwrap();
    }
    for socket in [&mut sender, &mut watcher] {
        for body in ["a", "b", "c"] {
            assert_eq!(expect_text(socket).await["message"], body);
        }
    }

    let stored = store
        .list_chat_messages(session.parse().unwrap())
        .await
        .unwrap();
    let bodies: Vec<&str> = stored.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(bodies, ["sync", "a", "b", "c"]);
    assert!(stored.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn malformed_frames_keep_the_connection_open() {
    let (app, store, addr) = setup().await;
    let (_, access, _) = signup_and_login(&app, "junk@example.com").await;
    let session = create_session(&app, &access, "junk").await;

    let mut socket = connect(addr, &session, Some(&access)).await;
    socket.send(Message::text("not json")).await.unwrap();
    socket.send(Message::text(r#"{"text":"wrong key"}"#)).await.unwrap();
    socket.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    socket.send(Message::text(r#"{"message":"ok"}"#)).await.unwrap();

    assert_eq!(expect_text(&mut socket).await, json!({ "message": "ok" }));
    let stored = store
        .list_chat_messages(session.parse().unwrap())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}
