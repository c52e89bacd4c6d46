//! Shared helpers for the API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use oz_api::{AppState, config::ApiConfig};
use oz_core::auth::{AuthConfig, TokenDelivery};
use oz_core::store::MemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

pub fn test_config(delivery: TokenDelivery) -> ApiConfig {
    ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        database_url: String::new(),
        auth: AuthConfig {
            bcrypt_cost: 4,
            token_delivery: delivery,
            ..AuthConfig::new("integration-secret")
        },
    }
}

/// Router over a fresh in-memory store.
pub fn app(delivery: TokenDelivery) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), test_config(delivery));
    (oz_api::router(state), store)
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send one request through the router.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn signup(app: &Router, email: &str, two_factor: bool) -> Value {
    let reply = call(
        app,
        Method::POST,
        "/auth/signup",
        None,
        None,
        Some(json!({
            "email": email,
            "password": PASSWORD,
            "nickname": "tester",
            "two_factor_enabled": two_factor,
        })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body
}

/// Sign up and log in (body delivery). Returns `(user_id, access, refresh)`.
pub async fn signup_and_login(app: &Router, email: &str) -> (String, String, String) {
    signup(app, email, false).await;
    let reply = call(
        app,
        Method::POST,
        "/auth/login",
        None,
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    (
        reply.body["user_id"].as_str().unwrap().to_string(),
        reply.body["access_token"].as_str().unwrap().to_string(),
        reply.body["refresh_token"].as_str().unwrap().to_string(),
    )
}

/// `name=value` pairs from every `Set-Cookie` header.
pub fn set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
