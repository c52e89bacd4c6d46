//! # oz_api
//!
//! HTTP and WebSocket API library for Oz.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use oz_core::auth::AuthService;
use oz_core::chat::ChatService;
use oz_core::store::{AuthStore, ChatStore};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, chat, chat_ws, users};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub chat: ChatService,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Build both services over one store.
    pub fn new<S>(store: Arc<S>, config: ApiConfig) -> Self
    where
        S: AuthStore + ChatStore + 'static,
    {
        let auth = AuthService::new(store.clone(), config.auth.clone());
        let chat = ChatService::new(store);
        Self { auth, chat, config }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `oz_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    oz_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/check-email", post(auth::check_email_handler))
        // The socket authorizes itself and reports failures as close codes.
        .route("/ws/chat-sessions/{session_id}/", get(chat_ws::chat_ws_handler))
        .route("/ws/chat-sessions/{session_id}", get(chat_ws::chat_ws_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/tokens", get(auth::list_tokens_handler))
        .route(
            "/auth/tokens/{id}",
            get(auth::get_token_handler).delete(auth::delete_token_handler),
        )
        .route("/users/me", get(users::me_handler))
        .route("/users/{id}/password", patch(users::change_password_handler))
        .route(
            "/users/{id}/profile",
            get(users::get_profile_handler)
                .patch(users::update_profile_handler)
                .delete(users::delete_profile_handler),
        )
        .route(
            "/chat-sessions",
            get(chat::list_sessions_handler).post(chat::create_session_handler),
        )
        .route(
            "/chat-messages",
            get(chat::list_messages_handler).post(chat::create_message_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
