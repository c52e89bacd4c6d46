//! Chat history handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use super::optional_json;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ChatMessageResponse, ChatMessagesQuery, ChatSessionResponse, CreateChatMessageRequest,
    CreateChatSessionRequest,
};

/// `GET /chat-sessions`: the caller's sessions, newest first.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<ChatSessionResponse>>> {
    let sessions = state.chat.list_sessions(&user.0).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// `POST /chat-sessions`: create a session owned by the caller.
pub async fn create_session_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ChatSessionResponse>)> {
    let body: CreateChatSessionRequest = optional_json(&body)?;
    let session = state
        .chat
        .create_session(&user.0, body.title.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// `GET /chat-messages?session_id=`: a session's history in timestamp order.
pub async fn list_messages_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Query(query): Query<ChatMessagesQuery>,
) -> AppResult<Json<Vec<ChatMessageResponse>>> {
    let messages = state
        .chat
        .list_messages(&user.0, query.session_id.as_deref())
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// `POST /chat-messages`: append a message to one of the caller's sessions.
pub async fn create_message_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<ChatMessageResponse>)> {
    let body: CreateChatMessageRequest = optional_json(&body)?;
    let session_id = body
        .session
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("session is required".into()))?;
    let session_id = Uuid::parse_str(session_id)
        .map_err(|_| AppError::Validation("session must be a valid id".into()))?;

    let message = state
        .chat
        .post_message(&user.0, session_id, body.message.as_deref().unwrap_or_default())
        .await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}
