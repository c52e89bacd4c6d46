//! Authentication request handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum_extra::extract::cookie::CookieJar;
use oz_core::auth::account::NewAccount;
use oz_core::auth::{IssuedTokens, TokenDelivery};
use uuid::Uuid;

use super::optional_json;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CheckEmailRequest, CheckEmailResponse, DetailResponse, LoginRequest, RefreshRequest,
    SessionTokenResponse, SignupRequest, SignupResponse, TokenResponse,
};
use crate::services::cookies::{REFRESH_COOKIE, clear_token_cookies, set_token_cookies};

/// Hand a freshly issued pair to the client per the configured delivery mode.
fn deliver(
    state: &AppState,
    jar: CookieJar,
    detail: &str,
    user_id: Uuid,
    tokens: &IssuedTokens,
) -> (CookieJar, Json<TokenResponse>) {
    let config = state.auth.config();
    match config.token_delivery {
        TokenDelivery::Body => (jar, Json(TokenResponse::new(detail, user_id, tokens, true))),
        TokenDelivery::Cookie => (
            set_token_cookies(jar, tokens, config),
            Json(TokenResponse::new(detail, user_id, tokens, false)),
        ),
    }
}

/// `POST /auth/signup`: create an identity and its profile.
pub async fn signup_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<SignupResponse>)> {
    let req: SignupRequest = optional_json(&body)?;
    let (identity, profile) = state
        .auth
        .signup(NewAccount {
            email: req.email.unwrap_or_default(),
            password: req.password.unwrap_or_default(),
            nickname: req.nickname.unwrap_or_default(),
            two_factor_enabled: req.two_factor_enabled,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            detail: "Signup successful".into(),
            id: identity.id,
            email: identity.email,
            nickname: profile.nickname,
            role: identity.role,
            is_active: identity.is_active,
            two_factor_enabled: identity.two_factor_enabled,
        }),
    ))
}

/// `POST /auth/login`: authenticate with email + password (+ two-factor code).
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let req: LoginRequest = optional_json(&body)?;
    let outcome = state
        .auth
        .login(
            req.email.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
            req.two_factor_code.as_deref(),
        )
        .await?;
    Ok(deliver(
        &state,
        jar,
        "Login successful",
        outcome.identity.id,
        &outcome.tokens,
    ))
}

/// `POST /auth/refresh`: rotate a refresh token taken from the body or the
/// refresh cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<TokenResponse>)> {
    let req: RefreshRequest = optional_json(&body)?;
    let token = req
        .refresh_token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_string()))
        .unwrap_or_default();

    let (identity, tokens) = state.auth.refresh(&token).await?;
    Ok(deliver(&state, jar, "Token refreshed", identity.id, &tokens))
}

/// `POST /auth/logout`: revoke every refresh token of the caller and clear
/// auth cookies. Requires authentication.
pub async fn logout_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<DetailResponse>)> {
    state.auth.revoke_all(user.0.id).await?;
    Ok((
        clear_token_cookies(jar, state.auth.config()),
        Json(DetailResponse::new("Successfully logged out")),
    ))
}

/// `POST /auth/check-email`: report whether an email is still unused.
pub async fn check_email_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<CheckEmailResponse>> {
    let req: CheckEmailRequest = optional_json(&body)?;
    let available = state
        .auth
        .email_available(req.email.as_deref().unwrap_or_default())
        .await?;
    let detail = if available {
        "Email is available"
    } else {
        "Email is already registered"
    };
    Ok(Json(CheckEmailResponse {
        available,
        detail: detail.into(),
    }))
}

fn record_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Token not found".into()))
}

/// `GET /auth/tokens`: the caller's active refresh-token records.
pub async fn list_tokens_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<Vec<SessionTokenResponse>>> {
    let records = state.auth.session_tokens(&user.0).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// `GET /auth/tokens/{id}`
pub async fn get_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionTokenResponse>> {
    let record = state.auth.session_token(&user.0, record_id(&id)?).await?;
    Ok(Json(record.into()))
}

/// `DELETE /auth/tokens/{id}`: revoke one refresh token (single-device logout).
pub async fn delete_token_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<DetailResponse>> {
    state.auth.revoke_token(&user.0, record_id(&id)?).await?;
    Ok(Json(DetailResponse::new("Token revoked")))
}
