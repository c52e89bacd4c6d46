//! Authentication middleware: resolves the caller from the bearer header or
//! the access cookie.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use oz_core::auth::AuthError;
use oz_core::models::auth::Identity;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ACCESS_COOKIE;

/// The resolved caller, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

/// Resolve the caller of a request without requiring one.
///
/// `Ok(None)` means no credential was presented at all.
pub async fn resolve_caller(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<Identity>, AuthError> {
    let authorization = headers.get(AUTHORIZATION).map(|v| v.to_str().unwrap_or_default());
    let jar = CookieJar::from_headers(headers);
    let cookie = jar.get(ACCESS_COOKIE).map(|c| c.value());
    state.auth.resolve(authorization, cookie).await
}

/// Axum middleware: rejects anonymous or invalid callers with 401 and injects
/// [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = resolve_caller(&state, request.headers())
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("Authentication credentials were not provided".into())
        })?;

    request.extensions_mut().insert(AuthenticatedUser(identity));
    Ok(next.run(request).await)
}
