//! User account handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use oz_core::auth::account::ProfileEdit;
use uuid::Uuid;

use super::optional_json;
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    ChangePasswordRequest, DetailResponse, MeResponse, ProfileResponse, UpdateProfileRequest,
};

/// A malformed id cannot name an existing user.
fn user_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("User not found".into()))
}

/// `GET /users/me`: the caller's identity and profile.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<MeResponse>> {
    let profile = state.auth.profile(user.0.id).await?;
    Ok(Json(MeResponse::new(user.0, profile)))
}

/// `PATCH /users/{id}/password`: change the caller's own password.
pub async fn change_password_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<DetailResponse>> {
    let req: ChangePasswordRequest = optional_json(&body)?;
    let target = user_id(&id)?;

    state
        .auth
        .change_password(
            &user.0,
            target,
            req.current_password.as_deref().unwrap_or_default(),
            req.new_password.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok(Json(DetailResponse::new("Password changed successfully")))
}

/// `GET /users/{id}/profile`
pub async fn get_profile_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<ProfileResponse>> {
    let profile = state.auth.owned_profile(&user.0, user_id(&id)?).await?;
    Ok(Json(profile.into()))
}

/// `PATCH /users/{id}/profile`: change nickname and/or image.
pub async fn update_profile_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<ProfileResponse>> {
    let req: UpdateProfileRequest = optional_json(&body)?;
    let target = user_id(&id)?;
    let profile = state
        .auth
        .update_profile(
            &user.0,
            target,
            ProfileEdit {
                nickname: req.nickname,
                profile_image_url: req.profile_image_url,
            },
        )
        .await?;
    Ok(Json(profile.into()))
}

/// `DELETE /users/{id}/profile`
pub async fn delete_profile_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> AppResult<Json<DetailResponse>> {
    state.auth.delete_profile(&user.0, user_id(&id)?).await?;
    Ok(Json(DetailResponse::new("Profile deleted")))
}
