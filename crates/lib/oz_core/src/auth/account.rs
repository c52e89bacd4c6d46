//! Account operations: signup, email availability, password change, profile.
//!
//! Operations on another identity's records answer `Forbidden`; a missing
//! target answers `NotFound` first.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::password::{check_password_strength, hash_password, verify_password};
use super::{AuthError, AuthService};
use crate::models::auth::{
    Identity, NewIdentity, ProfileUpdate, Role, UserProfile, normalize_email,
};
use crate::store::StoreError;

/// Signup input.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub nickname: String,
    pub two_factor_enabled: bool,
}

/// Maximum nickname length, in characters.
pub const MAX_NICKNAME_LEN: usize = 100;

/// Maximum profile image URL length, in characters.
pub const MAX_IMAGE_URL_LEN: usize = 200;

/// Requested profile changes. `None` leaves a field as it is; an empty
/// `profile_image_url` removes the image.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub nickname: Option<String>,
    pub profile_image_url: Option<String>,
}

fn check_nickname(nickname: &str) -> Result<(), AuthError> {
    if nickname.is_empty() {
        return Err(AuthError::Validation("Nickname is required".into()));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(AuthError::Validation(format!(
            "Nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(())
}

impl ProfileEdit {
    /// Trim and validate into a storable update.
    fn into_update(self) -> Result<ProfileUpdate, AuthError> {
        let nickname = match self.nickname {
            Some(nickname) => {
                let nickname = nickname.trim();
                check_nickname(nickname)?;
                Some(nickname.to_string())
            }
            None => None,
        };
        let profile_image_url = match self.profile_image_url {
            Some(url) => {
                let url = url.trim();
                if url.is_empty() {
                    Some(None)
                } else if !(url.starts_with("http://") || url.starts_with("https://"))
                    || url.chars().count() > MAX_IMAGE_URL_LEN
                {
                    return Err(AuthError::Validation(format!(
                        "profile_image_url must be an http(s) URL of at most \
                         {MAX_IMAGE_URL_LEN} characters"
                    )));
                } else {
                    Some(Some(url.to_string()))
                }
            }
            None => None,
        };
        Ok(ProfileUpdate {
            nickname,
            profile_image_url,
        })
    }
}

/// Minimal shape check: one `@` with a non-empty local part and a dotted domain.
fn check_email_shape(email: &str) -> Result<(), AuthError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid {
        return Err(AuthError::Validation("Enter a valid email address".into()));
    }
    Ok(())
}

impl AuthService {
    /// Create an identity and its profile. New accounts always get the `user` role.
    pub async fn signup(&self, account: NewAccount) -> Result<(Identity, UserProfile), AuthError> {
        let email = normalize_email(&account.email);
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".into()));
        }
        check_email_shape(&email)?;
        check_password_strength(&account.password)?;
        let nickname = account.nickname.trim();
        check_nickname(nickname)?;

        let password_hash = hash_password(&account.password, self.config.bcrypt_cost).await?;
        let created = self
            .store
            .create_identity(NewIdentity {
                email,
                password_hash,
                nickname: nickname.to_string(),
                role: Role::User,
                two_factor_enabled: account.two_factor_enabled,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::Validation("Email already registered".into()),
                other => AuthError::Store(other),
            })?;

        info!(user_id = %created.0.id, "account created");
        Ok(created)
    }

    /// `true` when no identity uses `email`.
    pub async fn email_available(&self, email: &str) -> Result<bool, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::Validation("Email is required".into()));
        }
        Ok(!self.store.email_exists(&email).await?)
    }

    /// Change `target_id`'s password on behalf of `actor`.
    ///
    /// Checks run in order: input shape (400), target exists (404), actor is
    /// the target (403), current password matches (401).
    pub async fn change_password(
        &self,
        actor: &Identity,
        target_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() || new_password.is_empty() {
            return Err(AuthError::Validation(
                "current_password and new_password are required".into(),
            ));
        }
        check_password_strength(new_password)?;
        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must differ from the current password".into(),
            ));
        }

        let target = self
            .store
            .find_identity_by_id(target_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        if target.id != actor.id {
            return Err(AuthError::Forbidden(
                "Cannot change another user's password".into(),
            ));
        }
        if !verify_password(current_password, &target.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let hash = hash_password(new_password, self.config.bcrypt_cost).await?;
        self.store.update_password(target.id, &hash, Utc::now()).await?;
        info!(user_id = %target.id, "password changed");
        Ok(())
    }

    /// Profile of `user_id`, if it still has one.
    pub async fn profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, AuthError> {
        Ok(self.store.find_profile(user_id).await?)
    }

    /// Profile of `target_id`, readable by its owner only.
    pub async fn owned_profile(
        &self,
        actor: &Identity,
        target_id: Uuid,
    ) -> Result<UserProfile, AuthError> {
        let profile = self
            .store
            .find_profile(target_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Profile not found".into()))?;
        if profile.user_id != actor.id {
            return Err(AuthError::Forbidden(
                "Cannot access another user's profile".into(),
            ));
        }
        Ok(profile)
    }

    /// Update `target_id`'s profile on behalf of `actor`.
    pub async fn update_profile(
        &self,
        actor: &Identity,
        target_id: Uuid,
        edit: ProfileEdit,
    ) -> Result<UserProfile, AuthError> {
        let update = edit.into_update()?;
        self.owned_profile(actor, target_id).await?;
        let profile = self
            .store
            .update_profile(target_id, &update)
            .await?
            .ok_or_else(|| AuthError::NotFound("Profile not found".into()))?;
        info!(user_id = %target_id, "profile updated");
        Ok(profile)
    }

    /// Delete `target_id`'s profile on behalf of `actor`. The identity stays.
    pub async fn delete_profile(&self, actor: &Identity, target_id: Uuid) -> Result<(), AuthError> {
        self.owned_profile(actor, target_id).await?;
        if !self.store.delete_profile(target_id).await? {
            return Err(AuthError::NotFound("Profile not found".into()));
        }
        info!(user_id = %target_id, "profile deleted");
        Ok(())
    }
}
