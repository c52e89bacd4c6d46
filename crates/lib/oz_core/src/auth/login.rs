//! Login gate: lockout, password check, second factor, token issuance.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::password::verify_password;
use super::tokens::IssuedTokens;
use super::{AuthError, AuthService};
use crate::models::auth::{Identity, normalize_email};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub tokens: IssuedTokens,
}

impl AuthService {
    /// Authenticate with email + password (+ two-factor code when enabled).
    ///
    /// Blank strings count as missing. A wrong two-factor code never counts
    /// toward the lockout threshold.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        two_factor_code: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Both email and password are required".into(),
            ));
        }

        let identity = self
            .store
            .find_identity_by_email(&email)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;

        let now = Utc::now();
        if let Some(remaining) = identity.lockout_remaining(now) {
            debug!(user_id = %identity.id, "login refused: account locked");
            return Err(AuthError::LockedOut {
                remaining_secs: remaining.num_seconds().max(1),
            });
        }

        if !verify_password(password, &identity.password_hash).await? {
            let Some(updated) = self
                .store
                .record_login_failure(
                    identity.id,
                    self.config.max_login_failures,
                    now,
                    now + self.config.lockout_duration,
                )
                .await?
            else {
                // Another attempt locked the account while this one was checked.
                return self.locked_out(identity.id, now).await;
            };
            if updated.lockout_remaining(now).is_some() {
                warn!(
                    user_id = %updated.id,
                    failures = updated.login_fail_count,
                    "account locked after repeated login failures"
                );
            } else {
                debug!(
                    user_id = %updated.id,
                    failures = updated.login_fail_count,
                    "login failed: wrong password"
                );
            }
            return Err(AuthError::InvalidCredentials);
        }

        if identity.two_factor_enabled {
            let code = two_factor_code.map(str::trim).unwrap_or_default();
            if code.is_empty() {
                return Err(AuthError::TwoFactorRequired);
            }
            if !self.two_factor.verify(&identity, code) {
                debug!(user_id = %identity.id, "login failed: wrong two-factor code");
                return Err(AuthError::TwoFactorInvalid);
            }
        }

        if !self.store.record_login_success(identity.id, now).await? {
            return self.locked_out(identity.id, now).await;
        }
        let tokens = self.issue(identity.id).await?;
        info!(user_id = %identity.id, "login succeeded");

        let identity = Identity {
            login_fail_count: 0,
            locked_until: None,
            ..identity
        };
        Ok(LoginOutcome { identity, tokens })
    }

    /// `LockedOut` carrying the identity's current remaining lock time.
    async fn locked_out<T>(&self, id: Uuid, now: DateTime<Utc>) -> Result<T, AuthError> {
        let identity = self
            .store
            .find_identity_by_id(id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".into()))?;
        debug!(user_id = %id, "login refused: account locked during attempt");
        let remaining_secs = identity
            .lockout_remaining(now)
            .map_or(1, |remaining| remaining.num_seconds().max(1));
        Err(AuthError::LockedOut { remaining_secs })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::TwoFactorVerifier;
    use crate::auth::test_support::{PASSWORD, service, signup};
    use crate::store::IdentityStore;

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let (svc, _) = service();
        assert!(matches!(
            svc.login("", PASSWORD, None).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            svc.login("a@example.com", "", None).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let (svc, _) = service();
        assert!(matches!(
            svc.login("ghost@example.com", PASSWORD, None).await,
            Err(AuthError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn email_lookup_is_case_insensitive() {
        let (svc, _) = service();
        signup(&svc, "Mixed@Example.com", false).await;
        let outcome = svc.login("MIXED@example.COM", PASSWORD, None).await.unwrap();
        assert_eq!(outcome.identity.email, "mixed@example.com");
    }

    #[tokio::test]
    async fn five_failures_lock_even_the_correct_password() {
        let (svc, store) = service();
        let identity = signup(&svc, "lock@example.com", false).await;

        for _ in 0..5 {
            assert!(matches!(
                svc.login("lock@example.com", "wrong-password", None).await,
                Err(AuthError::InvalidCredentials)
            ));
        }

        match svc.login("lock@example.com", PASSWORD, None).await {
            Err(AuthError::LockedOut { remaining_secs }) => {
                assert!(remaining_secs > 29 * 60 && remaining_secs <= 30 * 60);
            }
            other => panic!("expected LockedOut, got {other:?}"),
        }

        // Once the window has elapsed the correct password works again.
        store
            .set_locked_until(identity.id, Some(Utc::now() - chrono::Duration::seconds(1)))
            .await;
        let outcome = svc.login("lock@example.com", PASSWORD, None).await.unwrap();
        assert_eq!(outcome.identity.login_fail_count, 0);
    }

    #[tokio::test]
    async fn success_resets_partial_failures() {
        let (svc, store) = service();
        let identity = signup(&svc, "reset@example.com", false).await;

        for _ in 0..3 {
            let _ = svc.login("reset@example.com", "wrong-password", None).await;
        }
        let stored = store.find_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.login_fail_count, 3);

        svc.login("reset@example.com", PASSWORD, None).await.unwrap();
        let stored = store.find_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.login_fail_count, 0);
        assert!(stored.locked_until.is_none());

        let profile = store.find_profile(identity.id).await.unwrap().unwrap();
        assert!(profile.last_login.is_some());
    }

    #[tokio::test]
    async fn two_factor_gate_does_not_count_toward_lockout() {
        let (svc, store) = service();
        let identity = signup(&svc, "2fa@example.com", true).await;

        assert!(matches!(
            svc.login("2fa@example.com", PASSWORD, None).await,
            Err(AuthError::TwoFactorRequired)
        ));
        assert!(matches!(
            svc.login("2fa@example.com", PASSWORD, Some("  ")).await,
            Err(AuthError::TwoFactorRequired)
        ));
        for _ in 0..6 {
            assert!(matches!(
                svc.login("2fa@example.com", PASSWORD, Some("000000")).await,
                Err(AuthError::TwoFactorInvalid)
            ));
        }
        let stored = store.find_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.login_fail_count, 0);

        let outcome = svc
            .login("2fa@example.com", PASSWORD, Some("123456"))
            .await
            .unwrap();
        assert_eq!(outcome.identity.id, identity.id);
    }

    #[tokio::test]
    async fn login_issues_a_persisted_pair() {
        let (svc, store) = service();
        let identity = signup(&svc, "pair@example.com", false).await;
        let outcome = svc.login("pair@example.com", PASSWORD, None).await.unwrap();
        assert_eq!(outcome.tokens.access_ttl_secs, 1800);
        assert_eq!(store.session_token_count(identity.id).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_cannot_exceed_the_threshold() {
        let (svc, store) = service();
        let identity = signup(&svc, "burst@example.com", false).await;

        let attempts: Vec<_> = (0..40)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.login("burst@example.com", "wrong-password", None).await
                })
            })
            .collect();

        let mut invalid = 0;
        let mut locked = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Err(AuthError::InvalidCredentials) => invalid += 1,
                Err(AuthError::LockedOut { .. }) => locked += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(invalid, 5);
        assert_eq!(locked, 35);

        let stored = store.find_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.login_fail_count, 5);
        assert!(stored.lockout_remaining(Utc::now()).is_some());
        assert!(matches!(
            svc.login("burst@example.com", PASSWORD, None).await,
            Err(AuthError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn correct_password_does_not_clear_a_lock_set_mid_attempt() {
        let (svc, store) = service();
        let identity = signup(&svc, "race@example.com", false).await;
        let now = Utc::now();
        let until = now + chrono::Duration::minutes(30);

        // The lock lands after the gate read but before the success is recorded.
        store.set_locked_until(identity.id, Some(until)).await;
        assert!(!store.record_login_success(identity.id, now).await.unwrap());
        let err = svc.locked_out::<()>(identity.id, now).await.unwrap_err();
        match err {
            AuthError::LockedOut { remaining_secs } => assert_eq!(remaining_secs, 30 * 60),
            other => panic!("expected LockedOut, got {other:?}"),
        }

        let stored = store.find_identity_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(stored.locked_until, Some(until));
        assert_eq!(store.session_token_count(identity.id).await, 0);
    }

    /// Accepts a code derived from the identity instead of a shared one.
    struct PerIdentityCode;

    impl TwoFactorVerifier for PerIdentityCode {
        fn verify(&self, identity: &Identity, code: &str) -> bool {
            identity.email.split('@').next() == Some(code)
        }
    }

    #[tokio::test]
    async fn custom_two_factor_verifier_replaces_the_static_code() {
        let (svc, _) = service();
        let svc = svc.with_two_factor(Arc::new(PerIdentityCode));
        signup(&svc, "alice@example.com", true).await;

        assert!(matches!(
            svc.login("alice@example.com", PASSWORD, Some("123456")).await,
            Err(AuthError::TwoFactorInvalid)
        ));
        let outcome = svc
            .login("alice@example.com", PASSWORD, Some("alice"))
            .await
            .unwrap();
        assert_eq!(outcome.identity.email, "alice@example.com");
    }
}
