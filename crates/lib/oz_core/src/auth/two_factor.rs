//! Second-factor check run after a successful password match.

use subtle::ConstantTimeEq;

use crate::models::auth::Identity;

/// Decides whether a submitted two-factor code is acceptable for an identity.
pub trait TwoFactorVerifier: Send + Sync {
    fn verify(&self, identity: &Identity, code: &str) -> bool;
}

/// Accepts one configured code for every identity.
pub struct StaticCodeVerifier {
    code: String,
}

impl StaticCodeVerifier {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl TwoFactorVerifier for StaticCodeVerifier {
    fn verify(&self, _identity: &Identity, code: &str) -> bool {
        let expected = self.code.as_bytes();
        let submitted = code.trim().as_bytes();
        expected.len() == submitted.len() && expected.ct_eq(submitted).unwrap_u8() == 1
    }
}
