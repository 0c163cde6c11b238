//! Credential checks for resource operations.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// Decides whether a caller's credential permits acquire/release.
pub trait Authenticator: Send + Sync {
    /// Return `true` if `credential` is accepted.
    fn verify(&self, credential: &str) -> bool;
}

/// Accepts exactly one static secret.
#[derive(Clone)]
pub struct StaticCredential(SecretString);

impl StaticCredential {
    /// Create an authenticator for `secret`.
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential[REDACTED]")
    }
}

impl Authenticator for StaticCredential {
    fn verify(&self, credential: &str) -> bool {
        secrets_match(self.0.expose_secret(), credential)
    }
}

/// Constant-time equality for secrets; an empty expected secret never matches.
pub(crate) fn secrets_match(expected: &str, given: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
}
