//! Caller context with cancellation support

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

/// Context for acquire and release calls.
///
/// Carries the caller's owner identity and credential, plus the cancellation
/// token and optional wait bound that limit how long `acquire` may block.
#[derive(Clone)]
pub struct Context {
    /// Owner identity recorded on the lock.
    pub owner: String,
    /// Credential checked by the manager's authenticator.
    pub credential: SecretString,
    /// Cooperative cancellation: firing it aborts a blocked acquire.
    pub cancellation: CancellationToken,
    /// Per-call wait bound; overrides the configured `acquire_timeout`.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("owner", &self.owner)
            .field("cancellation", &self.cancellation)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Context {
    /// Create a context for `owner` presenting `credential`.
    pub fn new(owner: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            credential: SecretString::from(credential.into()),
            cancellation: CancellationToken::new(),
            timeout: None,
        }
    }

    /// Replace the default cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Bound how long `acquire` may wait.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn credential(&self) -> &str {
        self.credential.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let ctx = Context::new("alice", "key");
        assert_eq!(ctx.owner, "alice");
        assert_eq!(ctx.credential(), "key");
        assert!(ctx.timeout.is_none());
        assert!(!ctx.cancellation.is_cancelled());
    }

    #[test]
    fn test_context_with_cancellation() {
        let token = CancellationToken::new();
        let ctx = Context::new("alice", "key")
            .with_cancellation(token.clone())
            .with_timeout(Duration::from_secs(2));
        token.cancel();
        assert!(ctx.cancellation.is_cancelled());
        assert_eq!(ctx.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn debug_hides_credential() {
        let ctx = Context::new("alice", "top-secret");
        assert!(!format!("{ctx:?}").contains("top-secret"));
    }
}
