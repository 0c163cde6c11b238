//! Admin sessions.
//!
//! A session is an opaque random token mapped to its last activity time.
//! Sessions idle longer than the configured threshold are rejected on
//! validation and evicted by a periodic sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::auth::secrets_match;
use crate::error::{Error, Result};
use crate::events::{EventBus, LockEvent, SessionEndReason};
use crate::sweeper::{SweeperHandle, spawn_periodic};

/// Opaque admin session token (43 URL-safe characters).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// The token as sent to and from the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken[REDACTED]")
    }
}

struct SessionInner {
    secret: SecretString,
    ttl: Duration,
    sweep_interval: Duration,
    sessions: RwLock<HashMap<SessionToken, Instant>>,
    events: Option<Arc<EventBus>>,
}

/// Store of live admin sessions. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("ttl", &self.inner.ttl)
            .finish()
    }
}

impl SessionStore {
    /// Create a store accepting `secret` as the admin password.
    pub fn new(secret: SecretString, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                secret,
                ttl,
                sweep_interval,
                sessions: RwLock::new(HashMap::new()),
                events: None,
            }),
        }
    }

    /// Create a store that reports session lifecycle on `events`.
    pub fn with_event_bus(
        secret: SecretString,
        ttl: Duration,
        sweep_interval: Duration,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                secret,
                ttl,
                sweep_interval,
                sessions: RwLock::new(HashMap::new()),
                events: Some(events),
            }),
        }
    }

    /// Exchange the admin password for a fresh session token.
    ///
    /// # Errors
    /// [`Error::InvalidCredential`] if `credential` does not match.
    pub fn authenticate(&self, credential: &str) -> Result<SessionToken> {
        if !secrets_match(self.inner.secret.expose_secret(), credential) {
            tracing::warn!("admin authentication failed");
            return Err(Error::InvalidCredential);
        }
        let token = SessionToken::generate();
        self.inner
            .sessions
            .write()
            .insert(token.clone(), Instant::now());
        tracing::info!("admin session opened");
        self.emit(LockEvent::SessionOpened);
        Ok(token)
    }

    /// Check `token`, refreshing its activity time if valid.
    ///
    /// An idle-expired session is removed and reported as invalid.
    pub fn validate(&self, token: &SessionToken) -> bool {
        let mut sessions = self.inner.sessions.write();
        let Some(last_seen) = sessions.get_mut(token) else {
            return false;
        };
        if last_seen.elapsed() > self.inner.ttl {
            sessions.remove(token);
            drop(sessions);
            tracing::info!("admin session expired");
            self.emit(LockEvent::SessionClosed {
                reason: SessionEndReason::Expired,
            });
            return false;
        }
        *last_seen = Instant::now();
        true
    }

    /// End a session; returns whether it existed.
    pub fn logout(&self, token: &SessionToken) -> bool {
        let existed = self.inner.sessions.write().remove(token).is_some();
        if existed {
            tracing::info!("admin session closed");
            self.emit(LockEvent::SessionClosed {
                reason: SessionEndReason::Logout,
            });
        }
        existed
    }

    /// Evict every idle-expired session; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let ttl = self.inner.ttl;
        let removed = {
            let mut sessions = self.inner.sessions.write();
            let before = sessions.len();
            sessions.retain(|_, last_seen| last_seen.elapsed() <= ttl);
            before - sessions.len()
        };
        if removed > 0 {
            tracing::info!(count = removed, "expired admin sessions swept");
            for _ in 0..removed {
                self.emit(LockEvent::SessionClosed {
                    reason: SessionEndReason::Expired,
                });
            }
        }
        removed
    }

    /// Start the periodic session sweep under `cancel`.
    pub fn start_sweeper(&self, cancel: CancellationToken) -> SweeperHandle {
        let store = self.clone();
        spawn_periodic(
            "session-expiry",
            self.inner.sweep_interval,
            cancel,
            move || {
                store.sweep();
            },
        )
    }

    /// Number of live sessions (including idle ones not yet swept).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// Whether there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.read().is_empty()
    }

    fn emit(&self, event: LockEvent) {
        if let Some(bus) = &self.inner.events {
            bus.emit(event);
        }
    }
}
