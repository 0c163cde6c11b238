//! Administrative overrides, gated behind an admin session.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::manager::{ForceReleaseOutcome, LockManager, ResourceStatus};
use crate::session::{SessionStore, SessionToken};
use crate::sweeper::SweeperHandle;

/// Admin surface: login/logout plus override operations on a [`LockManager`].
///
/// Every override requires a session token obtained from
/// [`login`](Self::login); an invalid or idle-expired token yields
/// [`Error::Unauthorized`].
#[derive(Debug, Clone)]
pub struct Admin {
    manager: LockManager,
    sessions: SessionStore,
}

impl Admin {
    /// Build the admin surface for `manager`, using its configured admin
    /// password and session thresholds.
    pub fn new(manager: LockManager) -> Self {
        let config = manager.config();
        let sessions = SessionStore::with_event_bus(
            config.admin_password.clone(),
            config.session_ttl,
            config.session_sweep_interval,
            Arc::clone(manager.events()),
        );
        Self { manager, sessions }
    }

    /// Exchange the admin password for a session token.
    pub fn login(&self, password: &str) -> Result<SessionToken> {
        self.sessions.authenticate(password)
    }

    /// End a session; returns whether it existed.
    pub fn logout(&self, token: &SessionToken) -> bool {
        self.sessions.logout(token)
    }

    /// Whether `token` is a live session (refreshes it).
    pub fn is_authorized(&self, token: &SessionToken) -> bool {
        self.sessions.validate(token)
    }

    /// Reclaim `resource` from whoever holds it.
    ///
    /// A free resource is a no-op success with `previous_owner == None`.
    pub fn force_release(
        &self,
        token: &SessionToken,
        resource: &str,
    ) -> Result<ForceReleaseOutcome> {
        self.authorize(token)?;
        self.manager.force_release(resource)
    }

    /// Reclaim every resource held by `owner`; zero matches is not an error.
    pub fn release_all_by_owner(&self, token: &SessionToken, owner: &str) -> Result<usize> {
        self.authorize(token)?;
        Ok(self.manager.release_all_by_owner(owner))
    }

    /// Status of every resource, for the dashboard.
    pub fn dashboard(&self, token: &SessionToken) -> Result<Vec<ResourceStatus>> {
        self.authorize(token)?;
        Ok(self.manager.snapshot())
    }

    /// Start the session sweeper; it stops when the manager shuts down.
    pub fn start(&self) -> SweeperHandle {
        self.start_with(self.manager.shutdown_token().child_token())
    }

    /// Start the session sweeper under an explicit cancellation token.
    pub fn start_with(&self, cancel: CancellationToken) -> SweeperHandle {
        self.sessions.start_sweeper(cancel)
    }

    /// The managed lock manager.
    #[must_use]
    pub fn manager(&self) -> &LockManager {
        &self.manager
    }

    /// The session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn authorize(&self, token: &SessionToken) -> Result<()> {
        if self.sessions.validate(token) {
            Ok(())
        } else {
            tracing::warn!("admin operation rejected: no valid session");
            Err(Error::Unauthorized)
        }
    }
}
