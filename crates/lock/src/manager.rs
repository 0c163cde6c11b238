//! Lock manager: the acquire/release façade over pool and registry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::{Authenticator, StaticCredential};
use crate::config::LockConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::{EventBus, LockEvent};
use crate::pool::AvailabilityPool;
use crate::registry::{LockRecord, LockRegistry};
use crate::resource_set::{ResourceId, ResourceSet};
use crate::sweeper::{SweeperHandle, spawn_periodic};

/// State of one resource as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
    /// The resource identifier
    pub resource: ResourceId,
    /// Current holder, if any
    pub held_by: Option<String>,
    /// When the current holder acquired it
    pub since: Option<DateTime<Utc>>,
}

/// Result of a force-release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForceReleaseOutcome {
    /// The targeted resource
    pub resource: ResourceId,
    /// Holder whose tenure was ended; `None` if the resource was already free
    pub previous_owner: Option<String>,
}

impl ForceReleaseOutcome {
    /// Whether a lock existed and was removed.
    #[must_use]
    pub fn existed(&self) -> bool {
        self.previous_owner.is_some()
    }
}

/// Manager statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    /// Size of the resource universe.
    pub total: usize,
    /// Resources currently free.
    pub available: usize,
    /// Resources currently held.
    pub held: usize,
    /// Callers blocked in acquire.
    pub waiters: usize,
    /// Successful acquisitions since startup.
    pub total_acquisitions: u64,
    /// Owner-initiated releases since startup.
    pub total_releases: u64,
    /// Locks reclaimed by the expiry sweeper.
    pub total_expired: u64,
    /// Locks reclaimed by admin overrides.
    pub total_forced: u64,
}

#[derive(Debug, Default)]
struct Counters {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    expired: AtomicU64,
    forced: AtomicU64,
}

struct ManagerInner {
    config: LockConfig,
    resources: ResourceSet,
    pool: AvailabilityPool,
    registry: LockRegistry,
    auth: Arc<dyn Authenticator>,
    events: Arc<EventBus>,
    counters: Counters,
    cancel: CancellationToken,
}

/// Coordinates exclusive access to a fixed set of resources.
///
/// Every identifier is, at any instant, either free in the pool or held in
/// the registry. Whoever removes a record from the registry (release, expiry
/// sweep or admin override) returns the id to the pool, and only they do:
/// a release that finds no record reports [`Error::NotLocked`] and leaves the
/// pool untouched.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("stats", &self.stats())
            .finish()
    }
}

impl LockManager {
    /// Create a manager authenticating callers against `config.api_key`.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: LockConfig) -> Result<Self> {
        let auth = Arc::new(StaticCredential::new(config.api_key.clone()));
        Self::with_authenticator(config, auth)
    }

    /// Create a manager with a custom authenticator.
    pub fn with_authenticator(config: LockConfig, auth: Arc<dyn Authenticator>) -> Result<Self> {
        config.validate()?;
        let resources = ResourceSet::from_config(&config.database)?;
        let pool = AvailabilityPool::new(resources.iter().cloned());
        let events = Arc::new(EventBus::new(config.event_buffer));
        tracing::info!(resources = resources.len(), "lock manager initialized");
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                resources,
                pool,
                registry: LockRegistry::new(),
                auth,
                events,
                counters: Counters::default(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Acquire a free resource for `ctx.owner`, waiting until one is free.
    ///
    /// Fails with [`Error::Unauthenticated`] before waiting if the owner is
    /// empty or the credential is rejected. Once waiting, fails only with
    /// [`Error::Cancelled`] or [`Error::Timeout`], in which case nothing was
    /// taken. The wait bound is `ctx.timeout`, else the configured
    /// `acquire_timeout`.
    pub async fn acquire(&self, ctx: &Context) -> Result<ResourceId> {
        let inner = &self.inner;
        if ctx.owner.is_empty() || !inner.auth.verify(ctx.credential()) {
            tracing::warn!(owner = %ctx.owner, "acquire rejected: unauthenticated");
            return Err(Error::Unauthenticated);
        }

        let timeout = ctx.timeout.or(inner.config.acquire_timeout);
        let id = match inner.pool.take(&ctx.cancellation, timeout).await {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(owner = %ctx.owner, error = %e, "acquire gave up waiting");
                return Err(e);
            }
        };

        // No await between take and insert: a dropped acquire never strands an id.
        inner.registry.insert(id.clone(), ctx.owner.clone());
        inner.counters.acquisitions.fetch_add(1, Ordering::Relaxed);

        tracing::info!(resource = %id.redacted(), owner = %ctx.owner, "resource acquired");
        inner.events.emit(LockEvent::Acquired {
            resource: id.clone(),
            owner: ctx.owner.clone(),
        });
        Ok(id)
    }

    /// Release `resource` and return it to the pool.
    ///
    /// The recorded owner is not compared with `ctx.owner`: any authenticated
    /// caller may release any held resource.
    ///
    /// # Errors
    /// - [`Error::Unauthenticated`] if the credential is rejected
    /// - [`Error::UnknownResource`] if `resource` is not in the universe
    /// - [`Error::NotLocked`] if nobody holds it (e.g. an admin already
    ///   force-released it)
    pub fn release(&self, ctx: &Context, resource: &str) -> Result<ResourceId> {
        let inner = &self.inner;
        if !inner.auth.verify(ctx.credential()) {
            tracing::warn!(owner = %ctx.owner, "release rejected: unauthenticated");
            return Err(Error::Unauthenticated);
        }
        self.known(resource)?;

        let Some(record) = inner.registry.remove(resource) else {
            tracing::debug!(owner = %ctx.owner, "release of a resource that is not locked");
            return Err(Error::not_locked(resource));
        };
        if record.owner != ctx.owner {
            tracing::warn!(
                resource = %record.resource.redacted(),
                holder = %record.owner,
                releaser = %ctx.owner,
                "resource released by a different owner"
            );
        }

        let held_for = record.held_for();
        inner.counters.releases.fetch_add(1, Ordering::Relaxed);
        inner.pool.put(record.resource.clone());

        tracing::info!(
            resource = %record.resource.redacted(),
            owner = %record.owner,
            held_ms = held_for.as_millis() as u64,
            "resource released"
        );
        inner.events.emit(LockEvent::Released {
            resource: record.resource.clone(),
            owner: record.owner,
            held_for,
        });
        Ok(record.resource)
    }

    /// Reclaim `resource` regardless of who holds it.
    ///
    /// A free resource yields `previous_owner == None` and leaves the pool
    /// untouched.
    ///
    /// # Errors
    /// [`Error::UnknownResource`] if `resource` is not in the universe.
    pub fn force_release(&self, resource: &str) -> Result<ForceReleaseOutcome> {
        let inner = &self.inner;
        let Some(id) = inner.resources.get(resource).cloned() else {
            return Err(Error::unknown_resource(resource));
        };

        let Some(record) = inner.registry.remove(resource) else {
            tracing::debug!(resource = %id.redacted(), "force release of a free resource");
            return Ok(ForceReleaseOutcome {
                resource: id,
                previous_owner: None,
            });
        };
        inner.counters.forced.fetch_add(1, Ordering::Relaxed);
        inner.pool.put(record.resource.clone());

        tracing::warn!(
            resource = %record.resource.redacted(),
            owner = %record.owner,
            "resource force-released"
        );
        inner.events.emit(LockEvent::ForceReleased {
            resource: record.resource.clone(),
            owner: record.owner.clone(),
        });
        Ok(ForceReleaseOutcome {
            resource: record.resource,
            previous_owner: Some(record.owner),
        })
    }

    /// Reclaim every resource held by `owner`; returns how many were freed.
    pub fn release_all_by_owner(&self, owner: &str) -> usize {
        let inner = &self.inner;
        let removed = inner.registry.remove_all_by_owner(owner);
        let count = removed.len();
        inner
            .counters
            .forced
            .fetch_add(count as u64, Ordering::Relaxed);
        for record in &removed {
            inner.pool.put(record.resource.clone());
        }

        if count > 0 {
            tracing::warn!(owner, count, "bulk release");
            inner.events.emit(LockEvent::BulkReleased {
                owner: owner.to_string(),
                count,
            });
        }
        count
    }

    /// Evict every lock older than the configured `lock_ttl`.
    pub fn sweep_expired(&self) -> Vec<LockRecord> {
        let inner = &self.inner;
        let expired = inner.registry.remove_expired(inner.config.lock_ttl);
        inner
            .counters
            .expired
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        for record in &expired {
            inner.pool.put(record.resource.clone());
            let held_for = record.held_for();
            tracing::warn!(
                resource = %record.resource.redacted(),
                owner = %record.owner,
                held_ms = held_for.as_millis() as u64,
                "lock expired"
            );
            inner.events.emit(LockEvent::Expired {
                resource: record.resource.clone(),
                owner: record.owner.clone(),
                held_for,
            });
        }
        expired
    }

    /// Status of every resource in the universe, ordered by identifier.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResourceStatus> {
        let mut held: BTreeMap<ResourceId, LockRecord> = self
            .inner
            .registry
            .snapshot()
            .into_iter()
            .map(|r| (r.resource.clone(), r))
            .collect();

        let mut ids: Vec<&ResourceId> = self.inner.resources.iter().collect();
        ids.sort();
        ids.into_iter()
            .map(|id| match held.remove(id) {
                Some(record) => ResourceStatus {
                    resource: record.resource,
                    held_by: Some(record.owner),
                    since: Some(record.acquired_at),
                },
                None => ResourceStatus {
                    resource: id.clone(),
                    held_by: None,
                    since: None,
                },
            })
            .collect()
    }

    /// Records of every held resource, ordered by identifier.
    #[must_use]
    pub fn locks(&self) -> Vec<LockRecord> {
        self.inner.registry.snapshot()
    }

    /// Identifiers currently free in the pool.
    #[must_use]
    pub fn available_resources(&self) -> Vec<ResourceId> {
        self.inner.pool.free_ids()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> LockStats {
        let inner = &self.inner;
        LockStats {
            total: inner.resources.len(),
            available: inner.pool.available(),
            held: inner.registry.len(),
            waiters: inner.pool.waiters(),
            total_acquisitions: inner.counters.acquisitions.load(Ordering::Relaxed),
            total_releases: inner.counters.releases.load(Ordering::Relaxed),
            total_expired: inner.counters.expired.load(Ordering::Relaxed),
            total_forced: inner.counters.forced.load(Ordering::Relaxed),
        }
    }

    /// The fixed resource universe.
    #[must_use]
    pub fn resources(&self) -> &ResourceSet {
        &self.inner.resources
    }

    /// Audit event bus; clone the `Arc` to share it.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// The configuration the manager was built from.
    #[must_use]
    pub fn config(&self) -> &LockConfig {
        &self.inner.config
    }

    /// Start the periodic expiry sweep.
    ///
    /// The sweeper stops on [`shutdown`](Self::shutdown) or
    /// [`SweeperHandle::stop`].
    pub fn start_sweeper(&self) -> SweeperHandle {
        let manager = self.clone();
        spawn_periodic(
            "lock-expiry",
            self.inner.config.sweep_interval,
            self.inner.cancel.child_token(),
            move || {
                let expired = manager.sweep_expired();
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "expiry sweep reclaimed locks");
                }
            },
        )
    }

    /// Stop every background task started by this manager.
    pub fn shutdown(&self) {
        tracing::info!("lock manager shutting down");
        self.inner.cancel.cancel();
    }

    /// Token cancelled on [`shutdown`](Self::shutdown); parent for sweepers.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    fn known(&self, resource: &str) -> Result<()> {
        if self.inner.resources.contains(resource) {
            Ok(())
        } else {
            Err(Error::unknown_resource(resource))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    fn config(count: usize) -> LockConfig {
        let mut config = LockConfig {
            api_key: SecretString::from("key".to_string()),
            admin_password: SecretString::from("admin".to_string()),
            ..Default::default()
        };
        config.database.count = count;
        config
    }

    fn ctx(owner: &str) -> Context {
        Context::new(owner, "key")
    }

    #[tokio::test]
    async fn acquire_then_release() {
        let manager = LockManager::new(config(2)).unwrap();
        let id = manager.acquire(&ctx("alice")).await.unwrap();
        assert!(manager.resources().contains(id.as_str()));
        assert_eq!(manager.stats().held, 1);
        assert_eq!(manager.stats().available, 1);

        let released = manager.release(&ctx("alice"), id.as_str()).unwrap();
        assert_eq!(released, id);
        let stats = manager.stats();
        assert_eq!(stats.held, 0);
        assert_eq!(stats.available, 2);
        assert_eq!(stats.total_acquisitions, 1);
        assert_eq!(stats.total_releases, 1);
    }

    #[tokio::test]
    async fn acquire_requires_owner_and_credential() {
        let manager = LockManager::new(config(1)).unwrap();
        assert!(matches!(
            manager.acquire(&Context::new("", "key")).await,
            Err(Error::Unauthenticated)
        ));
        assert!(matches!(
            manager.acquire(&Context::new("alice", "wrong")).await,
            Err(Error::Unauthenticated)
        ));
        assert_eq!(manager.stats().available, 1);
    }

    #[tokio::test]
    async fn release_errors() {
        let manager = LockManager::new(config(1)).unwrap();
        let id = manager.resources().as_slice()[0].clone();

        assert!(matches!(
            manager.release(&ctx("alice"), "postgres://nope"),
            Err(Error::UnknownResource { .. })
        ));
        assert!(matches!(
            manager.release(&ctx("alice"), id.as_str()),
            Err(Error::NotLocked { .. })
        ));
        assert!(matches!(
            manager.release(&Context::new("alice", "bad"), id.as_str()),
            Err(Error::Unauthenticated)
        ));
        assert_eq!(manager.stats().available, 1);
    }

    #[tokio::test]
    async fn cross_owner_release_is_allowed() {
        let manager = LockManager::new(config(1)).unwrap();
        let id = manager.acquire(&ctx("alice")).await.unwrap();
        manager.release(&ctx("bob"), id.as_str()).unwrap();
        assert_eq!(manager.stats().available, 1);
    }

    #[tokio::test]
    async fn snapshot_covers_universe_in_order() {
        let manager = LockManager::new(config(3)).unwrap();
        let id = manager.acquire(&ctx("alice")).await.unwrap();

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 3);
        let ids: Vec<_> = snapshot.iter().map(|s| s.resource.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let held: Vec<_> = snapshot.iter().filter(|s| s.held_by.is_some()).collect();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].resource, id);
        assert_eq!(held[0].held_by.as_deref(), Some("alice"));
        assert!(held[0].since.is_some());
    }

    #[tokio::test]
    async fn force_release_reports_previous_owner() {
        let manager = LockManager::new(config(1)).unwrap();
        let id = manager.acquire(&ctx("alice")).await.unwrap();

        let outcome = manager.force_release(id.as_str()).unwrap();
        assert_eq!(
            outcome,
            ForceReleaseOutcome {
                resource: id.clone(),
                previous_owner: Some("alice".to_string()),
            }
        );
        let again = manager.force_release(id.as_str()).unwrap();
        assert!(!again.existed());
        assert_eq!(again.resource, id);
        assert_eq!(manager.stats().available, 1);
        assert!(matches!(
            manager.force_release("other"),
            Err(Error::UnknownResource { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_reclaims_only_expired_locks() {
        let mut config = config(2);
        config.lock_ttl = Duration::from_millis(30);
        let manager = LockManager::new(config).unwrap();

        let id = manager.acquire(&ctx("alice")).await.unwrap();
        assert!(manager.sweep_expired().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let expired = manager.sweep_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].resource, id);
        assert_eq!(manager.stats().available, 2);
        assert_eq!(manager.stats().total_expired, 1);
    }

    #[tokio::test]
    async fn events_follow_lifecycle() {
        let manager = LockManager::new(config(1)).unwrap();
        let mut rx = manager.events().subscribe();

        let id = manager.acquire(&ctx("alice")).await.unwrap();
        manager.release(&ctx("alice"), id.as_str()).unwrap();

        assert!(matches!(rx.recv().await.unwrap(), LockEvent::Acquired { .. }));
        assert!(matches!(rx.recv().await.unwrap(), LockEvent::Released { .. }));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(LockManager::new(LockConfig::default()).is_err());

        let mut oversized = config(1);
        oversized.event_buffer = usize::MAX;
        assert!(matches!(
            LockManager::new(oversized),
            Err(Error::Configuration { .. })
        ));
    }
}
