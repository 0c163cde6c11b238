//! Lock registry: who holds what, and since when.
//!
//! The registry is the single source of truth for "is this resource held".
//! Removal from the registry is what entitles a caller to return the id to
//! the [`AvailabilityPool`](crate::pool::AvailabilityPool): exactly one
//! remover wins for each tenure.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::resource_set::ResourceId;

/// Ownership record for one held resource.
#[derive(Debug, Clone, Serialize)]
pub struct LockRecord {
    /// The held resource
    pub resource: ResourceId,
    /// Caller-supplied owner identity
    pub owner: String,
    /// Wall-clock acquisition time
    pub acquired_at: DateTime<Utc>,
    /// Monotonic acquisition time, used for expiry
    #[serde(skip)]
    pub held_since: Instant,
}

impl LockRecord {
    fn new(resource: ResourceId, owner: String) -> Self {
        Self {
            resource,
            owner,
            acquired_at: Utc::now(),
            held_since: Instant::now(),
        }
    }

    /// How long the lock has been held.
    #[must_use]
    pub fn held_for(&self) -> Duration {
        self.held_since.elapsed()
    }

    /// Whether the lock is older than `ttl`.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.held_for() > ttl
    }
}

/// Map from resource id to lock record behind one reader/writer lock.
///
/// The lock is held only for the map operation itself; no method awaits or
/// performs I/O while holding it.
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: RwLock<BTreeMap<ResourceId, LockRecord>>,
}

impl LockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `owner` as the holder of `resource`.
    ///
    /// The caller has just taken `resource` out of the pool, so it cannot be
    /// present already.
    pub fn insert(&self, resource: ResourceId, owner: impl Into<String>) -> LockRecord {
        let record = LockRecord::new(resource.clone(), owner.into());
        let previous = self.locks.write().insert(resource, record.clone());
        debug_assert!(previous.is_none(), "resource inserted twice");
        record
    }

    /// Remove the record for `resource`; `None` if it was not held.
    pub fn remove(&self, resource: &str) -> Option<LockRecord> {
        self.locks.write().remove(resource)
    }

    /// Copy of the record for `resource`.
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<LockRecord> {
        self.locks.read().get(resource).cloned()
    }

    /// Whether `resource` is currently held.
    #[must_use]
    pub fn contains(&self, resource: &str) -> bool {
        self.locks.read().contains_key(resource)
    }

    /// Point-in-time copy of every record, ordered by resource id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LockRecord> {
        self.locks.read().values().cloned().collect()
    }

    /// Atomically remove every record held by `owner`.
    pub fn remove_all_by_owner(&self, owner: &str) -> Vec<LockRecord> {
        self.remove_where(|record| record.owner == owner)
    }

    /// Atomically remove every record older than `ttl`.
    pub fn remove_expired(&self, ttl: Duration) -> Vec<LockRecord> {
        self.remove_where(|record| record.is_expired(ttl))
    }

    /// Number of held resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }

    fn remove_where(&self, mut pred: impl FnMut(&LockRecord) -> bool) -> Vec<LockRecord> {
        let mut locks = self.locks.write();
        let doomed: Vec<ResourceId> = locks
            .values()
            .filter(|record| pred(record))
            .map(|record| record.resource.clone())
            .collect();
        doomed
            .iter()
            .filter_map(|id| locks.remove(id))
            .collect()
    }
}
