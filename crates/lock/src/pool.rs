//! Availability pool: the bounded buffer of currently free identifiers.
//!
//! The semaphore's permit count always equals the number of queued ids:
//! `take` consumes a permit before popping, `put` pushes before adding a
//! permit. A waiter holding a permit is therefore guaranteed to find an id.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::resource_set::ResourceId;

/// Blocking, cancellable multiset of free resource identifiers.
///
/// The pool never checks for duplicates: putting back an id that is already
/// queued is a bug in the caller (see [`LockManager`](crate::LockManager)).
pub struct AvailabilityPool {
    free: Mutex<VecDeque<ResourceId>>,
    permits: Semaphore,
    capacity: usize,
    waiters: AtomicUsize,
}

impl std::fmt::Debug for AvailabilityPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityPool")
            .field("available", &self.available())
            .field("capacity", &self.capacity)
            .field("waiters", &self.waiters())
            .finish()
    }
}

impl AvailabilityPool {
    /// Create a pool pre-filled with `ids`.
    pub fn new(ids: impl IntoIterator<Item = ResourceId>) -> Self {
        let free: VecDeque<ResourceId> = ids.into_iter().collect();
        let capacity = free.len();
        Self {
            permits: Semaphore::new(capacity),
            free: Mutex::new(free),
            capacity,
            waiters: AtomicUsize::new(0),
        }
    }

    /// Take a free id without waiting.
    pub fn try_take(&self) -> Option<ResourceId> {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                Some(self.pop())
            }
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => None,
        }
    }

    /// Wait for a free id.
    ///
    /// Fails with [`Error::Cancelled`] when `cancel` fires and with
    /// [`Error::Timeout`] when `timeout` elapses. On failure nothing has been
    /// removed from the pool: dropping an unfinished semaphore acquire
    /// releases its place in the queue without consuming a permit.
    pub async fn take(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<ResourceId> {
        if let Some(id) = self.try_take() {
            return Ok(id);
        }

        self.waiters.fetch_add(1, Ordering::Relaxed);
        let _waiting = WaiterGuard(&self.waiters);

        let acquire = self.permits.acquire();
        let permit = match timeout {
            Some(limit) => tokio::select! {
                res = tokio::time::timeout(limit, acquire) => match res {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(Error::Timeout {
                            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                },
                () = cancel.cancelled() => return Err(Error::Cancelled),
            },
            None => tokio::select! {
                permit = acquire => permit,
                () = cancel.cancelled() => return Err(Error::Cancelled),
            },
        };

        // The semaphore is never closed.
        let Ok(permit) = permit else {
            return Err(Error::Cancelled);
        };
        permit.forget();
        Ok(self.pop())
    }

    /// Return an id to the pool and wake one waiter.
    pub fn put(&self, id: ResourceId) {
        self.free.lock().push_back(id);
        self.permits.add_permits(1);
    }

    /// Number of ids currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of callers blocked in [`take`](Self::take).
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Size of the universe the pool was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the free ids, front first.
    #[must_use]
    pub fn free_ids(&self) -> Vec<ResourceId> {
        self.free.lock().iter().cloned().collect()
    }

    fn pop(&self) -> ResourceId {
        // A forgotten permit stands for exactly one queued id.
        match self.free.lock().pop_front() {
            Some(id) => id,
            None => unreachable!("semaphore permit without a queued resource"),
        }
    }
}

struct WaiterGuard<'a>(&'a AtomicUsize);

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}
