//! Audit events for lock lifecycle observability.
//!
//! Provides [`LockEvent`] variants emitted whenever a resource changes hands
//! and an [`EventBus`] backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::resource_set::ResourceId;

// ---------------------------------------------------------------------------
// LockEvent
// ---------------------------------------------------------------------------

/// Events emitted when resources are acquired, released or reclaimed.
///
/// Subscribers receive cloned copies via [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub enum LockEvent {
    /// A caller acquired a resource.
    Acquired {
        /// The resource identifier.
        resource: ResourceId,
        /// The new holder.
        owner: String,
    },
    /// A holder released a resource.
    Released {
        /// The resource identifier.
        resource: ResourceId,
        /// The recorded owner.
        owner: String,
        /// How long the resource was held.
        held_for: Duration,
    },
    /// The expiry sweeper reclaimed a forgotten lock.
    Expired {
        /// The resource identifier.
        resource: ResourceId,
        /// The recorded owner.
        owner: String,
        /// How long the resource was held.
        held_for: Duration,
    },
    /// An administrator reclaimed a held resource.
    ForceReleased {
        /// The resource identifier.
        resource: ResourceId,
        /// The owner whose tenure was ended.
        owner: String,
    },
    /// An administrator reclaimed every resource of one owner.
    BulkReleased {
        /// The owner whose locks were removed.
        owner: String,
        /// How many resources were returned to the pool.
        count: usize,
    },
    /// An admin session was opened.
    SessionOpened,
    /// An admin session ended.
    SessionClosed {
        /// Why the session ended.
        reason: SessionEndReason,
    },
}

// ---------------------------------------------------------------------------
// SessionEndReason
// ---------------------------------------------------------------------------

/// Reason an admin session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The administrator logged out.
    Logout,
    /// The session was idle longer than the configured threshold.
    Expired,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for lock events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the
/// emitter).
pub struct EventBus {
    sender: broadcast::Sender<LockEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: LockEvent) {
        // Err only means there are no active receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls behind by more than the buffer size receives
    /// a `Lagged` error and skips to the latest event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(LockEvent::SessionOpened);
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(LockEvent::Acquired {
            resource: ResourceId::from("db1"),
            owner: "alice".to_string(),
        });

        let event = rx.recv().await.expect("should receive event");
        match event {
            LockEvent::Acquired { resource, owner } => {
                assert_eq!(resource.as_str(), "db1");
                assert_eq!(owner, "alice");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(LockEvent::BulkReleased {
            owner: "bob".to_string(),
            count: 3,
        });

        assert!(matches!(rx1.recv().await.unwrap(), LockEvent::BulkReleased { count: 3, .. }));
        assert!(matches!(rx2.recv().await.unwrap(), LockEvent::BulkReleased { count: 3, .. }));
    }
}
