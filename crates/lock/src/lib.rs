//! # dbkeeper lock manager
//!
//! Hands out exclusive leases on a fixed pool of interchangeable test
//! database connections.
//!
//! - [`LockManager`] is the acquire/release façade. Acquire blocks until a
//!   resource is free (or the caller cancels); release returns it.
//! - Forgotten locks are reclaimed by a periodic expiry sweep
//!   ([`LockManager::start_sweeper`]).
//! - [`Admin`] adds session-gated overrides: force-release one resource or
//!   every resource of one owner.
//!
//! Every resource identifier is at all times either free in the
//! [`AvailabilityPool`] or held in the [`LockRegistry`], never both. A
//! release racing with an admin override observes [`Error::NotLocked`] and
//! does not touch the pool.
//!
//! ```no_run
//! # async fn demo() -> dbkeeper_lock::Result<()> {
//! use dbkeeper_lock::{Context, LockConfig, LockManager};
//!
//! let config = LockConfig::from_json_file("dbkeeper.json")?;
//! let manager = LockManager::new(config)?;
//! let _sweeper = manager.start_sweeper();
//!
//! let ctx = Context::new("ci-job-42", "api-key");
//! let db = manager.acquire(&ctx).await?;
//! // ... run tests against `db` ...
//! manager.release(&ctx, db.as_str())?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod manager;
pub mod pool;
pub mod registry;
pub mod resource_set;
pub mod session;
pub mod sweeper;

pub use admin::Admin;
pub use auth::{Authenticator, StaticCredential};
pub use config::{DatabaseConfig, LockConfig, MAX_EVENT_BUFFER, MAX_RESOURCES};
pub use context::Context;
pub use error::{Error, Result};
pub use events::{EventBus, LockEvent, SessionEndReason};
pub use manager::{ForceReleaseOutcome, LockManager, LockStats, ResourceStatus};
pub use pool::AvailabilityPool;
pub use registry::{LockRecord, LockRegistry};
pub use resource_set::{ResourceId, ResourceSet};
pub use session::{SessionStore, SessionToken};
pub use sweeper::SweeperHandle;
