//! Acquire cancellation safety tests.
//!
//! Cancelling an acquire mid-wait must not take a resource or corrupt
//! pool state.

use std::time::Duration;

use dbkeeper_lock::{Context, Error, LockConfig, LockManager};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

fn manager(count: usize) -> LockManager {
    let mut config = LockConfig {
        api_key: SecretString::from("key".to_string()),
        admin_password: SecretString::from("admin".to_string()),
        ..Default::default()
    };
    config.database.count = count;
    LockManager::new(config).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn acquire_cancelled_mid_wait_no_slot_leak() {
    let manager = manager(1);
    let holder = Context::new("holder", "key");
    let id = manager.acquire(&holder).await.unwrap();

    let token = CancellationToken::new();
    let waiter_ctx = Context::new("waiter", "key").with_cancellation(token.clone());
    let handle = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.acquire(&waiter_ctx).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(manager.stats().held, 1, "cancelled acquire must not hold");

    manager.release(&holder, id.as_str()).unwrap();
    let again = manager
        .acquire(&Context::new("next", "key"))
        .await
        .expect("pool should still work after cancelled acquire");
    assert_eq!(again, id);
    assert_eq!(manager.stats().waiters, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_acquire_future_leaves_state_unchanged() {
    let manager = manager(1);
    let holder = Context::new("holder", "key");
    let id = manager.acquire(&holder).await.unwrap();

    let aborted = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.acquire(&Context::new("impatient", "key")).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    aborted.abort();
    assert!(aborted.await.unwrap_err().is_cancelled());

    manager.release(&holder, id.as_str()).unwrap();
    let stats = manager.stats();
    assert_eq!(stats.available, 1);
    assert_eq!(stats.held, 0);
    assert_eq!(stats.waiters, 0);
}
