//! Admin session lifecycle: login, activity, logout, idle expiry.

use std::time::Duration;

use dbkeeper_lock::{Admin, Error, LockConfig, LockManager, SessionToken};
use secrecy::SecretString;

fn admin(session_ttl: Duration, sweep_interval: Duration) -> Admin {
    let mut config = LockConfig {
        api_key: SecretString::from("key".to_string()),
        admin_password: SecretString::from("s3cret".to_string()),
        session_ttl,
        session_sweep_interval: sweep_interval,
        ..Default::default()
    };
    config.database.count = 2;
    Admin::new(LockManager::new(config).unwrap())
}

#[tokio::test]
async fn valid_after_login_invalid_after_logout() {
    let admin = admin(Duration::from_secs(3600), Duration::from_secs(600));
    let token = admin.login("s3cret").unwrap();
    assert!(admin.is_authorized(&token));
    assert!(admin.dashboard(&token).is_ok());

    assert!(admin.logout(&token));
    assert!(!admin.is_authorized(&token));
    assert!(matches!(admin.dashboard(&token), Err(Error::Unauthorized)));
}

#[tokio::test]
async fn wrong_password_is_invalid_credential() {
    let admin = admin(Duration::from_secs(3600), Duration::from_secs(600));
    assert!(matches!(admin.login("guess"), Err(Error::InvalidCredential)));
    assert!(matches!(admin.login(""), Err(Error::InvalidCredential)));
    assert!(admin.sessions().is_empty());
}

#[tokio::test]
async fn idle_session_expires() {
    let admin = admin(Duration::from_millis(100), Duration::from_secs(600));
    let token = admin.login("s3cret").unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!admin.is_authorized(&token));
    assert!(matches!(
        admin.release_all_by_owner(&token, "anyone"),
        Err(Error::Unauthorized)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn sweeper_evicts_idle_sessions() {
    let admin = admin(Duration::from_millis(50), Duration::from_millis(20));
    let sweeper = admin.start();
    let _token = admin.login("s3cret").unwrap();
    assert_eq!(admin.sessions().len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(admin.sessions().is_empty(), "idle session should be swept");

    admin.manager().shutdown();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sweeper.is_stopped());
}

#[tokio::test]
async fn forged_token_is_rejected() {
    let admin = admin(Duration::from_secs(3600), Duration::from_secs(600));
    let _real = admin.login("s3cret").unwrap();
    assert!(!admin.is_authorized(&SessionToken::from("not-a-session")));
}
