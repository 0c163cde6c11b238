//! Static configuration for the lock manager.
//!
//! Loaded once at startup (typically from a JSON file) and never mutated.
//! Durations are written as whole seconds.

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest resource universe the manager accepts.
pub const MAX_RESOURCES: usize = 100;

/// Largest audit event channel the manager accepts.
pub const MAX_EVENT_BUFFER: usize = 1 << 16;

/// Naming parameters used to synthesize the resource identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database host
    pub host: String,
    /// Database port
    pub port: u16,
    /// User embedded in every connection string
    pub username: String,
    /// Password embedded in every connection string
    #[serde(with = "secret")]
    pub password: SecretString,
    /// Database name prefix; identifiers are `{prefix}1..={prefix}{count}`
    pub prefix: String,
    /// Number of databases in the pool
    pub count: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: SecretString::from(String::new()),
            prefix: "testdb_".to_string(),
            count: 10,
        }
    }
}

/// Lock manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Resource universe parameters
    pub database: DatabaseConfig,
    /// Age after which a held lock is evicted by the expiry sweeper
    #[serde(with = "duration_secs")]
    pub lock_ttl: Duration,
    /// Interval between expiry sweeps
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Inactivity after which an admin session is dropped
    #[serde(with = "duration_secs")]
    pub session_ttl: Duration,
    /// Interval between session sweeps
    #[serde(with = "duration_secs")]
    pub session_sweep_interval: Duration,
    /// Upper bound on how long `acquire` may wait; `None` waits indefinitely
    #[serde(with = "option_duration_secs")]
    pub acquire_timeout: Option<Duration>,
    /// Credential required for acquire and release
    #[serde(with = "secret")]
    pub api_key: SecretString,
    /// Admin dashboard password
    #[serde(with = "secret")]
    pub admin_password: SecretString,
    /// Capacity of the audit event channel
    pub event_buffer: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            lock_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            session_ttl: Duration::from_secs(60 * 60),
            session_sweep_interval: Duration::from_secs(10 * 60),
            acquire_timeout: None,
            api_key: SecretString::from(String::new()),
            admin_password: SecretString::from(String::new()),
            event_buffer: 1024,
        }
    }
}

impl LockConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration_with("malformed configuration", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with(format!("cannot read {}", path.display()), e)
        })?;
        Self::from_json_str(&raw)
    }

    /// Validate configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        if db.count == 0 {
            return Err(Error::configuration("database.count must be greater than 0"));
        }
        if db.count > MAX_RESOURCES {
            return Err(Error::configuration(format!(
                "database.count ({}) must not exceed {MAX_RESOURCES}",
                db.count
            )));
        }
        if db.host.is_empty() {
            return Err(Error::configuration("database.host cannot be empty"));
        }
        if db.prefix.is_empty() {
            return Err(Error::configuration("database.prefix cannot be empty"));
        }
        for (name, value) in [
            ("lock_ttl", self.lock_ttl),
            ("sweep_interval", self.sweep_interval),
            ("session_ttl", self.session_ttl),
            ("session_sweep_interval", self.session_sweep_interval),
        ] {
            if value.is_zero() {
                return Err(Error::configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::configuration("event_buffer must be greater than 0"));
        }
        if self.event_buffer > MAX_EVENT_BUFFER {
            return Err(Error::configuration(format!(
                "event_buffer ({}) must not exceed {MAX_EVENT_BUFFER}",
                self.event_buffer
            )));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(Error::configuration("api_key cannot be empty"));
        }
        if self.admin_password.expose_secret().is_empty() {
            return Err(Error::configuration("admin_password cannot be empty"));
        }
        Ok(())
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

/// Secrets are read in clear and always written redacted.
mod secret {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(_: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<SecretString, D::Error> {
        String::deserialize(deserializer).map(SecretString::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> LockConfig {
        LockConfig {
            api_key: SecretString::from("key".to_string()),
            admin_password: SecretString::from("admin".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_lock_config_default() {
        let config = LockConfig::default();
        assert_eq!(config.database.count, 10);
        assert_eq!(config.lock_ttl, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert_eq!(config.session_sweep_interval, Duration::from_secs(600));
        assert!(config.acquire_timeout.is_none());
    }

    #[test]
    fn test_lock_config_validation() {
        assert!(valid().validate().is_ok());
        // Secrets are required
        assert!(LockConfig::default().validate().is_err());

        let mut c = valid();
        c.database.count = 0;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.database.count = MAX_RESOURCES + 1;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.database.prefix.clear();
        assert!(c.validate().is_err());

        let mut c = valid();
        c.lock_ttl = Duration::ZERO;
        assert!(c.validate().is_err());

        let mut c = valid();
        c.acquire_timeout = Some(Duration::ZERO);
        assert!(c.validate().is_err());

        let mut c = valid();
        c.event_buffer = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn parses_json_with_defaults_for_missing_fields() {
        let config = LockConfig::from_json_str(
            r#"{
                "database": { "host": "db.internal", "count": 3, "password": "pw" },
                "lock_ttl": 120,
                "acquire_timeout": 5,
                "api_key": "key",
                "admin_password": "admin"
            }"#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.count, 3);
        assert_eq!(config.database.password.expose_secret(), "pw");
        assert_eq!(config.lock_ttl, Duration::from_secs(120));
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn oversized_event_buffer_is_rejected() {
        let err = LockConfig::from_json_str(
            r#"{"api_key":"k","admin_password":"a","event_buffer":18446744073709551615}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let mut c = valid();
        c.event_buffer = MAX_EVENT_BUFFER;
        assert!(c.validate().is_ok());
        c.event_buffer = MAX_EVENT_BUFFER + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        let err = LockConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn serialized_config_redacts_secrets() {
        let json = serde_json::to_string(&valid()).unwrap();
        assert!(json.contains("[REDACTED]"));
        assert!(!json.contains("\"admin\""));
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key":"k","admin_password":"a"}"#).unwrap();
        let config = LockConfig::from_json_file(&path).unwrap();
        assert_eq!(config.database.count, 10);

        let missing = LockConfig::from_json_file(dir.path().join("nope.json"));
        assert!(matches!(missing, Err(Error::Configuration { .. })));
    }
}
