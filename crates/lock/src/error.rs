//! Error types for lock management
use thiserror::Error;

/// Result type for lock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Every outcome a caller of the lock manager can observe besides success.
///
/// None of these are fatal: they are returned to the immediate caller, which
/// decides how to report them. Only [`Error::Configuration`] is
/// raised at startup.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing owner identity or rejected credential on a resource operation
    #[error("Unauthenticated: missing owner or invalid credential")]
    Unauthenticated,

    /// Admin password did not match the configured secret
    #[error("Invalid admin credential")]
    InvalidCredential,

    /// Admin operation attempted without a valid session
    #[error("Unauthorized: no valid admin session")]
    Unauthorized,

    /// The caller cancelled the wait for a free resource
    #[error("Acquire cancelled by caller")]
    Cancelled,

    /// No resource became free within the allowed wait
    #[error("Acquire timed out after {timeout_ms}ms")]
    Timeout {
        /// The wait bound in milliseconds
        timeout_ms: u64,
    },

    /// The identifier is not part of the configured universe
    #[error("Unknown resource '{resource}'")]
    UnknownResource {
        /// The identifier as supplied by the caller
        resource: String,
    },

    /// The resource is not currently held
    #[error("Resource '{resource}' is not locked")]
    NotLocked {
        /// The resource identifier
        resource: String,
    },

    /// Static configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error wrapping its cause
    pub fn configuration_with<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub(crate) fn unknown_resource(resource: impl Into<String>) -> Self {
        Self::UnknownResource {
            resource: resource.into(),
        }
    }

    pub(crate) fn not_locked(resource: impl Into<String>) -> Self {
        Self::NotLocked {
            resource: resource.into(),
        }
    }

    /// Whether the caller may treat this outcome as success.
    ///
    /// A release that lost the race against an admin override or the expiry
    /// sweeper reports `NotLocked`; the caller's hold has ended either way.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotLocked { .. })
    }

    /// Whether retrying the same call could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get the resource identifier associated with this error (if any)
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::UnknownResource { resource } | Self::NotLocked { resource } => Some(resource),
            _ => None,
        }
    }
}
