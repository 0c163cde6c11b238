//! # dbkeeper logging
//!
//! Installs the process-wide `tracing` subscriber: an `EnvFilter` plus one
//! fmt layer (pretty, compact or JSON). Libraries only emit through
//! `tracing`; binaries call [`init`] once at startup.

mod builder;
mod config;
mod error;

pub use builder::LoggerBuilder;
pub use config::{Config, DisplayConfig, Format, Writer};
pub use error::{LogError, LogResult};

/// Initialize logging from `config`.
///
/// # Errors
/// Fails if the filter cannot be parsed or a global subscriber is already
/// installed.
pub fn init(config: Config) -> LogResult<()> {
    LoggerBuilder::from_config(config).build()
}
