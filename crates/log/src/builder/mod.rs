//! Logger builder implementation

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, Writer};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Build the fmt layer shared by every format, applying display options.
macro_rules! create_fmt_layer {
    ($display:expr, $writer:expr) => {
        tracing_subscriber::fmt::layer()
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_thread_ids($display.thread_ids)
            .with_file($display.source)
            .with_line_number($display.source)
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<()> {
        let filter = EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {e}", self.config.level)))?;

        let writer = match self.config.writer {
            Writer::Stdout => BoxMakeWriter::new(std::io::stdout),
            Writer::Stderr => BoxMakeWriter::new(std::io::stderr),
        };

        let display = &self.config.display;
        let installed = match self.config.format {
            Format::Pretty => Registry::default()
                .with(filter)
                .with(create_fmt_layer!(display, writer).pretty())
                .try_init(),
            Format::Compact => Registry::default()
                .with(filter)
                .with(create_fmt_layer!(display, writer).compact())
                .try_init(),
            Format::Json => Registry::default()
                .with(filter)
                .with(create_fmt_layer!(display, writer).json())
                .try_init(),
        };
        installed.map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(level = %self.config.level, format = ?self.config.format, "logger initialized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_is_rejected_before_install() {
        let config = Config {
            level: "dbkeeper=notalevel".to_string(),
            ..Config::test()
        };
        let err = LoggerBuilder::from_config(config).build().unwrap_err();
        assert!(matches!(err, LogError::Filter(_)));
    }

    #[test]
    fn second_install_reports_already_initialized() {
        // Only one subscriber per process; whichever call runs first installs it.
        let _ = LoggerBuilder::from_config(Config::test()).build();
        let second = LoggerBuilder::from_config(Config::test()).build();
        assert!(matches!(second, Err(LogError::AlreadyInitialized(_))));
    }
}
