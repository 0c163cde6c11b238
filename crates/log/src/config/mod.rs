//! Logger configuration

use serde::{Deserialize, Serialize};

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human friendly
    Pretty,
    /// Single line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Writer {
    /// Standard output
    Stdout,
    /// Standard error
    #[default]
    Stderr,
}

/// Which metadata accompanies each line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show target module
    pub target: bool,
    /// Show thread IDs
    pub thread_ids: bool,
    /// Use ANSI colors
    pub colors: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            source: cfg!(debug_assertions),
            target: true,
            thread_ids: false,
            colors: std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `EnvFilter` directive, e.g. `info` or `dbkeeper_lock=debug,warn`
    pub level: String,
    /// Output format
    pub format: Format,
    /// Output stream
    pub writer: Writer,
    /// Line metadata
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::default(),
            writer: Writer::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `DBKEEPER_LOG` (falling back to `RUST_LOG`) and
    /// `DBKEEPER_LOG_FORMAT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = var("DBKEEPER_LOG").or_else(|| var("RUST_LOG")) {
            config.level = level;
        }
        if let Some(format) = var("DBKEEPER_LOG_FORMAT") {
            config.format = format.parse().unwrap_or_default();
        }
        config
    }

    /// Colorless configuration for tests
    #[cfg(test)]
    pub(crate) fn test() -> Self {
        Self {
            level: "trace".to_string(),
            display: DisplayConfig {
                colors: false,
                target: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}
