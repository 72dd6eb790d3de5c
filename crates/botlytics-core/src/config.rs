//! Configuration management.
//!
//! TOML with serde defaults: an empty file (or no file at all) yields a
//! fully working configuration. The `RUST_LOG` environment variable
//! overrides the configured log level at init time.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LogConfig;
use crate::session::DEFAULT_SESSION_WINDOW_MS;
use crate::store::TableNames;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output for interactive use
    #[default]
    Pretty,
    /// JSON lines for CI/ops
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

/// Logical table names, overridable per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub users: String,
    pub sessions: String,
    pub interactions: String,
    pub events: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        let names = TableNames::default();
        Self {
            users: names.users,
            sessions: names.sessions,
            interactions: names.interactions,
            events: names.events,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Session idle window in milliseconds. Takes effect on the next
    /// decision when changed at runtime.
    pub session_duration_ms: u64,
    pub tables: TableConfig,
    pub log: LogConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            session_duration_ms: DEFAULT_SESSION_WINDOW_MS,
            tables: TableConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AnalyticsConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_duration_ms == 0 {
            return Err(ConfigError::ValidationError(
                "session_duration_ms must be greater than zero".to_string(),
            ));
        }
        let names = [
            &self.tables.users,
            &self.tables.sessions,
            &self.tables.interactions,
            &self.tables.events,
        ];
        if names.iter().any(|name| name.is_empty()) {
            return Err(ConfigError::ValidationError(
                "table names must not be empty".to_string(),
            ));
        }
        for (i, a) in names.iter().enumerate() {
            if names[i + 1..].contains(a) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate table name: {a}"
                )));
            }
        }
        Ok(())
    }

    /// Table names in the shape the store layer consumes.
    #[must_use]
    pub fn table_names(&self) -> TableNames {
        TableNames {
            users: self.tables.users.clone(),
            sessions: self.tables.sessions.clone(),
            interactions: self.tables.interactions.clone(),
            events: self.tables.events.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.session_duration_ms, 3_600_000);
        assert_eq!(config.tables.users, "users");
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: AnalyticsConfig = toml::from_str("").unwrap();
        assert_eq!(config.session_duration_ms, DEFAULT_SESSION_WINDOW_MS);
        assert_eq!(config.log.format, LogFormat::Pretty);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: AnalyticsConfig = toml::from_str(
            r#"
            session_duration_ms = 1800000

            [tables]
            events = "tracking_events"
            "#,
        )
        .unwrap();
        assert_eq!(config.session_duration_ms, 1_800_000);
        assert_eq!(config.tables.events, "tracking_events");
        assert_eq!(config.tables.users, "users");
    }

    #[test]
    fn zero_window_is_rejected() {
        let config = AnalyticsConfig {
            session_duration_ms: 0,
            ..AnalyticsConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn duplicate_table_names_are_rejected() {
        let mut config = AnalyticsConfig::default();
        config.tables.events = "users".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = AnalyticsConfig::load("/nonexistent/bly.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bly.toml");
        std::fs::write(&path, "session_duration_ms = 60000\n").unwrap();
        let config = AnalyticsConfig::load(&path).unwrap();
        assert_eq!(config.session_duration_ms, 60_000);
    }

    #[test]
    fn log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn log_format_display() {
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
        assert_eq!(LogFormat::Json.to_string(), "json");
    }
}
