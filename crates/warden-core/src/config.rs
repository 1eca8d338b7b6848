//! Harness configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration.

use crate::correlator::{ActionKind, TimeoutTable};
use crate::event_parser::ParserOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration load failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Bound on the connect→spawned wait.
    pub spawn_timeout_secs: u64,
    /// Bound on the quit→disconnected wait.
    pub quit_timeout_secs: u64,
    /// Reject log lines no pattern matches instead of degrading.
    pub strict_parsing: bool,
    /// Emit metadata-only events for unmatched lines.
    pub include_metadata: bool,
    /// Global correlation timeout fallback.
    pub default_timeout_ms: u64,
    /// Per-action correlation timeout overrides.
    pub action_timeouts_ms: HashMap<ActionKind, u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            spawn_timeout_secs: 30,
            quit_timeout_secs: 5,
            strict_parsing: false,
            include_metadata: true,
            default_timeout_ms: 5000,
            action_timeouts_ms: HashMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Parses a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Loads a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn spawn_timeout(&self) -> Duration {
        Duration::from_secs(self.spawn_timeout_secs)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_secs(self.quit_timeout_secs)
    }

    /// Parser policy derived from this config.
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            strict: self.strict_parsing,
            include_metadata: self.include_metadata,
        }
    }

    /// Correlation timeout table: built-in per-action defaults, overridden
    /// by this config's entries, with this config's global fallback.
    pub fn timeout_table(&self) -> TimeoutTable {
        let mut table = TimeoutTable::default();
        table.set_fallback(Duration::from_millis(self.default_timeout_ms));
        for (action, millis) in &self.action_timeouts_ms {
            table.set(*action, Duration::from_millis(*millis));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = HarnessConfig::from_yaml("{}").unwrap();
        assert_eq!(config.spawn_timeout(), Duration::from_secs(30));
        assert_eq!(config.quit_timeout(), Duration::from_secs(5));
        assert!(!config.strict_parsing);
        assert!(config.include_metadata);
    }

    #[test]
    fn test_partial_yaml_overrides_defaults() {
        let yaml = r"
spawn_timeout_secs: 10
strict_parsing: true
action_timeouts_ms:
  dig: 20000
  chat: 1500
";
        let config = HarnessConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.spawn_timeout_secs, 10);
        assert!(config.strict_parsing);

        let table = config.timeout_table();
        assert_eq!(
            table.for_action(Some(ActionKind::Dig)),
            Duration::from_millis(20000)
        );
        assert_eq!(
            table.for_action(Some(ActionKind::Chat)),
            Duration::from_millis(1500)
        );
        // Untouched action keeps the built-in default.
        assert_eq!(
            table.for_action(Some(ActionKind::Move)),
            Duration::from_secs(10)
        );
        assert_eq!(table.for_action(None), Duration::from_millis(5000));
    }

    #[test]
    fn test_from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.yml");
        std::fs::write(&path, "quit_timeout_secs: 2\n").unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.quit_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let result = HarnessConfig::from_yaml("spawn_timeout_secs: [not, a, number]");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
