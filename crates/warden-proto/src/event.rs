//! Event types produced from server log output.
//!
//! An [`Event`] is a structured, typed fact derived from one line of raw
//! server output. Its [`EventKind`] is a closed taxonomy with a
//! [`EventKind::Plugin`] variant as the extension point for consumer-defined
//! patterns; the dot-segmented topic string used for bus routing is always
//! derived from the kind, never parsed back out of it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Cause sub-type for entity death events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Fall,
    Drown,
    Burn,
    Slain,
    /// A death line matched, but no specific cause pattern did.
    Unknown,
}

impl DeathCause {
    /// Returns the topic segment for this cause.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeathCause::Fall => "fall",
            DeathCause::Drown => "drown",
            DeathCause::Burn => "burn",
            DeathCause::Slain => "slain",
            DeathCause::Unknown => "unknown",
        }
    }
}

/// The classified kind of an event.
///
/// Kinds are a closed set per category (entity lifecycle, movement, commands,
/// world state, server lifecycle). `Plugin` is the open extension point:
/// consumer-registered patterns produce `Plugin(name)` events routed under
/// the `plugin.<name>` topic namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    EntityJoin,
    EntityLeave,
    EntitySpawn,
    EntityDeath(DeathCause),
    Teleport,
    Command,
    WorldTime,
    WorldWeather,
    WorldDifficulty,
    WorldGamemode,
    WorldSaveStart,
    WorldSaveComplete,
    ServerStarting,
    ServerPreparing,
    ServerDone,
    /// Consumer-defined event, routed under `plugin.<name>`.
    Plugin(String),
}

impl EventKind {
    /// Returns the dot-segmented topic string used for bus routing.
    pub fn topic(&self) -> String {
        match self {
            EventKind::EntityJoin => "entity.join".to_string(),
            EventKind::EntityLeave => "entity.leave".to_string(),
            EventKind::EntitySpawn => "entity.spawn".to_string(),
            EventKind::EntityDeath(cause) => format!("entity.death.{}", cause.as_str()),
            EventKind::Teleport => "movement.teleport".to_string(),
            EventKind::Command => "command.issued".to_string(),
            EventKind::WorldTime => "world.time".to_string(),
            EventKind::WorldWeather => "world.weather".to_string(),
            EventKind::WorldDifficulty => "world.difficulty".to_string(),
            EventKind::WorldGamemode => "world.gamemode".to_string(),
            EventKind::WorldSaveStart => "world.save.start".to_string(),
            EventKind::WorldSaveComplete => "world.save.complete".to_string(),
            EventKind::ServerStarting => "server.starting".to_string(),
            EventKind::ServerPreparing => "server.preparing".to_string(),
            EventKind::ServerDone => "server.done".to_string(),
            EventKind::Plugin(name) => format!("plugin.{name}"),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic())
    }
}

/// Log severity extracted from the structured line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "DEBUG" => Ok(LogLevel::Debug),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        };
        write!(f, "{s}")
    }
}

/// Metadata extracted from a line's structured prefix.
///
/// All three fields are independent of body classification: a line that
/// matches no pattern can still carry full metadata, and a bare `[HH:MM:SS]`
/// prefix yields a timestamp with no thread or level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub timestamp: Option<String>,
    pub thread: Option<String>,
    pub level: Option<LogLevel>,
}

impl EventMetadata {
    /// Returns true if no metadata field was extracted.
    pub fn is_empty(&self) -> bool {
        self.timestamp.is_none() && self.thread.is_none() && self.level.is_none()
    }
}

/// A structured event derived from one line of server output.
///
/// Immutable once produced; it has no lifecycle of its own — it is a
/// transient value passed through the bus and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Classified kind, or `None` for a metadata-only event (the line
    /// matched no pattern but metadata inclusion was enabled).
    pub kind: Option<EventKind>,
    /// Extractor output for the matched pattern, if any.
    pub data: Option<Value>,
    /// The original (trimmed) source line.
    pub raw: String,
    /// Timestamp/thread/level extracted from the line prefix.
    pub metadata: EventMetadata,
}

impl Event {
    /// Creates a classified event with no metadata.
    pub fn new(kind: EventKind, data: Option<Value>, raw: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            data,
            raw: raw.into(),
            metadata: EventMetadata::default(),
        }
    }

    /// Creates a metadata-only event (no pattern matched the body).
    pub fn metadata_only(raw: impl Into<String>, metadata: EventMetadata) -> Self {
        Self {
            kind: None,
            data: None,
            raw: raw.into(),
            metadata,
        }
    }

    /// Attaches extracted metadata.
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the routing topic, or `None` for metadata-only events.
    pub fn topic(&self) -> Option<String> {
        self.kind.as_ref().map(EventKind::topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_death_topic_includes_cause() {
        let kind = EventKind::EntityDeath(DeathCause::Fall);
        assert_eq!(kind.topic(), "entity.death.fall");
    }

    #[test]
    fn test_plugin_topic_namespace() {
        let kind = EventKind::Plugin("claims".to_string());
        assert_eq!(kind.topic(), "plugin.claims");
    }

    #[test]
    fn test_metadata_only_event_has_no_topic() {
        let event = Event::metadata_only("something unrecognized", EventMetadata::default());
        assert!(event.topic().is_none());
        assert!(event.data.is_none());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("INFO".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("TRACE".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = Event::new(
            EventKind::EntityJoin,
            Some(serde_json::json!({"player": "Steve"})),
            "Steve joined the game",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
