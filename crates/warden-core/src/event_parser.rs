//! Log-line to event parsing with metadata extraction.
//!
//! [`LogEventParser`] wraps a [`PatternRegistry`] and adds the structured
//! prefix handling (`[HH:MM:SS] [<thread>/<LEVEL>]:`) plus the
//! unknown-pattern policy. The policy is a constructor-time choice: strict
//! parsers reject unclassified lines, lenient parsers return best-effort
//! metadata or nothing.

use crate::pattern_registry::{PatternRegistry, RegistryError};
use crate::patterns;
use regex::{Captures, Regex};
use serde_json::Value;
use thiserror::Error;
use warden_proto::{Event, EventKind, EventMetadata, LogLevel};

/// Parse-time failure. Only strict parsers produce errors.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No registered pattern matched the line body (strict mode only).
    #[error("No pattern matched line: {0}")]
    UnknownPattern(String),
}

/// Constructor-time parser policy.
#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Fail on lines no pattern matches instead of degrading.
    pub strict: bool,
    /// Emit metadata-only events for unmatched lines that carry a prefix.
    pub include_metadata: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            strict: false,
            include_metadata: true,
        }
    }
}

/// Parses raw server log lines into [`Event`]s.
#[derive(Debug, Clone)]
pub struct LogEventParser {
    registry: PatternRegistry,
    options: ParserOptions,
    full_prefix: Regex,
    time_prefix: Regex,
}

impl LogEventParser {
    /// Creates a parser preloaded with the vanilla pattern set.
    pub fn new(options: ParserOptions) -> Self {
        let mut registry = PatternRegistry::new();
        patterns::install_vanilla(&mut registry);
        Self::with_registry(registry, options)
    }

    /// Creates a parser with no built-in patterns.
    pub fn empty(options: ParserOptions) -> Self {
        Self::with_registry(PatternRegistry::new(), options)
    }

    /// Creates a parser over an existing registry.
    pub fn with_registry(registry: PatternRegistry, options: ParserOptions) -> Self {
        Self {
            registry,
            options,
            full_prefix: Regex::new(
                r"^\[(\d{2}:\d{2}:\d{2})\] \[([^\]/]+)/(INFO|WARN|ERROR|DEBUG)\]:\s*",
            )
            .expect("metadata prefix regex is statically valid"),
            time_prefix: Regex::new(r"^\[(\d{2}:\d{2}:\d{2})\]\s*")
                .expect("timestamp prefix regex is statically valid"),
        }
    }

    /// Parses one line of server output.
    ///
    /// Returns `Ok(None)` for empty or whitespace-only input in every mode.
    /// Otherwise metadata extraction is attempted first and is independent of
    /// body classification; an unmatched body yields `UnknownPattern` in
    /// strict mode, a metadata-only event when metadata inclusion is on, or
    /// `Ok(None)`.
    pub fn parse(&self, line: &str) -> Result<Option<Event>, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let (metadata, body) = self.split_metadata(trimmed);

        if let Some(m) = self.registry.find_match(body) {
            let event = Event::new(m.kind, Some(m.data), trimmed).with_metadata(metadata);
            return Ok(Some(event));
        }

        if self.options.strict {
            return Err(ParseError::UnknownPattern(trimmed.to_string()));
        }
        if self.options.include_metadata {
            return Ok(Some(Event::metadata_only(trimmed, metadata)));
        }
        Ok(None)
    }

    /// Splits the structured prefix off a trimmed line.
    ///
    /// A full `[HH:MM:SS] [thread/LEVEL]:` prefix yields all three fields; a
    /// bare `[HH:MM:SS]` prefix yields only the timestamp; no prefix yields
    /// empty metadata and the whole line as body.
    fn split_metadata<'a>(&self, line: &'a str) -> (EventMetadata, &'a str) {
        if let Some(caps) = self.full_prefix.captures(line) {
            let metadata = EventMetadata {
                timestamp: Some(caps[1].to_string()),
                thread: Some(caps[2].to_string()),
                level: caps[3].parse::<LogLevel>().ok(),
            };
            let body = &line[caps.get(0).map_or(0, |m| m.end())..];
            return (metadata, body);
        }

        if let Some(caps) = self.time_prefix.captures(line) {
            let metadata = EventMetadata {
                timestamp: Some(caps[1].to_string()),
                thread: None,
                level: None,
            };
            let body = &line[caps.get(0).map_or(0, |m| m.end())..];
            return (metadata, body);
        }

        (EventMetadata::default(), line)
    }

    /// Registers a consumer-defined pattern at runtime (appended after all
    /// prioritized patterns).
    pub fn add_pattern<F>(
        &mut self,
        name: impl Into<String>,
        matcher_source: &str,
        kind: EventKind,
        extractor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Captures<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.registry.register(name, matcher_source, kind, extractor)
    }

    /// Registers a consumer-defined pattern with an explicit priority.
    pub fn add_pattern_with_priority<F>(
        &mut self,
        name: impl Into<String>,
        matcher_source: &str,
        kind: EventKind,
        priority: i64,
        extractor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Captures<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.registry
            .register_with_priority(name, matcher_source, kind, priority, extractor)
    }

    /// Removes a pattern by name. Returns whether it existed.
    pub fn remove_pattern(&mut self, name: &str) -> bool {
        self.registry.remove(name)
    }

    /// Read access to the underlying registry.
    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// The parser's policy.
    pub fn options(&self) -> ParserOptions {
        self.options
    }
}

impl Default for LogEventParser {
    fn default() -> Self {
        Self::new(ParserOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_prefix_line_yields_typed_event_with_metadata() {
        let parser = LogEventParser::default();
        let event = parser
            .parse("[12:34:56] [Server thread/INFO]: Steve joined the game")
            .unwrap()
            .unwrap();

        assert_eq!(event.kind, Some(EventKind::EntityJoin));
        assert_eq!(event.data, Some(json!({ "player": "Steve" })));
        assert_eq!(event.raw, "[12:34:56] [Server thread/INFO]: Steve joined the game");
        assert_eq!(event.metadata.timestamp.as_deref(), Some("12:34:56"));
        assert_eq!(event.metadata.thread.as_deref(), Some("Server thread"));
        assert_eq!(event.metadata.level, Some(LogLevel::Info));
    }

    #[test]
    fn test_bare_timestamp_prefix_yields_timestamp_only() {
        let parser = LogEventParser::default();
        let event = parser
            .parse("[01:02:03] Steve joined the game")
            .unwrap()
            .unwrap();

        assert_eq!(event.metadata.timestamp.as_deref(), Some("01:02:03"));
        assert!(event.metadata.thread.is_none());
        assert!(event.metadata.level.is_none());
        assert_eq!(event.kind, Some(EventKind::EntityJoin));
    }

    #[test]
    fn test_no_prefix_yields_empty_metadata() {
        let parser = LogEventParser::default();
        let event = parser.parse("Steve joined the game").unwrap().unwrap();
        assert!(event.metadata.is_empty());
    }

    #[test]
    fn test_empty_and_whitespace_input_yield_none_in_every_mode() {
        let lenient = LogEventParser::default();
        let strict = LogEventParser::new(ParserOptions {
            strict: true,
            include_metadata: true,
        });

        for input in ["", "   ", "\t\n"] {
            assert!(lenient.parse(input).unwrap().is_none());
            assert!(strict.parse(input).unwrap().is_none());
        }
    }

    #[test]
    fn test_unmatched_line_policies() {
        let line = "[12:00:00] [Server thread/WARN]: something entirely novel";

        let with_metadata = LogEventParser::default();
        let event = with_metadata.parse(line).unwrap().unwrap();
        assert!(event.kind.is_none());
        assert!(event.data.is_none());
        assert_eq!(event.metadata.level, Some(LogLevel::Warn));

        let without_metadata = LogEventParser::new(ParserOptions {
            strict: false,
            include_metadata: false,
        });
        assert!(without_metadata.parse(line).unwrap().is_none());

        let strict = LogEventParser::new(ParserOptions {
            strict: true,
            include_metadata: true,
        });
        assert!(matches!(
            strict.parse(line),
            Err(ParseError::UnknownPattern(_))
        ));
    }

    #[test]
    fn test_metadata_extracted_even_when_body_unmatched() {
        let parser = LogEventParser::default();
        let event = parser
            .parse("[09:08:07] [Worker-1/DEBUG]: unrecognized chatter")
            .unwrap()
            .unwrap();
        assert_eq!(event.metadata.thread.as_deref(), Some("Worker-1"));
        assert_eq!(event.metadata.level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_runtime_pattern_extension_and_removal() {
        let mut parser = LogEventParser::default();
        parser
            .add_pattern(
                "claim_created",
                r"^\[Claims\] (\S+) claimed a chunk$",
                EventKind::Plugin("claims".into()),
                |caps| Ok(json!({ "player": &caps[1] })),
            )
            .unwrap();

        let event = parser.parse("[Claims] Steve claimed a chunk").unwrap().unwrap();
        assert_eq!(event.kind, Some(EventKind::Plugin("claims".into())));

        assert!(parser.remove_pattern("claim_created"));
        let event = parser.parse("[Claims] Steve claimed a chunk").unwrap().unwrap();
        assert!(event.kind.is_none());
    }

    #[test]
    fn test_clone_carries_user_patterns_independently() {
        let mut parser = LogEventParser::default();
        parser
            .add_pattern("custom", r"^custom line$", EventKind::Plugin("custom".into()), |_| {
                Ok(json!({}))
            })
            .unwrap();

        let mut cloned = parser.clone();
        assert!(cloned.registry().contains("custom"));

        cloned.remove_pattern("custom");
        assert!(parser.registry().contains("custom"));
        assert!(!cloned.registry().contains("custom"));
    }

    #[test]
    fn test_input_is_trimmed_before_matching() {
        let parser = LogEventParser::default();
        let event = parser.parse("   Steve joined the game   ").unwrap().unwrap();
        assert_eq!(event.kind, Some(EventKind::EntityJoin));
        assert_eq!(event.raw, "Steve joined the game");
    }
}
