//! Named, priority-ordered log patterns and first-match classification.
//!
//! A [`PatternRegistry`] owns a set of named {matcher, extractor} pairs and
//! evaluates them in priority order (lower first, ties by insertion order)
//! against a line of text. The first pattern whose matcher succeeds wins.
//! An extractor failure discards that candidate and evaluation continues —
//! a buggy pattern must never block patterns registered after it.

use regex::{Captures, Regex};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use warden_proto::EventKind;

/// Extracts structured data from a successful match.
///
/// Shared via `Arc` so a cloned registry reuses the same (immutable)
/// closures while owning its registration list independently.
pub type Extractor = Arc<dyn Fn(&Captures<'_>) -> anyhow::Result<Value> + Send + Sync>;

/// Errors surfaced at pattern registration time.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A pattern with this name is already registered.
    #[error("Pattern name already registered: {0}")]
    DuplicateName(String),

    /// The matcher source failed to compile.
    #[error("Invalid matcher for pattern '{name}': {source}")]
    InvalidMatcher {
        name: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// The result of a successful classification.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    /// Name of the winning pattern.
    pub pattern_name: String,
    /// Event kind the winning pattern produces.
    pub kind: EventKind,
    /// Extractor output.
    pub data: Value,
}

#[derive(Clone)]
struct Pattern {
    name: String,
    matcher: Regex,
    kind: EventKind,
    extractor: Extractor,
    /// Explicit priority, or `None` for append-after-everything ordering.
    priority: Option<i64>,
    /// Insertion sequence, breaks priority ties.
    seq: u64,
}

impl Pattern {
    /// Sort key: explicit priorities ascending, omitted priorities after
    /// every explicit one, ties by insertion order.
    fn order_key(&self) -> (i64, u64) {
        (self.priority.unwrap_or(i64::MAX), self.seq)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("name", &self.name)
            .field("matcher", &self.matcher.as_str())
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Priority-ordered pattern set. Sole owner of its patterns; mutated only by
/// registration and removal.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    /// Kept sorted by `Pattern::order_key`.
    patterns: Vec<Pattern>,
    next_seq: u64,
}

impl PatternRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pattern with no explicit priority. It is appended after
    /// all explicitly-prioritized and previously-appended patterns.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        matcher_source: &str,
        kind: EventKind,
        extractor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(&Captures<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_inner(name.into(), matcher_source, kind, Arc::new(extractor), None)
    }

    /// Registers a pattern with an explicit priority (lower evaluates first).
    pub fn register_with_priority<F>(
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
        self.register_inner(
            name.into(),
            matcher_source,
            kind,
            Arc::new(extractor),
            Some(priority),
        )
    }

    fn register_inner(
        &mut self,
        name: String,
        matcher_source: &str,
        kind: EventKind,
        extractor: Extractor,
        priority: Option<i64>,
    ) -> Result<(), RegistryError> {
        if self.patterns.iter().any(|p| p.name == name) {
            return Err(RegistryError::DuplicateName(name));
        }

        let matcher = Regex::new(matcher_source).map_err(|source| RegistryError::InvalidMatcher {
            name: name.clone(),
            source: Box::new(source),
        })?;

        let pattern = Pattern {
            name,
            matcher,
            kind,
            extractor,
            priority,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        // Insert at the stable sorted position so matching is a plain scan.
        let idx = self
            .patterns
            .partition_point(|p| p.order_key() <= pattern.order_key());
        self.patterns.insert(idx, pattern);
        Ok(())
    }

    /// Removes a pattern by name. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.name != name);
        self.patterns.len() != before
    }

    /// Evaluates patterns in priority order and returns the first successful
    /// classification, or `None` if nothing matched.
    ///
    /// An extractor failure discards that candidate and evaluation continues
    /// with the next pattern; the failure is never propagated.
    pub fn find_match(&self, text: &str) -> Option<PatternMatch> {
        for pattern in &self.patterns {
            let Some(caps) = pattern.matcher.captures(text) else {
                continue;
            };
            match (pattern.extractor)(&caps) {
                Ok(data) => {
                    return Some(PatternMatch {
                        pattern_name: pattern.name.clone(),
                        kind: pattern.kind.clone(),
                        data,
                    });
                }
                Err(error) => {
                    debug!(
                        pattern = %pattern.name,
                        %error,
                        "Extractor failed, continuing with next pattern"
                    );
                }
            }
        }
        None
    }

    /// Returns true if a pattern with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.name == name)
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if no patterns are registered.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Pattern names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.patterns.iter().map(|p| p.name.as_str()).collect()
    }
}
