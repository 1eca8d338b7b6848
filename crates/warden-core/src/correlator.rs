//! Correlation: awaiting a specific server-confirmed event with a timeout.
//!
//! [`Correlator::await_event`] subscribes to a live bus and resolves with the
//! first event matching a glob pattern, or times out. When no started bus is
//! reachable it degrades to a pure timer — that mode can never produce a
//! match and exists only as a conservative fallback.
//!
//! Inverted correlation has real absence semantics here: the wait succeeds
//! only if the pattern never occurs within the window, and the first
//! matching event rejects the wait immediately.

use crate::event_bus::{EventBus, TopicPattern};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use warden_proto::Event;

/// Kind of harness action a correlation follows. Different operations have
/// different expected server round-trip latencies, so timeout defaults are
/// per-action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Command,
    Chat,
    Move,
    Dig,
    Place,
    Respawn,
}

/// Per-action timeout defaults with a global fallback.
#[derive(Debug, Clone)]
pub struct TimeoutTable {
    defaults: HashMap<ActionKind, Duration>,
    fallback: Duration,
}

impl Default for TimeoutTable {
    fn default() -> Self {
        let mut defaults = HashMap::new();
        defaults.insert(ActionKind::Command, Duration::from_secs(5));
        defaults.insert(ActionKind::Chat, Duration::from_secs(2));
        defaults.insert(ActionKind::Move, Duration::from_secs(10));
        defaults.insert(ActionKind::Dig, Duration::from_secs(15));
        defaults.insert(ActionKind::Place, Duration::from_secs(10));
        defaults.insert(ActionKind::Respawn, Duration::from_secs(10));
        Self {
            defaults,
            fallback: Duration::from_secs(5),
        }
    }
}

impl TimeoutTable {
    /// Creates a table with only a global fallback.
    pub fn with_fallback(fallback: Duration) -> Self {
        Self {
            defaults: HashMap::new(),
            fallback,
        }
    }

    /// Overrides the timeout for one action kind.
    pub fn set(&mut self, action: ActionKind, timeout: Duration) {
        self.defaults.insert(action, timeout);
    }

    /// Sets the global fallback.
    pub fn set_fallback(&mut self, fallback: Duration) {
        self.fallback = fallback;
    }

    /// Resolves the timeout for an action, falling back to the global
    /// default when the action is unknown or unspecified.
    pub fn for_action(&self, action: Option<ActionKind>) -> Duration {
        action
            .and_then(|a| self.defaults.get(&a).copied())
            .unwrap_or(self.fallback)
    }
}

/// Restricts matching to events whose payload carries a matching identity
/// field (e.g. a specific player).
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub key: String,
    pub value: String,
}

/// Parameters for one correlation wait.
#[derive(Debug, Clone)]
pub struct AwaitOptions {
    /// Glob tested against topic, raw text, then serialized payload.
    pub pattern: String,
    /// Explicit timeout; beats the per-action table when set.
    pub timeout: Option<Duration>,
    /// Action kind used to look up the default timeout.
    pub action: Option<ActionKind>,
    /// Succeed on absence instead of occurrence.
    pub invert: bool,
    /// Optional payload identity restriction.
    pub filter: Option<EventFilter>,
}

impl AwaitOptions {
    /// Options with defaults: table-resolved timeout, no inversion, no filter.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            timeout: None,
            action: None,
            invert: false,
            filter: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn for_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter = Some(EventFilter {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// Outcome of a correlation wait.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationResult {
    /// A matching event occurred (normal wait).
    Matched(Event),
    /// A matching event occurred during an inverted wait — the absence
    /// condition failed, aborted early.
    Rejected(Event),
    /// An inverted wait saw no matching event for the full window.
    ConfirmedAbsent,
    /// A normal wait saw no matching event within the window.
    TimedOut,
}

impl CorrelationResult {
    /// The `Event | null` shape: the triggering event if one occurred.
    pub fn into_event(self) -> Option<Event> {
        match self {
            CorrelationResult::Matched(event) | CorrelationResult::Rejected(event) => Some(event),
            CorrelationResult::ConfirmedAbsent | CorrelationResult::TimedOut => None,
        }
    }

    /// True if the wait's condition held (match for normal waits, absence
    /// for inverted ones).
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CorrelationResult::Matched(_) | CorrelationResult::ConfirmedAbsent
        )
    }
}

/// Stateless event-correlation utility.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    timeouts: TimeoutTable,
}

impl Correlator {
    /// Correlator with the default timeout table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Correlator with an explicit timeout table (e.g. from configuration).
    pub fn with_timeouts(timeouts: TimeoutTable) -> Self {
        Self { timeouts }
    }

    /// Waits for an event matching `options.pattern` on `bus`.
    ///
    /// With a started bus this subscribes to `"*"`, tests every incoming
    /// event, and resolves on the first match or on timeout; the temporary
    /// subscription is removed on every path. Without a started bus it
    /// degrades to a pure timer.
    pub async fn await_event(
        &self,
        bus: Option<&EventBus>,
        options: AwaitOptions,
    ) -> CorrelationResult {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.timeouts.for_action(options.action));

        let live_bus = bus.filter(|b| b.is_started());
        let Some(bus) = live_bus else {
            debug!(
                pattern = %options.pattern,
                ?timeout,
                "No live event bus, degrading to timer-only wait"
            );
            tokio::time::sleep(timeout).await;
            return Self::quiet_result(options.invert);
        };

        let pattern = match TopicPattern::compile(&options.pattern) {
            Ok(pattern) => pattern,
            Err(error) => {
                warn!(%error, "Unusable correlation pattern, degrading to timer-only wait");
                tokio::time::sleep(timeout).await;
                return Self::quiet_result(options.invert);
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let subscription = match bus.subscribe("*", move |event| {
            // The waiter may already be gone; a closed channel is fine.
            let _ = tx.send(event.clone());
            Ok(())
        }) {
            Ok(subscription) => subscription,
            Err(error) => {
                warn!(%error, "Failed to subscribe for correlation, degrading to timer-only wait");
                tokio::time::sleep(timeout).await;
                return Self::quiet_result(options.invert);
            }
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let result = loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(event) => {
                        if Self::event_matches(&pattern, &options, &event) {
                            break if options.invert {
                                CorrelationResult::Rejected(event)
                            } else {
                                CorrelationResult::Matched(event)
                            };
                        }
                    }
                    None => {
                        // Subscription was cleared out from under us; wait
                        // out the window so timing semantics hold.
                        tokio::time::sleep_until(deadline).await;
                        break Self::quiet_result(options.invert);
                    }
                },
                () = tokio::time::sleep_until(deadline) => {
                    break Self::quiet_result(options.invert);
                }
            }
        };

        subscription.unsubscribe();
        result
    }

    fn quiet_result(invert: bool) -> CorrelationResult {
        if invert {
            CorrelationResult::ConfirmedAbsent
        } else {
            CorrelationResult::TimedOut
        }
    }

    /// Tests a candidate event: the identity filter first, then the glob
    /// against the topic, the raw text, and the serialized payload, in that
    /// order — the first field to match wins.
    fn event_matches(pattern: &TopicPattern, options: &AwaitOptions, event: &Event) -> bool {
        if let Some(filter) = &options.filter {
            let matches_filter = event
                .data
                .as_ref()
                .and_then(|data| data.get(&filter.key))
                .is_some_and(|value| match value {
                    serde_json::Value::String(s) => s == &filter.value,
                    other => other.to_string() == filter.value,
                });
            if !matches_filter {
                return false;
            }
        }

        if let Some(topic) = event.topic() {
            if pattern.matches(&topic) {
                return true;
            }
        }
        if pattern.matches(&event.raw) {
            return true;
        }
        if let Some(data) = &event.data {
            if let Ok(serialized) = serde_json::to_string(data) {
                return pattern.matches(&serialized);
            }
        }
        false
    }
}
