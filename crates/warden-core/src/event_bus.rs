//! In-process publish/subscribe routing for classified events.
//!
//! Subscribers register a glob [`TopicPattern`] and a callback; `publish`
//! fans an event out synchronously to every matching subscriber in
//! registration order. Callback failures are isolated per callback and
//! reported through a dedicated error side channel — they never reach the
//! publisher.
//!
//! Bus handles are cheap clones sharing one subscription table; one bus
//! exists per live connection and buses are fully independent.

use regex::Regex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};
use warden_proto::Event;

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// `start()` was called on a bus that is already observing its source.
    #[error("Event bus is already observing its source")]
    AlreadyObserving,

    /// A subscription pattern failed to compile.
    #[error("Invalid subscription pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },
}

/// A compiled whole-string glob over event topics.
///
/// `"*"` alone matches anything (including metadata-only events with no
/// topic). A pattern containing `*` compiles to an anchored regex where each
/// `*` expands to any character sequence — `"entity.*"` matches
/// `"entity.join"` and `"entity.death.fall"` but not `"other.entity.join"`.
/// A pattern with no wildcard requires exact equality.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Any,
    Exact(String),
    Glob(Regex),
}

impl TopicPattern {
    /// Compiles a glob pattern.
    pub fn compile(pattern: &str) -> Result<Self, BusError> {
        let matcher = if pattern == "*" {
            Matcher::Any
        } else if pattern.contains('*') {
            let mut regex_source = String::from("^");
            for (i, literal) in pattern.split('*').enumerate() {
                if i > 0 {
                    regex_source.push_str(".*");
                }
                regex_source.push_str(&regex::escape(literal));
            }
            regex_source.push('$');
            let regex = Regex::new(&regex_source).map_err(|source| BusError::InvalidPattern {
                pattern: pattern.to_string(),
                source: Box::new(source),
            })?;
            Matcher::Glob(regex)
        } else {
            Matcher::Exact(pattern.to_string())
        };

        Ok(Self {
            source: pattern.to_string(),
            matcher,
        })
    }

    /// The original pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Tests the pattern against a topic string.
    pub fn matches(&self, topic: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Exact(exact) => exact == topic,
            Matcher::Glob(regex) => regex.is_match(topic),
        }
    }

    /// Tests the pattern against an event's topic. Metadata-only events
    /// (no topic) are matched only by the global wildcard.
    pub fn matches_event(&self, event: &Event) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            _ => event.topic().is_some_and(|topic| self.matches(&topic)),
        }
    }
}

type Callback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&anyhow::Error, &Event) + Send + Sync>;

struct SubEntry {
    id: u64,
    pattern: TopicPattern,
    callback: Callback,
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<SubEntry>,
    error_handlers: Vec<ErrorHandler>,
}

struct BusShared {
    state: Mutex<BusState>,
    started: AtomicBool,
    next_id: AtomicU64,
}

/// Single-process pub/sub router for one connection's event stream.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusShared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a stopped bus with no subscriptions.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusShared {
                state: Mutex::new(BusState::default()),
                started: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a callback for events matching `pattern`.
    ///
    /// Returns a [`Subscription`] handle; call its `unsubscribe()` to stop
    /// delivery. Callbacks run synchronously inside `publish`, so they must
    /// stay fast or hand off to their own task.
    pub fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let compiled = TopicPattern::compile(pattern)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.lock_state();
        state.subscriptions.push(SubEntry {
            id,
            pattern: compiled,
            callback: Arc::new(callback),
        });
        debug!(pattern, id, "Subscription added");

        Ok(Subscription {
            id,
            bus: Arc::clone(&self.inner),
        })
    }

    /// Registers a handler for the error side channel.
    ///
    /// Handlers receive every callback failure together with the event that
    /// triggered it; failures are never re-thrown to the publisher.
    pub fn on_callback_error<F>(&self, handler: F)
    where
        F: Fn(&anyhow::Error, &Event) + Send + Sync + 'static,
    {
        self.lock_state().error_handlers.push(Arc::new(handler));
    }

    /// Delivers an event to every matching subscriber, synchronously, in
    /// registration order. A failing callback does not prevent delivery to
    /// the remaining callbacks.
    pub fn publish(&self, event: &Event) {
        // Snapshot under the lock, invoke outside it, so callbacks may
        // subscribe or unsubscribe without deadlocking.
        let matching: Vec<Callback> = {
            let state = self.lock_state();
            state
                .subscriptions
                .iter()
                .filter(|entry| entry.pattern.matches_event(event))
                .map(|entry| Arc::clone(&entry.callback))
                .collect()
        };

        let mut failures: Vec<anyhow::Error> = Vec::new();
        for callback in matching {
            if let Err(error) = callback(event) {
                warn!(topic = ?event.topic(), %error, "Subscriber callback failed");
                failures.push(error);
            }
        }

        if failures.is_empty() {
            return;
        }
        let handlers: Vec<ErrorHandler> = self.lock_state().error_handlers.clone();
        for error in &failures {
            for handler in &handlers {
                handler(error, event);
            }
        }
    }

    /// Marks the bus as bound to its upstream source.
    pub fn start(&self) -> Result<(), BusError> {
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BusError::AlreadyObserving);
        }
        debug!("Event bus started");
        Ok(())
    }

    /// Unbinds the bus from its upstream source. A no-op when stopped.
    pub fn stop(&self) {
        if self.inner.started.swap(false, Ordering::SeqCst) {
            debug!("Event bus stopped");
        }
    }

    /// True while the bus is bound to its upstream source.
    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// Active (pattern, subscriber count) pairs, first-seen pattern order.
    pub fn subscription_counts(&self) -> Vec<(String, usize)> {
        let state = self.lock_state();
        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in &state.subscriptions {
            let pattern = entry.pattern.as_str();
            match counts.iter_mut().find(|(p, _)| p == pattern) {
                Some((_, count)) => *count += 1,
                None => counts.push((pattern.to_string(), 1)),
            }
        }
        counts
    }

    /// Total number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock_state().subscriptions.len()
    }

    /// Drops every subscription. Subsequent events are silently discarded
    /// until new subscriptions are added.
    pub fn clear_subscriptions(&self) {
        let mut state = self.lock_state();
        let dropped = state.subscriptions.len();
        state.subscriptions.clear();
        debug!(dropped, "All subscriptions cleared");
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        // The lock is held only for short, non-reentrant critical sections;
        // poisoning would indicate a panic inside one of those.
        self.inner
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Handle to one bus subscription.
///
/// `unsubscribe()` is idempotent: removal is membership-checked, so calling
/// it twice is a no-op and never affects other subscriptions on the same
/// pattern. Dropping the handle without calling `unsubscribe()` leaves the
/// subscription active.
pub struct Subscription {
    id: u64,
    bus: Arc<BusShared>,
}

impl Subscription {
    /// Removes this subscription from the bus.
    pub fn unsubscribe(&self) {
        let mut state = self
            .bus
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = state.subscriptions.len();
        state.subscriptions.retain(|entry| entry.id != self.id);
        if state.subscriptions.len() != before {
            debug!(id = self.id, "Subscription removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use warden_proto::{EventKind, EventMetadata};

    fn event(kind: EventKind) -> Event {
        let raw = kind.topic();
        Event::new(kind, Some(json!({})), raw)
    }

    fn counter_sub(bus: &EventBus, pattern: &str) -> (Subscription, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_in = Arc::clone(&count);
        let sub = bus
            .subscribe(pattern, move |_| {
                count_in.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        (sub, count)
    }

    #[test]
    fn test_glob_pattern_is_whole_string_not_segment_scoped() {
        let pattern = TopicPattern::compile("entity.*").unwrap();
        assert!(pattern.matches("entity.join"));
        assert!(pattern.matches("entity.death.fall"));
        assert!(!pattern.matches("other.entity.join"));
        assert!(!pattern.matches("world.save"));
    }

    #[test]
    fn test_exact_pattern_requires_equality() {
        let pattern = TopicPattern::compile("entity.join").unwrap();
        assert!(pattern.matches("entity.join"));
        assert!(!pattern.matches("entity.join.extra"));
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        // The dot in "entity.join" is literal, not "any character".
        let pattern = TopicPattern::compile("entity.j*").unwrap();
        assert!(pattern.matches("entity.join"));
        assert!(!pattern.matches("entityXjoin"));
    }

    #[test]
    fn test_subscription_receives_matching_events_only() {
        let bus = EventBus::new();
        let (_sub, count) = counter_sub(&bus, "entity.*");

        bus.publish(&event(EventKind::EntityJoin));
        bus.publish(&event(EventKind::EntityDeath(warden_proto::DeathCause::Fall)));
        bus.publish(&event(EventKind::WorldSaveComplete));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_global_wildcard_receives_everything_including_metadata_only() {
        let bus = EventBus::new();
        let (_sub, count) = counter_sub(&bus, "*");

        bus.publish(&event(EventKind::WorldTime));
        bus.publish(&Event::metadata_only("noise", EventMetadata::default()));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_metadata_only_event_not_delivered_to_specific_patterns() {
        let bus = EventBus::new();
        let (_sub, count) = counter_sub(&bus, "entity.*");

        bus.publish(&Event::metadata_only("noise", EventMetadata::default()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery_and_is_idempotent() {
        let bus = EventBus::new();
        let (sub_a, count_a) = counter_sub(&bus, "entity.join");
        let (_sub_b, count_b) = counter_sub(&bus, "entity.join");

        sub_a.unsubscribe();
        sub_a.unsubscribe(); // second call is a no-op

        bus.publish(&event(EventKind::EntityJoin));
        assert_eq!(count_a.load(Ordering::SeqCst), 0);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_callback_does_not_block_later_callbacks() {
        let bus = EventBus::new();

        let reported: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let reported_in = Arc::clone(&reported);
        bus.on_callback_error(move |error, event| {
            reported_in
                .lock()
                .unwrap()
                .push(format!("{error}: {}", event.raw));
        });

        let _failing = bus
            .subscribe("entity.join", |_| anyhow::bail!("handler exploded"))
            .unwrap();
        let (_ok, count) = counter_sub(&bus, "entity.join");

        bus.publish(&event(EventKind::EntityJoin));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("handler exploded"));
        assert!(reported[0].contains("entity.join"));
    }

    #[test]
    fn test_start_twice_fails_stop_is_idempotent() {
        let bus = EventBus::new();
        bus.start().unwrap();
        assert!(matches!(bus.start(), Err(BusError::AlreadyObserving)));

        bus.stop();
        bus.stop(); // no-op
        assert!(!bus.is_started());
        bus.start().unwrap();
    }

    #[test]
    fn test_subscription_counts_groups_by_pattern() {
        let bus = EventBus::new();
        let (_a, _) = counter_sub(&bus, "entity.*");
        let (_b, _) = counter_sub(&bus, "entity.*");
        let (_c, _) = counter_sub(&bus, "*");

        assert_eq!(
            bus.subscription_counts(),
            vec![("entity.*".to_string(), 2), ("*".to_string(), 1)]
        );
    }

    #[test]
    fn test_clear_subscriptions_drops_everything() {
        let bus = EventBus::new();
        let (_sub, count) = counter_sub(&bus, "*");

        bus.clear_subscriptions();
        bus.publish(&event(EventKind::EntityJoin));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = EventBus::new();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

        let order_a = Arc::clone(&order);
        let _a = bus
            .subscribe("*", move |_| {
                order_a.lock().unwrap().push("a");
                Ok(())
            })
            .unwrap();
        let order_b = Arc::clone(&order);
        let _b = bus
            .subscribe("*", move |_| {
                order_b.lock().unwrap().push("b");
                Ok(())
            })
            .unwrap();

        bus.publish(&event(EventKind::EntityJoin));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }
}
