//! Bounded in-memory history of published events.
//!
//! [`EventHistory`] attaches to a bus as a `"*"` subscriber and records every
//! delivered event with a receive timestamp, keeping the most recent
//! `capacity` entries. Useful for post-run assertions and failure diagnosis.

use crate::event_bus::{BusError, EventBus, Subscription};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use warden_proto::Event;

/// One recorded delivery.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub received_at: DateTime<Utc>,
    pub event: Event,
}

/// Ring buffer of recently published events.
#[derive(Clone)]
pub struct EventHistory {
    records: Arc<Mutex<VecDeque<EventRecord>>>,
    capacity: usize,
}

impl EventHistory {
    /// Creates a history retaining at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Subscribes this history to a bus. Keep the returned handle to
    /// detach later.
    pub fn attach(&self, bus: &EventBus) -> Result<Subscription, BusError> {
        let history = self.clone();
        bus.subscribe("*", move |event| {
            history.record(event.clone());
            Ok(())
        })
    }

    fn record(&self, event: Event) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(EventRecord {
            received_at: Utc::now(),
            event,
        });
    }

    /// Snapshot of the recorded events, oldest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().iter().cloned().collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards all records.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<EventRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
