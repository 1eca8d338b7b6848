//! # warden-core
//!
//! Core event machinery for the Warden game-server test harness.
//!
//! This crate provides:
//! - A priority-ordered pattern registry that classifies raw log lines
//! - A log-event parser with metadata extraction and strict/lenient policy
//! - An in-process pub/sub event bus keyed by glob topic patterns
//! - A correlator that awaits a specific server-confirmed event with timeout
//! - The connection lifecycle state machine for connect/spawn/quit
//! - Glue for pumping a log source through the parser into a bus

mod config;
mod correlator;
mod event_bus;
mod event_log;
mod event_parser;
mod lifecycle;
mod log_pump;
mod pattern_registry;
mod patterns;
pub mod testing;

pub use config::{ConfigError, HarnessConfig};
pub use correlator::{
    ActionKind, AwaitOptions, CorrelationResult, Correlator, EventFilter, TimeoutTable,
};
pub use event_bus::{BusError, EventBus, Subscription, TopicPattern};
pub use event_log::{EventHistory, EventRecord};
pub use event_parser::{LogEventParser, ParseError, ParserOptions};
pub use lifecycle::{
    Connection, ConnectionLifecycle, ConnectionState, LifecycleError, QuitOutcome, QuitReason,
};
pub use log_pump::{LogPump, PumpHandle};
pub use pattern_registry::{Extractor, PatternMatch, PatternRegistry, RegistryError};
