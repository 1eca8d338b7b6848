//! # warden-proto
//!
//! Shared types and trait definitions for the Warden harness core.
//!
//! This crate provides the foundational abstractions used across all Warden
//! crates, including:
//! - The [`Event`] produced from one line of server output
//! - The [`EventKind`] taxonomy with its plugin extension point
//! - Collaborator traits for the protocol client, log source, and command
//!   transport

mod client;
mod event;

pub use client::{BotClient, ClientSignal, CommandTransport, LogSource};
pub use event::{DeathCause, Event, EventKind, EventMetadata, LogLevel};
