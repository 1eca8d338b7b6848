//! Mock collaborators for deterministic testing.
//!
//! These stand in for the external protocol client and log source so the
//! core machinery can be exercised without a live server.

mod log_source;
mod mock_client;

pub use log_source::{ChannelLogSource, ScriptedLogSource};
pub use mock_client::{MockBotClient, QuitBehavior};
