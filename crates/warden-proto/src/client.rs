//! Collaborator traits for the protocol client, log source, and command
//! transport.
//!
//! The harness core never speaks the game protocol itself. These traits are
//! the seams it needs: a [`BotClient`] that emits lifecycle signals and can
//! be told to quit, a [`LogSource`] that delivers raw server output lines in
//! order, and a [`CommandTransport`] for issuing server commands.

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Lifecycle signal emitted by the protocol client.
///
/// Each signal fires at most once per connection attempt. Signals are
/// delivered over a broadcast channel, so a receiver obtained *before* the
/// triggering call observes signals sent in the same tick — the lifecycle
/// manager relies on this to avoid register/fire races.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSignal {
    /// The bot's player entity has spawned into the world.
    Spawn,
    /// The server kicked the bot, with the server-supplied reason.
    Kicked(String),
    /// The connection failed with an error.
    Error(String),
    /// The connection ended.
    End,
}

/// The game-protocol client the lifecycle manager drives.
///
/// Implementors own the wire connection. They must emit [`ClientSignal`]s at
/// most once appropriately per attempt and must not drop signals emitted
/// before a listener attaches within the same tick (the broadcast channel
/// discharges this as long as receivers are created before the triggering
/// call).
#[async_trait]
pub trait BotClient: Send + Sync + 'static {
    /// Returns a fresh receiver for lifecycle signals.
    fn signals(&self) -> broadcast::Receiver<ClientSignal>;

    /// Requests a graceful disconnect. The client should follow up with an
    /// `End` signal once the connection actually closes.
    async fn quit(&self) -> anyhow::Result<()>;

    /// True once the bot has a live player entity.
    fn has_entity(&self) -> bool;

    /// Current health reading, if the entity is live and coherent.
    fn health(&self) -> Option<f64>;

    /// Forcibly closes the underlying transport (raw socket/channel), used
    /// as the unconditional last step of teardown. Must be safe to call on
    /// an already-closed transport.
    async fn force_close(&self);
}

/// Upstream source of raw server output lines.
///
/// Delivers one item per server output line, in order, with no deduplication
/// or batching. It does not understand event semantics — that is the
/// parser's job.
#[async_trait]
pub trait LogSource: Send {
    /// Begins delivering lines.
    async fn start(&mut self) -> anyhow::Result<()>;

    /// Stops delivering lines.
    async fn stop(&mut self) -> anyhow::Result<()>;

    /// Returns the next line, or `None` once the source is exhausted or
    /// stopped.
    async fn next_line(&mut self) -> Option<String>;
}

/// Transport for issuing commands to the server.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Executes a server command and returns its immediate response text.
    async fn execute(&self, command: &str) -> anyhow::Result<String>;
}
