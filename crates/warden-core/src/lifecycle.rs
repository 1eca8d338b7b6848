//! Connection lifecycle state machine.
//!
//! One [`ConnectionLifecycle`] drives a [`BotClient`] through
//! `Disconnected → Connecting → Spawning → Spawned` and back down through
//! `Disconnecting → Disconnected`. Every wait is a timer race, and the
//! signal receiver is always armed *before* the triggering call — that is a
//! structural step of the protocol, not a code-ordering convention — so a
//! completion signal fired in the same tick as the request is never lost.
//!
//! `quit` never fails: it resolves to a [`QuitOutcome`] distinguishing clean
//! disconnect, timeout, and error, and tears down the transport, the bus
//! binding, and its signal listener unconditionally on every exit path.

use crate::config::HarnessConfig;
use crate::event_bus::EventBus;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use warden_proto::{BotClient, ClientSignal};

/// State of one connection. Mutated only by the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Spawning,
    Spawned,
    Disconnecting,
    /// Terminal with respect to spawning; a new connect attempt starts a
    /// fresh lifecycle.
    Error,
}

/// Connection establishment failures, typed by cause.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The client never emitted `spawn` within the bounded wait.
    #[error("Bot did not spawn within {0:?}")]
    SpawnTimeout(Duration),

    /// The server kicked the bot, with the server-supplied reason.
    #[error("Kicked by server: {0}")]
    Kicked(String),

    /// The underlying connection failed or ended before spawn.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Why a quit resolved the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuitReason {
    /// The client emitted `end` within the window.
    Clean,
    /// No completion signal arrived within the window.
    Timeout,
    /// The client emitted `error` instead of `end`.
    Error(String),
    /// The quit request itself failed.
    RequestFailed(String),
}

/// Result of a quit. Quit never throws; cleanup code never needs exception
/// handling to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuitOutcome {
    pub success: bool,
    pub reason: QuitReason,
}

/// A live connection: the protocol client, its event bus, and its state.
pub struct Connection<C: BotClient> {
    client: Arc<C>,
    bus: EventBus,
    state: Arc<Mutex<ConnectionState>>,
}

impl<C: BotClient> Connection<C> {
    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The connection's event bus. Created stopped; started by whatever
    /// binds it to a log source (typically a `LogPump`).
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The protocol client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != next {
            debug!(from = ?*state, to = ?next, "Connection state transition");
            *state = next;
        }
    }
}

/// Drives connections through their lifecycle with bounded waits.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    spawn_timeout: Duration,
    quit_timeout: Duration,
}

impl ConnectionLifecycle {
    /// Creates a lifecycle manager with explicit timeouts.
    pub fn new(spawn_timeout: Duration, quit_timeout: Duration) -> Self {
        Self {
            spawn_timeout,
            quit_timeout,
        }
    }

    /// Creates a lifecycle manager from harness configuration.
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.spawn_timeout(), config.quit_timeout())
    }

    /// Establishes a connection: waits, bounded by the spawn timeout, for
    /// the client to emit `spawn`.
    ///
    /// Every failure leaves the connection in `Error` with the signal
    /// listener released; the returned error is typed by cause.
    pub async fn connect<C: BotClient>(&self, client: C) -> Result<Connection<C>, LifecycleError> {
        let connection = Connection {
            client: Arc::new(client),
            bus: EventBus::new(),
            state: Arc::new(Mutex::new(ConnectionState::Connecting)),
        };

        // Armed step: the receiver exists before the first suspension point,
        // so signals fired while we wait are buffered, not lost.
        let mut signals = connection.client.signals();
        connection.set_state(ConnectionState::Spawning);

        let deadline = tokio::time::Instant::now() + self.spawn_timeout;
        loop {
            tokio::select! {
                received = signals.recv() => match received {
                    Ok(ClientSignal::Spawn) => {
                        connection.set_state(ConnectionState::Spawned);
                        info!("Bot spawned");
                        break;
                    }
                    Ok(ClientSignal::Kicked(reason)) => {
                        connection.set_state(ConnectionState::Error);
                        return Err(LifecycleError::Kicked(reason));
                    }
                    Ok(ClientSignal::Error(message)) => {
                        connection.set_state(ConnectionState::Error);
                        return Err(LifecycleError::Connection(message));
                    }
                    Ok(ClientSignal::End) => {
                        connection.set_state(ConnectionState::Error);
                        return Err(LifecycleError::Connection(
                            "connection ended before spawn".to_string(),
                        ));
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Signal receiver lagged during spawn wait");
                    }
                    Err(RecvError::Closed) => {
                        connection.set_state(ConnectionState::Error);
                        return Err(LifecycleError::Connection(
                            "client signal channel closed".to_string(),
                        ));
                    }
                },
                () = tokio::time::sleep_until(deadline) => {
                    connection.set_state(ConnectionState::Error);
                    return Err(LifecycleError::SpawnTimeout(self.spawn_timeout));
                }
            }
        }
        // `signals` is dropped here and on every early return above: no
        // residual listener regardless of outcome.

        Ok(connection)
    }

    /// Requests a graceful disconnect and waits, bounded by the quit
    /// timeout, for the client's completion signal.
    ///
    /// On every exit path — clean end, error signal, timeout, or failed
    /// request — the transport is force-closed, the bus is stopped, the
    /// listener is released, and the state ends at `Disconnected`.
    pub async fn quit<C: BotClient>(&self, connection: &Connection<C>) -> QuitOutcome {
        // Armed before the quit request: an `end` fired synchronously with
        // the request is buffered in this receiver.
        let mut signals = connection.client.signals();
        connection.set_state(ConnectionState::Disconnecting);

        let outcome = match connection.client.quit().await {
            Err(error) => QuitOutcome {
                success: false,
                reason: QuitReason::RequestFailed(error.to_string()),
            },
            Ok(()) => {
                let deadline = tokio::time::Instant::now() + self.quit_timeout;
                loop {
                    tokio::select! {
                        received = signals.recv() => match received {
                            Ok(ClientSignal::End) => {
                                break QuitOutcome {
                                    success: true,
                                    reason: QuitReason::Clean,
                                };
                            }
                            Ok(ClientSignal::Error(message)) => {
                                break QuitOutcome {
                                    success: false,
                                    reason: QuitReason::Error(message),
                                };
                            }
                            Ok(_) => {}
                            Err(RecvError::Lagged(missed)) => {
                                warn!(missed, "Signal receiver lagged during quit wait");
                            }
                            Err(RecvError::Closed) => {
                                break QuitOutcome {
                                    success: false,
                                    reason: QuitReason::Error(
                                        "client signal channel closed".to_string(),
                                    ),
                                };
                            }
                        },
                        () = tokio::time::sleep_until(deadline) => {
                            break QuitOutcome {
                                success: false,
                                reason: QuitReason::Timeout,
                            };
                        }
                    }
                }
            }
        };

        // Unconditional teardown, identical on every path.
        drop(signals);
        connection.client.force_close().await;
        connection.bus.stop();
        connection.set_state(ConnectionState::Disconnected);

        if outcome.success {
            info!("Bot disconnected cleanly");
        } else {
            warn!(reason = ?outcome.reason, "Bot disconnect was not clean");
        }
        outcome
    }

    /// True only when the connection reached `Spawned` and the client
    /// reports a coherent live-entity/health signal.
    pub fn is_ready<C: BotClient>(&self, connection: &Connection<C>) -> bool {
        connection.state() == ConnectionState::Spawned
            && connection.client.has_entity()
            && connection.client.health().is_some()
    }
}
