//! Glue between a log source, the parser, and a bus.
//!
//! A [`LogPump`] drains one [`LogSource`] in arrival order, parses each line,
//! and publishes every produced event on its bus. One pump per bus; the pump
//! starts the bus when it runs and stops it when it finishes.

use crate::event_bus::EventBus;
use crate::event_parser::LogEventParser;
use tokio::sync::watch;
use tracing::{debug, warn};
use warden_proto::LogSource;

/// Shutdown handle for a running pump.
#[derive(Debug, Clone)]
pub struct PumpHandle {
    shutdown: watch::Sender<bool>,
}

impl PumpHandle {
    /// Asks the pump to stop after the line it is currently processing.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Pumps a log source through a parser into an event bus.
pub struct LogPump {
    parser: LogEventParser,
    bus: EventBus,
    shutdown: watch::Receiver<bool>,
}

impl LogPump {
    /// Creates a pump and its shutdown handle.
    pub fn new(parser: LogEventParser, bus: EventBus) -> (Self, PumpHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                parser,
                bus,
                shutdown: rx,
            },
            PumpHandle { shutdown: tx },
        )
    }

    /// Runs until the source is exhausted or shutdown is requested.
    ///
    /// Lines are parsed and published in arrival order. In strict-parser
    /// setups an unparseable line is logged and skipped — a bad line must
    /// not stall the stream. The source and the bus are stopped on exit.
    pub async fn run<S: LogSource>(mut self, mut source: S) -> anyhow::Result<()> {
        source.start().await?;
        self.bus.start()?;
        debug!("Log pump started");

        let mut lines: u64 = 0;
        let mut watching = true;
        loop {
            tokio::select! {
                changed = self.shutdown.changed(), if watching => {
                    match changed {
                        Ok(()) => {
                            if *self.shutdown.borrow() {
                                break;
                            }
                        }
                        // Handle dropped without a shutdown request; keep
                        // pumping until the source runs dry.
                        Err(_) => watching = false,
                    }
                }
                maybe_line = source.next_line() => {
                    let Some(line) = maybe_line else {
                        break;
                    };
                    lines += 1;
                    match self.parser.parse(&line) {
                        Ok(Some(event)) => self.bus.publish(&event),
                        Ok(None) => {}
                        Err(error) => {
                            warn!(%error, "Skipping unparseable log line");
                        }
                    }
                }
            }
        }

        source.stop().await?;
        self.bus.stop();
        debug!(lines, "Log pump stopped");
        Ok(())
    }
}
