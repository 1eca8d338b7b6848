//! Mock protocol client with scripted quit behavior.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use warden_proto::{BotClient, ClientSignal};

/// What the mock does when `quit()` is called.
#[derive(Debug, Clone)]
pub enum QuitBehavior {
    /// Emit `End` synchronously, before `quit()` returns — exercises the
    /// same-tick completion race.
    EndImmediately,
    /// Emit `End` after a delay.
    EndAfter(Duration),
    /// Emit `Error` instead of `End`.
    SignalError(String),
    /// Emit nothing; the caller's quit wait must time out.
    Silent,
    /// Fail the quit request itself.
    Fail(String),
}

#[derive(Debug)]
struct MockState {
    signals: broadcast::Sender<ClientSignal>,
    quit_behavior: Mutex<QuitBehavior>,
    quit_calls: AtomicUsize,
    force_closes: AtomicUsize,
    has_entity: AtomicBool,
    health: Mutex<Option<f64>>,
}

/// Mock [`BotClient`] driven by the test.
///
/// Clones share one underlying state, so a test can keep a handle for
/// emitting signals and inspecting counters while the lifecycle owns another.
#[derive(Debug, Clone)]
pub struct MockBotClient {
    state: Arc<MockState>,
}

impl Default for MockBotClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBotClient {
    /// Creates a mock with no entity, no health, and `EndImmediately` quits.
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            state: Arc::new(MockState {
                signals,
                quit_behavior: Mutex::new(QuitBehavior::EndImmediately),
                quit_calls: AtomicUsize::new(0),
                force_closes: AtomicUsize::new(0),
                has_entity: AtomicBool::new(false),
                health: Mutex::new(None),
            }),
        }
    }

    /// Sets the scripted quit behavior.
    pub fn with_quit_behavior(self, behavior: QuitBehavior) -> Self {
        *self.state.quit_behavior.lock().unwrap() = behavior;
        self
    }

    /// Emits a lifecycle signal to all current receivers.
    pub fn emit(&self, signal: ClientSignal) {
        // No receivers is fine; the signal is simply unobserved.
        let _ = self.state.signals.send(signal);
    }

    /// Number of live signal receivers.
    pub fn receiver_count(&self) -> usize {
        self.state.signals.receiver_count()
    }

    /// Number of times `quit()` was called.
    pub fn quit_count(&self) -> usize {
        self.state.quit_calls.load(Ordering::SeqCst)
    }

    /// Number of times `force_close()` was called.
    pub fn force_close_count(&self) -> usize {
        self.state.force_closes.load(Ordering::SeqCst)
    }

    pub fn set_entity(&self, present: bool) {
        self.state.has_entity.store(present, Ordering::SeqCst);
    }

    pub fn set_health(&self, health: Option<f64>) {
        *self.state.health.lock().unwrap() = health;
    }
}

#[async_trait]
impl BotClient for MockBotClient {
    fn signals(&self) -> broadcast::Receiver<ClientSignal> {
        self.state.signals.subscribe()
    }

    async fn quit(&self) -> anyhow::Result<()> {
        self.state.quit_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.state.quit_behavior.lock().unwrap().clone();
        match behavior {
            QuitBehavior::EndImmediately => {
                self.emit(ClientSignal::End);
                Ok(())
            }
            QuitBehavior::EndAfter(delay) => {
                let emitter = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    emitter.emit(ClientSignal::End);
                });
                Ok(())
            }
            QuitBehavior::SignalError(message) => {
                self.emit(ClientSignal::Error(message));
                Ok(())
            }
            QuitBehavior::Silent => Ok(()),
            QuitBehavior::Fail(message) => Err(anyhow::anyhow!(message)),
        }
    }

    fn has_entity(&self) -> bool {
        self.state.has_entity.load(Ordering::SeqCst)
    }

    fn health(&self) -> Option<f64> {
        *self.state.health.lock().unwrap()
    }

    async fn force_close(&self) {
        self.state.force_closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quit_end_immediately_is_observable_by_prior_receiver() {
        let client = MockBotClient::new();
        let mut receiver = client.signals();

        client.quit().await.unwrap();
        assert_eq!(receiver.recv().await.unwrap(), ClientSignal::End);
        assert_eq!(client.quit_count(), 1);
    }

    #[tokio::test]
    async fn test_failing_quit_reports_the_message() {
        let client =
            MockBotClient::new().with_quit_behavior(QuitBehavior::Fail("offline".to_string()));
        let error = client.quit().await.unwrap_err();
        assert_eq!(error.to_string(), "offline");
    }
}
