//! Scripted and channel-fed log sources.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use warden_proto::LogSource;

/// Log source that replays a fixed list of lines, then ends.
#[derive(Debug)]
pub struct ScriptedLogSource {
    lines: VecDeque<String>,
    started: bool,
}

impl ScriptedLogSource {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into(),
            started: false,
        }
    }
}

#[async_trait]
impl LogSource for ScriptedLogSource {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.started = false;
        Ok(())
    }

    async fn next_line(&mut self) -> Option<String> {
        if !self.started {
            return None;
        }
        self.lines.pop_front()
    }
}

/// Log source fed through an unbounded channel, for tests that push lines
/// while the pump is running. Ends when the sender is dropped.
#[derive(Debug)]
pub struct ChannelLogSource {
    receiver: mpsc::UnboundedReceiver<String>,
    started: bool,
}

impl ChannelLogSource {
    /// Creates the source and its line sender.
    pub fn unbounded() -> (Self, mpsc::UnboundedSender<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                receiver: rx,
                started: false,
            },
            tx,
        )
    }
}

#[async_trait]
impl LogSource for ChannelLogSource {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.started = false;
        self.receiver.close();
        Ok(())
    }

    async fn next_line(&mut self) -> Option<String> {
        if !self.started {
            return None;
        }
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_in_order_then_ends() {
        let mut source = ScriptedLogSource::new(vec!["a".to_string(), "b".to_string()]);
        source.start().await.unwrap();

        assert_eq!(source.next_line().await.as_deref(), Some("a"));
        assert_eq!(source.next_line().await.as_deref(), Some("b"));
        assert_eq!(source.next_line().await, None);
    }

    #[tokio::test]
    async fn test_unstarted_source_yields_nothing() {
        let mut source = ScriptedLogSource::new(vec!["a".to_string()]);
        assert_eq!(source.next_line().await, None);
    }

    #[tokio::test]
    async fn test_channel_source_ends_when_sender_dropped() {
        let (mut source, tx) = ChannelLogSource::unbounded();
        source.start().await.unwrap();

        tx.send("line".to_string()).unwrap();
        assert_eq!(source.next_line().await.as_deref(), Some("line"));

        drop(tx);
        assert_eq!(source.next_line().await, None);
    }
}
