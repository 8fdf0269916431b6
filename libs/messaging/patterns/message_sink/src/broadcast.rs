//! In-process fan-out sink backed by `tokio::sync::broadcast`

use crate::{ConnectionState, Message, MessageSink, SinkError, SinkMetadata};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::trace;

/// Publishes every message to all current subscribers
///
/// Publishing with no subscribers is not an error; the message is dropped.
/// Slow subscribers lag and lose the oldest messages, they never block
/// publishers.
#[derive(Debug)]
pub struct BroadcastSink {
    name: String,
    tx: broadcast::Sender<Message>,
    connected: AtomicBool,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        Self::with_name("broadcast", capacity)
    }

    pub fn with_name(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            name: name.into(),
            tx,
            connected: AtomicBool::new(true),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
        }
    }

    /// New receiver observing messages published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl MessageSink for BroadcastSink {
    async fn send(&self, message: Message) -> Result<(), SinkError> {
        if !self.is_connected() {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
            return Err(SinkError::Closed);
        }

        match self.tx.send(message) {
            Ok(receivers) => {
                trace!(receivers, sink = %self.name, "Broadcast message delivered");
            }
            Err(_) => {
                trace!(sink = %self.name, "No subscribers, message dropped");
            }
        }
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    async fn connect(&self) -> Result<(), SinkError> {
        self.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        self.connected.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata {
            name: self.name.clone(),
            sink_type: "broadcast".to_string(),
            state: if self.is_connected() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            },
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            last_error: None,
        }
    }
}
