use crate::{ConnectionState, Message, MessageSink, SendContext, SinkError, SinkMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A sink that just collects messages for testing with bounded storage
#[derive(Debug)]
pub struct CollectorSink {
    /// Bounded message queue to prevent memory leaks
    messages: Mutex<VecDeque<Message>>,
    /// Maximum number of messages to store
    max_messages: usize,
    connected: AtomicBool,
    fail_on_send: AtomicBool,
    fail_always: AtomicBool,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    name: String,
}

impl CollectorSink {
    /// Create a new collector sink with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a collector that is already connected
    pub fn connected() -> Self {
        let sink = Self::new();
        sink.force_connect();
        sink
    }

    /// Create a new collector sink with specific capacity
    pub fn with_capacity(max_messages: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(max_messages)),
            max_messages,
            connected: AtomicBool::new(false),
            fail_on_send: AtomicBool::new(false),
            fail_always: AtomicBool::new(false),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            name: "test-collector".to_string(),
        }
    }

    /// Create a new collector sink with a name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut sink = Self::new();
        sink.name = name.into();
        sink
    }

    /// Get all received messages
    pub fn received_messages(&self) -> Vec<Message> {
        self.messages.lock().iter().cloned().collect()
    }

    /// Messages received on one topic, in arrival order
    pub fn messages_on(&self, topic: &str) -> Vec<Message> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic() == Some(topic))
            .cloned()
            .collect()
    }

    /// JSON-decoded payloads received on one topic; undecodable payloads are skipped
    pub fn decoded<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.messages_on(topic)
            .iter()
            .filter_map(|m| m.decode().ok())
            .collect()
    }

    /// Get the count of received messages
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Clear all received messages
    pub fn clear_messages(&self) {
        self.messages.lock().clear();
    }

    /// Configure to fail on next send
    pub fn fail_next_send(&self) {
        self.fail_on_send.store(true, Ordering::Relaxed);
    }

    /// Fail every send until [`CollectorSink::stop_failing`]
    pub fn fail_all_sends(&self) {
        self.fail_always.store(true, Ordering::Relaxed);
    }

    pub fn stop_failing(&self) {
        self.fail_always.store(false, Ordering::Relaxed);
    }

    /// Force connect state (for testing)
    pub fn force_connect(&self) {
        self.connected.store(true, Ordering::Relaxed);
    }

    /// Force disconnect state (for testing)
    pub fn force_disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    fn context_for(message: &Message) -> SendContext {
        let mut context = SendContext::new(message.size(), message.metadata.timestamp_ns);
        if let Some(topic) = message.topic() {
            context = context.with_topic(topic);
        }
        if let Some(key) = message.key() {
            context = context.with_key(key);
        }
        context
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSink for CollectorSink {
    async fn send(&self, message: Message) -> Result<(), SinkError> {
        if !self.is_connected() {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
            return Err(SinkError::send_failed_with_context(
                "Not connected",
                Self::context_for(&message),
            ));
        }

        let fail_once = self.fail_on_send.swap(false, Ordering::Relaxed);
        if fail_once || self.fail_always.load(Ordering::Relaxed) {
            self.messages_failed.fetch_add(1, Ordering::Relaxed);
            return Err(SinkError::send_failed_with_context(
                "Simulated failure",
                Self::context_for(&message),
            ));
        }

        // Check capacity and drop oldest if at limit
        {
            let mut messages = self.messages.lock();
            if messages.len() >= self.max_messages {
                messages.pop_front();
            }
            messages.push_back(message);
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
            sink_type: "collector".to_string(),
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

/// A sink that always fails for testing error conditions
#[derive(Debug)]
pub struct FailingSink {
    error_message: String,
}

impl FailingSink {
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
        }
    }
}

impl Default for FailingSink {
    fn default() -> Self {
        Self::new("Simulated failure")
    }
}

#[async_trait]
impl MessageSink for FailingSink {
    async fn send(&self, message: Message) -> Result<(), SinkError> {
        Err(SinkError::send_failed_with_context(
            &self.error_message,
            CollectorSink::context_for(&message),
        ))
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn connect(&self) -> Result<(), SinkError> {
        Err(SinkError::connection_failed(&self.error_message))
    }

    async fn disconnect(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata {
            name: "failing-sink".to_string(),
            sink_type: "test-failing".to_string(),
            state: ConnectionState::Failed,
            messages_sent: 0,
            messages_failed: 0,
            last_error: Some(self.error_message.clone()),
        }
    }
}
