use std::time::{SystemTime, UNIX_EPOCH};

/// Context information for send operations to aid in debugging
#[derive(Debug, Clone)]
pub struct SendContext {
    /// Size of the message payload in bytes
    pub message_size: usize,
    /// Topic the message was published on, if any
    pub topic: Option<String>,
    /// Partition/ordering key, if any
    pub key: Option<String>,
    /// Timestamp when send was attempted (nanoseconds since epoch)
    pub timestamp_ns: u64,
}

impl SendContext {
    pub fn new(message_size: usize, timestamp_ns: u64) -> Self {
        Self {
            message_size,
            topic: None,
            key: None,
            timestamp_ns,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {error} (size: {size}B, topic: {topic:?}, key: {key:?})",
            size = context.message_size,
            topic = context.topic,
            key = context.key)]
    SendFailed { error: String, context: SendContext },

    #[error("Message too large: {size}B exceeds limit of {limit}B")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Sink closed")]
    Closed,

    #[error("Other error: {0}")]
    Other(String),
}

impl SinkError {
    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SinkError::ConnectionFailed(_) | SinkError::SendFailed { .. })
    }

    /// Create a connection failed error
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        SinkError::ConnectionFailed(msg.into())
    }

    /// Create a send failed error with context
    pub fn send_failed_with_context(msg: impl Into<String>, context: SendContext) -> Self {
        SinkError::SendFailed {
            error: msg.into(),
            context,
        }
    }

    /// Create a send failed error with minimal context
    pub fn send_failed(msg: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        SinkError::SendFailed {
            error: msg.into(),
            context: SendContext::new(0, timestamp),
        }
    }

    /// Create a message too large error
    pub fn message_too_large(size: usize, limit: usize) -> Self {
        SinkError::MessageTooLarge { size, limit }
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        SinkError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::serialization(err)
    }
}
