use crate::SinkError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum message size in bytes (1MB default)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Protocol-agnostic message wrapper
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Raw message bytes (JSON for every topic the engine publishes)
    pub payload: Vec<u8>,

    /// Routing metadata
    pub metadata: MessageMetadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageMetadata {
    /// Topic name (see [`crate::topics`])
    pub topic: Option<String>,

    /// Partition/ordering key within the topic
    pub key: Option<String>,

    /// Timestamp when created
    pub timestamp_ns: u64,
}

impl MessageMetadata {
    pub fn new() -> Self {
        Self {
            topic: None,
            key: None,
            timestamp_ns: now_ns(),
        }
    }

    pub fn for_topic(topic: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            key: Some(key.into()),
            timestamp_ns: now_ns(),
        }
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl Message {
    /// Create a new message with payload, validating size
    pub fn new(payload: Vec<u8>) -> Result<Self, SinkError> {
        Self::with_metadata(payload, MessageMetadata::new())
    }

    /// Create a message addressed to `topic` with ordering `key`
    pub fn for_topic(topic: &str, key: &str, payload: Vec<u8>) -> Result<Self, SinkError> {
        Self::with_metadata(payload, MessageMetadata::for_topic(topic, key))
    }

    /// Create a new message with payload and metadata, validating size
    pub fn with_metadata(payload: Vec<u8>, metadata: MessageMetadata) -> Result<Self, SinkError> {
        if payload.len() > DEFAULT_MAX_MESSAGE_SIZE {
            return Err(SinkError::message_too_large(
                payload.len(),
                DEFAULT_MAX_MESSAGE_SIZE,
            ));
        }

        Ok(Self { payload, metadata })
    }

    /// Create a new message without size validation (for internal use)
    pub fn new_unchecked(payload: Vec<u8>) -> Self {
        Self {
            payload,
            metadata: MessageMetadata::new(),
        }
    }

    /// Serialize `value` as JSON into a topic message
    pub fn json<T: Serialize + ?Sized>(topic: &str, key: &str, value: &T) -> Result<Self, SinkError> {
        let payload = serde_json::to_vec(value)?;
        Self::for_topic(topic, key, payload)
    }

    /// Decode the JSON payload
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SinkError> {
        serde_json::from_slice(&self.payload).map_err(SinkError::from)
    }

    pub fn topic(&self) -> Option<&str> {
        self.metadata.topic.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.metadata.key.as_deref()
    }

    /// Get message size in bytes
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; DEFAULT_MAX_MESSAGE_SIZE + 1];
        let err = Message::new(payload).unwrap_err();
        assert!(matches!(err, SinkError::MessageTooLarge { .. }));
    }

    #[test]
    fn test_json_message_carries_routing() {
        let mut body = HashMap::new();
        body.insert("symbol", "NIFTY");
        let msg = Message::json("trading-signals", "NIFTY", &body).unwrap();
        assert_eq!(msg.topic(), Some("trading-signals"));
        assert_eq!(msg.key(), Some("NIFTY"));
        let decoded: HashMap<String, String> = msg.decode().unwrap();
        assert_eq!(decoded["symbol"], "NIFTY");
    }
}
