//! # Message Sink
//!
//! Publisher abstraction used by the strategy engine for everything that
//! leaves the process: signals, strategy state changes and order requests.
//!
//! ## Architecture Role
//!
//! ```text
//! Strategy ──┐
//!            ├─► MessageSink::publish(topic, key, payload) ─► broker adapter / UI / log
//! Processor ─┘
//! ```
//!
//! Producers never know what sits behind the sink. [`BroadcastSink`] fans
//! messages out in-process; the test doubles in [`test_utils`] record or
//! reject them.

pub mod broadcast;
pub mod error;
pub mod message;
pub mod metadata;
pub mod test_utils;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;

pub use broadcast::BroadcastSink;
pub use error::{SendContext, SinkError};
pub use message::{Message, MessageMetadata, DEFAULT_MAX_MESSAGE_SIZE};
pub use metadata::{ConnectionState, SinkMetadata};

/// Topic names published by the strategy engine
pub mod topics {
    /// Signals forwarded by strategies, keyed by symbol
    pub const TRADING_SIGNALS: &str = "trading-signals";

    /// Strategy state snapshots, keyed by strategy id
    pub const STRATEGY_STATES: &str = "strategy-states";

    /// Order requests for the broker layer, keyed by symbol
    pub const ORDER_REQUESTS: &str = "order-requests";
}

/// A destination for messages that abstracts away connection details
#[async_trait]
pub trait MessageSink: Send + Sync + Debug {
    /// Send a single message
    async fn send(&self, message: Message) -> Result<(), SinkError>;

    /// Publish a raw payload on `topic` with ordering `key`
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        let message = Message::for_topic(topic, key, payload)?;
        self.send(message).await
    }

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Establish connection (may be no-op if already connected)
    async fn connect(&self) -> Result<(), SinkError>;

    /// Close connection (may be no-op if not connected)
    async fn disconnect(&self) -> Result<(), SinkError>;

    /// Get sink metadata for debugging/monitoring
    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::default()
    }
}

/// Serialize `value` as JSON and publish it
pub async fn publish_json<T>(
    sink: &dyn MessageSink,
    topic: &str,
    key: &str,
    value: &T,
) -> Result<(), SinkError>
where
    T: Serialize + ?Sized + Sync,
{
    let payload = serde_json::to_vec(value)?;
    sink.publish(topic, key, payload).await
}
