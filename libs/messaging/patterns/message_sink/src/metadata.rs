/// Information about a sink for monitoring/debugging
#[derive(Debug, Clone, Default)]
pub struct SinkMetadata {
    /// Human-readable sink name
    pub name: String,

    /// Sink type (broadcast, collector, ...)
    pub sink_type: String,

    /// Current connection state
    pub state: ConnectionState,

    /// Messages sent successfully
    pub messages_sent: u64,

    /// Messages failed to send
    pub messages_failed: u64,

    /// Last error if any
    pub last_error: Option<String>,
}

impl SinkMetadata {
    /// Create new metadata with name and type
    pub fn new(name: impl Into<String>, sink_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_type: sink_type.into(),
            state: ConnectionState::Disconnected,
            messages_sent: 0,
            messages_failed: 0,
            last_error: None,
        }
    }

    /// Set connection state
    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Failed,
}
