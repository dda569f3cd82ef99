//! Channel configuration for scheduler communication

/// Channel buffer configuration for scheduler communication
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Event channel buffer size (worker -> control path)
    pub events_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { events_buffer: 256 }
    }
}

impl ChannelConfig {
    /// Create a new channel config with custom event buffer size
    pub fn with_events_buffer(mut self, size: usize) -> Self {
        self.events_buffer = size.max(1);
        self
    }
}
