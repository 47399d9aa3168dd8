/// Failure reported by the device transport for a single call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("device disconnected")]
    Disconnected,
    #[error("device write failed: {0}")]
    Write(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("no deck available: {0}")]
    DeviceUnavailable(String),
    #[error("deck disconnected")]
    DeviceDisconnected,
    #[error("key {index} is out of range for a deck with {count} keys")]
    KeyOutOfRange { index: usize, count: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid engine settings: {0}")]
    Config(String),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("deck engine is no longer running")]
    Stopped,
}
