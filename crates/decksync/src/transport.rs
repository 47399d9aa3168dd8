use std::sync::Arc;

use crossbeam_channel::Receiver;
use scheduler::PressEvent;

use crate::error::{SyncError, TransportError};

/// Geometry a deck reports once connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckLayout {
    pub rows: u32,
    pub cols: u32,
    /// Edge length of every key's square display, in pixels.
    pub icon_size: u32,
}

impl DeckLayout {
    pub fn key_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Exact byte length of one key buffer write.
    pub fn frame_len(&self) -> usize {
        keyface::byte_len(self.icon_size)
    }
}

/// The single physical connection to a deck.
///
/// Implementations accept one complete key-buffer write at a time; concurrent
/// callers are serialized by the implementation and never see a torn write.
pub trait DeckTransport: Send + Sync {
    fn layout(&self) -> DeckLayout;
    fn set_brightness(&self, percent: u8) -> Result<(), TransportError>;
    fn write_key_buffer(&self, key: usize, rgba: &[u8]) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckEvent {
    Press(PressEvent),
    Disconnected,
}

/// A live session: the transport plus the device's event stream.
pub struct DeckConnection {
    pub transport: Arc<dyn DeckTransport>,
    pub events: Receiver<DeckEvent>,
}

/// Finds a deck and opens a session with it.
pub trait DeckConnector {
    fn connect(&self) -> Result<DeckConnection, SyncError>;
}
