//! Keeps a button deck's key displays in sync with an in-memory model.
//!
//! [`DeviceSync`] owns one [`KeyState`] per key and mutates it in response to
//! control calls, press events and finished image decodes. Every mutation
//! hands a fresh [`KeySnapshot`] to that key's render worker, which paces
//! writes to the [`DeckTransport`] so a key never has more than one frame in
//! flight and never submits a frame that was superseded while rendering.

mod decode;
mod error;
mod frame;
mod key;
mod settings;
mod sync;
mod transport;

#[cfg(test)]
mod testing;

pub use error::{SyncError, TransportError};
pub use key::{ImageSlot, KeyMode, KeySnapshot, KeyState};
pub use settings::{SyncSettings, DEFAULT_BRIGHTNESS, DEFAULT_FAILURE_THRESHOLD};
pub use sync::{DeviceSync, SessionEnd, SyncHandle, SyncNotice};
pub use transport::{DeckConnection, DeckConnector, DeckEvent, DeckLayout, DeckTransport};
