//! Timing state machines shared by the deck engine.
//!
//! Nothing in here owns a thread or reads the clock on its own: callers feed
//! `Instant`s in and act on the answers. `PressDebouncer` turns raw key
//! releases into toggle gestures, `FramePacer` decides when a key's next frame
//! is due.

mod debounce;
mod pacer;

pub use debounce::{ArmState, PressDebouncer, PressEvent, PressKind, ToggleMode, DEBOUNCE_WINDOW};
pub use pacer::{FramePacer, FRAME_INTERVAL};
