//! Key face rendering for button decks with per-key displays.
//!
//! Every key shows a square RGBA frame. A frame is always produced in the same
//! order:
//!
//! ```text
//!   fill color ──▶ PixelBuffer::filled
//!                        │
//!        ┌───────────────┴────────────────┐
//!        ▼ Face::Image                     ▼ Face::Clock
//!   fit_centered + resize + blend     DecimalTime ─▶ stroke pass ─▶ fill pass
//!        └───────────────┬────────────────┘
//!                        ▼
//!              RGBA bytes (size² × 4)
//! ```
//!
//! Uploads are turned into [`DecodedImage`]s by [`decode`], which understands
//! raster formats through `image` and SVG through `resvg`. Clock faces read
//! the time of day from a [`ClockSource`].

mod buffer;
pub mod clock;
mod color;
mod compose;
mod fit;
mod source;
mod text;

pub use buffer::{byte_len, PixelBuffer, BYTES_PER_PIXEL};
pub use clock::{
    ClockFace, ClockSource, DecimalTime, FixedClock, SystemClock, MILLIS_PER_DAY,
};
pub use color::{ColorParseError, Rgba};
pub use compose::{render, Compositor, Face};
pub use fit::{fit_centered, FitRect};
pub use source::{decode, DecodeError, DecodedImage, MediaHint, VECTOR_RASTER_EDGE};
pub use text::{draw_text, TextPaint, TextRun};
