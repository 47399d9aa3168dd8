use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Local, TimeZone, Timelike};

use crate::buffer::PixelBuffer;
use crate::color::Rgba;
use crate::text::{draw_text, TextPaint, TextRun};

pub const MILLIS_PER_DAY: u32 = 86_400_000;

/// Time of day on the deck's decimal dial.
///
/// The day is a single fraction in `[0, 1)`; the hour is its first decimal
/// digit, the minute the next two and the second the two after that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalTime {
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
}

impl DecimalTime {
    pub fn from_millis(millis_since_midnight: u32) -> Self {
        let percent = f64::from(millis_since_midnight) / f64::from(MILLIS_PER_DAY);
        let hour = (percent * 10.0).floor() as i64;
        let minute = (percent * 1000.0).floor() as i64 - hour * 100;
        let second = (percent * 100_000.0).floor() as i64 - hour * 10_000 - minute * 100;
        Self {
            hour,
            minute,
            second,
        }
    }

    pub fn now(source: &dyn ClockSource) -> Self {
        Self::from_millis(source.millis_since_midnight())
    }
}

impl fmt::Display for DecimalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Formats a millisecond offset since midnight as `H:MM:SS` decimal time.
pub fn format(millis_since_midnight: u32) -> String {
    DecimalTime::from_millis(millis_since_midnight).to_string()
}

/// Milliseconds elapsed since the wall-clock midnight of `at`'s own day.
pub fn millis_since_midnight<Tz: TimeZone>(at: &DateTime<Tz>) -> u32 {
    let time = at.time();
    // Leap seconds report nanoseconds past 1e9.
    let millis = (time.nanosecond() % 1_000_000_000) / 1_000_000;
    (time.num_seconds_from_midnight() * 1000 + millis).min(MILLIS_PER_DAY - 1)
}

/// Where clock faces read the current time of day from.
pub trait ClockSource: Send + Sync {
    fn millis_since_midnight(&self) -> u32;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn millis_since_midnight(&self) -> u32 {
        millis_since_midnight(&Local::now())
    }
}

/// Clock that reports a settable, fixed time of day.
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicU32,
}

impl FixedClock {
    pub fn new(millis_since_midnight: u32) -> Self {
        Self {
            millis: AtomicU32::new(millis_since_midnight % MILLIS_PER_DAY),
        }
    }

    pub fn set(&self, millis_since_midnight: u32) {
        self.millis
            .store(millis_since_midnight % MILLIS_PER_DAY, Ordering::SeqCst);
    }
}

impl ClockSource for FixedClock {
    fn millis_since_midnight(&self) -> u32 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Styling of the clock face text: an outline pass then an interior pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockFace {
    pub stroke: Rgba,
    pub text: Rgba,
}

impl Default for ClockFace {
    fn default() -> Self {
        Self {
            stroke: Rgba::BLUE,
            text: Rgba::WHITE,
        }
    }
}

impl ClockFace {
    /// Draws `time` left-aligned near the bottom of an already filled buffer.
    pub fn draw(&self, buffer: &mut PixelBuffer, time: DecimalTime) {
        let size = buffer.size() as f32;
        let label = time.to_string();
        let run = TextRun {
            text: &label,
            x: size * 0.05,
            baseline: size * 0.8,
            font_px: size * 0.9,
            max_width: Some(size * 0.9),
        };
        draw_text(
            buffer,
            &run,
            &TextPaint {
                stroke: Some(self.stroke),
                fill: self.text,
            },
        );
    }
}
