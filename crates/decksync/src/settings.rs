use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use deckconfig::DeckConfig;
use keyface::{ClockFace, ClockSource, Rgba, SystemClock};
use scheduler::{DEBOUNCE_WINDOW, FRAME_INTERVAL};

use crate::error::SyncError;

pub const DEFAULT_BRIGHTNESS: u8 = 100;
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Runtime knobs for one engine session.
#[derive(Clone)]
pub struct SyncSettings {
    pub frame_interval: Duration,
    pub debounce_window: Duration,
    pub brightness: u8,
    /// Consecutive failed writes on a key before it is reported degraded.
    pub failure_threshold: u32,
    pub clock_face: ClockFace,
    pub clock: Arc<dyn ClockSource>,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSettings")
            .field("frame_interval", &self.frame_interval)
            .field("debounce_window", &self.debounce_window)
            .field("brightness", &self.brightness)
            .field("failure_threshold", &self.failure_threshold)
            .field("clock_face", &self.clock_face)
            .finish_non_exhaustive()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            frame_interval: FRAME_INTERVAL,
            debounce_window: DEBOUNCE_WINDOW,
            brightness: DEFAULT_BRIGHTNESS,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            clock_face: ClockFace::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &DeckConfig) -> Result<Self, SyncError> {
        config
            .validate()
            .map_err(|err| SyncError::Config(err.to_string()))?;
        let color = |field: &str, value: &str| {
            value
                .parse::<Rgba>()
                .map_err(|err| SyncError::Config(format!("clock.{field}: {err}")))
        };
        Ok(Self {
            frame_interval: config.timing.frame_interval,
            debounce_window: config.timing.debounce_window,
            brightness: config.transport.brightness,
            failure_threshold: config.transport.failure_threshold,
            clock_face: ClockFace {
                stroke: color("stroke", &config.clock.stroke)?,
                text: color("text", &config.clock.text)?,
            },
            ..Self::default()
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SyncError> {
        if self.frame_interval.is_zero() {
            return Err(SyncError::Config("frame interval must be non-zero".into()));
        }
        if self.brightness > 100 {
            return Err(SyncError::Config(format!(
                "brightness {} exceeds 100",
                self.brightness
            )));
        }
        if self.failure_threshold == 0 {
            return Err(SyncError::Config(
                "failure threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_device_conventions() {
        let settings = SyncSettings::default();
        assert_eq!(settings.frame_interval, Duration::from_millis(50));
        assert_eq!(settings.debounce_window, Duration::from_secs(1));
        assert_eq!(settings.brightness, 100);
        assert_eq!(settings.failure_threshold, 3);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn from_config_reads_every_section() {
        let config = DeckConfig::from_toml_str(
            r##"
version = 1

[timing]
frame_interval = "20ms"
debounce_window = "400ms"

[transport]
brightness = 60
failure_threshold = 5

[clock]
stroke = "#ff0000"
text = "#00ff00"
"##,
        )
        .unwrap();
        let settings = SyncSettings::from_config(&config).unwrap();
        assert_eq!(settings.frame_interval, Duration::from_millis(20));
        assert_eq!(settings.debounce_window, Duration::from_millis(400));
        assert_eq!(settings.brightness, 60);
        assert_eq!(settings.failure_threshold, 5);
        assert_eq!(settings.clock_face.stroke, Rgba::rgb(255, 0, 0));
        assert_eq!(settings.clock_face.text, Rgba::rgb(0, 255, 0));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings = SyncSettings {
            frame_interval: Duration::ZERO,
            ..SyncSettings::default()
        };
        assert!(matches!(settings.validate(), Err(SyncError::Config(_))));
    }
}
