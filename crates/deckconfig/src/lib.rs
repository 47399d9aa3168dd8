use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;
use scheduler::{DEBOUNCE_WINDOW, FRAME_INTERVAL};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeckConfig {
    pub version: u32,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub transport: TransportPolicy,
    #[serde(default)]
    pub clock: ClockStyle,
    #[serde(default)]
    pub simulator: Simulator,
}

/// Pacing of the per-key render loop and press interpretation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Timing {
    #[serde(
        default = "default_frame_interval",
        deserialize_with = "deserialize_frame_interval"
    )]
    pub frame_interval: Duration,
    #[serde(
        default = "default_debounce_window",
        deserialize_with = "deserialize_debounce_window"
    )]
    pub debounce_window: Duration,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransportPolicy {
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// Colors used when a key shows its clock face.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClockStyle {
    #[serde(default = "default_stroke")]
    pub stroke: String,
    #[serde(default = "default_text")]
    pub text: String,
}

/// Geometry reported by the virtual deck when no hardware is attached.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Simulator {
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default = "default_icon_size")]
    pub icon_size: u32,
}

fn default_frame_interval() -> Duration {
    FRAME_INTERVAL
}

fn default_debounce_window() -> Duration {
    DEBOUNCE_WINDOW
}

fn default_brightness() -> u8 {
    100
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_stroke() -> String {
    "#0000ff".to_string()
}

fn default_text() -> String {
    "#ffffff".to_string()
}

fn default_rows() -> u32 {
    3
}

fn default_cols() -> u32 {
    5
}

fn default_icon_size() -> u32 {
    72
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            frame_interval: default_frame_interval(),
            debounce_window: default_debounce_window(),
        }
    }
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Default for ClockStyle {
    fn default() -> Self {
        Self {
            stroke: default_stroke(),
            text: default_text(),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            icon_size: default_icon_size(),
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            version: 1,
            timing: Timing::default(),
            transport: TransportPolicy::default(),
            clock: ClockStyle::default(),
            simulator: Simulator::default(),
        }
    }
}

fn deserialize_frame_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or(FRAME_INTERVAL))
}

fn deserialize_debounce_window<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_duration_opt(deserializer).map(|d| d.unwrap_or(DEBOUNCE_WINDOW))
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl DeckConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: DeckConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads `path` when it exists, otherwise falls back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.timing.frame_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "timing.frame_interval must be greater than zero".into(),
            ));
        }

        if self.timing.debounce_window.is_zero() {
            return Err(ConfigError::Invalid(
                "timing.debounce_window must be greater than zero".into(),
            ));
        }

        if self.transport.brightness > 100 {
            return Err(ConfigError::Invalid(format!(
                "transport.brightness must be a percentage (got {})",
                self.transport.brightness
            )));
        }

        if self.transport.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "transport.failure_threshold must be at least 1".into(),
            ));
        }

        for (name, value) in [("clock.stroke", &self.clock.stroke), ("clock.text", &self.clock.text)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} may not be empty")));
            }
        }

        let sim = &self.simulator;
        if sim.rows == 0 || sim.cols == 0 {
            return Err(ConfigError::Invalid(format!(
                "simulator grid must have at least one key (got {}x{})",
                sim.rows, sim.cols
            )));
        }

        if sim.icon_size == 0 {
            return Err(ConfigError::Invalid(
                "simulator.icon_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[timing]
frame_interval = "40ms"
debounce_window = 2

[transport]
brightness = 80
failure_threshold = 5

[clock]
stroke = "#112233"

[simulator]
rows = 4
cols = 8
icon_size = 96
"##;

    #[test]
    fn parses_sample_config() {
        let config = DeckConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.timing.frame_interval, Duration::from_millis(40));
        assert_eq!(config.timing.debounce_window, Duration::from_secs(2));
        assert_eq!(config.transport.brightness, 80);
        assert_eq!(config.transport.failure_threshold, 5);
        assert_eq!(config.clock.stroke, "#112233");
        assert_eq!(config.clock.text, "#ffffff");
        assert_eq!(config.simulator.cols, 8);
        assert_eq!(config.simulator.icon_size, 96);
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = DeckConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, DeckConfig::default());
        assert_eq!(config.timing.frame_interval, Duration::from_millis(50));
        assert_eq!(config.timing.debounce_window, Duration::from_millis(1000));
    }

    #[test]
    fn rejects_unknown_version() {
        let err = DeckConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_frame_interval() {
        let err = DeckConfig::from_toml_str(
            r#"
version = 1
[timing]
frame_interval = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_brightness() {
        let err = DeckConfig::from_toml_str(
            r#"
version = 1
[transport]
brightness = 140
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_duration() {
        let err = DeckConfig::from_toml_str(
            r#"
version = 1
[timing]
debounce_window = "soon"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = DeckConfig::load_or_default(Path::new("/nonexistent/facedeck.toml")).unwrap();
        assert_eq!(config.simulator.rows, 3);
    }
}
