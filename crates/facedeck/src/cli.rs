use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use keyface::Rgba;

#[derive(Parser, Debug)]
#[command(
    name = "facedeck",
    author,
    version,
    about = "Per-key face renderer and sync engine for button decks",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file (defaults to `facedeck.toml` in the config directory).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delay between the end of one key write and the next (e.g. `50ms`).
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub frame_interval: Option<Duration>,

    /// Maximum gap between two releases that toggles a key's mode.
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub debounce_window: Option<Duration>,

    /// Deck brightness in percent.
    #[arg(long, value_name = "PERCENT", value_parser = clap::value_parser!(u8).range(0..=100))]
    pub brightness: Option<u8>,

    /// Rows of keys on the virtual deck.
    #[arg(long, value_name = "N")]
    pub rows: Option<u32>,

    /// Columns of keys on the virtual deck.
    #[arg(long, value_name = "N")]
    pub cols: Option<u32>,

    /// Edge length of each key display in pixels.
    #[arg(long, value_name = "PIXELS")]
    pub icon_size: Option<u32>,

    /// Write `key-NN.png` here whenever a key's face changes.
    #[arg(long, value_name = "DIR")]
    pub frames_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a single key face to a PNG file and exit.
    Preview(PreviewArgs),
    /// Print resolved directories and the config file path.
    Where,
}

#[derive(Parser, Debug)]
pub struct PreviewArgs {
    /// Output PNG path.
    #[arg(long, value_name = "PATH")]
    pub out: PathBuf,

    /// Fill color (`#rgb`, `#rrggbb`, `#rrggbbaa` or `transparent`).
    #[arg(long, value_name = "COLOR", value_parser = parse_color)]
    pub fill: Option<Rgba>,

    /// Image to fit over the fill.
    #[arg(long, value_name = "FILE", conflicts_with = "clock")]
    pub image: Option<PathBuf>,

    /// Show the decimal clock: `now` or milliseconds since midnight.
    #[arg(long, value_name = "now|MILLIS", value_parser = parse_clock)]
    pub clock: Option<ClockArg>,

    /// Key edge length in pixels.
    #[arg(long, value_name = "PIXELS", default_value_t = 72)]
    pub size: u32,

    /// Configuration file supplying clock colors.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockArg {
    Now,
    At(u32),
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_color(value: &str) -> Result<Rgba, String> {
    value.parse::<Rgba>().map_err(|err| err.to_string())
}

pub fn parse_clock(value: &str) -> Result<ClockArg, String> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(ClockArg::Now);
    }
    let millis: u32 = trimmed
        .parse()
        .map_err(|_| format!("invalid clock '{trimmed}'; use `now` or milliseconds since midnight"))?;
    if millis >= keyface::MILLIS_PER_DAY {
        return Err(format!(
            "clock {millis} is past the end of the day ({} ms)",
            keyface::MILLIS_PER_DAY
        ));
    }
    Ok(ClockArg::At(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_arguments() {
        assert_eq!(parse_clock("now").unwrap(), ClockArg::Now);
        assert_eq!(parse_clock(" NOW ").unwrap(), ClockArg::Now);
        assert_eq!(parse_clock("43200000").unwrap(), ClockArg::At(43_200_000));
        assert!(parse_clock("86400000").is_err());
        assert!(parse_clock("noon").is_err());
    }

    #[test]
    fn parses_colors() {
        assert_eq!(parse_color("#112233").unwrap(), Rgba::rgb(0x11, 0x22, 0x33));
        assert_eq!(parse_color("transparent").unwrap(), Rgba::TRANSPARENT);
        assert!(parse_color("#12").is_err());
    }

    #[test]
    fn run_overrides_parse_humantime() {
        let cli = Cli::try_parse_from([
            "facedeck",
            "--frame-interval",
            "20ms",
            "--debounce-window",
            "750ms",
            "--brightness",
            "40",
        ])
        .unwrap();
        assert_eq!(cli.run.frame_interval, Some(Duration::from_millis(20)));
        assert_eq!(cli.run.debounce_window, Some(Duration::from_millis(750)));
        assert_eq!(cli.run.brightness, Some(40));
        assert!(cli.command.is_none());
    }

    #[test]
    fn brightness_above_hundred_is_rejected() {
        assert!(Cli::try_parse_from(["facedeck", "--brightness", "150"]).is_err());
    }

    #[test]
    fn preview_rejects_image_with_clock() {
        let result = Cli::try_parse_from([
            "facedeck", "preview", "--out", "a.png", "--image", "b.png", "--clock", "now",
        ]);
        assert!(result.is_err());
    }
}
