use std::io;
use std::path::Path;
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use deckconfig::DeckConfig;
use decksync::{DeckLayout, DeviceSync, SessionEnd, SyncNotice, SyncSettings};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::cli::RunArgs;
use crate::control::ControlTarget;
use crate::paths::AppPaths;
use crate::simulator::VirtualConnector;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Reads `explicit` or the default config file, falling back to defaults
/// when the default file does not exist.
pub fn load_config(paths: &AppPaths, explicit: Option<&Path>) -> Result<DeckConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => paths.config_file(),
    };
    let config = DeckConfig::load_or_default(&path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "configuration loaded");
    Ok(config)
}

fn apply_overrides(args: &RunArgs, config: &mut DeckConfig) {
    if let Some(interval) = args.frame_interval {
        config.timing.frame_interval = interval;
    }
    if let Some(window) = args.debounce_window {
        config.timing.debounce_window = window;
    }
    if let Some(brightness) = args.brightness {
        config.transport.brightness = brightness;
    }
    if let Some(rows) = args.rows {
        config.simulator.rows = rows;
    }
    if let Some(cols) = args.cols {
        config.simulator.cols = cols;
    }
    if let Some(icon_size) = args.icon_size {
        config.simulator.icon_size = icon_size;
    }
}

/// Host-facing notice, printed to stdout as one JSON object per line.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum NoticeLine<'a> {
    ModeToggled { key: usize, mode: String },
    ImageDecodeFailed { key: usize, reason: &'a str },
    DeviceDegraded { key: usize, consecutive_failures: u32 },
    DeviceRecovered { key: usize },
    SessionEnded { reason: &'a str },
}

impl<'a> From<&'a SyncNotice> for NoticeLine<'a> {
    fn from(notice: &'a SyncNotice) -> Self {
        match notice {
            SyncNotice::ModeToggled { key, mode } => NoticeLine::ModeToggled {
                key: *key,
                mode: mode.to_string(),
            },
            SyncNotice::ImageDecodeFailed { key, reason } => NoticeLine::ImageDecodeFailed {
                key: *key,
                reason,
            },
            SyncNotice::DeviceDegraded {
                key,
                consecutive_failures,
            } => NoticeLine::DeviceDegraded {
                key: *key,
                consecutive_failures: *consecutive_failures,
            },
            SyncNotice::DeviceRecovered { key } => NoticeLine::DeviceRecovered { key: *key },
        }
    }
}

fn print_line(line: &NoticeLine<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::warn!(error = %err, "failed to encode notice"),
    }
}

fn print_notices(notices: Receiver<SyncNotice>) {
    for notice in notices {
        print_line(&NoticeLine::from(&notice));
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let mut config = load_config(&paths, args.config.as_deref())?;
    apply_overrides(&args, &mut config);
    config
        .validate()
        .context("invalid configuration after applying command-line overrides")?;
    let settings = SyncSettings::from_config(&config)?;

    let layout = DeckLayout {
        rows: config.simulator.rows,
        cols: config.simulator.cols,
        icon_size: config.simulator.icon_size,
    };
    tracing::debug!(
        config = %paths.config_dir().display(),
        data = %paths.data_dir().display(),
        frames = ?args.frames_dir,
        "resolved facedeck paths"
    );
    let (connector, events) = VirtualConnector::new(layout, args.frames_dir.clone());
    let mut sync = DeviceSync::connect(&connector, settings).context("failed to open deck")?;

    let (notice_tx, notice_rx) = unbounded();
    let printer = thread::Builder::new()
        .name("facedeck-notices".into())
        .spawn(move || print_notices(notice_rx))
        .context("failed to spawn notice printer")?;

    let control = ControlTarget {
        handle: sync.handle(),
        events,
    };
    // Left detached: it may be blocked on stdin when the session ends.
    thread::Builder::new()
        .name("facedeck-control".into())
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(err) = control.drive(stdin.lock()) {
                tracing::error!(error = %err, "control input failed");
                let _ = control.handle.shutdown();
            }
        })
        .context("failed to spawn control reader")?;

    let end = sync.run(&notice_tx)?;
    drop(sync);
    drop(notice_tx);
    if printer.join().is_err() {
        tracing::warn!("notice printer panicked");
    }

    let reason = match end {
        SessionEnd::Shutdown => "shutdown",
        SessionEnd::Disconnected => "disconnected",
    };
    print_line(&NoticeLine::SessionEnded { reason });
    if let Some(deck) = connector.last_deck() {
        let (writes, changes) = deck.counters();
        tracing::info!(
            reason,
            writes,
            changes,
            brightness = ?deck.brightness(),
            "session finished"
        );
    }
    Ok(())
}
