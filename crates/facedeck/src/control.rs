//! JSON-lines control script for the virtual deck.
//!
//! One operation per line, for example `{"op":"fill","key":3,"color":"#112233"}`.
//! Blank lines and lines starting with `#` are skipped. End of input quits.

use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use decksync::{DeckEvent, SyncHandle};
use keyface::{MediaHint, Rgba};
use scheduler::PressEvent;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlOp {
    Down { key: usize },
    Up { key: usize },
    /// Down immediately followed by up.
    Press { key: usize },
    Fill { key: usize, color: String },
    Image { key: usize, path: PathBuf },
    Reset { key: usize },
    Wait { ms: u64 },
    Disconnect,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Where control operations are delivered.
pub struct ControlTarget {
    pub handle: SyncHandle,
    pub events: Sender<DeckEvent>,
}

pub fn parse_line(line: &str) -> Result<Option<ControlOp>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let op = serde_json::from_str(trimmed)
        .with_context(|| format!("invalid control line '{trimmed}'"))?;
    Ok(Some(op))
}

impl ControlTarget {
    pub fn apply(&self, op: ControlOp) -> Result<Flow> {
        match op {
            ControlOp::Down { key } => self.press(PressEvent::down(key, Instant::now()))?,
            ControlOp::Up { key } => self.press(PressEvent::up(key, Instant::now()))?,
            ControlOp::Press { key } => {
                self.press(PressEvent::down(key, Instant::now()))?;
                self.press(PressEvent::up(key, Instant::now()))?;
            }
            ControlOp::Fill { key, color } => {
                let fill: Rgba = color
                    .parse()
                    .with_context(|| format!("invalid fill color for key {key}"))?;
                self.handle.set_fill(key, fill)?;
            }
            ControlOp::Image { key, path } => {
                let bytes = fs::read(&path)
                    .with_context(|| format!("failed to read image {}", path.display()))?;
                let hint = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(MediaHint::from_file_name)
                    .unwrap_or_default();
                tracing::debug!(key, path = %path.display(), ?hint, "uploading image");
                self.handle.request_image(key, bytes, hint)?;
            }
            ControlOp::Reset { key } => self.handle.reset_key(key)?,
            ControlOp::Wait { ms } => thread::sleep(Duration::from_millis(ms)),
            ControlOp::Disconnect => {
                self.events
                    .send(DeckEvent::Disconnected)
                    .context("deck event stream is closed")?;
                return Ok(Flow::Stop);
            }
            ControlOp::Quit => {
                self.handle.shutdown()?;
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    fn press(&self, event: PressEvent) -> Result<()> {
        self.events
            .send(DeckEvent::Press(event))
            .context("deck event stream is closed")
    }

    /// Applies every line of `reader`. Bad lines are logged and skipped.
    pub fn drive(&self, reader: impl BufRead) -> Result<()> {
        for (index, line) in reader.lines().enumerate() {
            let line = line.context("failed to read control input")?;
            let op = match parse_line(&line) {
                Ok(Some(op)) => op,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(line = index + 1, error = %err, "skipping control line");
                    continue;
                }
            };
            match self.apply(op) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return Ok(()),
                Err(err) => {
                    tracing::warn!(line = index + 1, error = %err, "control operation failed")
                }
            }
        }
        tracing::debug!("control input ended");
        // The engine may already be gone.
        let _ = self.handle.shutdown();
        Ok(())
    }
}
