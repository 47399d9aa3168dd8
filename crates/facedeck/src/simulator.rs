//! A deck that lives in memory: accepts key writes like hardware would and
//! optionally dumps each key's face to disk whenever it changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{unbounded, Receiver, Sender};
use decksync::{
    DeckConnection, DeckConnector, DeckEvent, DeckLayout, DeckTransport, SyncError,
    TransportError,
};
use image::{ImageFormat, RgbaImage};

struct DeckState {
    brightness: Option<u8>,
    faces: Vec<Option<Vec<u8>>>,
    writes: u64,
    changes: u64,
}

pub struct VirtualDeck {
    layout: DeckLayout,
    frames_dir: Option<PathBuf>,
    state: Mutex<DeckState>,
}

impl VirtualDeck {
    pub fn new(layout: DeckLayout, frames_dir: Option<PathBuf>) -> std::io::Result<Self> {
        if let Some(dir) = &frames_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            layout,
            frames_dir,
            state: Mutex::new(DeckState {
                brightness: None,
                faces: vec![None; layout.key_count()],
                writes: 0,
                changes: 0,
            }),
        })
    }

    pub fn brightness(&self) -> Option<u8> {
        self.lock().brightness
    }

    /// Total writes accepted and how many of them changed a face.
    pub fn counters(&self) -> (u64, u64) {
        let state = self.lock();
        (state.writes, state.changes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DeckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dump(&self, dir: &Path, key: usize, rgba: &[u8]) -> Result<(), TransportError> {
        let size = self.layout.icon_size;
        let image = RgbaImage::from_raw(size, size, rgba.to_vec())
            .ok_or_else(|| TransportError::Write(format!("frame for key {key} has the wrong size")))?;
        let target = dir.join(format!("key-{key:02}.png"));
        let staging = dir.join(format!(".key-{key:02}.png.tmp"));
        image
            .save_with_format(&staging, ImageFormat::Png)
            .map_err(|err| TransportError::Write(format!("failed to encode key {key}: {err}")))?;
        fs::rename(&staging, &target).map_err(|err| {
            TransportError::Write(format!("failed to publish {}: {err}", target.display()))
        })
    }
}

impl DeckTransport for VirtualDeck {
    fn layout(&self) -> DeckLayout {
        self.layout
    }

    fn set_brightness(&self, percent: u8) -> Result<(), TransportError> {
        self.lock().brightness = Some(percent);
        tracing::debug!(percent, "virtual deck brightness set");
        Ok(())
    }

    fn write_key_buffer(&self, key: usize, rgba: &[u8]) -> Result<(), TransportError> {
        if rgba.len() != self.layout.frame_len() {
            return Err(TransportError::Write(format!(
                "expected {} bytes for key {key}, got {}",
                self.layout.frame_len(),
                rgba.len()
            )));
        }
        // One write at a time, like the single physical connection.
        let mut state = self.lock();
        let unchanged = match state.faces.get(key) {
            Some(face) => face.as_deref() == Some(rgba),
            None => return Err(TransportError::Write(format!("no key {key} on this deck"))),
        };
        state.writes += 1;
        if unchanged {
            return Ok(());
        }
        // The face is only remembered once it has reached disk, so a failed
        // dump is retried by the next identical frame.
        if let Some(dir) = &self.frames_dir {
            self.dump(dir, key, rgba)?;
        }
        state.faces[key] = Some(rgba.to_vec());
        state.changes += 1;
        tracing::trace!(key, "virtual key face changed");
        Ok(())
    }
}

/// Hands out [`VirtualDeck`] sessions wired to a shared event stream.
pub struct VirtualConnector {
    layout: DeckLayout,
    frames_dir: Option<PathBuf>,
    events: Receiver<DeckEvent>,
    decks: Mutex<Vec<Arc<VirtualDeck>>>,
}

impl VirtualConnector {
    /// Returns the connector and the sender used to inject press events.
    pub fn new(layout: DeckLayout, frames_dir: Option<PathBuf>) -> (Self, Sender<DeckEvent>) {
        let (events_tx, events) = unbounded();
        let connector = Self {
            layout,
            frames_dir,
            events,
            decks: Mutex::new(Vec::new()),
        };
        (connector, events_tx)
    }

    /// Most recently connected deck.
    pub fn last_deck(&self) -> Option<Arc<VirtualDeck>> {
        self.decks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl DeckConnector for VirtualConnector {
    fn connect(&self) -> Result<DeckConnection, SyncError> {
        let deck = VirtualDeck::new(self.layout, self.frames_dir.clone()).map_err(|err| {
            SyncError::DeviceUnavailable(format!("cannot prepare virtual deck frames: {err}"))
        })?;
        let deck = Arc::new(deck);
        self.decks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&deck));
        tracing::info!(
            rows = self.layout.rows,
            cols = self.layout.cols,
            icon_size = self.layout.icon_size,
            "connected to virtual deck"
        );
        Ok(DeckConnection {
            transport: deck,
            events: self.events.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LAYOUT: DeckLayout = DeckLayout {
        rows: 1,
        cols: 2,
        icon_size: 4,
    };

    #[test]
    fn only_changed_faces_are_dumped() {
        let dir = TempDir::new().unwrap();
        let deck = VirtualDeck::new(LAYOUT, Some(dir.path().to_path_buf())).unwrap();
        let red: Vec<u8> = [255, 0, 0, 255].repeat(16);

        deck.write_key_buffer(1, &red).unwrap();
        deck.write_key_buffer(1, &red).unwrap();
        assert_eq!(deck.counters(), (2, 1));

        let dumped = image::open(dir.path().join("key-01.png")).unwrap().to_rgba8();
        assert_eq!(dumped.get_pixel(3, 3).0, [255, 0, 0, 255]);
        assert!(!dir.path().join("key-00.png").exists());
    }

    #[test]
    fn failed_dump_is_retried_by_the_next_identical_frame() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        let deck = VirtualDeck::new(LAYOUT, Some(frames.clone())).unwrap();
        let green: Vec<u8> = [0, 255, 0, 255].repeat(16);

        fs::remove_dir_all(&frames).unwrap();
        assert!(matches!(
            deck.write_key_buffer(0, &green),
            Err(TransportError::Write(_))
        ));
        assert_eq!(deck.counters(), (1, 0));

        fs::create_dir_all(&frames).unwrap();
        deck.write_key_buffer(0, &green).unwrap();
        assert_eq!(deck.counters(), (2, 1));
        let dumped = image::open(frames.join("key-00.png")).unwrap().to_rgba8();
        assert_eq!(dumped.get_pixel(0, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn rejects_short_buffers_and_unknown_keys() {
        let deck = VirtualDeck::new(LAYOUT, None).unwrap();
        assert!(matches!(
            deck.write_key_buffer(0, &[0; 3]),
            Err(TransportError::Write(_))
        ));
        assert!(matches!(
            deck.write_key_buffer(2, &[0; 64]),
            Err(TransportError::Write(_))
        ));
    }

    #[test]
    fn connector_shares_one_event_stream() {
        let (connector, events) = VirtualConnector::new(LAYOUT, None);
        let connection = connector.connect().unwrap();
        connection.transport.set_brightness(100).unwrap();
        assert_eq!(connector.last_deck().unwrap().brightness(), Some(100));

        events.send(DeckEvent::Disconnected).unwrap();
        assert_eq!(connection.events.recv().unwrap(), DeckEvent::Disconnected);
    }
}
