use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};

use crate::error::{SyncError, TransportError};
use crate::transport::{DeckConnection, DeckConnector, DeckEvent, DeckLayout, DeckTransport};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Accept,
    Fail,
    Disconnect,
}

/// In-memory deck that records every accepted key write.
pub struct MockDeck {
    layout: DeckLayout,
    write_delay: Duration,
    mode: Mutex<WriteMode>,
    brightness: Mutex<Option<u8>>,
    frames: Mutex<Vec<(usize, Vec<u8>)>>,
    attempts: AtomicUsize,
    in_flight: Vec<AtomicUsize>,
    max_in_flight: Vec<AtomicUsize>,
}

impl MockDeck {
    pub fn new(rows: u32, cols: u32, icon_size: u32) -> Arc<Self> {
        Self::with_delay(rows, cols, icon_size, Duration::ZERO)
    }

    pub fn with_delay(rows: u32, cols: u32, icon_size: u32, write_delay: Duration) -> Arc<Self> {
        let layout = DeckLayout {
            rows,
            cols,
            icon_size,
        };
        let keys = layout.key_count();
        Arc::new(Self {
            layout,
            write_delay,
            mode: Mutex::new(WriteMode::Accept),
            brightness: Mutex::new(None),
            frames: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: (0..keys).map(|_| AtomicUsize::new(0)).collect(),
            max_in_flight: (0..keys).map(|_| AtomicUsize::new(0)).collect(),
        })
    }

    pub fn set_mode(&self, mode: WriteMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn brightness(&self) -> Option<u8> {
        *self.brightness.lock().unwrap()
    }

    pub fn frames_for(&self, key: usize) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn last_frame(&self, key: usize) -> Option<Vec<u8>> {
        self.frames_for(key).pop()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self, key: usize) -> usize {
        self.max_in_flight[key].load(Ordering::SeqCst)
    }

    /// Connection plus the sender side of its event stream.
    pub fn connection(self: &Arc<Self>) -> (DeckConnection, Sender<DeckEvent>) {
        let (events_tx, events) = unbounded();
        let transport: Arc<dyn DeckTransport> = Arc::clone(self) as Arc<dyn DeckTransport>;
        (DeckConnection { transport, events }, events_tx)
    }
}

impl DeckTransport for MockDeck {
    fn layout(&self) -> DeckLayout {
        self.layout
    }

    fn set_brightness(&self, percent: u8) -> Result<(), TransportError> {
        *self.brightness.lock().unwrap() = Some(percent);
        Ok(())
    }

    fn write_key_buffer(&self, key: usize, rgba: &[u8]) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight[key].fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight[key].fetch_max(now, Ordering::SeqCst);
        if !self.write_delay.is_zero() {
            thread::sleep(self.write_delay);
        }
        let mode = *self.mode.lock().unwrap();
        let result = match mode {
            WriteMode::Accept => {
                assert_eq!(rgba.len(), self.layout.frame_len());
                self.frames.lock().unwrap().push((key, rgba.to_vec()));
                Ok(())
            }
            WriteMode::Fail => Err(TransportError::Write("bus error".into())),
            WriteMode::Disconnect => Err(TransportError::Disconnected),
        };
        self.in_flight[key].fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub struct NoDeck;

impl DeckConnector for NoDeck {
    fn connect(&self) -> Result<DeckConnection, SyncError> {
        Err(SyncError::DeviceUnavailable("no matching usb device".into()))
    }
}

/// Polls `condition` until it holds or [`WAIT`] elapses.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
