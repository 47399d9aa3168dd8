use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use keyface::{Compositor, DecodedImage, MediaHint, Rgba};
use scheduler::{FramePacer, PressDebouncer, PressEvent, PressKind};
use tracing::{debug, info, warn};

use crate::decode::spawn_decode;
use crate::error::{SyncError, TransportError};
use crate::frame::{FrameContext, FrameWorker, WorkerReport};
use crate::key::{KeyMode, KeyState};
use crate::settings::SyncSettings;
use crate::transport::{DeckConnection, DeckConnector, DeckEvent, DeckLayout};

const IDLE_POLL: Duration = Duration::from_millis(500);

pub(crate) enum SyncMessage {
    SetFill {
        key: usize,
        fill: Rgba,
    },
    SetImage {
        key: usize,
        image: Arc<DecodedImage>,
    },
    DecodeImage {
        key: usize,
        bytes: Vec<u8>,
        hint: MediaHint,
    },
    ImageDecoded {
        key: usize,
        ticket: u64,
        image: Arc<DecodedImage>,
    },
    ImageDecodeFailed {
        key: usize,
        ticket: u64,
        reason: String,
    },
    ResetKey {
        key: usize,
    },
    Shutdown,
}

/// Things worth telling whoever drives the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    ModeToggled { key: usize, mode: KeyMode },
    ImageDecodeFailed { key: usize, reason: String },
    DeviceDegraded { key: usize, consecutive_failures: u32 },
    DeviceRecovered { key: usize },
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Cloneable control surface for a running [`DeviceSync`].
///
/// Calls are queued to the engine thread; range checks happen up front.
#[derive(Clone)]
pub struct SyncHandle {
    inbox: Sender<SyncMessage>,
    key_count: usize,
    stopped: Arc<AtomicBool>,
}

impl SyncHandle {
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn set_fill(&self, key: usize, fill: Rgba) -> Result<(), SyncError> {
        self.check(key)?;
        self.send(SyncMessage::SetFill { key, fill })
    }

    pub fn set_image(&self, key: usize, image: DecodedImage) -> Result<(), SyncError> {
        self.check(key)?;
        self.send(SyncMessage::SetImage {
            key,
            image: Arc::new(image),
        })
    }

    /// Queues raw upload bytes for decoding off the engine thread.
    pub fn request_image(&self, key: usize, bytes: Vec<u8>, hint: MediaHint) -> Result<(), SyncError> {
        self.check(key)?;
        self.send(SyncMessage::DecodeImage { key, bytes, hint })
    }

    pub fn reset_key(&self, key: usize) -> Result<(), SyncError> {
        self.check(key)?;
        self.send(SyncMessage::ResetKey { key })
    }

    pub fn shutdown(&self) -> Result<(), SyncError> {
        self.send(SyncMessage::Shutdown)
    }

    fn check(&self, key: usize) -> Result<(), SyncError> {
        if key >= self.key_count {
            return Err(SyncError::KeyOutOfRange {
                index: key,
                count: self.key_count,
            });
        }
        Ok(())
    }

    fn send(&self, message: SyncMessage) -> Result<(), SyncError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SyncError::Stopped);
        }
        self.inbox.send(message).map_err(|_| SyncError::Stopped)
    }
}

/// Owns every key of one connected deck.
///
/// All key state lives here and is mutated only on the thread that drives
/// [`DeviceSync::poll`] or [`DeviceSync::run`]. Each key has its own render
/// worker that receives immutable snapshots after every mutation.
pub struct DeviceSync {
    layout: DeckLayout,
    keys: Vec<KeyState>,
    workers: Vec<FrameWorker>,
    debouncer: PressDebouncer,
    events: Receiver<DeckEvent>,
    inbox_tx: Sender<SyncMessage>,
    inbox_rx: Receiver<SyncMessage>,
    reports: Receiver<WorkerReport>,
    pending_decodes: Vec<Option<u64>>,
    next_ticket: u64,
    notices: Vec<SyncNotice>,
    cancelled: Arc<AtomicBool>,
    stopped: bool,
}

impl DeviceSync {
    pub fn connect(connector: &dyn DeckConnector, settings: SyncSettings) -> Result<Self, SyncError> {
        let connection = connector.connect()?;
        Self::start(connection, settings)
    }

    /// Sets brightness and starts one render worker per key.
    pub fn start(connection: DeckConnection, settings: SyncSettings) -> Result<Self, SyncError> {
        settings.validate()?;
        let DeckConnection { transport, events } = connection;
        let layout = transport.layout();
        if layout.key_count() == 0 || layout.icon_size == 0 {
            return Err(SyncError::DeviceUnavailable(format!(
                "deck reported an empty layout ({}x{} keys at {}px)",
                layout.rows, layout.cols, layout.icon_size
            )));
        }

        match transport.set_brightness(settings.brightness) {
            Ok(()) => {}
            Err(TransportError::Disconnected) => {
                return Err(SyncError::DeviceUnavailable(
                    "deck disconnected during setup".into(),
                ))
            }
            Err(err) => warn!(error = %err, "failed to set deck brightness"),
        }

        let (report_tx, reports) = unbounded();
        let (inbox_tx, inbox_rx) = unbounded();
        let cancelled = Arc::new(AtomicBool::new(false));
        let context = FrameContext {
            transport,
            compositor: Compositor::new(layout.icon_size, settings.clock_face),
            clock: Arc::clone(&settings.clock),
            pacer: FramePacer::new(settings.frame_interval),
            failure_threshold: settings.failure_threshold,
            cancelled: Arc::clone(&cancelled),
            reports: report_tx,
        };

        let keys: Vec<KeyState> = (0..layout.key_count()).map(KeyState::new).collect();
        let workers = keys
            .iter()
            .map(|key| FrameWorker::spawn(key.snapshot(), context.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            rows = layout.rows,
            cols = layout.cols,
            icon_size = layout.icon_size,
            brightness = settings.brightness,
            frame_interval = ?settings.frame_interval,
            "deck engine started"
        );

        Ok(Self {
            layout,
            pending_decodes: vec![None; keys.len()],
            keys,
            workers,
            debouncer: PressDebouncer::new(settings.debounce_window),
            events,
            inbox_tx,
            inbox_rx,
            reports,
            next_ticket: 0,
            notices: Vec::new(),
            cancelled,
            stopped: false,
        })
    }

    pub fn layout(&self) -> DeckLayout {
        self.layout
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn key(&self, index: usize) -> Option<&KeyState> {
        self.keys.get(index)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            inbox: self.inbox_tx.clone(),
            key_count: self.keys.len(),
            stopped: Arc::clone(&self.cancelled),
        }
    }

    pub fn set_fill(&mut self, key: usize, fill: Rgba) -> Result<(), SyncError> {
        self.check_key(key)?;
        self.keys[key].set_fill(fill);
        debug!(key, %fill, "fill updated");
        self.publish(key);
        Ok(())
    }

    pub fn set_image(&mut self, key: usize, image: DecodedImage) -> Result<(), SyncError> {
        self.on_image_decoded(key, Arc::new(image))
    }

    /// Installs a decoded image. Any decode still running for the key is superseded.
    pub fn on_image_decoded(&mut self, key: usize, image: Arc<DecodedImage>) -> Result<(), SyncError> {
        self.check_key(key)?;
        self.pending_decodes[key] = None;
        debug!(key, ?image, "image installed");
        let switched = self.keys[key].set_image(image, Instant::now());
        self.publish(key);
        if switched {
            info!(key, mode = %KeyMode::Image, "upload switched key out of clock mode");
            self.notices.push(SyncNotice::ModeToggled {
                key,
                mode: KeyMode::Image,
            });
        }
        Ok(())
    }

    /// Falls back to a fill-only face.
    pub fn on_image_decode_failed(&mut self, key: usize, reason: &str) -> Result<(), SyncError> {
        self.check_key(key)?;
        self.pending_decodes[key] = None;
        warn!(key, reason, "image decode failed; showing fill only");
        self.keys[key].clear_image();
        self.publish(key);
        self.notices.push(SyncNotice::ImageDecodeFailed {
            key,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Starts decoding an upload. Only the most recent request per key is applied.
    pub fn request_image(&mut self, key: usize, bytes: Vec<u8>, hint: MediaHint) -> Result<u64, SyncError> {
        self.check_key(key)?;
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending_decodes[key] = Some(ticket);
        debug!(key, ticket, bytes = bytes.len(), ?hint, "decoding upload");
        if let Err(err) = spawn_decode(key, ticket, bytes, hint, self.inbox_tx.clone()) {
            self.pending_decodes[key] = None;
            return Err(err);
        }
        Ok(ticket)
    }

    pub fn toggle_mode(&mut self, key: usize) -> Result<KeyMode, SyncError> {
        self.check_key(key)?;
        let mode = self.keys[key].toggle_mode();
        if mode == KeyMode::Clock {
            self.pending_decodes[key] = None;
        }
        info!(key, %mode, "key mode toggled");
        self.publish(key);
        self.notices.push(SyncNotice::ModeToggled { key, mode });
        Ok(mode)
    }

    pub fn reset_key(&mut self, key: usize) -> Result<(), SyncError> {
        self.check_key(key)?;
        self.pending_decodes[key] = None;
        self.debouncer.forget(key);
        self.keys[key].reset();
        debug!(key, "key reset");
        self.publish(key);
        Ok(())
    }

    /// Feeds one press transition through the debouncer.
    pub fn handle_press(&mut self, event: PressEvent) -> Result<(), SyncError> {
        self.check_key(event.key)?;
        if event.kind == PressKind::Up {
            self.keys[event.key].record_release(event.at);
            self.publish(event.key);
        }
        if let Some(toggle) = self.debouncer.observe(&event) {
            self.toggle_mode(toggle.key)?;
        }
        Ok(())
    }

    /// Notices queued since the last call.
    pub fn drain_notices(&mut self) -> Vec<SyncNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Waits up to `timeout` for one device event, control message or worker
    /// report and applies it. Returns `Some` once the session has ended.
    pub fn poll(&mut self, timeout: Duration) -> Result<Option<SessionEnd>, SyncError> {
        if self.stopped {
            return Err(SyncError::Stopped);
        }
        let events = self.events.clone();
        let inbox = self.inbox_rx.clone();
        let reports = self.reports.clone();

        let end = crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(event) => self.handle_event(event),
                Err(_) => Some(SessionEnd::Disconnected),
            },
            recv(inbox) -> message => match message {
                Ok(message) => self.apply_message(message),
                Err(_) => Some(SessionEnd::Shutdown),
            },
            recv(reports) -> report => match report {
                Ok(report) => self.apply_report(report),
                Err(_) => Some(SessionEnd::Disconnected),
            },
            default(timeout) => None,
        };

        if let Some(end) = end {
            match end {
                SessionEnd::Shutdown => info!("shutdown requested"),
                SessionEnd::Disconnected => warn!("deck disconnected"),
            }
            self.stop();
        }
        Ok(end)
    }

    /// Drives the engine until shutdown or disconnect, forwarding notices.
    pub fn run(&mut self, notices: &Sender<SyncNotice>) -> Result<SessionEnd, SyncError> {
        loop {
            let end = self.poll(IDLE_POLL)?;
            for notice in self.drain_notices() {
                let _ = notices.send(notice);
            }
            if let Some(end) = end {
                return Ok(end);
            }
        }
    }

    /// Cancels every render worker, waits for them to exit and releases images.
    /// No key write starts after this returns.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.cancelled.store(true, Ordering::SeqCst);
        for worker in &self.workers {
            worker.request_shutdown();
        }
        for worker in &mut self.workers {
            worker.join();
        }
        for key in &mut self.keys {
            key.release_image();
        }
        self.pending_decodes.iter_mut().for_each(|ticket| *ticket = None);
        info!("deck engine stopped");
    }

    fn handle_event(&mut self, event: DeckEvent) -> Option<SessionEnd> {
        match event {
            DeckEvent::Press(press) => {
                if let Err(err) = self.handle_press(press) {
                    warn!(error = %err, "ignoring key event");
                }
                None
            }
            DeckEvent::Disconnected => Some(SessionEnd::Disconnected),
        }
    }

    fn apply_message(&mut self, message: SyncMessage) -> Option<SessionEnd> {
        let result = match message {
            SyncMessage::SetFill { key, fill } => self.set_fill(key, fill),
            SyncMessage::SetImage { key, image } => self.on_image_decoded(key, image),
            SyncMessage::DecodeImage { key, bytes, hint } => {
                self.request_image(key, bytes, hint).map(|_| ())
            }
            SyncMessage::ImageDecoded { key, ticket, image } => {
                self.finish_decode(key, ticket, Ok(image))
            }
            SyncMessage::ImageDecodeFailed { key, ticket, reason } => {
                self.finish_decode(key, ticket, Err(reason))
            }
            SyncMessage::ResetKey { key } => self.reset_key(key),
            SyncMessage::Shutdown => return Some(SessionEnd::Shutdown),
        };
        if let Err(err) = result {
            warn!(error = %err, "control message rejected");
        }
        None
    }

    fn finish_decode(
        &mut self,
        key: usize,
        ticket: u64,
        outcome: Result<Arc<DecodedImage>, String>,
    ) -> Result<(), SyncError> {
        self.check_key(key)?;
        if self.pending_decodes[key] != Some(ticket) {
            debug!(key, ticket, "dropping superseded decode result");
            return Ok(());
        }
        match outcome {
            Ok(image) => self.on_image_decoded(key, image),
            Err(reason) => self.on_image_decode_failed(key, &reason),
        }
    }

    fn apply_report(&mut self, report: WorkerReport) -> Option<SessionEnd> {
        match report {
            WorkerReport::Degraded {
                key,
                consecutive_failures,
            } => {
                warn!(key, consecutive_failures, "key writes keep failing");
                self.notices.push(SyncNotice::DeviceDegraded {
                    key,
                    consecutive_failures,
                });
                None
            }
            WorkerReport::Recovered { key } => {
                info!(key, "key writes recovered");
                self.notices.push(SyncNotice::DeviceRecovered { key });
                None
            }
            WorkerReport::Disconnected { key } => {
                debug!(key, "transport reported disconnect");
                Some(SessionEnd::Disconnected)
            }
        }
    }

    fn check_key(&self, key: usize) -> Result<(), SyncError> {
        if self.stopped {
            return Err(SyncError::Stopped);
        }
        if key >= self.keys.len() {
            return Err(SyncError::KeyOutOfRange {
                index: key,
                count: self.keys.len(),
            });
        }
        Ok(())
    }

    fn publish(&self, key: usize) {
        if !self.workers[key].update(self.keys[key].snapshot()) {
            warn!(key, "frame worker has exited");
        }
    }
}

impl Drop for DeviceSync {
    fn drop(&mut self) {
        self.stop();
    }
}
