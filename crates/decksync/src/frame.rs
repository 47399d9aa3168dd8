use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use keyface::{ClockSource, Compositor, DecimalTime, Face, PixelBuffer};
use scheduler::FramePacer;
use tracing::{debug, trace, warn};

use crate::error::{SyncError, TransportError};
use crate::key::{KeyMode, KeySnapshot};
use crate::transport::DeckTransport;

pub(crate) enum FrameCommand {
    Update(KeySnapshot),
    Shutdown,
}

/// Transport health observed by a key's worker, sent back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerReport {
    Degraded {
        key: usize,
        consecutive_failures: u32,
    },
    Recovered {
        key: usize,
    },
    Disconnected {
        key: usize,
    },
}

/// Everything a worker needs besides its own key state.
#[derive(Clone)]
pub(crate) struct FrameContext {
    pub transport: Arc<dyn DeckTransport>,
    pub compositor: Compositor,
    pub clock: Arc<dyn ClockSource>,
    pub pacer: FramePacer,
    pub failure_threshold: u32,
    pub cancelled: Arc<AtomicBool>,
    pub reports: Sender<WorkerReport>,
}

/// Handle to the render thread of one key.
pub(crate) struct FrameWorker {
    key: usize,
    commands: Sender<FrameCommand>,
    join: Option<JoinHandle<()>>,
}

impl FrameWorker {
    pub fn spawn(
        initial: KeySnapshot,
        context: FrameContext,
    ) -> Result<Self, SyncError> {
        let key = initial.key;
        let (commands, inbox) = unbounded();
        let join = thread::Builder::new()
            .name(format!("facedeck-key-{key:02}"))
            .spawn(move || FrameScheduler::new(initial, inbox, context).run())
            .map_err(SyncError::Spawn)?;
        Ok(Self {
            key,
            commands,
            join: Some(join),
        })
    }

    /// Hands a newer snapshot to the worker. Returns false once the worker has exited.
    pub fn update(&self, snapshot: KeySnapshot) -> bool {
        self.commands.send(FrameCommand::Update(snapshot)).is_ok()
    }

    pub fn request_shutdown(&self) {
        let _ = self.commands.send(FrameCommand::Shutdown);
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                warn!(key = self.key, "frame worker panicked");
            }
        }
    }
}

impl Drop for FrameWorker {
    fn drop(&mut self) {
        self.request_shutdown();
        self.join();
    }
}

enum Tick {
    Continue,
    Stop,
}

/// Counts consecutive write failures and flags the edges into and out of
/// the degraded state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FailureTracker {
    threshold: u32,
    consecutive: u32,
    degraded: bool,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
            degraded: false,
        }
    }

    /// Returns the failure count when this failure crosses the threshold.
    pub fn record_failure(&mut self) -> Option<u32> {
        self.consecutive = self.consecutive.saturating_add(1);
        if !self.degraded && self.consecutive >= self.threshold {
            self.degraded = true;
            return Some(self.consecutive);
        }
        None
    }

    /// Returns true when this success ends a degraded streak.
    pub fn record_success(&mut self) -> bool {
        let recovered = self.degraded;
        self.consecutive = 0;
        self.degraded = false;
        recovered
    }
}

/// Render loop for one key.
///
/// At most one frame is in flight per key: the next render starts only after
/// the previous write returned and the interval elapsed. A frame whose
/// snapshot was superseded while rendering is dropped and rendered again.
struct FrameScheduler {
    snapshot: KeySnapshot,
    commands: Receiver<FrameCommand>,
    context: FrameContext,
    pacer: FramePacer,
    failures: FailureTracker,
    frames_written: u64,
}

impl FrameScheduler {
    fn new(snapshot: KeySnapshot, commands: Receiver<FrameCommand>, context: FrameContext) -> Self {
        let mut pacer = context.pacer.clone();
        pacer.reset();
        let failures = FailureTracker::new(context.failure_threshold);
        Self {
            snapshot,
            commands,
            context,
            pacer,
            failures,
            frames_written: 0,
        }
    }

    fn key(&self) -> usize {
        self.snapshot.key
    }

    fn run(mut self) {
        debug!(key = self.key(), "frame scheduler started");
        loop {
            let wait = self.pacer.time_until_ready(Instant::now());
            if !wait.is_zero() {
                match self.commands.recv_timeout(wait) {
                    Ok(command) => {
                        if !self.apply(command) {
                            break;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            if !self.drain() || self.is_cancelled() {
                break;
            }
            if let Tick::Stop = self.tick() {
                break;
            }
        }
        debug!(
            key = self.key(),
            frames = self.frames_written,
            "frame scheduler stopped"
        );
    }

    fn is_cancelled(&self) -> bool {
        self.context.cancelled.load(Ordering::SeqCst)
    }

    /// Returns false on shutdown.
    fn apply(&mut self, command: FrameCommand) -> bool {
        match command {
            FrameCommand::Update(snapshot) => {
                if snapshot.generation > self.snapshot.generation {
                    self.snapshot = snapshot;
                    self.pacer.mark_dirty();
                }
                true
            }
            FrameCommand::Shutdown => false,
        }
    }

    /// Applies every queued command without blocking. Returns false on shutdown.
    fn drain(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => {
                    if !self.apply(command) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn tick(&mut self) -> Tick {
        let started = Instant::now();
        let frame = loop {
            let generation = self.snapshot.generation;
            let frame = self.render();
            if !self.drain() {
                return Tick::Stop;
            }
            if self.snapshot.generation == generation {
                break frame;
            }
            trace!(
                key = self.key(),
                stale = generation,
                current = self.snapshot.generation,
                "discarding superseded frame"
            );
        };

        if self.is_cancelled() {
            return Tick::Stop;
        }
        let result = self
            .context
            .transport
            .write_key_buffer(self.key(), frame.as_bytes());
        let dropped = self.pacer.mark_rendered(started, Instant::now());
        if dropped > 0 {
            trace!(key = self.key(), dropped, "write overran frame interval");
        }

        match result {
            Ok(()) => {
                self.frames_written += 1;
                if self.failures.record_success() {
                    self.report(WorkerReport::Recovered { key: self.key() });
                }
                Tick::Continue
            }
            Err(TransportError::Disconnected) => {
                self.report(WorkerReport::Disconnected { key: self.key() });
                Tick::Stop
            }
            Err(err) => {
                warn!(key = self.key(), error = %err, "key write failed");
                if let Some(consecutive_failures) = self.failures.record_failure() {
                    self.report(WorkerReport::Degraded {
                        key: self.key(),
                        consecutive_failures,
                    });
                }
                Tick::Continue
            }
        }
    }

    fn render(&self) -> PixelBuffer {
        let snapshot = &self.snapshot;
        let face = match snapshot.mode {
            KeyMode::Image => Face::Image {
                image: snapshot.image.as_ref().map(|slot| slot.image.as_ref()),
                elapsed: snapshot
                    .image
                    .as_ref()
                    .map(|slot| slot.installed_at.elapsed())
                    .unwrap_or_default(),
            },
            KeyMode::Clock => Face::Clock {
                time: DecimalTime::now(self.context.clock.as_ref()),
            },
        };
        self.context.compositor.render(snapshot.fill, face)
    }

    fn report(&self, report: WorkerReport) {
        let _ = self.context.reports.send(report);
    }
}
