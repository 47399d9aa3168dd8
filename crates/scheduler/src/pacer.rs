use std::time::{Duration, Instant};

/// Target delay between the end of one key submission and the start of the next.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Decides when a single key is due for its next frame.
///
/// The delay is measured from completion of the previous submission, so a slow
/// transport stretches the cadence instead of queueing frames. A state change
/// marks the pacer dirty, which makes the next frame due immediately.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last_completed: Option<Instant>,
    dirty: bool,
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(FRAME_INTERVAL)
    }
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_completed: None,
            dirty: true,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Earliest instant at which the next frame may start; `None` means now.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.dirty {
            return None;
        }
        self.last_completed.map(|done| done + self.interval)
    }

    pub fn ready_for_frame(&self, now: Instant) -> bool {
        match self.next_deadline() {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }

    pub fn time_until_ready(&self, now: Instant) -> Duration {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Records a finished render+submit cycle and returns how many ticks fell
    /// inside it and were dropped.
    pub fn mark_rendered(&mut self, started: Instant, completed: Instant) -> u32 {
        self.last_completed = Some(completed);
        self.dirty = false;
        let busy = completed.saturating_duration_since(started);
        let interval = self.interval.as_nanos().max(1);
        (busy.as_nanos() / interval).min(u32::MAX as u128) as u32
    }

    pub fn reset(&mut self) {
        self.last_completed = None;
        self.dirty = true;
    }
}
