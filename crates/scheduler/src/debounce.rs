use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Longest gap between two releases of the same key that still counts as a
/// double-press.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressKind {
    Down,
    Up,
}

/// Raw press/release report coming off the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub key: usize,
    pub kind: PressKind,
    pub at: Instant,
}

impl PressEvent {
    pub fn down(key: usize, at: Instant) -> Self {
        Self {
            key,
            kind: PressKind::Down,
            at,
        }
    }

    pub fn up(key: usize, at: Instant) -> Self {
        Self {
            key,
            kind: PressKind::Up,
            at,
        }
    }
}

/// Emitted when a key saw two releases inside the debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleMode {
    pub key: usize,
    /// Release that armed the gesture.
    pub anchored_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmState {
    #[default]
    Idle,
    ArmedSinceRelease(Instant),
}

/// Per-key double-release detector.
///
/// Only releases matter. An armed key never expires back to `Idle` on its
/// own; the next release either completes the gesture or re-arms it.
#[derive(Debug, Clone)]
pub struct PressDebouncer {
    window: Duration,
    keys: HashMap<usize, ArmState>,
}

impl Default for PressDebouncer {
    fn default() -> Self {
        Self::new(DEBOUNCE_WINDOW)
    }
}

impl PressDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            keys: HashMap::new(),
        }
    }

    pub fn state(&self, key: usize) -> ArmState {
        self.keys.get(&key).copied().unwrap_or_default()
    }

    pub fn observe(&mut self, event: &PressEvent) -> Option<ToggleMode> {
        match event.kind {
            PressKind::Down => None,
            PressKind::Up => self.release(event.key, event.at),
        }
    }

    fn release(&mut self, key: usize, at: Instant) -> Option<ToggleMode> {
        let state = self.keys.entry(key).or_default();
        match *state {
            ArmState::ArmedSinceRelease(armed) if at.saturating_duration_since(armed) < self.window => {
                *state = ArmState::Idle;
                Some(ToggleMode {
                    key,
                    anchored_at: armed,
                })
            }
            _ => {
                *state = ArmState::ArmedSinceRelease(at);
                None
            }
        }
    }

    pub fn forget(&mut self, key: usize) {
        self.keys.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    #[test]
    fn two_quick_releases_toggle() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        assert_eq!(debouncer.observe(&PressEvent::up(2, t0)), None);
        let toggle = debouncer.observe(&PressEvent::up(2, ms(t0, 999)));
        assert_eq!(
            toggle,
            Some(ToggleMode {
                key: 2,
                anchored_at: t0
            })
        );
        assert_eq!(debouncer.state(2), ArmState::Idle);
    }

    #[test]
    fn releases_exactly_one_window_apart_do_not_toggle() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(0, t0));
        assert_eq!(debouncer.observe(&PressEvent::up(0, ms(t0, 1000))), None);
        assert_eq!(
            debouncer.state(0),
            ArmState::ArmedSinceRelease(ms(t0, 1000))
        );
    }

    #[test]
    fn slow_then_quick_release_toggles_once_anchored_at_second() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        let t1 = ms(t0, 1500);
        let t2 = ms(t0, 2100);
        let fired: Vec<_> = [t0, t1, t2]
            .into_iter()
            .filter_map(|at| debouncer.observe(&PressEvent::up(4, at)))
            .collect();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].anchored_at, t1);
    }

    #[test]
    fn downs_are_ignored() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(1, t0));
        assert_eq!(debouncer.observe(&PressEvent::down(1, ms(t0, 100))), None);
        assert_eq!(debouncer.state(1), ArmState::ArmedSinceRelease(t0));
        assert!(debouncer.observe(&PressEvent::up(1, ms(t0, 200))).is_some());
    }

    #[test]
    fn keys_are_tracked_independently() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(0, t0));
        assert_eq!(debouncer.observe(&PressEvent::up(1, ms(t0, 10))), None);
        assert!(debouncer.observe(&PressEvent::up(0, ms(t0, 20))).is_some());
    }

    #[test]
    fn third_quick_release_rearms_instead_of_toggling() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(3, t0));
        assert!(debouncer.observe(&PressEvent::up(3, ms(t0, 100))).is_some());
        assert_eq!(debouncer.observe(&PressEvent::up(3, ms(t0, 200))), None);
        assert!(debouncer.observe(&PressEvent::up(3, ms(t0, 300))).is_some());
    }

    #[test]
    fn armed_state_never_expires_on_its_own() {
        let mut debouncer = PressDebouncer::default();
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(7, t0));
        // Only a release moves the state; a long silence leaves it armed.
        assert_eq!(debouncer.state(7), ArmState::ArmedSinceRelease(t0));
    }

    #[test]
    fn custom_window_narrows_the_gesture() {
        let mut debouncer = PressDebouncer::new(Duration::from_millis(250));
        let t0 = Instant::now();
        debouncer.observe(&PressEvent::up(0, t0));
        assert_eq!(debouncer.observe(&PressEvent::up(0, ms(t0, 300))), None);
        assert!(debouncer.observe(&PressEvent::up(0, ms(t0, 400))).is_some());
    }
}
