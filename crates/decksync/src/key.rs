use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use keyface::{DecodedImage, Rgba};

/// What a key shows on top of its fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMode {
    #[default]
    Image,
    Clock,
}

impl KeyMode {
    pub fn toggled(self) -> Self {
        match self {
            KeyMode::Image => KeyMode::Clock,
            KeyMode::Clock => KeyMode::Image,
        }
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Image => f.write_str("image"),
            KeyMode::Clock => f.write_str("clock"),
        }
    }
}

/// A decoded image as installed on a key. `installed_at` anchors animation.
#[derive(Debug, Clone)]
pub struct ImageSlot {
    pub image: Arc<DecodedImage>,
    pub installed_at: Instant,
}

/// Authoritative model of one key. Owned by the engine; render workers only
/// ever see [`KeySnapshot`] copies.
#[derive(Debug, Clone)]
pub struct KeyState {
    index: usize,
    mode: KeyMode,
    fill: Rgba,
    image: Option<ImageSlot>,
    last_release: Option<Instant>,
    generation: u64,
}

impl KeyState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            mode: KeyMode::Image,
            fill: Rgba::TRANSPARENT,
            image: None,
            last_release: None,
            generation: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    pub fn fill(&self) -> Rgba {
        self.fill
    }

    pub fn image(&self) -> Option<&Arc<DecodedImage>> {
        self.image.as_ref().map(|slot| &slot.image)
    }

    pub fn last_release(&self) -> Option<Instant> {
        self.last_release
    }

    /// Bumped by every mutation; render workers compare it to spot stale frames.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_fill(&mut self, fill: Rgba) {
        self.fill = fill;
        self.bump();
    }

    /// Installs `image`. A key in clock mode drops back to image mode so the
    /// upload is visible; returns `true` when that happened.
    pub fn set_image(&mut self, image: Arc<DecodedImage>, now: Instant) -> bool {
        let switched = self.mode != KeyMode::Image;
        self.mode = KeyMode::Image;
        self.image = Some(ImageSlot {
            image,
            installed_at: now,
        });
        self.bump();
        switched
    }

    /// Removes the image, leaving a fill-only face.
    pub fn clear_image(&mut self) {
        self.image = None;
        self.bump();
    }

    /// Flips the mode. Entering clock mode releases the image.
    pub fn toggle_mode(&mut self) -> KeyMode {
        self.mode = self.mode.toggled();
        if self.mode == KeyMode::Clock {
            self.image = None;
        }
        self.bump();
        self.mode
    }

    pub fn record_release(&mut self, at: Instant) {
        self.last_release = Some(at);
        self.bump();
    }

    /// Back to a blank image key: transparent fill, no image.
    pub fn reset(&mut self) {
        self.mode = KeyMode::Image;
        self.fill = Rgba::TRANSPARENT;
        self.image = None;
        self.last_release = None;
        self.bump();
    }

    /// Drops the image without counting as a visible change. Used at shutdown.
    pub(crate) fn release_image(&mut self) {
        self.image = None;
    }

    pub fn snapshot(&self) -> KeySnapshot {
        debug_assert!(self.mode == KeyMode::Image || self.image.is_none());
        KeySnapshot {
            key: self.index,
            mode: self.mode,
            fill: self.fill,
            image: self.image.clone(),
            generation: self.generation,
        }
    }

    fn bump(&mut self) {
        self.generation += 1;
    }
}

/// Immutable copy of a key's state handed to its render worker.
#[derive(Debug, Clone)]
pub struct KeySnapshot {
    pub key: usize,
    pub mode: KeyMode,
    pub fill: Rgba,
    pub image: Option<ImageSlot>,
    pub generation: u64,
}
