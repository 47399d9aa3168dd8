/// Placement of an image inside a square key, in buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FitRect {
    pub fn full(size: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: size,
            height: size,
        }
    }

    /// Rounds the rectangle onto the pixel grid; never collapses below one pixel.
    pub fn pixel_rect(&self) -> (i64, i64, u32, u32) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Centers an image of the given natural size inside a `size`×`size` square,
/// preserving its aspect ratio.
///
/// Wide images span the full width and are centered vertically, tall images
/// span the full height and are centered horizontally, square images fill the
/// square exactly.
pub fn fit_centered(natural_width: f32, natural_height: f32, size: f32) -> FitRect {
    if !(natural_width > 0.0 && natural_height > 0.0) {
        return FitRect::full(size);
    }

    let aspect = natural_width / natural_height;
    let mut rect = FitRect::full(size);
    if aspect > 1.0 {
        rect.height = size / aspect;
        rect.y = (size - rect.height) / 2.0;
    } else if aspect < 1.0 {
        rect.width = size * aspect;
        rect.x = (size - rect.width) / 2.0;
    }
    rect
}
