use std::borrow::Cow;
use std::time::Duration;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::buffer::PixelBuffer;
use crate::clock::{ClockFace, DecimalTime};
use crate::color::Rgba;
use crate::fit::fit_centered;
use crate::source::DecodedImage;

/// What a key shows on top of its fill.
#[derive(Debug, Clone, Copy)]
pub enum Face<'a> {
    /// Fill plus an optional image; `elapsed` selects the animation frame.
    Image {
        image: Option<&'a DecodedImage>,
        elapsed: Duration,
    },
    Clock { time: DecimalTime },
}

/// Renders key faces at a fixed icon size.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    size: u32,
    clock: ClockFace,
}

impl Compositor {
    pub fn new(size: u32, clock: ClockFace) -> Self {
        Self { size, clock }
    }

    pub fn render(&self, fill: Rgba, face: Face<'_>) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(self.size, fill);
        match face {
            Face::Image { image, elapsed } => {
                if let Some(image) = image {
                    draw_image(&mut buffer, image, elapsed);
                }
            }
            Face::Clock { time } => self.clock.draw(&mut buffer, time),
        }
        buffer
    }
}

/// Fill-then-image render of a single key face.
pub fn render(fill: Rgba, image: Option<&DecodedImage>, size: u32) -> PixelBuffer {
    Compositor::new(size, ClockFace::default()).render(
        fill,
        Face::Image {
            image,
            elapsed: Duration::ZERO,
        },
    )
}

fn draw_image(buffer: &mut PixelBuffer, image: &DecodedImage, elapsed: Duration) {
    let (natural_width, natural_height) = image.natural_size();
    let rect = fit_centered(natural_width, natural_height, buffer.size() as f32);
    let (x, y, width, height) = rect.pixel_rect();

    let frame = image.frame_at(elapsed);
    let scaled: Cow<'_, RgbaImage> = if frame.dimensions() == (width, height) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(imageops::resize(frame, width, height, FilterType::Triangle))
    };
    buffer.composite(&scaled, x, y);
}
