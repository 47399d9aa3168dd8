use std::convert::Infallible;

use embedded_graphics::geometry::{OriginDimensions, Point, Size};
use embedded_graphics::mono_font::ascii::FONT_10X20;
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::text::{Baseline, Text};
use embedded_graphics::{Drawable, Pixel};
use embedded_graphics::draw_target::DrawTarget;

use crate::buffer::PixelBuffer;
use crate::color::Rgba;

const FONT: &MonoFont<'static> = &FONT_10X20;

/// A single line of text placed on a key.
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub text: &'a str,
    /// Left edge in buffer pixels.
    pub x: f32,
    /// Alphabetic baseline in buffer pixels.
    pub baseline: f32,
    /// Glyph cell height in buffer pixels.
    pub font_px: f32,
    /// Wider runs are squeezed horizontally to fit.
    pub max_width: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPaint {
    /// Outline color, painted one pixel around the glyphs before the fill.
    pub stroke: Option<Rgba>,
    pub fill: Rgba,
}

/// 1-bit coverage of a rendered string at the font's native size.
struct GlyphMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl GlyphMask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }
}

impl OriginDimensions for GlyphMask {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl DrawTarget for GlyphMask {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x >= self.width || y >= self.height {
                continue;
            }
            self.bits[y as usize * self.width as usize + x as usize] = color.is_on();
        }
        Ok(())
    }
}

/// Rasterizes `run` into `buffer`: stroke pass first, then fill pass.
pub fn draw_text(buffer: &mut PixelBuffer, run: &TextRun<'_>, paint: &TextPaint) {
    let glyphs = run.text.chars().count() as u32;
    if glyphs == 0 || run.font_px <= 0.0 {
        return;
    }

    let cell_width = FONT.character_size.width + FONT.character_spacing;
    let mut mask = GlyphMask::new(cell_width * glyphs, FONT.character_size.height);
    let style = MonoTextStyle::new(FONT, BinaryColor::On);
    let _ = Text::with_baseline(run.text, Point::zero(), style, Baseline::Top).draw(&mut mask);

    let scale_y = run.font_px / mask.height as f32;
    let natural = mask.width as f32 * scale_y;
    let width = run
        .max_width
        .map_or(natural, |limit| natural.min(limit.max(1.0)));
    let scale_x = width / mask.width as f32;
    let left = run.x;
    let top = run.baseline - FONT.baseline as f32 * scale_y;

    let edge = i64::from(buffer.size());
    let mut coverage = vec![false; (edge * edge) as usize];
    for y in 0..edge {
        let src_y = ((y as f32 + 0.5 - top) / scale_y).floor() as i64;
        for x in 0..edge {
            let src_x = ((x as f32 + 0.5 - left) / scale_x).floor() as i64;
            coverage[(y * edge + x) as usize] = mask.get(src_x, src_y);
        }
    }
    let covered = |x: i64, y: i64| -> bool {
        x >= 0 && y >= 0 && x < edge && y < edge && coverage[(y * edge + x) as usize]
    };

    if let Some(stroke) = paint.stroke {
        for y in 0..edge {
            for x in 0..edge {
                let near = (-1..=1).any(|dy| (-1..=1).any(|dx| covered(x + dx, y + dy)));
                if near {
                    buffer.blend_pixel(x, y, stroke);
                }
            }
        }
    }

    for y in 0..edge {
        for x in 0..edge {
            if covered(x, y) {
                buffer.blend_pixel(x, y, paint.fill);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(buffer: &PixelBuffer, color: Rgba) -> usize {
        buffer.pixels().filter(|p| *p == color).count()
    }

    #[test]
    fn empty_text_leaves_buffer_untouched() {
        let mut buffer = PixelBuffer::filled(16, Rgba::BLACK);
        let run = TextRun {
            text: "",
            x: 0.0,
            baseline: 12.0,
            font_px: 14.0,
            max_width: None,
        };
        draw_text(
            &mut buffer,
            &run,
            &TextPaint {
                stroke: Some(Rgba::BLUE),
                fill: Rgba::WHITE,
            },
        );
        assert_eq!(count(&buffer, Rgba::BLACK), 16 * 16);
    }

    #[test]
    fn stroke_outlines_the_fill() {
        let mut buffer = PixelBuffer::filled(72, Rgba::BLACK);
        let run = TextRun {
            text: "8",
            x: 10.0,
            baseline: 55.0,
            font_px: 60.0,
            max_width: None,
        };
        draw_text(
            &mut buffer,
            &run,
            &TextPaint {
                stroke: Some(Rgba::BLUE),
                fill: Rgba::WHITE,
            },
        );
        assert!(count(&buffer, Rgba::WHITE) > 0);
        assert!(count(&buffer, Rgba::BLUE) > 0);
        // Nothing lands left of the run's origin except the one-pixel outline.
        for y in 0..72 {
            for x in 0..9 {
                assert_eq!(buffer.pixel(x, y), Some(Rgba::BLACK));
            }
        }
    }

    #[test]
    fn wide_runs_are_squeezed_into_max_width() {
        let mut buffer = PixelBuffer::filled(72, Rgba::BLACK);
        let run = TextRun {
            text: "8:88:88",
            x: 4.0,
            baseline: 60.0,
            font_px: 64.0,
            max_width: Some(40.0),
        };
        draw_text(
            &mut buffer,
            &run,
            &TextPaint {
                stroke: None,
                fill: Rgba::WHITE,
            },
        );
        for y in 0..72 {
            for x in 45..72 {
                assert_eq!(buffer.pixel(x, y), Some(Rgba::BLACK));
            }
        }
        assert!(count(&buffer, Rgba::WHITE) > 0);
    }
}
