use image::RgbaImage;

use crate::color::Rgba;

pub const BYTES_PER_PIXEL: usize = 4;

/// Square RGBA frame matching one key's display, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    size: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("size", &self.size)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Number of bytes in a key buffer of the given edge length.
pub fn byte_len(size: u32) -> usize {
    let edge = size as usize;
    edge * edge * BYTES_PER_PIXEL
}

impl PixelBuffer {
    pub fn filled(size: u32, color: Rgba) -> Self {
        let mut data = vec![0; byte_len(size)];
        for pixel in data.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&color.to_bytes());
        }
        Self { size, data }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn fill(&mut self, color: Rgba) {
        let bytes = color.to_bytes();
        for pixel in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&bytes);
        }
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        let edge = i64::from(self.size);
        if x < 0 || y < 0 || x >= edge || y >= edge {
            return None;
        }
        Some((y * edge + x) as usize * BYTES_PER_PIXEL)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let offset = self.offset(i64::from(x), i64::from(y))?;
        let mut bytes = [0u8; BYTES_PER_PIXEL];
        bytes.copy_from_slice(&self.data[offset..offset + BYTES_PER_PIXEL]);
        Some(Rgba::from_bytes(bytes))
    }

    /// Blends `color` over the pixel at (x, y); coordinates outside the buffer are clipped.
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba) {
        let Some(offset) = self.offset(x, y) else {
            return;
        };
        let slot = &mut self.data[offset..offset + BYTES_PER_PIXEL];
        let mut below = [0u8; BYTES_PER_PIXEL];
        below.copy_from_slice(slot);
        slot.copy_from_slice(&color.over(Rgba::from_bytes(below)).to_bytes());
    }

    /// Alpha-composites `image` with its top-left corner at (x, y).
    pub fn composite(&mut self, image: &RgbaImage, x: i64, y: i64) {
        for (ix, iy, pixel) in image.enumerate_pixels() {
            self.blend_pixel(x + i64::from(ix), y + i64::from(iy), Rgba::from_bytes(pixel.0));
        }
    }

    pub fn pixels(&self) -> impl Iterator<Item = Rgba> + '_ {
        self.data.chunks_exact(BYTES_PER_PIXEL).map(|chunk| {
            let mut bytes = [0u8; BYTES_PER_PIXEL];
            bytes.copy_from_slice(chunk);
            Rgba::from_bytes(bytes)
        })
    }

    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.size, self.size, self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_buffer_has_expected_length_and_color() {
        let buffer = PixelBuffer::filled(8, Rgba::rgb(1, 2, 3));
        assert_eq!(buffer.as_bytes().len(), 8 * 8 * 4);
        assert!(buffer.pixels().all(|p| p == Rgba::rgb(1, 2, 3)));
    }

    #[test]
    fn blend_outside_bounds_is_ignored() {
        let mut buffer = PixelBuffer::filled(4, Rgba::BLACK);
        buffer.blend_pixel(-1, 0, Rgba::WHITE);
        buffer.blend_pixel(4, 2, Rgba::WHITE);
        assert!(buffer.pixels().all(|p| p == Rgba::BLACK));
    }

    #[test]
    fn composite_clips_to_buffer() {
        let mut buffer = PixelBuffer::filled(4, Rgba::BLACK);
        let image = RgbaImage::from_pixel(3, 3, image::Rgba([255, 255, 255, 255]));
        buffer.composite(&image, 2, 2);
        assert_eq!(buffer.pixel(3, 3), Some(Rgba::WHITE));
        assert_eq!(buffer.pixel(1, 1), Some(Rgba::BLACK));
    }

    #[test]
    fn to_image_preserves_dimensions() {
        let buffer = PixelBuffer::filled(5, Rgba::BLUE);
        let image = buffer.to_image().unwrap();
        assert_eq!(image.dimensions(), (5, 5));
        assert_eq!(image.get_pixel(4, 4).0, [0, 0, 255, 255]);
    }
}
