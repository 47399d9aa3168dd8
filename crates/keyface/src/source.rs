use std::io::Cursor;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, ImageFormat, RgbaImage};
use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg;

/// Vector uploads are rasterized once so their longer edge has at least this many pixels.
pub const VECTOR_RASTER_EDGE: u32 = 288;

/// Browsers treat near-zero GIF delays as this default.
const FALLBACK_FRAME_DELAY: Duration = Duration::from_millis(100);

/// What the uploader claims the bytes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaHint {
    #[default]
    Raster,
    Svg,
}

impl MediaHint {
    pub fn from_mime(mime: &str) -> Self {
        if mime.trim().eq_ignore_ascii_case("image/svg+xml") {
            MediaHint::Svg
        } else {
            MediaHint::Raster
        }
    }

    /// File pickers often report an empty type for SVGs, so the name wins.
    pub fn from_file_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with("svg") {
            MediaHint::Svg
        } else {
            MediaHint::Raster
        }
    }

    pub fn detect(mime: Option<&str>, name: Option<&str>) -> Self {
        match (name.map(Self::from_file_name), mime.map(Self::from_mime)) {
            (Some(MediaHint::Svg), _) | (_, Some(MediaHint::Svg)) => MediaHint::Svg,
            _ => MediaHint::Raster,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("upload is empty")]
    Empty,
    #[error("failed to decode raster image: {0}")]
    Raster(#[from] image::ImageError),
    #[error("failed to decode vector image: {0}")]
    Vector(String),
    #[error("image has no visible area")]
    ZeroSized,
}

#[derive(Clone)]
struct ImageFrame {
    pixels: RgbaImage,
    delay: Duration,
}

/// Immutable decoded upload: natural dimensions plus one or more frames.
#[derive(Clone)]
pub struct DecodedImage {
    natural_width: f32,
    natural_height: f32,
    frames: Vec<ImageFrame>,
    cycle: Duration,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("natural_width", &self.natural_width)
            .field("natural_height", &self.natural_height)
            .field("frames", &self.frames.len())
            .field("cycle", &self.cycle)
            .finish()
    }
}

impl DecodedImage {
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self, DecodeError> {
        let (width, height) = pixels.dimensions();
        Self::with_natural_size(
            width as f32,
            height as f32,
            vec![(pixels, Duration::ZERO)],
        )
    }

    /// Builds an image from `(pixels, delay)` frames; the natural size comes from the first frame.
    pub fn from_frames(frames: Vec<(RgbaImage, Duration)>) -> Result<Self, DecodeError> {
        let (width, height) = frames
            .first()
            .map(|(pixels, _)| pixels.dimensions())
            .ok_or(DecodeError::Empty)?;
        Self::with_natural_size(width as f32, height as f32, frames)
    }

    fn with_natural_size(
        natural_width: f32,
        natural_height: f32,
        frames: Vec<(RgbaImage, Duration)>,
    ) -> Result<Self, DecodeError> {
        if !(natural_width > 0.0 && natural_height > 0.0) {
            return Err(DecodeError::ZeroSized);
        }
        if frames.iter().any(|(pixels, _)| pixels.width() == 0 || pixels.height() == 0) {
            return Err(DecodeError::ZeroSized);
        }

        let animated = frames.len() > 1;
        let frames: Vec<ImageFrame> = frames
            .into_iter()
            .map(|(pixels, delay)| ImageFrame {
                pixels,
                delay: if animated && delay < Duration::from_millis(10) {
                    FALLBACK_FRAME_DELAY
                } else {
                    delay
                },
            })
            .collect();
        if frames.is_empty() {
            return Err(DecodeError::Empty);
        }
        let cycle = if animated {
            frames.iter().map(|frame| frame.delay).sum()
        } else {
            Duration::ZERO
        };

        Ok(Self {
            natural_width,
            natural_height,
            frames,
            cycle,
        })
    }

    pub fn natural_size(&self) -> (f32, f32) {
        (self.natural_width, self.natural_height)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// Frame visible `elapsed` after the image was installed, looping forever.
    pub fn frame_at(&self, elapsed: Duration) -> &RgbaImage {
        if self.cycle.is_zero() {
            return &self.frames[0].pixels;
        }

        let mut remaining = elapsed.as_nanos() % self.cycle.as_nanos();
        for frame in &self.frames {
            let delay = frame.delay.as_nanos();
            if remaining < delay {
                return &frame.pixels;
            }
            remaining -= delay;
        }
        &self.frames[self.frames.len() - 1].pixels
    }
}

/// Decodes an uploaded file into a drawable image.
pub fn decode(bytes: &[u8], hint: MediaHint) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let image = match hint {
        MediaHint::Svg => decode_vector(bytes)?,
        MediaHint::Raster => match image::guess_format(bytes) {
            Ok(format) => decode_raster(bytes, format)?,
            Err(_) if looks_like_markup(bytes) => decode_vector(bytes)?,
            Err(err) => return Err(DecodeError::Raster(err)),
        },
    };

    let (width, height) = image.natural_size();
    tracing::debug!(
        width,
        height,
        frames = image.frame_count(),
        "decoded key image"
    );
    Ok(image)
}

fn looks_like_markup(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .is_some_and(|byte| *byte == b'<')
}

fn decode_raster(bytes: &[u8], format: ImageFormat) -> Result<DecodedImage, DecodeError> {
    if format == ImageFormat::Gif {
        let decoder = GifDecoder::new(Cursor::new(bytes))?;
        let frames = decoder
            .into_frames()
            .collect_frames()?
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let millis = if denom == 0 { 0 } else { numer / denom };
                (frame.into_buffer(), Duration::from_millis(u64::from(millis)))
            })
            .collect();
        return DecodedImage::from_frames(frames);
    }

    let pixels = image::load_from_memory_with_format(bytes, format)?.to_rgba8();
    DecodedImage::from_rgba(pixels)
}

fn decode_vector(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
        .map_err(|err| DecodeError::Vector(err.to_string()))?;
    let size = tree.size();
    let (width, height) = (size.width(), size.height());
    if !(width > 0.0 && height > 0.0) {
        return Err(DecodeError::ZeroSized);
    }

    let scale = (VECTOR_RASTER_EDGE as f32 / width.max(height)).max(1.0);
    let raster_width = (width * scale).ceil().max(1.0) as u32;
    let raster_height = (height * scale).ceil().max(1.0) as u32;
    let mut pixmap = Pixmap::new(raster_width, raster_height).ok_or_else(|| {
        DecodeError::Vector(format!(
            "cannot allocate {raster_width}x{raster_height} raster"
        ))
    })?;
    let transform = Transform::from_scale(
        raster_width as f32 / width,
        raster_height as f32 / height,
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let mut raw = Vec::with_capacity(raster_width as usize * raster_height as usize * 4);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        raw.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    let pixels = RgbaImage::from_raw(raster_width, raster_height, raw)
        .ok_or_else(|| DecodeError::Vector("rasterized SVG has unexpected length".into()))?;

    DecodedImage::with_natural_size(width, height, vec![(pixels, Duration::ZERO)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgba};

    fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_png_with_natural_size() {
        let image = decode(&png_bytes(40, 20, [255, 0, 0, 255]), MediaHint::Raster).unwrap();
        assert_eq!(image.natural_size(), (40.0, 20.0));
        assert!(!image.is_animated());
        assert_eq!(image.frame_at(Duration::from_secs(3)).get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rejects_garbage_and_empty_uploads() {
        assert!(matches!(decode(&[], MediaHint::Raster), Err(DecodeError::Empty)));
        assert!(matches!(
            decode(b"definitely not an image", MediaHint::Raster),
            Err(DecodeError::Raster(_))
        ));
        assert!(matches!(
            decode(b"<svg", MediaHint::Svg),
            Err(DecodeError::Vector(_))
        ));
    }

    #[test]
    fn decodes_svg_at_natural_size() {
        let svg = br##"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10">
            <rect width="20" height="10" fill="#00ff00"/>
        </svg>"##;
        let image = decode(svg, MediaHint::Svg).unwrap();
        assert_eq!(image.natural_size(), (20.0, 10.0));
        let frame = image.frame_at(Duration::ZERO);
        assert!(frame.width() >= VECTOR_RASTER_EDGE);
        let center = frame.get_pixel(frame.width() / 2, frame.height() / 2).0;
        assert_eq!(center, [0, 255, 0, 255]);
    }

    #[test]
    fn sniffs_svg_without_hint() {
        let svg = br#"  <svg xmlns="http://www.w3.org/2000/svg" width="8" height="8"/>"#;
        let image = decode(svg, MediaHint::Raster).unwrap();
        assert_eq!(image.natural_size(), (8.0, 8.0));
    }

    #[test]
    fn hint_detection_prefers_svg_file_names() {
        assert_eq!(MediaHint::detect(Some(""), Some("logo.svg")), MediaHint::Svg);
        assert_eq!(MediaHint::detect(Some("image/svg+xml"), None), MediaHint::Svg);
        assert_eq!(MediaHint::detect(Some("image/png"), Some("a.png")), MediaHint::Raster);
        assert_eq!(MediaHint::detect(None, None), MediaHint::Raster);
    }

    #[test]
    fn animated_gif_cycles_through_frames() {
        let mut bytes = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut bytes);
            encoder.set_repeat(image::codecs::gif::Repeat::Infinite).unwrap();
            for color in [[255, 0, 0, 255], [0, 0, 255, 255]] {
                let frame = Frame::from_parts(
                    RgbaImage::from_pixel(4, 4, Rgba(color)),
                    0,
                    0,
                    Delay::from_numer_denom_ms(200, 1),
                );
                encoder.encode_frame(frame).unwrap();
            }
        }

        let image = decode(&bytes, MediaHint::Raster).unwrap();
        assert!(image.is_animated());
        assert_eq!(image.frame_count(), 2);
        let first = image.frame_at(Duration::from_millis(50)).get_pixel(1, 1).0;
        let second = image.frame_at(Duration::from_millis(250)).get_pixel(1, 1).0;
        let wrapped = image.frame_at(Duration::from_millis(450)).get_pixel(1, 1).0;
        assert!(first[0] > 200 && first[2] < 50);
        assert!(second[2] > 200 && second[0] < 50);
        assert_eq!(wrapped, first);
    }

    #[test]
    fn frames_without_content_are_rejected() {
        assert!(matches!(
            DecodedImage::from_frames(Vec::new()),
            Err(DecodeError::Empty)
        ));
    }
}
