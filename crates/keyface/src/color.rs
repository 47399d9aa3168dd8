use std::fmt;
use std::str::FromStr;

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("color value must not be empty")]
    Empty,
    #[error("invalid color '{0}'; expected #rgb, #rrggbb, #rrggbbaa, or 'transparent'")]
    Invalid(String),
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0, 0, 0, 0);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLUE: Rgba = Rgba::rgb(0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from its three channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }

    /// Source-over blend of `self` on top of `below`.
    pub fn over(self, below: Rgba) -> Rgba {
        match self.a {
            255 => return self,
            0 => return below,
            _ => {}
        }

        let src_a = f32::from(self.a) / 255.0;
        let dst_a = f32::from(below.a) / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        let channel = |src: u8, dst: u8| -> u8 {
            let value =
                (f32::from(src) * src_a + f32::from(dst) * dst_a * (1.0 - src_a)) / out_a;
            value.round().clamp(0.0, 255.0) as u8
        };

        Rgba {
            r: channel(self.r, below.r),
            g: channel(self.g, below.g),
            b: channel(self.b, below.b),
            a: (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
        }
    }
}

impl FromStr for Rgba {
    type Err = ColorParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ColorParseError::Empty);
        }

        if trimmed.eq_ignore_ascii_case("transparent") {
            return Ok(Rgba::TRANSPARENT);
        }

        let invalid = || ColorParseError::Invalid(trimmed.to_string());
        let hex = trimmed.strip_prefix('#').ok_or_else(invalid)?;
        if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let pair = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).map_err(|_| invalid());
        let nibble = |index: usize| {
            u8::from_str_radix(&hex[index..index + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| invalid())
        };

        match hex.len() {
            3 => Ok(Rgba::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
            6 => Ok(Rgba::rgb(pair(0)?, pair(2)?, pair(4)?)),
            8 => Ok(Rgba::new(pair(0)?, pair(2)?, pair(4)?, pair(6)?)),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(
                f,
                "#{:02x}{:02x}{:02x}{:02x}",
                self.r, self.g, self.b, self.a
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_picker_values() {
        assert_eq!("#112233".parse::<Rgba>().unwrap(), Rgba::rgb(0x11, 0x22, 0x33));
        assert_eq!("#fff".parse::<Rgba>().unwrap(), Rgba::WHITE);
        assert_eq!(
            "#11223380".parse::<Rgba>().unwrap(),
            Rgba::new(0x11, 0x22, 0x33, 0x80)
        );
        assert_eq!("transparent".parse::<Rgba>().unwrap(), Rgba::TRANSPARENT);
    }

    #[test]
    fn rejects_malformed_values() {
        assert_eq!("".parse::<Rgba>(), Err(ColorParseError::Empty));
        assert!("112233".parse::<Rgba>().is_err());
        assert!("#12345".parse::<Rgba>().is_err());
        assert!("#zzzzzz".parse::<Rgba>().is_err());
        assert!("#ééé".parse::<Rgba>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let color = Rgba::new(1, 2, 3, 4);
        assert_eq!(color.to_string(), "#01020304");
        assert_eq!(Rgba::BLUE.to_string(), "#0000ff");
    }

    #[test]
    fn over_handles_extremes() {
        let base = Rgba::rgb(10, 20, 30);
        assert_eq!(Rgba::WHITE.over(base), Rgba::WHITE);
        assert_eq!(Rgba::TRANSPARENT.over(base), base);
        assert_eq!(Rgba::new(255, 0, 0, 128).over(Rgba::TRANSPARENT).a, 128);
    }

    #[test]
    fn half_alpha_mixes_evenly_over_opaque() {
        let mixed = Rgba::new(255, 255, 255, 128).over(Rgba::BLACK);
        assert_eq!(mixed.a, 255);
        assert!((127..=129).contains(&mixed.r));
    }
}
