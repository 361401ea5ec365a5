use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(0xff, 0xff, 0xff);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Linear interpolation from `self` towards `other`; `t` is clamped to `[0, 1]`.
    pub fn lerp(self, other: Rgb, t: f32) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| -> u8 {
            let a = f32::from(a);
            let b = f32::from(b);
            (a + (b - a) * t).round().clamp(0.0, 255.0) as u8
        };
        Rgb::new(
            mix(self.r, other.r),
            mix(self.g, other.g),
            mix(self.b, other.b),
        )
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<syntect::highlighting::Color> for Rgb {
    fn from(color: syntect::highlighting::Color) -> Self {
        Rgb::new(color.r, color.g, color.b)
    }
}

impl From<Rgb> for ratatui::style::Color {
    fn from(color: Rgb) -> Self {
        ratatui::style::Color::Rgb(color.r, color.g, color.b)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Appearance {
    Light,
    #[default]
    Dark,
}

impl Appearance {
    /// Foreground used when a style leaves it unset or names an unusable color.
    pub fn default_foreground(self) -> Rgb {
        match self {
            Appearance::Light => Rgb::BLACK,
            Appearance::Dark => Rgb::WHITE,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Appearance::Light => Appearance::Dark,
            Appearance::Dark => Appearance::Light,
        }
    }
}

fn invalid(input: &str, reason: &'static str) -> Error {
    Error::InvalidColor {
        input: input.to_string(),
        reason,
    }
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`. The `#` is optional and alpha is ignored.
pub fn parse_hex(input: &str) -> Result<Rgb> {
    let digits = input.trim();
    let digits = digits.strip_prefix('#').unwrap_or(digits);
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid(input, "bad hex digit"));
    }

    let channel = |range: std::ops::Range<usize>| -> Result<u8> {
        u8::from_str_radix(&digits[range], 16).map_err(|_| invalid(input, "bad hex digit"))
    };

    match digits.len() {
        3 => {
            let short = |idx: usize| -> Result<u8> {
                let value = channel(idx..idx + 1)?;
                Ok(value * 0x11)
            };
            Ok(Rgb::new(short(0)?, short(1)?, short(2)?))
        }
        6 | 8 => Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?)),
        _ => Err(invalid(input, "expected 3, 6 or 8 hex digits")),
    }
}

pub fn named(name: &str) -> Option<Rgb> {
    let rgb = match name.trim().to_ascii_lowercase().as_str() {
        "black" => Rgb::new(0x00, 0x00, 0x00),
        "silver" => Rgb::new(0xc0, 0xc0, 0xc0),
        "gray" | "grey" => Rgb::new(0x80, 0x80, 0x80),
        "white" => Rgb::new(0xff, 0xff, 0xff),
        "maroon" => Rgb::new(0x80, 0x00, 0x00),
        "red" => Rgb::new(0xff, 0x00, 0x00),
        "purple" => Rgb::new(0x80, 0x00, 0x80),
        "fuchsia" | "magenta" => Rgb::new(0xff, 0x00, 0xff),
        "green" => Rgb::new(0x00, 0x80, 0x00),
        "lime" => Rgb::new(0x00, 0xff, 0x00),
        "olive" => Rgb::new(0x80, 0x80, 0x00),
        "yellow" => Rgb::new(0xff, 0xff, 0x00),
        "navy" => Rgb::new(0x00, 0x00, 0x80),
        "blue" => Rgb::new(0x00, 0x00, 0xff),
        "teal" => Rgb::new(0x00, 0x80, 0x80),
        "aqua" | "cyan" => Rgb::new(0x00, 0xff, 0xff),
        "orange" => Rgb::new(0xff, 0xa5, 0x00),
        _ => return None,
    };
    Some(rgb)
}

pub fn parse_color(input: &str) -> Result<Rgb> {
    match parse_hex(input) {
        Ok(rgb) => Ok(rgb),
        Err(err) => named(input).ok_or(err),
    }
}
