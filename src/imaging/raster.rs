//! Owned RGBA raster buffer and the [`Color`] type used across the crate.
//!
//! Every filter works on a [`Raster`]: a tightly packed, row-major RGBA8
//! buffer owned by the pipeline for the duration of one transform. Nothing in
//! here knows about codecs or resampling; that lives behind
//! [`RasterBackend`](super::backend::RasterBackend).

use std::fmt;

/// An RGBA color with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `rgb`, `rrggbb` or `rrggbbaa` hex, with or without a leading `#`.
    ///
    /// ```
    /// # use imgforge::imaging::Color;
    /// assert_eq!(Color::parse_hex("#f00"), Some(Color::rgb(255, 0, 0)));
    /// assert_eq!(Color::parse_hex("00ff0080"), Some(Color::rgba(0, 255, 0, 128)));
    /// assert_eq!(Color::parse_hex("nope"), None);
    /// ```
    pub fn parse_hex(input: &str) -> Option<Self> {
        let hex = input.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            3 => {
                let expand = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|v| v * 17);
                Some(Self::rgb(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Some(Self::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => None,
        }
    }

    /// Lowercase `rrggbbaa` form. Used for canonical cache-key encoding.
    pub fn to_hex(self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Rec. 601 luma of the color channels, ignoring alpha.
    pub fn luma(self) -> u8 {
        let l = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        l.round().clamp(0.0, 255.0) as u8
    }

    /// Composite `self` over `below` (straight alpha).
    pub fn over(self, below: Color) -> Color {
        if self.a == 255 || below.a == 0 {
            return self;
        }
        if self.a == 0 {
            return below;
        }
        let sa = self.a as f32 / 255.0;
        let da = below.a as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        let mix = |s: u8, d: u8| {
            let v = (s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a;
            v.round().clamp(0.0, 255.0) as u8
        };
        Color {
            r: mix(self.r, below.r),
            g: mix(self.g, below.g),
            b: mix(self.b, below.b),
            a: (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

/// Row-major RGBA8 pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Color::TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let len = width as usize * height as usize;
        let mut data = Vec::with_capacity(len * 4);
        for _ in 0..len {
            data.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap an existing RGBA8 buffer. Returns `None` if the length is wrong.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        let mut raster = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                raster.put(x, y, f(x, y));
            }
        }
        raster
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel at `(x, y)`. Panics when out of bounds, like slice indexing.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Color {
        let i = self.index(x, y);
        Color::rgba(
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        )
    }

    /// Pixel at signed coordinates, `None` outside the raster.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<Color> {
        self.contains(x, y).then(|| self.get(x as u32, y as u32))
    }

    /// Pixel at signed coordinates, clamped to the nearest edge.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> Color {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(cx, cy)
    }

    #[inline]
    pub fn put(&mut self, x: u32, y: u32, color: Color) {
        let i = self.index(x, y);
        self.data[i..i + 4].copy_from_slice(&[color.r, color.g, color.b, color.a]);
    }

    /// Set a pixel at signed coordinates; writes outside the raster are dropped.
    #[inline]
    pub fn put_checked(&mut self, x: i64, y: i64, color: Color) {
        if self.contains(x, y) {
            self.put(x as u32, y as u32, color);
        }
    }

    /// Alpha-composite `color` over the pixel at `(x, y)`; out-of-range writes are dropped.
    #[inline]
    pub fn blend(&mut self, x: i64, y: i64, color: Color) {
        if self.contains(x, y) {
            let below = self.get(x as u32, y as u32);
            self.put(x as u32, y as u32, color.over(below));
        }
    }

    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    /// Apply `f` to every pixel in place.
    pub fn map_pixels(&mut self, mut f: impl FnMut(Color) -> Color) {
        for px in self.data.chunks_exact_mut(4) {
            let c = f(Color::rgba(px[0], px[1], px[2], px[3]));
            px.copy_from_slice(&[c.r, c.g, c.b, c.a]);
        }
    }

    /// Iterate pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Color> + '_ {
        self.data
            .chunks_exact(4)
            .map(|px| Color::rgba(px[0], px[1], px[2], px[3]))
    }

    /// True if any pixel is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.data.chunks_exact(4).any(|px| px[3] < 255)
    }

    /// Flatten onto an opaque background (used before encoding to formats without alpha).
    pub fn flatten(&mut self, background: Color) {
        let bg = background.with_alpha(255);
        self.map_pixels(|c| c.over(bg));
    }
}
