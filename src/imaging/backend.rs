//! Raster backend trait and shared types.
//!
//! The [`RasterBackend`] trait is the only place filters touch a concrete
//! bitmap library. Three operations are required (decode, encode, resize);
//! everything else has a portable default written against [`Raster`] that a
//! backend may override with a faster native path.
//!
//! | Capability | Required | Default |
//! |---|---|---|
//! | decode / encode / resize | yes | — |
//! | identify | no | full decode |
//! | blur, rotate | no | `BackendError::Unsupported` |
//! | crop, paste, flip, grayscale | no | pixel loops |
//! | draw_line, fill_circle, fill_ellipse, fill_polygon, fill_rect | no | scanline rasterizers |
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{FlipAxis, OutputFormat, Quality, ResizeFilter};
use super::raster::{Color, Raster};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Operation not supported by the {backend} backend: {capability}")]
    Unsupported {
        backend: &'static str,
        capability: &'static str,
    },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A decoded source image plus the container format it came in, when known.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub raster: Raster,
    pub format: Option<OutputFormat>,
}

/// Capability interface over a concrete raster library.
///
/// Filters are written once against this trait; swapping the bitmap library
/// means writing one new implementation, not touching filter code.
pub trait RasterBackend: Send + Sync {
    /// Short name used in logs and capability errors.
    fn name(&self) -> &'static str;

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError>;

    fn encode(
        &self,
        raster: &Raster,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError>;

    fn resize(
        &self,
        raster: &Raster,
        width: u32,
        height: u32,
        filter: ResizeFilter,
    ) -> Result<Raster, BackendError>;

    /// Image dimensions without keeping the decoded pixels around.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let decoded = self.decode(bytes)?;
        Ok(Dimensions {
            width: decoded.raster.width(),
            height: decoded.raster.height(),
        })
    }

    /// Gaussian blur with the given standard deviation.
    fn blur(&self, _raster: &Raster, _sigma: f32) -> Result<Raster, BackendError> {
        Err(BackendError::Unsupported {
            backend: self.name(),
            capability: "blur",
        })
    }

    /// Rotate clockwise by `degrees`, growing the canvas to the rotated
    /// bounding box and filling uncovered area with `background`.
    fn rotate(
        &self,
        _raster: &Raster,
        _degrees: f32,
        _background: Color,
    ) -> Result<Raster, BackendError> {
        Err(BackendError::Unsupported {
            backend: self.name(),
            capability: "rotate",
        })
    }

    fn new_canvas(&self, width: u32, height: u32, fill: Color) -> Raster {
        Raster::filled(width, height, fill)
    }

    /// Copy out a region. The region is clipped to the raster; an empty
    /// intersection is an error.
    fn crop(
        &self,
        raster: &Raster,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Result<Raster, BackendError> {
        let x1 = x.saturating_add(width).min(raster.width());
        let y1 = y.saturating_add(height).min(raster.height());
        if x >= x1 || y >= y1 {
            return Err(BackendError::ProcessingFailed(format!(
                "crop {width}x{height}+{x}+{y} is outside a {}x{} image",
                raster.width(),
                raster.height()
            )));
        }
        Ok(Raster::from_fn(x1 - x, y1 - y, |cx, cy| {
            raster.get(x + cx, y + cy)
        }))
    }

    /// Alpha-composite `src` onto `dst` with its top-left corner at `(x, y)`.
    fn paste(&self, dst: &mut Raster, src: &Raster, x: i64, y: i64) {
        for sy in 0..src.height() {
            let dy = y + sy as i64;
            if dy < 0 || dy >= dst.height() as i64 {
                continue;
            }
            for sx in 0..src.width() {
                dst.blend(x + sx as i64, dy, src.get(sx, sy));
            }
        }
    }

    fn flip(&self, raster: &mut Raster, axis: FlipAxis) {
        let (w, h) = raster.dimensions();
        if matches!(axis, FlipAxis::Horizontal | FlipAxis::Both) {
            for y in 0..h {
                for x in 0..w / 2 {
                    let a = raster.get(x, y);
                    let b = raster.get(w - 1 - x, y);
                    raster.put(x, y, b);
                    raster.put(w - 1 - x, y, a);
                }
            }
        }
        if matches!(axis, FlipAxis::Vertical | FlipAxis::Both) {
            for y in 0..h / 2 {
                for x in 0..w {
                    let a = raster.get(x, y);
                    let b = raster.get(x, h - 1 - y);
                    raster.put(x, y, b);
                    raster.put(x, h - 1 - y, a);
                }
            }
        }
    }

    /// Luma grayscale; alpha is preserved.
    fn grayscale(&self, raster: &mut Raster) {
        raster.map_pixels(|c| {
            let l = c.luma();
            Color::rgba(l, l, l, c.a)
        });
    }

    fn draw_line(&self, raster: &mut Raster, from: (f64, f64), to: (f64, f64), color: Color) {
        let (mut x0, mut y0) = (from.0.round() as i64, from.1.round() as i64);
        let (x1, y1) = (to.0.round() as i64, to.1.round() as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            raster.put_checked(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Fill every pixel whose center lies within `radius` of `(cx, cy)`.
    fn fill_circle(&self, raster: &mut Raster, cx: f64, cy: f64, radius: f64, color: Color) {
        self.fill_ellipse(raster, cx, cy, radius, radius, color);
    }

    fn fill_ellipse(&self, raster: &mut Raster, cx: f64, cy: f64, rx: f64, ry: f64, color: Color) {
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let y0 = (cy - ry).floor().max(0.0) as i64;
        let y1 = ((cy + ry).ceil() as i64).min(raster.height() as i64 - 1);
        let x0 = (cx - rx).floor().max(0.0) as i64;
        let x1 = ((cx + rx).ceil() as i64).min(raster.width() as i64 - 1);
        for y in y0..=y1 {
            let ny = (y as f64 + 0.5 - cy) / ry;
            for x in x0..=x1 {
                let nx = (x as f64 + 0.5 - cx) / rx;
                if nx * nx + ny * ny <= 1.0 {
                    raster.put_checked(x, y, color);
                }
            }
        }
    }

    /// Even-odd scanline fill of a closed polygon.
    fn fill_polygon(&self, raster: &mut Raster, points: &[(f64, f64)], color: Color) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);
        let y0 = min_y.floor().max(0.0) as i64;
        let y1 = (max_y.ceil() as i64).min(raster.height() as i64 - 1);
        let mut crossings = Vec::with_capacity(points.len());
        for y in y0..=y1 {
            let sample = y as f64 + 0.5;
            crossings.clear();
            for i in 0..points.len() {
                let (ax, ay) = points[i];
                let (bx, by) = points[(i + 1) % points.len()];
                if (ay <= sample && by > sample) || (by <= sample && ay > sample) {
                    crossings.push(ax + (sample - ay) / (by - ay) * (bx - ax));
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let start = (pair[0] - 0.5).ceil().max(0.0) as i64;
                let end = ((pair[1] - 0.5).floor() as i64).min(raster.width() as i64 - 1);
                for x in start..=end {
                    raster.put_checked(x, y, color);
                }
            }
        }
    }

    fn fill_rect(&self, raster: &mut Raster, x: i64, y: i64, width: u32, height: u32, color: Color) {
        for yy in y.max(0)..(y + height as i64).min(raster.height() as i64) {
            for xx in x.max(0)..(x + width as i64).min(raster.width() as i64) {
                raster.put(xx as u32, yy as u32, color);
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal backend that only implements the required operations and
    /// records every call. Uses Mutex (not RefCell) so it is Sync.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_operations(&self) -> Vec<String> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl RasterBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError> {
            self.operations.lock().unwrap().push("decode".into());
            // First byte is the side length; the rest is ignored.
            let side = *bytes
                .first()
                .ok_or_else(|| BackendError::ProcessingFailed("empty input".into()))?;
            Ok(Decoded {
                raster: Raster::filled(side as u32, side as u32, Color::WHITE),
                format: None,
            })
        }

        fn encode(
            &self,
            raster: &Raster,
            format: OutputFormat,
            _quality: Quality,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(format!("encode {format}"));
            Ok(raster.as_raw().to_vec())
        }

        fn resize(
            &self,
            raster: &Raster,
            width: u32,
            height: u32,
            _filter: ResizeFilter,
        ) -> Result<Raster, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(format!("resize {width}x{height}"));
            Ok(Raster::from_fn(width, height, |x, y| {
                raster.get(
                    x * raster.width() / width.max(1),
                    y * raster.height() / height.max(1),
                )
            }))
        }
    }

    #[test]
    fn mock_records_operations() {
        let backend = MockBackend::new();
        let decoded = backend.decode(&[4]).unwrap();
        backend
            .resize(&decoded.raster, 2, 2, ResizeFilter::Nearest)
            .unwrap();
        assert_eq!(backend.get_operations(), vec!["decode", "resize 2x2"]);
    }

    #[test]
    fn default_identify_decodes() {
        let backend = MockBackend::new();
        let dims = backend.identify(&[7]).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 7,
                height: 7
            }
        );
    }

    #[test]
    fn blur_and_rotate_are_unsupported_by_default() {
        let backend = MockBackend::new();
        let r = Raster::new(2, 2);
        assert!(matches!(
            backend.blur(&r, 1.0),
            Err(BackendError::Unsupported {
                capability: "blur",
                ..
            })
        ));
        assert!(matches!(
            backend.rotate(&r, 45.0, Color::WHITE),
            Err(BackendError::Unsupported {
                capability: "rotate",
                ..
            })
        ));
    }

    #[test]
    fn crop_clips_and_rejects_empty() {
        let backend = MockBackend::new();
        let r = Raster::from_fn(4, 4, |x, y| Color::rgb(x as u8, y as u8, 0));
        let c = backend.crop(&r, 2, 2, 10, 10).unwrap();
        assert_eq!(c.dimensions(), (2, 2));
        assert_eq!(c.get(0, 0), Color::rgb(2, 2, 0));
        assert!(backend.crop(&r, 4, 0, 1, 1).is_err());
    }

    #[test]
    fn flip_horizontal_mirrors_rows() {
        let backend = MockBackend::new();
        let mut r = Raster::from_fn(3, 1, |x, _| Color::rgb(x as u8, 0, 0));
        backend.flip(&mut r, FlipAxis::Horizontal);
        assert_eq!(r.get(0, 0).r, 2);
        assert_eq!(r.get(2, 0).r, 0);
    }

    #[test]
    fn flip_vertical_mirrors_columns() {
        let backend = MockBackend::new();
        let mut r = Raster::from_fn(1, 3, |_, y| Color::rgb(y as u8, 0, 0));
        backend.flip(&mut r, FlipAxis::Vertical);
        assert_eq!(r.get(0, 0).r, 2);
    }

    #[test]
    fn fill_circle_covers_center_not_corners() {
        let backend = MockBackend::new();
        let mut r = Raster::new(10, 10);
        backend.fill_circle(&mut r, 5.0, 5.0, 4.0, Color::WHITE);
        assert_eq!(r.get(5, 5), Color::WHITE);
        assert_eq!(r.get(0, 0), Color::TRANSPARENT);
        assert_eq!(r.get(9, 9), Color::TRANSPARENT);
    }

    #[test]
    fn fill_polygon_square() {
        let backend = MockBackend::new();
        let mut r = Raster::new(10, 10);
        backend.fill_polygon(
            &mut r,
            &[(2.0, 2.0), (8.0, 2.0), (8.0, 8.0), (2.0, 8.0)],
            Color::WHITE,
        );
        let filled = r.pixels().filter(|c| *c == Color::WHITE).count();
        assert_eq!(filled, 36);
        assert_eq!(r.get(2, 2), Color::WHITE);
        assert_eq!(r.get(8, 8), Color::TRANSPARENT);
    }

    #[test]
    fn fill_rect_clips() {
        let backend = MockBackend::new();
        let mut r = Raster::new(4, 4);
        backend.fill_rect(&mut r, -2, -2, 4, 4, Color::WHITE);
        assert_eq!(r.pixels().filter(|c| *c == Color::WHITE).count(), 4);
    }

    #[test]
    fn draw_line_hits_endpoints() {
        let backend = MockBackend::new();
        let mut r = Raster::new(5, 5);
        backend.draw_line(&mut r, (0.0, 0.0), (4.0, 4.0), Color::WHITE);
        assert_eq!(r.get(0, 0), Color::WHITE);
        assert_eq!(r.get(2, 2), Color::WHITE);
        assert_eq!(r.get(4, 4), Color::WHITE);
        assert_eq!(r.get(4, 0), Color::TRANSPARENT);
    }

    #[test]
    fn paste_alpha_composites() {
        let backend = MockBackend::new();
        let mut dst = Raster::filled(3, 3, Color::WHITE);
        let mut src = Raster::new(2, 2);
        src.put(0, 0, Color::BLACK);
        backend.paste(&mut dst, &src, 1, 1);
        assert_eq!(dst.get(1, 1), Color::BLACK);
        assert_eq!(dst.get(2, 2), Color::WHITE);
    }
}
