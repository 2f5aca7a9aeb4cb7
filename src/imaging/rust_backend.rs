//! Pure Rust raster backend built on the `image` crate.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF) | `image::ImageReader` with format sniffing |
//! | Encode → JPEG / PNG | `JpegEncoder` / `PngEncoder` |
//! | Encode → WebP | `WebPEncoder::new_lossless` (the pure Rust encoder is lossless only) |
//! | Encode → GIF | `DynamicImage::write_to` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//! | Resize | `image::imageops::resize`; `Box` is a local area-average |
//! | Blur | `image::imageops::blur` |
//! | Rotate | `imageops::rotate90/180/270`, bilinear resample for other angles |

use super::backend::{BackendError, Decoded, Dimensions, RasterBackend};
use super::params::{OutputFormat, Quality, ResizeFilter};
use super::raster::{Color, Raster};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, RgbaImage};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn to_rgba_image(raster: &Raster) -> Result<RgbaImage, BackendError> {
    RgbaImage::from_raw(raster.width(), raster.height(), raster.as_raw().to_vec())
        .ok_or_else(|| BackendError::ProcessingFailed("raster buffer size mismatch".into()))
}

fn from_rgba_image(img: RgbaImage) -> Result<Raster, BackendError> {
    let (w, h) = img.dimensions();
    Raster::from_rgba(w, h, img.into_raw())
        .ok_or_else(|| BackendError::ProcessingFailed("decoded buffer size mismatch".into()))
}

fn output_format_of(format: ImageFormat) -> Option<OutputFormat> {
    match format {
        ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        ImageFormat::Png => Some(OutputFormat::Png),
        ImageFormat::WebP => Some(OutputFormat::WebP),
        ImageFormat::Gif => Some(OutputFormat::Gif),
        ImageFormat::Avif => Some(OutputFormat::Avif),
        _ => None,
    }
}

fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    Ok(ImageReader::new(Cursor::new(bytes)).with_guessed_format()?)
}

fn encode_failed(format: OutputFormat) -> impl Fn(image::ImageError) -> BackendError {
    move |e| BackendError::ProcessingFailed(format!("{format} encode failed: {e}"))
}

/// Area-average resample: each output pixel is the mean of the source block it covers.
fn box_resize(raster: &Raster, width: u32, height: u32) -> Raster {
    let (sw, sh) = (raster.width() as u64, raster.height() as u64);
    Raster::from_fn(width, height, |x, y| {
        let x0 = x as u64 * sw / width as u64;
        let x1 = (((x as u64 + 1) * sw).div_ceil(width as u64)).max(x0 + 1).min(sw);
        let y0 = y as u64 * sh / height as u64;
        let y1 = (((y as u64 + 1) * sh).div_ceil(height as u64)).max(y0 + 1).min(sh);
        let mut sum = [0u64; 4];
        for sy in y0..y1 {
            for sx in x0..x1 {
                let c = raster.get(sx as u32, sy as u32);
                sum[0] += c.r as u64;
                sum[1] += c.g as u64;
                sum[2] += c.b as u64;
                sum[3] += c.a as u64;
            }
        }
        let n = ((x1 - x0) * (y1 - y0)).max(1);
        let avg = |v: u64| ((v + n / 2) / n) as u8;
        Color::rgba(avg(sum[0]), avg(sum[1]), avg(sum[2]), avg(sum[3]))
    })
}

/// Bilinear sample at continuous coordinates; samples outside the raster read as `background`.
fn sample_bilinear(raster: &Raster, fx: f64, fy: f64, background: Color) -> Color {
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let fetch = |x: f64, y: f64| {
        raster
            .get_checked(x as i64, y as i64)
            .unwrap_or(background)
    };
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);
    let lerp = |a: u8, b: u8, c: u8, d: u8| {
        let top = a as f64 * (1.0 - tx) + b as f64 * tx;
        let bottom = c as f64 * (1.0 - tx) + d as f64 * tx;
        (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8
    };
    Color::rgba(
        lerp(c00.r, c10.r, c01.r, c11.r),
        lerp(c00.g, c10.g, c01.g, c11.g),
        lerp(c00.b, c10.b, c01.b, c11.b),
        lerp(c00.a, c10.a, c01.a, c11.a),
    )
}

impl RasterBackend for RustBackend {
    fn name(&self) -> &'static str {
        "image-rs"
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, BackendError> {
        let reader = reader(bytes)?;
        let format = reader.format().and_then(output_format_of);
        let img = reader
            .decode()
            .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode: {e}")))?;
        Ok(Decoded {
            raster: from_rgba_image(img.to_rgba8())?,
            format,
        })
    }

    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = reader(bytes)?.into_dimensions().map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {e}"))
        })?;
        Ok(Dimensions { width, height })
    }

    fn encode(
        &self,
        raster: &Raster,
        format: OutputFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, BackendError> {
        let img = DynamicImage::ImageRgba8(to_rgba_image(raster)?);
        let q = quality.value() as u8;
        let mut out = Vec::new();
        match format {
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, q))
                .map_err(encode_failed(format))?,
            OutputFormat::Png => img
                .write_with_encoder(PngEncoder::new(&mut out))
                .map_err(encode_failed(format))?,
            OutputFormat::WebP => img
                .write_with_encoder(WebPEncoder::new_lossless(&mut out))
                .map_err(encode_failed(format))?,
            OutputFormat::Gif => img
                .write_to(&mut Cursor::new(&mut out), ImageFormat::Gif)
                .map_err(encode_failed(format))?,
            OutputFormat::Avif => img
                .write_with_encoder(AvifEncoder::new_with_speed_quality(&mut out, 6, q))
                .map_err(encode_failed(format))?,
        }
        Ok(out)
    }

    fn resize(
        &self,
        raster: &Raster,
        width: u32,
        height: u32,
        filter: ResizeFilter,
    ) -> Result<Raster, BackendError> {
        if width == 0 || height == 0 || raster.is_empty() {
            return Err(BackendError::ProcessingFailed(format!(
                "cannot resize {}x{} to {width}x{height}",
                raster.width(),
                raster.height()
            )));
        }
        if raster.dimensions() == (width, height) {
            return Ok(raster.clone());
        }
        let filter = match filter {
            ResizeFilter::Box => return Ok(box_resize(raster, width, height)),
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        };
        let img = to_rgba_image(raster)?;
        from_rgba_image(imageops::resize(&img, width, height, filter))
    }

    fn blur(&self, raster: &Raster, sigma: f32) -> Result<Raster, BackendError> {
        if sigma <= 0.0 {
            return Ok(raster.clone());
        }
        let img = to_rgba_image(raster)?;
        from_rgba_image(imageops::blur(&img, sigma))
    }

    fn rotate(
        &self,
        raster: &Raster,
        degrees: f32,
        background: Color,
    ) -> Result<Raster, BackendError> {
        let normalized = degrees.rem_euclid(360.0);
        let img = || to_rgba_image(raster);
        match normalized {
            d if d == 0.0 => return Ok(raster.clone()),
            d if d == 90.0 => return from_rgba_image(imageops::rotate90(&img()?)),
            d if d == 180.0 => return from_rgba_image(imageops::rotate180(&img()?)),
            d if d == 270.0 => return from_rgba_image(imageops::rotate270(&img()?)),
            _ => {}
        }

        let theta = (normalized as f64).to_radians();
        let (sin, cos) = theta.sin_cos();
        let (w, h) = (raster.width() as f64, raster.height() as f64);
        let new_w = (w * cos.abs() + h * sin.abs()).ceil().max(1.0);
        let new_h = (w * sin.abs() + h * cos.abs()).ceil().max(1.0);
        Ok(Raster::from_fn(new_w as u32, new_h as u32, |x, y| {
            let dx = x as f64 + 0.5 - new_w / 2.0;
            let dy = y as f64 + 0.5 - new_h / 2.0;
            // Inverse of a clockwise rotation in y-down image space.
            let sx = dx * cos + dy * sin + w / 2.0 - 0.5;
            let sy = -dx * sin + dy * cos + h / 2.0 - 0.5;
            sample_bilinear(raster, sx, sy, background)
        }))
    }
}
