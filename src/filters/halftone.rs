//! Halftone ("dot") filter.
//!
//! The image is downsampled so each output block becomes one sample, then a
//! fresh canvas is covered with one dot per block whose size follows the
//! sample's darkness.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, Raster, ResizeFilter};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register(
        "dot",
        "[block_size[,multiplier[,circle|square[,color[,background]]]]]",
        dot,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotShape {
    Circle,
    Square,
}

impl DotShape {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "circle" | "round" => Some(Self::Circle),
            "square" => Some(Self::Square),
            _ => None,
        }
    }
}

fn dot(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let block = args.int_in(0, 6, 1, 1024)? as u32;
    let multiplier = args.float_in(1, 1.0, 0.0, 10.0)?;
    let shape = args.keyword(2, DotShape::Circle, DotShape::from_name, "expected circle or square")?;
    let fixed = args.color_opt(3)?;
    let background = args.color_or(4, Color::WHITE)?;
    require_pixels(image)?;

    let (w, h) = image.dimensions();
    let samples = ctx
        .backend
        .resize(image, w.div_ceil(block), h.div_ceil(block), ResizeFilter::Box)?;
    let mut canvas = ctx.backend.new_canvas(w, h, background);
    let half = block as f64 / 2.0;

    for sy in 0..samples.height() {
        for sx in 0..samples.width() {
            let sample = samples.get(sx, sy);
            let intensity = (255.0 - sample.luma() as f64) / 255.0 * multiplier * 1.2;
            let color = fixed.unwrap_or(sample);
            let cx = sx as f64 * block as f64 + half;
            let cy = sy as f64 * block as f64 + half;
            match shape {
                DotShape::Circle => {
                    let radius = half * intensity * 1.2;
                    if radius > 0.0 {
                        ctx.backend.fill_circle(&mut canvas, cx, cy, radius, color);
                    }
                }
                DotShape::Square => {
                    let side = (block as f64 * intensity).min(block as f64).round() as u32;
                    if side > 0 {
                        let x = (cx - side as f64 / 2.0).round() as i64;
                        let y = (cy - side as f64 / 2.0).round() as i64;
                        ctx.backend.fill_rect(&mut canvas, x, y, side, side, color);
                    }
                }
            }
        }
    }
    *image = canvas;
    Ok(())
}
