//! Watermark compositing, single or tiled.
//!
//! Tiling lays rows of marks over a layer one mark larger than the image
//! on every side, then keeps the part that lines up with the image. Each
//! row drifts left by `mark_width + repeat_offset_x + gap_x`, giving a
//! diagonal pattern; rows therefore carry extra columns so the drift never
//! opens a gap on the right.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, HAlign, Raster, VAlign};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register(
        "watermark",
        "source[,h,v[,offset_x,offset_y[,opacity[,single|repeat[,gap_x,gap_y[,repeat_offset_x[,rotate]]]]]]]",
        watermark,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkMode {
    Single,
    Repeat,
}

impl WatermarkMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "repeat" | "tile" => Some(Self::Repeat),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Repeat => "repeat",
        }
    }
}

/// Columns and rows needed to tile a `width`x`height` image with a
/// `mark`-sized watermark separated by `gap`.
pub fn repeat_counts(width: u32, height: u32, mark: (u32, u32), gap: (u32, u32)) -> (u32, u32) {
    let count = |dim: u32, size: u32, gap: u32| {
        let span = (dim as f64 + 2.0 * size as f64) / (size as f64 + gap as f64);
        span.ceil() as u32 + 2
    };
    (count(width, mark.0, gap.0), count(height, mark.1, gap.1))
}

/// Top-left of tile (`col`, `row`) in layer coordinates.
pub fn tile_origin(col: u32, row: u32, mark: (u32, u32), gap: (u32, u32), repeat_offset_x: i32) -> (i64, i64) {
    let (ww, wh) = (mark.0 as i64, mark.1 as i64);
    let (gx, gy) = (gap.0 as i64, gap.1 as i64);
    let (col, row) = (col as i64, row as i64);
    let x = ww + col * (ww + gx) - row * (ww + repeat_offset_x as i64 + gx) + gx;
    let y = row * (wh + gy);
    (x, y)
}

#[derive(Debug, Clone)]
struct Placement {
    h: HAlign,
    v: VAlign,
    offset_x: i64,
    offset_y: i64,
    opacity: f64,
    mode: WatermarkMode,
    gap: (u32, u32),
    repeat_offset_x: i32,
    rotate: f64,
}

fn parse(args: &Args<'_>) -> Result<Placement, SkipReason> {
    Ok(Placement {
        h: args.halign_or(1, HAlign::Right)?,
        v: args.valign_or(2, VAlign::Bottom)?,
        offset_x: args.int_in(3, 0, -100_000, 100_000)?,
        offset_y: args.int_in(4, 0, -100_000, 100_000)?,
        opacity: args.int_in(5, 100, 0, 100)? as f64 / 100.0,
        mode: args.keyword(6, WatermarkMode::Single, WatermarkMode::from_name, "expected single or repeat")?,
        gap: (
            args.int_in(7, 0, 0, 100_000)? as u32,
            args.int_in(8, 0, 0, 100_000)? as u32,
        ),
        repeat_offset_x: args.int_in(9, 0, -100_000, 100_000)? as i32,
        rotate: args.float_or(10, 0.0)?,
    })
}

/// Offset from the anchored edge, pointing inwards.
fn anchored(place: i64, offset: i64, far_edge: bool) -> i64 {
    if far_edge { place - offset } else { place + offset }
}

fn watermark(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let source = args.text(0, "watermark source")?;
    let p = parse(&args)?;
    require_pixels(image)?;

    let mut mark = ctx.load_raster(source)?;
    if p.rotate.rem_euclid(360.0) != 0.0 {
        mark = ctx.backend.rotate(&mark, p.rotate as f32, Color::TRANSPARENT)?;
    }
    if p.opacity < 1.0 {
        mark.map_pixels(|c| c.with_alpha((c.a as f64 * p.opacity).round() as u8));
    }
    require_pixels(&mark)?;

    let (w, h) = image.dimensions();
    let (mw, mh) = mark.dimensions();
    match p.mode {
        WatermarkMode::Single => {
            let free_x = w as i64 - mw as i64;
            let free_y = h as i64 - mh as i64;
            let x = anchored(p.h.place(free_x), p.offset_x, p.h == HAlign::Right);
            let y = anchored(p.v.place(free_y), p.offset_y, p.v == VAlign::Bottom);
            ctx.backend.paste(image, &mark, x, y);
        }
        WatermarkMode::Repeat => {
            let (cols, rows) = repeat_counts(w, h, (mw, mh), p.gap);
            // Layer coordinates are shifted by one mark; pasting straight
            // into the image at (x - mw, y - mh) is the same as cropping
            // the layer at (mw, mh).
            for row in 0..rows {
                for col in 0..cols + row {
                    let (x, y) = tile_origin(col, row, (mw, mh), p.gap, p.repeat_offset_x);
                    let (ix, iy) = (x - mw as i64, y - mh as i64);
                    if ix >= w as i64 || iy >= h as i64 || ix + (mw as i64) <= 0 || iy + (mh as i64) <= 0 {
                        continue;
                    }
                    ctx.backend.paste(image, &mark, ix, iy);
                }
            }
        }
    }
    Ok(())
}
