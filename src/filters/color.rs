//! Per-pixel color and tone filters.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, Raster};
use std::collections::HashMap;

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("grayscale", "", grayscale);
    registry.register("negate", "", negate);
    registry.register("brightness", "level(-255..255)", brightness);
    registry.register("contrast", "level(-100..100)", contrast);
    registry.register("colorize", "red,green,blue[,alpha(0..127)]", colorize);
    registry.register("sepia", "", sepia);
    registry.register("opacity", "percent(0..100)", opacity);
    registry.register("replace_colors", "from,to[,tolerance(0..100)]", replace_colors);
    registry.register("dominant_color", "[sample_step]", dominant_color);
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn grayscale(image: &mut Raster, _args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    ctx.backend.grayscale(image);
    Ok(())
}

fn negate(image: &mut Raster, _args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    image.map_pixels(|c| Color::rgba(255 - c.r, 255 - c.g, 255 - c.b, c.a));
    Ok(())
}

fn brightness(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let level = args.int_in(0, 0, -255, 255)? as f64;
    image.map_pixels(|c| {
        Color::rgba(
            clamp_u8(c.r as f64 + level),
            clamp_u8(c.g as f64 + level),
            clamp_u8(c.b as f64 + level),
            c.a,
        )
    });
    Ok(())
}

/// Positive levels reduce contrast, negative levels increase it.
fn contrast(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let level = args.int_in(0, 0, -100, 100)? as f64;
    let factor = ((100.0 - level) / 100.0).powi(2);
    let adjust = |v: u8| clamp_u8(((v as f64 / 255.0 - 0.5) * factor + 0.5) * 255.0);
    image.map_pixels(|c| Color::rgba(adjust(c.r), adjust(c.g), adjust(c.b), c.a));
    Ok(())
}

/// Adds per-channel offsets. The optional alpha is on the 0 (opaque) to
/// 127 (transparent) scale and fades the pixel accordingly.
fn colorize(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let r = args.int_in(0, 0, -255, 255)? as f64;
    let g = args.int_in(1, 0, -255, 255)? as f64;
    let b = args.int_in(2, 0, -255, 255)? as f64;
    let fade = 1.0 - args.int_in(3, 0, 0, 127)? as f64 / 127.0;
    image.map_pixels(|c| {
        Color::rgba(
            clamp_u8(c.r as f64 + r),
            clamp_u8(c.g as f64 + g),
            clamp_u8(c.b as f64 + b),
            clamp_u8(c.a as f64 * fade),
        )
    });
    Ok(())
}

/// Classic sepia matrix. The blue row sums the blue channel three times,
/// which is the established look callers depend on.
pub(crate) fn sepia_pixel(c: Color) -> Color {
    let (r, g, b) = (c.r as f64, c.g as f64, c.b as f64);
    Color::rgba(
        clamp_u8(0.393 * r + 0.769 * g + 0.189 * b),
        clamp_u8(0.349 * r + 0.686 * g + 0.168 * b),
        clamp_u8(0.272 * b + 0.534 * b + 0.131 * b),
        c.a,
    )
}

fn sepia(image: &mut Raster, _args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    image.map_pixels(sepia_pixel);
    Ok(())
}

fn opacity(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let percent = args.int_in(0, 100, 0, 100)? as f64;
    image.map_pixels(|c| c.with_alpha(clamp_u8(c.a as f64 * percent / 100.0)));
    Ok(())
}

/// Replace every pixel within `tolerance` percent of the maximum RGB
/// distance from `from` with `to`, keeping the pixel's own alpha.
fn replace_colors(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let from = args.color(0, "color to replace")?;
    let to = args.color(1, "replacement color")?;
    let tolerance = args.float_in(2, 0.0, 0.0, 100.0)?;
    let max_distance = (3.0f64 * 255.0 * 255.0).sqrt();
    let threshold = tolerance / 100.0 * max_distance;

    image.map_pixels(|c| {
        let dr = c.r as f64 - from.r as f64;
        let dg = c.g as f64 - from.g as f64;
        let db = c.b as f64 - from.b as f64;
        if (dr * dr + dg * dg + db * db).sqrt() <= threshold {
            Color::rgba(to.r, to.g, to.b, c.a)
        } else {
            c
        }
    });
    Ok(())
}

/// Most frequent color, sampling every `step`-th pixel in both directions.
/// Colors are bucketed at 5 bits per channel and the winning bucket is
/// averaged. Mostly transparent pixels do not vote.
pub fn dominant(image: &Raster, step: u32) -> Option<Color> {
    let step = step.max(1);
    let mut buckets: HashMap<(u8, u8, u8), (u64, [u64; 3])> = HashMap::new();
    for y in (0..image.height()).step_by(step as usize) {
        for x in (0..image.width()).step_by(step as usize) {
            let c = image.get(x, y);
            if c.a < 125 {
                continue;
            }
            let entry = buckets.entry((c.r >> 3, c.g >> 3, c.b >> 3)).or_default();
            entry.0 += 1;
            entry.1[0] += c.r as u64;
            entry.1[1] += c.g as u64;
            entry.1[2] += c.b as u64;
        }
    }
    buckets
        .into_iter()
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(b.0.cmp(&a.0)))
        .map(|(_, (count, sum))| {
            Color::rgb(
                (sum[0] / count) as u8,
                (sum[1] / count) as u8,
                (sum[2] / count) as u8,
            )
        })
}

fn dominant_color(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let step = args.int_in(0, 10, 1, 1000)? as u32;
    require_pixels(image)?;
    let color = dominant(image, step)
        .ok_or_else(|| SkipReason::EmptyGeometry("no opaque pixels to sample".into()))?;
    *image = ctx.backend.new_canvas(image.width(), image.height(), color);
    Ok(())
}
