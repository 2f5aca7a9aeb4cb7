//! Borders.
//!
//! `border` frames opaque images with a solid box. When the image has any
//! transparency it switches to the drawn variant, `mask_border`, which
//! traces the outline of the visible shape instead.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, Raster, RasterBackend};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("border", "width[,color]", border);
    registry.register("mask_border", "width[,color]", mask_border);
}

const ALPHA_CUTOFF: u8 = 128;

/// Grow the canvas by `width` on every side, fill it with `color` and
/// paste the original in the middle.
pub(crate) fn box_border(backend: &dyn RasterBackend, image: &Raster, width: u32, color: Color) -> Raster {
    let mut canvas = backend.new_canvas(image.width() + width * 2, image.height() + width * 2, color);
    backend.paste(&mut canvas, image, width as i64, width as i64);
    canvas
}

/// Stamp a disc of radius `width` on every pixel where the visible shape
/// meets transparency (or the image edge), then paste the original on top.
pub(crate) fn drawn_border(backend: &dyn RasterBackend, image: &Raster, width: u32, color: Color) -> Raster {
    let (w, h) = image.dimensions();
    let mut canvas = backend.new_canvas(w + width * 2, h + width * 2, Color::TRANSPARENT);
    let visible = |x: i64, y: i64| {
        image
            .get_checked(x, y)
            .is_some_and(|c| c.a >= ALPHA_CUTOFF)
    };
    let offset = width as f64 + 0.5;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            if !visible(x, y) {
                continue;
            }
            let on_edge = !visible(x - 1, y) || !visible(x + 1, y) || !visible(x, y - 1) || !visible(x, y + 1);
            if on_edge {
                backend.fill_circle(&mut canvas, x as f64 + offset, y as f64 + offset, width as f64, color);
            }
        }
    }
    backend.paste(&mut canvas, image, width as i64, width as i64);
    canvas
}

fn parse(args: &Args<'_>) -> Result<(u32, Color), SkipReason> {
    let width = args.int_in(0, 1, 0, 1000)? as u32;
    let color = args.color_or(1, Color::BLACK)?;
    Ok((width, color))
}

fn border(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let (width, color) = parse(&args)?;
    require_pixels(image)?;
    if width == 0 {
        return Ok(());
    }
    *image = if image.has_transparency() {
        drawn_border(ctx.backend, image, width, color)
    } else {
        box_border(ctx.backend, image, width, color)
    };
    Ok(())
}

fn mask_border(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let (width, color) = parse(&args)?;
    require_pixels(image)?;
    if width == 0 {
        return Ok(());
    }
    *image = drawn_border(ctx.backend, image, width, color);
    Ok(())
}
