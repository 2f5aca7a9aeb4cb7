use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, FlipAxis, Raster};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("flip", "h|v|both", flip);
    registry.register("rotate", "degrees[,background]", rotate);
}

fn flip(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let axis = args.keyword(0, FlipAxis::Horizontal, FlipAxis::from_name, "expected h, v or both")?;
    ctx.backend.flip(image, axis);
    Ok(())
}

/// Clockwise rotation; the canvas grows to fit and uncovered corners get
/// the background color (transparent by default).
fn rotate(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let degrees = args.float_or(0, 0.0)?.rem_euclid(360.0);
    let background = args.color_or(1, Color::TRANSPARENT)?;
    require_pixels(image)?;
    if degrees == 0.0 {
        return Ok(());
    }
    *image = ctx.backend.rotate(image, degrees as f32, background)?;
    Ok(())
}
