use super::{Args, FilterContext, FilterRegistry, SkipReason};
use crate::imaging::{Color, Raster};

const USAGE: &str = "[amount(0..500)[,radius(0..50)[,threshold(0..255)]]]";

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("unsharp_mask", USAGE, unsharp_mask);
    registry.register("sharpen", USAGE, unsharp_mask);
}

/// Push every channel away from its blurred value by `amount` percent of the
/// difference, but only where that difference exceeds `threshold`.
pub(crate) fn unsharp(original: &Raster, blurred: &Raster, amount: f64, threshold: u8) -> Raster {
    let k = amount / 100.0;
    Raster::from_fn(original.width(), original.height(), |x, y| {
        let o = original.get(x, y);
        let b = blurred.get(x, y);
        let ch = |ov: u8, bv: u8| {
            let diff = ov as f64 - bv as f64;
            if diff.abs() <= threshold as f64 {
                ov
            } else {
                (ov as f64 + diff * k).round().clamp(0.0, 255.0) as u8
            }
        };
        Color::rgba(ch(o.r, b.r), ch(o.g, b.g), ch(o.b, b.b), o.a)
    })
}

fn unsharp_mask(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let amount = args.float_in(0, 80.0, 0.0, 500.0)?;
    let radius = args.float_in(1, 0.5, 0.0, 50.0)?;
    let threshold = args.int_in(2, 3, 0, 255)? as u8;
    if radius == 0.0 || amount == 0.0 {
        return Ok(());
    }
    let blurred = ctx.backend.blur(image, radius as f32)?;
    *image = unsharp(image, &blurred, amount, threshold);
    Ok(())
}
