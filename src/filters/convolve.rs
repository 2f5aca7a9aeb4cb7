//! Neighbourhood filters: 3x3 convolutions, Sobel edges, blur and pixelate.
//!
//! Convolutions touch the color channels only; alpha is carried through.
//! Edge pixels sample their clamped neighbours.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, Raster, ResizeFilter};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register("edgedetect", "", edgedetect);
    registry.register("emboss", "", emboss);
    registry.register("mean_removal", "", mean_removal);
    registry.register("smooth", "weight", smooth);
    registry.register("gaussian_blur", "[sigma]", gaussian_blur);
    registry.register("pixelate", "block_size[,advanced]", pixelate);
    registry.register("sobel_edgify", "[threshold]", sobel_edgify);
}

type Kernel = [[f64; 3]; 3];

/// Apply a 3x3 kernel: `sum / divisor + offset` per color channel.
pub(crate) fn convolve3(image: &Raster, kernel: &Kernel, divisor: f64, offset: f64) -> Raster {
    let divisor = if divisor == 0.0 { 1.0 } else { divisor };
    Raster::from_fn(image.width(), image.height(), |x, y| {
        let mut acc = [0.0f64; 3];
        for (ky, row) in kernel.iter().enumerate() {
            for (kx, weight) in row.iter().enumerate() {
                let c = image.get_clamped(x as i64 + kx as i64 - 1, y as i64 + ky as i64 - 1);
                acc[0] += c.r as f64 * weight;
                acc[1] += c.g as f64 * weight;
                acc[2] += c.b as f64 * weight;
            }
        }
        let ch = |v: f64| (v / divisor + offset).round().clamp(0.0, 255.0) as u8;
        Color::rgba(ch(acc[0]), ch(acc[1]), ch(acc[2]), image.get(x, y).a)
    })
}

fn edgedetect(image: &mut Raster, _args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let kernel = [[-1.0, 0.0, -1.0], [0.0, 4.0, 0.0], [-1.0, 0.0, -1.0]];
    *image = convolve3(image, &kernel, 1.0, 127.0);
    Ok(())
}

fn emboss(image: &mut Raster, _args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let kernel = [[1.5, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, -1.5]];
    *image = convolve3(image, &kernel, 1.0, 127.0);
    Ok(())
}

fn mean_removal(image: &mut Raster, _args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let kernel = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];
    *image = convolve3(image, &kernel, 1.0, 0.0);
    Ok(())
}

fn smooth(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let weight = args.float_in(0, 1.0, -8.0 + f64::EPSILON, 2048.0)?;
    let kernel = [[1.0, 1.0, 1.0], [1.0, weight, 1.0], [1.0, 1.0, 1.0]];
    *image = convolve3(image, &kernel, weight + 8.0, 0.0);
    Ok(())
}

/// Without a sigma this is the fixed 3x3 binomial kernel; with one, the
/// backend's true gaussian.
fn gaussian_blur(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    if args.raw(0).is_some() {
        let sigma = args.float_in(0, 1.0, 0.0, 100.0)?;
        if sigma > 0.0 {
            *image = ctx.backend.blur(image, sigma as f32)?;
        }
        return Ok(());
    }
    let kernel = [[1.0, 2.0, 1.0], [2.0, 4.0, 2.0], [1.0, 2.0, 1.0]];
    *image = convolve3(image, &kernel, 16.0, 0.0);
    Ok(())
}

/// Replace each `block`x`block` cell with one color. The simple mode takes
/// the cell's top-left pixel; the advanced mode averages the cell.
fn pixelate(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let block = args.int_in(0, 5, 1, 4096)? as u32;
    let advanced = args.bool_or(1, true)?;
    require_pixels(image)?;
    if block == 1 {
        return Ok(());
    }
    let (w, h) = image.dimensions();
    let cells = (w.div_ceil(block), h.div_ceil(block));
    let small = if advanced {
        ctx.backend.resize(image, cells.0, cells.1, ResizeFilter::Box)?
    } else {
        Raster::from_fn(cells.0, cells.1, |cx, cy| image.get(cx * block, cy * block))
    };
    *image = Raster::from_fn(w, h, |x, y| small.get(x / block, y / block));
    Ok(())
}

/// Sobel gradient magnitude on luma, thresholded and inverted: edges come
/// out black on white.
pub(crate) fn sobel(image: &Raster, threshold: f64) -> Raster {
    const GX: Kernel = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
    const GY: Kernel = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

    Raster::from_fn(image.width(), image.height(), |x, y| {
        let (mut gx, mut gy) = (0.0, 0.0);
        for ky in 0..3 {
            for kx in 0..3 {
                let luma = image
                    .get_clamped(x as i64 + kx as i64 - 1, y as i64 + ky as i64 - 1)
                    .luma() as f64;
                gx += GX[ky][kx] * luma;
                gy += GY[ky][kx] * luma;
            }
        }
        let magnitude = (gx * gx + gy * gy).sqrt();
        let v = if magnitude > threshold { 0 } else { 255 };
        Color::rgba(v, v, v, image.get(x, y).a)
    })
}

fn sobel_edgify(image: &mut Raster, args: Args<'_>, _ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let threshold = args.float_in(0, 64.0, 0.0, 1500.0)?;
    *image = sobel(image, threshold);
    Ok(())
}
