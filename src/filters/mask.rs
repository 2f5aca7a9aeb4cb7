//! Shape and image masks.
//!
//! A mask is a grayscale "keep" raster: white keeps a pixel, black removes
//! it. Shapes are drawn at twice the image size and downsampled, which
//! gives their edges a cheap anti-aliasing.

use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, Raster, RasterBackend, ResizeFilter};
use std::f64::consts::PI;

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register(
        "mask",
        "circle[,size%] | ellipse[,w%,h%] | rectangle[,w%,h%] | square[,size%] \
         | polygon,sides[,rotation[,size%]] | star,spikes[,split[,rotation[,size%]]] \
         | image,source[,invert]",
        mask,
    );
}

const SUPERSAMPLE: u32 = 2;

/// Vertices of a regular polygon. The first vertex points straight up
/// before `rotation` (degrees, clockwise) is applied.
pub fn polygon_points(cx: f64, cy: f64, radius: f64, sides: u32, rotation: f64) -> Vec<(f64, f64)> {
    let start = rotation.to_radians() - PI / 2.0;
    (0..sides)
        .map(|i| {
            let angle = start + 2.0 * PI * i as f64 / sides as f64;
            (cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

/// Vertices of a star: `spikes` outer points alternating with inner points
/// at `inner` radius.
pub fn star_points(
    cx: f64,
    cy: f64,
    outer: f64,
    inner: f64,
    spikes: u32,
    rotation: f64,
) -> Vec<(f64, f64)> {
    let start = rotation.to_radians() - PI / 2.0;
    let step = PI / spikes as f64;
    (0..spikes * 2)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let angle = start + step * i as f64;
            (cx + r * angle.cos(), cy + r * angle.sin())
        })
        .collect()
}

/// Multiply each pixel's alpha by the mask's luma. With `outside`, removed
/// area blends towards that color instead of becoming transparent.
pub fn apply_keep_mask(image: &mut Raster, mask: &Raster, outside: Option<Color>) {
    let (w, h) = image.dimensions();
    for y in 0..h {
        for x in 0..w {
            let keep = mask.get(x.min(mask.width() - 1), y.min(mask.height() - 1)).luma() as f64 / 255.0;
            let c = image.get(x, y);
            let out = match outside {
                None => c.with_alpha((c.a as f64 * keep).round() as u8),
                Some(bg) => {
                    let mix = |a: u8, b: u8| (a as f64 * keep + b as f64 * (1.0 - keep)).round() as u8;
                    Color::rgba(mix(c.r, bg.r), mix(c.g, bg.g), mix(c.b, bg.b), mix(c.a, bg.a))
                }
            };
            image.put(x, y, out);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Circle { size: f64 },
    Ellipse { width: f64, height: f64 },
    Rectangle { width: f64, height: f64 },
    Square { size: f64 },
    Polygon { sides: u32, rotation: f64, size: f64 },
    Star { spikes: u32, split: f64, rotation: f64, size: f64 },
}

fn percent(args: &Args<'_>, index: usize) -> Result<f64, SkipReason> {
    Ok(args.float_in(index, 100.0, 0.0, 100.0)? / 100.0)
}

fn parse_shape(kind: &str, args: &Args<'_>) -> Result<Shape, SkipReason> {
    Ok(match kind {
        "circle" => Shape::Circle { size: percent(args, 1)? },
        "ellipse" => Shape::Ellipse {
            width: percent(args, 1)?,
            height: percent(args, 2)?,
        },
        "rectangle" => Shape::Rectangle {
            width: percent(args, 1)?,
            height: percent(args, 2)?,
        },
        "square" => Shape::Square { size: percent(args, 1)? },
        "polygon" => Shape::Polygon {
            sides: args.int_in(1, 6, 3, 360)? as u32,
            rotation: args.float_or(2, 0.0)?,
            size: percent(args, 3)?,
        },
        "star" => Shape::Star {
            spikes: args.int_in(1, 5, 2, 360)? as u32,
            split: args.float_in(2, 0.5, 0.0, 1.0)?,
            rotation: args.float_or(3, 0.0)?,
            size: percent(args, 4)?,
        },
        other => {
            return Err(SkipReason::BadArgument {
                index: 0,
                value: other.to_string(),
                problem: "unknown mask shape".into(),
            });
        }
    })
}

/// Render `shape` as a keep-mask for a `width`x`height` image.
fn render_shape(
    backend: &dyn RasterBackend,
    shape: &Shape,
    width: u32,
    height: u32,
) -> Result<Raster, SkipReason> {
    let (mw, mh) = (width * SUPERSAMPLE, height * SUPERSAMPLE);
    let (fw, fh) = (mw as f64, mh as f64);
    let (cx, cy) = (fw / 2.0, fh / 2.0);
    let short = fw.min(fh);
    let mut mask = backend.new_canvas(mw, mh, Color::BLACK);

    match *shape {
        Shape::Circle { size } => backend.fill_circle(&mut mask, cx, cy, short / 2.0 * size, Color::WHITE),
        Shape::Ellipse { width, height } => {
            backend.fill_ellipse(&mut mask, cx, cy, fw / 2.0 * width, fh / 2.0 * height, Color::WHITE)
        }
        Shape::Rectangle { width, height } => {
            let (rw, rh) = ((fw * width).round(), (fh * height).round());
            backend.fill_rect(
                &mut mask,
                (cx - rw / 2.0).round() as i64,
                (cy - rh / 2.0).round() as i64,
                rw as u32,
                rh as u32,
                Color::WHITE,
            );
        }
        Shape::Square { size } => {
            let side = (short * size).round();
            let origin = |c: f64| (c - side / 2.0).round() as i64;
            backend.fill_rect(&mut mask, origin(cx), origin(cy), side as u32, side as u32, Color::WHITE);
        }
        Shape::Polygon { sides, rotation, size } => {
            let points = polygon_points(cx, cy, short / 2.0 * size, sides, rotation);
            backend.fill_polygon(&mut mask, &points, Color::WHITE);
        }
        Shape::Star { spikes, split, rotation, size } => {
            let outer = short / 2.0 * size;
            let points = star_points(cx, cy, outer, outer * split, spikes, rotation);
            backend.fill_polygon(&mut mask, &points, Color::WHITE);
        }
    }
    Ok(backend.resize(&mask, width, height, ResizeFilter::Box)?)
}

/// Keep-mask from another image: luma times alpha, optionally inverted.
fn image_mask(
    ctx: &FilterContext<'_>,
    source: &str,
    invert: bool,
    width: u32,
    height: u32,
) -> Result<Raster, SkipReason> {
    let loaded = ctx.load_raster(source)?;
    let mut mask = ctx.backend.resize(&loaded, width, height, ResizeFilter::Triangle)?;
    mask.map_pixels(|c| {
        let keep = (c.luma() as f64 * c.a as f64 / 255.0).round() as u8;
        let keep = if invert { 255 - keep } else { keep };
        Color::rgb(keep, keep, keep)
    });
    Ok(mask)
}

fn mask(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let kind = args.text(0, "mask shape")?.to_ascii_lowercase();
    require_pixels(image)?;
    let (w, h) = image.dimensions();
    let keep = if kind == "image" {
        let source = args.text(1, "mask image")?;
        let invert = args.bool_or(2, false)?;
        image_mask(ctx, source, invert, w, h)?
    } else {
        let shape = parse_shape(&kind, &args)?;
        render_shape(ctx.backend, &shape, w, h)?
    };
    apply_keep_mask(image, &keep, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RustBackend;
    use crate::test_helpers::{MemoryLoader, apply_filter as apply, png_bytes};

    #[test]
    fn polygon_first_vertex_points_up() {
        let points = polygon_points(10.0, 10.0, 5.0, 4, 0.0);
        assert_eq!(points.len(), 4);
        assert!((points[0].0 - 10.0).abs() < 1e-9);
        assert!((points[0].1 - 5.0).abs() < 1e-9);
    }

    #[test]
    fn star_alternates_radii() {
        let points = star_points(0.0, 0.0, 10.0, 4.0, 5, 0.0);
        assert_eq!(points.len(), 10);
        let r = |p: (f64, f64)| (p.0 * p.0 + p.1 * p.1).sqrt();
        assert!((r(points[0]) - 10.0).abs() < 1e-9);
        assert!((r(points[1]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn circle_mask_clears_corners() {
        let mut img = Raster::filled(20, 20, Color::rgb(200, 0, 0));
        apply(mask, &mut img, &["circle"]).unwrap();
        assert_eq!(img.get(0, 0).a, 0);
        assert_eq!(img.get(10, 10), Color::rgb(200, 0, 0));
    }

    #[test]
    fn full_rectangle_is_identity() {
        let mut img = Raster::filled(6, 4, Color::rgb(1, 2, 3));
        apply(mask, &mut img, &["rectangle"]).unwrap();
        assert!(img.pixels().all(|c| c == Color::rgb(1, 2, 3)));
    }

    #[test]
    fn half_square_keeps_centre_only() {
        let mut img = Raster::filled(20, 20, Color::WHITE);
        apply(mask, &mut img, &["square", "50"]).unwrap();
        assert_eq!(img.get(10, 10).a, 255);
        assert_eq!(img.get(2, 10).a, 0);
    }

    #[test]
    fn star_and_polygon_render() {
        for args in [&["star", "5", "0.4"][..], &["polygon", "3"][..]] {
            let mut img = Raster::filled(30, 30, Color::WHITE);
            apply(mask, &mut img, args).unwrap();
            assert_eq!(img.get(15, 15).a, 255);
            assert_eq!(img.get(0, 29).a, 0);
        }
    }

    #[test]
    fn unknown_shape_is_skipped() {
        let mut img = Raster::filled(4, 4, Color::WHITE);
        assert!(matches!(
            apply(mask, &mut img, &["blob"]),
            Err(SkipReason::BadArgument { index: 0, .. })
        ));
        assert!(img.pixels().all(|c| c == Color::WHITE));
    }

    #[test]
    fn image_mask_uses_luma_and_invert() {
        let stencil = Raster::from_fn(4, 4, |x, _| if x < 2 { Color::WHITE } else { Color::BLACK });
        let loader = MemoryLoader::new().with("stencil.png", png_bytes(&stencil));
        let backend = RustBackend::new();
        let ctx = FilterContext::new(&backend, &loader);

        let tokens: Vec<String> = vec!["image".into(), "stencil.png".into()];
        let mut img = Raster::filled(4, 4, Color::rgb(9, 9, 9));
        mask(&mut img, Args::new(&tokens), &ctx).unwrap();
        assert_eq!(img.get(0, 0).a, 255);
        assert_eq!(img.get(3, 0).a, 0);

        let tokens: Vec<String> = vec!["image".into(), "stencil.png".into(), "yes".into()];
        let mut img = Raster::filled(4, 4, Color::rgb(9, 9, 9));
        mask(&mut img, Args::new(&tokens), &ctx).unwrap();
        assert_eq!(img.get(0, 0).a, 0);
        assert_eq!(img.get(3, 0).a, 255);
    }

    #[test]
    fn keep_mask_with_outside_color() {
        let mut img = Raster::filled(1, 1, Color::rgb(255, 0, 0));
        let mask = Raster::filled(1, 1, Color::BLACK);
        apply_keep_mask(&mut img, &mask, Some(Color::WHITE));
        assert_eq!(img.get(0, 0), Color::WHITE);
    }
}
