use super::{Args, FilterContext, FilterRegistry, SkipReason, require_pixels};
use crate::imaging::{Color, FlipAxis, Raster};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register(
        "reflection",
        "[gap[,start_opacity[,end_opacity[,height|height%]]]]",
        reflection,
    );
}

/// Reflection height: absolute pixels or a percentage of the image height.
fn reflection_height(token: Option<&str>, image_height: u32) -> Result<u32, SkipReason> {
    let bad = |v: &str| SkipReason::BadArgument {
        index: 3,
        value: v.to_string(),
        problem: "expected pixels or a percentage".into(),
    };
    let px = match token {
        None => (image_height as f64 * 0.5).round() as u32,
        Some(v) => match v.strip_suffix('%') {
            Some(p) => {
                let p: f64 = p.trim().parse().map_err(|_| bad(v))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(bad(v));
                }
                (image_height as f64 * p / 100.0).round() as u32
            }
            None => v.parse().map_err(|_| bad(v))?,
        },
    };
    Ok(px.min(image_height))
}

/// Append a mirrored, fading copy of the bottom of the image below it.
fn reflection(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let gap = args.int_in(0, 0, 0, 10_000)? as u32;
    let start = args.int_in(1, 80, 0, 100)? as f64 / 100.0;
    let end = args.int_in(2, 0, 0, 100)? as f64 / 100.0;
    require_pixels(image)?;
    let (w, h) = image.dimensions();
    let rh = reflection_height(args.raw(3), h)?;
    if rh == 0 {
        return Err(SkipReason::EmptyGeometry("reflection height is zero".into()));
    }

    let mut mirror = ctx.backend.crop(image, 0, h - rh, w, rh)?;
    ctx.backend.flip(&mut mirror, FlipAxis::Vertical);
    let span = (rh.max(2) - 1) as f64;
    for y in 0..rh {
        let fade = start + (end - start) * (y as f64 / span);
        for x in 0..w {
            let c = mirror.get(x, y);
            mirror.put(x, y, c.with_alpha((c.a as f64 * fade).round() as u8));
        }
    }

    let mut canvas = ctx.backend.new_canvas(w, h + gap + rh, Color::TRANSPARENT);
    ctx.backend.paste(&mut canvas, image, 0, 0);
    ctx.backend.paste(&mut canvas, &mirror, 0, (h + gap) as i64);
    *image = canvas;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::apply_filter as apply;

    fn striped() -> Raster {
        // top half red, bottom half blue
        Raster::from_fn(4, 10, |_, y| {
            if y < 5 { Color::rgb(255, 0, 0) } else { Color::rgb(0, 0, 255) }
        })
    }

    #[test]
    fn default_height_is_half() {
        let mut img = striped();
        apply(reflection, &mut img, &[]).unwrap();
        assert_eq!(img.dimensions(), (4, 15));
    }

    #[test]
    fn mirror_fades_from_start_to_end() {
        let mut img = striped();
        apply(reflection, &mut img, &["2", "100", "0", "10"]).unwrap();
        assert_eq!(img.dimensions(), (4, 22));
        // gap rows are transparent
        assert_eq!(img.get(0, 10).a, 0);
        assert_eq!(img.get(0, 11).a, 0);
        // first mirrored row is the last source row at full strength
        assert_eq!(img.get(0, 12), Color::rgb(0, 0, 255));
        // fading towards the first source row, gone by the last one
        let near_end = img.get(0, 20);
        assert_eq!(near_end.r, 255);
        assert!(near_end.a > 0 && near_end.a < 64);
        assert_eq!(img.get(0, 21).a, 0);
    }

    #[test]
    fn percentage_height() {
        let mut img = striped();
        apply(reflection, &mut img, &["0", "80", "0", "30%"]).unwrap();
        assert_eq!(img.dimensions(), (4, 13));
    }

    #[test]
    fn height_is_capped_at_image_height() {
        let mut img = striped();
        apply(reflection, &mut img, &["0", "80", "0", "500"]).unwrap();
        assert_eq!(img.dimensions(), (4, 20));
    }

    #[test]
    fn zero_height_is_skipped() {
        let mut img = striped();
        assert!(matches!(
            apply(reflection, &mut img, &["0", "80", "0", "0"]),
            Err(SkipReason::EmptyGeometry(_))
        ));
        assert_eq!(img.dimensions(), (4, 10));
    }
}
