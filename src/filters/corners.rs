use super::{Args, FilterContext, FilterRegistry, SkipReason, apply_keep_mask, require_pixels};
use crate::imaging::{Color, Raster, ResizeFilter};

pub(super) fn register(registry: &mut FilterRegistry) {
    registry.register(
        "rounded_corners",
        "top_left[,top_right,bottom_right,bottom_left[,color]]",
        rounded_corners,
    );
}

/// Corner radii in clockwise order from the top left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Radii {
    pub tl: f64,
    pub tr: f64,
    pub br: f64,
    pub bl: f64,
}

impl Radii {
    /// Shrink all radii by one factor so that neighbouring corners on any
    /// edge never overlap.
    pub fn fitted(self, width: f64, height: f64) -> Self {
        let ratio = |len: f64, a: f64, b: f64| if a + b > len { len / (a + b) } else { 1.0 };
        let f = ratio(width, self.tl, self.tr)
            .min(ratio(width, self.bl, self.br))
            .min(ratio(height, self.tl, self.bl))
            .min(ratio(height, self.tr, self.br));
        Self {
            tl: self.tl * f,
            tr: self.tr * f,
            br: self.br * f,
            bl: self.bl * f,
        }
    }
}

fn rounded_corners(image: &mut Raster, args: Args<'_>, ctx: &FilterContext<'_>) -> Result<(), SkipReason> {
    let tl = args.int_in(0, 0, 0, 10_000)? as f64;
    let radii = if args.len() > 1 {
        Radii {
            tl,
            tr: args.int_in(1, 0, 0, 10_000)? as f64,
            br: args.int_in(2, 0, 0, 10_000)? as f64,
            bl: args.int_in(3, 0, 0, 10_000)? as f64,
        }
    } else {
        Radii { tl, tr: tl, br: tl, bl: tl }
    };
    let outside = args.color_opt(4)?;
    require_pixels(image)?;

    let (w, h) = image.dimensions();
    // Supersampled keep-mask: white everywhere, each corner square replaced
    // by a tile holding its quarter circle.
    let (mw, mh) = (w * 2, h * 2);
    let r = Radii {
        tl: radii.tl * 2.0,
        tr: radii.tr * 2.0,
        br: radii.br * 2.0,
        bl: radii.bl * 2.0,
    }
    .fitted(mw as f64, mh as f64);

    let mut keep = ctx.backend.new_canvas(mw, mh, Color::WHITE);
    let corners = [
        (r.tl, 0i64, 0i64, (1.0, 1.0)),
        (r.tr, mw as i64, 0, (0.0, 1.0)),
        (r.br, mw as i64, mh as i64, (0.0, 0.0)),
        (r.bl, 0, mh as i64, (1.0, 0.0)),
    ];
    for (radius, ax, ay, (ux, uy)) in corners {
        let side = radius.round() as u32;
        if side == 0 {
            continue;
        }
        let mut tile = ctx.backend.new_canvas(side, side, Color::BLACK);
        let s = side as f64;
        ctx.backend
            .fill_circle(&mut tile, s * ux, s * uy, s, Color::WHITE);
        let x = if ax == 0 { 0 } else { ax - side as i64 };
        let y = if ay == 0 { 0 } else { ay - side as i64 };
        ctx.backend.paste(&mut keep, &tile, x, y);
    }
    let keep = ctx.backend.resize(&keep, w, h, ResizeFilter::Box)?;
    apply_keep_mask(image, &keep, outside);
    Ok(())
}
