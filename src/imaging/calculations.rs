//! Pure geometry calculations for the dimensional parameters.
//!
//! All functions here are pure and testable without any I/O or images.

/// Horizontal anchor for crops and watermark placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical anchor for crops and watermark placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    Top,
    #[default]
    Center,
    Bottom,
}

impl HAlign {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Self::Left),
            "center" | "centre" | "middle" => Some(Self::Center),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
        }
    }

    /// Offset of an item inside `free` pixels of slack.
    pub fn place(self, free: i64) -> i64 {
        match self {
            Self::Left => 0,
            Self::Center => free / 2,
            Self::Right => free,
        }
    }
}

impl VAlign {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "top" => Some(Self::Top),
            "center" | "centre" | "middle" => Some(Self::Center),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Center => "center",
            Self::Bottom => "bottom",
        }
    }

    pub fn place(self, free: i64) -> i64 {
        match self {
            Self::Top => 0,
            Self::Center => free / 2,
            Self::Bottom => free,
        }
    }
}

/// Where a crop window sits inside the filled image, plus a pixel nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropPlacement {
    pub h: HAlign,
    pub v: VAlign,
    pub offset_x: i32,
    pub offset_y: i32,
}

/// Resolved (absolute pixel) size request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SizeRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub min_width: Option<u32>,
    pub min_height: Option<u32>,
    pub crop: Option<CropPlacement>,
    pub allow_scale_larger: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// What the engine must do to the decoded source before running filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    /// Resample to these dimensions first.
    pub resize: Option<(u32, u32)>,
    /// Then cut this window out of the resized image.
    pub crop: Option<CropRect>,
}

impl Geometry {
    /// Final output dimensions for a source of the given size.
    pub fn output_dimensions(&self, source: (u32, u32)) -> (u32, u32) {
        match (self.crop, self.resize) {
            (Some(c), _) => (c.width, c.height),
            (None, Some(r)) => r,
            (None, None) => source,
        }
    }
}

/// Calculate dimensions needed to fill a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension will match exactly, the other may exceed.
pub fn calculate_fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height will match, width will exceed
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width will match, height will exceed
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

fn bound(value: u32, min: Option<u32>, max: Option<u32>) -> u32 {
    let v = min.map_or(value, |m| value.max(m));
    max.map_or(v, |m| v.min(m)).max(1)
}

/// Plan resize and crop for a source image.
///
/// - `width` + `height` + crop: fill the box, then cut it at the placement.
/// - `width` + `height` without crop: fit inside the box.
/// - one of `width`/`height`: scale proportionally.
/// - `min_*` grow the result, `max_*` cap it (max wins).
/// - Without `allow_scale_larger` the image is never upscaled; an oversized
///   crop box shrinks proportionally to fit the source instead.
pub fn plan_geometry(source: (u32, u32), req: &SizeRequest) -> Geometry {
    let (sw, sh) = source;
    if sw == 0 || sh == 0 {
        return Geometry::default();
    }

    if let (Some(w), Some(h), Some(placement)) = (req.width, req.height, req.crop) {
        return plan_crop(source, w, h, placement, req);
    }

    let (fw, fh) = (sw as f64, sh as f64);
    let mut scale = match (req.width, req.height) {
        (Some(w), Some(h)) => (w as f64 / fw).min(h as f64 / fh),
        (Some(w), None) => w as f64 / fw,
        (None, Some(h)) => h as f64 / fh,
        (None, None) => 1.0,
    };
    if let Some(m) = req.min_width {
        scale = scale.max(m as f64 / fw);
    }
    if let Some(m) = req.min_height {
        scale = scale.max(m as f64 / fh);
    }
    if let Some(m) = req.max_width {
        scale = scale.min(m as f64 / fw);
    }
    if let Some(m) = req.max_height {
        scale = scale.min(m as f64 / fh);
    }
    if !req.allow_scale_larger {
        scale = scale.min(1.0);
    }

    let dims = (
        ((fw * scale).round() as u32).max(1),
        ((fh * scale).round() as u32).max(1),
    );
    Geometry {
        resize: (dims != source).then_some(dims),
        crop: None,
    }
}

/// Largest output, in pixels, a transform may resample to by default: an
/// RGBA8 buffer of 512 MiB, the `image` crate's default allocation limit.
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 512 * 1024 * 1024 / 4;

/// Shrink a plan whose resize target holds more than `max_pixels` pixels,
/// keeping its aspect ratio and crop placement. `None` when the plan fits.
pub fn limit_geometry(geometry: &Geometry, max_pixels: u64) -> Option<Geometry> {
    let (w, h) = geometry.resize?;
    let max_pixels = max_pixels.max(1);
    let area = w as u64 * h as u64;
    if area <= max_pixels {
        return None;
    }

    let factor = (max_pixels as f64 / area as f64).sqrt();
    // Nudge past float error so exact ratios land on whole pixels; the
    // integer clamps below keep the area within bounds.
    let scale = |v: u32| ((v as f64 * factor + 1e-6).floor() as u32).max(1);
    let rw = scale(w);
    // Extreme aspect ratios can still overshoot once the short side hits 1.
    let rh = scale(h).min((max_pixels / rw as u64).max(1) as u32);
    let rw = rw.min((max_pixels / rh as u64).max(1) as u32);

    let crop = geometry.crop.map(|c| {
        let width = scale(c.width).min(rw);
        let height = scale(c.height).min(rh);
        CropRect {
            x: ((c.x as f64 * factor).floor() as u32).min(rw - width),
            y: ((c.y as f64 * factor).floor() as u32).min(rh - height),
            width,
            height,
        }
    });
    Some(Geometry {
        resize: Some((rw, rh)),
        crop,
    })
}

fn plan_crop(
    source: (u32, u32),
    width: u32,
    height: u32,
    placement: CropPlacement,
    req: &SizeRequest,
) -> Geometry {
    let (sw, sh) = source;
    let mut w = bound(width, req.min_width, req.max_width);
    let mut h = bound(height, req.min_height, req.max_height);

    if !req.allow_scale_larger && (w > sw || h > sh) {
        let shrink = (sw as f64 / w as f64).min(sh as f64 / h as f64);
        w = ((w as f64 * shrink).round() as u32).clamp(1, sw);
        h = ((h as f64 * shrink).round() as u32).clamp(1, sh);
    }

    let fill = calculate_fill_dimensions(source, (w, h));
    let free_x = fill.0.saturating_sub(w) as i64;
    let free_y = fill.1.saturating_sub(h) as i64;
    let x = (placement.h.place(free_x) + placement.offset_x as i64).clamp(0, free_x);
    let y = (placement.v.place(free_y) + placement.offset_y as i64).clamp(0, free_y);

    Geometry {
        resize: (fill != source).then_some(fill),
        crop: Some(CropRect {
            x: x as u32,
            y: y as u32,
            width: w,
            height: h,
        }),
    }
}
