//! Typed parameter values and their parsers.
//!
//! Every parser takes the raw request string and returns either a typed
//! [`Value`] or a human-readable reason. `Display` on a value yields its
//! canonical text: two spellings of the same setting (`yes`/`on`,
//! `JPEG`/`jpg`) print identically, which is what keeps cache keys stable.

use crate::filters::{FilterDirective, FilterPipeline, WatermarkMode};
use crate::imaging::{Color, CropPlacement, FlipAxis, HAlign, OutputFormat, Quality, VAlign};
use std::fmt;

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" | "on" | "1" => Some(true),
        "no" | "n" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn parse_u32(raw: &str, what: &str) -> Result<u32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{what} must be a non-negative integer"))
}

fn parse_i32(raw: &str, what: &str) -> Result<i32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{what} must be an integer"))
}

fn parse_percent(raw: &str, what: &str) -> Result<u8, String> {
    let v = parse_u32(raw, what)?;
    if v > 100 {
        return Err(format!("{what} must be between 0 and 100"));
    }
    Ok(v as u8)
}

fn parse_color(raw: &str) -> Result<Color, String> {
    Color::parse_hex(raw).ok_or_else(|| format!("'{raw}' is not a hex color"))
}

/// Trim float noise from canonical output: `90.0` prints as `90`.
fn fmt_degrees(f: &mut fmt::Formatter<'_>, degrees: f64) -> fmt::Result {
    if degrees.fract() == 0.0 {
        write!(f, "{}", degrees as i64)
    } else {
        write!(f, "{degrees}")
    }
}

// ============================================================================
// Dimensions
// ============================================================================

/// A size given either in pixels or as a percentage of the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Pixels(u32),
    Percent(f64),
}

impl Dimension {
    /// Accepts `300`, `300px` and `50%`. Zero is rejected.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Some(p) = raw.strip_suffix('%') {
            let pct: f64 = p
                .trim()
                .parse()
                .map_err(|_| format!("'{raw}' is not a percentage"))?;
            if !pct.is_finite() || pct <= 0.0 {
                return Err("percentage must be positive".into());
            }
            return Ok(Self::Percent(pct));
        }
        let px = parse_u32(raw.strip_suffix("px").unwrap_or(raw), "size")?;
        if px == 0 {
            return Err("size must be positive".into());
        }
        Ok(Self::Pixels(px))
    }

    /// Absolute pixels, with percentages taken of `base`. Never below 1.
    pub fn resolve(self, base: u32) -> u32 {
        match self {
            Self::Pixels(px) => px,
            Self::Percent(pct) => ((base as f64 * pct / 100.0).round() as u32).max(1),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pixels(px) => write!(f, "{px}"),
            Self::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

// ============================================================================
// Crop
// ============================================================================

/// `no` | `yes[|h,v[|x,y]]`.
pub fn parse_crop(raw: &str) -> Result<Option<CropPlacement>, String> {
    let mut parts = raw.split('|').map(str::trim);
    let flag = parts.next().unwrap_or_default();
    match parse_bool(flag) {
        Some(false) => return Ok(None),
        Some(true) => {}
        None => return Err(format!("'{flag}' must be yes or no")),
    }
    let mut placement = CropPlacement::default();
    if let Some(anchor) = parts.next().filter(|s| !s.is_empty()) {
        let (h, v) = anchor
            .split_once(',')
            .ok_or_else(|| format!("crop anchor '{anchor}' must be h,v"))?;
        placement.h = HAlign::from_name(h).ok_or_else(|| format!("'{h}' is not left/center/right"))?;
        placement.v = VAlign::from_name(v).ok_or_else(|| format!("'{v}' is not top/center/bottom"))?;
    }
    if let Some(offset) = parts.next().filter(|s| !s.is_empty()) {
        let (x, y) = offset
            .split_once(',')
            .ok_or_else(|| format!("crop offset '{offset}' must be x,y"))?;
        placement.offset_x = parse_i32(x, "crop offset")?;
        placement.offset_y = parse_i32(y, "crop offset")?;
    }
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected crop segment '{extra}'"));
    }
    Ok(Some(placement))
}

struct CropDisplay<'a>(&'a Option<CropPlacement>);

impl fmt::Display for CropDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("no"),
            Some(p) => write!(
                f,
                "yes|{},{}|{},{}",
                p.h.name(),
                p.v.name(),
                p.offset_x,
                p.offset_y
            ),
        }
    }
}

// ============================================================================
// Output routing and encoding
// ============================================================================

/// What the caller wants back from a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Bytes,
    Url,
    Tag,
}

impl OutputMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bytes" | "raw" => Some(Self::Bytes),
            "url" => Some(Self::Url),
            "tag" | "img" => Some(Self::Tag),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Url => "url",
            Self::Tag => "tag",
        }
    }
}

/// Requested encoding; `Auto` keeps the source's format when it is
/// encodable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveType {
    #[default]
    Auto,
    Format(OutputFormat),
}

impl SaveType {
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        OutputFormat::from_name(raw)
            .map(Self::Format)
            .ok_or_else(|| format!("'{raw}' is not auto/jpg/png/webp/gif/avif"))
    }
}

impl fmt::Display for SaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Format(format) => f.write_str(format.extension()),
        }
    }
}

// ============================================================================
// Compound transformational values
// ============================================================================

/// Corner radii, clockwise from the top left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Corners {
    pub tl: u32,
    pub tr: u32,
    pub br: u32,
    pub bl: u32,
}

impl Corners {
    /// `R` for every corner, or `corner,radius` groups joined by `|` where
    /// corner is `all`, `tl`, `tr`, `br` or `bl`. Later groups win.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if let Ok(r) = raw.parse::<u32>() {
            return Ok(Self { tl: r, tr: r, br: r, bl: r });
        }
        let mut corners = Self::default();
        for group in raw.split('|').map(str::trim).filter(|g| !g.is_empty()) {
            let (corner, radius) = group
                .split_once(',')
                .ok_or_else(|| format!("'{group}' must be corner,radius"))?;
            let r = parse_u32(radius, "corner radius")?;
            match corner.trim().to_ascii_lowercase().as_str() {
                "all" => corners = Self { tl: r, tr: r, br: r, bl: r },
                "tl" => corners.tl = r,
                "tr" => corners.tr = r,
                "br" => corners.br = r,
                "bl" => corners.bl = r,
                other => return Err(format!("'{other}' is not all/tl/tr/br/bl")),
            }
        }
        Ok(corners)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn directive(&self) -> FilterDirective {
        FilterDirective::new(
            "rounded_corners",
            [self.tl, self.tr, self.br, self.bl].map(|r| r.to_string()),
        )
    }
}

impl fmt::Display for Corners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.tl, self.tr, self.br, self.bl)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderSpec {
    pub width: u32,
    pub color: Color,
}

impl BorderSpec {
    /// `width[|color]`, color defaulting to black.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (width, color) = match raw.split_once('|') {
            Some((w, c)) => (w, Some(c.trim()).filter(|c| !c.is_empty())),
            None => (raw, None),
        };
        Ok(Self {
            width: parse_u32(width, "border width")?,
            color: color.map(parse_color).transpose()?.unwrap_or(Color::BLACK),
        })
    }

    pub fn directive(&self) -> FilterDirective {
        FilterDirective::new("border", [self.width.to_string(), self.color.to_hex()])
    }
}

impl fmt::Display for BorderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.width, self.color.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkSpec {
    pub source: String,
    pub h: HAlign,
    pub v: VAlign,
    pub offset_x: i32,
    pub offset_y: i32,
    pub opacity: u8,
    pub mode: WatermarkMode,
    pub gap_x: u32,
    pub gap_y: u32,
    pub repeat_offset_x: i32,
    pub rotate: f64,
}

impl WatermarkSpec {
    /// `src|h,v|x,y|opacity|mode|gap_x,gap_y|repeat_offset_x|rotate`; only
    /// the source is required.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let seg: Vec<&str> = raw.split('|').map(str::trim).collect();
        let get = |i: usize| seg.get(i).copied().filter(|s| !s.is_empty());
        let source = get(0).ok_or("watermark source is required")?.to_string();
        let mut spec = Self {
            source,
            h: HAlign::Right,
            v: VAlign::Bottom,
            offset_x: 0,
            offset_y: 0,
            opacity: 100,
            mode: WatermarkMode::Single,
            gap_x: 0,
            gap_y: 0,
            repeat_offset_x: 0,
            rotate: 0.0,
        };
        if let Some(anchor) = get(1) {
            let (h, v) = anchor.split_once(',').ok_or("watermark anchor must be h,v")?;
            spec.h = HAlign::from_name(h).ok_or_else(|| format!("'{h}' is not left/center/right"))?;
            spec.v = VAlign::from_name(v).ok_or_else(|| format!("'{v}' is not top/center/bottom"))?;
        }
        if let Some(offset) = get(2) {
            let (x, y) = offset.split_once(',').ok_or("watermark offset must be x,y")?;
            spec.offset_x = parse_i32(x, "watermark offset")?;
            spec.offset_y = parse_i32(y, "watermark offset")?;
        }
        if let Some(opacity) = get(3) {
            spec.opacity = parse_percent(opacity, "watermark opacity")?;
        }
        if let Some(mode) = get(4) {
            spec.mode = WatermarkMode::from_name(mode).ok_or_else(|| format!("'{mode}' is not single/repeat"))?;
        }
        if let Some(gap) = get(5) {
            let (x, y) = gap.split_once(',').ok_or("watermark gap must be x,y")?;
            spec.gap_x = parse_u32(x, "watermark gap")?;
            spec.gap_y = parse_u32(y, "watermark gap")?;
        }
        if let Some(offset) = get(6) {
            spec.repeat_offset_x = parse_i32(offset, "repeat offset")?;
        }
        if let Some(rotate) = get(7) {
            spec.rotate = rotate
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite())
                .ok_or_else(|| format!("'{rotate}' is not a number of degrees"))?
                .rem_euclid(360.0);
        }
        Ok(spec)
    }

    pub fn directive(&self) -> FilterDirective {
        FilterDirective::new(
            "watermark",
            [
                self.source.clone(),
                self.h.name().into(),
                self.v.name().into(),
                self.offset_x.to_string(),
                self.offset_y.to_string(),
                self.opacity.to_string(),
                self.mode.name().into(),
                self.gap_x.to_string(),
                self.gap_y.to_string(),
                self.repeat_offset_x.to_string(),
                self.rotate.to_string(),
            ],
        )
    }
}

impl fmt::Display for WatermarkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{},{}|{},{}|{}|{}|{},{}|{}|",
            self.source,
            self.h.name(),
            self.v.name(),
            self.offset_x,
            self.offset_y,
            self.opacity,
            self.mode.name(),
            self.gap_x,
            self.gap_y,
            self.repeat_offset_x
        )?;
        fmt_degrees(f, self.rotate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReflectionSpec {
    pub gap: u32,
    pub start_opacity: u8,
    pub end_opacity: u8,
    pub height: Dimension,
}

impl Default for ReflectionSpec {
    fn default() -> Self {
        Self {
            gap: 0,
            start_opacity: 80,
            end_opacity: 0,
            height: Dimension::Percent(50.0),
        }
    }
}

impl ReflectionSpec {
    /// `gap,start,end,height`, every part optional.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut spec = Self::default();
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        let get = |i: usize| parts.get(i).copied().filter(|s| !s.is_empty());
        if let Some(gap) = get(0) {
            spec.gap = parse_u32(gap, "reflection gap")?;
        }
        if let Some(start) = get(1) {
            spec.start_opacity = parse_percent(start, "start opacity")?;
        }
        if let Some(end) = get(2) {
            spec.end_opacity = parse_percent(end, "end opacity")?;
        }
        if let Some(height) = get(3) {
            spec.height = Dimension::parse(height)?;
        }
        Ok(spec)
    }

    pub fn directive(&self) -> FilterDirective {
        FilterDirective::new(
            "reflection",
            [
                self.gap.to_string(),
                self.start_opacity.to_string(),
                self.end_opacity.to_string(),
                self.height.to_string(),
            ],
        )
    }
}

impl fmt::Display for ReflectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.gap, self.start_opacity, self.end_opacity, self.height
        )
    }
}

// ============================================================================
// Value
// ============================================================================

/// A validated parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Degrees(f64),
    Quality(Quality),
    Dimension(Option<Dimension>),
    Color(Option<Color>),
    Crop(Option<CropPlacement>),
    SaveType(SaveType),
    Output(OutputMode),
    Flip(Option<FlipAxis>),
    Filters(FilterPipeline),
    Corners(Option<Corners>),
    Border(Option<BorderSpec>),
    Watermark(Option<Box<WatermarkSpec>>),
    Reflection(Option<ReflectionSpec>),
}

fn fmt_opt<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &Option<T>) -> fmt::Result {
    match v {
        Some(v) => write!(f, "{v}"),
        None => Ok(()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => f.write_str(if *b { "yes" } else { "no" }),
            Self::Degrees(d) => fmt_degrees(f, *d),
            Self::Quality(q) => write!(f, "{}", q.value()),
            Self::Dimension(d) => fmt_opt(f, d),
            Self::Color(c) => match c {
                Some(c) => f.write_str(&c.to_hex()),
                None => Ok(()),
            },
            Self::Crop(c) => write!(f, "{}", CropDisplay(c)),
            Self::SaveType(s) => write!(f, "{s}"),
            Self::Output(o) => f.write_str(o.name()),
            Self::Flip(axis) => match axis {
                Some(axis) => f.write_str(axis.name()),
                None => Ok(()),
            },
            Self::Filters(p) => write!(f, "{p}"),
            Self::Corners(c) => fmt_opt(f, c),
            Self::Border(b) => fmt_opt(f, b),
            Self::Watermark(w) => fmt_opt(f, w),
            Self::Reflection(r) => fmt_opt(f, r),
        }
    }
}

// ============================================================================
// Validators
// ============================================================================

pub(super) fn v_text(raw: &str) -> Result<Value, String> {
    Ok(Value::Text(raw.trim().to_string()))
}

pub(super) fn v_duration(raw: &str) -> Result<Value, String> {
    let secs: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number of seconds"))?;
    if secs < -1 {
        return Err("cache duration must be -1, 0 or positive".into());
    }
    Ok(Value::Int(secs))
}

pub(super) fn v_output(raw: &str) -> Result<Value, String> {
    OutputMode::from_name(raw)
        .map(Value::Output)
        .ok_or_else(|| format!("'{raw}' is not bytes/url/tag"))
}

pub(super) fn v_dimension(raw: &str) -> Result<Value, String> {
    Dimension::parse(raw).map(|d| Value::Dimension(Some(d)))
}

pub(super) fn v_crop(raw: &str) -> Result<Value, String> {
    parse_crop(raw).map(Value::Crop)
}

pub(super) fn v_bool(raw: &str) -> Result<Value, String> {
    parse_bool(raw)
        .map(Value::Bool)
        .ok_or_else(|| format!("'{raw}' is not yes/no"))
}

pub(super) fn v_save_type(raw: &str) -> Result<Value, String> {
    SaveType::parse(raw).map(Value::SaveType)
}

pub(super) fn v_quality(raw: &str) -> Result<Value, String> {
    let q = parse_u32(raw, "quality")?;
    if !(1..=100).contains(&q) {
        return Err("quality must be between 1 and 100".into());
    }
    Ok(Value::Quality(Quality::new(q)))
}

pub(super) fn v_color(raw: &str) -> Result<Value, String> {
    parse_color(raw).map(|c| Value::Color(Some(c)))
}

pub(super) fn v_flip(raw: &str) -> Result<Value, String> {
    FlipAxis::from_name(raw)
        .map(|axis| Value::Flip(Some(axis)))
        .ok_or_else(|| format!("'{raw}' is not h/v/both"))
}

pub(super) fn v_rotate(raw: &str) -> Result<Value, String> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite())
        .map(|d| Value::Degrees(d.rem_euclid(360.0)))
        .ok_or_else(|| format!("'{raw}' is not a number of degrees"))
}

pub(super) fn v_filter(raw: &str) -> Result<Value, String> {
    Ok(Value::Filters(FilterPipeline::parse(raw)))
}

pub(super) fn v_corners(raw: &str) -> Result<Value, String> {
    Corners::parse(raw).map(|c| Value::Corners((!c.is_zero()).then_some(c)))
}

pub(super) fn v_border(raw: &str) -> Result<Value, String> {
    BorderSpec::parse(raw).map(|b| Value::Border((b.width > 0).then_some(b)))
}

pub(super) fn v_watermark(raw: &str) -> Result<Value, String> {
    WatermarkSpec::parse(raw).map(|w| Value::Watermark(Some(Box::new(w))))
}

pub(super) fn v_reflection(raw: &str) -> Result<Value, String> {
    if parse_bool(raw) == Some(false) {
        return Ok(Value::Reflection(None));
    }
    if parse_bool(raw) == Some(true) {
        return Ok(Value::Reflection(Some(ReflectionSpec::default())));
    }
    ReflectionSpec::parse(raw).map(|r| Value::Reflection(Some(r)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bools_accept_common_spellings() {
        for yes in ["yes", "TRUE", "on", "1", "y"] {
            assert_eq!(parse_bool(yes), Some(true), "{yes}");
        }
        for no in ["no", "False", "off", "0", "n"] {
            assert_eq!(parse_bool(no), Some(false), "{no}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn dimensions_parse_and_resolve() {
        assert_eq!(Dimension::parse("300").unwrap(), Dimension::Pixels(300));
        assert_eq!(Dimension::parse("300px").unwrap(), Dimension::Pixels(300));
        assert_eq!(Dimension::parse("50%").unwrap(), Dimension::Percent(50.0));
        assert_eq!(Dimension::Percent(50.0).resolve(801), 401);
        assert_eq!(Dimension::Percent(0.01).resolve(10), 1);
        assert!(Dimension::parse("0").is_err());
        assert!(Dimension::parse("-5%").is_err());
        assert!(Dimension::parse("wide").is_err());
    }

    #[test]
    fn crop_forms() {
        assert_eq!(parse_crop("no").unwrap(), None);
        assert_eq!(parse_crop("yes").unwrap(), Some(CropPlacement::default()));
        let p = parse_crop("yes|left,bottom|10,-4").unwrap().unwrap();
        assert_eq!((p.h, p.v, p.offset_x, p.offset_y), (HAlign::Left, VAlign::Bottom, 10, -4));
        assert!(parse_crop("sometimes").is_err());
        assert!(parse_crop("yes|sideways,top").is_err());
        assert!(parse_crop("yes|left,top|1,2|extra").is_err());
    }

    #[test]
    fn crop_canonical_text() {
        let v = Value::Crop(parse_crop("on|LEFT,top").unwrap());
        assert_eq!(v.to_string(), "yes|left,top|0,0");
        assert_eq!(Value::Crop(None).to_string(), "no");
    }

    #[test]
    fn corners_forms() {
        assert_eq!(Corners::parse("8").unwrap(), Corners { tl: 8, tr: 8, br: 8, bl: 8 });
        let c = Corners::parse("all,4|tr,10").unwrap();
        assert_eq!(c, Corners { tl: 4, tr: 10, br: 4, bl: 4 });
        assert!(Corners::parse("middle,3").is_err());
        assert_eq!(c.directive().to_string(), "rounded_corners,4,10,4,4");
    }

    #[test]
    fn border_forms() {
        let b = BorderSpec::parse("3|ff0000").unwrap();
        assert_eq!(b.color, Color::rgb(255, 0, 0));
        assert_eq!(BorderSpec::parse("2").unwrap().color, Color::BLACK);
        assert_eq!(b.directive().to_string(), "border,3,ff0000ff");
        assert!(BorderSpec::parse("x|fff").is_err());
    }

    #[test]
    fn watermark_defaults_and_full_form() {
        let w = WatermarkSpec::parse("logo.png").unwrap();
        assert_eq!((w.h, w.v, w.opacity, w.mode), (HAlign::Right, VAlign::Bottom, 100, WatermarkMode::Single));

        let w = WatermarkSpec::parse("logo.png|left,top|5,6|50|repeat|10,20|7|-90").unwrap();
        assert_eq!(w.offset_y, 6);
        assert_eq!(w.mode, WatermarkMode::Repeat);
        assert_eq!((w.gap_x, w.gap_y, w.repeat_offset_x), (10, 20, 7));
        assert_eq!(w.rotate, 270.0);
        assert_eq!(w.to_string(), "logo.png|left,top|5,6|50|repeat|10,20|7|270");
        assert!(WatermarkSpec::parse("").is_err());
        assert!(WatermarkSpec::parse("a.png|||150").is_err());
    }

    #[test]
    fn reflection_forms() {
        assert_eq!(ReflectionSpec::parse("").unwrap(), ReflectionSpec::default());
        let r = ReflectionSpec::parse("4,100,10,30%").unwrap();
        assert_eq!(r.to_string(), "4,100,10,30%");
        assert!(matches!(v_reflection("yes").unwrap(), Value::Reflection(Some(_))));
        assert!(matches!(v_reflection("no").unwrap(), Value::Reflection(None)));
    }

    #[test]
    fn save_type_spellings_share_canonical_text() {
        assert_eq!(SaveType::parse("JPEG").unwrap().to_string(), "jpg");
        assert_eq!(SaveType::parse("jpg").unwrap().to_string(), "jpg");
        assert_eq!(SaveType::parse("auto").unwrap(), SaveType::Auto);
        assert!(SaveType::parse("bmp").is_err());
    }

    #[test]
    fn rotate_normalizes() {
        assert_eq!(v_rotate("-90").unwrap(), Value::Degrees(270.0));
        assert_eq!(v_rotate("720").unwrap().to_string(), "0");
        assert!(v_rotate("inf").is_err());
    }

    #[test]
    fn quality_range() {
        assert_eq!(v_quality("85").unwrap(), Value::Quality(Quality::new(85)));
        assert!(v_quality("0").is_err());
        assert!(v_quality("101").is_err());
    }

    #[test]
    fn duration_accepts_sentinels() {
        assert_eq!(v_duration("-1").unwrap(), Value::Int(-1));
        assert_eq!(v_duration("0").unwrap(), Value::Int(0));
        assert!(v_duration("-2").is_err());
    }
}
