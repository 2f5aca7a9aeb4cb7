//! Parameter registry and normalization.
//!
//! Every accepted option is declared once in a [`ParamRegistry`] with a
//! [`ParamKind`], a default and a validator. [`ParamRegistry::normalize`]
//! turns a raw `name → string` map into a [`ParameterSet`] in which every
//! registered parameter has a typed value:
//!
//! - unknown names are ignored or rejected per [`UnknownPolicy`];
//! - invalid values fall back to the default and leave a diagnostic;
//! - for the critical `crop` parameter an invalid value disables the
//!   operation rather than restoring a default.
//!
//! The three kinds decide what a parameter touches:
//!
//! | Kind | Affects | Part of the cache key |
//! |---|---|---|
//! | Control | routing, caching, markup | no |
//! | Dimensional | output size | yes |
//! | Transformational | pixel content | yes |

mod values;

pub use values::{
    BorderSpec, Corners, Dimension, OutputMode, ReflectionSpec, SaveType, Value, WatermarkSpec,
    parse_bool, parse_crop,
};

use crate::filters::{FilterDirective, FilterPipeline};
use crate::imaging::{Color, CropPlacement, FlipAxis, Quality, SizeRequest};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use values::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamKind {
    Control,
    Dimensional,
    Transformational,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Dimensional => "dimensional",
            Self::Transformational => "transformational",
        }
    }
}

/// What to do with request keys the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    #[default]
    Ignore,
    Reject,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("invalid value '{value}' for '{name}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

pub type Validator = fn(&str) -> Result<Value, String>;

/// Raw request parameters, as received from the caller.
pub type RawParams = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct ParamEntry {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: Value,
    pub validator: Validator,
    /// An invalid value disables the operation instead of restoring the
    /// default.
    pub critical: bool,
    pub summary: &'static str,
}

impl ParamEntry {
    fn new(
        name: &'static str,
        kind: ParamKind,
        default: Value,
        validator: Validator,
        summary: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            default,
            validator,
            critical: false,
            summary,
        }
    }

    fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Value that stands in when a critical parameter fails validation.
    fn disabled(&self) -> Value {
        match self.default {
            Value::Crop(_) => Value::Crop(None),
            _ => self.default.clone(),
        }
    }
}

/// The fixed parameter table. Built once at startup, then shared read-only.
#[derive(Debug, Clone)]
pub struct ParamRegistry {
    entries: Vec<ParamEntry>,
    unknown: UnknownPolicy,
}

impl ParamRegistry {
    pub fn standard() -> Self {
        use ParamKind::*;
        let dim = |name, summary| ParamEntry::new(name, Dimensional, Value::Dimension(None), v_dimension, summary);
        let entries = vec![
            // control
            ParamEntry::new("connection", Control, Value::Text(String::new()), v_text, "named storage connection (empty = default)"),
            ParamEntry::new("cache_duration", Control, Value::Int(-1), v_duration, "seconds to keep the result; -1 forever, 0 do not cache"),
            ParamEntry::new("output", Control, Value::Output(OutputMode::Bytes), v_output, "bytes | url | tag"),
            ParamEntry::new("alt", Control, Value::Text(String::new()), v_text, "alt attribute for tag output"),
            ParamEntry::new("title", Control, Value::Text(String::new()), v_text, "title attribute for tag output"),
            ParamEntry::new("class", Control, Value::Text(String::new()), v_text, "class attribute for tag output"),
            ParamEntry::new("id", Control, Value::Text(String::new()), v_text, "id attribute for tag output"),
            ParamEntry::new("fallback_src", Control, Value::Text(String::new()), v_text, "source used when the primary source cannot be loaded"),
            // dimensional
            dim("width", "target width, pixels or %"),
            dim("height", "target height, pixels or %"),
            dim("max", "cap for both width and height"),
            dim("max_width", "maximum width"),
            dim("max_height", "maximum height"),
            dim("min", "floor for both width and height"),
            dim("min_width", "minimum width"),
            dim("min_height", "minimum height"),
            ParamEntry::new("crop", Dimensional, Value::Crop(None), v_crop, "no | yes[|h,v[|x,y]]").critical(),
            ParamEntry::new("allow_scale_larger", Dimensional, Value::Bool(false), v_bool, "allow upscaling"),
            // transformational
            ParamEntry::new("save_type", Transformational, Value::SaveType(SaveType::Auto), v_save_type, "auto | jpg | png | webp | gif | avif"),
            ParamEntry::new("quality", Transformational, Value::Quality(Quality::default()), v_quality, "lossy quality 1-100"),
            ParamEntry::new("bg_color", Transformational, Value::Color(None), v_color, "background for flattening and rotation"),
            ParamEntry::new("flip", Transformational, Value::Flip(None), v_flip, "h | v | both"),
            ParamEntry::new("rotate", Transformational, Value::Degrees(0.0), v_rotate, "clockwise degrees"),
            ParamEntry::new("filter", Transformational, Value::Filters(FilterPipeline::new()), v_filter, "filter pipeline, name,args|name,args"),
            ParamEntry::new("rounded_corners", Transformational, Value::Corners(None), v_corners, "R or corner,R groups joined by |"),
            ParamEntry::new("border", Transformational, Value::Border(None), v_border, "width|color"),
            ParamEntry::new("watermark", Transformational, Value::Watermark(None), v_watermark, "src|h,v|x,y|opacity|mode|gap_x,gap_y|repeat_offset_x|rotate"),
            ParamEntry::new("reflection", Transformational, Value::Reflection(None), v_reflection, "gap,start_opacity,end_opacity,height"),
        ];
        Self {
            entries,
            unknown: UnknownPolicy::default(),
        }
    }

    pub fn with_unknown_policy(mut self, policy: UnknownPolicy) -> Self {
        self.unknown = policy;
        self
    }

    /// Override registry defaults from a settings map. Unknown names and
    /// invalid values are errors here: a bad settings file should be fixed,
    /// not silently worked around on every request.
    pub fn with_defaults<'a>(
        mut self,
        settings: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ValidationError> {
        for (name, raw) in settings {
            let key = name.trim().to_ascii_lowercase();
            let entry = self
                .entries
                .iter_mut()
                .find(|e| e.name == key)
                .ok_or_else(|| ValidationError::UnknownParameter(name.to_string()))?;
            entry.default = (entry.validator)(raw).map_err(|reason| ValidationError::InvalidValue {
                name: entry.name.to_string(),
                value: raw.to_string(),
                reason,
            })?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ParamEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    /// Validate `raw` against the registry.
    ///
    /// Only an unknown parameter under [`UnknownPolicy::Reject`] is an error;
    /// everything else degrades to defaults with diagnostics on the result.
    pub fn normalize(&self, raw: &RawParams) -> Result<ParameterSet, ValidationError> {
        let mut diagnostics = Vec::new();
        let mut provided: BTreeMap<&'static str, &str> = BTreeMap::new();

        for (name, value) in raw {
            let key = name.trim().to_ascii_lowercase();
            match self.get(&key) {
                Some(entry) => {
                    provided.insert(entry.name, value.as_str());
                }
                None => {
                    let err = ValidationError::UnknownParameter(name.clone());
                    match self.unknown {
                        UnknownPolicy::Reject => return Err(err),
                        UnknownPolicy::Ignore => {
                            warn!("Ignoring {err}");
                            diagnostics.push(err);
                        }
                    }
                }
            }
        }

        let mut values = BTreeMap::new();
        for entry in &self.entries {
            let value = match provided.get(entry.name).map(|v| v.trim()) {
                None | Some("") => entry.default.clone(),
                Some(raw) => match (entry.validator)(raw) {
                    Ok(value) => value,
                    Err(reason) => {
                        let err = ValidationError::InvalidValue {
                            name: entry.name.to_string(),
                            value: raw.to_string(),
                            reason,
                        };
                        if entry.critical {
                            warn!("{err}; {} skipped", entry.name);
                        } else {
                            warn!("{err}; using default");
                        }
                        diagnostics.push(err);
                        if entry.critical { entry.disabled() } else { entry.default.clone() }
                    }
                },
            };
            values.insert(entry.name, (entry.kind, value));
        }

        Ok(ParameterSet {
            values,
            diagnostics,
        })
    }
}

impl Default for ParamRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// A normalized request: one typed value per registered parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    values: BTreeMap<&'static str, (ParamKind, Value)>,
    diagnostics: Vec<ValidationError>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).map(|(_, v)| v)
    }

    pub fn kind(&self, name: &str) -> Option<ParamKind> {
        self.values.get(name).map(|(k, _)| *k)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.keys().copied()
    }

    pub fn diagnostics(&self) -> &[ValidationError] {
        &self.diagnostics
    }

    /// Replace one value, keeping its kind. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.values.get_mut(name) {
            slot.1 = value;
        }
    }

    /// Canonical `name=value` lines for every parameter of `kind`, in name
    /// order. Equal settings always produce equal text.
    pub fn canonical(&self, kind: ParamKind) -> String {
        self.values
            .iter()
            .filter(|(_, (k, _))| *k == kind)
            .map(|(name, (_, value))| format!("{name}={value}\n"))
            .collect()
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    fn dimension(&self, name: &str) -> Option<Dimension> {
        match self.get(name) {
            Some(Value::Dimension(d)) => *d,
            _ => None,
        }
    }

    pub fn connection(&self) -> Option<&str> {
        self.text("connection")
    }

    pub fn cache_duration(&self) -> i64 {
        match self.get("cache_duration") {
            Some(Value::Int(secs)) => *secs,
            _ => -1,
        }
    }

    pub fn output(&self) -> OutputMode {
        match self.get("output") {
            Some(Value::Output(mode)) => *mode,
            _ => OutputMode::default(),
        }
    }

    pub fn alt(&self) -> Option<&str> {
        self.text("alt")
    }

    pub fn title(&self) -> Option<&str> {
        self.text("title")
    }

    pub fn class(&self) -> Option<&str> {
        self.text("class")
    }

    pub fn id(&self) -> Option<&str> {
        self.text("id")
    }

    pub fn fallback_src(&self) -> Option<&str> {
        self.text("fallback_src")
    }

    pub fn crop(&self) -> Option<CropPlacement> {
        match self.get("crop") {
            Some(Value::Crop(c)) => *c,
            _ => None,
        }
    }

    pub fn allow_scale_larger(&self) -> bool {
        matches!(self.get("allow_scale_larger"), Some(Value::Bool(true)))
    }

    pub fn save_type(&self) -> SaveType {
        match self.get("save_type") {
            Some(Value::SaveType(s)) => *s,
            _ => SaveType::Auto,
        }
    }

    pub fn quality(&self) -> Quality {
        match self.get("quality") {
            Some(Value::Quality(q)) => *q,
            _ => Quality::default(),
        }
    }

    pub fn bg_color(&self) -> Option<Color> {
        match self.get("bg_color") {
            Some(Value::Color(c)) => *c,
            _ => None,
        }
    }

    pub fn flip(&self) -> Option<FlipAxis> {
        match self.get("flip") {
            Some(Value::Flip(axis)) => *axis,
            _ => None,
        }
    }

    pub fn rotate(&self) -> f64 {
        match self.get("rotate") {
            Some(Value::Degrees(d)) => *d,
            _ => 0.0,
        }
    }

    /// Resolve dimensional parameters against the source size.
    /// `max`/`min` apply to an axis only when the axis-specific form is
    /// absent.
    pub fn size_request(&self, source: (u32, u32)) -> SizeRequest {
        let (sw, sh) = source;
        let axis = |specific: &str, shared: &str, base: u32| {
            self.dimension(specific)
                .or_else(|| self.dimension(shared))
                .map(|d| d.resolve(base))
        };
        SizeRequest {
            width: self.dimension("width").map(|d| d.resolve(sw)),
            height: self.dimension("height").map(|d| d.resolve(sh)),
            max_width: axis("max_width", "max", sw),
            max_height: axis("max_height", "max", sh),
            min_width: axis("min_width", "min", sw),
            min_height: axis("min_height", "min", sh),
            crop: self.crop(),
            allow_scale_larger: self.allow_scale_larger(),
        }
    }

    /// Compile the transformational parameters into one pipeline:
    /// flip, rotate, the explicit `filter` directives, rounded corners,
    /// border, watermark, reflection.
    pub fn pipeline(&self) -> FilterPipeline {
        let mut pipeline = FilterPipeline::new();
        if let Some(axis) = self.flip() {
            pipeline.push(FilterDirective::new("flip", [axis.name()]));
        }
        let degrees = self.rotate();
        if degrees != 0.0 {
            let mut args = vec![Value::Degrees(degrees).to_string()];
            if let Some(bg) = self.bg_color() {
                args.push(bg.to_hex());
            }
            pipeline.push(FilterDirective::new("rotate", args));
        }
        if let Some(Value::Filters(explicit)) = self.get("filter") {
            pipeline.extend(explicit.clone());
        }
        if let Some(Value::Corners(Some(c))) = self.get("rounded_corners") {
            pipeline.push(c.directive());
        }
        if let Some(Value::Border(Some(b))) = self.get("border") {
            pipeline.push(b.directive());
        }
        if let Some(Value::Watermark(Some(w))) = self.get("watermark") {
            pipeline.push(w.directive());
        }
        if let Some(Value::Reflection(Some(r))) = self.get("reflection") {
            pipeline.push(r.directive());
        }
        pipeline
    }
}
