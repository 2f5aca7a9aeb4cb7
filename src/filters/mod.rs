//! Named image filters and the pipeline executor.
//!
//! A [`FilterRegistry`] maps directive names to implementations. Running a
//! [`FilterPipeline`] applies each directive in order to one owned
//! [`Raster`]; a directive that cannot run (unknown name, bad arguments,
//! missing input, unsupported backend capability) is skipped with a
//! [`FilterSkipped`] outcome and the image passes through unchanged to the
//! next step. A pipeline never fails as a whole.
//!
//! Implementations parse all of their arguments before mutating the image,
//! so a skipped step leaves no partial edits behind.

mod args;
mod border;
mod color;
mod convolve;
mod corners;
mod geometry;
mod halftone;
mod mask;
mod noise;
mod pipeline;
mod reflection;
mod sharpen;
mod watermark;

pub use args::Args;
pub use mask::{apply_keep_mask, polygon_points, star_points};
pub use pipeline::{FilterDirective, FilterPipeline};
pub use watermark::{WatermarkMode, repeat_counts, tile_origin};

use crate::imaging::{BackendError, Raster, RasterBackend};
use crate::source::SourceLoader;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Why a single directive did not run.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("unknown filter")]
    UnknownFilter,
    #[error("argument {index} ('{value}'): {problem}")]
    BadArgument {
        index: usize,
        value: String,
        problem: String,
    },
    #[error("missing argument {index} ({what})")]
    MissingArgument { index: usize, what: &'static str },
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("empty geometry: {0}")]
    EmptyGeometry(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// A directive that was skipped, with its position in the pipeline.
#[derive(Debug)]
pub struct FilterSkipped {
    pub filter: String,
    pub step: usize,
    pub reason: SkipReason,
}

impl fmt::Display for FilterSkipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "filter '{}' (step {}) skipped: {}",
            self.filter,
            self.step + 1,
            self.reason
        )
    }
}

impl std::error::Error for FilterSkipped {}

#[derive(Debug)]
pub enum StepOutcome {
    Applied(String),
    Skipped(FilterSkipped),
}

/// Result of running a pipeline: the final image and one outcome per
/// directive, in order.
#[derive(Debug)]
pub struct PipelineRun {
    pub image: Raster,
    pub steps: Vec<StepOutcome>,
}

impl PipelineRun {
    pub fn skipped(&self) -> impl Iterator<Item = &FilterSkipped> {
        self.steps.iter().filter_map(|s| match s {
            StepOutcome::Skipped(skip) => Some(skip),
            StepOutcome::Applied(_) => None,
        })
    }

    pub fn applied(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().filter_map(|s| match s {
            StepOutcome::Applied(name) => Some(name.as_str()),
            StepOutcome::Skipped(_) => None,
        })
    }

    pub fn into_parts(self) -> (Raster, Vec<FilterSkipped>) {
        let skipped = self
            .steps
            .into_iter()
            .filter_map(|s| match s {
                StepOutcome::Skipped(skip) => Some(skip),
                StepOutcome::Applied(_) => None,
            })
            .collect();
        (self.image, skipped)
    }
}

/// What a filter may reach besides its own image: the raster backend and a
/// loader for auxiliary inputs (mask images, watermarks).
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub backend: &'a dyn RasterBackend,
    pub loader: &'a dyn SourceLoader,
}

impl<'a> FilterContext<'a> {
    pub fn new(backend: &'a dyn RasterBackend, loader: &'a dyn SourceLoader) -> Self {
        Self { backend, loader }
    }

    /// Load and decode an auxiliary image.
    pub fn load_raster(&self, source: &str) -> Result<Raster, SkipReason> {
        let bytes = self
            .loader
            .load(source)
            .map_err(|e| SkipReason::MissingInput(format!("{source}: {e}")))?;
        let decoded = self
            .backend
            .decode(&bytes)
            .map_err(|e| SkipReason::MissingInput(format!("{source}: {e}")))?;
        if decoded.raster.is_empty() {
            return Err(SkipReason::EmptyGeometry(format!("{source} has no pixels")));
        }
        Ok(decoded.raster)
    }
}

pub type FilterFn = fn(&mut Raster, Args<'_>, &FilterContext<'_>) -> Result<(), SkipReason>;

#[derive(Clone, Copy)]
pub struct FilterSpec {
    pub name: &'static str,
    /// Argument synopsis shown by `imgforge filters`.
    pub usage: &'static str,
    pub run: FilterFn,
}

impl fmt::Debug for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    filters: BTreeMap<&'static str, FilterSpec>,
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in filter.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        color::register(&mut registry);
        convolve::register(&mut registry);
        noise::register(&mut registry);
        halftone::register(&mut registry);
        sharpen::register(&mut registry);
        mask::register(&mut registry);
        corners::register(&mut registry);
        border::register(&mut registry);
        watermark::register(&mut registry);
        reflection::register(&mut registry);
        geometry::register(&mut registry);
        registry
    }

    /// Add or replace a filter.
    pub fn register(&mut self, name: &'static str, usage: &'static str, run: FilterFn) {
        self.filters.insert(name, FilterSpec { name, usage, run });
    }

    pub fn get(&self, name: &str) -> Option<&FilterSpec> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// All filters in name order.
    pub fn specs(&self) -> impl Iterator<Item = &FilterSpec> {
        self.filters.values()
    }

    /// Run `pipeline` over `image`, skipping directives that cannot run.
    pub fn apply(
        &self,
        mut image: Raster,
        pipeline: &FilterPipeline,
        ctx: &FilterContext<'_>,
    ) -> PipelineRun {
        let mut steps = Vec::with_capacity(pipeline.len());
        for (step, directive) in pipeline.iter().enumerate() {
            let result = match self.get(&directive.name) {
                Some(spec) => (spec.run)(&mut image, Args::new(&directive.args), ctx),
                None => Err(SkipReason::UnknownFilter),
            };
            match result {
                Ok(()) => {
                    debug!("Applied {directive}");
                    steps.push(StepOutcome::Applied(directive.name.clone()));
                }
                Err(reason) => {
                    let skip = FilterSkipped {
                        filter: directive.name.clone(),
                        step,
                        reason,
                    };
                    warn!("{skip}");
                    steps.push(StepOutcome::Skipped(skip));
                }
            }
        }
        PipelineRun { image, steps }
    }
}

/// Guard shared by filters that cannot work on a zero-area image.
pub(crate) fn require_pixels(image: &Raster) -> Result<(), SkipReason> {
    if image.is_empty() {
        return Err(SkipReason::EmptyGeometry(format!(
            "{}x{} image",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}
