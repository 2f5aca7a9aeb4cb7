//! Shared test utilities.
//!
//! Synthetic rasters, PNG encoding for fixtures, an in-memory source loader
//! and a one-call filter runner.
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let mut image = gradient_raster(8, 8);
//! apply_filter(color::sepia, &mut image, &[]).unwrap();
//!
//! let loader = MemoryLoader::new().with("mark.png", png_bytes(&image));
//! ```

use crate::filters::{Args, FilterContext, FilterFn, SkipReason};
use crate::imaging::{Color, OutputFormat, Quality, Raster, RasterBackend, RustBackend};
use crate::source::{SourceLoadError, SourceLoader};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// =========================================================================
// Rasters
// =========================================================================

/// Red ramps left to right, green top to bottom, blue fixed at 128. Every
/// pixel of images up to 256 wide/high differs from its neighbours.
pub fn gradient_raster(width: u32, height: u32) -> Raster {
    let ramp = |v: u32, len: u32| {
        if len <= 1 { 0 } else { (v * 255 / (len - 1)) as u8 }
    };
    Raster::from_fn(width, height, |x, y| {
        Color::rgb(ramp(x, width), ramp(y, height), 128)
    })
}

pub fn png_bytes(raster: &Raster) -> Vec<u8> {
    RustBackend::new()
        .encode(raster, OutputFormat::Png, Quality::default())
        .unwrap()
}

// =========================================================================
// Sources
// =========================================================================

/// Source loader over a fixed name → bytes map. Clones share one load
/// counter.
#[derive(Debug, Default, Clone)]
pub struct MemoryLoader {
    files: HashMap<String, Vec<u8>>,
    loads: Arc<AtomicUsize>,
    delay: Duration,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), bytes);
        self
    }

    /// Sleep this long inside every `load`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SourceLoader for MemoryLoader {
    fn load(&self, source: &str) -> Result<Vec<u8>, SourceLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.files
            .get(source)
            .cloned()
            .ok_or_else(|| SourceLoadError::NotFound(source.to_string()))
    }
}

// =========================================================================
// Filters
// =========================================================================

/// Run one filter function with string arguments on the pure-Rust backend.
pub fn apply_filter(filter: FilterFn, image: &mut Raster, args: &[&str]) -> Result<(), SkipReason> {
    let tokens: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let backend = RustBackend::new();
    let loader = MemoryLoader::new();
    filter(image, Args::new(&tokens), &FilterContext::new(&backend, &loader))
}
