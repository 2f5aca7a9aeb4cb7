//! Raster layer: pure Rust, no system libraries.
//!
//! | Concern | Where |
//! |---|---|
//! | **Pixel buffer** | [`Raster`] + [`Color`] |
//! | **Backend seam** | [`RasterBackend`] trait, [`RustBackend`] on the `image` crate |
//! | **Geometry** | pure resize/crop planning in `calculations` |
//! | **Value types** | [`Quality`], [`OutputFormat`], [`ResizeFilter`], [`FlipAxis`] |
//!
//! Filters only ever see `&dyn RasterBackend` and `Raster`, so the bitmap
//! library can be swapped without touching them.

pub mod backend;
pub mod calculations;
mod params;
pub mod raster;
pub mod rust_backend;

pub use backend::{BackendError, Decoded, Dimensions, RasterBackend};
pub use calculations::{
    CropPlacement, CropRect, DEFAULT_MAX_OUTPUT_PIXELS, Geometry, HAlign, SizeRequest, VAlign,
    limit_geometry, plan_geometry,
};
pub use params::{FlipAxis, OutputFormat, Quality, ResizeFilter};
pub use raster::{Color, Raster};
pub use rust_backend::RustBackend;
