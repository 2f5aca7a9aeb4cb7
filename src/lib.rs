//! # imgforge
//!
//! Parameterized image transforms with a cache of finished results.
//!
//! A request is a source reference plus a flat set of `key=value`
//! parameters. The engine normalizes the parameters, derives a deterministic
//! cache key, and either serves the stored result or builds it: load, decode,
//! resize/crop, run the filter pipeline, encode, store.
//!
//! # Architecture
//!
//! ```text
//! params ──► ParameterSet ──► cache key ──► CacheStore (named connections)
//!                  │                              ▲
//!                  ▼                              │
//! source ──► SourceLoader ──► RasterBackend ──► filters ──► encode
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Parameter registry: parsing, validation, canonical forms |
//! | [`imaging`] | RGBA raster, backend trait, pure-Rust `image` backend, resize/crop planning |
//! | [`filters`] | Named filters and the fault-tolerant pipeline executor |
//! | [`source`] | Loading source bytes from files, assets and HTTP |
//! | [`cache`] | Cache keys, the per-connection index, storage backends, the store |
//! | [`engine`] | The transform entry point tying it all together |
//! | [`markup`] | `<img>` tag rendering with Maud |
//! | [`config`] | `imgforge.toml` loading, stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Keys Are Derived, Never Stored Elsewhere
//!
//! A cache key is `<normalized source>@@<digest>@@<ttl marker>`. The digest
//! covers only parameters that change the output bytes, in canonical form, so
//! `width=100&quality=90` and `quality=90&width=100` share one entry and
//! markup-only parameters like `alt` never split the cache. The source prefix
//! makes "forget everything derived from this file" a prefix scan.
//!
//! ## Filters Never Fail a Request
//!
//! A filter that cannot run is skipped and reported. Only loading, decoding
//! and encoding can fail a transform; everything else degrades to a
//! diagnostic on the result.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for codecs and resampling.
//! No system libraries, so the binary is self-contained.

pub mod cache;
pub mod config;
pub mod engine;
pub mod filters;
pub mod imaging;
pub mod markup;
pub mod output;
pub mod params;
pub mod source;

#[cfg(test)]
pub(crate) mod test_helpers;
