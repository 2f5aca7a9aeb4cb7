//! The transform entry point.
//!
//! ```text
//! raw params ──► normalize ──► cache key ──► cache hit? ──yes──► bytes
//!                                                │ no
//!                                                ▼
//!        load source (or fallback_src) ──► decode ──► resize/crop
//!                                                        │
//!        store ◄── encode ◄── flatten for JPEG ◄── filter pipeline
//! ```
//!
//! Only source loading, decoding and encoding can fail a request. Parameter
//! problems, skipped filters and cache failures are absorbed and reported as
//! [`Diagnostic`]s on the output.
//!
//! Concurrent requests for the same key converge through a store lease: the
//! first builds, the rest wait briefly and then read its result from the
//! cache. A waiter that times out builds anyway; results per key are
//! identical, so the last write wins harmlessly.

use crate::cache::{AuditReport, CacheStore, ConnectionInfo, StoreError, key_for, source_prefix};
use crate::config::{ConfigError, ImgforgeConfig};
use crate::filters::{FilterContext, FilterRegistry};
use crate::imaging::{
    BackendError, Color, DEFAULT_MAX_OUTPUT_PIXELS, OutputFormat, Raster, RasterBackend,
    ResizeFilter, RustBackend, limit_geometry, plan_geometry,
};
use crate::markup::ImgTag;
use crate::params::{OutputMode, ParamRegistry, ParameterSet, RawParams, SaveType, ValidationError};
use crate::source::{DefaultLoader, FileLoader, HttpLoader, SourceLoadError, SourceLoader};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to load source: {0}")]
    SourceLoad(#[from] SourceLoadError),
    #[error("failed to decode {source_ref}: {error}")]
    Decode {
        source_ref: String,
        #[source]
        error: BackendError,
    },
    #[error("failed to resize or crop: {0}")]
    Geometry(#[source] BackendError),
    #[error("failed to encode {format}: {error}")]
    Encode {
        format: OutputFormat,
        #[source]
        error: BackendError,
    },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("source loader: {0}")]
    Source(#[from] SourceLoadError),
    #[error("cache store: {0}")]
    Store(#[from] StoreError),
}

/// Something the engine absorbed instead of failing the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Parameter(ValidationError),
    FilterSkipped(String),
    Cache(String),
    /// The primary source failed and `fallback_src` was used instead.
    Fallback { primary: String, error: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(e) => write!(f, "parameter: {e}"),
            Self::FilterSkipped(msg) => f.write_str(msg),
            Self::Cache(msg) => write!(f, "cache: {msg}"),
            Self::Fallback { primary, error } => {
                write!(f, "source '{primary}' failed ({error}); served fallback")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    /// Served from the cache without processing.
    pub cached: bool,
    /// Public URL of the stored result, when the connection has one.
    pub url: Option<String>,
    pub mode: OutputMode,
    /// Rendered `<img>` tag when `mode` is [`OutputMode::Tag`].
    pub markup: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TransformOutput {
    /// `<img>` tag for this result. Uses the public URL, or the cache key
    /// when the connection has no URL.
    pub fn markup(&self, params: &ParameterSet) -> String {
        let src = self.url.as_deref().unwrap_or(&self.key);
        ImgTag::new(src, (self.width, self.height), params)
            .render()
            .into_string()
    }
}

pub struct Engine {
    params: ParamRegistry,
    filters: FilterRegistry,
    backend: Box<dyn RasterBackend>,
    loader: Box<dyn SourceLoader>,
    store: CacheStore,
    max_source_len: usize,
    max_output_pixels: u64,
}

impl Engine {
    pub fn new(
        params: ParamRegistry,
        backend: Box<dyn RasterBackend>,
        loader: Box<dyn SourceLoader>,
        store: CacheStore,
    ) -> Self {
        Self {
            params,
            filters: FilterRegistry::standard(),
            backend,
            loader,
            store,
            max_source_len: crate::cache::DEFAULT_MAX_SOURCE_LEN,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }

    /// Engine with the pure-Rust backend, the default source loader and the
    /// configured cache connections.
    pub fn from_config(config: &ImgforgeConfig) -> Result<Self, EngineError> {
        let params = config.param_registry()?;
        let files = FileLoader::new(&config.sources.root).with_assets(
            config
                .sources
                .assets
                .clone()
                .unwrap_or_else(|| config.sources.root.clone()),
        );
        let http = if config.sources.allow_remote {
            Some(HttpLoader::new(Duration::from_secs(
                config.sources.fetch_timeout_secs,
            ))?)
        } else {
            None
        };
        let store = CacheStore::from_config(config)?;
        Ok(Self::new(
            params,
            Box::new(RustBackend::new()),
            Box::new(DefaultLoader::new(files, http)),
            store,
        )
        .with_max_source_len(config.cache.max_source_len)
        .with_max_output_pixels(config.processing.max_output_pixels))
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_max_source_len(mut self, max_source_len: usize) -> Self {
        self.max_source_len = max_source_len;
        self
    }

    /// Cap on the pixel count geometry may resample to. Larger requests are
    /// scaled down to fit.
    pub fn with_max_output_pixels(mut self, max_output_pixels: u64) -> Self {
        self.max_output_pixels = max_output_pixels.max(1);
        self
    }

    pub fn params(&self) -> &ParamRegistry {
        &self.params
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn normalize(&self, raw: &RawParams) -> Result<ParameterSet, ValidationError> {
        self.params.normalize(raw)
    }

    /// The key a transform of `source_ref` with `raw` would be cached under.
    pub fn cache_key(&self, source_ref: &str, raw: &RawParams) -> Result<String, ValidationError> {
        Ok(key_for(source_ref, &self.normalize(raw)?, self.max_source_len))
    }

    pub fn transform(
        &self,
        source_ref: &str,
        raw: &RawParams,
    ) -> Result<TransformOutput, TransformError> {
        let params = self.normalize(raw)?;
        let mut diagnostics: Vec<Diagnostic> = params
            .diagnostics()
            .iter()
            .cloned()
            .map(Diagnostic::Parameter)
            .collect();
        let key = key_for(source_ref, &params, self.max_source_len);
        let connection = params.connection();
        let ttl = params.cache_duration();

        let mut caching = ttl != 0;
        let mut _lease = None;
        if caching {
            match self.lookup(&key, &params, &diagnostics) {
                Ok(Some(hit)) => return Ok(hit),
                Ok(None) => match self.store.lease(connection, &key) {
                    Ok(lease) => {
                        // Another request may have finished this key while we waited.
                        if lease.is_held() {
                            if let Ok(Some(hit)) = self.lookup(&key, &params, &diagnostics) {
                                return Ok(hit);
                            }
                        }
                        _lease = Some(lease);
                    }
                    Err(e) => {
                        cache_problem(&mut diagnostics, e);
                        caching = false;
                    }
                },
                Err(e) => {
                    cache_problem(&mut diagnostics, e);
                    caching = false;
                }
            }
        }

        let (bytes, used_fallback) = self.load(source_ref, &params, &mut diagnostics)?;
        let decoded = self.backend.decode(&bytes).map_err(|error| TransformError::Decode {
            source_ref: source_ref.to_string(),
            error,
        })?;
        let image = self.apply_geometry(decoded.raster, &params, &mut diagnostics)?;

        let ctx = FilterContext::new(self.backend.as_ref(), self.loader.as_ref());
        let (mut image, skipped) = self.filters.apply(image, &params.pipeline(), &ctx).into_parts();
        diagnostics.extend(skipped.iter().map(|s| Diagnostic::FilterSkipped(s.to_string())));

        let format = match params.save_type() {
            SaveType::Format(format) => format,
            SaveType::Auto => decoded.format.unwrap_or(OutputFormat::Png),
        };
        if !format.supports_alpha() && image.has_transparency() {
            image.flatten(params.bg_color().unwrap_or(Color::WHITE));
        }
        let encoded = self
            .backend
            .encode(&image, format, params.quality())
            .map_err(|error| TransformError::Encode { format, error })?;
        debug!(
            "Built {key}: {}x{} {format}, {} bytes",
            image.width(),
            image.height(),
            encoded.len()
        );

        let mut url = None;
        if caching && !used_fallback {
            match self.store.put(connection, &key, &encoded, ttl, format.mime_type()) {
                Ok(_) => match self.store.url(connection, &key) {
                    Ok(u) => url = u,
                    Err(e) => cache_problem(&mut diagnostics, e),
                },
                Err(e) => cache_problem(&mut diagnostics, e),
            }
        }

        Ok(self.finish(
            TransformOutput {
                bytes: encoded,
                key,
                width: image.width(),
                height: image.height(),
                format,
                cached: false,
                url,
                mode: params.output(),
                markup: None,
                diagnostics,
            },
            &params,
        ))
    }

    /// Transform several requests in parallel on the rayon pool. Results come
    /// back in request order.
    pub fn transform_many(
        &self,
        requests: &[(String, RawParams)],
    ) -> Vec<Result<TransformOutput, TransformError>> {
        requests
            .par_iter()
            .map(|(source_ref, raw)| self.transform(source_ref, raw))
            .collect()
    }

    /// Drop every cached result derived from `source_ref`, on every
    /// connection. References with the same normalized form share results.
    pub fn invalidate(&self, source_ref: &str) -> Result<usize, StoreError> {
        let removed = self
            .store
            .invalidate_prefix(&source_prefix(source_ref, self.max_source_len))?;
        info!("Invalidated {removed} cached results of {source_ref}");
        Ok(removed)
    }

    pub fn list_connections(&self) -> Vec<ConnectionInfo> {
        self.store.list_connections()
    }

    pub fn set_default_connection(&self, name: &str) -> Result<(), StoreError> {
        self.store.set_default_connection(name)
    }

    pub fn audit(&self, connection: Option<&str>) -> Result<AuditReport, StoreError> {
        self.store.audit(connection)
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    /// A usable cache hit, if there is one. Unreadable entries are misses.
    fn lookup(
        &self,
        key: &str,
        params: &ParameterSet,
        diagnostics: &[Diagnostic],
    ) -> Result<Option<TransformOutput>, StoreError> {
        let connection = params.connection();
        let Some(bytes) = self.store.get(connection, key)? else {
            return Ok(None);
        };
        let (Some(format), Ok(dims)) = (OutputFormat::sniff(&bytes), self.backend.identify(&bytes))
        else {
            warn!("Cached entry {key} is unreadable; rebuilding");
            return Ok(None);
        };
        let url = self.store.url(connection, key)?;
        Ok(Some(self.finish(
            TransformOutput {
                bytes,
                key: key.to_string(),
                width: dims.width,
                height: dims.height,
                format,
                cached: true,
                url,
                mode: params.output(),
                markup: None,
                diagnostics: diagnostics.to_vec(),
            },
            params,
        )))
    }

    fn load(
        &self,
        source_ref: &str,
        params: &ParameterSet,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<(Vec<u8>, bool), SourceLoadError> {
        match self.loader.load(source_ref) {
            Ok(bytes) => Ok((bytes, false)),
            Err(primary_error) => {
                let Some(fallback) = params.fallback_src() else {
                    return Err(primary_error);
                };
                warn!("Source {source_ref} failed ({primary_error}); trying {fallback}");
                let bytes = self.loader.load(fallback)?;
                diagnostics.push(Diagnostic::Fallback {
                    primary: source_ref.to_string(),
                    error: primary_error.to_string(),
                });
                Ok((bytes, true))
            }
        }
    }

    fn apply_geometry(
        &self,
        image: Raster,
        params: &ParameterSet,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Raster, TransformError> {
        let source = image.dimensions();
        let mut geometry = plan_geometry(source, &params.size_request(source));
        if let Some(limited) = limit_geometry(&geometry, self.max_output_pixels) {
            let (w, h) = geometry.resize.unwrap_or(source);
            let (lw, lh) = limited.resize.unwrap_or(source);
            warn!("Requested {w}x{h} exceeds {} pixels; resizing to {lw}x{lh}", self.max_output_pixels);
            diagnostics.push(Diagnostic::Parameter(ValidationError::InvalidValue {
                name: "size".into(),
                value: format!("{w}x{h}"),
                reason: format!("exceeds {} pixels, scaled down to {lw}x{lh}", self.max_output_pixels),
            }));
            geometry = limited;
        }
        let mut image = image;
        if let Some((w, h)) = geometry.resize {
            image = self
                .backend
                .resize(&image, w, h, ResizeFilter::Lanczos3)
                .map_err(TransformError::Geometry)?;
        }
        if let Some(c) = geometry.crop {
            image = self
                .backend
                .crop(&image, c.x, c.y, c.width, c.height)
                .map_err(TransformError::Geometry)?;
        }
        Ok(image)
    }

    fn finish(&self, mut output: TransformOutput, params: &ParameterSet) -> TransformOutput {
        if output.mode == OutputMode::Tag {
            output.markup = Some(output.markup(params));
        }
        output
    }
}

fn cache_problem(diagnostics: &mut Vec<Diagnostic>, error: StoreError) {
    warn!("Cache unavailable, serving uncached: {error}");
    diagnostics.push(Diagnostic::Cache(error.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Connection, OrphanPolicy, StoreSettings};
    use crate::config::ConnectionConfig;
    use crate::test_helpers::{MemoryLoader, gradient_raster, png_bytes};
    use tempfile::TempDir;

    fn raw(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn engine(tmp: &TempDir, loader: MemoryLoader) -> Engine {
        engine_waiting(tmp, loader, Duration::from_millis(100))
    }

    fn engine_waiting(tmp: &TempDir, loader: MemoryLoader, lock_wait: Duration) -> Engine {
        let mut local = ConnectionConfig::local(tmp.path().join("cache"));
        local.url_prefix = Some("https://img.test/c".into());
        let store = CacheStore::open(
            vec![Connection::new("local", local)],
            StoreSettings {
                state_dir: tmp.path().join("state"),
                default_connection: "local".into(),
                orphans: OrphanPolicy::Index,
                lock_wait,
            },
        )
        .unwrap();
        Engine::new(
            ParamRegistry::standard(),
            Box::new(RustBackend::new()),
            Box::new(loader),
            store,
        )
    }

    fn fixture() -> (TempDir, Engine) {
        let tmp = TempDir::new().unwrap();
        let loader = MemoryLoader::new()
            .with("photo.png", png_bytes(&gradient_raster(40, 20)))
            .with("fallback.png", png_bytes(&gradient_raster(4, 4)))
            .with("junk.png", b"not an image".to_vec());
        let engine = engine(&tmp, loader);
        (tmp, engine)
    }

    #[test]
    fn resizes_and_caches() {
        let (_tmp, engine) = fixture();
        let params = raw(&[("width", "20")]);

        let first = engine.transform("photo.png", &params).unwrap();
        assert!(!first.cached);
        assert_eq!((first.width, first.height), (20, 10));
        assert_eq!(first.format, OutputFormat::Png);
        assert_eq!(first.url.as_deref(), Some(format!("https://img.test/c/{}", first.key).as_str()));

        let second = engine.transform("photo.png", &params).unwrap();
        assert!(second.cached);
        assert_eq!(second.bytes, first.bytes);
        assert_eq!((second.width, second.height), (20, 10));
    }

    #[test]
    fn zero_ttl_bypasses_cache() {
        let (_tmp, engine) = fixture();
        let params = raw(&[("cache_duration", "0")]);
        engine.transform("photo.png", &params).unwrap();
        assert!(!engine.transform("photo.png", &params).unwrap().cached);
    }

    #[test]
    fn control_params_share_cached_result() {
        let (_tmp, engine) = fixture();
        engine.transform("photo.png", &raw(&[("width", "10")])).unwrap();
        let tagged = engine
            .transform("photo.png", &raw(&[("width", "10"), ("output", "tag"), ("alt", "Gradient")]))
            .unwrap();
        assert!(tagged.cached);
        let markup = tagged.markup.unwrap();
        assert!(markup.starts_with("<img src=\"https://img.test/c/"));
        assert!(markup.contains(r#"width="10" height="5" alt="Gradient""#));
    }

    #[test]
    fn jpeg_output_is_flattened_onto_background() {
        let (_tmp, engine) = fixture();
        let out = engine
            .transform(
                "photo.png",
                &raw(&[("save_type", "jpg"), ("rounded_corners", "8"), ("bg_color", "ff0000")]),
            )
            .unwrap();
        assert_eq!(out.format, OutputFormat::Jpeg);
        let decoded = RustBackend::new().decode(&out.bytes).unwrap().raster;
        let corner = decoded.get(0, 0);
        assert!(corner.r > 200 && corner.g < 60 && corner.b < 60, "{corner:?}");
    }

    #[test]
    fn missing_source_is_fatal() {
        let (_tmp, engine) = fixture();
        assert!(matches!(
            engine.transform("nope.png", &RawParams::new()),
            Err(TransformError::SourceLoad(SourceLoadError::NotFound(_)))
        ));
    }

    #[test]
    fn undecodable_source_is_fatal() {
        let (_tmp, engine) = fixture();
        assert!(matches!(
            engine.transform("junk.png", &RawParams::new()),
            Err(TransformError::Decode { .. })
        ));
    }

    #[test]
    fn fallback_source_is_served_uncached() {
        let (_tmp, engine) = fixture();
        let params = raw(&[("fallback_src", "fallback.png")]);
        let out = engine.transform("nope.png", &params).unwrap();
        assert_eq!((out.width, out.height), (4, 4));
        assert!(matches!(out.diagnostics.as_slice(), [Diagnostic::Fallback { .. }]));
        assert!(!engine.transform("nope.png", &params).unwrap().cached);
    }

    #[test]
    fn absorbed_problems_become_diagnostics() {
        let (_tmp, engine) = fixture();
        let out = engine
            .transform("photo.png", &raw(&[("quality", "loud"), ("filter", "sepia|sparkle")]))
            .unwrap();
        assert_eq!(out.diagnostics.len(), 2);
        assert!(matches!(out.diagnostics[0], Diagnostic::Parameter(_)));
        assert!(out.diagnostics[1].to_string().contains("sparkle"));
    }

    #[test]
    fn unknown_connection_serves_uncached() {
        let (_tmp, engine) = fixture();
        let out = engine
            .transform("photo.png", &raw(&[("connection", "nowhere")]))
            .unwrap();
        assert!(out.url.is_none());
        assert!(matches!(out.diagnostics.as_slice(), [Diagnostic::Cache(_)]));
    }

    #[test]
    fn strict_registry_rejects_unknown_parameters() {
        let tmp = TempDir::new().unwrap();
        let engine = engine(&tmp, MemoryLoader::new());
        let strict = Engine {
            params: ParamRegistry::standard()
                .with_unknown_policy(crate::params::UnknownPolicy::Reject),
            ..engine
        };
        assert!(matches!(
            strict.transform("photo.png", &raw(&[("sparkle", "1")])),
            Err(TransformError::Validation(_))
        ));
    }

    #[test]
    fn invalidate_drops_cached_results() {
        let (_tmp, engine) = fixture();
        engine.transform("photo.png", &raw(&[("width", "10")])).unwrap();
        engine.transform("photo.png", &raw(&[("width", "12")])).unwrap();
        assert_eq!(engine.invalidate("photo.png").unwrap(), 2);
        assert!(!engine.transform("photo.png", &raw(&[("width", "10")])).unwrap().cached);
    }

    #[test]
    fn transform_many_keeps_order() {
        let (_tmp, engine) = fixture();
        let requests = vec![
            ("photo.png".to_string(), raw(&[("width", "10")])),
            ("nope.png".to_string(), RawParams::new()),
            ("photo.png".to_string(), raw(&[("width", "30")])),
        ];
        let results = engine.transform_many(&requests);
        assert_eq!(results[0].as_ref().unwrap().width, 10);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().width, 30);
    }

    #[test]
    fn cache_key_matches_transform_key() {
        let (_tmp, engine) = fixture();
        let params = raw(&[("width", "10"), ("filter", "negate")]);
        let key = engine.cache_key("photo.png", &params).unwrap();
        assert_eq!(engine.transform("photo.png", &params).unwrap().key, key);
    }

    #[test]
    fn concurrent_requests_for_one_key_build_once() {
        let tmp = TempDir::new().unwrap();
        let loader = MemoryLoader::new()
            .with("photo.png", png_bytes(&gradient_raster(40, 20)))
            .with_delay(Duration::from_millis(150));
        let engine = engine_waiting(&tmp, loader.clone(), Duration::from_secs(5));
        let params = raw(&[("width", "10")]);

        let outputs: Vec<TransformOutput> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| engine.transform("photo.png", &params).unwrap()))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(loader.load_count(), 1);
        assert_eq!(outputs.iter().filter(|o| o.cached).count(), 1);
        assert_eq!(outputs[0].bytes, outputs[1].bytes);
    }

    // =========================================================================
    // Limits and custom filters
    // =========================================================================

    #[test]
    fn oversized_request_is_scaled_down() {
        let tmp = TempDir::new().unwrap();
        let loader = MemoryLoader::new().with("a.png", png_bytes(&gradient_raster(4, 4)));
        let engine = engine(&tmp, loader).with_max_output_pixels(10_000);
        let out = engine
            .transform(
                "a.png",
                &raw(&[
                    ("width", "1000000"),
                    ("height", "1000000"),
                    ("allow_scale_larger", "yes"),
                    ("cache_duration", "0"),
                ]),
            )
            .unwrap();

        assert_eq!((out.width, out.height), (100, 100));
        assert!(out.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Parameter(ValidationError::InvalidValue { name, .. }) if name == "size"
        )));
    }

    #[test]
    fn request_within_the_cap_is_untouched() {
        let (_tmp, engine) = fixture();
        let engine = engine.with_max_output_pixels(800);
        let out = engine.transform("photo.png", &raw(&[])).unwrap();
        assert_eq!((out.width, out.height), (40, 20));
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    }

    fn paint_corner_red(
        image: &mut Raster,
        _args: crate::filters::Args<'_>,
        _ctx: &FilterContext<'_>,
    ) -> Result<(), crate::filters::SkipReason> {
        image.put(0, 0, Color::rgb(255, 0, 0));
        Ok(())
    }

    #[test]
    fn custom_filters_join_the_pipeline() {
        let (_tmp, engine) = fixture();
        let mut filters = FilterRegistry::standard();
        filters.register("paint_corner", "", paint_corner_red);
        let engine = engine.with_filters(filters);
        assert!(engine.filters().contains("sepia"));

        let out = engine
            .transform("photo.png", &raw(&[("filter", "paint_corner")]))
            .unwrap();
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let image = RustBackend::new().decode(&out.bytes).unwrap().raster;
        assert_eq!(image.get(0, 0), Color::rgb(255, 0, 0));
    }
}
