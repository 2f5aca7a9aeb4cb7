//! Engine configuration.
//!
//! Loaded from a TOML file (`imgforge.toml` by default). The file is sparse:
//! it is merged on top of the stock defaults, so it only needs the keys it
//! wants to change. Unknown keys are rejected to catch typos early.
//!
//! ```toml
//! [defaults]                  # registry default overrides
//! quality = 85
//! cache_duration = 3600
//!
//! [parameters]
//! unknown = "ignore"          # or "reject"
//!
//! [sources]
//! root = "."                  # base for relative source paths
//! assets = "assets"           # base for asset:<path> references
//! fetch_timeout_secs = 15
//!
//! [cache]
//! state_dir = ".imgforge"     # metadata indexes
//! default_connection = "local"
//! orphans = "index"           # or "remove"
//! lock_wait_ms = 2000
//! max_source_len = 160
//!
//! [connections.local]
//! kind = "local"
//! path = "cache"
//!
//! [connections.cdn]
//! kind = "s3"
//! endpoint = "https://s3.eu-west-1.amazonaws.com"
//! bucket = "thumbs"
//! token = "..."
//! url_prefix = "https://thumbs.example.com/"
//!
//! [processing]
//! max_processes = 4           # omit for auto = CPU cores
//! ```

use crate::cache::{BackendKind, OrphanPolicy};
use crate::imaging::DEFAULT_MAX_OUTPUT_PIXELS;
use crate::params::{ParamRegistry, UnknownPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "imgforge.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImgforgeConfig {
    /// Registry default overrides, parameter name to scalar value.
    pub defaults: BTreeMap<String, toml::Value>,
    pub parameters: ParametersConfig,
    pub sources: SourcesConfig,
    pub cache: CacheConfig,
    /// Named storage connections.
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub processing: ProcessingConfig,
}

impl Default for ImgforgeConfig {
    fn default() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert("local".to_string(), ConnectionConfig::local("cache"));
        Self {
            defaults: BTreeMap::new(),
            parameters: ParametersConfig::default(),
            sources: SourcesConfig::default(),
            cache: CacheConfig::default(),
            connections,
            processing: ProcessingConfig::default(),
        }
    }
}

impl ImgforgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "sources.fetch_timeout_secs must be positive".into(),
            ));
        }
        if self.processing.max_output_pixels == 0 {
            return Err(ConfigError::Validation(
                "processing.max_output_pixels must be positive".into(),
            ));
        }
        if self.cache.max_source_len < 16 {
            return Err(ConfigError::Validation(
                "cache.max_source_len must be at least 16".into(),
            ));
        }
        if !self.connections.contains_key(&self.cache.default_connection) {
            return Err(ConfigError::Validation(format!(
                "cache.default_connection '{}' is not defined under [connections]",
                self.cache.default_connection
            )));
        }
        self.param_registry()?;
        Ok(())
    }

    /// `[defaults]` as the string settings map the registry consumes.
    pub fn default_settings(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.defaults
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    toml::Value::Boolean(b) => b.to_string(),
                    other => {
                        return Err(ConfigError::Validation(format!(
                            "defaults.{name} must be a scalar, got {}",
                            other.type_str()
                        )));
                    }
                };
                Ok((name.clone(), text))
            })
            .collect()
    }

    /// The parameter registry with `[defaults]` and `[parameters]` applied.
    pub fn param_registry(&self) -> Result<ParamRegistry, ConfigError> {
        let settings = self.default_settings()?;
        ParamRegistry::standard()
            .with_unknown_policy(self.parameters.unknown)
            .with_defaults(settings.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| ConfigError::Validation(format!("[defaults]: {e}")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParametersConfig {
    /// What to do with request parameters the registry does not know.
    pub unknown: UnknownPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub root: PathBuf,
    /// Base for `asset:` references; the source root when absent.
    pub assets: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    /// Fetch `http(s)://` sources.
    pub allow_remote: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            assets: None,
            fetch_timeout_secs: 15,
            allow_remote: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub state_dir: PathBuf,
    pub default_connection: String,
    /// Audit treatment of stored files with no index record.
    pub orphans: OrphanPolicy,
    /// How long a request waits for another build of the same key.
    pub lock_wait_ms: u64,
    pub max_source_len: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".imgforge"),
            default_connection: "local".to_string(),
            orphans: OrphanPolicy::default(),
            lock_wait_ms: 2000,
            max_source_len: crate::cache::DEFAULT_MAX_SOURCE_LEN,
        }
    }
}

/// One `[connections.<name>]` table. Which options matter depends on `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    pub kind: BackendKind,
    /// Root directory (local).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Public base URL for `output = url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// S3 and GCS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Cloud Files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

fn default_store_timeout() -> u64 {
    30
}

impl ConnectionConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: BackendKind::Local,
            path: Some(path.into()),
            url_prefix: None,
            endpoint: None,
            bucket: None,
            container: None,
            token: None,
            timeout_secs: default_store_timeout(),
        }
    }

    /// Why this connection cannot be opened, if it cannot.
    pub fn problem(&self) -> Option<String> {
        let missing = |field: &str| Some(format!("{} connection needs `{field}`", self.kind.name()));
        match self.kind {
            BackendKind::Local if self.path.is_none() => missing("path"),
            BackendKind::S3 | BackendKind::Gcs if self.bucket.is_none() => missing("bucket"),
            BackendKind::CloudFiles if self.endpoint.is_none() => missing("endpoint"),
            BackendKind::CloudFiles if self.container.is_none() => missing("container"),
            _ if self.timeout_secs == 0 => Some("timeout_secs must be positive".into()),
            _ => None,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transform workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Largest output, in pixels, that resize may produce. Bigger requests
    /// are scaled down to fit.
    pub max_output_pixels: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Stock defaults as a TOML table, the base layer for user overrides.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ImgforgeConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value; `Ok(None)` when it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<ImgforgeConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ImgforgeConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, falling back to stock defaults when the
/// file does not exist.
pub fn load_config(path: &Path) -> Result<ImgforgeConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// A fully commented stock config, printed by `imgforge gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# imgforge configuration
# ======================
# All settings are optional. Values shown are the defaults.
# Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Registry defaults
# ---------------------------------------------------------------------------
# Any request parameter may get a new default here, e.g.
#   quality = 85
#   cache_duration = 3600
#   save_type = "webp"
[defaults]

# ---------------------------------------------------------------------------
# Parameter handling
# ---------------------------------------------------------------------------
[parameters]
# "ignore" drops unknown request parameters with a diagnostic,
# "reject" fails the request.
unknown = "ignore"

# ---------------------------------------------------------------------------
# Source loading
# ---------------------------------------------------------------------------
[sources]
# Base directory for relative source paths.
root = "."
# Base directory for asset:<path> references (defaults to root).
# assets = "assets"
# Remote fetch timeout. A timeout fails the request.
fetch_timeout_secs = 15
# Fetch http:// and https:// sources.
allow_remote = true

# ---------------------------------------------------------------------------
# Result cache
# ---------------------------------------------------------------------------
[cache]
# Where per-connection metadata indexes live.
state_dir = ".imgforge"
# Connection used when a request does not name one.
default_connection = "local"
# What audits do with stored files that have no index record:
# "index" adopts them as never-expiring entries, "remove" deletes them.
orphans = "index"
# How long a request waits for a concurrent build of the same result.
lock_wait_ms = 2000
# Longest source path kept verbatim in cache keys.
max_source_len = 160

# ---------------------------------------------------------------------------
# Storage connections
# ---------------------------------------------------------------------------
# kind = "local" | "s3" | "cloudfiles" | "gcs"
[connections.local]
kind = "local"
path = "cache"
timeout_secs = 30
# url_prefix = "https://img.example.com/cache/"

# [connections.cdn]
# kind = "s3"
# endpoint = "https://s3.amazonaws.com"
# bucket = "thumbs"
# token = "..."
# url_prefix = "https://thumbs.example.com/"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transform workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
# Largest output in pixels a resize may produce (512 MiB of RGBA).
# Larger requests are scaled down to fit.
max_output_pixels = 134217728
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;
    use crate::params::RawParams;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        let config = ImgforgeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache.default_connection, "local");
        assert_eq!(config.connections["local"].kind, BackendKind::Local);
        assert_eq!(config.parameters.unknown, UnknownPolicy::Ignore);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r##"
[cache]
lock_wait_ms = 50
"##;
        let config: ImgforgeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.lock_wait_ms, 50);
        assert_eq!(config.cache.state_dir, PathBuf::from(".imgforge"));
        assert_eq!(config.sources.fetch_timeout_secs, 15);
    }

    #[test]
    fn unknown_keys_rejected() {
        let toml = r##"
[cache]
lock_wait = 50
"##;
        assert!(toml::from_str::<ImgforgeConfig>(toml).is_err());
    }

    #[test]
    fn parse_connections() {
        let toml = r##"
[connections.cdn]
kind = "cloudfiles"
endpoint = "https://storage.example.net/v1/acct"
container = "thumbs"
token = "secret"
"##;
        let config = resolve_config(Some(toml::from_str(toml).unwrap())).unwrap();
        let cdn = &config.connections["cdn"];
        assert_eq!(cdn.kind, BackendKind::CloudFiles);
        assert_eq!(cdn.timeout_secs, 30);
        assert!(cdn.problem().is_none());
        // stock connection survives the merge
        assert!(config.connections.contains_key("local"));
    }

    #[test]
    fn connection_problems() {
        let mut s3 = ConnectionConfig::local("x");
        s3.kind = BackendKind::S3;
        assert!(s3.problem().unwrap().contains("bucket"));
        s3.bucket = Some("b".into());
        assert!(s3.problem().is_none());

        let mut local = ConnectionConfig::local("x");
        local.path = None;
        assert!(local.problem().unwrap().contains("path"));
    }

    // =========================================================================
    // [defaults]
    // =========================================================================

    #[test]
    fn defaults_feed_the_registry() {
        let toml = r##"
[defaults]
quality = 70
allow_scale_larger = true
save_type = "webp"
"##;
        let config = resolve_config(Some(toml::from_str(toml).unwrap())).unwrap();
        let set = config
            .param_registry()
            .unwrap()
            .normalize(&RawParams::new())
            .unwrap();
        assert_eq!(set.quality(), Quality::new(70));
        assert!(set.allow_scale_larger());
    }

    #[test]
    fn bad_defaults_fail_validation() {
        for toml in [
            "[defaults]\nquality = 500\n",
            "[defaults]\nsparkle = 1\n",
            "[defaults]\nquality = [1, 2]\n",
        ] {
            let result = resolve_config(Some(toml::from_str(toml).unwrap()));
            assert!(matches!(result, Err(ConfigError::Validation(_))), "{toml}");
        }
    }

    #[test]
    fn undefined_default_connection_fails() {
        let toml = "[cache]\ndefault_connection = \"nowhere\"\n";
        let result = resolve_config(Some(toml::from_str(toml).unwrap()));
        assert!(matches!(result, Err(ConfigError::Validation(msg)) if msg.contains("nowhere")));
    }

    // =========================================================================
    // load_config / merge_toml
    // =========================================================================

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(config.cache.lock_wait_ms, 2000);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "[processing]\nmax_processes = 2\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "this is not [valid").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\nz = 4\n").unwrap();
        let merged = merge_toml(base, overlay);
        let a = merged.get("a").unwrap();
        assert_eq!(a.get("x").unwrap().as_integer(), Some(1));
        assert_eq!(a.get("y").unwrap().as_integer(), Some(3));
        assert_eq!(a.get("z").unwrap().as_integer(), Some(4));
    }

    #[test]
    fn merge_toml_scalar_override() {
        let merged = merge_toml(toml::Value::Integer(1), toml::Value::Integer(2));
        assert_eq!(merged.as_integer(), Some(2));
    }

    #[test]
    fn effective_threads_clamps_to_cores() {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let cfg = |n| ProcessingConfig {
            max_processes: n,
            ..ProcessingConfig::default()
        };
        assert_eq!(effective_threads(&cfg(None)), cores);
        assert_eq!(effective_threads(&cfg(Some(10_000))), cores);
        assert_eq!(effective_threads(&cfg(Some(0))), 1);
    }

    // =========================================================================
    // stock_config_toml
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ImgforgeConfig = toml::from_str(stock_config_toml()).unwrap();
        config.validate().unwrap();
        let defaults = ImgforgeConfig::default();
        assert_eq!(config.cache.lock_wait_ms, defaults.cache.lock_wait_ms);
        assert_eq!(config.cache.max_source_len, defaults.cache.max_source_len);
        assert_eq!(config.connections, defaults.connections);
        assert_eq!(config.sources.fetch_timeout_secs, defaults.sources.fetch_timeout_secs);
        assert_eq!(
            config.processing.max_output_pixels,
            defaults.processing.max_output_pixels
        );
    }

    #[test]
    fn zero_output_pixel_cap_is_rejected() {
        let mut config = ImgforgeConfig::default();
        config.processing.max_output_pixels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[defaults]",
            "[parameters]",
            "[sources]",
            "[cache]",
            "[connections.local]",
            "[processing]",
        ] {
            assert!(content.contains(section), "{section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        for key in ["defaults", "parameters", "sources", "cache", "connections", "processing"] {
            assert!(val.get(key).is_some(), "{key}");
        }
    }
}
