//! Resolving source references to raw image bytes.
//!
//! A source reference is one of:
//!
//! - a local path, absolute or relative to the configured source root;
//! - a managed asset id, `asset:<path>`, relative to the asset root;
//! - an `http://` or `https://` URL (or `file://` for an explicit path).
//!
//! [`DefaultLoader`] dispatches on that shape. Anything implementing
//! [`SourceLoader`] can stand in for it, which is how the engine and the
//! filters (mask and watermark images) stay independent of where bytes live.

use log::debug;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceLoadError {
    #[error("source not found: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP error fetching {url}: {message}")]
    Http { url: String, message: String },
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("unsupported source reference: {0}")]
    Unsupported(String),
}

pub trait SourceLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<Vec<u8>, SourceLoadError>;
}

/// Lowercased URL scheme, if the reference has one. Single letters are
/// treated as Windows drive letters, not schemes.
pub fn scheme(source: &str) -> Option<String> {
    let (scheme, _) = source.split_once("://").or_else(|| source.split_once(':'))?;
    let valid = scheme.len() > 1
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

// ============================================================================
// Local files
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
    assets: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            assets: root.clone(),
            root,
        }
    }

    pub fn with_assets(mut self, assets: impl Into<PathBuf>) -> Self {
        self.assets = assets.into();
        self
    }

    /// Map a reference to a path on disk. Relative references may not climb
    /// out of their root.
    pub fn resolve(&self, source: &str) -> Result<PathBuf, SourceLoadError> {
        let (base, rest) = if let Some(rest) = source.strip_prefix("asset:") {
            (&self.assets, rest.trim_start_matches('/'))
        } else if let Some(rest) = source.strip_prefix("file://") {
            return Ok(PathBuf::from(rest));
        } else {
            (&self.root, source)
        };

        let path = Path::new(rest);
        if path.is_absolute() && base == &self.root {
            return Ok(path.to_path_buf());
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(SourceLoadError::Unsupported(source.to_string()));
        }
        Ok(base.join(path))
    }
}

impl SourceLoader for FileLoader {
    fn load(&self, source: &str) -> Result<Vec<u8>, SourceLoadError> {
        let path = self.resolve(source)?;
        debug!("Reading source {}", path.display());
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceLoadError::NotFound(source.to_string()),
            _ => SourceLoadError::Io { path, source: e },
        })
    }
}

// ============================================================================
// HTTP
// ============================================================================

pub struct HttpLoader {
    client: reqwest::blocking::Client,
}

impl HttpLoader {
    pub fn new(timeout: Duration) -> Result<Self, SourceLoadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("imgforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceLoadError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn http_error(url: &str, e: reqwest::Error) -> SourceLoadError {
    if e.is_timeout() {
        SourceLoadError::Timeout(url.to_string())
    } else {
        SourceLoadError::Http {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

impl SourceLoader for HttpLoader {
    fn load(&self, url: &str) -> Result<Vec<u8>, SourceLoadError> {
        debug!("Fetching source {url}");
        let response = self.client.get(url).send().map_err(|e| http_error(url, e))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceLoadError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(SourceLoadError::Http {
                url: url.to_string(),
                message: format!("status {status}"),
            });
        }
        let body = response.bytes().map_err(|e| http_error(url, e))?;
        Ok(body.to_vec())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Files and assets through [`FileLoader`], URLs through [`HttpLoader`].
pub struct DefaultLoader {
    files: FileLoader,
    http: Option<HttpLoader>,
}

impl DefaultLoader {
    pub fn new(files: FileLoader, http: Option<HttpLoader>) -> Self {
        Self { files, http }
    }
}

impl SourceLoader for DefaultLoader {
    fn load(&self, source: &str) -> Result<Vec<u8>, SourceLoadError> {
        match scheme(source).as_deref() {
            None | Some("asset") | Some("file") => self.files.load(source),
            Some("http") | Some("https") => match &self.http {
                Some(http) => http.load(source),
                None => Err(SourceLoadError::Unsupported(source.to_string())),
            },
            Some(_) => Err(SourceLoadError::Unsupported(source.to_string())),
        }
    }
}
