//! Storage backends: where cached bytes physically live.
//!
//! Keys are relative, `/`-separated paths made of `[A-Za-z0-9._/@~-]`, so
//! every backend can use them unescaped.

use super::{BackendKind, StoreError};
use crate::config::ConnectionConfig;
use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use walkdir::WalkDir;

/// A stored file as seen by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    /// Unix seconds, when the backend knows it.
    pub modified: Option<u64>,
}

pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `Ok(None)` when the key is not stored.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `bytes` under `key`. Readers see either the old content or the
    /// new, never a partial write.
    fn write(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError>;

    /// `Ok(false)` when there was nothing to remove.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Every stored object. Backends that cannot list return
    /// [`StoreError::Unsupported`].
    fn list(&self) -> Result<Vec<StoredObject>, StoreError>;

    /// Public URL of a stored key, when the connection has one.
    fn url(&self, key: &str) -> Option<String>;
}

fn join_url(prefix: &str, key: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), key)
}

// ============================================================================
// Local filesystem
// ============================================================================

const TEMP_PREFIX: &str = ".imgforge-tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    url_prefix: Option<String>,
}

impl LocalBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_prefix: None,
        }
    }

    pub fn with_url_prefix(mut self, prefix: Option<String>) -> Self {
        self.url_prefix = prefix;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_of(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StoreError> {
        let path = self.path_of(key);
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(
            "{TEMP_PREFIX}{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!("Stored {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        match fs::remove_file(self.path_of(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.path_of(key).is_file())
    }

    fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if !entry.file_type().is_file()
                || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
            {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let metadata = entry.metadata().map_err(|e| StoreError::Io(e.into()))?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs());
            objects.push(StoredObject {
                key,
                size: metadata.len(),
                modified,
            });
        }
        Ok(objects)
    }

    fn url(&self, key: &str) -> Option<String> {
        self.url_prefix.as_deref().map(|prefix| join_url(prefix, key))
    }
}

// ============================================================================
// Object stores over HTTP
// ============================================================================

/// S3, Cloud Files and GCS through their plain object HTTP interface:
/// `PUT`, `GET`, `DELETE` and `HEAD` on `<endpoint>/<bucket>/<key>`.
/// Listing is not implemented, so audits on these connections work from the
/// index alone.
pub struct ObjectStoreBackend {
    kind: BackendKind,
    base: String,
    auth: Option<(&'static str, String)>,
    url_prefix: Option<String>,
    client: reqwest::blocking::Client,
}

impl ObjectStoreBackend {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, StoreError> {
        let invalid = |reason: &str| StoreError::InvalidConnection {
            name: config.kind.name().to_string(),
            reason: reason.to_string(),
        };
        let (endpoint, container) = match config.kind {
            BackendKind::S3 => (
                config.endpoint.as_deref().unwrap_or("https://s3.amazonaws.com"),
                config.bucket.as_deref(),
            ),
            BackendKind::Gcs => (
                config.endpoint.as_deref().unwrap_or("https://storage.googleapis.com"),
                config.bucket.as_deref(),
            ),
            BackendKind::CloudFiles => (
                config.endpoint.as_deref().ok_or_else(|| invalid("missing endpoint"))?,
                config.container.as_deref(),
            ),
            BackendKind::Local => return Err(invalid("not an object store")),
        };
        let container = container.ok_or_else(|| invalid("missing bucket or container"))?;
        let auth = config.token.clone().map(|token| match config.kind {
            BackendKind::CloudFiles => ("X-Auth-Token", token),
            _ => ("Authorization", format!("Bearer {token}")),
        });

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| StoreError::Http {
                url: endpoint.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            kind: config.kind,
            base: join_url(endpoint, container),
            auth,
            url_prefix: config.url_prefix.clone(),
            client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        join_url(&self.base, key)
    }

    fn send(
        &self,
        request: reqwest::blocking::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::blocking::Response, StoreError> {
        let request = match &self.auth {
            Some((header, value)) => request.header(*header, value),
            None => request,
        };
        request.send().map_err(|e| http_error(url, e))
    }
}

fn http_error(url: &str, e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(url.to_string())
    } else {
        StoreError::Http {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

fn status_error(url: &str, status: reqwest::StatusCode) -> StoreError {
    StoreError::Http {
        url: url.to_string(),
        message: format!("status {status}"),
    }
}

impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let url = self.object_url(key);
        let response = self.send(self.client.get(&url), &url)?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = response.bytes().map_err(|e| http_error(&url, e))?;
                Ok(Some(body.to_vec()))
            }
            s => Err(status_error(&url, s)),
        }
    }

    fn write(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let url = self.object_url(key);
        let request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        let response = self.send(request, &url)?;
        if !response.status().is_success() {
            return Err(status_error(&url, response.status()));
        }
        debug!("Uploaded {url} ({} bytes)", bytes.len());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(key);
        let response = self.send(self.client.delete(&url), &url)?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(status_error(&url, s)),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let url = self.object_url(key);
        let response = self.send(self.client.head(&url), &url)?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(status_error(&url, s)),
        }
    }

    fn list(&self) -> Result<Vec<StoredObject>, StoreError> {
        Err(StoreError::Unsupported {
            backend: self.kind.name(),
            operation: "listing",
        })
    }

    fn url(&self, key: &str) -> Option<String> {
        Some(match &self.url_prefix {
            Some(prefix) => join_url(prefix, key),
            None => self.object_url(key),
        })
    }
}
