//! Persistent result cache.
//!
//! Transformed images are stored under a deterministic key (see [`key`])
//! in one of several named connections, each backed by a
//! [`StorageBackend`]. A JSON index per connection records when each entry
//! was written and how long it lives, so expiry checks never touch the
//! backend.
//!
//! ```text
//! <state_dir>/
//! ├── local.index.json
//! └── cdn.index.json
//! <connection root>/
//! └── photos/cat.jpg@@9f86...@@p
//! ```
//!
//! Cache failures never fail a transform. The engine logs them and serves
//! the computed image uncached.

mod backends;
mod index;
pub mod key;
mod store;

pub use backends::{LocalBackend, ObjectStoreBackend, StorageBackend, StoredObject};
pub use index::{CacheIndex, EntryMeta, INDEX_VERSION};
pub use key::{DEFAULT_MAX_SOURCE_LEN, TtlMarker, derive_key, key_for, normalize_source, source_prefix};
pub use store::{
    AuditReport, CacheStore, Clock, Lease, ManualClock, OrphanPolicy, StoreSettings, SystemClock,
};

use crate::config::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
    #[error("timed out talking to {0}")]
    Timeout(String),
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),
    #[error("connection '{name}' is not usable: {reason}")]
    InvalidConnection { name: String, reason: String },
    #[error("{backend} storage does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    S3,
    CloudFiles,
    Gcs,
}

impl BackendKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::CloudFiles => "cloudfiles",
            Self::Gcs => "gcs",
        }
    }
}

/// A configured storage target.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub name: String,
    pub kind: BackendKind,
    pub config: ConnectionConfig,
    /// Why the connection cannot be opened; `None` when it is usable.
    pub problem: Option<String>,
}

impl Connection {
    pub fn new(name: impl Into<String>, config: ConnectionConfig) -> Self {
        Self {
            name: name.into(),
            kind: config.kind,
            problem: config.problem(),
            config,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.problem.is_none()
    }

    /// Build the backend this connection describes.
    pub fn open(&self) -> Result<Arc<dyn StorageBackend>, StoreError> {
        if let Some(reason) = &self.problem {
            return Err(StoreError::InvalidConnection {
                name: self.name.clone(),
                reason: reason.clone(),
            });
        }
        match self.kind {
            BackendKind::Local => {
                let root = self.config.path.clone().unwrap_or_default();
                Ok(Arc::new(
                    LocalBackend::new(root).with_url_prefix(self.config.url_prefix.clone()),
                ))
            }
            _ => Ok(Arc::new(ObjectStoreBackend::from_config(&self.config)?)),
        }
    }
}

/// A connection as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub name: String,
    pub kind: BackendKind,
    pub is_default: bool,
    pub is_valid: bool,
    pub problem: Option<String>,
}
