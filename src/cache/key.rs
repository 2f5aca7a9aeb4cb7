//! Cache key derivation.
//!
//! A key has three segments joined by [`SEPARATOR`]:
//!
//! ```text
//! photos/2024/cat.jpg@@9f86d081884c7d65...@@p
//! └── normalized source ┘ └── params digest ┘ └ ttl marker
//! ```
//!
//! - The **normalized source** keeps only `[A-Za-z0-9._/-]`, so keys are
//!   safe as relative paths on every backend and can be listed by source
//!   prefix for invalidation. URLs become `remote/<host>/<path>`; `.` and
//!   `..` segments are dropped. Overlong sources are cut and suffixed with
//!   a digest of the full reference, never a random value, so keys stay
//!   reproducible.
//! - The **params digest** is the SHA-256 of the raw source reference plus
//!   the canonical dimensional and transformational parameter text. Control
//!   parameters are not part of it.
//! - The **ttl marker** separates entries that never expire (`p`) from
//!   expiring ones (`e`).
//!
//! None of the segments can contain `@`, so the separator is unambiguous.

use crate::params::{ParamKind, ParameterSet};
use sha2::{Digest, Sha256};

pub const SEPARATOR: &str = "@@";

/// Longest normalized source kept verbatim.
pub const DEFAULT_MAX_SOURCE_LEN: usize = 160;

const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlMarker {
    Permanent,
    Expiring,
}

impl TtlMarker {
    pub fn for_duration(ttl_seconds: i64) -> Self {
        if ttl_seconds < 0 {
            Self::Permanent
        } else {
            Self::Expiring
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "p",
            Self::Expiring => "e",
        }
    }
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Path-safe, prefix-searchable form of a source reference.
pub fn normalize_source(source_ref: &str, max_len: usize) -> String {
    let trimmed = source_ref.trim();
    let (prefix, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => ("", rest),
        Some((_, rest)) => ("remote/", rest),
        None => match trimmed.strip_prefix("asset:") {
            Some(rest) => ("asset/", rest),
            None => ("", trimmed),
        },
    };

    let body = rest
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/");
    let mut normalized = format!("{prefix}{body}");
    if normalized.is_empty() {
        normalized.push('_');
    }

    let max_len = max_len.max(SUFFIX_LEN + 2);
    if normalized.len() > max_len {
        let digest = sha256_hex(&[source_ref]);
        normalized.truncate(max_len - SUFFIX_LEN - 1);
        normalized.push('~');
        normalized.push_str(&digest[..SUFFIX_LEN]);
    }
    normalized
}

/// Build a key from already-canonical parameter text.
pub fn derive_key(
    source_ref: &str,
    dimensional: &str,
    transformational: &str,
    marker: TtlMarker,
    max_source_len: usize,
) -> String {
    let digest = sha256_hex(&[source_ref.trim(), dimensional, transformational]);
    format!(
        "{}{SEPARATOR}{digest}{SEPARATOR}{}",
        normalize_source(source_ref, max_source_len),
        marker.as_str()
    )
}

/// Key for a normalized parameter set.
pub fn key_for(source_ref: &str, params: &ParameterSet, max_source_len: usize) -> String {
    derive_key(
        source_ref,
        &params.canonical(ParamKind::Dimensional),
        &params.canonical(ParamKind::Transformational),
        TtlMarker::for_duration(params.cache_duration()),
        max_source_len,
    )
}

/// Prefix shared by every key derived from `source_ref`.
///
/// References that normalize to the same form share one prefix: `a b.jpg`
/// and `a_b.jpg` both map to `a_b.jpg@@`.
pub fn source_prefix(source_ref: &str, max_source_len: usize) -> String {
    format!("{}{SEPARATOR}", normalize_source(source_ref, max_source_len))
}
