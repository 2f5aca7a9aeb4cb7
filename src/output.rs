//! CLI output formatting.
//!
//! Every command prints its result as lines with the same shape: one header
//! line naming the entity, then indented context lines.
//!
//! ## transform
//!
//! ```text
//! photos/cat.jpg → 400x300 webp, 18231 bytes (cached)
//!     Key: photos/cat.jpg@@9f86...@@p
//!     URL: https://img.example.com/cache/photos/cat.jpg@@9f86...@@p
//!     Saved: out/cat.webp
//!     Warning: filter 'sparkle' (step 2) skipped: unknown filter
//! ```
//!
//! ## audit
//!
//! ```text
//! Audit local
//!     Expired removed: 3
//!     Stale records purged: 0
//!     Orphans indexed: 1
//!     Orphans removed: 0
//! ```
//!
//! ## connections
//!
//! ```text
//! local (local) [default]
//! cdn (s3) [invalid: s3 connection needs `bucket`]
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::{AuditReport, ConnectionInfo};
use crate::engine::{TransformError, TransformOutput};
use crate::filters::FilterRegistry;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn context(label: &str, value: impl std::fmt::Display) -> String {
    format!("{}{label}: {value}", indent(1))
}

// ============================================================================
// transform
// ============================================================================

pub fn format_transform_output(
    source: &str,
    output: &TransformOutput,
    saved_to: Option<&Path>,
) -> Vec<String> {
    let origin = if output.cached { "cached" } else { "built" };
    let mut lines = vec![format!(
        "{source} → {}x{} {}, {} bytes ({origin})",
        output.width,
        output.height,
        output.format,
        output.bytes.len()
    )];
    lines.push(context("Key", &output.key));
    if let Some(url) = &output.url {
        lines.push(context("URL", url));
    }
    if let Some(path) = saved_to {
        lines.push(context("Saved", path.display()));
    }
    if let Some(tag) = &output.markup {
        lines.push(context("Tag", tag));
    }
    for diagnostic in &output.diagnostics {
        lines.push(context("Warning", diagnostic));
    }
    lines
}

pub fn print_transform_output(source: &str, output: &TransformOutput, saved_to: Option<&Path>) {
    for line in format_transform_output(source, output, saved_to) {
        println!("{line}");
    }
}

pub fn format_transform_error(source: &str, error: &TransformError) -> Vec<String> {
    vec![format!("{source} → failed"), context("Error", error)]
}

pub fn print_transform_error(source: &str, error: &TransformError) {
    for line in format_transform_error(source, error) {
        eprintln!("{line}");
    }
}

// ============================================================================
// audit
// ============================================================================

pub fn format_audit_report(report: &AuditReport) -> Vec<String> {
    let mut header = format!("Audit {}", report.connection);
    if report.cancelled {
        header.push_str(" (cancelled)");
    }
    let mut lines = vec![header];
    if !report.listed {
        lines.push(format!("{}Listing unsupported; checked index records only", indent(1)));
    }
    lines.push(context("Records checked", report.records_checked));
    if report.listed {
        lines.push(context("Files checked", report.files_checked));
    }
    lines.push(context("Expired removed", report.expired_removed));
    lines.push(context("Stale records purged", report.stale_records_purged));
    lines.push(context("Orphans indexed", report.orphans_indexed));
    lines.push(context("Orphans removed", report.orphans_removed));
    if report.skipped_in_flight > 0 {
        lines.push(context("Skipped (being written)", report.skipped_in_flight));
    }
    for error in &report.errors {
        lines.push(context("Error", error));
    }
    lines
}

pub fn print_audit_report(report: &AuditReport) {
    for line in format_audit_report(report) {
        println!("{line}");
    }
}

// ============================================================================
// connections / filters
// ============================================================================

pub fn format_connections(connections: &[ConnectionInfo]) -> Vec<String> {
    connections
        .iter()
        .map(|c| {
            let mut line = format!("{} ({})", c.name, c.kind.name());
            if c.is_default {
                line.push_str(" [default]");
            }
            if !c.is_valid {
                let reason = c.problem.as_deref().unwrap_or("unavailable");
                line.push_str(&format!(" [invalid: {reason}]"));
            }
            line
        })
        .collect()
}

pub fn print_connections(connections: &[ConnectionInfo]) {
    for line in format_connections(connections) {
        println!("{line}");
    }
}

pub fn format_filters(registry: &FilterRegistry) -> Vec<String> {
    let width = registry.specs().map(|s| s.name.len()).max().unwrap_or(0);
    registry
        .specs()
        .map(|s| format!("{:<width$}  {}", s.name, s.usage))
        .collect()
}

pub fn print_filters(registry: &FilterRegistry) {
    for line in format_filters(registry) {
        println!("{line}");
    }
}
