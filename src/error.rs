//! Error and diagnostic types
//!
//! Per-record anomalies are recovered where they occur and kept as
//! `Diagnostic` values next to the view that produced them. Only the
//! complete absence of readable input is fatal.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// A recovered anomaly found while ingesting or deriving views
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    #[error("{origin}:{line}: malformed record ({reason}): {content}")]
    MalformedRecord {
        origin: String,
        line: usize,
        content: String,
        reason: String,
    },

    #[error("{origin}: read aborted after line {line}: {reason}")]
    ReadAborted {
        origin: String,
        line: usize,
        reason: String,
    },

    #[error("{context}: missing {}", .fields.join(", "))]
    SchemaGap { context: String, fields: Vec<String> },

    #[error("node {id}: label {rejected:?} conflicts with {kept:?}, keeping first definition")]
    NodeIdConflict {
        id: u64,
        kept: String,
        rejected: String,
    },

    #[error("{row_kind} {row_id} references unknown node {node_id}")]
    UnresolvedReference {
        row_kind: &'static str,
        row_id: u64,
        node_id: u64,
    },
}

impl Diagnostic {
    /// Stable short name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::MalformedRecord { .. } => "malformed_record",
            Diagnostic::ReadAborted { .. } => "read_aborted",
            Diagnostic::SchemaGap { .. } => "schema_gap",
            Diagnostic::NodeIdConflict { .. } => "node_id_conflict",
            Diagnostic::UnresolvedReference { .. } => "unresolved_reference",
        }
    }

    /// Log the diagnostic. Schema gaps are routine and only logged at debug.
    pub fn emit(&self) {
        match self {
            Diagnostic::SchemaGap { .. } => debug!(kind = self.kind(), "{}", self),
            _ => warn!(kind = self.kind(), "{}", self),
        }
    }

    /// Log and return, for `diagnostics.push(Diagnostic::..().emitted())`
    pub fn emitted(self) -> Self {
        self.emit();
        self
    }
}

/// An input path that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFailure {
    pub path: PathBuf,
    pub reason: String,
}

fn format_failures(failures: &[InputFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.path.display(), f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Fatal ingestion errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no input files given")]
    NoInputs,

    #[error("none of the input files could be read: {}", format_failures(.failures))]
    NoReadableInput { failures: Vec<InputFailure> },
}

/// Errors from time series derivation
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum SeriesError {
    #[error("bucket width must be a positive number of milliseconds, got {0}")]
    InvalidWidth(f64),

    #[error("bucket width {width} ms is too small to index timestamp {timestamp} ms")]
    WidthTooSmall { width: f64, timestamp: f64 },
}
