//! Event parser for newline-delimited JSON profile logs
//!
//! Parses every line into a flattened record. Malformed lines are reported
//! and skipped; lines without a recognized `class` and an `event` are not
//! profile events and are dropped silently.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, trace};

use super::events::{fields, is_recognized, FieldValue};
use super::flatten::flatten;
use crate::error::Diagnostic;

/// Longest line excerpt kept in a malformed-record diagnostic
const MAX_EXCERPT_CHARS: usize = 160;

/// A parsed record before time normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Raw `ts` value (microseconds), if the record carried one
    pub raw_ts: Option<f64>,
    pub category: String,
    pub phase: String,
    pub host_rank: Option<u64>,
    pub worker_rank: Option<u64>,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Everything read from one input source
#[derive(Debug, Default)]
pub struct SourceBatch {
    /// Name of the source (usually its path)
    pub source: String,
    pub records: Vec<RawRecord>,
    /// Non-blank lines seen
    pub lines: usize,
    /// Well-formed lines that were not profile events
    pub dropped: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl SourceBatch {
    pub fn malformed(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::MalformedRecord { .. }))
            .count()
    }
}

/// Parse a single log line
///
/// Returns Ok(None) for well-formed JSON that is not a profile event.
pub fn parse_line(line: &str) -> Result<Option<RawRecord>, serde_json::Error> {
    let json: Value = serde_json::from_str(line)?;

    let Value::Object(mut map) = json else {
        return Ok(None);
    };

    let category = match map.get(fields::CATEGORY).and_then(Value::as_str) {
        Some(class) if is_recognized(class) => class.to_string(),
        _ => return Ok(None),
    };
    let Some(phase) = map.get(fields::PHASE).and_then(Value::as_str).map(str::to_string) else {
        return Ok(None);
    };

    let raw_ts = map.get(fields::TIMESTAMP).and_then(Value::as_f64);
    let host_rank = map.get(fields::HOST_RANK).and_then(Value::as_u64);
    let worker_rank = map.get(fields::WORKER_RANK).and_then(Value::as_u64);

    for key in fields::ENVELOPE {
        map.remove(*key);
    }

    Ok(Some(RawRecord {
        raw_ts,
        category,
        phase,
        host_rank,
        worker_rank,
        fields: flatten(&map),
    }))
}

/// Read all records from a line-oriented source
///
/// Never fails: bad lines become diagnostics, and an I/O error ends the
/// source early while keeping what was read.
pub fn ingest_reader<R: BufRead>(source: &str, reader: R) -> SourceBatch {
    let mut batch = SourceBatch {
        source: source.to_string(),
        ..SourceBatch::default()
    };

    for (idx, chunk) in reader.split(b'\n').enumerate() {
        let line_no = idx + 1;
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                batch.diagnostics.push(
                    Diagnostic::ReadAborted {
                        origin: source.to_string(),
                        line: idx,
                        reason: e.to_string(),
                    }
                    .emitted(),
                );
                break;
            }
        };

        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                batch.lines += 1;
                let content = String::from_utf8_lossy(e.as_bytes()).into_owned();
                batch.diagnostics.push(malformed(source, line_no, &content, "invalid UTF-8"));
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        batch.lines += 1;

        match parse_line(line) {
            Ok(Some(record)) => {
                trace!(source, line = line_no, class = %record.category, "Record parsed");
                batch.records.push(record);
            }
            Ok(None) => {
                batch.dropped += 1;
                trace!(source, line = line_no, "Not a profile event");
            }
            Err(e) => {
                batch.diagnostics.push(malformed(source, line_no, line, &e.to_string()));
            }
        }
    }

    info!(
        source,
        records = batch.records.len(),
        lines = batch.lines,
        dropped = batch.dropped,
        malformed = batch.malformed(),
        "Source ingested"
    );
    batch
}

/// Open and read one log file
pub fn ingest_file(path: &Path) -> io::Result<SourceBatch> {
    let file = File::open(path)?;
    debug!(path = %path.display(), "Reading log file");
    Ok(ingest_reader(&path.display().to_string(), BufReader::new(file)))
}

fn malformed(source: &str, line: usize, content: &str, reason: &str) -> Diagnostic {
    Diagnostic::MalformedRecord {
        origin: source.to_string(),
        line,
        content: content.chars().take(MAX_EXCERPT_CHARS).collect(),
        reason: reason.to_string(),
    }
    .emitted()
}
