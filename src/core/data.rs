//! Immutable, time-normalized event store
//!
//! One store is built per ingestion batch and is the sole input to every
//! derived view. It is never mutated after construction.

use std::collections::BTreeMap;
use std::io::BufRead;

use tracing::{debug, info};

use super::events::{fields, EventRecord};
use super::parser::{ingest_reader, SourceBatch};
use crate::error::Diagnostic;
use crate::time::micros_to_millis;

/// Time-ordered snapshot of all records of one batch
#[derive(Debug, Default)]
pub struct EventStore {
    /// Records sorted by normalized timestamp, ties in ingestion order
    records: Vec<EventRecord>,
    /// Diagnostics from ingestion and normalization
    diagnostics: Vec<Diagnostic>,
    /// Names of the sources that contributed records
    sources: Vec<String>,
    /// Raw timestamp (microseconds) mapped to zero
    origin_us: Option<f64>,
}

impl EventStore {
    /// Merge source batches, normalize timestamps and sort
    ///
    /// Batches are merged in the order given; that order defines the
    /// tiebreak for records with equal timestamps.
    pub fn from_batches(batches: Vec<SourceBatch>) -> Self {
        let origin_us = batches
            .iter()
            .flat_map(|b| b.records.iter())
            .filter_map(|r| r.raw_ts)
            .reduce(f64::min);

        let mut records = Vec::with_capacity(batches.iter().map(|b| b.records.len()).sum());
        let mut diagnostics = Vec::new();
        let mut sources = Vec::with_capacity(batches.len());
        let mut seq = 0u64;

        for batch in batches {
            diagnostics.extend(batch.diagnostics);
            sources.push(batch.source);

            for raw in batch.records {
                let timestamp = match (raw.raw_ts, origin_us) {
                    (Some(ts), Some(origin)) => micros_to_millis(ts - origin),
                    _ => 0.0,
                };

                let record = EventRecord {
                    timestamp,
                    category: raw.category,
                    phase: raw.phase,
                    host_rank: raw.host_rank,
                    worker_rank: raw.worker_rank,
                    seq,
                    fields: raw.fields,
                };
                if raw.raw_ts.is_none() {
                    diagnostics.push(
                        Diagnostic::SchemaGap {
                            context: record.describe(),
                            fields: vec![fields::TIMESTAMP.to_string()],
                        }
                        .emitted(),
                    );
                }

                records.push(record);
                seq += 1;
            }
        }

        // sort_by is stable: equal timestamps keep ascending seq
        records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let store = Self {
            records,
            diagnostics,
            sources,
            origin_us,
        };

        info!(
            sources = store.sources.len(),
            records = store.records.len(),
            diagnostics = store.diagnostics.len(),
            span_ms = store.span_ms().unwrap_or(0.0),
            "Event store built"
        );
        for (category, count) in store.category_counts() {
            debug!(category, count, "Category records");
        }

        store
    }

    /// Build a store from a single in-memory or file reader
    pub fn from_reader<R: BufRead>(source: &str, reader: R) -> Self {
        Self::from_batches(vec![ingest_reader(source, reader)])
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records of one category and phase, in time order
    pub fn select<'a>(
        &'a self,
        category: &'a str,
        phase: &'a str,
    ) -> impl Iterator<Item = &'a EventRecord> + 'a {
        self.records.iter().filter(move |r| r.is(category, phase))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Raw timestamp (microseconds) of the earliest record
    pub fn origin_us(&self) -> Option<f64> {
        self.origin_us
    }

    /// Milliseconds between the first and the last record
    pub fn span_ms(&self) -> Option<f64> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        Some(last.timestamp - first.timestamp)
    }

    /// Number of records per category
    pub fn category_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.category.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store(input: &str) -> EventStore {
        EventStore::from_reader("test", Cursor::new(input.to_string()))
    }

    #[test]
    fn test_timestamps_normalized_to_millis() {
        let s = store(concat!(
            r#"{"ts":1000500000,"class":"NetManager","event":"profile","tx_speed":2}"#, "\n",
            r#"{"ts":1000000000,"class":"NetManager","event":"profile","tx_speed":1}"#, "\n",
            r#"{"ts":1000250000,"class":"NetManager","event":"profile","tx_speed":3}"#, "\n",
        ));

        let ts: Vec<f64> = s.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![0.0, 250.0, 500.0]);
        assert_eq!(s.origin_us(), Some(1_000_000_000.0));
        assert_eq!(s.span_ms(), Some(500.0));
    }

    #[test]
    fn test_equal_timestamps_keep_ingestion_order() {
        let s = store(concat!(
            r#"{"ts":5,"class":"File","event":"close","id":1}"#, "\n",
            r#"{"ts":5,"class":"File","event":"close","id":2}"#, "\n",
            r#"{"ts":1,"class":"File","event":"close","id":3}"#, "\n",
            r#"{"ts":5,"class":"File","event":"close","id":4}"#, "\n",
        ));

        let ids: Vec<u64> = s.records().iter().filter_map(|r| r.uint("id")).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_batches_merge_across_sources() {
        let a = ingest_reader(
            "host0",
            Cursor::new(r#"{"ts":200,"host_rank":0,"class":"Cmdline","event":"start"}"#),
        );
        let b = ingest_reader(
            "host1",
            Cursor::new(r#"{"ts":100,"host_rank":1,"class":"Cmdline","event":"start"}"#),
        );

        let s = EventStore::from_batches(vec![a, b]);
        assert_eq!(s.len(), 2);
        assert_eq!(s.sources(), &["host0".to_string(), "host1".to_string()]);
        assert_eq!(s.records()[0].host_rank, Some(1));
        assert_eq!(s.records()[0].seq, 1);
    }

    #[test]
    fn test_record_count_matches_recognized_lines() {
        let s = store(concat!(
            r#"{"ts":1,"class":"File","event":"close"}"#, "\n",
            r#"{"ts":2,"class":"Ignored","event":"close"}"#, "\n",
            r#"{"ts":3,"class":"Stream","event":"close"}"#, "\n",
            r#"{"ts":4,"class":"BlockPool","event":"profile"}"#, "\n",
        ));
        assert_eq!(s.len(), 3);
        assert!(s.diagnostics().is_empty());
        assert_eq!(s.category_counts().get("Stream"), Some(&1));
    }

    #[test]
    fn test_missing_timestamp_is_schema_gap() {
        let s = store(concat!(
            r#"{"ts":100,"class":"File","event":"close"}"#, "\n",
            r#"{"class":"File","event":"close"}"#, "\n",
        ));
        assert_eq!(s.len(), 2);
        assert_eq!(s.diagnostics().len(), 1);
        assert_eq!(s.diagnostics()[0].kind(), "schema_gap");
    }

    #[test]
    fn test_select_filters_category_and_phase() {
        let s = store(concat!(
            r#"{"ts":1,"class":"Stream","event":"open"}"#, "\n",
            r#"{"ts":2,"class":"Stream","event":"close"}"#, "\n",
            r#"{"ts":3,"class":"StreamSink","event":"close"}"#, "\n",
        ));
        assert_eq!(s.select("Stream", "close").count(), 1);
        assert_eq!(s.select("StreamSink", "close").count(), 1);
    }

    #[test]
    fn test_empty_store() {
        let s = store("");
        assert!(s.is_empty());
        assert_eq!(s.span_ms(), None);
        assert_eq!(s.origin_us(), None);
    }
}
