//! Stream transfer statistics
//!
//! Joins stream `close` records against the dataflow graph. Each stream
//! instance (one per host/worker) reports what it moved over the network
//! and within the host.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::Serialize;
use tracing::debug;

use super::data::EventStore;
use super::events::{categories, fields, phases, EventRecord};
use super::graph::DataflowGraph;
use crate::error::Diagnostic;

/// Rows of a join plus the anomalies found while building them
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRows<T> {
    pub rows: Vec<T>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> Default for JoinedRows<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

impl<T> JoinedRows<T> {
    /// Number of rows whose node reference did not resolve
    pub fn unresolved(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnresolvedReference { .. }))
            .count()
    }
}

/// Label a row by its owning node
///
/// Returns None and records a diagnostic if the node does not exist.
pub(crate) fn resolve_label(
    graph: &DataflowGraph,
    row_kind: &'static str,
    row_id: u64,
    node_id: u64,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<String> {
    match graph.get(node_id) {
        Some(node) => Some(node.display_name()),
        None => {
            diagnostics.push(
                Diagnostic::UnresolvedReference {
                    row_kind,
                    row_id,
                    node_id,
                }
                .emitted(),
            );
            None
        }
    }
}

/// Read a required integer counter, degrading to zero when absent
pub(crate) fn counter(record: &EventRecord, key: &str, missing: &mut Vec<String>) -> u64 {
    match record.uint(key) {
        Some(value) => value,
        None => {
            missing.push(key.to_string());
            0
        }
    }
}

/// Record one schema gap for all counters a record was missing
pub(crate) fn report_missing(
    record: &EventRecord,
    missing: Vec<String>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !missing.is_empty() {
        diagnostics.push(
            Diagnostic::SchemaGap {
                context: record.describe(),
                fields: missing,
            }
            .emitted(),
        );
    }
}

// ============================================================================
// Transfer counters
// ============================================================================

/// Items, bytes and blocks received/sent over network and host-internal legs
///
/// Sums saturate at `u64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounters {
    pub rx_net_items: u64,
    pub tx_net_items: u64,
    pub rx_net_bytes: u64,
    pub tx_net_bytes: u64,
    pub rx_net_blocks: u64,
    pub tx_net_blocks: u64,
    pub rx_int_items: u64,
    pub tx_int_items: u64,
    pub rx_int_bytes: u64,
    pub tx_int_bytes: u64,
    pub rx_int_blocks: u64,
    pub tx_int_blocks: u64,
}

impl TransferCounters {
    fn from_record(record: &EventRecord, missing: &mut Vec<String>) -> Self {
        Self {
            rx_net_items: counter(record, "rx_net_items", missing),
            tx_net_items: counter(record, "tx_net_items", missing),
            rx_net_bytes: counter(record, "rx_net_bytes", missing),
            tx_net_bytes: counter(record, "tx_net_bytes", missing),
            rx_net_blocks: counter(record, "rx_net_blocks", missing),
            tx_net_blocks: counter(record, "tx_net_blocks", missing),
            rx_int_items: counter(record, "rx_int_items", missing),
            tx_int_items: counter(record, "tx_int_items", missing),
            rx_int_bytes: counter(record, "rx_int_bytes", missing),
            tx_int_bytes: counter(record, "tx_int_bytes", missing),
            rx_int_blocks: counter(record, "rx_int_blocks", missing),
            tx_int_blocks: counter(record, "tx_int_blocks", missing),
        }
    }

    pub fn rx_items(&self) -> u64 {
        self.rx_net_items.saturating_add(self.rx_int_items)
    }

    pub fn tx_items(&self) -> u64 {
        self.tx_net_items.saturating_add(self.tx_int_items)
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_net_bytes.saturating_add(self.rx_int_bytes)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_net_bytes.saturating_add(self.tx_int_bytes)
    }
}

impl AddAssign for TransferCounters {
    fn add_assign(&mut self, other: Self) {
        self.rx_net_items = self.rx_net_items.saturating_add(other.rx_net_items);
        self.tx_net_items = self.tx_net_items.saturating_add(other.tx_net_items);
        self.rx_net_bytes = self.rx_net_bytes.saturating_add(other.rx_net_bytes);
        self.tx_net_bytes = self.tx_net_bytes.saturating_add(other.tx_net_bytes);
        self.rx_net_blocks = self.rx_net_blocks.saturating_add(other.rx_net_blocks);
        self.tx_net_blocks = self.tx_net_blocks.saturating_add(other.tx_net_blocks);
        self.rx_int_items = self.rx_int_items.saturating_add(other.rx_int_items);
        self.tx_int_items = self.tx_int_items.saturating_add(other.tx_int_items);
        self.rx_int_bytes = self.rx_int_bytes.saturating_add(other.rx_int_bytes);
        self.tx_int_bytes = self.tx_int_bytes.saturating_add(other.tx_int_bytes);
        self.rx_int_blocks = self.rx_int_blocks.saturating_add(other.rx_int_blocks);
        self.tx_int_blocks = self.tx_int_blocks.saturating_add(other.tx_int_blocks);
    }
}

// ============================================================================
// Detail and summary views
// ============================================================================

/// One stream instance on one host/worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEdge {
    pub stream_id: u64,
    pub node_id: u64,
    /// "{label}.{id}" of the owning node, None when unresolved
    pub label: Option<String>,
    pub host_rank: Option<u64>,
    pub worker_rank: Option<u64>,
    pub counters: TransferCounters,
}

/// Counters of one stream summed over all hosts and workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    pub stream_id: u64,
    pub label: Option<String>,
    /// Number of stream instances summed
    pub instances: usize,
    pub counters: TransferCounters,
}

/// One row per stream instance, ordered by (stream, node, host, worker)
pub fn stream_detail(store: &EventStore, graph: &DataflowGraph) -> JoinedRows<StreamEdge> {
    let mut joined = JoinedRows::default();

    for record in store.select(categories::STREAM, phases::CLOSE) {
        let (Some(stream_id), Some(node_id)) =
            (record.uint(fields::ID), record.uint(fields::NODE_REF))
        else {
            let mut missing = Vec::new();
            counter(record, fields::ID, &mut missing);
            counter(record, fields::NODE_REF, &mut missing);
            report_missing(record, missing, &mut joined.diagnostics);
            continue;
        };

        let mut missing = Vec::new();
        let counters = TransferCounters::from_record(record, &mut missing);
        report_missing(record, missing, &mut joined.diagnostics);

        let label = resolve_label(graph, "stream", stream_id, node_id, &mut joined.diagnostics);

        joined.rows.push(StreamEdge {
            stream_id,
            node_id,
            label,
            host_rank: record.host_rank,
            worker_rank: record.worker_rank,
            counters,
        });
    }

    joined
        .rows
        .sort_by_key(|r| (r.stream_id, r.node_id, r.host_rank, r.worker_rank));

    debug!(
        rows = joined.rows.len(),
        unresolved = joined.unresolved(),
        "Stream detail built"
    );
    joined
}

/// Group detail rows by (stream, label) and sum their counters
pub fn summarize(detail: &[StreamEdge]) -> Vec<StreamSummary> {
    let mut groups: BTreeMap<(u64, Option<String>), StreamSummary> = BTreeMap::new();

    for edge in detail {
        groups
            .entry((edge.stream_id, edge.label.clone()))
            .and_modify(|summary| {
                summary.instances += 1;
                summary.counters += edge.counters;
            })
            .or_insert_with(|| StreamSummary {
                stream_id: edge.stream_id,
                label: edge.label.clone(),
                instances: 1,
                counters: edge.counters,
            });
    }

    groups.into_values().collect()
}

/// Detail rows grouped by (stream, label) with counters summed
pub fn stream_summary(store: &EventStore, graph: &DataflowGraph) -> JoinedRows<StreamSummary> {
    let detail = stream_detail(store, graph);
    JoinedRows {
        rows: summarize(&detail.rows),
        diagnostics: detail.diagnostics,
    }
}
