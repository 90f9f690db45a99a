//! Whole-run summary and stage timeline

use serde::Serialize;
use tracing::debug;

use super::data::EventStore;
use super::events::{categories, fields, phases};
use super::graph::DataflowGraph;
use super::series::{series, series_sum, MetricSeries, SeriesLookup};
use super::streams::{resolve_label, JoinedRows};

/// Program name from the first command line record
pub fn program_name(store: &EventStore) -> Option<String> {
    store
        .select(categories::CMDLINE, phases::START)
        .find_map(|r| r.text(fields::PROGRAM))
        .map(str::to_string)
}

/// Headline figures of one run
///
/// Every figure is None when its source keys never appear in the log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub running_time_ms: Option<f64>,
    /// Average CPU user+sys (%)
    pub cpu_user_sys: Option<f64>,
    pub cpu_user: Option<f64>,
    pub net_tx_rx_bytes: Option<f64>,
    pub net_tx_bytes: Option<f64>,
    pub net_rx_bytes: Option<f64>,
    /// Average network throughput (B/s)
    pub net_tx_rx_speed: Option<f64>,
    pub net_tx_speed: Option<f64>,
    pub net_rx_speed: Option<f64>,
    pub diskstats_rd_wr_bytes: Option<f64>,
}

fn average(lookup: SeriesLookup) -> Option<f64> {
    lookup.as_series().and_then(MetricSeries::mean)
}

fn total(lookup: SeriesLookup) -> Option<f64> {
    lookup.as_series().map(MetricSeries::total)
}

impl RunSummary {
    pub fn compute(store: &EventStore) -> Self {
        let proc = categories::LINUX_PROC_STATS;
        let key = |k: &str| series(store, proc, k);
        let sum = |a: &str, b: &str| series_sum(store, proc, a, b);

        let summary = Self {
            running_time_ms: store.span_ms(),
            cpu_user_sys: average(sum("cpu_user", "cpu_sys")),
            cpu_user: average(key("cpu_user")),
            net_tx_rx_bytes: total(sum("net_tx_bytes", "net_rx_bytes")),
            net_tx_bytes: total(key("net_tx_bytes")),
            net_rx_bytes: total(key("net_rx_bytes")),
            net_tx_rx_speed: average(sum("net_tx_speed", "net_rx_speed")),
            net_tx_speed: average(key("net_tx_speed")),
            net_rx_speed: average(key("net_rx_speed")),
            diskstats_rd_wr_bytes: total(sum("diskstats_rd_bytes", "diskstats_wr_bytes")),
        };
        debug!(?summary, "Run summary computed");
        summary
    }

    /// Named figures in display order
    pub fn entries(&self) -> [(&'static str, Option<f64>); 10] {
        [
            ("running_time", self.running_time_ms.map(|ms| ms / 1000.0)),
            ("cpu_user_sys", self.cpu_user_sys),
            ("cpu_user", self.cpu_user),
            ("net_tx_rx_bytes", self.net_tx_rx_bytes),
            ("net_tx_bytes", self.net_tx_bytes),
            ("net_rx_bytes", self.net_rx_bytes),
            ("net_tx_rx_speed", self.net_tx_rx_speed),
            ("net_tx_speed", self.net_tx_speed),
            ("net_rx_speed", self.net_rx_speed),
            ("diskstats_rd_wr_bytes", self.diskstats_rd_wr_bytes),
        ]
    }

    /// `RESULT title=... key=value ...` for plotting tools
    ///
    /// Running time is given in seconds. Missing figures are left out.
    pub fn result_line(&self, title: &str) -> String {
        let mut line = format!("RESULT title={}", title.replace(char::is_whitespace, "_"));
        for (name, value) in self.entries() {
            if let Some(value) = value {
                line.push_str(&format!(" {name}={value}"));
            }
        }
        line
    }
}

/// One stage builder event, as seen by worker 0
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    pub timestamp: f64,
    pub node_id: u64,
    /// "{label}.{id}" of the executing node
    pub label: String,
    pub phase: String,
    /// Target node names; unresolved targets keep their bare id
    pub targets: Vec<String>,
}

/// Stage execution timeline in time order
pub fn stage_timeline(store: &EventStore, graph: &DataflowGraph) -> JoinedRows<StageEvent> {
    let mut joined = JoinedRows::default();

    let records = store
        .records()
        .iter()
        .filter(|r| r.category == categories::STAGE_BUILDER && r.worker_rank == Some(0));

    for record in records {
        let Some(node_id) = record.uint(fields::NODE_REF) else {
            continue;
        };
        let label = match record.text(fields::LABEL) {
            Some(label) => format!("{label}.{node_id}"),
            None => graph
                .get(node_id)
                .map(|n| n.display_name())
                .unwrap_or_else(|| node_id.to_string()),
        };

        let targets = record
            .ids(fields::TARGETS)
            .into_iter()
            .map(|target| {
                resolve_label(graph, "stage", node_id, target, &mut joined.diagnostics)
                    .unwrap_or_else(|| target.to_string())
            })
            .collect();

        joined.rows.push(StageEvent {
            timestamp: record.timestamp,
            node_id,
            label,
            phase: record.phase.clone(),
            targets,
        });
    }

    debug!(stages = joined.rows.len(), "Stage timeline built");
    joined
}
