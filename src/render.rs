//! Text, JSON and RESULT-line renderings of the derived views

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::core::events::categories;
use crate::core::{
    available_keys, file_detail, program_name, reconstruct, resolve_all, stage_timeline,
    stream_detail, summarize, to_dot, ChartSeries, DataflowNode, EventStore, FileRecord,
    RunSummary, StageEvent, StreamEdge, StreamSummary, DEFAULT_SERIES,
};
use crate::error::{Diagnostic, SeriesError};

const IEC_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Format a byte count with binary prefixes, e.g. "1.50 KiB"
pub fn format_iec(bytes: f64) -> String {
    if !bytes.is_finite() {
        return format!("{bytes} B");
    }
    let mut value = bytes;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < IEC_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value} B")
    } else {
        format!("{value:.2} {}", IEC_UNITS[unit])
    }
}

fn label_or_dash(label: &Option<String>) -> String {
    label.clone().unwrap_or_else(|| "-".to_string())
}

fn rank(rank: Option<u64>) -> String {
    rank.map_or_else(|| "-".to_string(), |r| r.to_string())
}

// ============================================================================
// Tables
// ============================================================================

/// Plain-text table; first column left aligned, the rest right aligned
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub title: String,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(title: impl Into<String>, headers: Vec<&'static str>) -> Self {
        Self { title: title.into(), headers, rows: Vec::new() }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(len),
                    None => widths.push(len),
                }
            }
        }
        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let write_row = |f: &mut fmt::Formatter<'_>, cells: &[String]| -> fmt::Result {
            let line: Vec<String> = cells
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(i, (cell, &w))| {
                    if i == 0 {
                        format!("{cell:<w$}")
                    } else {
                        format!("{cell:>w$}")
                    }
                })
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())
        };

        writeln!(f, "== {} ==", self.title)?;
        let headers: Vec<String> = self.headers.iter().map(|h| h.to_string()).collect();
        write_row(f, &headers)?;
        if self.rows.is_empty() {
            return writeln!(f, "(none)");
        }
        for row in &self.rows {
            write_row(f, row)?;
        }
        Ok(())
    }
}

pub fn stream_detail_table(rows: &[StreamEdge]) -> Table {
    let mut table = Table::new(
        "Stream detail",
        vec!["node", "stream", "host", "worker", "rx items", "tx items", "rx bytes", "tx bytes"],
    );
    for row in rows {
        let c = &row.counters;
        table.push(vec![
            label_or_dash(&row.label),
            row.stream_id.to_string(),
            rank(row.host_rank),
            rank(row.worker_rank),
            c.rx_items().to_string(),
            c.tx_items().to_string(),
            format_iec(c.rx_bytes() as f64),
            format_iec(c.tx_bytes() as f64),
        ]);
    }
    table
}

pub fn stream_summary_table(rows: &[StreamSummary]) -> Table {
    let mut table = Table::new(
        "Streams",
        vec![
            "node", "stream", "workers", "rx net", "tx net", "rx int", "tx int", "rx items",
            "tx items",
        ],
    );
    for row in rows {
        let c = &row.counters;
        table.push(vec![
            label_or_dash(&row.label),
            row.stream_id.to_string(),
            row.instances.to_string(),
            format_iec(c.rx_net_bytes as f64),
            format_iec(c.tx_net_bytes as f64),
            format_iec(c.rx_int_bytes as f64),
            format_iec(c.tx_int_bytes as f64),
            c.rx_items().to_string(),
            c.tx_items().to_string(),
        ]);
    }
    table
}

pub fn file_table(rows: &[FileRecord]) -> Table {
    let mut table = Table::new("Files", vec!["node", "file", "host", "worker", "items", "bytes"]);
    for row in rows {
        table.push(vec![
            label_or_dash(&row.label),
            row.file_id.to_string(),
            rank(row.host_rank),
            rank(row.worker_rank),
            row.items.to_string(),
            format_iec(row.bytes as f64),
        ]);
    }
    table
}

pub fn stage_table(rows: &[StageEvent]) -> Table {
    let mut table = Table::new("Stages", vec!["node", "ts (ms)", "event", "targets"]);
    for row in rows {
        table.push(vec![
            row.label.clone(),
            format!("{:.3}", row.timestamp),
            row.phase.clone(),
            row.targets.join(" "),
        ]);
    }
    table
}

pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new("Summary", vec!["metric", "value"]);
    let bytes = |v: Option<f64>| v.map(format_iec);
    let rate = |v: Option<f64>| v.map(|v| format!("{}/s", format_iec(v)));
    let percent = |v: Option<f64>| v.map(|v| format!("{v:.2} %"));

    let rows = [
        ("Running time", summary.running_time_ms.map(|ms| format!("{:.3} s", ms / 1000.0))),
        ("CPU user+sys average", percent(summary.cpu_user_sys)),
        ("CPU user average", percent(summary.cpu_user)),
        ("TX+RX net total", bytes(summary.net_tx_rx_bytes)),
        ("TX net total", bytes(summary.net_tx_bytes)),
        ("RX net total", bytes(summary.net_rx_bytes)),
        ("TX+RX net average", rate(summary.net_tx_rx_speed)),
        ("TX net average", rate(summary.net_tx_speed)),
        ("RX net average", rate(summary.net_rx_speed)),
        ("I/O sys read+write", bytes(summary.diskstats_rd_wr_bytes)),
    ];
    for (name, value) in rows {
        table.push(vec![name.to_string(), value.unwrap_or_else(|| "n/a".to_string())]);
    }
    table
}

pub fn chart_table(charts: &[ChartSeries]) -> Table {
    let mut table = Table::new("Series", vec!["series", "unit", "buckets", "mean", "peak"]);
    for chart in charts {
        let count = chart.buckets.len();
        let mean = chart.buckets.iter().map(|b| b.mean).sum::<f64>() / count.max(1) as f64;
        let peak = chart.buckets.iter().map(|b| b.mean).fold(f64::NEG_INFINITY, f64::max);
        let (mean, peak) = if count == 0 {
            ("-".to_string(), "-".to_string())
        } else {
            (format!("{mean:.2}"), format!("{peak:.2}"))
        };
        table.push(vec![chart.name.clone(), chart.unit.clone(), count.to_string(), mean, peak]);
    }
    table
}

pub fn metric_key_table(keys: &BTreeMap<String, Vec<String>>) -> Table {
    let mut table = Table::new("Metric keys", vec!["category", "keys"]);
    for (category, names) in keys {
        table.push(vec![category.clone(), names.join(" ")]);
    }
    table
}

// ============================================================================
// RESULT lines
// ============================================================================

/// Column name of a chart in RESULT lines, e.g. "TX+RX net" -> "tx_rx_net"
fn result_key(name: &str) -> String {
    let mut key = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('_') && !key.is_empty() {
            key.push('_');
        }
    }
    key.trim_end_matches('_').to_string()
}

/// Tab-separated RESULT line per chart bucket
pub fn result_lines(title: &str, charts: &[ChartSeries]) -> String {
    let title = title.replace(char::is_whitespace, "_");
    let mut out = String::new();
    for chart in charts {
        let key = result_key(&chart.name);
        for bucket in &chart.buckets {
            out.push_str(&format!(
                "RESULT\ttitle={title}\tts={}\t{key}={}\n",
                bucket.start, bucket.mean
            ));
        }
    }
    out
}

// ============================================================================
// Report
// ============================================================================

/// What goes into a report
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Overrides the program name from the log
    pub title: Option<String>,
    pub bucket_ms: f64,
    /// Include per-instance stream and file rows
    pub detail: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub nodes: Vec<DataflowNode>,
    pub edges: Vec<(u64, u64)>,
    pub dot: String,
}

/// Every derived view of one event store
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub sources: Vec<String>,
    pub records: usize,
    pub graph: GraphView,
    pub summary: RunSummary,
    pub streams: Vec<StreamSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_detail: Option<Vec<StreamEdge>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileRecord>>,
    pub stages: Vec<StageEvent>,
    pub charts: Vec<ChartSeries>,
    /// Numeric keys found per profile category, empty categories left out
    pub metric_keys: BTreeMap<String, Vec<String>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn build(store: &EventStore, options: &ReportOptions) -> Result<Self, SeriesError> {
        let charts = resolve_all(store, DEFAULT_SERIES, options.bucket_ms)?;

        let build = reconstruct(store);
        let graph = build.graph;
        let mut diagnostics = store.diagnostics().to_vec();
        diagnostics.extend(build.diagnostics);

        let streams = stream_detail(store, &graph);
        diagnostics.extend(streams.diagnostics);
        let stages = stage_timeline(store, &graph);
        diagnostics.extend(stages.diagnostics);

        let file_rows = if options.detail {
            let files = file_detail(store, &graph);
            diagnostics.extend(files.diagnostics);
            Some(files.rows)
        } else {
            None
        };

        let metric_keys = categories::METRIC_SOURCES
            .iter()
            .map(|&category| (category.to_string(), available_keys(store, category)))
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(category, keys)| (category, keys.into_iter().collect()))
            .collect();

        let title = options
            .title
            .clone()
            .or_else(|| program_name(store))
            .unwrap_or_else(|| "unknown".to_string());

        let report = Self {
            title,
            sources: store.sources().to_vec(),
            records: store.len(),
            graph: GraphView {
                nodes: graph.nodes().cloned().collect(),
                edges: graph.edges().collect(),
                dot: to_dot(&graph),
            },
            summary: RunSummary::compute(store),
            streams: summarize(&streams.rows),
            stream_detail: options.detail.then_some(streams.rows),
            files: file_rows,
            stages: stages.rows,
            charts,
            metric_keys,
            diagnostics,
        };
        debug!(
            title = %report.title,
            charts = report.charts.len(),
            diagnostics = report.diagnostics.len(),
            "Report built"
        );
        Ok(report)
    }

    /// All tables, separated by blank lines
    pub fn to_text(&self) -> String {
        let mut tables = vec![summary_table(&self.summary), stream_summary_table(&self.streams)];
        if let Some(rows) = &self.stream_detail {
            tables.push(stream_detail_table(rows));
        }
        if let Some(rows) = &self.files {
            tables.push(file_table(rows));
        }
        tables.push(stage_table(&self.stages));
        tables.push(chart_table(&self.charts));
        tables.push(metric_key_table(&self.metric_keys));

        let mut out = format!(
            "{}: {} records from {} source(s), {} diagnostic(s)\n\n",
            self.title,
            self.records,
            self.sources.len(),
            self.diagnostics.len()
        );
        let body: Vec<String> = tables.iter().map(Table::to_string).collect();
        out.push_str(&body.join("\n"));
        out
    }

    /// Summary RESULT line followed by the per-bucket series lines
    pub fn to_result_lines(&self) -> String {
        let mut out = self.summary.result_line(&self.title);
        out.push('\n');
        out.push_str(&result_lines(&self.title, &self.charts));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Bucket;
    use crate::core::series::Axis;
    use std::io::Cursor;

    const LOG: &str = concat!(
        r#"{"ts":0,"host_rank":0,"class":"Cmdline","event":"start","program":"wc"}"#, "\n",
        r#"{"ts":10,"host_rank":0,"worker_rank":0,"class":"DIA","event":"create","id":1,"label":"ReadLines","parents":[]}"#, "\n",
        r#"{"ts":20,"host_rank":0,"worker_rank":0,"class":"DIA","event":"create","id":2,"label":"ReduceByKey","parents":[1]}"#, "\n",
        r#"{"ts":30,"host_rank":0,"worker_rank":0,"class":"Stream","event":"close","id":5,"dia_id":2,"rx_net_items":1,"tx_net_items":1,"rx_net_bytes":2048,"tx_net_bytes":0,"rx_net_blocks":1,"tx_net_blocks":0,"rx_int_items":0,"tx_int_items":0,"rx_int_bytes":0,"tx_int_bytes":0,"rx_int_blocks":0,"tx_int_blocks":0}"#, "\n",
        r#"{"ts":40,"host_rank":0,"worker_rank":0,"class":"File","event":"close","id":3,"dia_id":9,"items":4,"bytes":40}"#, "\n",
        r#"{"ts":500000,"host_rank":0,"class":"LinuxProcStats","event":"profile","cpu_user":10,"cpu_sys":5}"#, "\n",
        r#"{"ts":1500000,"host_rank":0,"class":"LinuxProcStats","event":"profile","cpu_user":30,"cpu_sys":5}"#, "\n",
    );

    fn options(detail: bool) -> ReportOptions {
        ReportOptions { title: None, bucket_ms: 1000.0, detail }
    }

    #[test]
    fn test_format_iec() {
        assert_eq!(format_iec(512.0), "512 B");
        assert_eq!(format_iec(1536.0), "1.50 KiB");
        assert_eq!(format_iec(3.0 * 1024.0 * 1024.0), "3.00 MiB");
    }

    #[test]
    fn test_table_alignment() {
        let mut table = Table::new("T", vec!["name", "n"]);
        table.push(vec!["a".into(), "100".into()]);
        table.push(vec!["long".into(), "2".into()]);
        assert_eq!(table.to_string(), "== T ==\nname    n\na     100\nlong    2\n");
    }

    #[test]
    fn test_empty_table() {
        let table = Table::new("Files", vec!["node"]);
        assert_eq!(table.to_string(), "== Files ==\nnode\n(none)\n");
    }

    #[test]
    fn test_result_key() {
        assert_eq!(result_key("TX+RX net"), "tx_rx_net");
        assert_eq!(result_key("CPU"), "cpu");
        assert_eq!(result_key("I/O sys read"), "i_o_sys_read");
    }

    #[test]
    fn test_result_lines() {
        let charts = vec![ChartSeries {
            name: "CPU".into(),
            unit: "%".into(),
            axis: Axis::Percent,
            visible: true,
            buckets: vec![Bucket { start: 0.0, mean: 15.0 }, Bucket { start: 1000.0, mean: 35.0 }],
        }];
        assert_eq!(
            result_lines("my job", &charts),
            "RESULT\ttitle=my_job\tts=0\tcpu=15\nRESULT\ttitle=my_job\tts=1000\tcpu=35\n"
        );
    }

    #[test]
    fn test_report_build() {
        let store = EventStore::from_reader("test", Cursor::new(LOG));
        let report = Report::build(&store, &options(true)).unwrap();

        assert_eq!(report.title, "wc");
        assert_eq!(report.graph.edges, vec![(1, 2)]);
        assert_eq!(report.streams.len(), 1);
        assert_eq!(report.streams[0].label.as_deref(), Some("ReduceByKey.2"));
        assert_eq!(report.files.as_ref().map(Vec::len), Some(1));
        // the file references node 9, which was never created
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.charts[0].name, "CPU");
        assert_eq!(report.charts[0].buckets.len(), 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"]["cpu_user"], 20.0);
        assert_eq!(json["diagnostics"][0]["kind"], "unresolved_reference");
    }

    #[test]
    fn test_report_without_detail_and_title_override() {
        let store = EventStore::from_reader("test", Cursor::new(LOG));
        let opts = ReportOptions { title: Some("override".into()), ..options(false) };
        let report = Report::build(&store, &opts).unwrap();

        assert_eq!(report.title, "override");
        assert!(report.files.is_none());
        assert!(report.diagnostics.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("files").is_none());

        let text = report.to_text();
        assert!(text.starts_with("override: 7 records from 1 source(s), 0 diagnostic(s)\n"));
        assert!(text.contains("== Streams =="));
        assert!(text.contains("ReduceByKey.2"));
        assert!(!text.contains("== Files =="));
    }

    #[test]
    fn test_report_rejects_bad_width() {
        let store = EventStore::from_reader("test", Cursor::new(LOG));
        let opts = ReportOptions { bucket_ms: 0.0, ..options(false) };
        assert!(Report::build(&store, &opts).is_err());
    }

    #[test]
    fn test_result_text_leads_with_summary() {
        let store = EventStore::from_reader("test", Cursor::new(LOG));
        let report = Report::build(&store, &options(false)).unwrap();
        let text = report.to_result_lines();
        assert!(text.starts_with("RESULT title=wc running_time=1.5 "));
        assert!(text.contains("RESULT\ttitle=wc\tts=0\tcpu=15\n"));
    }

    #[test]
    fn test_stream_diagnostics_reported_once_with_detail() {
        let log = concat!(
            r#"{"ts":1,"host_rank":0,"worker_rank":0,"class":"Stream","event":"close","id":5,"dia_id":42,"rx_net_bytes":1}"#, "\n",
            r#"{"ts":2,"host_rank":0,"class":"NetManager","event":"profile","tx_speed":3,"rx_speed":4}"#, "\n",
        );
        let store = EventStore::from_reader("test", Cursor::new(log));
        let report = Report::build(&store, &options(true)).unwrap();

        let unresolved = report
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::UnresolvedReference { .. }))
            .count();
        let gaps = report.diagnostics.iter().filter(|d| d.kind() == "schema_gap").count();
        assert_eq!(unresolved, 1);
        assert_eq!(gaps, 1);
        assert_eq!(report.streams.len(), 1);
        assert_eq!(report.stream_detail.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_metric_keys_listed_per_category() {
        let store = EventStore::from_reader("test", Cursor::new(LOG));
        let report = Report::build(&store, &options(false)).unwrap();

        assert_eq!(report.metric_keys.len(), 1);
        assert_eq!(
            report.metric_keys["LinuxProcStats"],
            vec!["cpu_sys".to_string(), "cpu_user".to_string()]
        );
        assert!(report.to_text().contains("LinuxProcStats  cpu_sys cpu_user"));
    }
}
