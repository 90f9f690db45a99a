//! Time series over profile records
//!
//! Metric keys are discovered from the log, not known in advance. Asking for
//! a key that never appears is a normal outcome and yields
//! `SeriesLookup::Absent` rather than a zero line.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, trace};

use super::data::EventStore;
use super::events::categories::{BLOCK_POOL, LINUX_PROC_STATS, MEM_PROFILE, NET_MANAGER};
use super::events::{phases, EventRecord};
use crate::error::SeriesError;
use crate::time::{bucket_index, bucket_start};
use self::Metric::{Key, Sum};

/// Default bucket width in milliseconds
pub const DEFAULT_BUCKET_MS: f64 = 1000.0;

/// Ordered (timestamp, value) points of one metric
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricSeries {
    pub points: Vec<(f64, f64)>,
}

impl MetricSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Arithmetic mean of all values
    pub fn mean(&self) -> Option<f64> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.total() / self.points.len() as f64)
    }

    pub fn total(&self) -> f64 {
        self.points.iter().map(|(_, v)| v).sum()
    }
}

/// Outcome of a series lookup
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesLookup {
    Present(MetricSeries),
    /// The key was never observed for the category
    Absent,
}

impl SeriesLookup {
    pub fn is_present(&self) -> bool {
        matches!(self, SeriesLookup::Present(_))
    }

    pub fn as_series(&self) -> Option<&MetricSeries> {
        match self {
            SeriesLookup::Present(series) => Some(series),
            SeriesLookup::Absent => None,
        }
    }

    /// The series, or an empty one when absent
    pub fn into_series(self) -> MetricSeries {
        match self {
            SeriesLookup::Present(series) => series,
            SeriesLookup::Absent => MetricSeries::default(),
        }
    }
}

/// Finite numeric value of a key, skipping NaN/inf and non-numbers
fn finite(record: &EventRecord, key: &str) -> Option<f64> {
    record.number(key).filter(|v| v.is_finite())
}

/// Plain series of `key` over profile records of `category`
pub fn series(store: &EventStore, category: &str, key: &str) -> SeriesLookup {
    let mut seen = false;
    let mut points = Vec::new();

    for record in store.select(category, phases::PROFILE) {
        if record.get(key).is_none() {
            continue;
        }
        seen = true;
        if let Some(value) = finite(record, key) {
            points.push((record.timestamp, value));
        }
    }

    if !seen {
        debug!(category, key, "Metric key never observed");
        return SeriesLookup::Absent;
    }
    trace!(category, key, points = points.len(), "Series extracted");
    SeriesLookup::Present(MetricSeries { points })
}

/// Pointwise sum of two keys over records carrying both
///
/// Absent if either key never appears for the category.
pub fn series_sum(store: &EventStore, category: &str, key_a: &str, key_b: &str) -> SeriesLookup {
    let mut seen_a = false;
    let mut seen_b = false;
    let mut points = Vec::new();

    for record in store.select(category, phases::PROFILE) {
        seen_a |= record.get(key_a).is_some();
        seen_b |= record.get(key_b).is_some();
        if let (Some(a), Some(b)) = (finite(record, key_a), finite(record, key_b)) {
            points.push((record.timestamp, a + b));
        }
    }

    if !(seen_a && seen_b) {
        debug!(category, key_a, key_b, seen_a, seen_b, "Summed series incomplete");
        return SeriesLookup::Absent;
    }
    SeriesLookup::Present(MetricSeries { points })
}

/// Mean value of one fixed-width window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bucket {
    /// Window start (ms)
    pub start: f64,
    pub mean: f64,
}

/// Average a series over left-closed windows of `width_ms`
///
/// Empty windows are omitted. Buckets come out in ascending order. A width
/// so small that a window index leaves the i64 range is an error.
pub fn bucketize(series: &MetricSeries, width_ms: f64) -> Result<Vec<Bucket>, SeriesError> {
    if !(width_ms.is_finite() && width_ms > 0.0) {
        return Err(SeriesError::InvalidWidth(width_ms));
    }

    let mut windows: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for &(t, v) in &series.points {
        let index = bucket_index(t, width_ms).ok_or(SeriesError::WidthTooSmall {
            width: width_ms,
            timestamp: t,
        })?;
        let slot = windows.entry(index).or_insert((0.0, 0));
        slot.0 += v;
        slot.1 += 1;
    }

    Ok(windows
        .into_iter()
        .map(|(index, (sum, count))| Bucket {
            start: bucket_start(index, width_ms),
            mean: sum / count as f64,
        })
        .collect())
}

/// Numeric keys observed in profile records of `category`
pub fn available_keys(store: &EventStore, category: &str) -> BTreeSet<String> {
    store
        .select(category, phases::PROFILE)
        .flat_map(|r| r.fields.iter())
        .filter(|(_, value)| value.as_f64().is_some())
        .map(|(key, _)| key.clone())
        .collect()
}

// ============================================================================
// Chart catalog
// ============================================================================

/// What a chart plots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Key(&'static str),
    Sum(&'static str, &'static str),
}

/// Y axis a chart belongs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Percent,
    Rate,
    Bytes,
}

/// A named chart of the standard profile view
#[derive(Debug, Clone, Copy)]
pub struct SeriesSpec {
    pub name: &'static str,
    pub category: &'static str,
    pub metric: Metric,
    pub unit: &'static str,
    pub axis: Axis,
    /// Shown by default in renderers
    pub visible: bool,
}

const fn spec(
    name: &'static str,
    category: &'static str,
    metric: Metric,
    unit: &'static str,
    axis: Axis,
    visible: bool,
) -> SeriesSpec {
    SeriesSpec { name, category, metric, unit, axis, visible }
}

pub const DEFAULT_SERIES: &[SeriesSpec] = &[
    // CPU
    spec("CPU", LINUX_PROC_STATS, Sum("cpu_user", "cpu_sys"), "%", Axis::Percent, true),
    spec("CPU User", LINUX_PROC_STATS, Key("cpu_user"), "%", Axis::Percent, false),
    spec("CPU Sys", LINUX_PROC_STATS, Key("cpu_sys"), "%", Axis::Percent, false),
    spec("Mem RSS", LINUX_PROC_STATS, Key("pr_rss"), "B", Axis::Bytes, false),
    // Network
    spec("TX+RX net", NET_MANAGER, Sum("tx_speed", "rx_speed"), "B/s", Axis::Rate, true),
    spec("TX net", NET_MANAGER, Key("tx_speed"), "B/s", Axis::Rate, false),
    spec("RX net", NET_MANAGER, Key("rx_speed"), "B/s", Axis::Rate, false),
    spec("TX+RX sys net", LINUX_PROC_STATS, Sum("net_tx_speed", "net_rx_speed"), "B/s", Axis::Rate, true),
    spec("TX sys net", LINUX_PROC_STATS, Key("net_tx_speed"), "B/s", Axis::Rate, false),
    spec("RX sys net", LINUX_PROC_STATS, Key("net_rx_speed"), "B/s", Axis::Rate, false),
    // Disk
    spec("I/O sys", LINUX_PROC_STATS, Sum("diskstats_rd_bytes", "diskstats_wr_bytes"), "B/s", Axis::Rate, true),
    spec("I/O sys read", LINUX_PROC_STATS, Key("diskstats_rd_bytes"), "B/s", Axis::Rate, false),
    spec("I/O sys write", LINUX_PROC_STATS, Key("diskstats_wr_bytes"), "B/s", Axis::Rate, false),
    // Block pool
    spec("Data bytes", BLOCK_POOL, Key("total_bytes"), "B", Axis::Bytes, true),
    spec("RAM bytes", BLOCK_POOL, Key("ram_bytes"), "B", Axis::Bytes, true),
    spec("Reading bytes", BLOCK_POOL, Key("reading_bytes"), "B", Axis::Bytes, false),
    spec("Writing bytes", BLOCK_POOL, Key("writing_bytes"), "B", Axis::Bytes, false),
    spec("Pinned bytes", BLOCK_POOL, Key("pinned_bytes"), "B", Axis::Bytes, false),
    spec("Unpinned bytes", BLOCK_POOL, Key("unpinned_bytes"), "B", Axis::Bytes, false),
    spec("Swapped bytes", BLOCK_POOL, Key("swapped_bytes"), "B", Axis::Bytes, true),
    spec("I/O read", BLOCK_POOL, Key("rd_speed"), "B/s", Axis::Rate, true),
    spec("I/O write", BLOCK_POOL, Key("wr_speed"), "B/s", Axis::Rate, true),
    // Memory profile
    spec("Mem Total", MEM_PROFILE, Key("total"), "B", Axis::Bytes, false),
    spec("Mem Float", MEM_PROFILE, Key("float"), "B", Axis::Bytes, false),
    spec("Mem Base", MEM_PROFILE, Key("base"), "B", Axis::Bytes, false),
];

/// A bucketized chart ready for a renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub unit: String,
    pub axis: Axis,
    pub visible: bool,
    pub buckets: Vec<Bucket>,
}

/// Resolve one chart; Ok(None) when its metric is absent from the store
pub fn resolve_spec(
    store: &EventStore,
    spec: &SeriesSpec,
    width_ms: f64,
) -> Result<Option<ChartSeries>, SeriesError> {
    let lookup = match spec.metric {
        Key(key) => series(store, spec.category, key),
        Sum(a, b) => series_sum(store, spec.category, a, b),
    };
    let SeriesLookup::Present(points) = lookup else {
        return Ok(None);
    };

    Ok(Some(ChartSeries {
        name: spec.name.to_string(),
        unit: spec.unit.to_string(),
        axis: spec.axis,
        visible: spec.visible,
        buckets: bucketize(&points, width_ms)?,
    }))
}

/// Resolve every chart whose metric is present
pub fn resolve_all(
    store: &EventStore,
    specs: &[SeriesSpec],
    width_ms: f64,
) -> Result<Vec<ChartSeries>, SeriesError> {
    let mut charts = Vec::new();
    for spec in specs {
        if let Some(chart) = resolve_spec(store, spec, width_ms)? {
            charts.push(chart);
        }
    }
    debug!(requested = specs.len(), resolved = charts.len(), "Charts resolved");
    Ok(charts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store(input: &str) -> EventStore {
        EventStore::from_reader("test", Cursor::new(input.to_string()))
    }

    /// Profile points at t = 0, 50, 150, 260 ms with values 1..4
    const PROC: &str = concat!(
        r#"{"ts":0,"class":"LinuxProcStats","event":"profile","cpu_user":1,"cpu_sys":10}"#, "\n",
        r#"{"ts":50000,"class":"LinuxProcStats","event":"profile","cpu_user":2,"cpu_sys":20}"#, "\n",
        r#"{"ts":150000,"class":"LinuxProcStats","event":"profile","cpu_user":3}"#, "\n",
        r#"{"ts":260000,"class":"LinuxProcStats","event":"profile","cpu_user":4,"cpu_sys":40}"#, "\n",
    );

    #[test]
    fn test_series_points() {
        let s = store(PROC);
        let series = series(&s, "LinuxProcStats", "cpu_user").into_series();
        assert_eq!(series.points, vec![(0.0, 1.0), (50.0, 2.0), (150.0, 3.0), (260.0, 4.0)]);
    }

    #[test]
    fn test_bucketize_width_100() {
        let s = store(PROC);
        let series = series(&s, "LinuxProcStats", "cpu_user").into_series();
        let buckets = bucketize(&series, 100.0).unwrap();
        assert_eq!(
            buckets,
            vec![
                Bucket { start: 0.0, mean: 1.5 },
                Bucket { start: 100.0, mean: 3.0 },
                Bucket { start: 200.0, mean: 4.0 },
            ]
        );
    }

    #[test]
    fn test_bucketize_rejects_bad_width() {
        let series = MetricSeries::default();
        assert_eq!(bucketize(&series, 0.0), Err(SeriesError::InvalidWidth(0.0)));
        assert!(bucketize(&series, -5.0).is_err());
        assert!(bucketize(&series, f64::NAN).is_err());
        assert_eq!(bucketize(&series, 10.0), Ok(vec![]));
    }

    #[test]
    fn test_bucketize_rejects_width_too_small_for_timestamps() {
        let series = MetricSeries { points: vec![(1e7, 1.0), (2e7, 3.0)] };
        assert_eq!(
            bucketize(&series, 1e-12),
            Err(SeriesError::WidthTooSmall { width: 1e-12, timestamp: 1e7 })
        );
        assert_eq!(bucketize(&series, 1e-6).unwrap().len(), 2);
    }

    #[test]
    fn test_series_sum_skips_partial_records() {
        let s = store(PROC);
        let sum = series_sum(&s, "LinuxProcStats", "cpu_user", "cpu_sys").into_series();
        assert_eq!(sum.points, vec![(0.0, 11.0), (50.0, 22.0), (260.0, 44.0)]);
    }

    #[test]
    fn test_absent_key() {
        let s = store(PROC);
        assert_eq!(series(&s, "LinuxProcStats", "cpu_steal"), SeriesLookup::Absent);
        assert_eq!(series(&s, "NetManager", "cpu_user"), SeriesLookup::Absent);
        assert!(series(&s, "LinuxProcStats", "cpu_steal").into_series().is_empty());
    }

    #[test]
    fn test_series_sum_with_missing_key_is_absent() {
        let s = store(PROC);
        let lookup = series_sum(&s, "LinuxProcStats", "cpu_user", "no_such_key");
        assert_eq!(lookup, SeriesLookup::Absent);
        assert!(lookup.into_series().is_empty());
    }

    #[test]
    fn test_non_numeric_values_skipped() {
        let s = store(concat!(
            r#"{"ts":0,"class":"NetManager","event":"profile","tx_speed":"fast"}"#, "\n",
            r#"{"ts":1000,"class":"NetManager","event":"profile","tx_speed":5}"#, "\n",
        ));
        let lookup = series(&s, "NetManager", "tx_speed");
        assert!(lookup.is_present());
        assert_eq!(lookup.as_series().unwrap().points, vec![(1.0, 5.0)]);
    }

    #[test]
    fn test_available_keys() {
        let s = store(PROC);
        let keys = available_keys(&s, "LinuxProcStats");
        assert!(keys.contains("cpu_user"));
        assert!(keys.contains("cpu_sys"));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_resolve_all_skips_absent_charts() {
        let s = store(PROC);
        let charts = resolve_all(&s, DEFAULT_SERIES, 100.0).unwrap();
        let names: Vec<&str> = charts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["CPU", "CPU User", "CPU Sys"]);
        assert_eq!(charts[1].buckets.len(), 3);
    }

    #[test]
    fn test_mean_of_series() {
        let series = MetricSeries { points: vec![(0.0, 2.0), (1.0, 4.0)] };
        assert_eq!(series.mean(), Some(3.0));
        assert_eq!(MetricSeries::default().mean(), None);
    }
}
