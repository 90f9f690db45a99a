//! Platform-agnostic core: ingestion, the event store and derived views

pub mod data;
pub mod events;
pub mod export;
pub mod files;
pub mod flatten;
pub mod graph;
pub mod parser;
pub mod series;
pub mod streams;
pub mod summary;

pub use data::EventStore;
pub use events::{category_group, EventRecord, FieldValue, CATEGORY_GROUPS};
pub use export::{classify, to_dot, NodeClass};
pub use files::{file_detail, FileRecord};
pub use graph::{reconstruct, DataflowGraph, DataflowNode, GraphBuild};
pub use parser::{ingest_file, ingest_reader, SourceBatch};
pub use series::{
    available_keys, bucketize, resolve_all, series, series_sum, Bucket, ChartSeries, MetricSeries,
    SeriesLookup, SeriesSpec, DEFAULT_BUCKET_MS, DEFAULT_SERIES,
};
pub use streams::{
    stream_detail, stream_summary, summarize, JoinedRows, StreamEdge, StreamSummary,
};
pub use summary::{program_name, stage_timeline, RunSummary, StageEvent};
