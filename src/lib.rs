//! Offline profiler for distributed dataflow jobs
//!
//! Reads the newline-delimited JSON event logs written by each host of a
//! run and derives:
//! - the operator graph, exportable as Graphviz DOT
//! - per-stream transfer and per-node file statistics
//! - bucketized time series of any profile metric
//! - a run summary and stage timeline

pub mod core;
pub mod error;
pub mod render;
pub mod theme;
pub mod time;

#[cfg(feature = "cli")]
pub mod config;
#[cfg(feature = "cli")]
pub mod service;

pub use crate::core::EventStore;
pub use error::{Diagnostic, IngestError, SeriesError};
