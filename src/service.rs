//! Concurrent loading and snapshot publication
//!
//! Every source file is read on its own blocking task. Readers never see a
//! store change under them: a refresh builds a new store and swaps the
//! published `Arc`.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use crate::core::{ingest_file, EventStore};
use crate::error::{IngestError, InputFailure};
use crate::time::now_seconds;

/// Read all paths concurrently and merge them in the given order
///
/// Fails only when no path is given or none can be read.
pub async fn load_sources(paths: &[PathBuf]) -> Result<EventStore, IngestError> {
    if paths.is_empty() {
        return Err(IngestError::NoInputs);
    }

    let started = now_seconds();
    let tasks = paths.iter().cloned().map(|path| {
        spawn_blocking(move || {
            let result = ingest_file(&path);
            (path, result)
        })
    });

    let mut batches = Vec::with_capacity(paths.len());
    let mut failures = Vec::new();
    for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
        match joined {
            Ok((_, Ok(batch))) => batches.push(batch),
            Ok((path, Err(e))) => failures.push(InputFailure { path, reason: e.to_string() }),
            Err(e) => failures.push(InputFailure {
                path: paths[index].clone(),
                reason: format!("reader task failed: {e}"),
            }),
        }
    }

    for failure in &failures {
        warn!(path = %failure.path.display(), reason = %failure.reason, "Input skipped");
    }
    if batches.is_empty() {
        return Err(IngestError::NoReadableInput { failures });
    }

    let store = EventStore::from_batches(batches);
    debug!(
        sources = store.sources().len(),
        skipped = failures.len(),
        elapsed_ms = (now_seconds() - started) * 1000.0,
        "Sources loaded"
    );
    Ok(store)
}

/// Publishes the latest event store built from a fixed set of paths
pub struct SnapshotService {
    paths: Vec<PathBuf>,
    tx: watch::Sender<Arc<EventStore>>,
}

impl SnapshotService {
    /// Load the initial snapshot
    pub async fn start(paths: Vec<PathBuf>) -> Result<Self, IngestError> {
        let store = load_sources(&paths).await?;
        let (tx, _rx) = watch::channel(Arc::new(store));
        Ok(Self { paths, tx })
    }

    /// The currently published snapshot
    pub fn current(&self) -> Arc<EventStore> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every successful refresh
    pub fn subscribe(&self) -> watch::Receiver<Arc<EventStore>> {
        self.tx.subscribe()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Re-read all sources and publish the result
    ///
    /// On failure the previous snapshot stays published.
    pub async fn refresh(&self) -> Result<Arc<EventStore>, IngestError> {
        let store = Arc::new(load_sources(&self.paths).await?);
        let previous = self.tx.send_replace(Arc::clone(&store));
        info!(
            records = store.len(),
            previous = previous.len(),
            "Snapshot refreshed"
        );
        Ok(store)
    }
}
