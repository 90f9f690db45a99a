//! File statistics per dataflow node
//!
//! Same join as the stream tables, over `File` close records. Files that
//! never held an item are left out.

use serde::Serialize;
use tracing::debug;

use super::data::EventStore;
use super::events::{categories, fields, phases};
use super::graph::DataflowGraph;
use super::streams::{counter, report_missing, resolve_label, JoinedRows};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_id: u64,
    pub node_id: u64,
    /// "{label}.{id}" of the owning node, None when unresolved
    pub label: Option<String>,
    pub host_rank: Option<u64>,
    pub worker_rank: Option<u64>,
    pub items: u64,
    pub bytes: u64,
}

/// Files with `items > 0`, ordered by (node, file, host)
pub fn file_detail(store: &EventStore, graph: &DataflowGraph) -> JoinedRows<FileRecord> {
    let mut joined = JoinedRows::default();
    let mut empty = 0usize;

    for record in store.select(categories::FILE, phases::CLOSE) {
        let mut missing = Vec::new();
        let file_id = record.uint(fields::ID);
        let node_id = record.uint(fields::NODE_REF);
        let items = counter(record, fields::ITEMS, &mut missing);
        let bytes = counter(record, fields::BYTES, &mut missing);

        let (Some(file_id), Some(node_id)) = (file_id, node_id) else {
            counter(record, fields::ID, &mut missing);
            counter(record, fields::NODE_REF, &mut missing);
            report_missing(record, missing, &mut joined.diagnostics);
            continue;
        };
        report_missing(record, missing, &mut joined.diagnostics);

        if items == 0 {
            empty += 1;
            continue;
        }

        let label = resolve_label(graph, "file", file_id, node_id, &mut joined.diagnostics);

        joined.rows.push(FileRecord {
            file_id,
            node_id,
            label,
            host_rank: record.host_rank,
            worker_rank: record.worker_rank,
            items,
            bytes,
        });
    }

    joined
        .rows
        .sort_by_key(|r| (r.node_id, r.file_id, r.host_rank));

    debug!(
        rows = joined.rows.len(),
        empty,
        unresolved = joined.unresolved(),
        "File detail built"
    );
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::reconstruct;
    use crate::error::Diagnostic;
    use std::io::Cursor;

    fn detail(log: &str) -> JoinedRows<FileRecord> {
        let store = EventStore::from_reader("test", Cursor::new(log.to_string()));
        let graph = reconstruct(&store).graph;
        file_detail(&store, &graph)
    }

    #[test]
    fn test_files_without_items_excluded() {
        let rows = detail(concat!(
            r#"{"ts":1,"worker_rank":0,"class":"DIA","event":"create","id":4,"label":"Sort","parents":[]}"#, "\n",
            r#"{"ts":2,"host_rank":0,"class":"File","event":"close","id":10,"dia_id":4,"items":0,"bytes":0}"#, "\n",
            r#"{"ts":3,"host_rank":0,"class":"File","event":"close","id":11,"dia_id":4,"items":5,"bytes":50}"#, "\n",
            r#"{"ts":4,"host_rank":1,"class":"File","event":"close","id":12,"dia_id":4,"items":0,"bytes":8}"#, "\n",
            r#"{"ts":5,"host_rank":1,"class":"File","event":"close","id":13,"dia_id":4,"items":3,"bytes":30}"#, "\n",
        ));

        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows.iter().map(|r| r.items).collect::<Vec<_>>(), vec![5, 3]);
        assert!(rows.rows.iter().all(|r| r.label.as_deref() == Some("Sort.4")));
        assert!(rows.diagnostics.is_empty());
    }

    #[test]
    fn test_ordering_by_node_file_host() {
        let rows = detail(concat!(
            r#"{"ts":1,"host_rank":1,"class":"File","event":"close","id":2,"dia_id":8,"items":1,"bytes":1}"#, "\n",
            r#"{"ts":2,"host_rank":0,"class":"File","event":"close","id":2,"dia_id":8,"items":1,"bytes":1}"#, "\n",
            r#"{"ts":3,"host_rank":0,"class":"File","event":"close","id":5,"dia_id":3,"items":1,"bytes":1}"#, "\n",
        ));

        let keys: Vec<_> = rows.rows.iter().map(|r| (r.node_id, r.file_id, r.host_rank)).collect();
        assert_eq!(keys, vec![(3, 5, Some(0)), (8, 2, Some(0)), (8, 2, Some(1))]);
        // no graph: every row is unresolved but kept
        assert_eq!(rows.unresolved(), 3);
        assert!(rows.rows.iter().all(|r| r.label.is_none()));
    }

    #[test]
    fn test_missing_items_counts_as_empty() {
        let rows = detail(r#"{"ts":1,"class":"File","event":"close","id":1,"dia_id":1,"bytes":9}"#);
        assert!(rows.rows.is_empty());
        assert!(matches!(
            &rows.diagnostics[..],
            [Diagnostic::SchemaGap { fields, .. }] if fields == &vec!["items".to_string()]
        ));
    }
}
