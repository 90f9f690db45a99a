//! Dataflow graph reconstruction
//!
//! Every operator is instantiated once per worker, so each logs one
//! `create` record per worker. The graph keeps one node per operator,
//! defined by the record of worker rank 0.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, trace};

use super::data::EventStore;
use super::events::{categories, fields, phases, EventRecord};
use crate::error::Diagnostic;

/// One logical operator of the dataflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataflowNode {
    pub id: u64,
    /// Operator name, e.g. "ReduceByKey"
    pub label: String,
    /// Operator type as logged (DOp, LOp, Action, ...)
    pub kind: Option<String>,
    /// Parents in the order the runtime listed them
    pub parent_ids: Vec<u64>,
}

impl DataflowNode {
    /// Human-readable "{label}.{id}" name
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.label, self.id)
    }
}

/// Reconstructed operator graph keyed by node id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataflowGraph {
    nodes: BTreeMap<u64, DataflowNode>,
}

impl DataflowGraph {
    pub fn get(&self, id: u64) -> Option<&DataflowNode> {
        self.nodes.get(&id)
    }

    /// Nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &DataflowNode> {
        self.nodes.values()
    }

    /// (parent, child) pairs: children ascending, parents in listed order
    pub fn edges(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.nodes
            .values()
            .flat_map(|node| node.parent_ids.iter().map(move |&parent| (parent, node.id)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Result of graph reconstruction
#[derive(Debug, Clone, Default)]
pub struct GraphBuild {
    pub graph: DataflowGraph,
    pub diagnostics: Vec<Diagnostic>,
}

fn is_definition(record: &EventRecord) -> bool {
    record.phase == phases::CREATE
        && record.worker_rank == Some(0)
        && categories::NODE.contains(&record.category.as_str())
}

/// Derive the operator graph from node creation records
///
/// An id that reappears with a different label keeps its first definition
/// and yields one conflict diagnostic. An empty graph is a valid result.
pub fn reconstruct(store: &EventStore) -> GraphBuild {
    let mut build = GraphBuild::default();

    for record in store.records().iter().filter(|r| is_definition(r)) {
        let Some(id) = record.uint(fields::ID).or_else(|| record.uint(fields::NODE_REF)) else {
            build.diagnostics.push(
                Diagnostic::SchemaGap {
                    context: record.describe(),
                    fields: vec![fields::ID.to_string()],
                }
                .emitted(),
            );
            continue;
        };

        let label = match record.text(fields::LABEL) {
            Some(label) => label.to_string(),
            None => {
                build.diagnostics.push(
                    Diagnostic::SchemaGap {
                        context: record.describe(),
                        fields: vec![fields::LABEL.to_string()],
                    }
                    .emitted(),
                );
                String::new()
            }
        };

        match build.graph.nodes.entry(id) {
            Entry::Vacant(slot) => {
                let node = DataflowNode {
                    id,
                    label,
                    kind: record.text(fields::KIND).map(str::to_string),
                    parent_ids: record.ids(fields::PARENTS),
                };
                trace!(id, label = %node.label, parents = ?node.parent_ids, "Node defined");
                slot.insert(node);
            }
            Entry::Occupied(existing) if existing.get().label != label => {
                build.diagnostics.push(
                    Diagnostic::NodeIdConflict {
                        id,
                        kept: existing.get().label.clone(),
                        rejected: label,
                    }
                    .emitted(),
                );
            }
            Entry::Occupied(_) => {
                trace!(id, "Duplicate node definition ignored");
            }
        }
    }

    debug!(
        nodes = build.graph.len(),
        edges = build.graph.edges().count(),
        diagnostics = build.diagnostics.len(),
        "Graph reconstructed"
    );
    build
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn store(input: &str) -> EventStore {
        EventStore::from_reader("test", Cursor::new(input.to_string()))
    }

    const CHAIN: &str = concat!(
        r#"{"ts":1,"host_rank":0,"worker_rank":0,"class":"DIA","event":"create","id":1,"label":"Generate","type":"DOp","parents":[]}"#, "\n",
        r#"{"ts":2,"host_rank":0,"worker_rank":1,"class":"DIA","event":"create","id":1,"label":"Generate","type":"DOp","parents":[]}"#, "\n",
        r#"{"ts":3,"host_rank":0,"worker_rank":0,"class":"DIA","event":"create","id":2,"label":"Map","type":"LOp","parents":[1]}"#, "\n",
        r#"{"ts":4,"host_rank":0,"worker_rank":0,"class":"DIABase","event":"create","id":3,"label":"Zip","type":"DOp","parents":[1,2]}"#, "\n",
    );

    #[test]
    fn test_one_node_per_operator() {
        let build = reconstruct(&store(CHAIN));
        assert!(build.diagnostics.is_empty());
        assert_eq!(build.graph.len(), 3);

        let zip = build.graph.get(3).unwrap();
        assert_eq!(zip.label, "Zip");
        assert_eq!(zip.kind.as_deref(), Some("DOp"));
        assert_eq!(zip.parent_ids, vec![1, 2]);
        assert_eq!(zip.display_name(), "Zip.3");
    }

    #[test]
    fn test_edges_follow_parent_order() {
        let build = reconstruct(&store(CHAIN));
        let edges: Vec<(u64, u64)> = build.graph.edges().collect();
        assert_eq!(edges, vec![(1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_reconstruct_is_idempotent() {
        let s = store(CHAIN);
        let first = reconstruct(&s);
        let second = reconstruct(&s);
        assert_eq!(first.graph, second.graph);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_conflicting_label_keeps_first() {
        let s = store(concat!(
            r#"{"ts":1,"worker_rank":0,"class":"DIA","event":"create","id":7,"label":"Sort","parents":[]}"#, "\n",
            r#"{"ts":2,"worker_rank":0,"class":"DIA","event":"create","id":7,"label":"Merge","parents":[]}"#, "\n",
        ));

        let build = reconstruct(&s);
        assert_eq!(build.graph.get(7).unwrap().label, "Sort");
        let conflicts: Vec<_> = build
            .diagnostics
            .iter()
            .filter(|d| matches!(d, Diagnostic::NodeIdConflict { .. }))
            .collect();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts[0],
            &Diagnostic::NodeIdConflict { id: 7, kept: "Sort".into(), rejected: "Merge".into() }
        );
    }

    #[test]
    fn test_empty_graph_without_creation_events() {
        let s = store(r#"{"ts":1,"class":"NetManager","event":"profile","tx_speed":1}"#);
        let build = reconstruct(&s);
        assert!(build.graph.is_empty());
        assert!(build.diagnostics.is_empty());
    }

    #[test]
    fn test_dia_id_fallback_and_missing_parents() {
        let s = store(
            r#"{"ts":1,"worker_rank":0,"class":"DIABase","event":"create","dia_id":452,"label":"Cache"}"#,
        );
        let build = reconstruct(&s);
        let node = build.graph.get(452).unwrap();
        assert!(node.parent_ids.is_empty());
        assert_eq!(node.kind, None);
    }

    #[test]
    fn test_non_zero_worker_ignored() {
        let s = store(
            r#"{"ts":1,"worker_rank":3,"class":"DIA","event":"create","id":1,"label":"Map","parents":[]}"#,
        );
        assert!(reconstruct(&s).graph.is_empty());
    }
}
