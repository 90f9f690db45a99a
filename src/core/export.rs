//! Graphviz export of the reconstructed dataflow graph

use serde::Serialize;
use tracing::debug;

use super::graph::DataflowGraph;
use crate::theme::node_style;

/// Coarse operator classes used for styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    Source,
    Transform,
    Sink,
    Cache,
    PassThrough,
}

/// Operator label table, matched exactly
pub const NODE_CLASSES: &[(NodeClass, &[&str])] = &[
    (
        NodeClass::Source,
        &[
            "Generate",
            "GenerateFromFile",
            "ReadLines",
            "ReadBinary",
            "Distribute",
            "DistributeFrom",
            "EqualToDIA",
            "ConcatToDIA",
        ],
    ),
    (
        NodeClass::Transform,
        &[
            "ReduceByKey",
            "ReduceByIndex",
            "ReducePair",
            "ReduceToIndex",
            "GroupByKey",
            "GroupByIndex",
            "GroupToIndex",
            "InnerJoin",
            "Join",
            "Sort",
            "SortStable",
            "Merge",
            "Zip",
            "ZipWithIndex",
            "ZipWindow",
            "Window",
            "FlatWindow",
            "DisjointWindow",
            "PrefixSum",
            "ExPrefixSum",
            "Concat",
            "Rebalance",
            "Sample",
        ],
    ),
    (
        NodeClass::Sink,
        &[
            "Size",
            "AllGather",
            "Gather",
            "Print",
            "Sum",
            "Min",
            "Max",
            "AllReduce",
            "WriteLines",
            "WriteLinesOne",
            "WriteBinary",
            "Execute",
        ],
    ),
    (NodeClass::Cache, &["Cache", "Collapse"]),
    (
        NodeClass::PassThrough,
        &["Map", "Filter", "FlatMap", "BernoulliSample", "Union"],
    ),
];

/// Class of an operator label, None if unknown
pub fn classify(label: &str) -> Option<NodeClass> {
    NODE_CLASSES
        .iter()
        .find(|(_, labels)| labels.contains(&label))
        .map(|(class, _)| *class)
}

/// Quoted DOT identifier
fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render the graph as a DOT digraph
///
/// Nodes appear in ascending id order. Edges follow each child's parent
/// list in the order it was logged. A parent missing from the graph still
/// gets its edge, identified by its bare id.
pub fn to_dot(graph: &DataflowGraph) -> String {
    let name_of = |id: u64| match graph.get(id) {
        Some(node) => quote(&node.display_name()),
        None => quote(&id.to_string()),
    };

    let mut dot = String::from("digraph {\n");

    for node in graph.nodes() {
        let name = quote(&node.display_name());
        match classify(&node.label) {
            Some(class) => dot.push_str(&format!("\t{} [{}];\n", name, node_style(class))),
            None => dot.push_str(&format!("\t{};\n", name)),
        }
    }
    dot.push('\n');

    let mut edges = 0usize;
    for (parent, child) in graph.edges() {
        dot.push_str(&format!("\t{} -> {};\n", name_of(parent), name_of(child)));
        edges += 1;
    }
    dot.push('}');
    dot.push('\n');

    debug!(nodes = graph.len(), edges, "Graph exported");
    dot
}
