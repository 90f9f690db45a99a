//! Graphviz styling for exported dataflow graphs

use crate::core::export::NodeClass;

/// Fill colors per operator class
pub mod colors {
    pub const SOURCE: &str = "green";
    pub const TRANSFORM: &str = "red"; // distributed operations
    pub const SINK: &str = "yellow"; // actions
    pub const CACHE: &str = "blue";
}

/// Shapes per operator class
pub mod shapes {
    pub const SOURCE: &str = "invhouse";
    pub const TRANSFORM: &str = "box";
    pub const SINK: &str = "diamond";
    pub const CACHE: &str = "hexagon";
}

/// DOT attribute list for a node of the given class
pub fn node_style(class: NodeClass) -> String {
    let (color, shape) = match class {
        NodeClass::Source => (colors::SOURCE, shapes::SOURCE),
        NodeClass::Transform => (colors::TRANSFORM, shapes::TRANSFORM),
        NodeClass::Sink => (colors::SINK, shapes::SINK),
        NodeClass::Cache => (colors::CACHE, shapes::CACHE),
        // local operations are fused into their neighbours
        NodeClass::PassThrough => return "style=dashed, shape=ellipse".to_string(),
    };
    format!("style=filled, fillcolor={color}, shape={shape}")
}
