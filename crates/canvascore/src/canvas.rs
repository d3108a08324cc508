use crate::{CanvasError, ExecutionState, NodeState, PayloadKind};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type NodeId = String;
pub type EdgeId = String;

/// Directed graph of canvas nodes.
///
/// Pure data plus adjacency queries; handlers and run state live in the
/// runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<Edge>,
    /// Editor viewport, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<serde_json::Value>,
    /// Other document-level keys the editor saved, kept verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: CanvasNode) -> Result<NodeId, CanvasError> {
        if self.contains(&node.id) {
            return Err(CanvasError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        self.refresh_connections();
        Ok(id)
    }

    /// Remove a node together with every edge touching it.
    ///
    /// Returns the removed node and the cascaded edges.
    pub fn remove_node(&mut self, id: &str) -> Result<(CanvasNode, Vec<Edge>), CanvasError> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| CanvasError::NodeNotFound(id.to_string()))?;
        let node = self.nodes.remove(index);

        let (removed, kept): (Vec<Edge>, Vec<Edge>) = self
            .edges
            .drain(..)
            .partition(|e| e.source == id || e.target == id);
        self.edges = kept;
        self.refresh_connections();

        Ok((node, removed))
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, CanvasError> {
        if !self.contains(&edge.source) || !self.contains(&edge.target) {
            return Err(CanvasError::InvalidEdge {
                source_id: edge.source,
                target_id: edge.target,
            });
        }
        let id = edge.id.clone();
        self.edges.push(edge);
        self.refresh_connections();
        Ok(id)
    }

    pub fn connect(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Result<EdgeId, CanvasError> {
        self.add_edge(Edge::new(source, target))
    }

    pub fn remove_edge(&mut self, id: &str) -> Result<Edge, CanvasError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CanvasError::EdgeNotFound(id.to_string()))?;
        let edge = self.edges.remove(index);
        self.refresh_connections();
        Ok(edge)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn find_node(&self, id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut CanvasNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Every edge where `id` is the source or the target, in storage order.
    pub fn connected_edges(&self, id: &str) -> Vec<&Edge> {
        self.edges
            .iter()
            .filter(|e| e.source == id || e.target == id)
            .collect()
    }

    /// Sources of the edges targeting `id`, deduplicated, in storage order.
    pub fn incoming_sources(&self, id: &str) -> Vec<NodeId> {
        let mut sources: Vec<NodeId> = Vec::new();
        for edge in self.edges.iter().filter(|e| e.target == id) {
            if !sources.contains(&edge.source) {
                sources.push(edge.source.clone());
            }
        }
        sources
    }

    /// Targets of the edges leaving `id`, deduplicated, in storage order.
    pub fn outgoing_targets(&self, id: &str) -> Vec<NodeId> {
        let mut targets: Vec<NodeId> = Vec::new();
        for edge in self.edges.iter().filter(|e| e.source == id) {
            if !targets.contains(&edge.target) {
                targets.push(edge.target.clone());
            }
        }
        targets
    }

    /// Recompute the derived `has_connections` flag of every start node.
    pub fn refresh_connections(&mut self) {
        let edges = &self.edges;
        for node in self.nodes.iter_mut() {
            node.has_connections =
                node.kind == NodeKind::Start && edges.iter().any(|e| e.source == node.id);
        }
    }

    pub fn set_status(&mut self, id: &str, state: ExecutionState) -> bool {
        match self.find_node_mut(id) {
            Some(node) => {
                node.status = state;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, id: &str) -> Option<ExecutionState> {
        self.find_node(id).map(|n| n.status)
    }

    /// Put every node back to [`ExecutionState::Idle`].
    pub fn reset_status(&mut self) {
        for node in self.nodes.iter_mut() {
            node.status = ExecutionState::Idle;
        }
    }

    /// Whether the graph is free of cycles. Cycles are legal on a canvas;
    /// this only feeds diagnostics.
    pub fn is_acyclic(&self) -> bool {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let index: HashMap<&str, _> = self
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), graph.add_node(n.id.as_str())))
            .collect();

        for edge in &self.edges {
            if let (Some(from), Some(to)) =
                (index.get(edge.source.as_str()), index.get(edge.target.as_str()))
            {
                graph.add_edge(*from, *to, ());
            }
        }

        !is_cyclic_directed(&graph)
    }
}

/// A node placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: NodeState,
    /// Editor-owned fields (size, selection, ...) kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(skip)]
    pub status: ExecutionState,
    /// Start nodes only: at least one outgoing edge.
    #[serde(skip)]
    pub has_connections: bool,
}

impl CanvasNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            position: Position::default(),
            data: NodeState::default(),
            extra: serde_json::Map::new(),
            status: ExecutionState::Idle,
            has_connections: false,
        }
    }

    /// New node with a generated `<type>_<uuid>` id.
    pub fn generated(kind: NodeKind) -> Self {
        let id = format!("{}_{}", kind, Uuid::new_v4().simple());
        Self::new(id, kind)
    }

    pub fn with_data(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.data.set(key, value);
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }
}

/// Directed connection from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self::with_id(format!("edge-{}", Uuid::new_v4()), source, target)
    }

    pub fn with_id(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Node position in the visual editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Canvas node type, serialized with the editor's type names.
///
/// Unknown names are kept verbatim so foreign node types survive a load/save
/// cycle; they never receive a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Start,
    Text,
    AiChat,
    AiOutput,
    Document,
    Video,
    WebSource,
    Wait,
    Other(String),
}

impl NodeKind {
    pub const BUILTIN: [NodeKind; 8] = [
        NodeKind::Start,
        NodeKind::Text,
        NodeKind::AiChat,
        NodeKind::AiOutput,
        NodeKind::Document,
        NodeKind::Video,
        NodeKind::WebSource,
        NodeKind::Wait,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Start => "startNode",
            NodeKind::Text => "textNode",
            NodeKind::AiChat => "aiChatNode",
            NodeKind::AiOutput => "aiOutputNode",
            NodeKind::Document => "pdfNode",
            NodeKind::Video => "youtubeNode",
            NodeKind::WebSource => "webScraperNode",
            NodeKind::Wait => "waitNode",
            NodeKind::Other(name) => name,
        }
    }

    /// Payload kind a node of this type emits on success.
    pub fn produces(&self) -> Option<PayloadKind> {
        match self {
            NodeKind::Text => Some(PayloadKind::Text),
            NodeKind::AiChat | NodeKind::AiOutput => Some(PayloadKind::Chat),
            NodeKind::Document => Some(PayloadKind::Document),
            NodeKind::Video => Some(PayloadKind::Video),
            NodeKind::WebSource => Some(PayloadKind::Web),
            NodeKind::Wait => Some(PayloadKind::Combined),
            NodeKind::Start | NodeKind::Other(_) => None,
        }
    }
}

impl From<String> for NodeKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "startNode" => NodeKind::Start,
            "textNode" => NodeKind::Text,
            "aiChatNode" => NodeKind::AiChat,
            "aiOutputNode" => NodeKind::AiOutput,
            "pdfNode" => NodeKind::Document,
            "youtubeNode" => NodeKind::Video,
            "webScraperNode" => NodeKind::WebSource,
            "waitNode" => NodeKind::Wait,
            _ => NodeKind::Other(name),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(name: &str) -> Self {
        NodeKind::from(name.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
