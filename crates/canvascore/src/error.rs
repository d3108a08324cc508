use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Canvas error: {0}")]
    Canvas(#[from] CanvasError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Faults raised by a node handler.
///
/// Returning one of these from [`Node::execute`](crate::Node::execute) aborts
/// the run. Anticipated failures (missing prompt, backend down) should resolve
/// with [`Payload::Error`](crate::Payload::Error) instead.
#[derive(Error, Debug, Clone)]
pub enum NodeError {
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Node initialization failed: {0}")]
    InitializationFailed(String),
}

#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Edge references unknown node: source={source_id}, target={target_id}")]
    InvalidEdge { source_id: String, target_id: String },

    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Unsupported canvas document: format={format}, version={version}")]
    UnsupportedFormat { format: String, version: String },

    #[error("Start node {0} has no outgoing connections")]
    NotConnected(String),

    #[error("Node {id} is a {kind} node, not a start node")]
    NotAStartNode { id: String, kind: String },
}
