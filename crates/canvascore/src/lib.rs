//! Core abstractions for the canvas flow engine
//!
//! This crate provides the graph model, the payloads nodes exchange, the node
//! trait, per-node execution state and the persisted canvas document. It has
//! no executor of its own.

mod canvas;
mod document;
mod error;
pub mod events;
mod node;
mod payload;
mod status;

pub use canvas::{Canvas, CanvasNode, Edge, EdgeId, NodeId, NodeKind, Position};
pub use document::{CanvasDocument, CANVAS_FORMAT, CANVAS_VERSION, TRANSIENT_KEYS};
pub use error::{CanvasError, FlowError, NodeError};
pub use events::*;
pub use node::{Node, NodeContext, NodeOutput, NodeState, SourceInfo};
pub use payload::{
    ChatReply, CombinedFormat, CombinedPayload, DocumentContent, Envelope, Payload, PayloadKind,
    VideoContent, WaitingStatus, WebContent,
};
pub use status::{ExecutionState, StatusFlags};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
