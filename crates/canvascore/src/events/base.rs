use crate::{ExecutionState, NodeId, PayloadKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during flow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    FlowStarted {
        execution_id: ExecutionId,
        start_node: NodeId,
        path: Vec<NodeId>,
        timestamp: DateTime<Utc>,
    },
    /// A run was requested while another one was in flight and got dropped.
    FlowRejected {
        start_node: NodeId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    NodeStateChanged {
        execution_id: ExecutionId,
        node_id: NodeId,
        state: ExecutionState,
        timestamp: DateTime<Utc>,
    },
    NodeSkipped {
        execution_id: ExecutionId,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
        payload_kind: PayloadKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A producer's output was handed straight to a fan-in node.
    Delivered {
        execution_id: ExecutionId,
        source: NodeId,
        target: NodeId,
        result: PayloadKind,
        timestamp: DateTime<Utc>,
    },
    FlowFinished {
        execution_id: ExecutionId,
        aborted: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// Every node went back to idle after the observation window.
    StatusReset { timestamp: DateTime<Utc> },
    NodeEvent {
        execution_id: ExecutionId,
        node_id: NodeId,
        event: NodeEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to node execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum NodeEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Event emitter for nodes to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    node_id: NodeId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        node_id: NodeId,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            node_id,
            sender,
        }
    }

    /// Emitter wired to nothing, for handlers invoked outside a session.
    pub fn detached(node_id: impl Into<NodeId>) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(Uuid::nil(), node_id.into(), sender)
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Emit a node-specific event
    pub fn emit(&self, event: NodeEvent) {
        let _ = self.sender.send(ExecutionEvent::NodeEvent {
            execution_id: self.execution_id,
            node_id: self.node_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(NodeEvent::Warning {
            message: message.into(),
        });
    }

    /// Emit progress update
    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(NodeEvent::Progress { percent, message });
    }
}

/// Broadcast bus that renderers subscribe to
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, node_id: NodeId) -> EventEmitter {
        EventEmitter::new(execution_id, node_id, self.sender.clone())
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
