use crate::{Envelope, EventEmitter, NodeError, NodeId, NodeKind, Payload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Core trait that every canvas node handler implements.
///
/// Handlers are stable capability objects: configuration is not captured
/// inside them but handed in through [`NodeContext::state`], and any change a
/// handler wants to make to its node comes back through
/// [`NodeOutput::state`].
#[async_trait]
pub trait Node: Send + Sync {
    /// Canvas type this handler serves
    fn kind(&self) -> NodeKind;

    /// Run the node once.
    ///
    /// Expected failures must resolve with [`Payload::Error`]; an `Err`
    /// aborts the whole run.
    async fn execute(&self, ctx: NodeContext, input: Envelope) -> Result<NodeOutput, NodeError>;

    /// Optional: whether producers upstream deliver their outputs straight to
    /// this handler as soon as they finish (fan-in nodes).
    fn accepts_deliveries(&self) -> bool {
        false
    }

    /// Optional: the set of incoming sources changed
    fn sources_changed(&self, _sources: &[SourceInfo]) {}

    /// Optional: user-invoked reset of internal state
    fn reset(&self) {}
}

/// An upstream node as seen from its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub node_id: NodeId,
    pub kind: NodeKind,
}

impl SourceInfo {
    pub fn new(node_id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
        }
    }
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,

    /// Snapshot of the node's configuration at invocation time
    pub state: NodeState,

    /// Latest outputs of the direct upstream nodes in this run,
    /// in incoming-edge order
    pub inputs: Vec<Envelope>,

    /// Nodes currently connected into this one
    pub sources: Vec<SourceInfo>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(node_id: impl Into<NodeId>, events: EventEmitter) -> Self {
        Self {
            node_id: node_id.into(),
            state: NodeState::default(),
            inputs: Vec::new(),
            sources: Vec::new(),
            events,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<Envelope>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceInfo>) -> Self {
        self.sources = sources;
        self
    }

    pub fn first_input(&self) -> Option<&Payload> {
        self.inputs.first().map(|e| &e.payload)
    }
}

/// A node's configuration object: the free-form `data` map stored on the
/// canvas.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeState {
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// String setting; `None` when absent or blank.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for NodeState {
    fn from(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { data }
    }
}

/// Output from node execution
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutput {
    pub payload: Payload,

    /// Replacement configuration for the node, committed by the executor
    pub state: Option<NodeState>,
}

impl NodeOutput {
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            state: None,
        }
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = Some(state);
        self
    }
}

impl From<Payload> for NodeOutput {
    fn from(payload: Payload) -> Self {
        NodeOutput::new(payload)
    }
}
