use async_trait::async_trait;
use canvascore::{Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::sync::Arc;

/// Entry point of a flow. Its work happens in
/// [`CanvasSession::trigger_start`](canvasruntime::CanvasSession::trigger_start);
/// as a path member it only passes the trigger on.
pub struct StartNode;

#[async_trait]
impl Node for StartNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        ctx.events.info("Flow started");
        Ok(Payload::Trigger.into())
    }
}

pub struct StartNodeFactory;

impl NodeFactory for StartNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(StartNode))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Start
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "Start".to_string(),
            description: "Runs every node connected downstream".to_string(),
            category: "flow".to_string(),
        }
    }
}
