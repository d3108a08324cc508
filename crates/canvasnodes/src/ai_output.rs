use async_trait::async_trait;
use canvascore::{Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::sync::Arc;

const INVALID_INPUT: &str = "Received invalid data from previous node.";

/// Displays the chat reply of the node feeding it
pub struct AiOutputNode;

#[async_trait]
impl Node for AiOutputNode {
    fn kind(&self) -> NodeKind {
        NodeKind::AiOutput
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        let mut state = ctx.state.clone();

        let payload = match ctx.first_input() {
            Some(Payload::Chat(reply)) => {
                state.set("response", reply.response.clone());
                state.remove("errorMessage");
                Payload::Chat(reply.clone())
            }
            Some(Payload::Error { error }) => {
                tracing::warn!("AI output node {} received error: {}", ctx.node_id, error);
                state.set("errorMessage", error.clone());
                Payload::error(error.clone())
            }
            other => {
                tracing::warn!(
                    "AI output node {} received unexpected input: {:?}",
                    ctx.node_id,
                    other.map(Payload::kind)
                );
                state.set("errorMessage", INVALID_INPUT);
                Payload::error(INVALID_INPUT)
            }
        };

        Ok(NodeOutput::new(payload).with_state(state))
    }
}

pub struct AiOutputNodeFactory;

impl NodeFactory for AiOutputNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(AiOutputNode))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::AiOutput
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "AI Output".to_string(),
            description: "Shows the response of an AI chat node".to_string(),
            category: "ai".to_string(),
        }
    }
}
