use async_trait::async_trait;
use canvascore::{Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::sync::Arc;

/// Emits its configured `text`
pub struct TextNode;

#[async_trait]
impl Node for TextNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Text
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        match ctx.state.get_str("text") {
            Some(text) => Ok(Payload::text(text).into()),
            None => {
                ctx.events.warn("No text provided");
                Ok(Payload::error("No text provided").into())
            }
        }
    }
}

pub struct TextNodeFactory;

impl NodeFactory for TextNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(TextNode))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Text
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "Text".to_string(),
            description: "Static text input".to_string(),
            category: "input".to_string(),
        }
    }
}
