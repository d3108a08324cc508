use crate::backend::ServiceBackend;
use async_trait::async_trait;
use canvascore::{
    Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload, WebContent,
};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::sync::Arc;

/// Content of a scraped web page.
///
/// Scraped content is cached under `scrapedContent`; the page at `url` is
/// only fetched while that cache is empty.
pub struct WebSourceNode {
    backend: Arc<dyn ServiceBackend>,
}

impl WebSourceNode {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Node for WebSourceNode {
    fn kind(&self) -> NodeKind {
        NodeKind::WebSource
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        if let Some(cached) = ctx.state.get("scrapedContent").and_then(cached_content) {
            return Ok(Payload::Web(cached).into());
        }

        let Some(url) = ctx.state.get_str("url") else {
            return Ok(Payload::error("No scraped content. Please scrape a website first.").into());
        };

        ctx.events.info(format!("Scraping {}", url));
        let content = match self.backend.scrape(url).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!("Scraping {} failed: {}", url, e);
                return Ok(Payload::error(format!("Failed to scrape website: {}", e)).into());
            }
        };

        let cache = serde_json::to_value(&content)
            .map_err(|e| NodeError::ExecutionFailed(format!("Cannot cache scrape: {}", e)))?;
        let state = ctx.state.clone().with("scrapedContent", cache);
        Ok(NodeOutput::new(Payload::Web(content)).with_state(state))
    }
}

/// Read a cached scrape, accepting the `main_content`/`text` spellings the
/// scraping API uses.
fn cached_content(value: &serde_json::Value) -> Option<WebContent> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let content = WebContent {
        url: field("url").unwrap_or_default(),
        title: field("title"),
        description: field("description"),
        content: field("content")
            .or_else(|| field("main_content"))
            .or_else(|| field("text")),
    };

    let empty = content.url.is_empty()
        && content.title.is_none()
        && content.description.is_none()
        && content.content.is_none();
    (!empty).then_some(content)
}

pub struct WebSourceNodeFactory {
    backend: Arc<dyn ServiceBackend>,
}

impl WebSourceNodeFactory {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

impl NodeFactory for WebSourceNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(WebSourceNode::new(self.backend.clone())))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::WebSource
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "Web Scraper".to_string(),
            description: "Main content of a web page".to_string(),
            category: "source".to_string(),
        }
    }
}
