use crate::backend::ServiceBackend;
use async_trait::async_trait;
use canvascore::{
    Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload, VideoContent,
};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::sync::Arc;

const DEFAULT_TITLE: &str = "YouTube Video";

/// A YouTube video and, once analysed, what it is about.
///
/// The analysis is requested from the backend the first time the node runs
/// and cached in the node's data afterwards.
pub struct VideoNode {
    backend: Arc<dyn ServiceBackend>,
}

impl VideoNode {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Node for VideoNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Video
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        let mut state = ctx.state.clone();

        let configured = state
            .get_str("videoId")
            .map(|id| (id.to_string(), state.get_str("url").map(str::to_string)))
            .or_else(|| {
                let url = state.get_str("url")?;
                extract_video_id(url).map(|id| (id, Some(url.to_string())))
            });

        let (video_id, url) = match configured.or_else(|| adopt_upstream_url(&ctx)) {
            Some((id, url)) => {
                let url = url.unwrap_or_else(|| watch_url(&id));
                (id, url)
            }
            None => return Ok(Payload::error("No video selected.").into()),
        };
        state.set("videoId", video_id.clone());
        state.set("url", url.clone());

        let analysis = match state.get_str("analysis") {
            Some(analysis) => analysis.to_string(),
            None => {
                ctx.events.info(format!("Analyzing video {}", video_id));
                match self.backend.analyze_video(&url, &video_id).await {
                    Ok(analysis) => {
                        state.set("analysis", analysis.clone());
                        analysis
                    }
                    Err(e) => {
                        tracing::error!("Video analysis for {} failed: {}", video_id, e);
                        return Ok(NodeOutput::new(Payload::error(format!(
                            "Video analysis failed: {}",
                            e
                        )))
                        .with_state(state));
                    }
                }
            }
        };

        let title = state.get_str("title").unwrap_or(DEFAULT_TITLE).to_string();
        Ok(NodeOutput::new(Payload::Video(VideoContent {
            video_id,
            url,
            title,
            analysis: Some(analysis),
        }))
        .with_state(state))
    }
}

/// A video URL found in the first upstream output that carries one.
fn adopt_upstream_url(ctx: &NodeContext) -> Option<(String, Option<String>)> {
    ctx.inputs.iter().find_map(|envelope| {
        let candidate = match &envelope.payload {
            Payload::Text { text } => Some(text.trim().to_string()),
            Payload::Web(web) => Some(web.url.clone()),
            Payload::Json { value } => ["youtubeUrl", "videoUrl", "url"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string),
            _ => None,
        }?;
        let id = extract_video_id(&candidate)?;
        tracing::debug!("Video node {} adopted upstream URL {}", ctx.node_id, candidate);
        Some((id, Some(candidate)))
    })
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Video id from the watch, embed and short URL forms.
pub fn extract_video_id(url: &str) -> Option<String> {
    let id = if let Some(query) = after(url, "youtube.com/watch?") {
        query
            .split(['&', '#'])
            .find_map(|pair| pair.strip_prefix("v="))?
    } else if let Some(rest) = after(url, "youtube.com/embed/") {
        rest.split(['/', '?', '#']).next()?
    } else if let Some(rest) = after(url, "youtu.be/") {
        rest.split(['/', '?', '#']).next()?
    } else {
        return None;
    };

    (!id.is_empty()).then(|| id.to_string())
}

fn after<'a>(haystack: &'a str, needle: &str) -> Option<&'a str> {
    haystack
        .find(needle)
        .map(|index| &haystack[index + needle.len()..])
}

pub struct VideoNodeFactory {
    backend: Arc<dyn ServiceBackend>,
}

impl VideoNodeFactory {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

impl NodeFactory for VideoNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(VideoNode::new(self.backend.clone())))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Video
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "YouTube".to_string(),
            description: "Video with an AI generated analysis".to_string(),
            category: "source".to_string(),
        }
    }
}
