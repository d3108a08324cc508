use crate::backend::ServiceBackend;
use async_trait::async_trait;
use canvascore::{
    ChatReply, CombinedFormat, DocumentContent, Envelope, Node, NodeContext, NodeError, NodeKind,
    NodeOutput, Payload, VideoContent, WebContent,
};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::fmt::Write;
use std::sync::Arc;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Sends its prompt, enriched with whatever the upstream nodes produced, to
/// the chat backend.
pub struct AiChatNode {
    backend: Arc<dyn ServiceBackend>,
}

impl AiChatNode {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Node for AiChatNode {
    fn kind(&self) -> NodeKind {
        NodeKind::AiChat
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        let system_prompt = ctx
            .state
            .get_str("systemPrompt")
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
            .to_string();
        let user_prompt = ctx.state.get_str("userPrompt").unwrap_or_default();

        if let Some(waiting) = ctx.inputs.iter().find_map(|e| match &e.payload {
            Payload::Waiting(status) => Some(status),
            _ => None,
        }) {
            let message = format!("Upstream inputs not ready. {}", waiting.message);
            ctx.events.warn(&message);
            return Ok(Payload::error(message).into());
        }

        let prompt = build_prompt(user_prompt, &ctx.inputs);
        if prompt.trim().is_empty() {
            tracing::warn!("AI chat node {}: no usable prompt available", ctx.node_id);
            return Ok(Payload::error("No usable prompt available.").into());
        }

        ctx.events.info("Sending prompt to chat backend");
        let response = match self.backend.chat(&system_prompt, &prompt).await {
            Ok(response) if !response.trim().is_empty() => response,
            Ok(_) => return Ok(Payload::error("Received empty response from API").into()),
            Err(e) => {
                tracing::error!("AI chat node {} failed: {}", ctx.node_id, e);
                return Ok(Payload::error(e.to_string()).into());
            }
        };

        let state = ctx.state.clone().with("lastResponse", response.clone());
        Ok(NodeOutput::new(Payload::Chat(ChatReply {
            response,
            system_prompt,
            user_prompt: prompt,
        }))
        .with_state(state))
    }
}

/// Compose the prompt actually sent: a context block per upstream output
/// followed by the user's own prompt.
pub fn build_prompt(user_prompt: &str, inputs: &[Envelope]) -> String {
    let mut context = String::new();
    for envelope in inputs {
        describe(&mut context, &envelope.payload);
    }
    let user_prompt = user_prompt.trim();

    match (context.is_empty(), user_prompt.is_empty()) {
        (true, _) => user_prompt.to_string(),
        (false, false) => format!(
            "{}Please answer the following question or complete the following task based on \
             the above context:\n\n{}",
            context, user_prompt
        ),
        (false, true) => format!(
            "{}Please analyze the above information and provide insights or a summary.",
            context
        ),
    }
}

fn describe(out: &mut String, payload: &Payload) {
    match payload {
        Payload::Combined(combined) => {
            if let Some(video) = &combined.video {
                describe_video(out, video);
            }
            if let Some(web) = &combined.web {
                describe_web(out, web);
            }
            if let Some(document) = &combined.document {
                describe_document(out, document);
            }
            for payload in combined.passthrough.values() {
                describe(out, payload);
            }
            if let Some(format) = combined.format {
                let _ = write!(
                    out,
                    "RESEARCH TASK ({}): Please synthesize all the information sources above \
                     into a comprehensive analysis.\n\n",
                    format_label(format)
                );
            }
        }
        Payload::Video(video) => describe_video(out, video),
        Payload::Web(web) => describe_web(out, web),
        Payload::Document(document) => describe_document(out, document),
        Payload::Chat(reply) => {
            let _ = write!(out, "PREVIOUS AI OUTPUT:\n{}\n\n", reply.response);
        }
        Payload::Text { text } => {
            if !text.trim().is_empty() {
                let _ = write!(out, "INPUT TEXT:\n{}\n\n", text);
            }
        }
        Payload::Json { value } => describe_json(out, value),
        Payload::Trigger | Payload::Waiting(_) | Payload::Error { .. } => {}
    }
}

fn describe_video(out: &mut String, video: &VideoContent) {
    out.push_str("VIDEO ANALYSIS:\n");
    if !video.title.is_empty() {
        let _ = writeln!(out, "Video Title: {}", video.title);
    }
    if !video.url.is_empty() {
        let _ = writeln!(out, "Video URL: {}", video.url);
    }
    if let Some(analysis) = &video.analysis {
        let _ = write!(out, "\nAnalysis:\n{}\n", analysis);
    }
    out.push('\n');
}

fn describe_web(out: &mut String, web: &WebContent) {
    out.push_str("WEBPAGE CONTENT:\n");
    if let Some(title) = &web.title {
        let _ = writeln!(out, "Title: {}", title);
    }
    if let Some(description) = &web.description {
        let _ = writeln!(out, "Description: {}", description);
    }
    if let Some(content) = &web.content {
        let _ = write!(out, "\nMain Content:\n{}\n\n", content);
    }
    if !web.url.is_empty() {
        let _ = write!(out, "Source URL: {}\n\n", web.url);
    }
}

fn describe_document(out: &mut String, document: &DocumentContent) {
    out.push_str("DOCUMENT CONTENT:\n");
    if !document.filename.is_empty() {
        let _ = writeln!(out, "Filename: {}", document.filename);
    }
    if !document.text.is_empty() {
        let _ = write!(out, "\nContent:\n{}\n\n", document.text);
    }
}

fn describe_json(out: &mut String, value: &serde_json::Value) {
    let lines: Vec<String> = match value {
        serde_json::Value::Object(map) => map
            .iter()
            .filter(|(key, value)| !value.is_null() && key.as_str() != "error")
            .map(|(key, value)| match value {
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    format!("{}: (complex data)", key)
                }
                serde_json::Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![other.to_string()],
    };
    if !lines.is_empty() {
        let _ = write!(out, "CONTEXT DATA:\n{}\n\n", lines.join("\n"));
    }
}

fn format_label(format: CombinedFormat) -> &'static str {
    match format {
        CombinedFormat::YoutubeAndWeb => "video + web",
        CombinedFormat::YoutubeAndDocument => "video + document",
        CombinedFormat::WebAndDocument => "web + document",
    }
}

pub struct AiChatNodeFactory {
    backend: Arc<dyn ServiceBackend>,
}

impl AiChatNodeFactory {
    pub fn new(backend: Arc<dyn ServiceBackend>) -> Self {
        Self { backend }
    }
}

impl NodeFactory for AiChatNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(AiChatNode::new(self.backend.clone())))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::AiChat
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "AI Chat".to_string(),
            description: "Prompts the chat model with upstream context".to_string(),
            category: "ai".to_string(),
        }
    }
}
