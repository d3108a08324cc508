use async_trait::async_trait;
use canvascore::{
    DocumentContent, Envelope, Node, NodeContext, NodeError, NodeKind, NodeOutput, Payload,
};
use canvasruntime::{MountContext, NodeFactory, NodeMetadata};
use std::path::Path;
use std::sync::Arc;

/// Reads a local document and emits its text.
///
/// Text extracted elsewhere (an upload service, the editor) can be stored
/// under `text` and is used as is; otherwise the file at `filePath` must be
/// readable as UTF-8.
pub struct DocumentNode;

#[async_trait]
impl Node for DocumentNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Document
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        let file_path = ctx.state.get_str("filePath");
        let filename = ctx
            .state
            .get_str("filename")
            .map(str::to_string)
            .or_else(|| {
                file_path.and_then(|p| {
                    Path::new(p)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
            })
            .unwrap_or_else(|| "document".to_string());

        if let Some(text) = ctx.state.get_str("text") {
            return Ok(Payload::Document(DocumentContent {
                content_type: content_type(&filename).to_string(),
                filesize: text.len() as u64,
                filename,
                text: text.to_string(),
            })
            .into());
        }

        let Some(file_path) = file_path else {
            return Ok(Payload::error("No document selected.").into());
        };

        ctx.events.info(format!("Reading {}", file_path));
        let bytes = match tokio::fs::read(file_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Document node {} cannot read {}: {}", ctx.node_id, file_path, e);
                return Ok(Payload::error(format!("Failed to read {}: {}", filename, e)).into());
            }
        };

        let filesize = bytes.len() as u64;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                return Ok(
                    Payload::error(format!("Could not extract text from {}", filename)).into(),
                )
            }
        };

        Ok(Payload::Document(DocumentContent {
            content_type: content_type(&filename).to_string(),
            filename,
            text,
            filesize,
        })
        .into())
    }
}

/// MIME type guessed from the file extension
pub fn content_type(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") | Some("text") => "text/plain",
        Some("md") | Some("markdown") => "text/markdown",
        Some("html") | Some("htm") => "text/html",
        Some("json") => "application/json",
        Some("csv") => "text/csv",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

pub struct DocumentNodeFactory;

impl NodeFactory for DocumentNodeFactory {
    fn create(&self, _mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        Ok(Arc::new(DocumentNode))
    }

    fn node_kind(&self) -> NodeKind {
        NodeKind::Document
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            label: "Document".to_string(),
            description: "Text content of a local document".to_string(),
            category: "source".to_string(),
        }
    }
}
