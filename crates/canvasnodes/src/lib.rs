//! Built-in canvas nodes
//!
//! Sources (text, documents, videos, web pages), the AI chat and output
//! nodes, the start node and the rendezvous that joins parallel branches.

pub mod backend;

mod ai_chat;
mod ai_output;
mod document;
mod rendezvous;
mod start;
mod text;
mod video;
mod web;

pub use ai_chat::{build_prompt, AiChatNode, AiChatNodeFactory, DEFAULT_SYSTEM_PROMPT};
pub use ai_output::{AiOutputNode, AiOutputNodeFactory};
pub use backend::{BackendConfig, BackendError, HttpBackend, ServiceBackend};
pub use document::{content_type, DocumentNode, DocumentNodeFactory};
pub use rendezvous::{
    RendezvousNode, RendezvousNodeFactory, RendezvousStatus, SourceStatus, TrackedSource,
};
pub use start::{StartNode, StartNodeFactory};
pub use text::{TextNode, TextNodeFactory};
pub use video::{extract_video_id, VideoNode, VideoNodeFactory};
pub use web::{WebSourceNode, WebSourceNodeFactory};

use canvasruntime::NodeCatalog;
use std::sync::Arc;

/// Register every built-in node type with a catalog
pub fn register_all(catalog: &mut NodeCatalog, backend: Arc<dyn ServiceBackend>) {
    catalog.register(Arc::new(StartNodeFactory));
    catalog.register(Arc::new(TextNodeFactory));
    catalog.register(Arc::new(AiChatNodeFactory::new(backend.clone())));
    catalog.register(Arc::new(AiOutputNodeFactory));
    catalog.register(Arc::new(DocumentNodeFactory));
    catalog.register(Arc::new(VideoNodeFactory::new(backend.clone())));
    catalog.register(Arc::new(WebSourceNodeFactory::new(backend)));
    catalog.register(Arc::new(RendezvousNodeFactory));
}

/// Catalog with every built-in node type
pub fn default_catalog(backend: Arc<dyn ServiceBackend>) -> NodeCatalog {
    let mut catalog = NodeCatalog::new();
    register_all(&mut catalog, backend);
    catalog
}
