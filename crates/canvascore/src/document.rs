use crate::{Canvas, CanvasError, CanvasNode, Edge, FlowError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const CANVAS_FORMAT: &str = "canvas";
pub const CANVAS_VERSION: &str = "1.0";

/// Runtime-only node fields that must never reach disk.
pub const TRANSIENT_KEYS: [&str; 5] = [
    "isExecuting",
    "executionComplete",
    "executionError",
    "isInExecutionPath",
    "executionPosition",
];

/// On-disk canvas representation.
///
/// ```json
/// { "nodes": [...], "edges": [...], "format": "canvas", "version": "1.0" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<Edge>,
    pub format: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<serde_json::Value>,
    /// Unrecognised top-level keys (`created`, editor settings, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CanvasDocument {
    /// Snapshot a canvas for saving.
    pub fn from_canvas(canvas: &Canvas) -> Self {
        let mut nodes = canvas.nodes.clone();
        nodes.iter_mut().for_each(strip_transient);

        Self {
            nodes,
            edges: canvas.edges.clone(),
            format: CANVAS_FORMAT.to_string(),
            version: CANVAS_VERSION.to_string(),
            last_saved: Some(Utc::now()),
            viewport: canvas.viewport.clone(),
            extra: canvas.metadata.clone(),
        }
    }

    /// Rebuild the graph. Edges pointing at missing nodes are dropped.
    pub fn into_canvas(self) -> Result<Canvas, CanvasError> {
        if self.format != CANVAS_FORMAT || self.version != CANVAS_VERSION {
            return Err(CanvasError::UnsupportedFormat {
                format: self.format,
                version: self.version,
            });
        }

        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for mut node in self.nodes {
            if !seen.insert(node.id.clone()) {
                return Err(CanvasError::DuplicateNode(node.id));
            }
            strip_transient(&mut node);
            nodes.push(node);
        }

        let edges = self
            .edges
            .into_iter()
            .filter(|edge| {
                let valid = seen.contains(&edge.source) && seen.contains(&edge.target);
                if !valid {
                    tracing::warn!(
                        "Dropping edge {} ({} -> {}): unknown endpoint",
                        edge.id,
                        edge.source,
                        edge.target
                    );
                }
                valid
            })
            .collect();

        let mut canvas = Canvas {
            nodes,
            edges,
            viewport: self.viewport,
            metadata: self.extra,
        };
        canvas.refresh_connections();
        Ok(canvas)
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn strip_transient(node: &mut CanvasNode) {
    for key in TRANSIENT_KEYS {
        node.data.remove(key);
        node.extra.remove(key);
    }
}
