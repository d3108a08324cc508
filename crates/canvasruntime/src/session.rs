use crate::executor::{ExecutorConfig, FlowExecutor, RunOutcome};
use crate::registry::{MountContext, NodeCatalog, NodeRegistry, Registration};
use canvascore::{
    Canvas, CanvasDocument, CanvasError, CanvasNode, Edge, EdgeId, EventBus, ExecutionEvent,
    ExecutionState, FlowError, NodeId, NodeKind, NodeState, Payload, SourceInfo, StatusFlags,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub executor: ExecutorConfig,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            event_buffer_size: 1000,
        }
    }
}

/// One open canvas: its graph, the handlers mounted for its nodes, and the
/// executor that runs flows over it.
pub struct CanvasSession {
    canvas: Arc<RwLock<Canvas>>,
    catalog: Arc<NodeCatalog>,
    registry: NodeRegistry,
    registrations: Mutex<HashMap<NodeId, Registration>>,
    executor: Arc<FlowExecutor>,
    events: EventBus,
}

impl CanvasSession {
    /// Create an empty session with default settings
    pub fn new(catalog: Arc<NodeCatalog>) -> Self {
        Self::with_config(catalog, RuntimeConfig::default())
    }

    pub fn with_config(catalog: Arc<NodeCatalog>, config: RuntimeConfig) -> Self {
        let canvas = Arc::new(RwLock::new(Canvas::new()));
        let registry = NodeRegistry::new();
        let events = EventBus::new(config.event_buffer_size);
        let executor = Arc::new(FlowExecutor::new(
            canvas.clone(),
            registry.clone(),
            events.clone(),
            config.executor,
        ));

        Self {
            canvas,
            catalog,
            registry,
            registrations: Mutex::new(HashMap::new()),
            executor,
            events,
        }
    }

    /// Replace the whole canvas with `document` and mount every node.
    pub async fn load(&self, document: CanvasDocument) -> Result<(), FlowError> {
        let canvas = document.into_canvas()?;

        let stale: Vec<Registration> = self
            .registrations()
            .drain()
            .map(|(_, registration)| registration)
            .collect();
        for registration in stale {
            registration.unregister();
        }

        let nodes: Vec<(NodeId, NodeKind)> = canvas
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.kind.clone()))
            .collect();
        *self.canvas.write().await = canvas;

        for (node_id, kind) in &nodes {
            self.mount(node_id, kind).await?;
        }

        tracing::info!("Loaded canvas with {} nodes", nodes.len());
        Ok(())
    }

    /// Persistable copy of the current canvas
    pub async fn snapshot(&self) -> CanvasDocument {
        CanvasDocument::from_canvas(&*self.canvas.read().await)
    }

    /// Add a node and mount its handler.
    pub async fn add_node(&self, node: CanvasNode) -> Result<NodeId, FlowError> {
        let kind = node.kind.clone();
        let node_id = self.canvas.write().await.add_node(node)?;

        if let Err(e) = self.mount(&node_id, &kind).await {
            // Roll back so the canvas never holds a node that failed to mount.
            let _ = self.canvas.write().await.remove_node(&node_id);
            return Err(e);
        }
        Ok(node_id)
    }

    /// Remove a node, its edges, and its handler.
    pub async fn remove_node(&self, node_id: &str) -> Result<CanvasNode, FlowError> {
        let (node, removed_edges) = self.canvas.write().await.remove_node(node_id)?;

        if let Some(registration) = self.registrations().remove(node_id) {
            registration.unregister();
        }

        for edge in removed_edges.iter().filter(|e| e.source == node_id) {
            self.notify_sources_changed(&edge.target).await;
        }

        tracing::info!(
            "Removed node {} with {} connected edges",
            node_id,
            removed_edges.len()
        );
        Ok(node)
    }

    /// Connect two existing nodes.
    pub async fn connect(&self, source: &str, target: &str) -> Result<EdgeId, FlowError> {
        let edge_id = self.canvas.write().await.connect(source, target)?;
        tracing::debug!("Connected {} -> {} ({})", source, target, edge_id);
        self.notify_sources_changed(target).await;
        Ok(edge_id)
    }

    pub async fn disconnect(&self, edge_id: &str) -> Result<Edge, FlowError> {
        let edge = self.canvas.write().await.remove_edge(edge_id)?;
        tracing::debug!("Disconnected {} -> {} ({})", edge.source, edge.target, edge.id);
        self.notify_sources_changed(&edge.target).await;
        Ok(edge)
    }

    /// Replace a node's configuration. The mounted handler stays in place and
    /// reads the new data on its next execution.
    pub async fn update_node_data(&self, node_id: &str, data: NodeState) -> Result<(), FlowError> {
        let mut canvas = self.canvas.write().await;
        let node = canvas
            .find_node_mut(node_id)
            .ok_or_else(|| CanvasError::NodeNotFound(node_id.to_string()))?;
        node.data = data;
        Ok(())
    }

    /// Run the flow reachable from `start_id`.
    pub async fn execute_flow(&self, start_id: &str) -> Result<RunOutcome, FlowError> {
        self.executor.execute_flow(start_id).await
    }

    /// The Start node's run button: only a connected start node can trigger.
    pub async fn trigger_start(&self, start_id: &str) -> Result<RunOutcome, FlowError> {
        {
            let canvas = self.canvas.read().await;
            let node = canvas
                .find_node(start_id)
                .ok_or_else(|| CanvasError::NodeNotFound(start_id.to_string()))?;
            if node.kind != NodeKind::Start {
                return Err(CanvasError::NotAStartNode {
                    id: start_id.to_string(),
                    kind: node.kind.to_string(),
                }
                .into());
            }
            if !node.has_connections {
                return Err(CanvasError::NotConnected(start_id.to_string()).into());
            }
        }

        tracing::info!("Start node {} triggered", start_id);
        self.execute_flow(start_id).await
    }

    /// Clear whatever a node has accumulated (a rendezvous forgets its
    /// received sources).
    pub async fn reset_node(&self, node_id: &str) -> Result<(), FlowError> {
        if !self.canvas.read().await.contains(node_id) {
            return Err(CanvasError::NodeNotFound(node_id.to_string()).into());
        }
        if let Some(handler) = self.registry.lookup(node_id) {
            handler.reset();
            tracing::debug!("Reset node {}", node_id);
        }
        Ok(())
    }

    pub async fn node_status(&self, node_id: &str) -> Option<ExecutionState> {
        self.canvas.read().await.status(node_id)
    }

    /// Status of every node in canvas order
    pub async fn statuses(&self) -> Vec<(NodeId, ExecutionState)> {
        self.canvas
            .read()
            .await
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.status))
            .collect()
    }

    /// Boolean status flags of every node in canvas order
    pub async fn status_flags(&self) -> Vec<(NodeId, StatusFlags)> {
        self.canvas
            .read()
            .await
            .nodes
            .iter()
            .map(|n| (n.id.clone(), n.status.flags()))
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub async fn latest_output(&self, node_id: &str) -> Option<Payload> {
        self.executor.latest_output(node_id).await
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<NodeCatalog> {
        &self.catalog
    }

    pub fn executor(&self) -> &Arc<FlowExecutor> {
        &self.executor
    }

    pub fn is_running(&self) -> bool {
        self.executor.is_running()
    }

    async fn mount(&self, node_id: &str, kind: &NodeKind) -> Result<(), FlowError> {
        let mount = {
            let canvas = self.canvas.read().await;
            MountContext {
                node_id: node_id.to_string(),
                state: canvas
                    .find_node(node_id)
                    .map(|n| n.data.clone())
                    .unwrap_or_default(),
                sources: source_infos(&canvas, node_id),
            }
        };

        match self.catalog.create_node(kind, &mount)? {
            Some(handler) => {
                let registration = self.registry.register(node_id, handler);
                if let Some(previous) = self
                    .registrations()
                    .insert(node_id.to_string(), registration)
                {
                    // Replaced in the table already; its generation is stale.
                    previous.unregister();
                }
            }
            None => {
                tracing::debug!("No handler for node {} of type {}", node_id, kind);
            }
        }
        Ok(())
    }

    async fn notify_sources_changed(&self, node_id: &str) {
        let Some(handler) = self.registry.lookup(node_id) else {
            return;
        };
        let sources = source_infos(&*self.canvas.read().await, node_id);
        handler.sources_changed(&sources);
    }

    fn registrations(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn source_infos(canvas: &Canvas, node_id: &str) -> Vec<SourceInfo> {
    canvas
        .incoming_sources(node_id)
        .into_iter()
        .filter_map(|id| {
            let kind = canvas.find_node(&id)?.kind.clone();
            Some(SourceInfo::new(id, kind))
        })
        .collect()
}
