use canvascore::{Node, NodeError, NodeId, NodeKind, NodeState, SourceInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Factory trait for creating node handlers when a node is mounted
pub trait NodeFactory: Send + Sync {
    /// Create the handler for one canvas node
    fn create(&self, mount: &MountContext) -> Result<Arc<dyn Node>, NodeError>;

    /// Get the canvas type this factory serves
    fn node_kind(&self) -> NodeKind;

    /// Optional: Get node metadata (label, description, category)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// What a factory sees of the node being mounted
#[derive(Debug, Clone)]
pub struct MountContext {
    pub node_id: NodeId,
    pub state: NodeState,
    pub sources: Vec<SourceInfo>,
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub label: String,
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            label: String::new(),
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Catalog of available node types
pub struct NodeCatalog {
    factories: HashMap<NodeKind, Arc<dyn NodeFactory>>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let kind = factory.node_kind();
        tracing::info!("Registering node type: {}", kind);
        self.factories.insert(kind, factory);
    }

    /// Create a handler for a node of `kind`.
    ///
    /// `Ok(None)` means the type has no handler (foreign node types).
    pub fn create_node(
        &self,
        kind: &NodeKind,
        mount: &MountContext,
    ) -> Result<Option<Arc<dyn Node>>, NodeError> {
        match self.factories.get(kind) {
            Some(factory) => factory.create(mount).map(Some),
            None => Ok(None),
        }
    }

    /// Get all registered node types, sorted by name
    pub fn list_node_kinds(&self) -> Vec<NodeKind> {
        let mut kinds: Vec<NodeKind> = self.factories.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, kind: &NodeKind) -> Option<NodeMetadata> {
        self.factories.get(kind).map(|f| f.metadata())
    }
}

impl Default for NodeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry {
    handler: Arc<dyn Node>,
    generation: u64,
}

/// Handlers currently registered for flow execution, keyed by node id.
///
/// Cheap to clone; every clone shares the same table. Entries live for the
/// session only.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: Arc<RwLock<HashMap<NodeId, Entry>>>,
    generations: Arc<AtomicU64>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler of `node_id`.
    pub fn register(&self, node_id: impl Into<NodeId>, handler: Arc<dyn Node>) -> Registration {
        let node_id = node_id.into();
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;

        let replaced = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.clone(), Entry { handler, generation })
            .is_some();

        if replaced {
            tracing::debug!("Re-registered node {} for flow execution", node_id);
        } else {
            tracing::info!("Registering node {} for flow execution", node_id);
        }

        Registration {
            node_id,
            generation,
            registry: self.clone(),
        }
    }

    pub fn lookup(&self, node_id: &str) -> Option<Arc<dyn Node>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .map(|e| e.handler.clone())
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn remove_generation(&self, node_id: &str, generation: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(node_id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(node_id);
                tracing::info!("Unregistering node {}", node_id);
                true
            }
            Some(_) => {
                tracing::debug!(
                    "Ignoring stale unregister for node {}: a newer handler is registered",
                    node_id
                );
                false
            }
            None => false,
        }
    }
}

/// Handle returned by [`NodeRegistry::register`].
///
/// Dropping it leaves the handler registered; call
/// [`unregister`](Registration::unregister) to remove it.
pub struct Registration {
    node_id: NodeId,
    generation: u64,
    registry: NodeRegistry,
}

impl Registration {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Remove the handler, unless it has been replaced since.
    pub fn unregister(self) -> bool {
        self.registry.remove_generation(&self.node_id, self.generation)
    }
}
