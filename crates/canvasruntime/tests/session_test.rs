use async_trait::async_trait;
use canvascore::{
    CanvasDocument, CanvasError, CanvasNode, Envelope, ExecutionState, FlowError, Node,
    NodeContext, NodeError, NodeKind, NodeOutput, NodeState, Payload, SourceInfo, StatusFlags,
};
use canvasruntime::{
    CanvasSession, ExecutorConfig, MountContext, NodeCatalog, NodeFactory, RuntimeConfig,
};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Echoes its `text` setting and remembers what happened to it.
struct Recorder {
    kind: NodeKind,
    sources: Arc<Mutex<Vec<Vec<SourceInfo>>>>,
    resets: Arc<Mutex<usize>>,
}

#[async_trait]
impl Node for Recorder {
    fn kind(&self) -> NodeKind {
        self.kind.clone()
    }

    async fn execute(&self, ctx: NodeContext, _input: Envelope) -> Result<NodeOutput, NodeError> {
        Ok(match ctx.state.get_str("text") {
            Some(text) => Payload::text(text),
            None => Payload::Trigger,
        }
        .into())
    }

    fn sources_changed(&self, sources: &[SourceInfo]) {
        self.sources.lock().unwrap().push(sources.to_vec());
    }

    fn reset(&self) {
        *self.resets.lock().unwrap() += 1;
    }
}

#[derive(Clone, Default)]
struct Recorders {
    sources: Arc<Mutex<Vec<Vec<SourceInfo>>>>,
    resets: Arc<Mutex<usize>>,
    mounted: Arc<Mutex<Vec<String>>>,
}

struct RecorderFactory {
    kind: NodeKind,
    recorders: Recorders,
}

impl NodeFactory for RecorderFactory {
    fn create(&self, mount: &MountContext) -> Result<Arc<dyn Node>, NodeError> {
        self.recorders.mounted.lock().unwrap().push(mount.node_id.clone());
        Ok(Arc::new(Recorder {
            kind: self.kind.clone(),
            sources: self.recorders.sources.clone(),
            resets: self.recorders.resets.clone(),
        }))
    }

    fn node_kind(&self) -> NodeKind {
        self.kind.clone()
    }
}

fn session(recorders: &Recorders) -> CanvasSession {
    let mut catalog = NodeCatalog::new();
    for kind in [NodeKind::Start, NodeKind::Text, NodeKind::Wait] {
        catalog.register(Arc::new(RecorderFactory {
            kind,
            recorders: recorders.clone(),
        }));
    }
    CanvasSession::with_config(
        Arc::new(catalog),
        RuntimeConfig {
            executor: ExecutorConfig {
                settle_delay: Duration::ZERO,
                decay_window: Duration::from_secs(60),
            },
            event_buffer_size: 100,
        },
    )
}

#[tokio::test]
async fn test_start_without_connections_cannot_trigger() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    session
        .add_node(CanvasNode::new("start", NodeKind::Start))
        .await
        .unwrap();
    session
        .add_node(CanvasNode::new("text", NodeKind::Text).with_data("text", "hello"))
        .await
        .unwrap();

    let err = session.trigger_start("start").await.unwrap_err();
    assert!(matches!(err, FlowError::Canvas(CanvasError::NotConnected(_))));

    session.connect("start", "text").await.unwrap();
    let outcome = session.trigger_start("start").await.unwrap();

    assert_eq!(outcome.report().unwrap().completed, vec!["start", "text"]);
    assert_eq!(
        session.latest_output("text").await,
        Some(Payload::text("hello"))
    );
    assert_eq!(
        session.node_status("text").await,
        Some(ExecutionState::Complete)
    );
}

#[tokio::test]
async fn test_only_start_nodes_trigger() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    session
        .add_node(CanvasNode::new("a", NodeKind::Text))
        .await
        .unwrap();
    session
        .add_node(CanvasNode::new("b", NodeKind::Text))
        .await
        .unwrap();
    session.connect("a", "b").await.unwrap();

    let err = session.trigger_start("a").await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Canvas(CanvasError::NotAStartNode { .. })
    ));
    // Direct execution has no such gate.
    assert!(session.execute_flow("a").await.unwrap().report().is_some());
}

#[tokio::test]
async fn test_removing_node_cascades_edges_and_unregisters() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    for id in ["a", "b", "c"] {
        session
            .add_node(CanvasNode::new(id, NodeKind::Text))
            .await
            .unwrap();
    }
    session.connect("a", "b").await.unwrap();
    session.connect("b", "c").await.unwrap();
    assert_eq!(session.registry().len(), 3);

    session.remove_node("b").await.unwrap();

    let snapshot = session.snapshot().await;
    assert!(snapshot.edges.is_empty());
    assert_eq!(snapshot.nodes.len(), 2);
    assert!(!session.registry().contains("b"));
    // c lost its only source.
    assert_eq!(recorders.sources.lock().unwrap().last().unwrap(), &Vec::new());
}

#[tokio::test]
async fn test_connection_changes_reach_the_target_handler() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    for (id, kind) in [("a", NodeKind::Text), ("w", NodeKind::Wait)] {
        session.add_node(CanvasNode::new(id, kind)).await.unwrap();
    }

    let edge = session.connect("a", "w").await.unwrap();
    session.disconnect(&edge).await.unwrap();

    let seen = recorders.sources.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![vec![SourceInfo::new("a", NodeKind::Text)], Vec::new()]
    );
}

#[tokio::test]
async fn test_update_node_data_is_read_on_next_run() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    session
        .add_node(CanvasNode::new("t", NodeKind::Text).with_data("text", "first"))
        .await
        .unwrap();

    session.execute_flow("t").await.unwrap();
    assert_eq!(session.latest_output("t").await, Some(Payload::text("first")));

    session
        .update_node_data("t", NodeState::new().with("text", "second"))
        .await
        .unwrap();
    session.execute_flow("t").await.unwrap();
    assert_eq!(
        session.latest_output("t").await,
        Some(Payload::text("second"))
    );
    // Reconfiguring does not remount.
    assert_eq!(recorders.mounted.lock().unwrap().len(), 1);

    assert!(session
        .update_node_data("ghost", NodeState::new())
        .await
        .is_err());
}

#[tokio::test]
async fn test_load_mounts_every_known_node() {
    let json = r#"{
        "nodes": [
            {"id": "start", "type": "startNode", "position": {"x": 0, "y": 0}, "data": {}},
            {"id": "t", "type": "textNode", "position": {"x": 200, "y": 0},
             "data": {"text": "loaded", "isExecuting": true}},
            {"id": "note", "type": "stickyNote", "position": {"x": 0, "y": 300}, "data": {}}
        ],
        "edges": [{"id": "e1", "source": "start", "target": "t"}],
        "format": "canvas",
        "version": "1.0"
    }"#;
    let recorders = Recorders::default();
    let session = session(&recorders);

    session
        .load(CanvasDocument::from_json(json).unwrap())
        .await
        .unwrap();

    assert_eq!(*recorders.mounted.lock().unwrap(), vec!["start", "t"]);
    assert!(!session.registry().contains("note"));

    session.trigger_start("start").await.unwrap();
    assert_eq!(
        session.latest_output("t").await,
        Some(Payload::text("loaded"))
    );

    let saved = session.snapshot().await;
    let text = saved.nodes.iter().find(|n| n.id == "t").unwrap();
    assert!(text.data.get("isExecuting").is_none());
    assert_eq!(saved.nodes.len(), 3);
}

#[tokio::test]
async fn test_snapshot_keeps_viewport_and_unknown_keys() {
    let json = r#"{
        "nodes": [{"id": "start", "type": "startNode", "position": {"x": 0, "y": 0}, "data": {}}],
        "edges": [],
        "format": "canvas",
        "version": "1.0",
        "viewport": {"x": 10, "y": 20, "zoom": 1.5},
        "created": "2024-01-01"
    }"#;
    let session = session(&Recorders::default());
    session
        .load(CanvasDocument::from_json(json).unwrap())
        .await
        .unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&session.snapshot().await.to_json().unwrap()).unwrap();

    assert_eq!(saved["viewport"]["zoom"], 1.5);
    assert_eq!(saved["viewport"]["x"], 10);
    assert_eq!(saved["created"], "2024-01-01");
}

#[tokio::test]
async fn test_reload_replaces_previous_handlers() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    session
        .add_node(CanvasNode::new("old", NodeKind::Text))
        .await
        .unwrap();

    let mut document = session.snapshot().await;
    document.nodes.clear();
    document
        .nodes
        .push(CanvasNode::new("fresh", NodeKind::Text));
    session.load(document).await.unwrap();

    assert_eq!(session.registry().ids(), vec!["fresh".to_string()]);
}

#[tokio::test]
async fn test_reset_node_reaches_handler() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    session
        .add_node(CanvasNode::new("w", NodeKind::Wait))
        .await
        .unwrap();

    session.reset_node("w").await.unwrap();
    assert_eq!(*recorders.resets.lock().unwrap(), 1);
    assert!(session.reset_node("ghost").await.is_err());
}

#[tokio::test]
async fn test_statuses_cover_every_node() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    for id in ["a", "b"] {
        session
            .add_node(CanvasNode::new(id, NodeKind::Text))
            .await
            .unwrap();
    }
    session.execute_flow("a").await.unwrap();

    assert_eq!(
        session.statuses().await,
        vec![
            ("a".to_string(), ExecutionState::Complete),
            ("b".to_string(), ExecutionState::Idle)
        ]
    );
}

#[tokio::test]
async fn test_status_flags_mirror_states() {
    let recorders = Recorders::default();
    let session = session(&recorders);
    for id in ["a", "b"] {
        session
            .add_node(CanvasNode::new(id, NodeKind::Text))
            .await
            .unwrap();
    }
    session.execute_flow("a").await.unwrap();

    let flags = session.status_flags().await;
    assert_eq!(flags.len(), 2);

    let (id, ran) = &flags[0];
    assert_eq!(id, "a");
    assert!(ran.execution_complete);
    assert!(ran.is_in_execution_path);
    assert!(!ran.is_executing);
    assert!(!ran.execution_error);

    let (id, idle) = &flags[1];
    assert_eq!(id, "b");
    assert_eq!(*idle, StatusFlags::default());

    let served = serde_json::to_value(ran).unwrap();
    assert_eq!(served["executionComplete"], true);
    assert_eq!(served["isInExecutionPath"], true);
}
