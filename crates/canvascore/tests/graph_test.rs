// crates/canvascore/tests/graph_test.rs

use canvascore::{Canvas, CanvasError, CanvasNode, Edge, ExecutionState, NodeKind};

fn chain() -> Canvas {
    let mut canvas = Canvas::new();
    canvas.add_node(CanvasNode::new("start", NodeKind::Start)).unwrap();
    canvas.add_node(CanvasNode::new("text", NodeKind::Text)).unwrap();
    canvas.add_node(CanvasNode::new("chat", NodeKind::AiChat)).unwrap();
    canvas.add_edge(Edge::with_id("e1", "start", "text")).unwrap();
    canvas.add_edge(Edge::with_id("e2", "text", "chat")).unwrap();
    canvas
}

#[test]
fn test_add_edge_requires_both_endpoints() {
    let mut canvas = chain();

    let result = canvas.add_edge(Edge::new("text", "ghost"));
    assert!(matches!(result, Err(CanvasError::InvalidEdge { .. })));
    assert_eq!(canvas.edges.len(), 2);
}

#[test]
fn test_duplicate_node_ids_are_rejected() {
    let mut canvas = chain();

    let result = canvas.add_node(CanvasNode::new("text", NodeKind::Text));
    assert!(matches!(result, Err(CanvasError::DuplicateNode(id)) if id == "text"));
}

#[test]
fn test_duplicate_edges_are_kept() {
    let mut canvas = chain();
    canvas.connect("text", "chat").unwrap();

    assert_eq!(canvas.connected_edges("chat").len(), 2);
    assert_eq!(canvas.incoming_sources("chat"), vec!["text".to_string()]);
}

#[test]
fn test_remove_node_cascades_edges() {
    let mut canvas = chain();

    let (node, removed) = canvas.remove_node("text").unwrap();
    assert_eq!(node.id, "text");

    let removed_ids: Vec<_> = removed.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(removed_ids, vec!["e1", "e2"]);
    assert!(canvas.edges.is_empty());
    assert!(canvas.connected_edges("start").is_empty());
}

#[test]
fn test_connected_edges_covers_both_directions() {
    let canvas = chain();

    let ids: Vec<_> = canvas
        .connected_edges("text")
        .into_iter()
        .map(|e| e.id.clone())
        .collect();
    assert_eq!(ids, vec!["e1", "e2"]);
    assert_eq!(canvas.outgoing_targets("text"), vec!["chat".to_string()]);
}

#[test]
fn test_start_node_connection_flag_tracks_edges() {
    let mut canvas = chain();
    assert!(canvas.find_node("start").unwrap().has_connections);
    assert!(!canvas.find_node("text").unwrap().has_connections);

    canvas.remove_edge("e1").unwrap();
    assert!(!canvas.find_node("start").unwrap().has_connections);
}

#[test]
fn test_cycle_detection_is_diagnostic_only() {
    let mut canvas = chain();
    assert!(canvas.is_acyclic());

    canvas.connect("chat", "text").unwrap();
    assert!(!canvas.is_acyclic());
    assert_eq!(canvas.edges.len(), 3);
}

#[test]
fn test_reset_status() {
    let mut canvas = chain();
    canvas.set_status("text", ExecutionState::Complete);
    canvas.set_status("chat", ExecutionState::Error);

    canvas.reset_status();

    assert!(canvas
        .nodes
        .iter()
        .all(|n| n.status == ExecutionState::Idle));
}

#[test]
fn test_unknown_node_types_keep_their_name() {
    let kind = NodeKind::from("noteNode");
    assert_eq!(kind, NodeKind::Other("noteNode".to_string()));
    assert_eq!(kind.to_string(), "noteNode");
    assert_eq!(NodeKind::from("youtubeNode"), NodeKind::Video);
}
