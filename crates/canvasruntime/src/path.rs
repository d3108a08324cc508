use canvascore::{Edge, NodeId};
use std::collections::{HashMap, HashSet};

/// Ordered, deduplicated list of the nodes reachable from `start_id`.
///
/// Depth-first pre-order: each outgoing edge's subtree is explored completely
/// before the next edge, and sibling edges are taken in storage order. A node
/// reached twice (cycle or diamond) keeps its first position. This order is
/// what decides which producer a shared downstream node sees first.
pub fn calculate_execution_path(start_id: &str, edges: &[Edge]) -> Vec<NodeId> {
    if start_id.is_empty() {
        tracing::error!("Cannot calculate execution path: empty start node id");
        return Vec::new();
    }

    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        outgoing
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut path = Vec::new();
    let mut stack = vec![start_id];

    while let Some(node_id) = stack.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        path.push(node_id.to_string());

        if let Some(targets) = outgoing.get(node_id) {
            // Reversed so the first edge is popped (and fully explored) first.
            stack.extend(
                targets
                    .iter()
                    .rev()
                    .filter(|target| !visited.contains(*target)),
            );
        }
    }

    tracing::debug!("Calculated execution path from {}: {:?}", start_id, path);
    path
}
