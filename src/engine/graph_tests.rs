//! Unit tests for the graph engine.
//!
//! Covers node and edge insertion, cycle detection, ordering,
//! propagation, merging, snapshots and statistics.

use super::*;
use crate::engine::node::UNTYPED_LABEL;

fn node(graph: &mut GraphEngine, id: &str, kind: Option<ThoughtType>) {
    graph
        .add_node(format!("content of {}", id), Some(id.to_string()), kind)
        .unwrap();
}

fn edge(graph: &mut GraphEngine, source: &str, target: &str) {
    graph.add_edge(source, target, None, None).unwrap();
}

/// `a -> b -> c` plus `a -> c`.
fn diamond_free_dag() -> GraphEngine {
    let mut graph = GraphEngine::new();
    for id in ["a", "b", "c"] {
        node(&mut graph, id, Some(ThoughtType::Reasoning));
    }
    edge(&mut graph, "a", "b");
    edge(&mut graph, "b", "c");
    edge(&mut graph, "a", "c");
    graph
}

// ============================================================================
// Node Tests
// ============================================================================

#[test]
fn test_add_node_generates_ids() {
    let mut graph = GraphEngine::new();
    let first = graph.add_node("first", None, None).unwrap();
    let second = graph.add_node("second", None, None).unwrap();

    assert_eq!(first.node.id, "node-1");
    assert_eq!(second.node.id, "node-2");
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_add_node_rejects_duplicate_id() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);

    let err = graph
        .add_node("other", Some("a".to_string()), None)
        .unwrap_err();
    assert_eq!(
        err,
        ReasoningError::DuplicateId {
            id: "a".to_string()
        }
    );
    assert_eq!(graph.get_node("a").unwrap().content, "content of a");
}

#[test]
fn test_untyped_node_gets_generic_suggestion() {
    let mut graph = GraphEngine::new();
    let added = graph.add_node("loose idea", None, None).unwrap();

    assert!(added.node.thought_type.is_none());
    assert_eq!(added.suggestions.len(), 1);
}

#[test]
fn test_graph_accepts_synthesis_type() {
    let mut graph = GraphEngine::new();
    let added = graph
        .add_node("combined", None, Some(ThoughtType::Synthesis))
        .unwrap();
    assert_eq!(added.node.thought_type, Some(ThoughtType::Synthesis));
}

#[test]
fn test_set_score_updates_node() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);

    let updated = graph.set_score("a", Some(0.8), None).unwrap();
    assert!((updated.score - 0.8).abs() < f64::EPSILON);
    assert!((updated.confidence - 0.0).abs() < f64::EPSILON);

    assert!(matches!(
        graph.set_score("missing", Some(1.0), None),
        Err(ReasoningError::MissingNode { .. })
    ));
}

// ============================================================================
// Edge Tests
// ============================================================================

#[test]
fn test_add_edge_defaults() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);
    node(&mut graph, "b", None);

    let edge = graph.add_edge("a", "b", None, None).unwrap();
    assert_eq!(edge.relation, DEFAULT_RELATION);
    assert!((edge.weight - DEFAULT_EDGE_WEIGHT).abs() < f64::EPSILON);
}

#[test]
fn test_self_loop_rejected_even_for_unknown_node() {
    let mut graph = GraphEngine::new();
    let err = graph.add_edge("x", "x", None, None).unwrap_err();
    assert_eq!(
        err,
        ReasoningError::SelfLoop {
            node_id: "x".to_string()
        }
    );
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn test_edge_to_missing_node_rejected() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);

    let err = graph.add_edge("a", "ghost", None, None).unwrap_err();
    assert_eq!(
        err,
        ReasoningError::MissingNode {
            node_id: "ghost".to_string()
        }
    );
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.successors("a").is_empty());
}

#[test]
fn test_edge_rejects_non_finite_weight() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);
    node(&mut graph, "b", None);

    let err = graph.add_edge("a", "b", Some(f64::NAN), None).unwrap_err();
    assert!(matches!(err, ReasoningError::Validation { .. }));
    assert_eq!(graph.edge_count(), 0);
}

#[test]
fn test_readding_edge_overwrites() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);
    node(&mut graph, "b", None);

    graph
        .add_edge("a", "b", Some(0.5), Some("supports".to_string()))
        .unwrap();
    graph
        .add_edge("a", "b", Some(0.9), Some("depends_on".to_string()))
        .unwrap();

    assert_eq!(graph.edge_count(), 1);
    let forward = graph.successors("a");
    let reverse = graph.predecessors("b");
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].relation, "depends_on");
    assert_eq!(forward[0], reverse[0]);
}

#[test]
fn test_adjacency_maps_mirror_each_other() {
    let graph = diamond_free_dag();
    for edge in graph.edges() {
        assert!(graph
            .predecessors(&edge.target)
            .iter()
            .any(|e| e.source == edge.source));
    }
    let forward: usize = graph.nodes().map(|n| graph.successors(&n.id).len()).sum();
    let reverse: usize = graph.nodes().map(|n| graph.predecessors(&n.id).len()).sum();
    assert_eq!(forward, reverse);
    assert_eq!(forward, graph.edge_count());
}

// ============================================================================
// Cycle and Ordering Tests
// ============================================================================

#[test]
fn test_empty_graph_has_no_cycle_and_sorts_empty() {
    let graph = GraphEngine::new();
    assert!(!graph.has_cycle());
    assert!(graph.topological_sort().unwrap().is_empty());
}

#[test]
fn test_dag_has_no_cycle() {
    let graph = diamond_free_dag();
    assert!(!graph.has_cycle());
}

#[test]
fn test_cycle_detected_and_sort_refused() {
    let mut graph = GraphEngine::new();
    for id in ["A", "B", "C"] {
        node(&mut graph, id, None);
    }
    edge(&mut graph, "A", "B");
    edge(&mut graph, "B", "C");
    edge(&mut graph, "C", "A");

    assert!(graph.has_cycle());
    assert_eq!(graph.topological_sort(), Err(ReasoningError::HasCycle));
}

#[test]
fn test_cycle_in_disconnected_component() {
    let mut graph = GraphEngine::new();
    for id in ["lonely", "x", "y"] {
        node(&mut graph, id, None);
    }
    edge(&mut graph, "x", "y");
    edge(&mut graph, "y", "x");
    assert!(graph.has_cycle());
}

#[test]
fn test_topological_sort_respects_edges() {
    let graph = diamond_free_dag();
    let order = graph.topological_sort().unwrap();
    assert_eq!(order, vec!["a", "b", "c"]);

    let position = |id: &str| order.iter().position(|x| x == id).unwrap();
    for edge in graph.edges() {
        assert!(position(&edge.source) < position(&edge.target));
    }
}

#[test]
fn test_topological_sort_covers_every_node() {
    let mut graph = diamond_free_dag();
    node(&mut graph, "island", None);
    let order = graph.topological_sort().unwrap();
    assert_eq!(order.len(), graph.node_count());
}

#[test]
fn test_long_chain_checked_without_recursion() {
    const LEN: usize = 100_000;
    let mut graph = GraphEngine::new();
    for i in 0..LEN {
        node(&mut graph, &format!("n{}", i), None);
    }
    for i in 1..LEN {
        edge(&mut graph, &format!("n{}", i - 1), &format!("n{}", i));
    }

    assert!(!graph.has_cycle());
    let order = graph.topological_sort().unwrap();
    assert_eq!(order.len(), LEN);
    assert_eq!(order[0], "n0");
    assert_eq!(order[LEN - 1], format!("n{}", LEN - 1));

    edge(&mut graph, &format!("n{}", LEN - 1), "n0");
    assert!(graph.has_cycle());
    assert_eq!(graph.topological_sort(), Err(ReasoningError::HasCycle));
}

#[test]
fn test_cycle_reached_through_shared_descendant() {
    let mut graph = GraphEngine::new();
    for id in ["a", "b", "c", "d"] {
        node(&mut graph, id, None);
    }
    // `d` is reached twice without forming a cycle, then `d -> b` closes one.
    edge(&mut graph, "a", "b");
    edge(&mut graph, "a", "d");
    edge(&mut graph, "b", "c");
    edge(&mut graph, "c", "d");
    assert!(!graph.has_cycle());

    edge(&mut graph, "d", "b");
    assert!(graph.has_cycle());
}

// ============================================================================
// Propagation Tests
// ============================================================================

#[test]
fn test_propagate_scores_single_hop() {
    let mut graph = diamond_free_dag();
    graph.set_score("a", Some(1.0), None).unwrap();
    graph.set_score("b", Some(0.2), None).unwrap();

    let updates = graph.propagate_scores("a").unwrap();
    assert_eq!(updates.len(), 2);

    let b = graph.get_node("b").unwrap();
    let c = graph.get_node("c").unwrap();
    assert!((b.score - 0.5).abs() < 1e-9);
    assert!((c.score - SCORE_INFLUENCE).abs() < 1e-9);
    assert!((graph.get_node("a").unwrap().score - 1.0).abs() < f64::EPSILON);

    let update = updates.iter().find(|u| u.node_id == "b").unwrap();
    assert!((update.previous - 0.2).abs() < 1e-9);
    assert!((update.current - 0.5).abs() < 1e-9);
}

#[test]
fn test_propagate_ignores_edge_weight() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "a", None);
    node(&mut graph, "b", None);
    graph.add_edge("a", "b", Some(0.1), None).unwrap();
    graph.set_score("a", Some(2.0), None).unwrap();

    graph.propagate_scores("a").unwrap();
    assert!((graph.get_node("b").unwrap().score - 0.6).abs() < 1e-9);
}

#[test]
fn test_propagate_never_decreases_scores() {
    let mut graph = diamond_free_dag();
    graph.set_score("a", Some(-5.0), None).unwrap();
    graph.set_score("b", Some(0.4), None).unwrap();

    let updates = graph.propagate_scores("a").unwrap();
    for update in &updates {
        assert!(update.current >= update.previous);
    }
    assert!((graph.get_node("b").unwrap().score - 0.4).abs() < f64::EPSILON);
}

#[test]
fn test_propagate_overflow_rejected_without_changes() {
    let mut graph = diamond_free_dag();
    graph.set_score("a", Some(f64::MAX), None).unwrap();
    graph.set_score("b", Some(1.0), None).unwrap();
    graph.set_score("c", Some(f64::MAX), None).unwrap();

    let err = graph.propagate_scores("a").unwrap_err();
    assert!(matches!(err, ReasoningError::Validation { ref field, .. } if field == "score"));

    assert!((graph.get_node("b").unwrap().score - 1.0).abs() < f64::EPSILON);
    assert_eq!(graph.get_node("c").unwrap().score, f64::MAX);

    let json = serde_json::to_value(graph.serialize()).unwrap();
    let restored: GraphSnapshot = serde_json::from_value(json).unwrap();
    assert!(GraphEngine::deserialize(restored).is_ok());
}

#[test]
fn test_merge_of_extreme_scores_stays_finite() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", None);
    node(&mut graph, "y", None);
    graph.set_score("x", Some(f64::MAX), None).unwrap();
    graph.set_score("y", Some(f64::MAX), None).unwrap();

    let merged = graph
        .merge_nodes(&["x".to_string(), "y".to_string()], "both", None)
        .unwrap();
    assert!(merged.node.score.is_finite());
}

#[test]
fn test_propagate_from_sink_is_noop() {
    let mut graph = diamond_free_dag();
    graph.set_score("c", Some(1.0), None).unwrap();
    assert!(graph.propagate_scores("c").unwrap().is_empty());
}

#[test]
fn test_propagate_missing_node() {
    let mut graph = GraphEngine::new();
    assert!(matches!(
        graph.propagate_scores("nope"),
        Err(ReasoningError::MissingNode { .. })
    ));
}

// ============================================================================
// Merge Tests
// ============================================================================

#[test]
fn test_merge_averages_and_links_sources() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", Some(ThoughtType::Analysis));
    node(&mut graph, "y", Some(ThoughtType::Reasoning));
    graph.set_score("x", Some(0.8), Some(0.6)).unwrap();
    graph.set_score("y", Some(0.4), Some(0.2)).unwrap();

    let merged = graph
        .merge_nodes(
            &["x".to_string(), "y".to_string()],
            "combined",
            Some("m".to_string()),
        )
        .unwrap();

    assert_eq!(merged.node.id, "m");
    assert_eq!(merged.node.thought_type, Some(ThoughtType::Synthesis));
    assert!((merged.node.score - 0.6).abs() < 1e-9);
    assert!((merged.node.confidence - 0.4).abs() < 1e-9);

    let incoming = graph.predecessors("m");
    assert_eq!(incoming.len(), 2);
    for edge in incoming {
        assert_eq!(edge.relation, MERGE_RELATION);
        assert!((edge.weight - 1.0).abs() < f64::EPSILON);
    }
    assert!(!graph.has_cycle());
}

#[test]
fn test_merge_single_source() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", None);
    graph.set_score("x", Some(0.7), Some(0.9)).unwrap();

    let merged = graph.merge_nodes(&["x".to_string()], "alone", None).unwrap();
    assert!((merged.node.score - 0.7).abs() < 1e-9);
    assert!((merged.node.confidence - 0.9).abs() < 1e-9);
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_merge_deduplicates_sources() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", None);
    node(&mut graph, "y", None);
    graph.set_score("x", Some(1.0), None).unwrap();

    let merged = graph
        .merge_nodes(
            &["x".to_string(), "x".to_string(), "y".to_string()],
            "combined",
            None,
        )
        .unwrap();
    assert!((merged.node.score - 0.5).abs() < 1e-9);
    assert_eq!(graph.predecessors(&merged.node.id).len(), 2);
}

#[test]
fn test_merge_with_missing_source_is_atomic() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", None);
    let before = graph.serialize();

    let err = graph
        .merge_nodes(
            &["x".to_string(), "ghost".to_string()],
            "combined",
            Some("m".to_string()),
        )
        .unwrap_err();

    assert_eq!(
        err,
        ReasoningError::MissingNode {
            node_id: "ghost".to_string()
        }
    );
    assert_eq!(graph.serialize(), before);
    assert!(graph.get_node("m").is_none());
}

#[test]
fn test_merge_rejects_empty_sources_and_existing_id() {
    let mut graph = GraphEngine::new();
    node(&mut graph, "x", None);

    assert!(matches!(
        graph.merge_nodes(&[], "nothing", None),
        Err(ReasoningError::Validation { .. })
    ));
    assert!(matches!(
        graph.merge_nodes(&["x".to_string()], "clash", Some("x".to_string())),
        Err(ReasoningError::DuplicateId { .. })
    ));
    assert_eq!(graph.node_count(), 1);
}

// ============================================================================
// Snapshot Tests
// ============================================================================

#[test]
fn test_serialize_deserialize_preserves_graph() {
    let mut graph = diamond_free_dag();
    graph.set_score("a", Some(0.9), Some(0.5)).unwrap();
    graph
        .add_edge("b", "c", Some(0.25), Some("supports".to_string()))
        .unwrap();

    let snapshot = graph.serialize();
    let restored = GraphEngine::deserialize(snapshot.clone()).unwrap();

    assert_eq!(restored.node_count(), graph.node_count());
    assert_eq!(restored.edge_count(), graph.edge_count());
    assert_eq!(restored.serialize().nodes, snapshot.nodes);
    for edge in &snapshot.edges {
        assert!(restored.edges().any(|e| e == edge));
    }
    assert_eq!(restored.has_cycle(), graph.has_cycle());
    assert_eq!(
        restored.topological_sort().unwrap(),
        graph.topological_sort().unwrap()
    );
}

#[test]
fn test_snapshot_json_uses_type_field() {
    let graph = diamond_free_dag();
    let value = serde_json::to_value(graph.serialize()).unwrap();
    assert_eq!(value["edges"][0]["type"], DEFAULT_RELATION);
    assert_eq!(value["nodes"]["a"]["type"], "reasoning");
}

#[test]
fn test_deserialize_rejects_dangling_edge() {
    let mut snapshot = diamond_free_dag().serialize();
    snapshot.edges.push(Edge {
        source: "a".to_string(),
        target: "ghost".to_string(),
        weight: 1.0,
        relation: DEFAULT_RELATION.to_string(),
    });

    assert!(matches!(
        GraphEngine::deserialize(snapshot),
        Err(ReasoningError::MissingNode { .. })
    ));
}

#[test]
fn test_deserialize_rejects_key_mismatch() {
    let mut snapshot = GraphSnapshot {
        nodes: BTreeMap::new(),
        edges: Vec::new(),
    };
    snapshot
        .nodes
        .insert("k".to_string(), ThoughtNode::new("other", "content", None));

    assert!(matches!(
        GraphEngine::deserialize(snapshot),
        Err(ReasoningError::InvalidSnapshot { .. })
    ));
}

#[test]
fn test_deserialized_graph_continues_generating_fresh_ids() {
    let mut graph = GraphEngine::new();
    graph.add_node("first", None, None).unwrap();

    let mut restored = GraphEngine::deserialize(graph.serialize()).unwrap();
    let added = restored.add_node("second", None, None).unwrap();
    assert_eq!(added.node.id, "node-2");
}

// ============================================================================
// Stats Tests
// ============================================================================

#[test]
fn test_stats() {
    let mut graph = diamond_free_dag();
    node(&mut graph, "loose", None);

    let stats = graph.get_stats();
    assert_eq!(stats.total_nodes, 4);
    assert_eq!(stats.total_edges, 3);
    assert_eq!(stats.root_nodes, 2);
    assert_eq!(stats.leaf_nodes, 2);
    assert_eq!(stats.type_distribution.get("reasoning"), Some(&3));
    assert_eq!(stats.type_distribution.get(UNTYPED_LABEL), Some(&1));
}

#[test]
fn test_stats_empty_graph() {
    let stats = GraphEngine::new().get_stats();
    assert_eq!(stats.total_nodes, 0);
    assert_eq!(stats.total_edges, 0);
    assert!(stats.type_distribution.is_empty());
}
