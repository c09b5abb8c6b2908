//! Graph engine - general directed graph of thoughts.
//!
//! Provides the structural operations for Graph-of-Thoughts reasoning:
//! - Add nodes and weighted, typed edges
//! - Cycle detection and topological ordering
//! - Single-hop score propagation
//! - Merging several nodes into a synthesis node
//! - Snapshot serialization with validated reconstruction
//!
//! Nodes are owned by one id-keyed map. Edges are kept twice, in a forward
//! (`source -> target`) and a reverse (`target -> source`) adjacency map that
//! are updated together on every insertion. Cycles are therefore plain data.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

use super::node::{
    type_label, validate_content, validate_id, AddedThought, IdSequence, ThoughtNode,
    ThoughtType,
};
use crate::error::{ReasoningError, ReasoningResult};

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;

/// Fraction of a node's score forwarded to each direct successor.
///
/// Fixed rather than configurable, and independent of edge weight.
pub const SCORE_INFLUENCE: f64 = 0.3;

/// Weight used when an edge is added without one.
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// Relationship label used when an edge is added without one.
pub const DEFAULT_RELATION: &str = "relates_to";

/// Relationship label of the provenance edges created by a merge.
pub const MERGE_RELATION: &str = "contributes_to";

/// Directed, weighted, labelled relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Edge weight.
    pub weight: f64,
    /// Free-form relationship label, e.g. `depends_on`.
    #[serde(rename = "type")]
    pub relation: String,
}

/// Engine-independent copy of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Nodes keyed by id.
    pub nodes: BTreeMap<String, ThoughtNode>,
    /// Every edge.
    pub edges: Vec<Edge>,
}

/// Aggregate statistics over a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes.
    pub total_nodes: usize,
    /// Number of edges.
    pub total_edges: usize,
    /// Nodes without incoming edges.
    pub root_nodes: usize,
    /// Nodes without outgoing edges.
    pub leaf_nodes: usize,
    /// Node count per thought type.
    pub type_distribution: BTreeMap<String, usize>,
}

/// Score change applied to one successor by [`GraphEngine::propagate_scores`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    /// The successor that received score.
    pub node_id: String,
    /// Score before propagation.
    pub previous: f64,
    /// Score after propagation.
    pub current: f64,
}

type Adjacency = HashMap<String, BTreeMap<String, Edge>>;

/// Directed graph of thought nodes.
#[derive(Debug, Clone)]
pub struct GraphEngine {
    nodes: HashMap<String, ThoughtNode>,
    /// Node ids in insertion order, for deterministic traversal.
    order: Vec<String>,
    forward: Adjacency,
    reverse: Adjacency,
    sequence: IdSequence,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphEngine {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
            sequence: IdSequence::new("node"),
        }
    }

    /// Add a node. The id is generated when omitted.
    pub fn add_node(
        &mut self,
        content: impl Into<String>,
        id: Option<String>,
        kind: Option<ThoughtType>,
    ) -> ReasoningResult<AddedThought> {
        let content = content.into();
        validate_content(&content)?;
        let id = self.claim_id(id)?;

        let node = ThoughtNode::new(id, content, kind);
        let suggestions = node.generate_suggestions();
        self.insert_node(node.clone());

        debug!(node_id = %node.id, "Graph node added");
        Ok(AddedThought { node, suggestions })
    }

    /// Add or replace the edge `source -> target`.
    ///
    /// Both endpoints must exist and differ. Re-adding a pair overwrites the
    /// previous edge.
    pub fn add_edge(
        &mut self,
        source: &str,
        target: &str,
        weight: Option<f64>,
        relation: Option<String>,
    ) -> ReasoningResult<Edge> {
        if source == target {
            return Err(ReasoningError::SelfLoop {
                node_id: source.to_string(),
            });
        }
        self.require(source)?;
        self.require(target)?;

        let weight = weight.unwrap_or(DEFAULT_EDGE_WEIGHT);
        if !weight.is_finite() {
            return Err(ReasoningError::Validation {
                field: "weight".to_string(),
                reason: "Weight must be a finite number".to_string(),
            });
        }
        let relation = relation.unwrap_or_else(|| DEFAULT_RELATION.to_string());
        if relation.trim().is_empty() {
            return Err(ReasoningError::Validation {
                field: "type".to_string(),
                reason: "Relationship type cannot be empty".to_string(),
            });
        }

        let edge = Edge {
            source: source.to_string(),
            target: target.to_string(),
            weight,
            relation,
        };
        self.forward
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone(), edge.clone());
        self.reverse
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone(), edge.clone());

        debug!(
            source = %edge.source,
            target = %edge.target,
            relation = %edge.relation,
            "Graph edge added"
        );
        Ok(edge)
    }

    /// Update a node's score and/or confidence.
    pub fn set_score(
        &mut self,
        id: &str,
        score: Option<f64>,
        confidence: Option<f64>,
    ) -> ReasoningResult<&ThoughtNode> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ReasoningError::MissingNode {
                node_id: id.to_string(),
            })?;
        node.set_score(score, confidence);
        Ok(&*node)
    }

    /// Look up a node.
    pub fn get_node(&self, id: &str) -> Option<&ThoughtNode> {
        self.nodes.get(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ThoughtNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// All edges, grouped by source in node insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.order
            .iter()
            .filter_map(|id| self.forward.get(id))
            .flat_map(|targets| targets.values())
    }

    /// Outgoing edges of a node.
    pub fn successors(&self, id: &str) -> Vec<&Edge> {
        self.forward
            .get(id)
            .map(|targets| targets.values().collect())
            .unwrap_or_default()
    }

    /// Incoming edges of a node.
    pub fn predecessors(&self, id: &str) -> Vec<&Edge> {
        self.reverse
            .get(id)
            .map(|sources| sources.values().collect())
            .unwrap_or_default()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.forward.values().map(BTreeMap::len).sum()
    }

    /// Detect cycles with a depth-first search from every unvisited node.
    ///
    /// Iterative three-colour search: `visited` holds every node reached,
    /// `rec_stack` the nodes on the current path. Path length is bounded by
    /// the heap, not the thread stack.
    pub fn has_cycle(&self) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut rec_stack: HashSet<&str> = HashSet::new();

        for start in &self.order {
            if visited.contains(start.as_str()) {
                continue;
            }

            let mut frames = vec![(start.as_str(), self.targets_of(start))];
            visited.insert(start.as_str());
            rec_stack.insert(start.as_str());

            while let Some((node, neighbors)) = frames.last_mut() {
                let node = *node;
                match neighbors.next() {
                    Some(neighbor) if rec_stack.contains(neighbor) => return true,
                    Some(neighbor) if !visited.contains(neighbor) => {
                        visited.insert(neighbor);
                        rec_stack.insert(neighbor);
                        frames.push((neighbor, self.targets_of(neighbor)));
                    }
                    Some(_) => {}
                    None => {
                        rec_stack.remove(node);
                        frames.pop();
                    }
                }
            }
        }

        false
    }

    fn targets_of<'a>(&'a self, id: &str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self.forward.get(id) {
            Some(targets) => Box::new(targets.keys().map(String::as_str)),
            None => Box::new(std::iter::empty()),
        }
    }

    /// Kahn's algorithm. Refuses to run on a cyclic graph.
    pub fn topological_sort(&self) -> ReasoningResult<Vec<String>> {
        if self.has_cycle() {
            return Err(ReasoningError::HasCycle);
        }

        let mut in_degree: HashMap<&str, usize> =
            self.order.iter().map(|id| (id.as_str(), 0)).collect();
        for targets in self.forward.values() {
            for target in targets.keys() {
                if let Some(degree) = in_degree.get_mut(target.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id.to_string());
            if let Some(targets) = self.forward.get(id) {
                for target in targets.keys() {
                    if let Some(degree) = in_degree.get_mut(target.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(target.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(ReasoningError::OrderingInvariant {
                sorted: sorted.len(),
                total: self.nodes.len(),
            });
        }
        Ok(sorted)
    }

    /// Add `score * SCORE_INFLUENCE` to every direct successor of `node_id`.
    ///
    /// Single hop only. Cascading through the graph is left to the caller,
    /// e.g. by invoking this for each node in topological order. A negative
    /// score contributes nothing, so propagation never lowers a score.
    /// If any successor's new score would not be finite, nothing changes.
    pub fn propagate_scores(&mut self, node_id: &str) -> ReasoningResult<Vec<ScoreUpdate>> {
        let contribution = (self.require(node_id)?.score * SCORE_INFLUENCE).max(0.0);

        let mut updates = Vec::new();
        for target in self.forward.get(node_id).into_iter().flat_map(BTreeMap::keys) {
            let Some(node) = self.nodes.get(target) else {
                continue;
            };
            let current = node.score + contribution;
            if !current.is_finite() {
                return Err(ReasoningError::Validation {
                    field: "score".to_string(),
                    reason: format!("Propagating into '{}' would overflow its score", target),
                });
            }
            updates.push(ScoreUpdate {
                node_id: target.clone(),
                previous: node.score,
                current,
            });
        }

        for update in &updates {
            if let Some(node) = self.nodes.get_mut(&update.node_id) {
                node.set_score(Some(update.current), None);
            }
        }

        debug!(node_id = %node_id, successors = updates.len(), "Scores propagated");
        Ok(updates)
    }

    /// Create a synthesis node from `source_ids`.
    ///
    /// All sources are checked before anything is created. The new node's
    /// score and confidence are the arithmetic means of the (deduplicated)
    /// sources, and each source gets a `contributes_to` edge to it.
    pub fn merge_nodes(
        &mut self,
        source_ids: &[String],
        merged_content: impl Into<String>,
        merged_id: Option<String>,
    ) -> ReasoningResult<AddedThought> {
        let merged_content = merged_content.into();
        validate_content(&merged_content)?;

        let mut seen = HashSet::new();
        let sources: Vec<&String> = source_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .collect();
        if sources.is_empty() {
            return Err(ReasoningError::Validation {
                field: "source_ids".to_string(),
                reason: "At least one source node is required".to_string(),
            });
        }

        // Summing pre-divided terms keeps the mean finite for finite inputs.
        let count = sources.len() as f64;
        let mut score_mean = 0.0;
        let mut confidence_mean = 0.0;
        for id in &sources {
            let node = self.require(id)?;
            score_mean += node.score / count;
            confidence_mean += node.confidence / count;
        }
        let sources: Vec<String> = sources.into_iter().cloned().collect();

        let id = self.claim_id(merged_id)?;
        let mut node = ThoughtNode::new(id, merged_content, Some(ThoughtType::Synthesis));
        node.score = score_mean;
        node.confidence = confidence_mean;
        let suggestions = node.generate_suggestions();
        let merged_id = node.id.clone();
        self.insert_node(node.clone());

        for source in &sources {
            self.add_edge(
                source,
                &merged_id,
                Some(DEFAULT_EDGE_WEIGHT),
                Some(MERGE_RELATION.to_string()),
            )?;
        }

        debug!(merged_id = %merged_id, sources = sources.len(), "Nodes merged");
        Ok(AddedThought { node, suggestions })
    }

    /// Deep, engine-independent copy of nodes and edges.
    pub fn serialize(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| (id.clone(), node.clone()))
                .collect(),
            edges: self.edges().cloned().collect(),
        }
    }

    /// Rebuild a graph from a snapshot, re-validating every edge.
    ///
    /// Nodes are inserted by creation time (then id). Edges go through
    /// [`GraphEngine::add_edge`], so a snapshot that references unknown ids
    /// or contains self-loops fails instead of producing dangling edges.
    pub fn deserialize(snapshot: GraphSnapshot) -> ReasoningResult<Self> {
        let mut nodes: Vec<(String, ThoughtNode)> = snapshot.nodes.into_iter().collect();
        nodes.sort_by(|(a_id, a), (b_id, b)| {
            a.created_at.cmp(&b.created_at).then_with(|| a_id.cmp(b_id))
        });

        let mut graph = Self::new();
        for (key, node) in nodes {
            validate_id(&node.id)?;
            if key != node.id {
                return Err(ReasoningError::InvalidSnapshot {
                    message: format!("node stored under '{}' has id '{}'", key, node.id),
                });
            }
            graph.insert_node(node);
        }

        for edge in snapshot.edges {
            graph.add_edge(
                &edge.source,
                &edge.target,
                Some(edge.weight),
                Some(edge.relation),
            )?;
        }

        Ok(graph)
    }

    /// Node and edge counts plus structural summaries.
    pub fn get_stats(&self) -> GraphStats {
        let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *type_distribution
                .entry(type_label(node.thought_type).to_string())
                .or_insert(0) += 1;
        }

        let has_edges = |adj: &Adjacency, id: &str| adj.get(id).is_some_and(|m| !m.is_empty());

        GraphStats {
            total_nodes: self.nodes.len(),
            total_edges: self.edge_count(),
            root_nodes: self
                .order
                .iter()
                .filter(|id| !has_edges(&self.reverse, id.as_str()))
                .count(),
            leaf_nodes: self
                .order
                .iter()
                .filter(|id| !has_edges(&self.forward, id.as_str()))
                .count(),
            type_distribution,
        }
    }

    fn require(&self, id: &str) -> ReasoningResult<&ThoughtNode> {
        self.nodes.get(id).ok_or_else(|| ReasoningError::MissingNode {
            node_id: id.to_string(),
        })
    }

    /// Validate a caller id or generate a fresh one.
    fn claim_id(&mut self, id: Option<String>) -> ReasoningResult<String> {
        match id {
            Some(id) => {
                validate_id(&id)?;
                if self.nodes.contains_key(&id) {
                    return Err(ReasoningError::DuplicateId { id });
                }
                Ok(id)
            }
            None => {
                let nodes = &self.nodes;
                Ok(self
                    .sequence
                    .next_unused(|candidate| nodes.contains_key(candidate)))
            }
        }
    }

    fn insert_node(&mut self, node: ThoughtNode) {
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }
}
