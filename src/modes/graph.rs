use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::parse_thought_type;
use crate::engine::{
    Edge, GraphEngine, GraphSnapshot, GraphStats, ScoreUpdate, ThoughtNode, ALL_TYPES,
};
use crate::error::AppResult;
use crate::session::{Access, SessionEngine, SessionRegistry};

// ============================================================================
// Parameters
// ============================================================================

/// Input parameters for creating an empty graph session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphInitParams {
    /// Optional session ID (generated if not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Parameters for operations that only need the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSessionParams {
    /// Graph session
    pub session_id: String,
}

/// Input parameters for adding a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeParams {
    /// Graph session
    pub session_id: String,
    /// The node content
    pub content: String,
    /// Caller-chosen node id (generated if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Thought type; graph nodes may be untyped
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub thought_type: Option<String>,
}

impl GraphNodeParams {
    /// Create params for an untyped node
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: content.into(),
            node_id: None,
            thought_type: None,
        }
    }

    /// Set the node id
    pub fn with_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Set the thought type
    pub fn with_type(mut self, thought_type: impl Into<String>) -> Self {
        self.thought_type = Some(thought_type.into());
        self
    }
}

/// Input parameters for adding an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgeParams {
    /// Graph session
    pub session_id: String,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Edge weight (default 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    /// Relationship label (default `relates_to`)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl GraphEdgeParams {
    /// Create params for a default edge
    pub fn new(
        session_id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source: source.into(),
            target: target.into(),
            weight: None,
            relation: None,
        }
    }

    /// Set the weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Set the relationship label
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }
}

/// Input parameters for merging nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMergeParams {
    /// Graph session
    pub session_id: String,
    /// Nodes to merge
    pub source_ids: Vec<String>,
    /// Content of the synthesis node
    pub content: String,
    /// Id of the synthesis node (generated if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_id: Option<String>,
}

/// Input parameters for score propagation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPropagateParams {
    /// Graph session
    pub session_id: String,
    /// Node whose score is forwarded to its successors
    pub node_id: String,
}

/// Input parameters for rebuilding a graph from a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDeserializeParams {
    /// Snapshot as produced by `serialize`
    pub snapshot: GraphSnapshot,
    /// Session to create (generated if not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

// ============================================================================
// Results
// ============================================================================

/// Result of creating a graph session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphInitResult {
    pub session_id: String,
    pub stats: GraphStats,
}

/// Result of adding or merging a node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNodeResult {
    pub session_id: String,
    pub node: ThoughtNode,
    pub suggestions: Vec<String>,
    pub total_nodes: usize,
}

/// Result of adding an edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdgeResult {
    pub session_id: String,
    pub edge: Edge,
    pub total_edges: usize,
}

/// Result of score propagation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphPropagateResult {
    pub session_id: String,
    pub node_id: String,
    pub updates: Vec<ScoreUpdate>,
}

/// Topological order of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphOrderResult {
    pub session_id: String,
    pub order: Vec<String>,
}

/// Cycle check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCycleResult {
    pub session_id: String,
    pub has_cycle: bool,
}

/// Graph statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStatsResult {
    pub session_id: String,
    #[serde(flatten)]
    pub stats: GraphStats,
}

/// Graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshotResult {
    pub session_id: String,
    pub snapshot: GraphSnapshot,
}

// ============================================================================
// Mode
// ============================================================================

/// Graph-of-Thoughts mode handler
#[derive(Clone)]
pub struct GraphMode {
    registry: Arc<SessionRegistry>,
}

impl GraphMode {
    /// Create a new graph mode handler
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Create an empty graph session
    pub async fn init(&self, params: GraphInitParams) -> AppResult<GraphInitResult> {
        let graph = GraphEngine::new();
        let stats = graph.get_stats();
        let session_id = self
            .registry
            .create(params.session_id, SessionEngine::Graph(graph))
            .await?;

        Ok(GraphInitResult { session_id, stats })
    }

    /// Add a node
    pub async fn add_node(&self, params: GraphNodeParams) -> AppResult<GraphNodeResult> {
        let kind = parse_thought_type(params.thought_type.as_deref(), ALL_TYPES)?;
        let GraphNodeParams {
            session_id,
            content,
            node_id,
            ..
        } = params;

        let (added, total_nodes) = self
            .registry
            .with_graph(&session_id, Access::Write, |graph| {
                let added = graph.add_node(content, node_id, kind)?;
                Ok((added, graph.node_count()))
            })
            .await?;

        info!(session_id = %session_id, node_id = %added.node.id, "Graph node added");

        Ok(GraphNodeResult {
            session_id,
            node: added.node,
            suggestions: added.suggestions,
            total_nodes,
        })
    }

    /// Add or replace an edge
    pub async fn add_edge(&self, params: GraphEdgeParams) -> AppResult<GraphEdgeResult> {
        let GraphEdgeParams {
            session_id,
            source,
            target,
            weight,
            relation,
        } = params;

        let (edge, total_edges) = self
            .registry
            .with_graph(&session_id, Access::Write, |graph| {
                let edge = graph.add_edge(&source, &target, weight, relation)?;
                Ok((edge, graph.edge_count()))
            })
            .await?;

        debug!(
            session_id = %session_id,
            source = %edge.source,
            target = %edge.target,
            "Graph edge added"
        );

        Ok(GraphEdgeResult {
            session_id,
            edge,
            total_edges,
        })
    }

    /// Merge several nodes into a synthesis node
    pub async fn merge(&self, params: GraphMergeParams) -> AppResult<GraphNodeResult> {
        let GraphMergeParams {
            session_id,
            source_ids,
            content,
            merged_id,
        } = params;

        let (added, total_nodes) = self
            .registry
            .with_graph(&session_id, Access::Write, |graph| {
                let added = graph.merge_nodes(&source_ids, content, merged_id)?;
                Ok((added, graph.node_count()))
            })
            .await?;

        info!(
            session_id = %session_id,
            merged_id = %added.node.id,
            sources = source_ids.len(),
            "Graph nodes merged"
        );

        Ok(GraphNodeResult {
            session_id,
            node: added.node,
            suggestions: added.suggestions,
            total_nodes,
        })
    }

    /// Forward a node's score to its direct successors
    pub async fn propagate(
        &self,
        params: GraphPropagateParams,
    ) -> AppResult<GraphPropagateResult> {
        let GraphPropagateParams {
            session_id,
            node_id,
        } = params;

        let updates = self
            .registry
            .with_graph(&session_id, Access::Write, |graph| {
                graph.propagate_scores(&node_id)
            })
            .await?;

        Ok(GraphPropagateResult {
            session_id,
            node_id,
            updates,
        })
    }

    /// Topological order; fails on a cyclic graph
    pub async fn topological_sort(
        &self,
        params: GraphSessionParams,
    ) -> AppResult<GraphOrderResult> {
        let order = self
            .registry
            .with_graph(&params.session_id, Access::Read, |graph| {
                graph.topological_sort()
            })
            .await?;

        Ok(GraphOrderResult {
            session_id: params.session_id,
            order,
        })
    }

    /// Whether the graph contains a directed cycle
    pub async fn has_cycle(&self, params: GraphSessionParams) -> AppResult<GraphCycleResult> {
        let has_cycle = self
            .registry
            .with_graph(&params.session_id, Access::Read, |graph| Ok(graph.has_cycle()))
            .await?;

        Ok(GraphCycleResult {
            session_id: params.session_id,
            has_cycle,
        })
    }

    /// Node and edge statistics
    pub async fn stats(&self, params: GraphSessionParams) -> AppResult<GraphStatsResult> {
        let stats = self
            .registry
            .with_graph(&params.session_id, Access::Read, |graph| Ok(graph.get_stats()))
            .await?;

        Ok(GraphStatsResult {
            session_id: params.session_id,
            stats,
        })
    }

    /// Full snapshot of nodes and edges
    pub async fn serialize(&self, params: GraphSessionParams) -> AppResult<GraphSnapshotResult> {
        let snapshot = self
            .registry
            .with_graph(&params.session_id, Access::Read, |graph| Ok(graph.serialize()))
            .await?;

        Ok(GraphSnapshotResult {
            session_id: params.session_id,
            snapshot,
        })
    }

    /// Create a new graph session from a snapshot
    pub async fn deserialize(
        &self,
        params: GraphDeserializeParams,
    ) -> AppResult<GraphInitResult> {
        let graph = GraphEngine::deserialize(params.snapshot)?;
        let stats = graph.get_stats();
        let session_id = self
            .registry
            .create(params.session_id, SessionEngine::Graph(graph))
            .await?;

        info!(
            session_id = %session_id,
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            "Graph restored from snapshot"
        );

        Ok(GraphInitResult { session_id, stats })
    }
}
