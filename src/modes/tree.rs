use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parse_thought_type;
use crate::engine::{
    ReflectionOutcome, ThoughtType, TreeEngine, TreeNode, TreeReflection, SEQUENTIAL_TYPES,
};
use crate::error::AppResult;
use crate::session::{Access, SessionEngine, SessionRegistry};

/// Input parameters for creating a tree session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeInitParams {
    /// Problem statement held by the root
    pub problem: String,
    /// Optional session ID (generated if not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TreeInitParams {
    /// Create params for a tree rooted at `problem`
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            session_id: None,
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of creating a tree session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeInitResult {
    pub session_id: String,
    pub root: TreeNode,
}

/// Input parameters for adding a thought to a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeThoughtParams {
    /// Tree session
    pub session_id: String,
    /// The thought content
    pub content: String,
    /// Parent node; omitted or `"root"` attaches to the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Thought type; defaults to `reasoning`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub thought_type: Option<String>,
    /// Caller-chosen node id (generated if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_id: Option<String>,
}

impl TreeThoughtParams {
    /// Create params for a thought under the root
    pub fn new(session_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            content: content.into(),
            parent_id: None,
            thought_type: None,
            thought_id: None,
        }
    }

    /// Set the parent node
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the thought type
    pub fn with_type(mut self, thought_type: impl Into<String>) -> Self {
        self.thought_type = Some(thought_type.into());
        self
    }

    /// Set the node id
    pub fn with_id(mut self, thought_id: impl Into<String>) -> Self {
        self.thought_id = Some(thought_id.into());
        self
    }
}

/// Result of adding a thought
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeThoughtResult {
    pub session_id: String,
    pub thought: TreeNode,
    pub suggestions: Vec<String>,
    pub total_nodes: usize,
}

/// Input parameters for node queries (path, siblings)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNodeParams {
    /// Tree session
    pub session_id: String,
    /// Node to query
    pub node_id: String,
}

/// Root-to-node path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreePathResult {
    pub session_id: String,
    pub node_id: String,
    pub path: Vec<TreeNode>,
}

/// Other children of a node's parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSiblingsResult {
    pub session_id: String,
    pub node_id: String,
    pub siblings: Vec<TreeNode>,
}

/// Input parameters for tree reflection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeReflectParams {
    /// Tree session to reflect on
    pub session_id: String,
    /// Free-form note echoed back in the report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Result of tree reflection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeReflectResult {
    pub session_id: String,
    pub reflection: ReflectionOutcome<TreeReflection>,
}

/// Tree reasoning mode handler
#[derive(Clone)]
pub struct TreeMode {
    registry: Arc<SessionRegistry>,
}

impl TreeMode {
    /// Create a new tree mode handler
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Create a tree session rooted at the problem statement
    pub async fn init(&self, params: TreeInitParams) -> AppResult<TreeInitResult> {
        let tree = TreeEngine::new(params.problem)?;
        let root = tree.root().clone();

        let session_id = self
            .registry
            .create(params.session_id, SessionEngine::Tree(tree))
            .await?;

        Ok(TreeInitResult { session_id, root })
    }

    /// Attach a thought under a parent node
    pub async fn add_thought(&self, params: TreeThoughtParams) -> AppResult<TreeThoughtResult> {
        let kind = parse_thought_type(params.thought_type.as_deref(), SEQUENTIAL_TYPES)?
            .unwrap_or(ThoughtType::Reasoning);

        let TreeThoughtParams {
            session_id,
            content,
            parent_id,
            thought_id,
            ..
        } = params;

        let (added, total_nodes) = self
            .registry
            .with_tree(&session_id, Access::Write, |tree| {
                let added = tree.add_thought(parent_id.as_deref(), content, kind, thought_id)?;
                Ok((added, tree.len()))
            })
            .await?;

        info!(
            session_id = %session_id,
            thought_id = %added.node.id(),
            depth = added.node.depth,
            "Tree thought added"
        );

        Ok(TreeThoughtResult {
            session_id,
            thought: added.node,
            suggestions: added.suggestions,
            total_nodes,
        })
    }

    /// Nodes from the root down to the given node
    pub async fn path(&self, params: TreeNodeParams) -> AppResult<TreePathResult> {
        let TreeNodeParams {
            session_id,
            node_id,
        } = params;

        let path: Vec<TreeNode> = self
            .registry
            .with_tree(&session_id, Access::Read, |tree| {
                Ok(tree.get_path(&node_id)?.into_iter().cloned().collect())
            })
            .await?;

        Ok(TreePathResult {
            session_id,
            node_id,
            path,
        })
    }

    /// Other children of the node's parent
    pub async fn siblings(&self, params: TreeNodeParams) -> AppResult<TreeSiblingsResult> {
        let TreeNodeParams {
            session_id,
            node_id,
        } = params;

        let siblings: Vec<TreeNode> = self
            .registry
            .with_tree(&session_id, Access::Read, |tree| {
                Ok(tree.get_siblings(&node_id)?.into_iter().cloned().collect())
            })
            .await?;

        Ok(TreeSiblingsResult {
            session_id,
            node_id,
            siblings,
        })
    }

    /// Reflect on the tree as a whole
    pub async fn reflect(&self, params: TreeReflectParams) -> AppResult<TreeReflectResult> {
        let TreeReflectParams { session_id, note } = params;

        let reflection = self
            .registry
            .with_tree(&session_id, Access::Read, |tree| Ok(tree.reflect(note)))
            .await?;

        if reflection.is_empty() {
            warn!(session_id = %session_id, "Tree reflection found nothing to report");
        } else {
            debug!(session_id = %session_id, "Tree reflection");
        }

        Ok(TreeReflectResult {
            session_id,
            reflection,
        })
    }
}
