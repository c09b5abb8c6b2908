//! Tree engine: a rooted, depth-annotated hierarchy of thoughts.
//!
//! Nodes live in a single id-keyed map; parent and child links are ids, so
//! the tree never holds references into itself. The root is created with the
//! engine and carries the problem statement.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::node::{
    ensure_allowed, type_label, validate_content, validate_id, AddedThought, IdSequence,
    ThoughtNode, ThoughtType, SEQUENTIAL_TYPES,
};
use super::reflection::{
    coverage_improvements, dominant_type_insight, BranchSummary, ReflectionOutcome,
    TreeReflection,
};
use crate::error::{ReasoningError, ReasoningResult};

/// Parent id that always refers to the tree root.
pub const ROOT_SENTINEL: &str = "root";

const EXPLORE_DEEPER: &str =
    "Explore deeper: develop the most promising thoughts further before concluding";
const CONSIDER_ALTERNATIVES: &str =
    "Consider alternative approaches by branching from existing thoughts";

/// A thought placed in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    /// The underlying thought.
    #[serde(flatten)]
    pub thought: ThoughtNode,
    /// Parent id; `None` only for the root.
    pub parent_id: Option<String>,
    /// Child ids in insertion order.
    pub children: Vec<String>,
    /// Distance from the root, fixed at creation.
    pub depth: usize,
}

impl TreeNode {
    /// Node id.
    pub fn id(&self) -> &str {
        &self.thought.id
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Serializable form of a tree, nodes in depth-first pre-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    /// Id of the root node.
    pub root_id: String,
    /// All nodes, root first, every parent before its children.
    pub nodes: Vec<TreeNode>,
}

/// Rooted tree of thoughts.
#[derive(Debug, Clone)]
pub struct TreeEngine {
    root_id: String,
    nodes: HashMap<String, TreeNode>,
    sequence: IdSequence,
}

impl TreeEngine {
    /// Create a tree whose root holds the problem statement.
    pub fn new(problem: impl Into<String>) -> ReasoningResult<Self> {
        let problem = problem.into();
        validate_content(&problem)?;

        let root = TreeNode {
            thought: ThoughtNode::new(ROOT_SENTINEL, problem, Some(ThoughtType::Analysis)),
            parent_id: None,
            children: Vec::new(),
            depth: 0,
        };
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_SENTINEL.to_string(), root);

        Ok(Self {
            root_id: ROOT_SENTINEL.to_string(),
            nodes,
            sequence: IdSequence::new("thought"),
        })
    }

    /// The root node.
    pub fn root(&self) -> &TreeNode {
        // The root is inserted at construction and nodes are never removed.
        &self.nodes[&self.root_id]
    }

    /// Total node count, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been added below the root.
    pub fn is_empty(&self) -> bool {
        self.root().children.is_empty()
    }

    /// Attach a thought under `parent_id` (`None` or `"root"` means the root).
    pub fn add_thought(
        &mut self,
        parent_id: Option<&str>,
        content: impl Into<String>,
        kind: ThoughtType,
        id: Option<String>,
    ) -> ReasoningResult<AddedThought<TreeNode>> {
        let content = content.into();
        validate_content(&content)?;
        ensure_allowed(kind, SEQUENTIAL_TYPES)?;

        let parent_key = match parent_id {
            None => self.root_id.clone(),
            Some(p) if p == ROOT_SENTINEL => self.root_id.clone(),
            Some(p) => p.to_string(),
        };
        let parent_depth = self
            .nodes
            .get(&parent_key)
            .map(|p| p.depth)
            .ok_or_else(|| ReasoningError::ParentNotFound {
                parent_id: parent_key.clone(),
            })?;

        let id = match id {
            Some(id) => {
                validate_id(&id)?;
                if self.nodes.contains_key(&id) {
                    return Err(ReasoningError::DuplicateId { id });
                }
                id
            }
            None => {
                let nodes = &self.nodes;
                self.sequence.next_unused(|candidate| nodes.contains_key(candidate))
            }
        };

        let node = TreeNode {
            thought: ThoughtNode::new(id.clone(), content, Some(kind)),
            parent_id: Some(parent_key.clone()),
            children: Vec::new(),
            depth: parent_depth + 1,
        };
        let suggestions = node.thought.generate_suggestions();

        if let Some(parent) = self.nodes.get_mut(&parent_key) {
            parent.children.push(id.clone());
        }
        self.nodes.insert(id, node.clone());

        Ok(AddedThought { node, suggestions })
    }

    /// Depth-first search from the root.
    pub fn find_node(&self, id: &str) -> Option<&TreeNode> {
        let mut stack = vec![self.root_id.as_str()];
        while let Some(current) = stack.pop() {
            let node = self.nodes.get(current)?;
            if node.id() == id {
                return Some(node);
            }
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
        None
    }

    /// Direct children of a node, in insertion order.
    pub fn children(&self, id: &str) -> ReasoningResult<Vec<&TreeNode>> {
        let node = self.require(id)?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    /// Nodes from the root down to `id`, inclusive.
    pub fn get_path(&self, id: &str) -> ReasoningResult<Vec<&TreeNode>> {
        let mut current = self.require(id)?;
        let mut path = vec![current];
        while let Some(parent) = current
            .parent_id
            .as_deref()
            .and_then(|p| self.nodes.get(p))
        {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Other children of the same parent. Empty for the root.
    pub fn get_siblings(&self, id: &str) -> ReasoningResult<Vec<&TreeNode>> {
        let node = self.require(id)?;
        let Some(parent) = node.parent_id.as_deref().and_then(|p| self.nodes.get(p)) else {
            return Ok(Vec::new());
        };
        Ok(parent
            .children
            .iter()
            .filter(|child| child.as_str() != id)
            .filter_map(|child| self.nodes.get(child))
            .collect())
    }

    /// Update a node's score and/or confidence.
    pub fn set_score(
        &mut self,
        id: &str,
        score: Option<f64>,
        confidence: Option<f64>,
    ) -> ReasoningResult<&TreeNode> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| ReasoningError::MissingNode {
                node_id: id.to_string(),
            })?;
        node.thought.set_score(score, confidence);
        Ok(&*node)
    }

    /// Statistics over the tree in a single depth-first pass.
    pub fn reflect(&self, user_note: Option<String>) -> ReflectionOutcome<TreeReflection> {
        if self.is_empty() {
            return ReflectionOutcome::Empty {
                message: "No thoughts explored yet. Add a thought under the root first."
                    .to_string(),
            };
        }

        let mut explored_nodes = 0;
        let mut max_depth = 0;
        let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut branches = Vec::new();

        for node in self.preorder().into_iter().skip(1) {
            explored_nodes += 1;
            max_depth = max_depth.max(node.depth);
            let label = type_label(node.thought.thought_type);
            *type_distribution.entry(label.to_string()).or_insert(0) += 1;
            if node.is_leaf() {
                branches.push(BranchSummary {
                    node_id: node.id().to_string(),
                    depth: node.depth,
                    thought_type: label.to_string(),
                    content_length: node.thought.content.chars().count(),
                });
            }
        }
        let leaf_nodes = branches.len();

        let mut insights = vec![
            format!(
                "Explored {} thought(s) across {} branch(es)",
                explored_nodes, leaf_nodes
            ),
            format!("Deepest branch reaches depth {}", max_depth),
        ];
        insights.extend(dominant_type_insight(&type_distribution));

        let mut improvements = Vec::new();
        if max_depth < 2 {
            improvements.push(EXPLORE_DEEPER.to_string());
        }
        if leaf_nodes < 2 {
            improvements.push(CONSIDER_ALTERNATIVES.to_string());
        }
        improvements.extend(coverage_improvements(&type_distribution));

        ReflectionOutcome::Ready(TreeReflection {
            total_nodes: self.nodes.len(),
            explored_nodes,
            max_depth,
            leaf_nodes,
            type_distribution,
            branches,
            insights,
            improvements,
            user_note,
        })
    }

    /// Deep copy of the tree in pre-order.
    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            root_id: self.root_id.clone(),
            nodes: self.preorder().into_iter().cloned().collect(),
        }
    }

    /// Rebuild a tree, re-checking parent links, depths, ids and types.
    pub fn restore(snapshot: TreeSnapshot) -> ReasoningResult<Self> {
        let mut iter = snapshot.nodes.into_iter();
        let mut root = iter.next().ok_or_else(|| ReasoningError::InvalidSnapshot {
            message: "tree snapshot has no root".to_string(),
        })?;
        if root.id() != snapshot.root_id || root.parent_id.is_some() || root.depth != 0 {
            return Err(ReasoningError::InvalidSnapshot {
                message: format!("first node must be the root '{}'", snapshot.root_id),
            });
        }
        validate_content(&root.thought.content)?;
        if root.thought.thought_type != Some(ThoughtType::Analysis) {
            return Err(ReasoningError::InvalidSnapshot {
                message: format!("root '{}' must be an analysis node", snapshot.root_id),
            });
        }
        root.children.clear();

        let mut nodes = HashMap::new();
        nodes.insert(snapshot.root_id.clone(), root);

        for mut node in iter {
            validate_id(node.id())?;
            if nodes.contains_key(node.id()) {
                return Err(ReasoningError::DuplicateId {
                    id: node.id().to_string(),
                });
            }
            let kind = node.thought.thought_type.ok_or_else(|| {
                ReasoningError::InvalidSnapshot {
                    message: format!("node {} has no type", node.id()),
                }
            })?;
            ensure_allowed(kind, SEQUENTIAL_TYPES)?;
            let parent_id = node.parent_id.clone().ok_or_else(|| {
                ReasoningError::InvalidSnapshot {
                    message: format!("node {} has no parent", node.id()),
                }
            })?;
            let parent: &mut TreeNode =
                nodes
                    .get_mut(&parent_id)
                    .ok_or_else(|| ReasoningError::ParentNotFound {
                        parent_id: parent_id.clone(),
                    })?;
            if node.depth != parent.depth + 1 {
                return Err(ReasoningError::InvalidSnapshot {
                    message: format!(
                        "node {} has depth {} under a parent at depth {}",
                        node.id(),
                        node.depth,
                        parent.depth
                    ),
                });
            }
            parent.children.push(node.id().to_string());
            node.children.clear();
            nodes.insert(node.id().to_string(), node);
        }

        Ok(Self {
            root_id: snapshot.root_id,
            nodes,
            sequence: IdSequence::new("thought"),
        })
    }

    fn require(&self, id: &str) -> ReasoningResult<&TreeNode> {
        self.nodes.get(id).ok_or_else(|| ReasoningError::MissingNode {
            node_id: id.to_string(),
        })
    }

    fn preorder(&self) -> Vec<&TreeNode> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root_id.as_str()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                order.push(node);
                stack.extend(node.children.iter().rev().map(String::as_str));
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::reflection::ADD_VALIDATION;

    fn login_tree() -> TreeEngine {
        TreeEngine::new("Fix login bug").unwrap()
    }

    #[test]
    fn test_root_created_with_problem() {
        let tree = login_tree();
        assert_eq!(tree.root().id(), ROOT_SENTINEL);
        assert_eq!(tree.root().depth, 0);
        assert_eq!(tree.root().thought.content, "Fix login bug");
        assert_eq!(tree.root().thought.thought_type, Some(ThoughtType::Analysis));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_empty_problem_rejected() {
        assert!(TreeEngine::new("  ").is_err());
    }

    #[test]
    fn test_depths_follow_parent() {
        let mut tree = login_tree();
        let first = tree
            .add_thought(Some("root"), "check token expiry", ThoughtType::Analysis, None)
            .unwrap();
        assert_eq!(first.node.depth, 1);

        let second = tree
            .add_thought(
                Some(first.node.id()),
                "write test",
                ThoughtType::Validation,
                None,
            )
            .unwrap();
        assert_eq!(second.node.depth, 2);
        assert_eq!(second.node.parent_id.as_deref(), Some(first.node.id()));
    }

    #[test]
    fn test_omitted_parent_attaches_to_root() {
        let mut tree = login_tree();
        let added = tree
            .add_thought(None, "idea", ThoughtType::Reasoning, None)
            .unwrap();
        assert_eq!(added.node.parent_id.as_deref(), Some(ROOT_SENTINEL));
        assert_eq!(tree.root().children, vec![added.node.id().to_string()]);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut tree = login_tree();
        let err = tree
            .add_thought(Some("ghost"), "idea", ThoughtType::Task, None)
            .unwrap_err();
        assert_eq!(
            err,
            ReasoningError::ParentNotFound {
                parent_id: "ghost".to_string()
            }
        );
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_duplicate_caller_id_rejected() {
        let mut tree = login_tree();
        tree.add_thought(None, "a", ThoughtType::Task, Some("x".to_string()))
            .unwrap();
        let err = tree
            .add_thought(None, "b", ThoughtType::Task, Some("x".to_string()))
            .unwrap_err();
        assert!(matches!(err, ReasoningError::DuplicateId { .. }));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_find_node() {
        let mut tree = login_tree();
        let a = tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        let b = tree
            .add_thought(Some(a.node.id()), "b", ThoughtType::Task, None)
            .unwrap();

        assert_eq!(tree.find_node(b.node.id()).unwrap().thought.content, "b");
        assert!(tree.find_node("missing").is_none());
    }

    #[test]
    fn test_get_path_from_root() {
        let mut tree = login_tree();
        let a = tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        let b = tree
            .add_thought(Some(a.node.id()), "b", ThoughtType::Task, None)
            .unwrap();

        let path: Vec<&str> = tree
            .get_path(b.node.id())
            .unwrap()
            .into_iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(path, vec![ROOT_SENTINEL, a.node.id(), b.node.id()]);

        assert!(matches!(
            tree.get_path("nope"),
            Err(ReasoningError::MissingNode { .. })
        ));
    }

    #[test]
    fn test_get_siblings() {
        let mut tree = login_tree();
        let a = tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        let b = tree.add_thought(None, "b", ThoughtType::Reasoning, None).unwrap();
        let c = tree.add_thought(None, "c", ThoughtType::Task, None).unwrap();

        let siblings: Vec<&str> = tree
            .get_siblings(b.node.id())
            .unwrap()
            .into_iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(siblings, vec![a.node.id(), c.node.id()]);
        assert!(tree.get_siblings(ROOT_SENTINEL).unwrap().is_empty());
    }

    #[test]
    fn test_reflect_scenario_depth_two() {
        let mut tree = login_tree();
        let first = tree
            .add_thought(Some("root"), "check token expiry", ThoughtType::Analysis, None)
            .unwrap();
        tree.add_thought(
            Some(first.node.id()),
            "write test",
            ThoughtType::Validation,
            None,
        )
        .unwrap();

        let outcome = tree.reflect(None);
        let report = outcome.report().unwrap();

        assert_eq!(report.max_depth, 2);
        assert_eq!(report.leaf_nodes, 1);
        assert_eq!(report.explored_nodes, 2);
        assert_eq!(report.total_nodes, 3);
        assert_eq!(report.branches.len(), 1);
        assert_eq!(report.branches[0].depth, 2);
        assert_eq!(report.branches[0].thought_type, "validation");
        assert_eq!(report.branches[0].content_length, "write test".len());
        assert!(report.improvements.iter().any(|i| i == CONSIDER_ALTERNATIVES));
        assert!(!report.improvements.iter().any(|i| i == EXPLORE_DEEPER));
        assert!(!report.improvements.iter().any(|i| i == ADD_VALIDATION));
    }

    #[test]
    fn test_reflect_shallow_tree_suggests_depth() {
        let mut tree = login_tree();
        tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        tree.add_thought(None, "b", ThoughtType::Analysis, None).unwrap();

        let outcome = tree.reflect(None);
        let report = outcome.report().unwrap();
        assert_eq!(report.leaf_nodes, 2);
        assert!(report.improvements.iter().any(|i| i == EXPLORE_DEEPER));
        assert!(report.improvements.iter().any(|i| i == ADD_VALIDATION));
    }

    #[test]
    fn test_reflect_root_only_is_empty() {
        let tree = login_tree();
        assert!(tree.reflect(None).is_empty());
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut tree = login_tree();
        let a = tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        tree.add_thought(Some(a.node.id()), "b", ThoughtType::Task, None)
            .unwrap();
        tree.add_thought(None, "c", ThoughtType::Reasoning, None).unwrap();
        tree.set_score(a.node.id(), Some(0.4), Some(0.6)).unwrap();

        let snapshot = tree.snapshot();
        let restored = TreeEngine::restore(snapshot.clone()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.len(), 4);
    }

    #[test]
    fn test_restore_rejects_orphan() {
        let mut tree = login_tree();
        tree.add_thought(None, "a", ThoughtType::Analysis, None).unwrap();
        let mut snapshot = tree.snapshot();
        snapshot.nodes[1].parent_id = Some("elsewhere".to_string());

        assert!(matches!(
            TreeEngine::restore(snapshot),
            Err(ReasoningError::ParentNotFound { .. })
        ));
    }

    #[test]
    fn test_restore_checks_root_like_new() {
        let mut wrong_type = login_tree().snapshot();
        wrong_type.nodes[0].thought.thought_type = Some(ThoughtType::Task);
        assert!(matches!(
            TreeEngine::restore(wrong_type),
            Err(ReasoningError::InvalidSnapshot { .. })
        ));

        let mut blank = login_tree().snapshot();
        blank.nodes[0].thought.content = "   ".to_string();
        assert!(matches!(
            TreeEngine::restore(blank),
            Err(ReasoningError::Validation { .. })
        ));
    }
}
