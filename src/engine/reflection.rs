//! Reflection reports: read-only analytics over a chain or tree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::ThoughtType;

/// Result of a reflection pass.
///
/// An empty structure is its own status rather than a degenerate report, so
/// callers can tell "nothing to report" apart from a report with zero counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReflectionOutcome<T> {
    /// No thoughts have been added yet.
    Empty {
        /// Human-readable explanation.
        message: String,
    },
    /// Statistics over the current structure.
    Ready(T),
}

impl<T> ReflectionOutcome<T> {
    /// Whether the structure had nothing to report.
    pub fn is_empty(&self) -> bool {
        matches!(self, ReflectionOutcome::Empty { .. })
    }

    /// The report, if there was one.
    pub fn report(&self) -> Option<&T> {
        match self {
            ReflectionOutcome::Ready(report) => Some(report),
            ReflectionOutcome::Empty { .. } => None,
        }
    }
}

/// Reflection over a chain of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReflection {
    /// Number of steps in the chain.
    pub total_steps: usize,
    /// Step count per thought type.
    pub type_distribution: BTreeMap<String, usize>,
    /// Observations about the chain.
    pub insights: Vec<String>,
    /// Suggested improvements.
    pub improvements: Vec<String>,
    /// Note supplied by the caller, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
}

/// Reflection over a tree of thoughts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeReflection {
    /// All nodes including the root.
    pub total_nodes: usize,
    /// Nodes below the root.
    pub explored_nodes: usize,
    /// Deepest node depth (root = 0).
    pub max_depth: usize,
    /// Childless nodes below the root.
    pub leaf_nodes: usize,
    /// Node count per thought type, root excluded.
    pub type_distribution: BTreeMap<String, usize>,
    /// One entry per leaf below the root.
    pub branches: Vec<BranchSummary>,
    /// Observations about the tree.
    pub insights: Vec<String>,
    /// Suggested improvements.
    pub improvements: Vec<String>,
    /// Note supplied by the caller, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
}

/// Metadata for one leaf-terminated branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSummary {
    /// Id of the leaf node.
    pub node_id: String,
    /// Depth of the leaf.
    pub depth: usize,
    /// Type label of the leaf.
    #[serde(rename = "type")]
    pub thought_type: String,
    /// Content length in characters.
    pub content_length: usize,
}

pub(crate) const ADD_VALIDATION: &str =
    "Add validation steps to verify the reasoning before acting on it";
pub(crate) const ADD_TASKS: &str =
    "Add task steps to turn the analysis into concrete actions";

/// Improvements for thought types that are missing entirely.
pub(crate) fn coverage_improvements(distribution: &BTreeMap<String, usize>) -> Vec<String> {
    let mut improvements = Vec::new();
    if !distribution.contains_key(ThoughtType::Validation.as_str()) {
        improvements.push(ADD_VALIDATION.to_string());
    }
    if !distribution.contains_key(ThoughtType::Task.as_str()) {
        improvements.push(ADD_TASKS.to_string());
    }
    improvements
}

/// Describe the most frequent type, if any. Ties resolve alphabetically.
pub(crate) fn dominant_type_insight(distribution: &BTreeMap<String, usize>) -> Option<String> {
    let mut best: Option<(&String, usize)> = None;
    for (label, &count) in distribution {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, count)| format!("Most thoughts are of type '{}' ({})", label, count))
}
