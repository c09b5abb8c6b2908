//! Chain engine: a linear, duplicate-free sequence of steps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::node::{
    ensure_allowed, type_label, validate_content, validate_id, AddedThought, IdSequence,
    ThoughtNode, ThoughtType, SEQUENTIAL_TYPES,
};
use super::reflection::{
    coverage_improvements, dominant_type_insight, ChainReflection, ReflectionOutcome,
};
use crate::error::{ReasoningError, ReasoningResult};

const ADD_ANALYSIS: &str = "Add more analysis steps to break the problem down further";

/// Serializable form of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    /// Steps in insertion order.
    pub steps: Vec<ThoughtNode>,
}

/// Ordered sequence of uniquely identified steps.
#[derive(Debug, Clone)]
pub struct ChainEngine {
    steps: Vec<ThoughtNode>,
    ids: HashSet<String>,
    sequence: IdSequence,
}

impl Default for ChainEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainEngine {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            ids: HashSet::new(),
            sequence: IdSequence::new("step"),
        }
    }

    /// Append a step. Fails with `DuplicateId` if `id` is already in the chain.
    pub fn add_step(
        &mut self,
        id: Option<String>,
        content: impl Into<String>,
        kind: ThoughtType,
    ) -> ReasoningResult<AddedThought> {
        let content = content.into();
        validate_content(&content)?;
        ensure_allowed(kind, SEQUENTIAL_TYPES)?;

        let id = match id {
            Some(id) => {
                validate_id(&id)?;
                if self.ids.contains(&id) {
                    return Err(ReasoningError::DuplicateId { id });
                }
                id
            }
            None => {
                let ids = &self.ids;
                self.sequence.next_unused(|candidate| ids.contains(candidate))
            }
        };

        let node = ThoughtNode::new(id, content, Some(kind));
        let suggestions = node.generate_suggestions();
        self.ids.insert(node.id.clone());
        self.steps.push(node.clone());

        Ok(AddedThought { node, suggestions })
    }

    /// Update a step's score and/or confidence.
    pub fn set_score(
        &mut self,
        id: &str,
        score: Option<f64>,
        confidence: Option<f64>,
    ) -> ReasoningResult<&ThoughtNode> {
        let step = self
            .steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| ReasoningError::MissingNode {
                node_id: id.to_string(),
            })?;
        step.set_score(score, confidence);
        Ok(&*step)
    }

    /// All steps in insertion order.
    pub fn steps(&self) -> &[ThoughtNode] {
        &self.steps
    }

    /// Look up a step by id.
    pub fn get_step(&self, id: &str) -> Option<&ThoughtNode> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Statistics and heuristic suggestions over the whole chain.
    pub fn reflect(&self, user_note: Option<String>) -> ReflectionOutcome<ChainReflection> {
        if self.steps.is_empty() {
            return ReflectionOutcome::Empty {
                message: "No reasoning steps yet. Add a step before reflecting.".to_string(),
            };
        }

        let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();
        for step in &self.steps {
            *type_distribution
                .entry(type_label(step.thought_type).to_string())
                .or_insert(0) += 1;
        }

        let mut insights = vec![format!(
            "Reasoning spans {} step(s) across {} thought type(s)",
            self.steps.len(),
            type_distribution.len()
        )];
        insights.extend(dominant_type_insight(&type_distribution));
        if let Some(last) = self.steps.last() {
            if last.thought_type == Some(ThoughtType::Validation) {
                insights.push("The chain ends with a validation step".to_string());
            }
        }

        let mut improvements = Vec::new();
        if self.steps.len() < 2 {
            improvements.push(ADD_ANALYSIS.to_string());
        }
        improvements.extend(coverage_improvements(&type_distribution));

        ReflectionOutcome::Ready(ChainReflection {
            total_steps: self.steps.len(),
            type_distribution,
            insights,
            improvements,
            user_note,
        })
    }

    /// Deep copy of the chain.
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            steps: self.steps.clone(),
        }
    }

    /// Rebuild a chain, applying the same checks as `add_step`.
    pub fn restore(snapshot: ChainSnapshot) -> ReasoningResult<Self> {
        let mut chain = Self::new();
        for step in snapshot.steps {
            validate_id(&step.id)?;
            let kind = step.thought_type.ok_or_else(|| ReasoningError::InvalidSnapshot {
                message: format!("step {} has no type", step.id),
            })?;
            ensure_allowed(kind, SEQUENTIAL_TYPES)?;
            if !chain.ids.insert(step.id.clone()) {
                return Err(ReasoningError::DuplicateId { id: step.id });
            }
            chain.steps.push(step);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::reflection::ADD_VALIDATION;

    #[test]
    fn test_add_step_returns_node_and_suggestions() {
        let mut chain = ChainEngine::new();
        let added = chain
            .add_step(Some("s1".to_string()), "find the bug", ThoughtType::Analysis)
            .unwrap();

        assert_eq!(added.node.id, "s1");
        assert_eq!(added.node.thought_type, Some(ThoughtType::Analysis));
        assert!(!added.suggestions.is_empty());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected_and_state_unchanged() {
        let mut chain = ChainEngine::new();
        chain
            .add_step(Some("s1".to_string()), "find the bug", ThoughtType::Analysis)
            .unwrap();

        let err = chain
            .add_step(Some("s1".to_string()), "again", ThoughtType::Reasoning)
            .unwrap_err();

        assert_eq!(
            err,
            ReasoningError::DuplicateId {
                id: "s1".to_string()
            }
        );
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.steps()[0].content, "find the bug");
    }

    #[test]
    fn test_empty_content_rejected() {
        let mut chain = ChainEngine::new();
        let err = chain.add_step(None, "  ", ThoughtType::Task).unwrap_err();
        assert!(matches!(err, ReasoningError::Validation { .. }));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_synthesis_rejected_in_chain() {
        let mut chain = ChainEngine::new();
        let err = chain
            .add_step(None, "merge", ThoughtType::Synthesis)
            .unwrap_err();
        assert!(matches!(err, ReasoningError::InvalidType { .. }));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_generated_ids_skip_caller_ids() {
        let mut chain = ChainEngine::new();
        chain
            .add_step(Some("step-1".to_string()), "first", ThoughtType::Analysis)
            .unwrap();
        let added = chain.add_step(None, "second", ThoughtType::Task).unwrap();
        assert_eq!(added.node.id, "step-2");
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut chain = ChainEngine::new();
        for (id, kind) in [
            ("a", ThoughtType::Analysis),
            ("b", ThoughtType::Reasoning),
            ("c", ThoughtType::Task),
        ] {
            chain.add_step(Some(id.to_string()), id, kind).unwrap();
        }
        let ids: Vec<&str> = chain.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reflect_empty_chain_is_distinct_status() {
        let chain = ChainEngine::new();
        let outcome = chain.reflect(None);
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_reflect_single_step() {
        let mut chain = ChainEngine::new();
        chain
            .add_step(Some("s1".to_string()), "find the bug", ThoughtType::Analysis)
            .unwrap();

        let outcome = chain.reflect(Some("first pass".to_string()));
        let report = outcome.report().unwrap();

        assert_eq!(report.total_steps, 1);
        assert_eq!(report.type_distribution.get("analysis"), Some(&1));
        assert!(report.improvements.iter().any(|i| i == ADD_VALIDATION));
        assert!(report
            .improvements
            .iter()
            .any(|i| i.to_lowercase().contains("add validation")));
        assert!(report.improvements.iter().any(|i| i == ADD_ANALYSIS));
        assert_eq!(report.user_note.as_deref(), Some("first pass"));
    }

    #[test]
    fn test_reflect_complete_chain_has_no_coverage_gaps() {
        let mut chain = ChainEngine::new();
        chain.add_step(None, "look", ThoughtType::Analysis).unwrap();
        chain.add_step(None, "do", ThoughtType::Task).unwrap();
        chain.add_step(None, "check", ThoughtType::Validation).unwrap();

        let outcome = chain.reflect(None);
        let report = outcome.report().unwrap();
        assert!(report.improvements.is_empty());
        assert!(report
            .insights
            .iter()
            .any(|i| i.contains("ends with a validation step")));
    }

    #[test]
    fn test_set_score_on_missing_step() {
        let mut chain = ChainEngine::new();
        let err = chain.set_score("nope", Some(1.0), None).unwrap_err();
        assert!(matches!(err, ReasoningError::MissingNode { .. }));
    }

    #[test]
    fn test_snapshot_restore_preserves_steps() {
        let mut chain = ChainEngine::new();
        chain.add_step(None, "look", ThoughtType::Analysis).unwrap();
        chain.set_score("step-1", Some(0.5), Some(0.9)).unwrap();

        let restored = ChainEngine::restore(chain.snapshot()).unwrap();
        assert_eq!(restored.steps(), chain.steps());

        let mut restored = restored;
        let err = restored
            .add_step(Some("step-1".to_string()), "dup", ThoughtType::Task)
            .unwrap_err();
        assert!(matches!(err, ReasoningError::DuplicateId { .. }));
    }

    #[test]
    fn test_restore_rejects_duplicate_ids() {
        let step = ThoughtNode::new("x", "content", Some(ThoughtType::Task));
        let snapshot = ChainSnapshot {
            steps: vec![step.clone(), step],
        };
        assert!(matches!(
            ChainEngine::restore(snapshot),
            Err(ReasoningError::DuplicateId { .. })
        ));
    }
}
