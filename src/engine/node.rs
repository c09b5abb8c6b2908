//! Thought-node model shared by the chain, tree and graph engines.
//!
//! A [`ThoughtNode`] is the atomic unit of reasoning. Its content is opaque to
//! the engines; only its [`ThoughtType`] drives behaviour (the follow-up
//! suggestion table and the reflection heuristics).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReasoningError, ReasoningResult};

/// Classification of a thought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    /// Breaking the problem down.
    Analysis,
    /// Drawing inferences from what is known.
    Reasoning,
    /// A concrete action to carry out.
    Task,
    /// Checking that a result holds.
    Validation,
    /// Aggregation of several thoughts. Only produced by the graph engine.
    Synthesis,
}

/// Every recognised thought type.
pub const ALL_TYPES: &[ThoughtType] = &[
    ThoughtType::Analysis,
    ThoughtType::Reasoning,
    ThoughtType::Task,
    ThoughtType::Validation,
    ThoughtType::Synthesis,
];

/// Types accepted by the chain and tree engines (merging is graph-only).
pub const SEQUENTIAL_TYPES: &[ThoughtType] = &[
    ThoughtType::Analysis,
    ThoughtType::Reasoning,
    ThoughtType::Task,
    ThoughtType::Validation,
];

/// Histogram label for nodes created without a type.
pub const UNTYPED_LABEL: &str = "untyped";

const ANALYSIS_SUGGESTIONS: &[&str] = &[
    "What are the key components of this problem?",
    "What assumptions are being made here?",
    "What information is still missing?",
];

const REASONING_SUGGESTIONS: &[&str] = &[
    "What evidence supports this line of reasoning?",
    "What alternative explanations should be considered?",
    "What follows logically from this conclusion?",
];

const TASK_SUGGESTIONS: &[&str] = &[
    "What is the first concrete action to take?",
    "What resources or tools does this task need?",
    "How will completion of this task be verified?",
];

const VALIDATION_SUGGESTIONS: &[&str] = &[
    "What test cases would confirm this works?",
    "Which edge cases could break this?",
    "How can the result be measured objectively?",
];

const SYNTHESIS_SUGGESTIONS: &[&str] = &[
    "How do the combined insights change the overall approach?",
    "Do the merged ideas conflict anywhere that needs resolving?",
    "What is the next step now that these ideas are unified?",
    "Which parts of the synthesis still need validation?",
];

const GENERIC_SUGGESTIONS: &[&str] = &["What is the next logical step from here?"];

impl ThoughtType {
    /// Get the type name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtType::Analysis => "analysis",
            ThoughtType::Reasoning => "reasoning",
            ThoughtType::Task => "task",
            ThoughtType::Validation => "validation",
            ThoughtType::Synthesis => "synthesis",
        }
    }

    /// Parse a caller-supplied type, accepting only members of `allowed`.
    ///
    /// The error lists the valid names so callers can show it verbatim.
    pub fn parse_within(value: &str, allowed: &[ThoughtType]) -> ReasoningResult<Self> {
        let normalized = value.trim().to_lowercase();
        allowed
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| invalid_type(value, allowed))
    }

    /// Fixed follow-up questions for this type.
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ThoughtType::Analysis => ANALYSIS_SUGGESTIONS,
            ThoughtType::Reasoning => REASONING_SUGGESTIONS,
            ThoughtType::Task => TASK_SUGGESTIONS,
            ThoughtType::Validation => VALIDATION_SUGGESTIONS,
            ThoughtType::Synthesis => SYNTHESIS_SUGGESTIONS,
        }
    }
}

impl std::fmt::Display for ThoughtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ThoughtType {
    type Err = ReasoningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThoughtType::parse_within(s, ALL_TYPES)
    }
}

/// Build the `InvalidType` error for `value` against an allowed set.
pub(crate) fn invalid_type(value: &str, allowed: &[ThoughtType]) -> ReasoningError {
    ReasoningError::InvalidType {
        value: value.to_string(),
        valid: allowed.iter().map(|t| t.as_str().to_string()).collect(),
    }
}

/// Reject a type outside the engine's accepted subset.
pub(crate) fn ensure_allowed(kind: ThoughtType, allowed: &[ThoughtType]) -> ReasoningResult<()> {
    if allowed.contains(&kind) {
        Ok(())
    } else {
        Err(invalid_type(kind.as_str(), allowed))
    }
}

/// Follow-up suggestions for an optional type; untyped nodes get the generic one.
pub fn suggestions_for(kind: Option<ThoughtType>) -> Vec<String> {
    kind.map(|k| k.suggestions())
        .unwrap_or(GENERIC_SUGGESTIONS)
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Histogram label for an optional type.
pub fn type_label(kind: Option<ThoughtType>) -> &'static str {
    kind.map(|k| k.as_str()).unwrap_or(UNTYPED_LABEL)
}

/// A single reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtNode {
    /// Identifier, unique within one engine and never changed after creation.
    pub id: String,
    /// Caller-supplied text. Never inspected by the engines.
    pub content: String,
    /// Thought classification.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub thought_type: Option<ThoughtType>,
    /// Externally assigned or propagated priority.
    pub score: f64,
    /// Caller-assigned confidence. Never propagated.
    pub confidence: f64,
    /// When the node was created.
    pub created_at: DateTime<Utc>,
    /// When score or confidence last changed.
    pub updated_at: DateTime<Utc>,
}

impl ThoughtNode {
    /// Create a node with zero score and confidence.
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        thought_type: Option<ThoughtType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            content: content.into(),
            thought_type,
            score: 0.0,
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Partial update; omitted values keep their prior value. Always refreshes `updated_at`.
    pub fn set_score(&mut self, score: Option<f64>, confidence: Option<f64>) {
        if let Some(score) = score {
            self.score = score;
        }
        if let Some(confidence) = confidence {
            self.confidence = confidence;
        }
        self.updated_at = Utc::now();
    }

    /// Follow-up questions for this node. Pure function of its type.
    pub fn generate_suggestions(&self) -> Vec<String> {
        suggestions_for(self.thought_type)
    }
}

/// A freshly created node together with its follow-up suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedThought<N = ThoughtNode> {
    /// The node as stored by the engine.
    pub node: N,
    /// Suggestions generated from the node's type.
    pub suggestions: Vec<String>,
}

/// Monotonic id generator for engine-assigned ids.
#[derive(Debug, Clone)]
pub(crate) struct IdSequence {
    prefix: &'static str,
    next: u64,
}

impl IdSequence {
    pub(crate) fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 1 }
    }

    /// Next `prefix-N` id for which `taken` is false.
    pub(crate) fn next_unused(&mut self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let candidate = format!("{}-{}", self.prefix, self.next);
            self.next += 1;
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

pub(crate) fn validate_content(content: &str) -> ReasoningResult<()> {
    if content.trim().is_empty() {
        return Err(ReasoningError::Validation {
            field: "content".to_string(),
            reason: "Content cannot be empty".to_string(),
        });
    }
    Ok(())
}

pub(crate) fn validate_id(id: &str) -> ReasoningResult<()> {
    if id.trim().is_empty() {
        return Err(ReasoningError::Validation {
            field: "id".to_string(),
            reason: "Id cannot be empty".to_string(),
        });
    }
    Ok(())
}
