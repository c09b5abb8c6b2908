//! Reasoning mode implementations.
//!
//! Each mode is the async, session-aware surface over one engine:
//! - [`ChainMode`]: Sequential step-by-step reasoning
//! - [`TreeMode`]: Branching exploration from a root problem
//! - [`GraphMode`]: Graph-of-Thoughts with ordering, propagation and merging
//!
//! Modes parse and validate tool parameters, resolve the session through the
//! shared [`SessionRegistry`](crate::session::SessionRegistry) and shape the
//! engine output into serializable results.

mod chain;
mod graph;
mod tree;

pub use chain::*;
pub use graph::*;
pub use tree::*;

use serde::{Deserialize, Serialize};

use crate::engine::{ThoughtNode, ThoughtType};
use crate::error::{AppResult, ToolError};
use crate::session::{Access, SessionRegistry};
use crate::storage::SessionSummary;

// ============================================================================
// Shared Utilities
// ============================================================================

/// Parse an optional type string, restricted to `allowed`.
pub(crate) fn parse_thought_type(
    value: Option<&str>,
    allowed: &[ThoughtType],
) -> AppResult<Option<ThoughtType>> {
    value
        .map(|v| ThoughtType::parse_within(v, allowed))
        .transpose()
        .map_err(Into::into)
}

/// Reject scores that are NaN or infinite.
pub(crate) fn ensure_finite(field: &str, value: Option<f64>) -> AppResult<()> {
    match value {
        Some(v) if !v.is_finite() => Err(ToolError::Validation {
            field: field.to_string(),
            reason: "Value must be a finite number".to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

// ============================================================================
// Session-wide Operations
// ============================================================================

/// Input parameters for updating a node's score and/or confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Session holding the node
    pub session_id: String,
    /// Node to update
    pub node_id: String,
    /// New score (unchanged if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// New confidence (unchanged if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Result of a score update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResult {
    pub session_id: String,
    pub mode: ReasoningMode,
    pub node: ThoughtNode,
}

/// Update a node's score and/or confidence in any kind of session.
pub async fn set_score(
    registry: &SessionRegistry,
    params: ScoreParams,
) -> AppResult<ScoreResult> {
    ensure_finite("score", params.score)?;
    ensure_finite("confidence", params.confidence)?;
    if params.score.is_none() && params.confidence.is_none() {
        return Err(ToolError::Validation {
            field: "score".to_string(),
            reason: "Provide a score, a confidence, or both".to_string(),
        }
        .into());
    }

    let ScoreParams {
        session_id,
        node_id,
        score,
        confidence,
    } = params;

    let (mode, node) = registry
        .with_session(&session_id, Access::Write, |engine| {
            let node = engine.set_score(&node_id, score, confidence)?;
            Ok((engine.mode(), node))
        })
        .await?;

    Ok(ScoreResult {
        session_id,
        mode,
        node,
    })
}

/// Input parameters for listing sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListParams {
    /// Maximum number of sessions to return
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    50
}

impl Default for SessionListParams {
    fn default() -> Self {
        Self {
            limit: default_list_limit(),
        }
    }
}

/// Known sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResult {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

/// List resident and persisted sessions, most recently updated first.
pub async fn list_sessions(
    registry: &SessionRegistry,
    params: SessionListParams,
) -> AppResult<SessionListResult> {
    let sessions = registry.list(params.limit).await?;
    Ok(SessionListResult {
        count: sessions.len(),
        sessions,
    })
}

/// Reasoning structure variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    /// Linear chain of steps.
    Chain,
    /// Rooted tree of thoughts.
    Tree,
    /// Directed graph of thoughts.
    Graph,
}

impl ReasoningMode {
    /// Get the mode name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningMode::Chain => "chain",
            ReasoningMode::Tree => "tree",
            ReasoningMode::Graph => "graph",
        }
    }
}

impl std::fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReasoningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chain" => Ok(ReasoningMode::Chain),
            "tree" => Ok(ReasoningMode::Tree),
            "graph" => Ok(ReasoningMode::Graph),
            _ => Err(format!("Unknown reasoning mode: {}", s)),
        }
    }
}
