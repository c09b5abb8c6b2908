use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::parse_thought_type;
use crate::engine::{
    ChainReflection, ReflectionOutcome, ThoughtNode, ThoughtType, SEQUENTIAL_TYPES,
};
use crate::error::AppResult;
use crate::session::{Access, SessionRegistry};

/// Input parameters for adding a chain step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStepParams {
    /// The step content
    pub content: String,
    /// Thought type; defaults to `reasoning`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub thought_type: Option<String>,
    /// Caller-chosen step id (generated if omitted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Optional session ID (creates new if not provided)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChainStepParams {
    /// Create params for a step with the given content
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            thought_type: None,
            step_id: None,
            session_id: None,
        }
    }

    /// Set the thought type
    pub fn with_type(mut self, thought_type: impl Into<String>) -> Self {
        self.thought_type = Some(thought_type.into());
        self
    }

    /// Set the step id
    pub fn with_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Result of adding a chain step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainStepResult {
    pub session_id: String,
    pub step: ThoughtNode,
    pub suggestions: Vec<String>,
    pub total_steps: usize,
}

/// Input parameters for chain reflection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReflectParams {
    /// Chain session to reflect on
    pub session_id: String,
    /// Free-form note echoed back in the report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Result of chain reflection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainReflectResult {
    pub session_id: String,
    pub reflection: ReflectionOutcome<ChainReflection>,
}

/// Chain reasoning mode handler
#[derive(Clone)]
pub struct ChainMode {
    registry: Arc<SessionRegistry>,
}

impl ChainMode {
    /// Create a new chain mode handler
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Append a step, creating the session on first use
    pub async fn add_step(&self, params: ChainStepParams) -> AppResult<ChainStepResult> {
        let kind = parse_thought_type(params.thought_type.as_deref(), SEQUENTIAL_TYPES)?
            .unwrap_or(ThoughtType::Reasoning);

        let ChainStepParams {
            content,
            step_id,
            session_id,
            ..
        } = params;

        let (session_id, (added, total_steps)) = self
            .registry
            .with_chain_or_create(session_id, |chain| {
                let added = chain.add_step(step_id, content, kind)?;
                Ok((added, chain.len()))
            })
            .await?;

        info!(
            session_id = %session_id,
            step_id = %added.node.id,
            total_steps,
            "Chain step added"
        );

        Ok(ChainStepResult {
            session_id,
            step: added.node,
            suggestions: added.suggestions,
            total_steps,
        })
    }

    /// Reflect on the chain as a whole
    pub async fn reflect(&self, params: ChainReflectParams) -> AppResult<ChainReflectResult> {
        let ChainReflectParams { session_id, note } = params;

        let reflection = self
            .registry
            .with_chain(&session_id, Access::Read, |chain| Ok(chain.reflect(note)))
            .await?;

        if reflection.is_empty() {
            warn!(session_id = %session_id, "Chain reflection found nothing to report");
        } else {
            debug!(session_id = %session_id, "Chain reflection");
        }

        Ok(ChainReflectResult {
            session_id,
            reflection,
        })
    }
}
