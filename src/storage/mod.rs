//! Storage layer for reasoning session persistence.
//!
//! Engines never persist themselves. The session registry hands complete
//! snapshots to a [`SnapshotStore`], and the server records every tool call
//! as an [`Invocation`].

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// A persisted session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Session identifier.
    pub id: String,
    /// Structure variant (`chain`, `tree` or `graph`).
    pub mode: String,
    /// Full engine snapshot as JSON.
    pub snapshot: serde_json::Value,
    /// When the session was first saved.
    pub created_at: DateTime<Utc>,
    /// When the session was last saved.
    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    /// Create a record stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        mode: impl Into<String>,
        snapshot: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            mode: mode.into(),
            snapshot,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing entry for a persisted session, without its snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// Structure variant.
    pub mode: String,
    /// When the session was first saved.
    pub created_at: DateTime<Utc>,
    /// When the session was last saved.
    pub updated_at: DateTime<Utc>,
}

/// Invocation log entry for debugging and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Session the call operated on, if any.
    pub session_id: Option<String>,
    /// Name of the MCP tool invoked.
    pub tool_name: String,
    /// Input parameters as JSON.
    pub input: serde_json::Value,
    /// Output result as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the invocation occurred.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(tool_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: None,
            tool_name: tool_name.into(),
            input,
            output: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the session ID
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Persistence backend for session snapshots and the invocation log.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace a session snapshot. `created_at` of an existing row is kept.
    async fn save_session(&self, session: &StoredSession) -> StorageResult<()>;

    /// Load a session snapshot by id.
    async fn load_session(&self, id: &str) -> StorageResult<Option<StoredSession>>;

    /// Most recently updated sessions first.
    async fn list_sessions(&self, limit: u32) -> StorageResult<Vec<SessionSummary>>;

    /// Delete a session. Fails with `SessionNotFound` if it does not exist.
    async fn delete_session(&self, id: &str) -> StorageResult<()>;

    /// Record a tool invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
}
