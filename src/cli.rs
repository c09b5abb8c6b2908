//! CLI commands for inspecting persisted sessions.
//!
//! These run against the snapshot store directly and never start the MCP
//! server. A running server keeps its resident copy of a deleted session and
//! saves it again on its next write.

use clap::Subcommand;

use crate::error::StorageError;
use crate::storage::SnapshotStore;

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,

    /// List persisted sessions, most recently updated first
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Print a persisted session snapshot as pretty JSON
    Show {
        /// Session to print
        session_id: String,
    },

    /// Delete a persisted session
    Delete {
        /// Session to delete
        session_id: String,
    },
}

/// Result of CLI command execution.
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute an inspection command. `Serve` is handled by the binary.
pub async fn execute_command(command: Commands, store: &dyn SnapshotStore) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is not an inspection command"),
        Commands::Sessions { limit } => execute_sessions(store, limit).await,
        Commands::Show { session_id } => execute_show(store, &session_id).await,
        Commands::Delete { session_id } => execute_delete(store, &session_id).await,
    }
}

async fn execute_sessions(store: &dyn SnapshotStore, limit: u32) -> CliResult {
    let sessions = match store.list_sessions(limit).await {
        Ok(s) => s,
        Err(e) => return CliResult::error(format!("Failed to list sessions: {}", e)),
    };

    if sessions.is_empty() {
        return CliResult::success("No sessions stored.");
    }

    let mut output = format!("{:<38} {:<6} {:<26}\n", "SESSION", "MODE", "UPDATED");
    for session in &sessions {
        output.push_str(&format!(
            "{:<38} {:<6} {:<26}\n",
            session.id,
            session.mode,
            session.updated_at.to_rfc3339()
        ));
    }
    output.push_str(&format!("\n{} session(s)", sessions.len()));

    CliResult::success(output)
}

async fn execute_show(store: &dyn SnapshotStore, session_id: &str) -> CliResult {
    match store.load_session(session_id).await {
        Ok(Some(session)) => match serde_json::to_string_pretty(&session) {
            Ok(json) => CliResult::success(json),
            Err(e) => CliResult::error(format!("Failed to render session: {}", e)),
        },
        Ok(None) => CliResult::error(format!("Session not found: {}", session_id)),
        Err(e) => CliResult::error(format!("Failed to load session: {}", e)),
    }
}

async fn execute_delete(store: &dyn SnapshotStore, session_id: &str) -> CliResult {
    match store.delete_session(session_id).await {
        Ok(()) => CliResult::success(format!("Deleted session: {}", session_id)),
        Err(StorageError::SessionNotFound { .. }) => {
            CliResult::error(format!("Session not found: {}", session_id))
        }
        Err(e) => CliResult::error(format!("Failed to delete session: {}", e)),
    }
}
