use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Reasoning error: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors raised by the reasoning-structure engines.
///
/// Every variant is recoverable: the engine validates before mutating, so
/// state is unchanged whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReasoningError {
    #[error("Invalid thought type '{value}'. Valid types: {}", .valid.join(", "))]
    InvalidType { value: String, valid: Vec<String> },

    #[error("Duplicate id: {id}")]
    DuplicateId { id: String },

    #[error("Parent not found: {parent_id}")]
    ParentNotFound { parent_id: String },

    #[error("Node not found: {node_id}")]
    MissingNode { node_id: String },

    #[error("Self-loop rejected on node {node_id}")]
    SelfLoop { node_id: String },

    #[error("Graph contains a cycle; topological order is undefined")]
    HasCycle,

    #[error("Topological order covered {sorted} of {total} nodes on an acyclic graph")]
    OrderingInvariant { sorted: usize, total: usize },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid snapshot: {message}")]
    InvalidSnapshot { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool-specific errors with structured details
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Session error: {0}")]
    Session(String),
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for engine operations
pub type ReasoningResult<T> = Result<T, ReasoningError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_reasoning_error_display() {
        let err = ReasoningError::InvalidType {
            value: "musing".to_string(),
            valid: vec!["analysis".to_string(), "task".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid thought type 'musing'. Valid types: analysis, task"
        );

        let err = ReasoningError::DuplicateId {
            id: "s1".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate id: s1");

        let err = ReasoningError::ParentNotFound {
            parent_id: "p".to_string(),
        };
        assert_eq!(err.to_string(), "Parent not found: p");

        let err = ReasoningError::SelfLoop {
            node_id: "a".to_string(),
        };
        assert_eq!(err.to_string(), "Self-loop rejected on node a");

        let err = ReasoningError::OrderingInvariant {
            sorted: 2,
            total: 3,
        };
        assert_eq!(
            err.to_string(),
            "Topological order covered 2 of 3 nodes on an acyclic graph"
        );
    }

    #[test]
    fn test_has_cycle_and_ordering_are_distinct() {
        let cycle = ReasoningError::HasCycle;
        let invariant = ReasoningError::OrderingInvariant {
            sorted: 0,
            total: 1,
        };
        assert_ne!(cycle, invariant);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_mcp_error_display() {
        let err = McpError::UnknownTool {
            tool_name: "nonexistent".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent");

        let err = McpError::InvalidParameters {
            tool_name: "reasoning_graph_add_edge".to_string(),
            message: "missing source".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for reasoning_graph_add_edge: missing source"
        );
    }

    #[test]
    fn test_tool_error_conversion_to_app_error() {
        let tool_err = ToolError::Session("wrong mode".to_string());
        let app_err: AppError = tool_err.into();
        assert!(matches!(app_err, AppError::Internal { .. }));
        assert!(app_err.to_string().contains("Session error"));
    }

    #[test]
    fn test_reasoning_error_conversion_to_app_error() {
        let app_err: AppError = ReasoningError::HasCycle.into();
        assert!(matches!(app_err, AppError::Reasoning(ReasoningError::HasCycle)));
    }

    #[test]
    fn test_app_error_conversion_to_mcp_error() {
        let app_err = AppError::Config {
            message: "test error".to_string(),
        };
        let mcp_err: McpError = app_err.into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("Configuration error"));
    }
}
