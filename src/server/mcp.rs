//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Line-delimited stdio transport

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// MCP protocol version implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null if unknown, always present).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Handles JSON-RPC 2.0 messages, one per line, and writes one response line
/// per request. Notifications get no response.
pub struct McpServer {
    /// Shared application state.
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("MCP Structured Reasoning Server starting...");

        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serve line-delimited JSON-RPC from `reader` until EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    ///
    /// Returns None for notifications (requests without id).
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        METHOD_NOT_FOUND,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }

    /// Handle tools/list request
    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");
        JsonRpcResponse::success(id, json!({ "tools": list_tools() }))
    }

    /// Handle tools/call request
    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        INVALID_PARAMS,
                        format!("Invalid params: {}", e),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (content, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (ToolResultContent::text(text), None)
                }
                Err(e) => (ToolResultContent::text(format!("Error: {}", e)), Some(true)),
            };

        let tool_result = ToolCallResult {
            content: vec![content],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, INTERNAL_ERROR, format!("Internal error: {}", e))
            }
        }
    }
}

impl ToolResultContent {
    /// Plain text content item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Every tool this server exposes, in listing order.
pub fn list_tools() -> Vec<Tool> {
    vec![
        // Chain
        get_chain_add_step_tool(),
        get_chain_reflect_tool(),
        // Tree
        get_tree_init_tool(),
        get_tree_add_thought_tool(),
        get_tree_path_tool(),
        get_tree_siblings_tool(),
        get_tree_reflect_tool(),
        // Graph
        get_graph_init_tool(),
        get_graph_add_node_tool(),
        get_graph_add_edge_tool(),
        get_graph_merge_tool(),
        get_graph_propagate_tool(),
        get_graph_topological_sort_tool(),
        get_graph_has_cycle_tool(),
        get_graph_stats_tool(),
        get_graph_serialize_tool(),
        get_graph_deserialize_tool(),
        // Sessions
        get_set_score_tool(),
        get_session_list_tool(),
    ]
}

/// Schema for a tool that only needs a session id
fn session_only_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {
                "type": "string",
                "description": description
            }
        },
        "required": ["session_id"],
        "additionalProperties": false
    })
}

const SEQUENTIAL_TYPE_NAMES: [&str; 4] = ["analysis", "reasoning", "task", "validation"];
const ALL_TYPE_NAMES: [&str; 5] = ["analysis", "reasoning", "synthesis", "task", "validation"];

// ============================================================================
// Chain tools
// ============================================================================

/// Get the chain add-step tool definition
fn get_chain_add_step_tool() -> Tool {
    Tool {
        name: "reasoning_chain_add_step".to_string(),
        description: "Append a typed step to a linear reasoning chain. Creates the chain session when session_id is omitted or unknown. Returns the step and next-step suggestions.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The step content"
                },
                "type": {
                    "type": "string",
                    "enum": SEQUENTIAL_TYPE_NAMES,
                    "description": "Thought type (default: reasoning)"
                },
                "step_id": {
                    "type": "string",
                    "description": "Optional step id (generated if omitted)"
                },
                "session_id": {
                    "type": "string",
                    "description": "Optional session ID for continuing a chain"
                }
            },
            "required": ["content"],
            "additionalProperties": false
        }),
    }
}

/// Get the chain reflect tool definition
fn get_chain_reflect_tool() -> Tool {
    Tool {
        name: "reasoning_chain_reflect".to_string(),
        description: "Reflect on a whole chain: step count, type distribution, weak points and improvement suggestions.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Chain session to reflect on"
                },
                "note": {
                    "type": "string",
                    "description": "Optional note echoed back in the report"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

// ============================================================================
// Tree tools
// ============================================================================

/// Get the tree init tool definition
fn get_tree_init_tool() -> Tool {
    Tool {
        name: "reasoning_tree_init".to_string(),
        description: "Create a tree session whose root node holds the problem statement."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "problem": {
                    "type": "string",
                    "description": "Problem statement held by the root node"
                },
                "session_id": {
                    "type": "string",
                    "description": "Optional session ID (generated if omitted)"
                }
            },
            "required": ["problem"],
            "additionalProperties": false
        }),
    }
}

/// Get the tree add-thought tool definition
fn get_tree_add_thought_tool() -> Tool {
    Tool {
        name: "reasoning_tree_add_thought".to_string(),
        description: "Attach a typed thought under a parent node (default: the root). Depth is the parent's depth plus one.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Tree session"
                },
                "content": {
                    "type": "string",
                    "description": "The thought content"
                },
                "parent_id": {
                    "type": "string",
                    "description": "Parent node id (default: root)"
                },
                "type": {
                    "type": "string",
                    "enum": SEQUENTIAL_TYPE_NAMES,
                    "description": "Thought type (default: reasoning)"
                },
                "thought_id": {
                    "type": "string",
                    "description": "Optional node id (generated if omitted)"
                }
            },
            "required": ["session_id", "content"],
            "additionalProperties": false
        }),
    }
}

/// Schema shared by tree node queries
fn tree_node_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "session_id": {
                "type": "string",
                "description": "Tree session"
            },
            "node_id": {
                "type": "string",
                "description": "Node to query"
            }
        },
        "required": ["session_id", "node_id"],
        "additionalProperties": false
    })
}

/// Get the tree path tool definition
fn get_tree_path_tool() -> Tool {
    Tool {
        name: "reasoning_tree_path".to_string(),
        description: "Nodes from the root down to the given node, root first.".to_string(),
        input_schema: tree_node_schema(),
    }
}

/// Get the tree siblings tool definition
fn get_tree_siblings_tool() -> Tool {
    Tool {
        name: "reasoning_tree_siblings".to_string(),
        description: "Other children of the node's parent. Empty for the root.".to_string(),
        input_schema: tree_node_schema(),
    }
}

/// Get the tree reflect tool definition
fn get_tree_reflect_tool() -> Tool {
    Tool {
        name: "reasoning_tree_reflect".to_string(),
        description: "Reflect on a whole tree: depth, branching, leaf count and improvement suggestions.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Tree session to reflect on"
                },
                "note": {
                    "type": "string",
                    "description": "Optional note echoed back in the report"
                }
            },
            "required": ["session_id"],
            "additionalProperties": false
        }),
    }
}

// ============================================================================
// Graph tools
// ============================================================================

/// Get the graph init tool definition
fn get_graph_init_tool() -> Tool {
    Tool {
        name: "reasoning_graph_init".to_string(),
        description: "Create an empty Graph-of-Thoughts session.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Optional session ID (generated if omitted)"
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Get the graph add-node tool definition
fn get_graph_add_node_tool() -> Tool {
    Tool {
        name: "reasoning_graph_add_node".to_string(),
        description: "Add a thought node to a graph. The type is optional.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Graph session"
                },
                "content": {
                    "type": "string",
                    "description": "The node content"
                },
                "node_id": {
                    "type": "string",
                    "description": "Optional node id (generated if omitted)"
                },
                "type": {
                    "type": "string",
                    "enum": ALL_TYPE_NAMES,
                    "description": "Optional thought type"
                }
            },
            "required": ["session_id", "content"],
            "additionalProperties": false
        }),
    }
}

/// Get the graph add-edge tool definition
fn get_graph_add_edge_tool() -> Tool {
    Tool {
        name: "reasoning_graph_add_edge".to_string(),
        description: "Add or replace the directed edge source -> target. Self-loops are rejected; cycles are allowed.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Graph session"
                },
                "source": {
                    "type": "string",
                    "description": "Source node id"
                },
                "target": {
                    "type": "string",
                    "description": "Target node id"
                },
                "weight": {
                    "type": "number",
                    "description": "Edge weight (default: 1.0)"
                },
                "type": {
                    "type": "string",
                    "description": "Relationship label (default: relates_to)"
                }
            },
            "required": ["session_id", "source", "target"],
            "additionalProperties": false
        }),
    }
}

/// Get the graph merge tool definition
fn get_graph_merge_tool() -> Tool {
    Tool {
        name: "reasoning_graph_merge".to_string(),
        description: "Merge source nodes into a new synthesis node with averaged score and confidence, linked from every source.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Graph session"
                },
                "source_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Nodes to merge"
                },
                "content": {
                    "type": "string",
                    "description": "Content of the synthesis node"
                },
                "merged_id": {
                    "type": "string",
                    "description": "Optional id of the synthesis node"
                }
            },
            "required": ["session_id", "source_ids", "content"],
            "additionalProperties": false
        }),
    }
}

/// Get the graph propagate tool definition
fn get_graph_propagate_tool() -> Tool {
    Tool {
        name: "reasoning_graph_propagate".to_string(),
        description: "Forward a node's score one hop: each direct successor gains score * 0.3. Not transitive; call again per node for multi-hop effects.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Graph session"
                },
                "node_id": {
                    "type": "string",
                    "description": "Node whose score is propagated"
                }
            },
            "required": ["session_id", "node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the graph topological sort tool definition
fn get_graph_topological_sort_tool() -> Tool {
    Tool {
        name: "reasoning_graph_topological_sort".to_string(),
        description: "Order every node so each edge points forward. Fails if the graph has a cycle."
            .to_string(),
        input_schema: session_only_schema("Graph session"),
    }
}

/// Get the graph cycle check tool definition
fn get_graph_has_cycle_tool() -> Tool {
    Tool {
        name: "reasoning_graph_has_cycle".to_string(),
        description: "Report whether the graph contains a directed cycle.".to_string(),
        input_schema: session_only_schema("Graph session"),
    }
}

/// Get the graph stats tool definition
fn get_graph_stats_tool() -> Tool {
    Tool {
        name: "reasoning_graph_stats".to_string(),
        description: "Node and edge counts, root and leaf counts, and type distribution."
            .to_string(),
        input_schema: session_only_schema("Graph session"),
    }
}

/// Get the graph serialize tool definition
fn get_graph_serialize_tool() -> Tool {
    Tool {
        name: "reasoning_graph_serialize".to_string(),
        description: "Export the graph as a snapshot of nodes keyed by id plus an edge list."
            .to_string(),
        input_schema: session_only_schema("Graph session"),
    }
}

/// Get the graph deserialize tool definition
fn get_graph_deserialize_tool() -> Tool {
    Tool {
        name: "reasoning_graph_deserialize".to_string(),
        description: "Create a new graph session from a snapshot produced by reasoning_graph_serialize.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "snapshot": {
                    "type": "object",
                    "properties": {
                        "nodes": {
                            "type": "object",
                            "description": "Nodes keyed by id"
                        },
                        "edges": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "source": { "type": "string" },
                                    "target": { "type": "string" },
                                    "weight": { "type": "number" },
                                    "type": { "type": "string" }
                                },
                                "required": ["source", "target", "weight", "type"]
                            }
                        }
                    },
                    "required": ["nodes", "edges"],
                    "description": "Graph snapshot"
                },
                "session_id": {
                    "type": "string",
                    "description": "Optional ID for the new session"
                }
            },
            "required": ["snapshot"],
            "additionalProperties": false
        }),
    }
}

// ============================================================================
// Session tools
// ============================================================================

/// Get the set-score tool definition
fn get_set_score_tool() -> Tool {
    Tool {
        name: "reasoning_set_score".to_string(),
        description: "Set the score and/or confidence of a node in any session.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "session_id": {
                    "type": "string",
                    "description": "Session holding the node"
                },
                "node_id": {
                    "type": "string",
                    "description": "Node to update"
                },
                "score": {
                    "type": "number",
                    "description": "New score"
                },
                "confidence": {
                    "type": "number",
                    "description": "New confidence"
                }
            },
            "required": ["session_id", "node_id"],
            "additionalProperties": false
        }),
    }
}

/// Get the session list tool definition
fn get_session_list_tool() -> Tool {
    Tool {
        name: "reasoning_session_list".to_string(),
        description: "List known sessions, most recently updated first.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of sessions (default: 50)"
                }
            },
            "additionalProperties": false
        }),
    }
}
