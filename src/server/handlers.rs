use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{info, warn};

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::modes::{
    list_sessions, set_score, ChainReflectParams, ChainStepParams, GraphDeserializeParams,
    GraphEdgeParams, GraphInitParams, GraphMergeParams, GraphNodeParams, GraphPropagateParams,
    GraphSessionParams, ScoreParams, SessionListParams, TreeInitParams, TreeNodeParams,
    TreeReflectParams, TreeThoughtParams,
};
use crate::storage::Invocation;

/// Route tool calls to appropriate handlers.
///
/// Every call is recorded in the invocation log when a store is configured.
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    let started = Instant::now();
    let input = arguments.clone().unwrap_or(Value::Null);
    let result = route_tool_call(state, tool_name, arguments).await;

    record_invocation(state, tool_name, input, &result, started).await;
    result
}

async fn route_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    match tool_name {
        // Chain
        "reasoning_chain_add_step" => handle_chain_add_step(state, arguments).await,
        "reasoning_chain_reflect" => handle_chain_reflect(state, arguments).await,
        // Tree
        "reasoning_tree_init" => handle_tree_init(state, arguments).await,
        "reasoning_tree_add_thought" => handle_tree_add_thought(state, arguments).await,
        "reasoning_tree_path" => handle_tree_path(state, arguments).await,
        "reasoning_tree_siblings" => handle_tree_siblings(state, arguments).await,
        "reasoning_tree_reflect" => handle_tree_reflect(state, arguments).await,
        // Graph
        "reasoning_graph_init" => handle_graph_init(state, arguments).await,
        "reasoning_graph_add_node" => handle_graph_add_node(state, arguments).await,
        "reasoning_graph_add_edge" => handle_graph_add_edge(state, arguments).await,
        "reasoning_graph_merge" => handle_graph_merge(state, arguments).await,
        "reasoning_graph_propagate" => handle_graph_propagate(state, arguments).await,
        "reasoning_graph_topological_sort" => handle_graph_topological_sort(state, arguments).await,
        "reasoning_graph_has_cycle" => handle_graph_has_cycle(state, arguments).await,
        "reasoning_graph_stats" => handle_graph_stats(state, arguments).await,
        "reasoning_graph_serialize" => handle_graph_serialize(state, arguments).await,
        "reasoning_graph_deserialize" => handle_graph_deserialize(state, arguments).await,
        // Sessions
        "reasoning_set_score" => handle_set_score(state, arguments).await,
        "reasoning_session_list" => handle_session_list(state, arguments).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Write one invocation record. Failures only warn.
async fn record_invocation(
    state: &SharedState,
    tool_name: &str,
    input: Value,
    result: &McpResult<Value>,
    started: Instant,
) {
    let Some(store) = state.store.as_ref() else {
        return;
    };

    let latency_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    let session_id = session_id_of(result.as_ref().ok()).or_else(|| session_id_of(Some(&input)));
    let mut invocation = Invocation::new(tool_name, input);
    if let Some(session_id) = session_id {
        invocation = invocation.with_session(session_id);
    }
    let invocation = match result {
        Ok(output) => invocation.success(output.clone(), latency_ms),
        Err(e) => invocation.failure(e.to_string(), latency_ms),
    };

    if let Err(e) = store.log_invocation(&invocation).await {
        warn!(
            error = %e,
            tool = %tool_name,
            "Failed to log invocation"
        );
    }
}

fn session_id_of(value: Option<&Value>) -> Option<String> {
    value?
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ============================================================================
// Chain Handlers
// ============================================================================

async fn handle_chain_add_step(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_chain_add_step",
        arguments,
        |params: ChainStepParams| state.chain_mode.add_step(params),
    )
    .await
}

async fn handle_chain_reflect(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_chain_reflect",
        arguments,
        |params: ChainReflectParams| state.chain_mode.reflect(params),
    )
    .await
}

// ============================================================================
// Tree Handlers
// ============================================================================

async fn handle_tree_init(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("reasoning_tree_init", arguments, |params: TreeInitParams| {
        state.tree_mode.init(params)
    })
    .await
}

async fn handle_tree_add_thought(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_tree_add_thought",
        arguments,
        |params: TreeThoughtParams| state.tree_mode.add_thought(params),
    )
    .await
}

async fn handle_tree_path(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("reasoning_tree_path", arguments, |params: TreeNodeParams| {
        state.tree_mode.path(params)
    })
    .await
}

async fn handle_tree_siblings(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_tree_siblings",
        arguments,
        |params: TreeNodeParams| state.tree_mode.siblings(params),
    )
    .await
}

async fn handle_tree_reflect(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_tree_reflect",
        arguments,
        |params: TreeReflectParams| state.tree_mode.reflect(params),
    )
    .await
}

// ============================================================================
// Graph Handlers
// ============================================================================

async fn handle_graph_init(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    // Every field is optional, so a missing arguments object is fine.
    let arguments = Some(arguments.unwrap_or_else(|| Value::Object(Default::default())));
    execute_handler("reasoning_graph_init", arguments, |params: GraphInitParams| {
        state.graph_mode.init(params)
    })
    .await
}

async fn handle_graph_add_node(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_add_node",
        arguments,
        |params: GraphNodeParams| state.graph_mode.add_node(params),
    )
    .await
}

async fn handle_graph_add_edge(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_add_edge",
        arguments,
        |params: GraphEdgeParams| state.graph_mode.add_edge(params),
    )
    .await
}

async fn handle_graph_merge(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_merge",
        arguments,
        |params: GraphMergeParams| state.graph_mode.merge(params),
    )
    .await
}

async fn handle_graph_propagate(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_propagate",
        arguments,
        |params: GraphPropagateParams| state.graph_mode.propagate(params),
    )
    .await
}

async fn handle_graph_topological_sort(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_topological_sort",
        arguments,
        |params: GraphSessionParams| state.graph_mode.topological_sort(params),
    )
    .await
}

async fn handle_graph_has_cycle(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_has_cycle",
        arguments,
        |params: GraphSessionParams| state.graph_mode.has_cycle(params),
    )
    .await
}

async fn handle_graph_stats(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_stats",
        arguments,
        |params: GraphSessionParams| state.graph_mode.stats(params),
    )
    .await
}

async fn handle_graph_serialize(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_serialize",
        arguments,
        |params: GraphSessionParams| state.graph_mode.serialize(params),
    )
    .await
}

async fn handle_graph_deserialize(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler(
        "reasoning_graph_deserialize",
        arguments,
        |params: GraphDeserializeParams| state.graph_mode.deserialize(params),
    )
    .await
}

// ============================================================================
// Session Handlers
// ============================================================================

async fn handle_set_score(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("reasoning_set_score", arguments, |params: ScoreParams| {
        set_score(&state.registry, params)
    })
    .await
}

async fn handle_session_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    let arguments = Some(arguments.unwrap_or_else(|| Value::Object(Default::default())));
    execute_handler(
        "reasoning_session_list",
        arguments,
        |params: SessionListParams| list_sessions(&state.registry, params),
    )
    .await
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed parameters, run the mode operation and serialize its result.
async fn execute_handler<P, R, E, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: std::fmt::Display,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(result).map_err(McpError::Json)
}
