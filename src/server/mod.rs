//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::modes::{ChainMode, GraphMode, TreeMode};
use crate::session::SessionRegistry;
use crate::storage::SnapshotStore;

/// Application state shared across handlers.
///
/// Every mode handler shares the same session registry, so a session created
/// through one tool is visible to all the others.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Session-id keyed engines.
    pub registry: Arc<SessionRegistry>,
    /// Snapshot and invocation store, if one is configured.
    pub store: Option<Arc<dyn SnapshotStore>>,
    /// Chain reasoning mode handler.
    pub chain_mode: ChainMode,
    /// Tree reasoning mode handler.
    pub tree_mode: TreeMode,
    /// Graph reasoning mode handler.
    pub graph_mode: GraphMode,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        tracing::info!(
            persist = config.sessions.persist,
            max_sessions = config.sessions.max_sessions,
            has_store = store.is_some(),
            "AppState initializing"
        );

        let registry = Arc::new(SessionRegistry::new(
            config.sessions.clone(),
            store.clone(),
        ));

        Self {
            chain_mode: ChainMode::new(Arc::clone(&registry)),
            tree_mode: TreeMode::new(Arc::clone(&registry)),
            graph_mode: GraphMode::new(Arc::clone(&registry)),
            config,
            registry,
            store,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
