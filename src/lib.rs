//! # MCP Structured Reasoning Server
//!
//! A Model Context Protocol (MCP) server that lets an agent lay out its
//! problem solving as an explicit, inspectable structure of typed thoughts
//! instead of free-form text.
//!
//! ## Features
//!
//! - **Chains**: Ordered sequences of typed steps with reflection
//! - **Trees**: Rooted exploration with depth tracking, paths and siblings
//! - **Graphs**: Directed weighted graphs with cycle detection, topological
//!   ordering, single-hop score propagation and node merging
//! - **Sessions**: Many independent structures side by side, snapshotted to
//!   SQLite and restored on demand
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server (stdio) → Modes → Session Registry → Engines
//!                                                 ↓
//!                                          SQLite (snapshots)
//! ```
//!
//! The [`engine`] module is synchronous and has no I/O; everything else is
//! host integration around it.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_structured_reasoning::{AppState, Config, McpServer};
//! use mcp_structured_reasoning::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let state = Arc::new(AppState::new(config, Some(Arc::new(storage))));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Session inspection subcommands.
pub mod cli;
/// Configuration management for the MCP server.
pub mod config;
/// Chain, tree and graph reasoning engines.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Session-aware, async command surface over the engines.
pub mod modes;
/// MCP server implementation and request handling.
pub mod server;
/// Session-id keyed registry of live engines.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
