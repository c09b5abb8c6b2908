//! Reasoning structure engines.
//!
//! - [`ChainEngine`]: Ordered sequence of steps
//! - [`TreeEngine`]: Rooted hierarchy with path and sibling queries
//! - [`GraphEngine`]: Directed graph with ordering, propagation and merging
//!
//! Engines are synchronous, in-memory and own their nodes outright. Sharing
//! and persistence are handled by [`crate::session`].

mod chain;
mod graph;
mod node;
mod reflection;
mod tree;

pub use chain::*;
pub use graph::*;
pub use node::{
    suggestions_for, type_label, AddedThought, ThoughtNode, ThoughtType, ALL_TYPES,
    SEQUENTIAL_TYPES, UNTYPED_LABEL,
};
pub use reflection::*;
pub use tree::*;
