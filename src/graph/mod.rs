//! Graph view over stored nodes
//!
//! Nodes come from the [`NodeStore`](crate::node::NodeStore); edges are
//! derived from inline `[text](<node:Target>)` links and validated against
//! the node set.

mod builder;
pub mod links;

pub use builder::{Edge, Graph, GraphBuilder, RelatedNodes, LINKS_TO};
pub use links::extract_links;
