//! Node storage
//!
//! Each node is one flat text file named after the node, holding an optional
//! tag header followed by free-form content.

pub mod codec;
pub mod handler;
mod store;

pub use codec::{Node, NodeBody, DELIMITER};
pub use handler::{graph_router, GraphState};
pub use store::{validate_id, NodeStore};
