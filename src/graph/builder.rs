//! Graph derivation from stored nodes
//!
//! The graph is recomputed on every request and never cached. Edges are
//! derived from inline links and kept only when the target names a node.

use crate::config::EdgeValidation;
use crate::error::{Error, Result};
use crate::graph::links::extract_links;
use crate::node::{Node, NodeStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;

/// Label carried by every derived edge
pub const LINKS_TO: &str = "LINKS_TO";

/// Directed "links to" relation between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    pub label: String,
}

impl Edge {
    pub fn links_to(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: LINKS_TO.to_string(),
        }
    }
}

/// Nodes and validated edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Link neighbourhood of a node, used to build recommendation prompts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelatedNodes {
    pub first_degree: Vec<String>,
    pub second_degree: Vec<String>,
}

/// Builds graph views over a [`NodeStore`]
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    store: NodeStore,
    validation: EdgeValidation,
}

impl GraphBuilder {
    pub fn new(store: NodeStore, validation: EdgeValidation) -> Self {
        Self { store, validation }
    }

    pub fn validation(&self) -> EdgeValidation {
        self.validation
    }

    /// Scan every stored node and derive the graph.
    ///
    /// With [`EdgeValidation::Accumulated`] a target only validates if it was
    /// read before or is the source itself, so listing order matters.
    pub async fn build_graph(&self) -> Result<Graph> {
        let mut graph = Graph::default();
        let mut known: HashSet<String> = HashSet::new();
        let mut pending: Vec<(String, Vec<String>)> = Vec::new();

        for id in self.store.list().await? {
            let node = match self.store.read(&id).await {
                Ok(node) => node,
                Err(Error::NotFound(_)) => {
                    tracing::debug!(node = %id, "Node vanished during graph scan");
                    continue;
                }
                Err(Error::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                    tracing::warn!(node = %id, "Skipping node with undecodable content: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            known.insert(node.label.clone());
            let targets = extract_links(&node.content);

            match self.validation {
                EdgeValidation::Accumulated => {
                    graph.edges.extend(
                        targets
                            .iter()
                            .filter(|t| known.contains(t.as_str()))
                            .map(|t| Edge::links_to(&node.label, t)),
                    );
                }
                EdgeValidation::Full => pending.push((node.label.clone(), targets)),
            }

            graph.nodes.push(node);
        }

        for (from, targets) in pending {
            graph.edges.extend(
                targets
                    .into_iter()
                    .filter(|t| known.contains(t))
                    .map(|t| Edge::links_to(&from, t)),
            );
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Built graph"
        );
        Ok(graph)
    }

    /// First-degree link targets of `content` plus the targets of those
    /// first-degree nodes that exist.
    ///
    /// Second-degree targets are deduplicated among themselves only.
    pub async fn related(&self, content: &str) -> Result<RelatedNodes> {
        let first_degree = extract_links(content);

        let mut seen = HashSet::new();
        let mut second_degree = Vec::new();
        for target in &first_degree {
            let node = match self.store.read(target).await {
                Ok(node) => node,
                Err(Error::NotFound(_)) | Err(Error::InvalidNodeId(_)) => continue,
                Err(Error::Io(e)) if e.kind() == ErrorKind::InvalidData => {
                    tracing::warn!(
                        node = %target,
                        "Skipping linked node with undecodable content: {}",
                        e
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            for next in extract_links(&node.content) {
                if seen.insert(next.clone()) {
                    second_degree.push(next);
                }
            }
        }

        Ok(RelatedNodes {
            first_degree,
            second_degree,
        })
    }

    /// [`related`](Self::related) for a stored node
    pub async fn second_degree(&self, node_id: &str) -> Result<RelatedNodes> {
        let node = self.store.read(node_id).await?;
        self.related(&node.content).await
    }
}
