//! Match and mining result types.

use serde::{Deserialize, Serialize};

use crate::graph::Graph;

/// One needle node mapped onto a haystack node, with the port
/// correspondence that the applied swap permutation produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMapping {
    pub needle_node: String,
    pub haystack_node: String,
    /// `(needle_port, haystack_port)` pairs, in needle port order.
    pub port_map: Vec<(String, String)>,
}

/// A single embedding of a needle graph into a haystack graph.
///
/// The node map is injective on the haystack side; entries follow needle
/// node order. Exactly one representative is reported per set of solutions
/// that differ only in port swaps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub needle_graph: String,
    pub haystack_graph: String,
    pub nodes: Vec<NodeMapping>,
}

impl Match {
    /// Haystack node mapped from the given needle node, if any.
    #[must_use]
    pub fn haystack_node_of(&self, needle_node: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|m| m.needle_node == needle_node)
            .map(|m| m.haystack_node.as_str())
    }

    /// Renders the match in the shell's report format, numbered `index`.
    #[must_use]
    pub fn render(&self, index: usize) -> String {
        let mut out = format!(
            "Match #{}: ({} in {})\n",
            index, self.needle_graph, self.haystack_graph
        );
        for mapping in &self.nodes {
            let ports = mapping
                .port_map
                .iter()
                .map(|(n, h)| format!("{n}:{h}"))
                .collect::<Vec<_>>()
                .join(" ");
            out.push_str(&format!(
                "  {} -> {}  {}\n",
                mapping.needle_node, mapping.haystack_node, ports
            ));
        }
        out
    }
}

/// A frequent subcircuit reported by the miner.
#[derive(Debug)]
pub struct MineResult {
    /// The candidate pattern, frozen in needle shape (escaping signals are
    /// marked extern).
    pub candidate: Graph,
    pub total_matches: usize,
    /// Match count per registered graph, in registration order.
    pub per_graph: Vec<(String, usize)>,
}

impl MineResult {
    /// Renders the mining result in the shell's report format.
    #[must_use]
    pub fn render(&self, index: usize) -> String {
        let counts = self
            .per_graph
            .iter()
            .map(|(name, count)| format!("{name}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "Mined #{}: {} nodes, {} matches ({})\n",
            index,
            self.candidate.node_count(),
            self.total_matches,
            counts
        )
    }
}
