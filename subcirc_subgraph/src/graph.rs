//! Frozen, integer-indexed netlist graphs.
//!
//! A [`Graph`] is produced by [`crate::GraphBuilder::freeze`] and never
//! mutated afterwards. Node, port and type names are interned; bit-level
//! connectivity is collapsed into signals (hyperedges) and, per node, into
//! precomputed port-to-port bundles against each adjacent node. The bundles
//! are what the matcher consults on its hot path.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use subcirc_common::{Interner, Symbol};

/// Index of a signal within its graph.
pub type SignalIndex = usize;

/// A single bit position: node, port and bit offset within the port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BitRef {
    pub node: usize,
    pub port: usize,
    pub bit: usize,
}

/// One bit-level connection of a node towards a specific neighbor:
/// `(my_port, my_bit)` shares a signal with `(their_port, their_bit)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct BundlePair {
    pub my_port: usize,
    pub my_bit: usize,
    pub their_port: usize,
    pub their_bit: usize,
}

pub(crate) struct Node {
    pub name: String,
    pub ty: Symbol,
    pub shared: bool,
    pub user_data: Option<Arc<dyn Any + Send + Sync>>,
    pub ports: Vec<Port>,
    pub port_lookup: AHashMap<Symbol, usize>,
    /// neighbor node index -> all bit-level connections towards it.
    /// Self-adjacency (two ports of one node on one signal) is kept under
    /// the node's own index.
    pub adjacency: AHashMap<usize, AHashSet<BundlePair>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("shared", &self.shared)
            .field("ports", &self.ports.len())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Port {
    pub name: Symbol,
    pub width: usize,
    pub min_width: usize,
    /// Signal carrying each bit, LSB first; length equals `width`.
    pub signals: Vec<SignalIndex>,
}

#[derive(Clone, Debug)]
pub(crate) struct Signal {
    pub bits: Vec<BitRef>,
    pub constant: Option<char>,
    pub is_extern: bool,
}

/// A frozen netlist graph.
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) node_lookup: AHashMap<String, usize>,
    pub(crate) signals: Vec<Signal>,
    pub(crate) types: Interner,
    pub(crate) port_names: Interner,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("signals", &self.signals.len())
            .finish()
    }
}

impl Graph {
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the node with the given user-visible name.
    #[must_use]
    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_lookup.get(name).copied()
    }

    #[must_use]
    pub fn node_name(&self, node: usize) -> &str {
        &self.nodes[node].name
    }

    #[must_use]
    pub fn node_type(&self, node: usize) -> &str {
        self.types.resolve(self.nodes[node].ty)
    }

    #[must_use]
    pub(crate) fn node_type_sym(&self, node: usize) -> Symbol {
        self.nodes[node].ty
    }

    /// Whether the node is exempt from non-overlap accounting.
    #[must_use]
    pub fn node_shared(&self, node: usize) -> bool {
        self.nodes[node].shared
    }

    /// The opaque user payload attached at build time, if any.
    #[must_use]
    pub fn node_user_data(&self, node: usize) -> Option<&(dyn Any + Send + Sync)> {
        self.nodes[node].user_data.as_deref()
    }

    #[must_use]
    pub fn port_count(&self, node: usize) -> usize {
        self.nodes[node].ports.len()
    }

    #[must_use]
    pub fn port_name(&self, node: usize, port: usize) -> &str {
        self.port_names.resolve(self.nodes[node].ports[port].name)
    }

    #[must_use]
    pub(crate) fn port_name_sym(&self, node: usize, port: usize) -> Symbol {
        self.nodes[node].ports[port].name
    }

    #[must_use]
    pub fn port_width(&self, node: usize, port: usize) -> usize {
        self.nodes[node].ports[port].width
    }

    #[must_use]
    pub fn port_min_width(&self, node: usize, port: usize) -> usize {
        self.nodes[node].ports[port].min_width
    }

    /// Port index by user-visible name.
    #[must_use]
    pub fn port_index(&self, node: usize, port: &str) -> Option<usize> {
        let sym = self.port_names.get(port)?;
        self.port_index_sym(node, sym)
    }

    #[must_use]
    pub(crate) fn port_index_sym(&self, node: usize, port: Symbol) -> Option<usize> {
        self.nodes[node].port_lookup.get(&port).copied()
    }

    /// Signal carrying a specific bit.
    #[must_use]
    pub fn signal_at(&self, node: usize, port: usize, bit: usize) -> SignalIndex {
        self.nodes[node].ports[port].signals[bit]
    }

    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// All bits on a signal; never empty.
    #[must_use]
    pub fn signal_bits(&self, signal: SignalIndex) -> &[BitRef] {
        &self.signals[signal].bits
    }

    /// The signal's constant driver, if one was attached.
    #[must_use]
    pub fn signal_constant(&self, signal: SignalIndex) -> Option<char> {
        self.signals[signal].constant
    }

    #[must_use]
    pub fn signal_extern(&self, signal: SignalIndex) -> bool {
        self.signals[signal].is_extern
    }

    /// Indices of all nodes adjacent to `node` (possibly including `node`
    /// itself when two of its ports share a signal), in ascending order.
    #[must_use]
    pub fn neighbors(&self, node: usize) -> Vec<usize> {
        let mut out: Vec<usize> = self.nodes[node].adjacency.keys().copied().collect();
        out.sort_unstable();
        out
    }

    #[must_use]
    pub(crate) fn bundle(&self, node: usize, neighbor: usize) -> Option<&AHashSet<BundlePair>> {
        self.nodes[node].adjacency.get(&neighbor)
    }

    pub(crate) fn adjacency(
        &self,
        node: usize,
    ) -> impl Iterator<Item = (usize, &AHashSet<BundlePair>)> {
        self.nodes[node].adjacency.iter().map(|(n, b)| (*n, b))
    }

    #[must_use]
    pub(crate) fn types(&self) -> &Interner {
        &self.types
    }

    #[must_use]
    pub(crate) fn port_names(&self) -> &Interner {
        &self.port_names
    }
}
