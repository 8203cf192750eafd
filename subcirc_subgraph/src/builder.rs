//! Mutable graph construction.
//!
//! [`GraphBuilder`] accepts string-keyed nodes, ports, bit connections,
//! constant drivers and extern marks, and collapses bit connectivity with a
//! union-find as connections arrive. [`GraphBuilder::freeze`] consumes the
//! builder and renumbers union-find roots into contiguous signal indices,
//! so a frozen [`Graph`] can never be mutated again.

use std::any::Any;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use subcirc_common::{Interner, Symbol};
use union_find_rs::{disjoint_sets::DisjointSets, traits::UnionFind};

use crate::error::BuildError;
use crate::graph::{BitRef, BundlePair, Graph, Node, Port, Signal};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct BitKey {
    node: u32,
    port: u32,
    bit: u32,
}

struct BuildPort {
    name: Symbol,
    width: usize,
    min_width: usize,
}

struct BuildNode {
    name: String,
    ty: Symbol,
    shared: bool,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
    ports: Vec<BuildPort>,
    port_lookup: AHashMap<Symbol, usize>,
}

/// Builder for a [`Graph`].
pub struct GraphBuilder {
    nodes: Vec<BuildNode>,
    node_lookup: AHashMap<String, usize>,
    types: Interner,
    port_names: Interner,
    bits: DisjointSets<BitKey>,
    /// Constant drivers, keyed by the current union-find root of the signal.
    constants: AHashMap<BitKey, char>,
    /// Extern marks, keyed by the current union-find root of the signal.
    extern_roots: AHashSet<BitKey>,
    all_extern: bool,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        GraphBuilder {
            nodes: Vec::new(),
            node_lookup: AHashMap::new(),
            types: Interner::new(),
            port_names: Interner::new(),
            bits: DisjointSets::new(),
            constants: AHashMap::new(),
            extern_roots: AHashSet::new(),
            all_extern: false,
        }
    }

    /// Creates a node with the given name and type.
    pub fn create_node(&mut self, name: &str, ty: &str) -> Result<(), BuildError> {
        self.create_node_full(name, ty, None, false)
    }

    /// Creates a node carrying an opaque user payload and/or the `shared`
    /// flag (shared nodes are exempt from non-overlap accounting).
    pub fn create_node_full(
        &mut self,
        name: &str,
        ty: &str,
        user_data: Option<Arc<dyn Any + Send + Sync>>,
        shared: bool,
    ) -> Result<(), BuildError> {
        if self.node_lookup.contains_key(name) {
            return Err(BuildError::DuplicateNode(name.to_owned()));
        }
        let ty = self.types.intern(ty);
        self.node_lookup.insert(name.to_owned(), self.nodes.len());
        self.nodes.push(BuildNode {
            name: name.to_owned(),
            ty,
            shared,
            user_data,
            ports: Vec::new(),
            port_lookup: AHashMap::new(),
        });
        Ok(())
    }

    /// Creates a port of `width` bits; `min_width` defaults to the width.
    pub fn create_port(&mut self, node: &str, port: &str, width: usize) -> Result<(), BuildError> {
        self.create_port_min(node, port, width, width)
    }

    /// Creates a port that may match narrower haystack ports down to
    /// `min_width` bits (a needle-side relaxation).
    pub fn create_port_min(
        &mut self,
        node: &str,
        port: &str,
        width: usize,
        min_width: usize,
    ) -> Result<(), BuildError> {
        let node_idx = self.node_idx(node)?;
        if width < 1 {
            return Err(BuildError::BadWidth {
                node: node.to_owned(),
                port: port.to_owned(),
                width,
            });
        }
        if min_width < 1 || min_width > width {
            return Err(BuildError::BadMinWidth {
                node: node.to_owned(),
                port: port.to_owned(),
                width,
                min_width,
            });
        }
        let name = self.port_names.intern(port);
        if self.nodes[node_idx].port_lookup.contains_key(&name) {
            return Err(BuildError::DuplicatePort {
                node: node.to_owned(),
                port: port.to_owned(),
            });
        }
        let port_idx = self.nodes[node_idx].ports.len();
        self.nodes[node_idx].port_lookup.insert(name, port_idx);
        self.nodes[node_idx].ports.push(BuildPort {
            name,
            width,
            min_width,
        });
        for bit in 0..width {
            let key = BitKey {
                node: node_idx as u32,
                port: port_idx as u32,
                bit: bit as u32,
            };
            // Every key is minted exactly once, so make_set cannot collide.
            self.bits.make_set(key).unwrap();
        }
        Ok(())
    }

    /// Connects every bit of `port_a` to the corresponding bit of `port_b`.
    /// Both ports must have the same declared width. Redundant connections
    /// are accepted silently.
    pub fn create_connection(
        &mut self,
        node_a: &str,
        port_a: &str,
        node_b: &str,
        port_b: &str,
    ) -> Result<(), BuildError> {
        let (na, pa) = self.resolve_port(node_a, port_a)?;
        let (nb, pb) = self.resolve_port(node_b, port_b)?;
        let wa = self.nodes[na].ports[pa].width;
        let wb = self.nodes[nb].ports[pb].width;
        if wa != wb {
            return Err(BuildError::WidthMismatch {
                from_node: node_a.to_owned(),
                from_port: port_a.to_owned(),
                from_width: wa,
                to_node: node_b.to_owned(),
                to_port: port_b.to_owned(),
                to_width: wb,
            });
        }
        for bit in 0..wa {
            self.union_bits(bit_key(na, pa, bit), bit_key(nb, pb, bit))?;
        }
        Ok(())
    }

    /// Bit-slice connection: joins `width` consecutive bits starting at the
    /// given offsets on each side.
    pub fn create_connection_range(
        &mut self,
        node_a: &str,
        port_a: &str,
        bit_a: usize,
        node_b: &str,
        port_b: &str,
        bit_b: usize,
        width: usize,
    ) -> Result<(), BuildError> {
        let (na, pa) = self.resolve_port(node_a, port_a)?;
        let (nb, pb) = self.resolve_port(node_b, port_b)?;
        self.check_bit_range(node_a, port_a, na, pa, bit_a, width)?;
        self.check_bit_range(node_b, port_b, nb, pb, bit_b, width)?;
        for k in 0..width {
            self.union_bits(bit_key(na, pa, bit_a + k), bit_key(nb, pb, bit_b + k))?;
        }
        Ok(())
    }

    /// Attaches a constant driver to the signal containing the given bit.
    pub fn create_constant_bit(
        &mut self,
        node: &str,
        port: &str,
        bit: usize,
        value: char,
    ) -> Result<(), BuildError> {
        let (n, p) = self.resolve_port(node, port)?;
        self.check_bit_range(node, port, n, p, bit, 1)?;
        let root = self.root(bit_key(n, p, bit));
        if let Some(existing) = self.constants.get(&root) {
            if *existing != value {
                return Err(BuildError::ConstantConflict {
                    existing: *existing,
                    new: value,
                });
            }
        }
        self.constants.insert(root, value);
        Ok(())
    }

    /// Drives the whole port with the binary digits of `value`, LSB first.
    pub fn create_constant(&mut self, node: &str, port: &str, value: u64) -> Result<(), BuildError> {
        let (n, p) = self.resolve_port(node, port)?;
        let width = self.nodes[n].ports[p].width;
        for bit in 0..width {
            let digit = if (value >> bit) & 1 == 1 { '1' } else { '0' };
            self.create_constant_bit(node, port, bit, digit)?;
        }
        Ok(())
    }

    /// Marks the signals of every bit of the port as extern.
    pub fn mark_extern(&mut self, node: &str, port: &str) -> Result<(), BuildError> {
        let (n, p) = self.resolve_port(node, port)?;
        for bit in 0..self.nodes[n].ports[p].width {
            let root = self.root(bit_key(n, p, bit));
            self.extern_roots.insert(root);
        }
        Ok(())
    }

    /// Marks the signal of a single bit as extern.
    pub fn mark_extern_bit(&mut self, node: &str, port: &str, bit: usize) -> Result<(), BuildError> {
        let (n, p) = self.resolve_port(node, port)?;
        self.check_bit_range(node, port, n, p, bit, 1)?;
        let root = self.root(bit_key(n, p, bit));
        self.extern_roots.insert(root);
        Ok(())
    }

    /// Marks every signal of the graph extern, disabling the
    /// intern/extern distinction for it entirely.
    pub fn mark_all_extern(&mut self) {
        self.all_extern = true;
    }

    /// Collapses union-find roots to contiguous signal indices, precomputes
    /// the per-node port-to-port bundles, and returns the frozen graph.
    #[must_use]
    pub fn freeze(self) -> Graph {
        let GraphBuilder {
            nodes: build_nodes,
            node_lookup,
            types,
            port_names,
            bits,
            constants,
            extern_roots,
            all_extern,
        } = self;

        let mut signals: Vec<Signal> = Vec::new();
        let mut root_to_signal: AHashMap<BitKey, usize> = AHashMap::new();

        let mut nodes: Vec<Node> = build_nodes
            .into_iter()
            .enumerate()
            .map(|(node_idx, bn)| {
                let ports = bn
                    .ports
                    .into_iter()
                    .enumerate()
                    .map(|(port_idx, bp)| {
                        let signal_ids = (0..bp.width)
                            .map(|bit| {
                                let root = bits
                                    .find_set(&bit_key(node_idx, port_idx, bit))
                                    .unwrap();
                                let signal = *root_to_signal.entry(root).or_insert_with(|| {
                                    signals.push(Signal {
                                        bits: Vec::new(),
                                        constant: constants.get(&root).copied(),
                                        is_extern: all_extern || extern_roots.contains(&root),
                                    });
                                    signals.len() - 1
                                });
                                signals[signal].bits.push(BitRef {
                                    node: node_idx,
                                    port: port_idx,
                                    bit,
                                });
                                signal
                            })
                            .collect();
                        Port {
                            name: bp.name,
                            width: bp.width,
                            min_width: bp.min_width,
                            signals: signal_ids,
                        }
                    })
                    .collect();
                Node {
                    name: bn.name,
                    ty: bn.ty,
                    shared: bn.shared,
                    user_data: bn.user_data,
                    ports,
                    port_lookup: bn.port_lookup,
                    adjacency: AHashMap::new(),
                }
            })
            .collect();

        for signal in &signals {
            for a in &signal.bits {
                for b in &signal.bits {
                    if a == b {
                        continue;
                    }
                    nodes[a.node]
                        .adjacency
                        .entry(b.node)
                        .or_default()
                        .insert(BundlePair {
                            my_port: a.port,
                            my_bit: a.bit,
                            their_port: b.port,
                            their_bit: b.bit,
                        });
                }
            }
        }

        Graph {
            nodes,
            node_lookup,
            signals,
            types,
            port_names,
        }
    }

    fn node_idx(&self, name: &str) -> Result<usize, BuildError> {
        self.node_lookup
            .get(name)
            .copied()
            .ok_or_else(|| BuildError::UnknownNode(name.to_owned()))
    }

    fn resolve_port(&self, node: &str, port: &str) -> Result<(usize, usize), BuildError> {
        let node_idx = self.node_idx(node)?;
        let unknown = || BuildError::UnknownPort {
            node: node.to_owned(),
            port: port.to_owned(),
        };
        let sym = self.port_names.get(port).ok_or_else(unknown)?;
        let port_idx = self.nodes[node_idx]
            .port_lookup
            .get(&sym)
            .copied()
            .ok_or_else(unknown)?;
        Ok((node_idx, port_idx))
    }

    fn check_bit_range(
        &self,
        node: &str,
        port: &str,
        node_idx: usize,
        port_idx: usize,
        bit: usize,
        width: usize,
    ) -> Result<(), BuildError> {
        let declared = self.nodes[node_idx].ports[port_idx].width;
        if bit + width > declared {
            return Err(BuildError::BitOutOfRange {
                node: node.to_owned(),
                port: port.to_owned(),
                width: declared,
                bit: bit + width - 1,
            });
        }
        Ok(())
    }

    fn root(&self, key: BitKey) -> BitKey {
        self.bits.find_set(&key).unwrap()
    }

    fn union_bits(&mut self, a: BitKey, b: BitKey) -> Result<(), BuildError> {
        let ra = self.root(a);
        let rb = self.root(b);
        // union errors out when both bits already share a set, so redundant
        // connections are filtered here rather than reported.
        if ra == rb {
            return Ok(());
        }
        let ca = self.constants.get(&ra).copied();
        let cb = self.constants.get(&rb).copied();
        if let (Some(existing), Some(new)) = (ca, cb) {
            if existing != new {
                return Err(BuildError::ConstantConflict { existing, new });
            }
        }
        self.bits.union(&ra, &rb).unwrap();
        let root = self.root(a);
        for stale in [ra, rb] {
            if stale == root {
                continue;
            }
            if let Some(c) = self.constants.remove(&stale) {
                self.constants.insert(root, c);
            }
            if self.extern_roots.remove(&stale) {
                self.extern_roots.insert(root);
            }
        }
        Ok(())
    }
}

fn bit_key(node: usize, port: usize, bit: usize) -> BitKey {
    BitKey {
        node: node as u32,
        port: port as u32,
        bit: bit as u32,
    }
}
