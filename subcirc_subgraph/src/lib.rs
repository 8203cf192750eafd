//! Subgraph isomorphism and frequent-subcircuit mining on coarse-grained
//! logic networks.
//!
//! Graphs are built through the string-keyed [`GraphBuilder`], frozen into
//! integer-indexed [`Graph`]s, and registered with a [`Solver`]. The solver
//! enumerates injective, connectivity-preserving embeddings of a needle
//! graph into a haystack graph, honoring type and constant compatibility
//! tables, port-swap permutations, intern/extern signal semantics and
//! non-overlap accounting. [`Solver::mine`] searches a corpus of registered
//! graphs for frequently recurring subcircuits.

mod builder;
mod error;
mod graph;
mod matcher;
mod matches;
mod miner;
mod perm;
mod solver;

pub use builder::GraphBuilder;
pub use error::{BuildError, ConfigError, SolveError};
pub use graph::{BitRef, Graph, SignalIndex};
pub use matches::{Match, MineResult, NodeMapping};
pub use solver::{DefaultHooks, MineOptions, SolveOptions, Solver, SolverHooks};

pub use subcirc_common::{SolverConfig, SolverConfigBuilder};
