//! Error types for graph construction, solver configuration and solving.
//!
//! All of these surface synchronously to the caller; the engine performs no
//! recovery. Hook return values are pruning signals and never become errors.

use thiserror::Error;

/// Errors raised while building a graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A node with this name already exists in the graph.
    #[error("node '{0}' already exists")]
    DuplicateNode(String),

    /// The named node does not exist.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// A port with this name already exists on the node.
    #[error("port '{port}' already exists on node '{node}'")]
    DuplicatePort { node: String, port: String },

    /// The named port does not exist on the node.
    #[error("unknown port '{port}' on node '{node}'")]
    UnknownPort { node: String, port: String },

    /// Declared port width below one.
    #[error("invalid width {width} for port '{node}.{port}'")]
    BadWidth {
        node: String,
        port: String,
        width: usize,
    },

    /// min_width above the declared width or below one.
    #[error("invalid min_width {min_width} for port '{node}.{port}' of width {width}")]
    BadMinWidth {
        node: String,
        port: String,
        width: usize,
        min_width: usize,
    },

    /// A bit offset outside the declared port width.
    #[error("bit {bit} out of range for port '{node}.{port}' of width {width}")]
    BitOutOfRange {
        node: String,
        port: String,
        width: usize,
        bit: usize,
    },

    /// Full-width connection between ports of unequal width.
    #[error("width mismatch connecting '{from_node}.{from_port}' ({from_width}) to '{to_node}.{to_port}' ({to_width})")]
    WidthMismatch {
        from_node: String,
        from_port: String,
        from_width: usize,
        to_node: String,
        to_port: String,
        to_width: usize,
    },

    /// Two different constant drivers ended up on one signal.
    #[error("conflicting constants '{existing}' and '{new}' on one signal")]
    ConstantConflict { existing: char, new: char },
}

/// Errors raised while configuring a solver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A graph with this name is already registered.
    #[error("graph '{0}' already registered")]
    DuplicateGraph(String),

    /// The named graph is not registered.
    #[error("unknown graph '{0}'")]
    UnknownGraph(String),

    /// An extra swap permutation that is not a bijection.
    #[error("malformed permutation for type '{0}'")]
    MalformedPermutation(String),

    /// A swap group with fewer than two ports.
    #[error("swap group for type '{0}' needs at least two ports")]
    EmptySwapGroup(String),
}

/// Errors raised when starting a solve.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SolveError {
    /// Needle or haystack name is not registered.
    #[error("unknown graph '{0}'")]
    UnknownGraph(String),

    /// An initial mapping references a node the needle does not have.
    #[error("initial mapping references unknown needle node '{0}'")]
    InitialMappingUnknownNode(String),
}
