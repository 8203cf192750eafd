//! Shared building blocks for the subcirc workspace.
//!
//! This crate carries the pieces that both the matching engine and the
//! `scshell` driver need: the per-graph string interner and the solver
//! configuration surface.

mod config;
mod intern;

pub use config::{PermSpec, SolverConfig, SolverConfigBuilder};
pub use intern::{Interner, Symbol};
