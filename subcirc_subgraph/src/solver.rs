//! The solver: graph registry, matching configuration, overlap history and
//! the `solve`/`mine` entry points.
//!
//! A [`Solver`] is a self-contained value; it owns its graphs and mutable
//! state, and callers serialize access to it.

use ahash::{AHashMap, AHashSet};
use subcirc_common::SolverConfig;

use crate::error::{ConfigError, SolveError};
use crate::graph::{BitRef, Graph};
use crate::matcher::{MatchRequest, MatcherCore};
use crate::matches::{Match, MineResult};
use crate::miner;

/// Per-call solve parameters.
#[derive(Clone, Debug)]
pub struct SolveOptions {
    /// When false, haystack nodes consumed by earlier solutions (in this
    /// call or recorded in the overlap history) are off limits unless the
    /// node is shared.
    pub allow_overlap: bool,
    /// Stop after this many solutions were appended by the call.
    pub max_solutions: Option<usize>,
    /// Restricts the candidate domain of named needle nodes to the named
    /// haystack nodes.
    pub initial_mappings: Vec<(String, Vec<String>)>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            allow_overlap: true,
            max_solutions: None,
            initial_mappings: Vec::new(),
        }
    }
}

/// Parameters for [`Solver::mine`].
#[derive(Clone, Debug)]
pub struct MineOptions {
    pub min_nodes: usize,
    pub max_nodes: usize,
    /// Candidates matching fewer times than this across all graphs are not
    /// reported.
    pub min_matches: usize,
    /// Stop counting a candidate in one graph once this many matches were
    /// found there.
    pub per_graph_cap: Option<usize>,
}

/// User callbacks consulted during matching. Every method defaults to
/// accepting; a false return prunes the branch or rejects the solution and
/// is never treated as an error.
pub trait SolverHooks {
    /// Extra per-node admission test for the candidate matrix.
    fn compare_nodes(
        &self,
        _needle: &Graph,
        _needle_node: usize,
        _haystack: &Graph,
        _haystack_node: usize,
    ) -> bool {
        true
    }

    /// Extra per-connection test during bundle embedding.
    #[allow(clippy::too_many_arguments)]
    fn compare_edge(
        &self,
        _needle: &Graph,
        _needle_from: BitRef,
        _needle_to: BitRef,
        _haystack: &Graph,
        _haystack_from: BitRef,
        _haystack_to: BitRef,
    ) -> bool {
        true
    }

    /// Final veto over a fully assembled solution.
    fn check_solution(&self, _found: &Match, _needle: &Graph, _haystack: &Graph) -> bool {
        true
    }

    /// Runs on every mapped connection of an accepted solution before it
    /// is appended; the default adds nothing.
    #[allow(clippy::too_many_arguments)]
    fn annotate_edge(
        &self,
        _found: &mut Match,
        _needle: &Graph,
        _needle_from: BitRef,
        _needle_to: BitRef,
        _haystack: &Graph,
        _haystack_from: BitRef,
        _haystack_to: BitRef,
    ) {
    }
}

/// The always-accepting default hooks.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

impl SolverHooks for DefaultHooks {}

/// Registry of frozen graphs plus matching configuration and overlap
/// history.
pub struct Solver {
    graphs: AHashMap<String, Graph>,
    graph_order: Vec<String>,
    config: SolverConfig,
    /// Haystack graph name -> node indices consumed by non-overlapping
    /// solves.
    overlap: AHashMap<String, AHashSet<usize>>,
    hooks: Box<dyn SolverHooks>,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    #[must_use]
    pub fn with_config(config: SolverConfig) -> Self {
        Solver {
            graphs: AHashMap::new(),
            graph_order: Vec::new(),
            config,
            overlap: AHashMap::new(),
            hooks: Box::new(DefaultHooks),
        }
    }

    /// Registers a frozen graph under a name.
    pub fn add_graph(&mut self, name: &str, graph: Graph) -> Result<(), ConfigError> {
        if self.graphs.contains_key(name) {
            return Err(ConfigError::DuplicateGraph(name.to_owned()));
        }
        self.graph_order.push(name.to_owned());
        self.graphs.insert(name.to_owned(), graph);
        Ok(())
    }

    #[must_use]
    pub fn graph(&self, name: &str) -> Option<&Graph> {
        self.graphs.get(name)
    }

    /// Registered graph names in registration order.
    pub fn graph_names(&self) -> impl Iterator<Item = &str> {
        self.graph_order.iter().map(String::as_str)
    }

    /// Declares that needle nodes of one type may map onto haystack nodes
    /// of another. Identity is always compatible.
    pub fn add_compatible_types(&mut self, needle_ty: &str, haystack_ty: &str) {
        self.config
            .compat_types
            .push((needle_ty.to_owned(), haystack_ty.to_owned()));
    }

    /// Declares a compatible constant pair. Identity is always compatible.
    pub fn add_compatible_constants(&mut self, needle: char, haystack: char) {
        self.config.compat_constants.push((needle, haystack));
    }

    /// Registers a swap group: all permutations of the given ports are
    /// allowed on nodes of the type.
    pub fn add_swappable_ports<S: AsRef<str>>(
        &mut self,
        ty: &str,
        ports: &[S],
    ) -> Result<(), ConfigError> {
        let mut names: Vec<String> = Vec::with_capacity(ports.len());
        for port in ports {
            let port = port.as_ref();
            if !names.iter().any(|n| n == port) {
                names.push(port.to_owned());
            }
        }
        if names.len() < 2 {
            return Err(ConfigError::EmptySwapGroup(ty.to_owned()));
        }
        self.config.swap_groups.push((ty.to_owned(), names));
        Ok(())
    }

    /// Registers one extra permutation for the type, composed at most once
    /// with the implicit group permutations. The mapping must be a
    /// bijection on its port subset.
    pub fn add_swappable_ports_permutation<S: AsRef<str>>(
        &mut self,
        ty: &str,
        pairs: &[(S, S)],
    ) -> Result<(), ConfigError> {
        let malformed = || ConfigError::MalformedPermutation(ty.to_owned());
        if pairs.is_empty() {
            return Err(malformed());
        }
        let mut from: Vec<&str> = pairs.iter().map(|(f, _)| f.as_ref()).collect();
        let mut to: Vec<&str> = pairs.iter().map(|(_, t)| t.as_ref()).collect();
        from.sort_unstable();
        to.sort_unstable();
        if from.windows(2).any(|w| w[0] == w[1]) || from != to {
            return Err(malformed());
        }
        self.config.swap_permutations.push((
            ty.to_owned(),
            pairs
                .iter()
                .map(|(f, t)| (f.as_ref().to_owned(), t.as_ref().to_owned()))
                .collect(),
        ));
        Ok(())
    }

    /// Drops compatibility and swap configuration; graphs and overlap
    /// history survive.
    pub fn clear_config(&mut self) {
        self.config.clear();
    }

    /// Forgets which haystack nodes were consumed by non-overlapping
    /// solves.
    pub fn clear_overlap_history(&mut self) {
        self.overlap.clear();
    }

    /// Haystack node indices consumed so far for a registered graph.
    #[must_use]
    pub fn overlap_history(&self, graph: &str) -> Option<&AHashSet<usize>> {
        self.overlap.get(graph)
    }

    pub fn set_verbose(&mut self) {
        self.config.verbose = true;
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Replaces the user callbacks.
    pub fn set_hooks(&mut self, hooks: Box<dyn SolverHooks>) {
        self.hooks = hooks;
    }

    /// Solves with default options; see [`Solver::solve_with`].
    pub fn solve(
        &mut self,
        results: &mut Vec<Match>,
        needle: &str,
        haystack: &str,
    ) -> Result<usize, SolveError> {
        self.solve_with(results, needle, haystack, &SolveOptions::default())
    }

    /// Enumerates embeddings of `needle` into `haystack`, appending them to
    /// `results`. Returns the number of matches appended.
    pub fn solve_with(
        &mut self,
        results: &mut Vec<Match>,
        needle: &str,
        haystack: &str,
        options: &SolveOptions,
    ) -> Result<usize, SolveError> {
        let needle_graph = self
            .graphs
            .get(needle)
            .ok_or_else(|| SolveError::UnknownGraph(needle.to_owned()))?;
        let haystack_graph = self
            .graphs
            .get(haystack)
            .ok_or_else(|| SolveError::UnknownGraph(haystack.to_owned()))?;

        let mut initial_mappings: AHashMap<usize, AHashSet<usize>> = AHashMap::new();
        for (needle_node, haystack_nodes) in &options.initial_mappings {
            let i = needle_graph
                .node_index(needle_node)
                .ok_or_else(|| SolveError::InitialMappingUnknownNode(needle_node.clone()))?;
            let allowed: AHashSet<usize> = haystack_nodes
                .iter()
                .filter_map(|name| haystack_graph.node_index(name))
                .collect();
            initial_mappings
                .entry(i)
                .and_modify(|set| set.retain(|j| allowed.contains(j)))
                .or_insert(allowed);
        }

        let mut consumed = self.overlap.get(haystack).cloned().unwrap_or_default();
        let request = MatchRequest {
            needle: needle_graph,
            haystack: haystack_graph,
            needle_name: needle,
            haystack_name: haystack,
            config: &self.config,
            hooks: &*self.hooks,
            allow_overlap: options.allow_overlap,
            max_solutions: options.max_solutions,
            initial_mappings,
        };
        let appended = MatcherCore::new(request, &mut consumed).run(results);
        if !options.allow_overlap {
            self.overlap.insert(haystack.to_owned(), consumed);
        }
        Ok(appended)
    }

    /// Mines frequent subcircuits across all registered graphs, appending
    /// candidates whose total match count reaches `min_matches`. Returns
    /// the number of results appended.
    pub fn mine(&self, results: &mut Vec<MineResult>, options: &MineOptions) -> usize {
        let graphs: Vec<(&str, &Graph)> = self
            .graph_order
            .iter()
            .map(|name| (name.as_str(), &self.graphs[name]))
            .collect();
        miner::mine(&graphs, &self.config, &*self.hooks, results, options)
    }
}
