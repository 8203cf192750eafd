//! The matching engine.
//!
//! A modified Ullmann search specialized for coarse-grained netlists: a
//! boolean candidate matrix over (needle node, haystack node) pairs is
//! filtered, refined to a fixed point against the per-node port-to-port
//! bundles, and then backtracked over with most-constrained-row-first
//! variable order. Port-swap permutations are tried at assignment time,
//! identity first; the first admissible permutation is fixed for the
//! branch, so at most one representative is emitted per set of solutions
//! that differ only in the applied swaps.

use ahash::{AHashMap, AHashSet};
use subcirc_common::{SolverConfig, Symbol};

use crate::graph::{BitRef, BundlePair, Graph};
use crate::matches::{Match, NodeMapping};
use crate::perm::{expand_perms, PortPerm};
use crate::solver::SolverHooks;

/// Everything a single solve invocation needs, borrowed from the solver.
pub(crate) struct MatchRequest<'a> {
    pub needle: &'a Graph,
    pub haystack: &'a Graph,
    pub needle_name: &'a str,
    pub haystack_name: &'a str,
    pub config: &'a SolverConfig,
    pub hooks: &'a dyn SolverHooks,
    pub allow_overlap: bool,
    pub max_solutions: Option<usize>,
    /// Needle node index -> allowed haystack node indices.
    pub initial_mappings: AHashMap<usize, AHashSet<usize>>,
}

#[derive(Clone, Copy)]
struct Assigned {
    haystack: usize,
    perm: usize,
}

#[derive(Clone)]
struct SearchState {
    rows: Vec<Vec<bool>>,
    counts: Vec<usize>,
    assigned: Vec<Option<Assigned>>,
}

pub(crate) struct MatcherCore<'a> {
    req: MatchRequest<'a>,
    /// Flattened needle-type x haystack-type compatibility.
    type_compat: Vec<bool>,
    haystack_type_count: usize,
    /// Needle port-name symbol -> haystack port-name symbol, where the
    /// haystack graph interned the same string.
    port_xlat: Vec<Option<Symbol>>,
    /// Applicable permutations per needle node, identity first.
    node_perms: Vec<Vec<PortPerm>>,
    /// Haystack nodes consumed by earlier non-overlapping solves; grows as
    /// this call accepts solutions when overlap is forbidden.
    consumed: &'a mut AHashSet<usize>,
    emitted: usize,
}

impl<'a> MatcherCore<'a> {
    pub fn new(req: MatchRequest<'a>, consumed: &'a mut AHashSet<usize>) -> Self {
        let needle = req.needle;
        let haystack = req.haystack;

        let haystack_type_count = haystack.types().len();
        let mut type_compat = vec![false; needle.types().len() * haystack_type_count];
        for nt in 0..needle.types().len() {
            for ht in 0..haystack_type_count {
                let needle_ty = needle.types().resolve(needle.types().symbol_at(nt));
                let haystack_ty = haystack.types().resolve(haystack.types().symbol_at(ht));
                type_compat[nt * haystack_type_count + ht] =
                    req.config.types_compatible(needle_ty, haystack_ty);
            }
        }

        let port_xlat = (0..needle.port_names().len())
            .map(|idx| {
                let name = needle
                    .port_names()
                    .resolve(needle.port_names().symbol_at(idx));
                haystack.port_names().get(name)
            })
            .collect();

        let mut perms_by_type: AHashMap<Symbol, Vec<PortPerm>> = AHashMap::new();
        let node_perms = (0..needle.node_count())
            .map(|i| {
                let ty = needle.node_type_sym(i);
                let expanded = perms_by_type
                    .entry(ty)
                    .or_insert_with(|| expand_type_perms(needle, ty, req.config))
                    .clone();
                expanded
                    .into_iter()
                    .filter(|perm| perm_applicable(needle, i, perm))
                    .collect()
            })
            .collect();

        MatcherCore {
            req,
            type_compat,
            haystack_type_count,
            port_xlat,
            node_perms,
            consumed,
            emitted: 0,
        }
    }

    /// Runs the search, appending matches to `results`. Returns the number
    /// of matches appended by this call.
    pub fn run(mut self, results: &mut Vec<Match>) -> usize {
        let n = self.req.needle.node_count();
        let h = self.req.haystack.node_count();
        if n == 0 || self.capped() {
            return 0;
        }

        let mut state = SearchState {
            rows: vec![vec![false; h]; n],
            counts: vec![0; n],
            assigned: vec![None; n],
        };
        for i in 0..n {
            for j in 0..h {
                if self.initial_candidate(i, j) {
                    state.rows[i][j] = true;
                    state.counts[i] += 1;
                }
            }
            if state.counts[i] == 0 {
                tracing::debug!(
                    needle = self.req.needle_name,
                    node = self.req.needle.node_name(i),
                    "no initial candidates"
                );
                return 0;
            }
        }

        if self.req.config.verbose {
            tracing::info!(
                needle = self.req.needle_name,
                haystack = self.req.haystack_name,
                needle_nodes = n,
                haystack_nodes = h,
                "starting search"
            );
        }

        if !self.refine(&mut state) {
            return 0;
        }

        let mut seen: AHashSet<Vec<usize>> = AHashSet::new();
        self.search(&mut state, results, &mut seen);

        if self.req.config.verbose {
            tracing::info!(matches = self.emitted, "search done");
        }
        self.emitted
    }

    fn capped(&self) -> bool {
        self.req.max_solutions.is_some_and(|max| self.emitted >= max)
    }

    // ---- candidate matrix -------------------------------------------------

    fn initial_candidate(&self, i: usize, j: usize) -> bool {
        let needle = self.req.needle;
        let haystack = self.req.haystack;
        let nt = needle.node_type_sym(i).index();
        let ht = haystack.node_type_sym(j).index();
        if !self.type_compat[nt * self.haystack_type_count + ht] {
            return false;
        }
        if !self.ports_admissible(i, j, &PortPerm::identity()) {
            return false;
        }
        if let Some(allowed) = self.req.initial_mappings.get(&i) {
            if !allowed.contains(&j) {
                return false;
            }
        }
        if !self.req.allow_overlap && !haystack.node_shared(j) && self.consumed.contains(&j) {
            return false;
        }
        self.req.hooks.compare_nodes(needle, i, haystack, j)
    }

    /// Port-structure check under the given rewrite: every needle port must
    /// resolve to a haystack port of admissible width.
    fn ports_admissible(&self, i: usize, j: usize, perm: &PortPerm) -> bool {
        let needle = self.req.needle;
        for p in 0..needle.port_count(i) {
            let Some(q) = self.haystack_port(i, p, j, perm) else {
                return false;
            };
            let hay_width = self.req.haystack.port_width(j, q);
            if hay_width < needle.port_min_width(i, p) || hay_width > needle.port_width(i, p) {
                return false;
            }
        }
        true
    }

    /// Haystack port index matching needle port `p` of node `i` on haystack
    /// node `j`, under the rewrite `perm`.
    fn haystack_port(&self, i: usize, p: usize, j: usize, perm: &PortPerm) -> Option<usize> {
        let mapped = perm.apply(self.req.needle.port_name_sym(i, p));
        let hay_sym = self.port_xlat[mapped.index()]?;
        self.req.haystack.port_index_sym(j, hay_sym)
    }

    // ---- refinement -------------------------------------------------------

    /// Iterates the neighbor-bundle condition to a fixed point. Returns
    /// false as soon as a row becomes empty.
    fn refine(&self, state: &mut SearchState) -> bool {
        let n = self.req.needle.node_count();
        let h = self.req.haystack.node_count();
        loop {
            let mut changed = false;
            for i in 0..n {
                for j in 0..h {
                    if !state.rows[i][j] || self.row_viable(i, j, state) {
                        continue;
                    }
                    state.rows[i][j] = false;
                    state.counts[i] -= 1;
                    changed = true;
                    if state.counts[i] == 0 {
                        return false;
                    }
                }
            }
            if !changed {
                return true;
            }
        }
    }

    /// Whether haystack node `j` remains a viable image of needle node `i`:
    /// every needle neighbor must still have at least one compatible
    /// candidate adjacent to `j`.
    fn row_viable(&self, i: usize, j: usize, state: &SearchState) -> bool {
        let h = self.req.haystack.node_count();
        for (i2, _) in self.req.needle.adjacency(i) {
            if i2 == i {
                let ok = self
                    .perms_for(i, state)
                    .iter()
                    .any(|perm| self.bundle_ok(i, j, perm, i, j, perm));
                if !ok {
                    return false;
                }
                continue;
            }
            let found = (0..h).any(|j2| {
                state.rows[i2][j2] && j2 != j && self.pair_compatible(i, j, i2, j2, state)
            });
            if !found {
                return false;
            }
        }
        true
    }

    /// Whether some permutation choice makes the needle bundle between
    /// `(i, i2)` embeddable into the haystack bundle between `(j, j2)`.
    fn pair_compatible(&self, i: usize, j: usize, i2: usize, j2: usize, state: &SearchState) -> bool {
        self.perms_for(i, state).iter().any(|perm_i| {
            self.perms_for(i2, state)
                .iter()
                .any(|perm_i2| self.bundle_ok(i, j, perm_i, i2, j2, perm_i2))
        })
    }

    /// The permutations still open for needle node `i`: the full set while
    /// unassigned, the fixed one afterwards.
    fn perms_for(&self, i: usize, state: &SearchState) -> &[PortPerm] {
        match state.assigned[i] {
            Some(a) => std::slice::from_ref(&self.node_perms[i][a.perm]),
            None => &self.node_perms[i],
        }
    }

    /// Checks that every bit-level connection pair of the needle bundle
    /// `(i, i2)` exists between `(j, j2)` in the haystack under the given
    /// rewrites, with compatible constants.
    fn bundle_ok(
        &self,
        i: usize,
        j: usize,
        perm_i: &PortPerm,
        i2: usize,
        j2: usize,
        perm_i2: &PortPerm,
    ) -> bool {
        let needle = self.req.needle;
        let haystack = self.req.haystack;
        let Some(needle_bundle) = needle.bundle(i, i2) else {
            return true;
        };
        let Some(hay_bundle) = haystack.bundle(j, j2) else {
            return false;
        };
        for pair in needle_bundle {
            let Some(q) = self.haystack_port(i, pair.my_port, j, perm_i) else {
                return false;
            };
            let Some(q2) = self.haystack_port(i2, pair.their_port, j2, perm_i2) else {
                return false;
            };
            if pair.my_bit >= haystack.port_width(j, q)
                || pair.their_bit >= haystack.port_width(j2, q2)
            {
                return false;
            }
            if !hay_bundle.contains(&BundlePair {
                my_port: q,
                my_bit: pair.my_bit,
                their_port: q2,
                their_bit: pair.their_bit,
            }) {
                return false;
            }
            let needle_const =
                needle.signal_constant(needle.signal_at(i, pair.my_port, pair.my_bit));
            let hay_const = haystack.signal_constant(haystack.signal_at(j, q, pair.my_bit));
            if !self.constant_ok(needle_const, hay_const) {
                return false;
            }
            let edge_ok = self.req.hooks.compare_edge(
                needle,
                BitRef {
                    node: i,
                    port: pair.my_port,
                    bit: pair.my_bit,
                },
                BitRef {
                    node: i2,
                    port: pair.their_port,
                    bit: pair.their_bit,
                },
                haystack,
                BitRef {
                    node: j,
                    port: q,
                    bit: pair.my_bit,
                },
                BitRef {
                    node: j2,
                    port: q2,
                    bit: pair.their_bit,
                },
            );
            if !edge_ok {
                return false;
            }
        }
        true
    }

    /// A needle constant requires a compatible haystack constant; a
    /// constant-free needle bit matches anything.
    fn constant_ok(&self, needle: Option<char>, haystack: Option<char>) -> bool {
        match (needle, haystack) {
            (None, _) => true,
            (Some(n), Some(h)) => self.req.config.constants_compatible(n, h),
            (Some(_), None) => false,
        }
    }

    // ---- backtracking -----------------------------------------------------

    /// Depth-first assignment. Returns false when the solution cap was hit
    /// and the whole search should unwind.
    fn search(
        &mut self,
        state: &mut SearchState,
        results: &mut Vec<Match>,
        seen: &mut AHashSet<Vec<usize>>,
    ) -> bool {
        if self.capped() {
            return false;
        }

        let next = (0..self.req.needle.node_count())
            .filter(|&i| state.assigned[i].is_none())
            .min_by_key(|&i| (state.counts[i], i));
        let Some(i) = next else {
            self.try_emit(state, results, seen);
            return !self.capped();
        };

        for j in 0..self.req.haystack.node_count() {
            if !state.rows[i][j] {
                continue;
            }
            if !self.req.allow_overlap
                && !self.req.haystack.node_shared(j)
                && self.consumed.contains(&j)
            {
                continue;
            }
            // The first admissible permutation is fixed for this branch;
            // alternates are never retried for the same candidate, even
            // when the branch fails deeper in the search.
            let Some(perm_idx) =
                (0..self.node_perms[i].len()).find(|&p| self.assign_admissible(i, j, p, state))
            else {
                continue;
            };
            let snapshot = state.clone();
            if self.apply_assign(state, i, j, perm_idx) && self.refine(state) {
                if !self.search(state, results, seen) {
                    return false;
                }
            }
            *state = snapshot;
        }
        true
    }

    /// Local admissibility of fixing `i -> j` under permutation `perm_idx`:
    /// port structure, per-bit constants, and exact bundles against every
    /// already-assigned neighbor.
    fn assign_admissible(&self, i: usize, j: usize, perm_idx: usize, state: &SearchState) -> bool {
        let needle = self.req.needle;
        let haystack = self.req.haystack;
        let perm = &self.node_perms[i][perm_idx];
        if !self.ports_admissible(i, j, perm) {
            return false;
        }
        for p in 0..needle.port_count(i) {
            for bit in 0..needle.port_width(i, p) {
                let Some(c) = needle.signal_constant(needle.signal_at(i, p, bit)) else {
                    continue;
                };
                let Some(q) = self.haystack_port(i, p, j, perm) else {
                    return false;
                };
                if bit >= haystack.port_width(j, q) {
                    continue;
                }
                let hay_const = haystack.signal_constant(haystack.signal_at(j, q, bit));
                if !self.constant_ok(Some(c), hay_const) {
                    return false;
                }
            }
        }
        for (i2, _) in needle.adjacency(i) {
            if i2 == i {
                if !self.bundle_ok(i, j, perm, i, j, perm) {
                    return false;
                }
                continue;
            }
            if let Some(a2) = state.assigned[i2] {
                let perm_i2 = &self.node_perms[i2][a2.perm];
                if !self.bundle_ok(i, j, perm, i2, a2.haystack, perm_i2) {
                    return false;
                }
            }
        }
        true
    }

    /// Narrows row `i` to `j`, records the permutation, and clears column
    /// `j` everywhere else. Returns false if that empties another row.
    fn apply_assign(&self, state: &mut SearchState, i: usize, j: usize, perm_idx: usize) -> bool {
        for (idx, cell) in state.rows[i].iter_mut().enumerate() {
            *cell = idx == j;
        }
        state.counts[i] = 1;
        state.assigned[i] = Some(Assigned {
            haystack: j,
            perm: perm_idx,
        });
        for k in 0..state.rows.len() {
            if k != i && state.rows[k][j] {
                state.rows[k][j] = false;
                state.counts[k] -= 1;
                if state.counts[k] == 0 {
                    return false;
                }
            }
        }
        true
    }

    // ---- acceptance -------------------------------------------------------

    /// Full-candidate validation and emission: signal images must be
    /// consistent, constants compatible, internal signals contained, the
    /// user hook satisfied, and the node map not yet reported.
    fn try_emit(
        &mut self,
        state: &SearchState,
        results: &mut Vec<Match>,
        seen: &mut AHashSet<Vec<usize>>,
    ) {
        let needle = self.req.needle;
        let haystack = self.req.haystack;

        let images: Vec<Assigned> = state.assigned.iter().flatten().copied().collect();
        debug_assert_eq!(images.len(), needle.node_count());
        let image_nodes: AHashSet<usize> = images.iter().map(|a| a.haystack).collect();

        if !self.req.allow_overlap {
            for a in &images {
                if !haystack.node_shared(a.haystack) && self.consumed.contains(&a.haystack) {
                    return;
                }
            }
        }

        for s in 0..needle.signal_count() {
            let mut image_signal = None;
            for bit in needle.signal_bits(s) {
                let a = images[bit.node];
                let perm = &self.node_perms[bit.node][a.perm];
                let Some(q) = self.haystack_port(bit.node, bit.port, a.haystack, perm) else {
                    return;
                };
                if bit.bit >= haystack.port_width(a.haystack, q) {
                    continue;
                }
                let hs = haystack.signal_at(a.haystack, q, bit.bit);
                match image_signal {
                    None => image_signal = Some(hs),
                    Some(prev) if prev != hs => return,
                    Some(_) => {}
                }
            }
            let Some(hs) = image_signal else {
                continue;
            };
            if !self.constant_ok(needle.signal_constant(s), haystack.signal_constant(hs)) {
                return;
            }
            if !needle.signal_extern(s) && !haystack.signal_extern(hs) {
                let contained = haystack
                    .signal_bits(hs)
                    .iter()
                    .all(|hb| image_nodes.contains(&hb.node));
                if !contained {
                    return;
                }
            }
        }

        let signature: Vec<usize> = images.iter().map(|a| a.haystack).collect();
        if seen.contains(&signature) {
            return;
        }

        let nodes = (0..needle.node_count())
            .map(|i| {
                let a = images[i];
                let perm = &self.node_perms[i][a.perm];
                let port_map = (0..needle.port_count(i))
                    .map(|p| {
                        let sym = needle.port_name_sym(i, p);
                        (
                            needle.port_names().resolve(sym).to_owned(),
                            needle.port_names().resolve(perm.apply(sym)).to_owned(),
                        )
                    })
                    .collect();
                NodeMapping {
                    needle_node: needle.node_name(i).to_owned(),
                    haystack_node: haystack.node_name(a.haystack).to_owned(),
                    port_map,
                }
            })
            .collect();
        let mut found = Match {
            needle_graph: self.req.needle_name.to_owned(),
            haystack_graph: self.req.haystack_name.to_owned(),
            nodes,
        };

        if !self.req.hooks.check_solution(&found, needle, haystack) {
            return;
        }
        for i in 0..needle.node_count() {
            for (i2, bundle) in needle.adjacency(i) {
                let (a, a2) = (images[i], images[i2]);
                let perm = &self.node_perms[i][a.perm];
                let perm2 = &self.node_perms[i2][a2.perm];
                for pair in bundle {
                    let Some(q) = self.haystack_port(i, pair.my_port, a.haystack, perm) else {
                        continue;
                    };
                    let Some(q2) =
                        self.haystack_port(i2, pair.their_port, a2.haystack, perm2)
                    else {
                        continue;
                    };
                    if pair.my_bit >= haystack.port_width(a.haystack, q)
                        || pair.their_bit >= haystack.port_width(a2.haystack, q2)
                    {
                        continue;
                    }
                    self.req.hooks.annotate_edge(
                        &mut found,
                        needle,
                        BitRef {
                            node: i,
                            port: pair.my_port,
                            bit: pair.my_bit,
                        },
                        BitRef {
                            node: i2,
                            port: pair.their_port,
                            bit: pair.their_bit,
                        },
                        haystack,
                        BitRef {
                            node: a.haystack,
                            port: q,
                            bit: pair.my_bit,
                        },
                        BitRef {
                            node: a2.haystack,
                            port: q2,
                            bit: pair.their_bit,
                        },
                    );
                }
            }
        }

        seen.insert(signature);
        if !self.req.allow_overlap {
            for a in &images {
                if !haystack.node_shared(a.haystack) {
                    self.consumed.insert(a.haystack);
                }
            }
        }
        if self.req.config.verbose {
            tracing::info!(index = self.emitted, "match accepted");
        } else {
            tracing::trace!(index = self.emitted, "match accepted");
        }
        results.push(found);
        self.emitted += 1;
    }
}

/// Expands the configured swap groups and extra permutations of a node
/// type into concrete rewrites over the needle graph's port symbols.
/// Entries naming ports the graph never declared cannot apply and are
/// dropped.
fn expand_type_perms(needle: &Graph, ty: Symbol, config: &SolverConfig) -> Vec<PortPerm> {
    let ty_name = needle.types().resolve(ty);
    let groups: Vec<Vec<Symbol>> = config
        .groups_for(ty_name)
        .filter_map(|group| {
            group
                .iter()
                .map(|name| needle.port_names().get(name))
                .collect::<Option<Vec<_>>>()
        })
        .collect();
    let extras: Vec<PortPerm> = config
        .perms_for(ty_name)
        .filter_map(|spec| {
            spec.iter()
                .map(|(from, to)| {
                    Some((
                        needle.port_names().get(from)?,
                        needle.port_names().get(to)?,
                    ))
                })
                .collect::<Option<Vec<_>>>()
                .map(PortPerm::from_pairs)
        })
        .collect();
    expand_perms(&groups, &extras)
}

/// A rewrite applies to a node only if everything it moves is a port of
/// that node.
fn perm_applicable(needle: &Graph, node: usize, perm: &PortPerm) -> bool {
    perm.moved().all(|(from, to)| {
        needle.port_index_sym(node, from).is_some() && needle.port_index_sym(node, to).is_some()
    })
}

