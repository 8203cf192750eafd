//! Port-swap permutations.
//!
//! Swap groups and extra permutations are declared per node type with port
//! name strings; once a solve starts they are expanded into concrete
//! [`PortPerm`]s over the needle graph's interned port symbols. The
//! expansion of a type is `{ g } ∪ { p ∘ g }` for every group permutation
//! `g` and extra permutation `p`, deduplicated, identity first.

use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use subcirc_common::Symbol;

/// A bijective port-name rewrite. The identity rewrite is the empty map;
/// `apply` returns unknown symbols unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct PortPerm {
    map: AHashMap<Symbol, Symbol>,
}

impl PortPerm {
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builds a permutation from `(from, to)` pairs; fixpoints are dropped.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Symbol, Symbol)>) -> Self {
        let map = pairs.into_iter().filter(|(from, to)| from != to).collect();
        Self { map }
    }

    pub fn apply(&self, sym: Symbol) -> Symbol {
        self.map.get(&sym).copied().unwrap_or(sym)
    }

    pub fn is_identity(&self) -> bool {
        self.map.is_empty()
    }

    /// Symbols moved by this permutation (domain = image).
    pub fn moved(&self) -> impl Iterator<Item = (Symbol, Symbol)> + '_ {
        self.map.iter().map(|(from, to)| (*from, *to))
    }

    /// `outer ∘ inner`: applies `inner` first, then `outer`.
    pub fn compose(outer: &Self, inner: &Self) -> Self {
        let mut domain: AHashSet<Symbol> = inner.map.keys().copied().collect();
        domain.extend(outer.map.keys().copied());
        Self::from_pairs(
            domain
                .into_iter()
                .map(|sym| (sym, outer.apply(inner.apply(sym)))),
        )
    }

    /// Canonical form used for deduplication.
    fn key(&self) -> Vec<(Symbol, Symbol)> {
        let mut pairs: Vec<_> = self.map.iter().map(|(a, b)| (*a, *b)).collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Expands swap groups and extra permutations into the full permutation
/// set of a node type: all within-group permutations (composed across
/// groups), each optionally composed with one extra permutation.
pub(crate) fn expand_perms(groups: &[Vec<Symbol>], extras: &[PortPerm]) -> Vec<PortPerm> {
    let mut group_perms = vec![PortPerm::identity()];
    for group in groups {
        let mut next = Vec::with_capacity(group_perms.len());
        for image in group.iter().permutations(group.len()) {
            let sigma =
                PortPerm::from_pairs(group.iter().copied().zip(image.into_iter().copied()));
            for base in &group_perms {
                next.push(PortPerm::compose(&sigma, base));
            }
        }
        group_perms = next;
    }

    let mut out: Vec<PortPerm> = Vec::new();
    let mut seen: AHashSet<Vec<(Symbol, Symbol)>> = AHashSet::new();
    for perm in group_perms
        .iter()
        .cloned()
        .chain(extras.iter().flat_map(|extra| {
            group_perms
                .iter()
                .map(move |base| PortPerm::compose(extra, base))
        }))
    {
        if seen.insert(perm.key()) {
            out.push(perm);
        }
    }

    // Group expansion always yields the identity first, so the first entry
    // of the deduplicated set is the identity rewrite.
    debug_assert!(out.first().is_some_and(PortPerm::is_identity));
    out
}
