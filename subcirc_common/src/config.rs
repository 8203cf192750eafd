//! Solver configuration.
//!
//! [`SolverConfig`] is plain data: the solver validates entries as they are
//! added (through its `add_*` methods) and the matcher compiles the string
//! tables down to symbol-indexed lookups once per solve. Identity is always
//! compatible for both type pairs and constant pairs, so an empty config is
//! the exact-match configuration.

use serde::{Deserialize, Serialize};

/// One extra port permutation for a node type: a list of
/// `(from_port, to_port)` pairs forming a bijection on some subset of the
/// type's port names.
pub type PermSpec = Vec<(String, String)>;

/// Matching configuration shared by every solve and mine call on a solver.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Raise per-step trace output during matching.
    pub verbose: bool,
    /// Directional `(needle_type, haystack_type)` compatibility pairs.
    pub compat_types: Vec<(String, String)>,
    /// Directional `(needle_char, haystack_char)` constant compatibility.
    pub compat_constants: Vec<(char, char)>,
    /// Per-type swap groups; every permutation within a group is allowed.
    pub swap_groups: Vec<(String, Vec<String>)>,
    /// Per-type extra permutations, composed at most once on top of the
    /// group permutations.
    pub swap_permutations: Vec<(String, PermSpec)>,
}

impl SolverConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder::default()
    }

    /// Whether a needle node of `needle_ty` may map onto a haystack node of
    /// `haystack_ty`. Identity is always compatible.
    #[must_use]
    pub fn types_compatible(&self, needle_ty: &str, haystack_ty: &str) -> bool {
        needle_ty == haystack_ty
            || self
                .compat_types
                .iter()
                .any(|(n, h)| n == needle_ty && h == haystack_ty)
    }

    /// Whether a needle constant may map onto a haystack constant.
    /// Identity is always compatible.
    #[must_use]
    pub fn constants_compatible(&self, needle: char, haystack: char) -> bool {
        needle == haystack
            || self
                .compat_constants
                .iter()
                .any(|(n, h)| *n == needle && *h == haystack)
    }

    /// Swap groups registered for `ty`.
    pub fn groups_for<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a [String]> + 'a {
        self.swap_groups
            .iter()
            .filter(move |(t, _)| t == ty)
            .map(|(_, ports)| ports.as_slice())
    }

    /// Extra permutations registered for `ty`.
    pub fn perms_for<'a>(&'a self, ty: &'a str) -> impl Iterator<Item = &'a PermSpec> + 'a {
        self.swap_permutations
            .iter()
            .filter(move |(t, _)| t == ty)
            .map(|(_, spec)| spec)
    }

    /// Drops compatibility and swap entries; the verbose flag survives.
    pub fn clear(&mut self) {
        self.compat_types.clear();
        self.compat_constants.clear();
        self.swap_groups.clear();
        self.swap_permutations.clear();
    }
}

/// Fluent construction for [`SolverConfig`], mainly used by tests and the
/// shell driver.
#[derive(Clone, Debug, Default)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    #[must_use]
    pub fn compat_types(mut self, needle_ty: &str, haystack_ty: &str) -> Self {
        self.config
            .compat_types
            .push((needle_ty.to_owned(), haystack_ty.to_owned()));
        self
    }

    #[must_use]
    pub fn compat_constants(mut self, needle: char, haystack: char) -> Self {
        self.config.compat_constants.push((needle, haystack));
        self
    }

    #[must_use]
    pub fn swap_group<S: Into<String>>(mut self, ty: &str, ports: impl IntoIterator<Item = S>) -> Self {
        self.config
            .swap_groups
            .push((ty.to_owned(), ports.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn swap_permutation(mut self, ty: &str, spec: PermSpec) -> Self {
        self.config.swap_permutations.push((ty.to_owned(), spec));
        self
    }

    #[must_use]
    pub fn build(self) -> SolverConfig {
        self.config
    }
}
