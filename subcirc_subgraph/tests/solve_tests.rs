mod common;

use common::{
    chain2, chain2_copies, macc22_mixed_needle, macc22_needle, macc4x2_crossed_haystack,
    macc4x2_haystack, setup_test_logging,
};
use subcirc_subgraph::{BitRef, Graph, GraphBuilder, Match, SolveOptions, Solver, SolverHooks};

fn assert_injective(found: &[Match]) {
    for m in found {
        let mut seen = std::collections::HashSet::new();
        for node in &m.nodes {
            assert!(
                seen.insert(node.haystack_node.clone()),
                "haystack node {} mapped twice",
                node.haystack_node
            );
        }
    }
}

fn macc_solver() -> Solver {
    let mut solver = Solver::new();
    solver.add_graph("macc22", macc22_needle()).unwrap();
    solver.add_graph("macc4x2", macc4x2_haystack()).unwrap();
    solver
}

#[test]
fn macc_without_swaps_matches_both_orientations() {
    setup_test_logging();
    let mut solver = macc_solver();
    let mut results = Vec::new();
    solver.solve(&mut results, "macc22", "macc4x2").unwrap();
    assert_eq!(results.len(), 2);
    assert_injective(&results);
    // Identity permutations only.
    for m in &results {
        for node in &m.nodes {
            for (needle_port, haystack_port) in &node.port_map {
                assert_eq!(needle_port, haystack_port);
            }
        }
    }
}

#[test]
fn swap_group_enables_commuted_match() {
    setup_test_logging();
    let mut solver = Solver::new();
    solver.add_graph("macc22", macc22_mixed_needle()).unwrap();
    solver
        .add_graph("macc4x2", macc4x2_crossed_haystack())
        .unwrap();

    // The crossed second adder is unreachable without commuting inputs.
    let mut results = Vec::new();
    solver.solve(&mut results, "macc22", "macc4x2").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].haystack_node_of("add_1"), Some("add_1"));

    solver.add_swappable_ports("add", &["A", "B"]).unwrap();
    results.clear();
    solver.solve(&mut results, "macc22", "macc4x2").unwrap();
    assert_eq!(results.len(), 2);
    assert_injective(&results);

    // The commuted embedding into the second adder reports swapped ports.
    let swapped = results
        .iter()
        .find(|m| m.haystack_node_of("add_1") == Some("add_2"))
        .expect("commuted match into add_2");
    let add = swapped
        .nodes
        .iter()
        .find(|n| n.needle_node == "add_1")
        .unwrap();
    assert!(add.port_map.contains(&("A".into(), "B".into())));
    assert!(add.port_map.contains(&("B".into(), "A".into())));
}

#[test]
fn no_two_matches_differ_only_by_port_map() {
    setup_test_logging();
    let mut solver = macc_solver();
    solver.add_swappable_ports("add", &["A", "B"]).unwrap();
    solver.add_swappable_ports("mul", &["A", "B"]).unwrap();
    let mut results = Vec::new();
    solver.solve(&mut results, "macc22", "macc4x2").unwrap();
    let mut node_maps = std::collections::HashSet::new();
    for m in &results {
        let signature: Vec<(&str, &str)> = m
            .nodes
            .iter()
            .map(|n| (n.needle_node.as_str(), n.haystack_node.as_str()))
            .collect();
        assert!(node_maps.insert(signature), "duplicate node map reported");
    }
}

/// A four-operand cell fed by one input node per distinct operand type;
/// `wiring[k]` names the cell port driven by the type-`t{k+1}` input.
fn quad_cell(wiring: [&str; 4]) -> Graph {
    let mut b = GraphBuilder::new();
    for k in 1..=4 {
        let name = format!("i{k}");
        b.create_node(&name, &format!("t{k}")).unwrap();
        b.create_port(&name, "O", 1).unwrap();
    }
    b.create_node("m", "macc22").unwrap();
    for port in ["A", "B", "C", "D", "Y"] {
        b.create_port("m", port, 1).unwrap();
    }
    for (k, port) in wiring.iter().enumerate() {
        b.create_connection(&format!("i{}", k + 1), "O", "m", port)
            .unwrap();
    }
    b.mark_extern("m", "Y").unwrap();
    b.freeze()
}

#[test]
fn swap_permutations_compose_with_groups() {
    setup_test_logging();
    let mut solver = Solver::new();
    solver
        .add_graph("needle", quad_cell(["A", "B", "C", "D"]))
        .unwrap();
    solver
        .add_graph("straight", quad_cell(["A", "B", "C", "D"]))
        .unwrap();
    solver
        .add_graph("ab_swapped", quad_cell(["B", "A", "C", "D"]))
        .unwrap();
    solver
        .add_graph("crossed", quad_cell(["C", "D", "A", "B"]))
        .unwrap();
    solver
        .add_graph("composed", quad_cell(["D", "C", "B", "A"]))
        .unwrap();

    let count = |solver: &mut Solver, haystack: &str| {
        let mut results = Vec::new();
        solver.solve(&mut results, "needle", haystack).unwrap();
        results
    };

    // Without configuration only the straight wiring embeds.
    assert_eq!(count(&mut solver, "straight").len(), 1);
    assert_eq!(count(&mut solver, "ab_swapped").len(), 0);
    assert_eq!(count(&mut solver, "crossed").len(), 0);
    assert_eq!(count(&mut solver, "composed").len(), 0);

    // Group permutations commute within {A,B} and {C,D}.
    solver.add_swappable_ports("macc22", &["A", "B"]).unwrap();
    solver.add_swappable_ports("macc22", &["C", "D"]).unwrap();
    assert_eq!(count(&mut solver, "ab_swapped").len(), 1);
    assert_eq!(count(&mut solver, "crossed").len(), 0);
    assert_eq!(count(&mut solver, "composed").len(), 0);

    // The extra permutation reaches the crossed wiring directly, and the
    // fully reversed wiring only through its composition with the groups.
    solver
        .add_swappable_ports_permutation("macc22", &[("A", "C"), ("C", "A"), ("B", "D"), ("D", "B")])
        .unwrap();
    assert_eq!(count(&mut solver, "crossed").len(), 1);
    let composed = count(&mut solver, "composed");
    assert_eq!(composed.len(), 1);
    let cell = composed[0]
        .nodes
        .iter()
        .find(|n| n.needle_node == "m")
        .unwrap();
    assert!(cell.port_map.contains(&("A".into(), "D".into())));
    assert!(cell.port_map.contains(&("B".into(), "C".into())));
    assert!(cell.port_map.contains(&("C".into(), "B".into())));
    assert!(cell.port_map.contains(&("D".into(), "A".into())));
}

#[test]
fn width_subtyping_down_to_min_width() {
    setup_test_logging();
    let mut wide = GraphBuilder::new();
    wide.create_node("a", "add").unwrap();
    wide.create_port_min("a", "A", 32, 1).unwrap();
    wide.create_port_min("a", "B", 32, 1).unwrap();
    wide.create_port_min("a", "Y", 32, 1).unwrap();

    let mut narrow = GraphBuilder::new();
    narrow.create_node("x", "add").unwrap();
    narrow.create_port("x", "A", 16).unwrap();
    narrow.create_port("x", "B", 16).unwrap();
    narrow.create_port("x", "Y", 16).unwrap();

    let mut solver = Solver::new();
    solver.add_graph("wide", wide.freeze()).unwrap();
    solver.add_graph("narrow", narrow.freeze()).unwrap();

    let mut results = Vec::new();
    solver.solve(&mut results, "wide", "narrow").unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].haystack_node_of("a"), Some("x"));

    // Without the min_width relaxation the widths must agree exactly.
    let mut strict = GraphBuilder::new();
    strict.create_node("a", "add").unwrap();
    strict.create_port("a", "A", 32).unwrap();
    strict.create_port("a", "B", 32).unwrap();
    strict.create_port("a", "Y", 32).unwrap();
    let mut solver2 = Solver::new();
    solver2.add_graph("strict", strict.freeze()).unwrap();
    let mut narrow2 = GraphBuilder::new();
    narrow2.create_node("x", "add").unwrap();
    narrow2.create_port("x", "A", 16).unwrap();
    narrow2.create_port("x", "B", 16).unwrap();
    narrow2.create_port("x", "Y", 16).unwrap();
    solver2.add_graph("narrow", narrow2.freeze()).unwrap();
    results.clear();
    solver2.solve(&mut results, "strict", "narrow").unwrap();
    assert!(results.is_empty());
}

#[test]
fn internal_signal_rejects_escaping_haystack_net() {
    setup_test_logging();
    // Haystack chain whose connecting wire also drives a third node.
    let mut hb = GraphBuilder::new();
    hb.create_node("x", "t1").unwrap();
    hb.create_port("x", "Y", 1).unwrap();
    hb.create_node("y", "t2").unwrap();
    hb.create_port("y", "A", 1).unwrap();
    hb.create_node("z", "t3").unwrap();
    hb.create_port("z", "A", 1).unwrap();
    hb.create_connection("x", "Y", "y", "A").unwrap();
    hb.create_connection("x", "Y", "z", "A").unwrap();
    let haystack = hb.freeze();

    let mut solver = Solver::new();
    solver.add_graph("needle", chain2(("a", "t1"), ("b", "t2"))).unwrap();
    solver.add_graph("haystack", haystack).unwrap();
    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert!(results.is_empty());

    // The same chain with the connecting signal marked extern may embed.
    let mut nb = GraphBuilder::new();
    nb.create_node("a", "t1").unwrap();
    nb.create_port("a", "Y", 1).unwrap();
    nb.create_node("b", "t2").unwrap();
    nb.create_port("b", "A", 1).unwrap();
    nb.create_connection("a", "Y", "b", "A").unwrap();
    nb.mark_extern("a", "Y").unwrap();
    solver.add_graph("needle_ext", nb.freeze()).unwrap();
    results.clear();
    solver.solve(&mut results, "needle_ext", "haystack").unwrap();
    assert_eq!(results.len(), 1);

    // A haystack net marked extern is itself exempt from containment.
    let mut hb2 = GraphBuilder::new();
    hb2.create_node("x", "t1").unwrap();
    hb2.create_port("x", "Y", 1).unwrap();
    hb2.create_node("y", "t2").unwrap();
    hb2.create_port("y", "A", 1).unwrap();
    hb2.create_node("z", "t3").unwrap();
    hb2.create_port("z", "A", 1).unwrap();
    hb2.create_connection("x", "Y", "y", "A").unwrap();
    hb2.create_connection("x", "Y", "z", "A").unwrap();
    hb2.mark_extern("x", "Y").unwrap();
    solver.add_graph("haystack_ext", hb2.freeze()).unwrap();
    results.clear();
    solver.solve(&mut results, "needle", "haystack_ext").unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn non_overlapping_solves_consume_haystack_nodes() {
    setup_test_logging();
    let mut solver = Solver::new();
    solver
        .add_graph("needle", chain2(("a", "t1"), ("b", "t2")))
        .unwrap();
    solver.add_graph("haystack", chain2_copies(3)).unwrap();

    let options = SolveOptions {
        allow_overlap: false,
        ..SolveOptions::default()
    };
    let mut results = Vec::new();
    solver
        .solve_with(&mut results, "needle", "haystack", &options)
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(solver.overlap_history("haystack").unwrap().len(), 6);

    // Everything is consumed now.
    solver
        .solve_with(&mut results, "needle", "haystack", &options)
        .unwrap();
    assert_eq!(results.len(), 3);

    solver.clear_overlap_history();
    solver
        .solve_with(&mut results, "needle", "haystack", &options)
        .unwrap();
    assert_eq!(results.len(), 6);
}

#[test]
fn shared_nodes_escape_overlap_accounting() {
    setup_test_logging();
    // Two sources shorted onto the input of one shared sink node.
    let mut hb = GraphBuilder::new();
    for k in 0..2 {
        let src = format!("src_{k}");
        hb.create_node(&src, "t1").unwrap();
        hb.create_port(&src, "Y", 1).unwrap();
    }
    hb.create_node_full("sink", "t2", None, true).unwrap();
    hb.create_port("sink", "A", 1).unwrap();
    hb.create_connection("src_0", "Y", "sink", "A").unwrap();
    hb.create_connection("src_1", "Y", "sink", "A").unwrap();
    let haystack = hb.freeze();

    let mut nb = GraphBuilder::new();
    nb.create_node("a", "t1").unwrap();
    nb.create_port("a", "Y", 1).unwrap();
    nb.create_node("b", "t2").unwrap();
    nb.create_port("b", "A", 1).unwrap();
    nb.create_connection("a", "Y", "b", "A").unwrap();
    nb.mark_extern("a", "Y").unwrap();
    let needle = nb.freeze();

    let mut solver = Solver::new();
    solver.add_graph("needle", needle).unwrap();
    solver.add_graph("haystack", haystack).unwrap();

    let options = SolveOptions {
        allow_overlap: false,
        ..SolveOptions::default()
    };
    let mut results = Vec::new();
    solver
        .solve_with(&mut results, "needle", "haystack", &options)
        .unwrap();
    // The shared sink may appear in both embeddings.
    assert_eq!(results.len(), 2);
    let consumed = solver.overlap_history("haystack").unwrap();
    assert_eq!(consumed.len(), 2);
}

#[test]
fn constant_compatibility_gates_matches() {
    setup_test_logging();
    fn const_node(value: char) -> Graph {
        let mut b = GraphBuilder::new();
        b.create_node("n", "cfg").unwrap();
        b.create_port("n", "V", 1).unwrap();
        b.create_constant_bit("n", "V", 0, value).unwrap();
        b.freeze()
    }

    let mut solver = Solver::new();
    solver.add_graph("needle", const_node('x')).unwrap();
    solver.add_graph("haystack", const_node('0')).unwrap();

    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert!(results.is_empty());

    solver.add_compatible_constants('x', '0');
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn needle_constant_requires_haystack_constant() {
    setup_test_logging();
    let mut nb = GraphBuilder::new();
    nb.create_node("n", "cfg").unwrap();
    nb.create_port("n", "V", 1).unwrap();
    nb.create_constant_bit("n", "V", 0, '1').unwrap();

    let mut hb = GraphBuilder::new();
    hb.create_node("n", "cfg").unwrap();
    hb.create_port("n", "V", 1).unwrap();

    let mut solver = Solver::new();
    solver.add_graph("needle", nb.freeze()).unwrap();
    solver.add_graph("haystack", hb.freeze()).unwrap();
    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert!(results.is_empty());

    // The reverse direction is unconstrained.
    let mut results = Vec::new();
    solver.solve(&mut results, "haystack", "needle").unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn max_solutions_caps_each_call() {
    setup_test_logging();
    let mut nb = GraphBuilder::new();
    nb.create_node("n", "t").unwrap();
    let mut hb = GraphBuilder::new();
    for k in 0..100 {
        hb.create_node(&format!("n_{k}"), "t").unwrap();
    }

    let mut solver = Solver::new();
    solver.add_graph("needle", nb.freeze()).unwrap();
    solver.add_graph("haystack", hb.freeze()).unwrap();

    let mut results = Vec::new();
    let options = SolveOptions {
        max_solutions: Some(5),
        ..SolveOptions::default()
    };
    solver
        .solve_with(&mut results, "needle", "haystack", &options)
        .unwrap();
    assert_eq!(results.len(), 5);

    let mut all = Vec::new();
    solver.solve(&mut all, "needle", "haystack").unwrap();
    assert_eq!(all.len(), 100);

    let mut none = Vec::new();
    let zero = SolveOptions {
        max_solutions: Some(0),
        ..SolveOptions::default()
    };
    solver
        .solve_with(&mut none, "needle", "haystack", &zero)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn initial_mappings_restrict_candidates() {
    setup_test_logging();
    let mut solver = macc_solver();
    let options = SolveOptions {
        initial_mappings: vec![("add_1".to_owned(), vec!["add_2".to_owned()])],
        ..SolveOptions::default()
    };
    let mut results = Vec::new();
    solver
        .solve_with(&mut results, "macc22", "macc4x2", &options)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].haystack_node_of("add_1"), Some("add_2"));

    // Restricting to a name the haystack does not have empties the domain.
    let options = SolveOptions {
        initial_mappings: vec![("add_1".to_owned(), vec!["nope".to_owned()])],
        ..SolveOptions::default()
    };
    results.clear();
    solver
        .solve_with(&mut results, "macc22", "macc4x2", &options)
        .unwrap();
    assert!(results.is_empty());
}

#[test]
fn shorted_needle_inputs_match_shorted_haystack() {
    setup_test_logging();
    fn pair_node(shorted: bool) -> Graph {
        let mut b = GraphBuilder::new();
        b.create_node("n", "t").unwrap();
        b.create_port("n", "A", 1).unwrap();
        b.create_port("n", "B", 1).unwrap();
        if shorted {
            b.create_connection("n", "A", "n", "B").unwrap();
        }
        b.freeze()
    }

    let mut solver = Solver::new();
    solver.add_graph("needle", pair_node(true)).unwrap();
    solver.add_graph("shorted", pair_node(true)).unwrap();
    solver.add_graph("split", pair_node(false)).unwrap();

    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "shorted").unwrap();
    assert_eq!(results.len(), 1);

    results.clear();
    solver.solve(&mut results, "needle", "split").unwrap();
    assert!(results.is_empty());
}

#[test]
fn user_hooks_prune_and_annotate() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    setup_test_logging();

    struct Hooks {
        edges: Arc<AtomicUsize>,
    }
    impl SolverHooks for Hooks {
        fn compare_nodes(
            &self,
            _needle: &Graph,
            _needle_node: usize,
            haystack: &Graph,
            haystack_node: usize,
        ) -> bool {
            !haystack.node_name(haystack_node).ends_with("_2")
        }

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
            self.edges.fetch_add(1, Ordering::Relaxed);
        }
    }

    let mut solver = Solver::new();
    solver
        .add_graph("needle", chain2(("a", "t1"), ("b", "t2")))
        .unwrap();
    solver.add_graph("haystack", chain2_copies(3)).unwrap();

    let edges = Arc::new(AtomicUsize::new(0));
    solver.set_hooks(Box::new(Hooks {
        edges: edges.clone(),
    }));

    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    // The third copy is pruned by compare_nodes.
    assert_eq!(results.len(), 2);
    // One connection, annotated from both endpoints, per match.
    assert_eq!(edges.load(Ordering::Relaxed), 4);

    struct VetoAll;
    impl SolverHooks for VetoAll {
        fn check_solution(&self, _found: &Match, _needle: &Graph, _haystack: &Graph) -> bool {
            false
        }
    }
    solver.set_hooks(Box::new(VetoAll));
    results.clear();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert!(results.is_empty());
}

#[test]
fn compatible_types_are_directional() {
    setup_test_logging();
    fn single(ty: &str) -> Graph {
        let mut b = GraphBuilder::new();
        b.create_node("n", ty).unwrap();
        b.freeze()
    }

    let mut solver = Solver::new();
    solver.add_graph("needle", single("add")).unwrap();
    solver.add_graph("haystack", single("addc")).unwrap();

    let mut results = Vec::new();
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert!(results.is_empty());

    solver.add_compatible_types("add", "addc");
    solver.solve(&mut results, "needle", "haystack").unwrap();
    assert_eq!(results.len(), 1);

    // Declared direction does not imply the reverse.
    results.clear();
    solver.solve(&mut results, "haystack", "needle").unwrap();
    assert!(results.is_empty());
}
