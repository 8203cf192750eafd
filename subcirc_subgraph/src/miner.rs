//! Frequent subcircuit mining.
//!
//! Candidates are connected induced subgraphs grown by BFS from every node
//! of every registered graph, one candidate per prefix size within the
//! requested bounds. Candidates are deduplicated by a canonical key and
//! counted by running the matcher against each registered graph.

use ahash::{AHashMap, AHashSet};
use subcirc_common::SolverConfig;

use crate::builder::GraphBuilder;
use crate::graph::Graph;
use crate::matcher::{MatchRequest, MatcherCore};
use crate::matches::MineResult;
use crate::solver::{MineOptions, SolverHooks};

pub(crate) fn mine(
    graphs: &[(&str, &Graph)],
    config: &SolverConfig,
    hooks: &dyn SolverHooks,
    results: &mut Vec<MineResult>,
    options: &MineOptions,
) -> usize {
    if options.min_nodes < 1 || options.max_nodes < options.min_nodes {
        return 0;
    }

    let mut candidates: Vec<Graph> = Vec::new();
    let mut seen_keys: AHashSet<String> = AHashSet::new();
    for (_, graph) in graphs {
        for seed in 0..graph.node_count() {
            let order = bfs_order(graph, seed, options.max_nodes);
            for size in options.min_nodes..=options.max_nodes {
                if size > order.len() {
                    break;
                }
                let candidate = induced_subgraph(graph, &order[..size]);
                if seen_keys.insert(canonical_key(&candidate)) {
                    candidates.push(candidate);
                }
            }
        }
    }
    tracing::debug!(candidates = candidates.len(), "mining candidates enumerated");

    let mut appended = 0;
    for candidate in candidates {
        let mut per_graph = Vec::with_capacity(graphs.len());
        let mut total = 0;
        for (name, graph) in graphs {
            let count = count_matches(&candidate, graph, name, config, hooks, options.per_graph_cap);
            total += count;
            per_graph.push(((*name).to_owned(), count));
        }
        if total >= options.min_matches {
            results.push(MineResult {
                candidate,
                total_matches: total,
                per_graph,
            });
            appended += 1;
        }
    }
    appended
}

/// BFS visit order from `seed`, capped at `max` nodes; neighbors are taken
/// in ascending index order so enumeration is deterministic.
fn bfs_order(graph: &Graph, seed: usize, max: usize) -> Vec<usize> {
    let mut order = vec![seed];
    let mut visited: AHashSet<usize> = AHashSet::from_iter([seed]);
    let mut cursor = 0;
    while cursor < order.len() && order.len() < max {
        let current = order[cursor];
        for neighbor in graph.neighbors(current) {
            if order.len() >= max {
                break;
            }
            if visited.insert(neighbor) {
                order.push(neighbor);
            }
        }
        cursor += 1;
    }
    order
}

/// Copies the induced subgraph over `nodes` into a fresh needle-shaped
/// graph. Signals that escape the candidate, and signals extern in the
/// source, are marked extern; constants are carried over.
fn induced_subgraph(graph: &Graph, nodes: &[usize]) -> Graph {
    let in_set: AHashSet<usize> = nodes.iter().copied().collect();
    let mut builder = GraphBuilder::new();
    for &n in nodes {
        builder
            .create_node_full(
                graph.node_name(n),
                graph.node_type(n),
                graph.nodes[n].user_data.clone(),
                graph.node_shared(n),
            )
            .unwrap();
        for p in 0..graph.port_count(n) {
            builder
                .create_port_min(
                    graph.node_name(n),
                    graph.port_name(n, p),
                    graph.port_width(n, p),
                    graph.port_min_width(n, p),
                )
                .unwrap();
        }
    }
    for s in 0..graph.signal_count() {
        let inside: Vec<_> = graph
            .signal_bits(s)
            .iter()
            .filter(|bit| in_set.contains(&bit.node))
            .collect();
        let Some(first) = inside.first() else {
            continue;
        };
        let first_node = graph.node_name(first.node);
        let first_port = graph.port_name(first.node, first.port);
        for other in &inside[1..] {
            builder
                .create_connection_range(
                    first_node,
                    first_port,
                    first.bit,
                    graph.node_name(other.node),
                    graph.port_name(other.node, other.port),
                    other.bit,
                    1,
                )
                .unwrap();
        }
        if let Some(value) = graph.signal_constant(s) {
            builder
                .create_constant_bit(first_node, first_port, first.bit, value)
                .unwrap();
        }
        let escapes = inside.len() != graph.signal_bits(s).len();
        if escapes || graph.signal_extern(s) {
            builder
                .mark_extern_bit(first_node, first_port, first.bit)
                .unwrap();
        }
    }
    builder.freeze()
}

fn count_matches(
    candidate: &Graph,
    haystack: &Graph,
    haystack_name: &str,
    config: &SolverConfig,
    hooks: &dyn SolverHooks,
    cap: Option<usize>,
) -> usize {
    let mut consumed = AHashSet::new();
    let request = MatchRequest {
        needle: candidate,
        haystack,
        needle_name: "mined",
        haystack_name,
        config,
        hooks,
        allow_overlap: true,
        max_solutions: cap,
        initial_mappings: AHashMap::new(),
    };
    let mut scratch = Vec::new();
    MatcherCore::new(request, &mut consumed).run(&mut scratch)
}

/// Canonical key for candidate deduplication: one round of neighborhood
/// label aggregation over (type, port multiset) labels, then a canonical
/// traversal from every minimally-labeled start, keeping the smallest
/// encoding. Shorted pins can make structurally equal candidates encode
/// differently; that imprecision is accepted and candidates are then
/// reported more than once.
fn canonical_key(graph: &Graph) -> String {
    let n = graph.node_count();
    let base: Vec<String> = (0..n)
        .map(|i| {
            let mut ports: Vec<String> = (0..graph.port_count(i))
                .map(|p| {
                    format!(
                        "{}:{}:{}",
                        graph.port_name(i, p),
                        graph.port_width(i, p),
                        graph.port_min_width(i, p)
                    )
                })
                .collect();
            ports.sort();
            format!("{}({})", graph.node_type(i), ports.join(","))
        })
        .collect();

    let labels: Vec<String> = (0..n)
        .map(|i| {
            let mut env: Vec<String> = graph
                .neighbors(i)
                .into_iter()
                .map(|i2| format!("{}>{}", bundle_sig(graph, i, i2), base[i2]))
                .collect();
            env.sort();
            format!("{}|{}", base[i], env.join(";"))
        })
        .collect();

    let min_label = labels.iter().min().cloned().unwrap_or_default();
    (0..n)
        .filter(|i| labels[*i] == min_label)
        .map(|start| encode_from(graph, &labels, start))
        .min()
        .unwrap_or_default()
}

/// Deterministic traversal encoding with nodes renumbered in visit order.
fn encode_from(graph: &Graph, labels: &[String], start: usize) -> String {
    let mut order = vec![start];
    let mut rank: AHashMap<usize, usize> = AHashMap::from_iter([(start, 0)]);
    let mut cursor = 0;
    while cursor < order.len() {
        let current = order[cursor];
        let mut next: Vec<usize> = graph
            .neighbors(current)
            .into_iter()
            .filter(|n| !rank.contains_key(n))
            .collect();
        next.sort_by(|a, b| {
            (bundle_sig(graph, current, *a), &labels[*a])
                .cmp(&(bundle_sig(graph, current, *b), &labels[*b]))
        });
        for n in next {
            rank.insert(n, order.len());
            order.push(n);
        }
        cursor += 1;
    }

    let mut out = String::new();
    for (pos, &node) in order.iter().enumerate() {
        out.push_str(&format!("[{pos}={}]", labels[node]));
        let mut edges: Vec<String> = graph
            .neighbors(node)
            .into_iter()
            .filter(|n| rank.get(n).is_some_and(|r| *r <= pos))
            .map(|n| format!("{}~{}", rank[&n], bundle_sig(graph, node, n)))
            .collect();
        edges.sort();
        out.push_str(&edges.join(","));
    }
    out
}

/// Order-independent description of the bundle between two nodes.
fn bundle_sig(graph: &Graph, a: usize, b: usize) -> String {
    let Some(bundle) = graph.bundle(a, b) else {
        return String::new();
    };
    let mut pairs: Vec<String> = bundle
        .iter()
        .map(|pair| {
            format!(
                "{}.{}-{}.{}",
                graph.port_name(a, pair.my_port),
                pair.my_bit,
                graph.port_name(b, pair.their_port),
                pair.their_bit
            )
        })
        .collect();
    pairs.sort();
    pairs.join("+")
}
