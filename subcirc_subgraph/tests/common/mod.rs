//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::sync::Once;

use subcirc_subgraph::{Graph, GraphBuilder};

static INIT: Once = Once::new();

/// Routes tracing output through the test harness capture.
pub fn setup_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

const W: usize = 4;

fn three_port_node(b: &mut GraphBuilder, name: &str, ty: &str) {
    b.create_node(name, ty).unwrap();
    b.create_port(name, "A", W).unwrap();
    b.create_port(name, "B", W).unwrap();
    b.create_port(name, "Y", W).unwrap();
}

/// Two multipliers feeding an adder; multiplier inputs and the sum output
/// are extern, the product wires are internal.
pub fn macc22_needle() -> Graph {
    let mut b = GraphBuilder::new();
    three_port_node(&mut b, "mul_a", "mul");
    three_port_node(&mut b, "mul_b", "mul");
    three_port_node(&mut b, "add_1", "add");
    b.create_connection("mul_a", "Y", "add_1", "A").unwrap();
    b.create_connection("mul_b", "Y", "add_1", "B").unwrap();
    for mul in ["mul_a", "mul_b"] {
        b.mark_extern(mul, "A").unwrap();
        b.mark_extern(mul, "B").unwrap();
    }
    b.mark_extern("add_1", "Y").unwrap();
    b.freeze()
}

/// Four multipliers reduced by a two-level adder tree.
pub fn macc4x2_haystack() -> Graph {
    let mut b = GraphBuilder::new();
    for mul in ["mul_1", "mul_2", "mul_3", "mul_4"] {
        three_port_node(&mut b, mul, "mul");
        b.mark_extern(mul, "A").unwrap();
        b.mark_extern(mul, "B").unwrap();
    }
    for add in ["add_1", "add_2", "add_3"] {
        three_port_node(&mut b, add, "add");
    }
    b.create_connection("mul_1", "Y", "add_1", "A").unwrap();
    b.create_connection("mul_2", "Y", "add_1", "B").unwrap();
    b.create_connection("mul_3", "Y", "add_2", "A").unwrap();
    b.create_connection("mul_4", "Y", "add_2", "B").unwrap();
    b.create_connection("add_1", "Y", "add_3", "A").unwrap();
    b.create_connection("add_2", "Y", "add_3", "B").unwrap();
    b.mark_extern("add_3", "Y").unwrap();
    b.freeze()
}

/// A multiplier and a subtractor feeding an adder; the distinguishable
/// operand types pin down which adder input each feeder must reach.
pub fn macc22_mixed_needle() -> Graph {
    let mut b = GraphBuilder::new();
    three_port_node(&mut b, "mul_a", "mul");
    three_port_node(&mut b, "sub_b", "sub");
    three_port_node(&mut b, "add_1", "add");
    b.create_connection("mul_a", "Y", "add_1", "A").unwrap();
    b.create_connection("sub_b", "Y", "add_1", "B").unwrap();
    for feeder in ["mul_a", "sub_b"] {
        b.mark_extern(feeder, "A").unwrap();
        b.mark_extern(feeder, "B").unwrap();
    }
    b.mark_extern("add_1", "Y").unwrap();
    b.freeze()
}

/// Two mul/sub pairs feeding two adders; the second adder is wired with
/// the operands crossed, so embedding the mixed needle there requires the
/// adder's inputs to commute.
pub fn macc4x2_crossed_haystack() -> Graph {
    let mut b = GraphBuilder::new();
    for (name, ty) in [
        ("mul_1", "mul"),
        ("sub_1", "sub"),
        ("mul_2", "mul"),
        ("sub_2", "sub"),
    ] {
        three_port_node(&mut b, name, ty);
        b.mark_extern(name, "A").unwrap();
        b.mark_extern(name, "B").unwrap();
    }
    three_port_node(&mut b, "add_1", "add");
    three_port_node(&mut b, "add_2", "add");
    b.create_connection("mul_1", "Y", "add_1", "A").unwrap();
    b.create_connection("sub_1", "Y", "add_1", "B").unwrap();
    b.create_connection("sub_2", "Y", "add_2", "A").unwrap();
    b.create_connection("mul_2", "Y", "add_2", "B").unwrap();
    b.mark_extern("add_1", "Y").unwrap();
    b.mark_extern("add_2", "Y").unwrap();
    b.freeze()
}

/// A two-node chain `first.Y -> second.A` over 1-bit ports.
pub fn chain2(first: (&str, &str), second: (&str, &str)) -> Graph {
    let mut b = GraphBuilder::new();
    b.create_node(first.0, first.1).unwrap();
    b.create_port(first.0, "Y", 1).unwrap();
    b.create_node(second.0, second.1).unwrap();
    b.create_port(second.0, "A", 1).unwrap();
    b.create_connection(first.0, "Y", second.0, "A").unwrap();
    b.freeze()
}

/// `copies` disjoint two-node chains `src_K.Y -> dst_K.A`.
pub fn chain2_copies(copies: usize) -> Graph {
    let mut b = GraphBuilder::new();
    for k in 0..copies {
        let src = format!("src_{k}");
        let dst = format!("dst_{k}");
        b.create_node(&src, "t1").unwrap();
        b.create_port(&src, "Y", 1).unwrap();
        b.create_node(&dst, "t2").unwrap();
        b.create_port(&dst, "A", 1).unwrap();
        b.create_connection(&src, "Y", &dst, "A").unwrap();
    }
    b.freeze()
}
