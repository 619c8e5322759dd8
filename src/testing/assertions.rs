//! Assertion functions for checking planner output.
//!
//! Each helper checks one structural property that every valid plan or
//! normalized graph must have, and panics with the offending elements.

use crate::graph::FlowGraph;
use crate::node::NodeKind;
use crate::ops;
use crate::stage::StageGraph;
use std::collections::{BTreeMap, BTreeSet};

/// Assert that every link crossing stages goes from a lower-numbered stage
/// to a higher-numbered one.
///
/// Links touching the global input or output block are ignored.
///
/// # Panics
///
/// Panics on the first link that points backwards or stays within the
/// same number across two different stages.
///
/// # Example
///
/// ```
/// use ironstage::build_plan;
/// use ironstage::testing::{assert_topological_stage_order, word_count};
///
/// let plan = build_plan(&word_count()?)?;
/// assert_topological_stage_order(&plan);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn assert_topological_stage_order(plan: &StageGraph) {
    let wiring = plan.wiring();
    for (upstream, downstream) in wiring.links() {
        let from = wiring.output(upstream).block();
        let to = wiring.input(downstream).block();
        let (Some(a), Some(b)) = (plan.stage_of(from), plan.stage_of(to)) else {
            continue;
        };
        if std::ptr::eq(a, b) {
            continue;
        }
        assert!(
            a.number() < b.number(),
            "link {upstream} -> {downstream} goes from stage {} to stage {}",
            a.number(),
            b.number()
        );
    }
}

/// Assert that no node belongs to more than one block.
///
/// # Panics
///
/// Panics if two blocks share a node.
pub fn assert_blocks_disjoint(plan: &StageGraph) {
    let mut owners = BTreeMap::new();
    for block in plan.blocks() {
        for node in block.nodes() {
            if let Some(previous) = owners.insert(*node, block.id()) {
                panic!(
                    "node {node} is in both {previous} and {}",
                    block.id()
                );
            }
        }
    }
}

/// Assert that reduce blocks are fed only through shuffle boundaries and
/// that every stage keeps them apart from its map blocks.
///
/// # Panics
///
/// Panics if a reduce block has a non-shuffle input or a map block turns
/// out to be a reduce block.
pub fn assert_reduce_purity(plan: &StageGraph) {
    let graph = plan.graph();
    let wiring = plan.wiring();
    for stage in plan.stages() {
        for block in stage.reduce_blocks() {
            for input in block.inputs() {
                let owner = graph.input(wiring.input(*input).port()).owner();
                assert!(
                    ops::is_shuffle_boundary(graph, owner),
                    "reduce block {} is fed through `{}`, which does not shuffle",
                    block.id(),
                    graph.node(owner).name()
                );
            }
        }
        for block in stage.map_blocks() {
            assert!(
                !block.is_reduce_block(graph, wiring),
                "stage {} lists reduce block {} among its map blocks",
                stage.number(),
                block.id()
            );
        }
    }
}

/// Assert that no shuffle boundary feeds another shuffle boundary directly.
///
/// # Panics
///
/// Panics with the names of the first offending pair.
pub fn assert_no_shuffle_to_shuffle(graph: &FlowGraph) {
    for node in ops::collect_nodes(graph, graph.scope()) {
        if !ops::is_shuffle_boundary(graph, node) {
            continue;
        }
        for next in ops::successors(graph, node) {
            assert!(
                !ops::is_shuffle_boundary(graph, next),
                "shuffle `{}` feeds shuffle `{}` directly",
                graph.node(node).name(),
                graph.node(next).name()
            );
        }
    }
}

/// Assert that every identity has exactly one upstream and one downstream
/// connection.
///
/// # Panics
///
/// Panics on the first identity that fans in or out.
pub fn assert_identity_fan_is_one_to_one(graph: &FlowGraph) {
    for node in ops::collect_nodes(graph, graph.scope()) {
        if !ops::is_identity(graph, node) {
            continue;
        }
        let fan_in = graph.input(graph.first_input(node)).connected().len();
        let fan_out = graph.output(graph.first_output(node)).connected().len();
        assert!(
            fan_in == 1 && fan_out == 1,
            "identity {node} has {fan_in} upstream and {fan_out} downstream connection(s)"
        );
    }
}

/// Assert that every operator of `source`'s root scope is planned into at
/// least one block, matched by name.
///
/// # Panics
///
/// Panics with the names of the operators that went missing.
pub fn assert_operators_planned(source: &FlowGraph, plan: &StageGraph) {
    let planned: BTreeSet<&str> = plan
        .blocks()
        .flat_map(|b| b.nodes().iter())
        .map(|n| plan.graph().node(*n).name())
        .collect();
    let missing: Vec<&str> = ops::collect_nodes(source, source.scope())
        .into_iter()
        .map(|n| source.node(n))
        .filter(|n| matches!(n.kind(), NodeKind::Operator(_)))
        .map(|n| n.name())
        .filter(|name| !planned.contains(name))
        .collect();
    assert!(missing.is_empty(), "operators missing from the plan: {missing:?}");
}
