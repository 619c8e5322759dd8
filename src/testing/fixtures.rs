//! Pre-built operator graphs for common planning scenarios.

use super::builders::ChainBuilder;
use crate::graph::FlowGraph;
use crate::node::{Boundary, DataType, NodeKind, NodeSpec, OperatorKind, Scope, ShuffleKey};
use anyhow::{Result, bail};

/// One global input wired straight to one global output.
///
/// # Example
///
/// ```
/// use ironstage::testing::trivial;
///
/// let graph = trivial()?;
/// assert_eq!(graph.node_count(), 2);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn trivial() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("Record");
    let input = graph.add_input("in", t.clone());
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, output, 0)?;
    Ok(graph)
}

/// `in -> parse -> clean -> out` with no boundaries in between.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn linear_map() -> Result<FlowGraph> {
    ChainBuilder::new("in", DataType::new("Line"))
        .map("parse", DataType::new("Record"))?
        .then(
            NodeSpec::operator("clean", OperatorKind::Filter)
                .input("in", DataType::new("Record"))
                .output("out", DataType::new("Record")),
        )?
        .build("out")
}

/// The classic: split lines into words, then count per word.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn word_count() -> Result<FlowGraph> {
    ChainBuilder::new("lines", DataType::new("Line"))
        .map("split", DataType::new("Word"))?
        .group("count", ["word"], DataType::new("WordCount"))?
        .build("counts")
}

/// Two folds in a row, so the plan needs two shuffle stages.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn two_shuffles() -> Result<FlowGraph> {
    ChainBuilder::new("lines", DataType::new("Line"))
        .map("split", DataType::new("Word"))?
        .group("count", ["word"], DataType::new("WordCount"))?
        .map("bucket", DataType::new("Bucket"))?
        .group("histogram", ["count"], DataType::new("Histogram"))?
        .build("histogram")
}

/// Orders joined with customers on a shared key.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn join() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let customer = DataType::new("Customer");
    let order = DataType::new("Order");
    let joined = DataType::new("CustomerOrder");
    let customers = graph.add_input("customers", customer.clone());
    let orders = graph.add_input("orders", order.clone());
    let join = graph.add_node(
        NodeSpec::operator("join", OperatorKind::MasterJoin)
            .boundary(Boundary::Shuffle)
            .shuffled_input("master", customer, ShuffleKey::group_by(["customer_id"]))
            .shuffled_input(
                "tx",
                order,
                ShuffleKey::group_by(["customer_id"]).order_by("ordered_at"),
            )
            .output("joined", joined.clone())
            .output("missed", DataType::new("Order")),
    )?;
    let out = graph.add_output("joined", joined);
    graph.connect_nodes(customers, 0, join, 0)?;
    graph.connect_nodes(orders, 0, join, 1)?;
    graph.connect_nodes(join, 0, out, 0)?;
    Ok(graph)
}

/// `a` and `b` feed each other; planning must fail.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn cycle() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("Record");
    let input = graph.add_input("in", t.clone());
    let a = graph.add_node(
        NodeSpec::operator("a", OperatorKind::Confluent)
            .input("first", t.clone())
            .input("loop", t.clone())
            .output("out", t.clone()),
    )?;
    let b = graph.add_node(
        NodeSpec::operator("b", OperatorKind::Map)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, a, 0)?;
    graph.connect_nodes(a, 0, b, 0)?;
    graph.connect_nodes(b, 0, a, 1)?;
    graph.connect_nodes(b, 0, output, 0)?;
    Ok(graph)
}

/// One shared `normalize` step feeding two independent folds.
///
/// Both folds end up at the same critical-path distance, so with
/// compression enabled their stages merge and the shared step is planned
/// once.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn diamond_with_shared_branch() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("Event");
    let input = graph.add_input("events", t.clone());
    let normalize = graph.add_node(
        NodeSpec::operator("normalize", OperatorKind::Map)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    let tail = |graph: &mut FlowGraph, name: &str, key: &str| -> Result<()> {
        let total = DataType::new("Total");
        let fold = graph.add_node(
            NodeSpec::operator(name, OperatorKind::Fold)
                .boundary(Boundary::Shuffle)
                .shuffled_input("in", t.clone(), ShuffleKey::group_by([key]))
                .output("out", total.clone()),
        )?;
        let output = graph.add_output(format!("{name}-out"), total);
        graph.connect_nodes(normalize, 0, fold, 0)?;
        graph.connect_nodes(fold, 0, output, 0)?;
        Ok(())
    };
    tail(&mut graph, "by_user", "user")?;
    tail(&mut graph, "by_page", "page")?;
    graph.connect_nodes(input, 0, normalize, 0)?;
    Ok(graph)
}

/// A flow part wrapping a single map: `in -> part{ x -> enrich -> y } -> out`.
///
/// # Errors
///
/// Never fails in practice; builder errors are propagated.
pub fn nested_flow_part() -> Result<FlowGraph> {
    let mut graph = FlowGraph::new();
    let t = DataType::new("Record");
    let input = graph.add_input("in", t.clone());
    let part = graph.add_flow_part(
        NodeSpec::new("part", NodeKind::FlowPart(Scope::default()))
            .input("x", t.clone())
            .output("y", t.clone()),
    )?;
    let NodeKind::FlowPart(scope) = graph.node(part).kind().clone() else {
        bail!("node {part} is not a flow part");
    };
    let enrich = graph.add_node(
        NodeSpec::operator("enrich", OperatorKind::Map)
            .input("in", t.clone())
            .output("out", t.clone()),
    )?;
    graph.connect_nodes(scope.inputs[0], 0, enrich, 0)?;
    graph.connect_nodes(enrich, 0, scope.outputs[0], 0)?;
    let output = graph.add_output("out", t);
    graph.connect_nodes(input, 0, part, 0)?;
    graph.connect_nodes(part, 0, output, 0)?;
    Ok(graph)
}
