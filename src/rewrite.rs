//! Structural rewrite primitives over a [`FlowGraph`].
//!
//! These are the only operations, besides the builder API, that create or
//! remove nodes of a scope. Each keeps the data types on both ends of every
//! connection it creates equal to the ones it replaces.

use crate::graph::FlowGraph;
use crate::node::{Boundary, NodeKind, PseudoKind};
use crate::node_id::{InputId, NodeId, OutputId};
use crate::ops;

/// Splice a new pseudo node between `output` and the given subset of its
/// downstream inputs.
fn insert_pseudo(
    graph: &mut FlowGraph,
    output: OutputId,
    downstreams: Vec<InputId>,
    kind: PseudoKind,
    boundary: Boundary,
) -> NodeId {
    let port = graph.output(output);
    let name = format!("{}-{}", graph.node(port.owner()).name(), port.name());
    let data_type = port.data_type().clone();

    let pseudo = graph.create_pseudo(name, kind, boundary, data_type);
    let (pin, pout) = (graph.first_input(pseudo), graph.first_output(pseudo));
    for downstream in downstreams {
        graph.unlink(output, downstream);
        graph.link(pout, downstream);
    }
    graph.link(output, pin);
    pseudo
}

fn all_downstreams(graph: &FlowGraph, output: OutputId) -> Vec<InputId> {
    graph.output(output).connected().iter().copied().collect()
}

/// Insert a checkpoint (stage-boundary pass-through) after `output`.
pub fn insert_checkpoint(graph: &mut FlowGraph, output: OutputId) -> NodeId {
    let downstreams = all_downstreams(graph, output);
    insert_pseudo(graph, output, downstreams, PseudoKind::Checkpoint, Boundary::Stage)
}

/// Insert a plain identity after `output`.
pub fn insert_identity(graph: &mut FlowGraph, output: OutputId) -> NodeId {
    let downstreams = all_downstreams(graph, output);
    insert_pseudo(graph, output, downstreams, PseudoKind::Identity, Boundary::None)
}

/// Insert a plain identity on the single connection `output -> input`.
///
/// # Panics
///
/// Panics if the two ports are not connected.
pub fn insert_identity_between(graph: &mut FlowGraph, output: OutputId, input: InputId) -> NodeId {
    assert!(
        graph.output(output).connected().contains(&input),
        "{output} is not connected to {input}"
    );
    insert_pseudo(graph, output, vec![input], PseudoKind::Identity, Boundary::None)
}

/// Terminate `output` with an implicit sink.
pub fn stop(graph: &mut FlowGraph, output: OutputId) -> NodeId {
    let port = graph.output(output);
    let name = format!("{}-{}-sink", graph.node(port.owner()).name(), port.name());
    let data_type = port.data_type().clone();
    let sink = graph.create_pseudo(name, PseudoKind::ImplicitSink, Boundary::None, data_type);
    let input = graph.first_input(sink);
    graph.link(output, input);
    sink
}

/// Replace an identity with fan-in or fan-out above one by one identity per
/// (upstream, downstream) pair. Returns the replacements; an identity that
/// is already one-to-one is left alone and nothing is returned.
///
/// # Panics
///
/// Panics if `node` is not an identity.
pub fn split_identity(graph: &mut FlowGraph, node: NodeId) -> Vec<NodeId> {
    assert!(ops::is_identity(graph, node), "{node} is not an identity");
    let (input, output) = (graph.first_input(node), graph.first_output(node));
    let upstreams: Vec<_> = graph.input(input).connected().iter().copied().collect();
    let downstreams: Vec<_> = graph.output(output).connected().iter().copied().collect();
    if upstreams.len() <= 1 && downstreams.len() <= 1 {
        return Vec::new();
    }

    let name = graph.node(node).name().to_string();
    let data_type = graph.input(input).data_type().clone();
    let observation = graph.node(node).observation();
    let mut copies = Vec::with_capacity(upstreams.len() * downstreams.len());
    for &upstream in &upstreams {
        for &downstream in &downstreams {
            let copy = graph.create_pseudo(
                name.clone(),
                PseudoKind::Identity,
                Boundary::None,
                data_type.clone(),
            );
            graph.set_observation(copy, observation);
            let (cin, cout) = (graph.first_input(copy), graph.first_output(copy));
            graph.link(upstream, cin);
            graph.link(cout, downstream);
            copies.push(copy);
        }
    }
    graph.remove_node(node);
    copies
}

/// Remove `node`, connecting every upstream output directly to every
/// downstream input.
pub fn skip(graph: &mut FlowGraph, node: NodeId) {
    let n = graph.node(node);
    let upstreams: Vec<_> = n
        .inputs()
        .iter()
        .flat_map(|p| graph.input(*p).connected().iter().copied())
        .collect();
    let downstreams: Vec<_> = n
        .outputs()
        .iter()
        .flat_map(|p| graph.output(*p).connected().iter().copied())
        .collect();
    graph.remove_node(node);
    for &upstream in &upstreams {
        for &downstream in &downstreams {
            graph.link(upstream, downstream);
        }
    }
}

/// Splice a flow part's nested scope into the surrounding graph and discard
/// the flow-part node.
///
/// Every seam (outer port / inner endpoint pair) becomes a pass-through
/// node. With `seam` set to [`Boundary::Stage`] the seams are kept as
/// checkpoints so the inlined part stays in stages of its own; with
/// [`Boundary::None`] they are skipped and the part is fused with its
/// surroundings. Returns the seam nodes that were kept.
///
/// # Panics
///
/// Panics if `node` is not a flow part, or if `seam` is a shuffle boundary.
pub fn inline_flow_part(graph: &mut FlowGraph, node: NodeId, seam: Boundary) -> Vec<NodeId> {
    assert_ne!(seam, Boundary::Shuffle, "flow part seams cannot shuffle");
    let NodeKind::FlowPart(scope) = graph.node(node).kind().clone() else {
        panic!("{node} is not a flow part");
    };
    let kind = match seam {
        Boundary::Stage => PseudoKind::Checkpoint,
        _ => PseudoKind::Identity,
    };
    let outer = graph.node(node).clone();

    let mut seams = Vec::new();
    for (outer_port, inner) in outer.inputs().iter().zip(&scope.inputs) {
        let port = graph.input(*outer_port);
        let name = format!("{}.{}", outer.name(), port.name());
        let data_type = port.data_type().clone();
        let upstreams: Vec<_> = port.connected().iter().copied().collect();
        let pseudo = graph.create_pseudo(name, kind, seam, data_type);
        let inner_out = graph.first_output(*inner);
        let downstreams: Vec<_> = graph.output(inner_out).connected().iter().copied().collect();

        let (pin, pout) = (graph.first_input(pseudo), graph.first_output(pseudo));
        for upstream in upstreams {
            graph.link(upstream, pin);
        }
        for downstream in downstreams {
            graph.link(pout, downstream);
        }
        graph.remove_node(*inner);
        seams.push(pseudo);
    }
    for (outer_port, inner) in outer.outputs().iter().zip(&scope.outputs) {
        let port = graph.output(*outer_port);
        let name = format!("{}.{}", outer.name(), port.name());
        let data_type = port.data_type().clone();
        let downstreams: Vec<_> = port.connected().iter().copied().collect();
        let pseudo = graph.create_pseudo(name, kind, seam, data_type);
        let inner_in = graph.first_input(*inner);
        let upstreams: Vec<_> = graph.input(inner_in).connected().iter().copied().collect();

        let (pin, pout) = (graph.first_input(pseudo), graph.first_output(pseudo));
        for upstream in upstreams {
            graph.link(upstream, pin);
        }
        for downstream in downstreams {
            graph.link(pout, downstream);
        }
        graph.remove_node(*inner);
        seams.push(pseudo);
    }
    graph.remove_node(node);

    if seam == Boundary::None {
        for pseudo in seams.drain(..) {
            skip(graph, pseudo);
        }
    }
    seams
}
