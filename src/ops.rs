//! Graph-wide queries: node classification, traversal and deep copy.
//!
//! Everything here is a free function over an explicit [`FlowGraph`]; there
//! is no hidden state. Structural rewrites live in [`crate::rewrite`].

use crate::graph::FlowGraph;
use crate::node::{Boundary, NodeKind, OperatorKind, Scope};
use crate::node_id::{InputId, NodeId, OutputId};
use crate::path::{Direction, Path};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/* ---------- classification ---------- */

/// Stage or shuffle boundary. Graph endpoints count as stage boundaries.
#[must_use]
pub fn is_boundary(graph: &FlowGraph, node: NodeId) -> bool {
    is_stage_boundary(graph, node) || is_shuffle_boundary(graph, node)
}

#[must_use]
pub fn is_shuffle_boundary(graph: &FlowGraph, node: NodeId) -> bool {
    graph.node(node).boundary() == Boundary::Shuffle
}

#[must_use]
pub fn is_stage_boundary(graph: &FlowGraph, node: NodeId) -> bool {
    let node = graph.node(node);
    node.boundary() == Boundary::Stage || matches!(node.kind(), NodeKind::Input | NodeKind::Output)
}

/// A non-boundary pseudo node with exactly one input and one output port.
#[must_use]
pub fn is_identity(graph: &FlowGraph, node: NodeId) -> bool {
    let n = graph.node(node);
    matches!(n.kind(), NodeKind::Pseudo(_))
        && n.boundary() == Boundary::None
        && n.inputs().len() == 1
        && n.outputs().len() == 1
}

/// The node must run even if its output is never consumed.
#[must_use]
pub fn has_mandatory_side_effect(graph: &FlowGraph, node: NodeId) -> bool {
    graph.node(node).observation().is_mandatory()
}

/// The node must not be re-executed, so its output is checkpointed.
#[must_use]
pub fn has_global_side_effect(graph: &FlowGraph, node: NodeId) -> bool {
    graph.node(node).observation().is_global()
}

/// Nodes that a post-shuffle checkpoint may be pushed below.
#[must_use]
pub fn is_push_down_target(graph: &FlowGraph, node: NodeId) -> bool {
    if is_identity(graph, node) {
        return true;
    }
    let n = graph.node(node);
    n.boundary() == Boundary::None
        && matches!(
            n.kind(),
            NodeKind::Operator(OperatorKind::Branch | OperatorKind::Logging)
        )
}

/* ---------- one-hop traversal ---------- */

/// Nodes fed by any output of `node`.
#[must_use]
pub fn successors(graph: &FlowGraph, node: NodeId) -> BTreeSet<NodeId> {
    graph
        .node(node)
        .outputs()
        .iter()
        .flat_map(|p| graph.output(*p).connected().iter())
        .map(|p| graph.input(*p).owner())
        .collect()
}

/// Nodes feeding any input of `node`.
#[must_use]
pub fn predecessors(graph: &FlowGraph, node: NodeId) -> BTreeSet<NodeId> {
    graph
        .node(node)
        .inputs()
        .iter()
        .flat_map(|p| graph.input(*p).connected().iter())
        .map(|p| graph.output(*p).owner())
        .collect()
}

/// Output ports of `node` with at least one connection.
#[must_use]
pub fn connected_outputs(graph: &FlowGraph, node: NodeId) -> Vec<OutputId> {
    graph
        .node(node)
        .outputs()
        .iter()
        .copied()
        .filter(|p| !graph.output(*p).connected().is_empty())
        .collect()
}

/* ---------- graph-wide traversal ---------- */

/// Every node reachable in either direction from the scope's endpoints.
#[must_use]
pub fn collect_nodes(graph: &FlowGraph, scope: &Scope) -> BTreeSet<NodeId> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<NodeId> = scope.endpoints().into_iter().collect();
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        queue.extend(successors(graph, node));
        queue.extend(predecessors(graph, node));
    }
    seen
}

/// Boundary nodes among `nodes`.
#[must_use]
pub fn collect_boundaries(graph: &FlowGraph, nodes: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    nodes
        .iter()
        .copied()
        .filter(|n| is_boundary(graph, *n))
        .collect()
}

/// Flow-part nodes among `nodes`, together with their scopes.
#[must_use]
pub fn collect_flow_parts(graph: &FlowGraph, nodes: &BTreeSet<NodeId>) -> Vec<(NodeId, Scope)> {
    nodes
        .iter()
        .filter_map(|n| match graph.node(*n).kind() {
            NodeKind::FlowPart(scope) => Some((*n, scope.clone())),
            _ => None,
        })
        .collect()
}

/// Walk forward from `startings` until boundary nodes are reached.
#[must_use]
pub fn boundary_path_forward(graph: &FlowGraph, startings: &BTreeSet<NodeId>) -> Path {
    boundary_path(graph, startings, Direction::Forward)
}

/// Walk backward from `startings` until boundary nodes are reached.
#[must_use]
pub fn boundary_path_backward(graph: &FlowGraph, startings: &BTreeSet<NodeId>) -> Path {
    boundary_path(graph, startings, Direction::Backward)
}

fn boundary_path(graph: &FlowGraph, startings: &BTreeSet<NodeId>, direction: Direction) -> Path {
    let step = |node: NodeId| match direction {
        Direction::Forward => successors(graph, node),
        Direction::Backward => predecessors(graph, node),
    };
    let mut passings = BTreeSet::new();
    let mut arrivals = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut queue: VecDeque<NodeId> = startings.iter().flat_map(|n| step(*n)).collect();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        if is_boundary(graph, node) {
            arrivals.insert(node);
        } else {
            passings.insert(node);
            queue.extend(step(node));
        }
    }
    Path::new(direction, startings.clone(), passings, arrivals)
}

/* ---------- deep copy ---------- */

/// Old-to-new handle mapping produced by [`deep_copy`].
#[derive(Clone, Debug, Default)]
pub struct CopyMap {
    pub nodes: BTreeMap<NodeId, NodeId>,
    pub inputs: BTreeMap<InputId, InputId>,
    pub outputs: BTreeMap<OutputId, OutputId>,
}

impl CopyMap {
    fn record(&mut self, graph: &FlowGraph, old: NodeId, new: NodeId) {
        self.nodes.insert(old, new);
        let (o, n) = (graph.node(old), graph.node(new));
        self.inputs.extend(o.inputs().iter().copied().zip(n.inputs().iter().copied()));
        self.outputs.extend(o.outputs().iter().copied().zip(n.outputs().iter().copied()));
    }
}

/// Copy `nodes` (and the scopes of any flow parts among them) into fresh
/// nodes of the same arena.
///
/// Connections are recreated wherever both endpoints were copied; edges
/// leaving the copied set are not. Nested scopes are copied before the flow
/// part that owns them, so the copy's scope refers to the copied endpoints.
pub fn deep_copy(graph: &mut FlowGraph, nodes: &BTreeSet<NodeId>) -> CopyMap {
    let mut groups = Vec::new();
    let mut pending = vec![nodes.clone()];
    while let Some(group) = pending.pop() {
        for (_, scope) in collect_flow_parts(graph, &group) {
            pending.push(collect_nodes(graph, &scope));
        }
        groups.push(group);
    }

    let mut map = CopyMap::default();
    for group in groups.iter().rev() {
        for &old in group {
            let mut spec = graph.spec_of(old);
            if let NodeKind::FlowPart(scope) = &mut spec.kind {
                scope.inputs = scope.inputs.iter().map(|n| map.nodes[n]).collect();
                scope.outputs = scope.outputs.iter().map(|n| map.nodes[n]).collect();
            }
            let new = graph.create_node(spec);
            map.record(graph, old, new);
        }
    }

    let outputs: Vec<_> = map.outputs.iter().map(|(o, n)| (*o, *n)).collect();
    for (old_out, new_out) in outputs {
        let downstreams: Vec<_> = graph.output(old_out).connected().iter().copied().collect();
        for old_in in downstreams {
            if let Some(new_in) = map.inputs.get(&old_in) {
                graph.link(new_out, *new_in);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataType, NodeSpec, Observation, PseudoKind};
    use anyhow::Result;

    /// `a -> m1 -> s(shuffle) -> m2 -> b`
    fn chain() -> Result<(FlowGraph, [NodeId; 5])> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let map = |name: &str| {
            NodeSpec::operator(name, OperatorKind::Map)
                .input("in", t.clone())
                .output("out", t.clone())
        };
        let a = g.add_input("a", t.clone());
        let m1 = g.add_node(map("m1"))?;
        let s = g.add_node(map("s").boundary(Boundary::Shuffle))?;
        let m2 = g.add_node(map("m2").observation(Observation::AtLeastOnce))?;
        let b = g.add_output("b", t.clone());
        g.connect_nodes(a, 0, m1, 0)?;
        g.connect_nodes(m1, 0, s, 0)?;
        g.connect_nodes(s, 0, m2, 0)?;
        g.connect_nodes(m2, 0, b, 0)?;
        Ok((g, [a, m1, s, m2, b]))
    }

    #[test]
    fn classification_follows_attributes() -> Result<()> {
        let (mut g, [a, m1, s, m2, b]) = chain()?;
        assert!(is_stage_boundary(&g, a) && is_stage_boundary(&g, b));
        assert!(is_shuffle_boundary(&g, s) && !is_stage_boundary(&g, s));
        assert!(!is_boundary(&g, m1));
        assert!(has_mandatory_side_effect(&g, m2) && !has_global_side_effect(&g, m2));

        let out = g.first_output(m1);
        let id = crate::rewrite::insert_identity(&mut g, out);
        assert!(is_identity(&g, id) && is_push_down_target(&g, id));
        let sink = crate::rewrite::stop(&mut g, out);
        assert!(matches!(
            g.node(sink).kind(),
            NodeKind::Pseudo(PseudoKind::ImplicitSink)
        ));
        assert!(!is_identity(&g, sink));
        Ok(())
    }

    #[test]
    fn boundary_paths_stop_at_boundaries() -> Result<()> {
        let (g, [a, m1, s, m2, b]) = chain()?;
        let fwd = boundary_path_forward(&g, &BTreeSet::from([a]));
        assert_eq!(fwd.passings(), &BTreeSet::from([m1]));
        assert_eq!(fwd.arrivals(), &BTreeSet::from([s]));

        let back = boundary_path_backward(&g, &BTreeSet::from([b]));
        assert_eq!(back.passings(), &BTreeSet::from([m2]));
        assert_eq!(back.arrivals(), &BTreeSet::from([s]));
        Ok(())
    }

    #[test]
    fn deep_copy_keeps_internal_edges_only() -> Result<()> {
        let (mut g, [a, m1, s, _, _]) = chain()?;
        let copy = deep_copy(&mut g, &BTreeSet::from([m1, s]));
        let (m1c, sc) = (copy.nodes[&m1], copy.nodes[&s]);

        assert_eq!(successors(&g, m1c), BTreeSet::from([sc]));
        assert!(predecessors(&g, m1c).is_empty());
        assert!(successors(&g, sc).is_empty());
        assert_eq!(g.node(sc).boundary(), Boundary::Shuffle);
        assert_eq!(successors(&g, a), BTreeSet::from([m1]));
        Ok(())
    }
}
