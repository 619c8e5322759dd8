//! The operator graph arena.
//!
//! A [`FlowGraph`] owns every node and port ever created for one planning
//! session: the user's source graph, nested flow-part scopes, pseudo nodes
//! added by rewrites, and the private node copies of detached blocks. All
//! relations are stored as handles, so cloning the arena is a complete deep
//! copy that preserves every handle.
//!
//! "A graph" in the planner's sense is a [`Scope`]: the nodes reachable, in
//! either direction, from the scope's declared input and output nodes.

use crate::node::{
    Boundary, Connectivity, DataType, InputPort, Node, NodeKind, NodeSpec, Observation,
    OutputPort, PortSpec, PseudoKind, Scope,
};
use crate::node_id::{IdGen, InputId, NodeId, OutputId};
use anyhow::{Result, bail, ensure};
use std::collections::BTreeMap;

/// Arena of nodes, ports and connections.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    ids: IdGen,
    nodes: BTreeMap<NodeId, Node>,
    inputs: BTreeMap<InputId, InputPort>,
    outputs: BTreeMap<OutputId, OutputPort>,
    root: Scope,
}

impl FlowGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /* ---------- builder API ---------- */

    /// Add a global input node with a single output port named `out`.
    pub fn add_input<S: Into<String>>(&mut self, name: S, data_type: DataType) -> NodeId {
        let id = self.create_node(
            NodeSpec::new(name, NodeKind::Input).output("out", data_type),
        );
        self.root.inputs.push(id);
        id
    }

    /// Add a global output node with a single input port named `in`.
    pub fn add_output<S: Into<String>>(&mut self, name: S, data_type: DataType) -> NodeId {
        let id = self.create_node(
            NodeSpec::new(name, NodeKind::Output).input("in", data_type),
        );
        self.root.outputs.push(id);
        id
    }

    /// Add an operator or pseudo node.
    ///
    /// # Errors
    ///
    /// Flow parts must be added through [`FlowGraph::add_flow_part`], and
    /// `Input`/`Output` nodes through their dedicated methods.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeId> {
        if matches!(spec.kind, NodeKind::Operator(_) | NodeKind::Pseudo(_)) {
            return Ok(self.create_node(spec));
        }
        bail!(
            "node {:?} of kind {} cannot be added with add_node",
            spec.name,
            spec.kind.describe()
        )
    }

    /// Add a nested flow part whose outer ports are described by `spec`.
    ///
    /// The nested scope gets one internal `Input` node per outer input port
    /// and one internal `Output` node per outer output port, with matching
    /// data types. Populate the scope by connecting to them.
    ///
    /// # Errors
    ///
    /// Fails if `spec` is not of kind [`NodeKind::FlowPart`].
    pub fn add_flow_part(&mut self, spec: NodeSpec) -> Result<NodeId> {
        ensure!(
            matches!(spec.kind, NodeKind::FlowPart(_)),
            "node {:?} is not a flow part",
            spec.name
        );
        let mut scope = Scope::default();
        for port in &spec.inputs {
            scope.inputs.push(self.create_node(
                NodeSpec::new(port.name.clone(), NodeKind::Input)
                    .output("out", port.data_type.clone()),
            ));
        }
        for port in &spec.outputs {
            scope.outputs.push(self.create_node(
                NodeSpec::new(port.name.clone(), NodeKind::Output)
                    .input("in", port.data_type.clone()),
            ));
        }
        let mut spec = spec;
        spec.kind = NodeKind::FlowPart(scope);
        Ok(self.create_node(spec))
    }

    /// Connect an output port to an input port.
    ///
    /// # Errors
    ///
    /// Fails if either port does not exist or the data types differ.
    pub fn connect(&mut self, upstream: OutputId, downstream: InputId) -> Result<()> {
        let Some(out) = self.outputs.get(&upstream) else {
            bail!("output port {upstream} not found");
        };
        let Some(inp) = self.inputs.get(&downstream) else {
            bail!("input port {downstream} not found");
        };
        ensure!(
            out.data_type == inp.data_type,
            "type mismatch connecting {upstream} ({}) to {downstream} ({})",
            out.data_type,
            inp.data_type
        );
        self.link(upstream, downstream);
        Ok(())
    }

    /// Connect the `from`-th output of `upstream` to the `to`-th input of `downstream`.
    ///
    /// # Errors
    ///
    /// Fails if a port index is out of range or the data types differ.
    pub fn connect_nodes(
        &mut self,
        upstream: NodeId,
        from: usize,
        downstream: NodeId,
        to: usize,
    ) -> Result<()> {
        let Some(out) = self.try_node(upstream).and_then(|n| n.outputs.get(from).copied()) else {
            bail!("node {upstream} has no output port #{from}");
        };
        let Some(inp) = self.try_node(downstream).and_then(|n| n.inputs.get(to).copied()) else {
            bail!("node {downstream} has no input port #{to}");
        };
        self.connect(out, inp)
    }

    /* ---------- queries ---------- */

    /// The root scope: declared global inputs and outputs.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.root
    }

    /// Declared global input nodes.
    #[must_use]
    pub fn global_inputs(&self) -> &[NodeId] {
        &self.root.inputs
    }

    /// Declared global output nodes.
    #[must_use]
    pub fn global_outputs(&self) -> &[NodeId] {
        &self.root.outputs
    }

    /// Look up a node.
    ///
    /// # Panics
    ///
    /// Panics if the node was removed or never existed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        match self.nodes.get(&id) {
            Some(node) => node,
            None => panic!("node {id} is not in the graph"),
        }
    }

    #[must_use]
    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Look up an input port.
    ///
    /// # Panics
    ///
    /// Panics if the port's node was removed.
    #[must_use]
    pub fn input(&self, id: InputId) -> &InputPort {
        match self.inputs.get(&id) {
            Some(port) => port,
            None => panic!("input port {id} is not in the graph"),
        }
    }

    /// Look up an output port.
    ///
    /// # Panics
    ///
    /// Panics if the port's node was removed.
    #[must_use]
    pub fn output(&self, id: OutputId) -> &OutputPort {
        match self.outputs.get(&id) {
            Some(port) => port,
            None => panic!("output port {id} is not in the graph"),
        }
    }

    #[must_use]
    pub fn try_input(&self, id: InputId) -> Option<&InputPort> {
        self.inputs.get(&id)
    }

    #[must_use]
    pub fn try_output(&self, id: OutputId) -> Option<&OutputPort> {
        self.outputs.get(&id)
    }

    /// First input port of a node.
    #[must_use]
    pub fn first_input(&self, node: NodeId) -> InputId {
        self.node(node).inputs[0]
    }

    /// First output port of a node.
    #[must_use]
    pub fn first_output(&self, node: NodeId) -> OutputId {
        self.node(node).outputs[0]
    }

    /// Every node in the arena, in creation order, regardless of scope.
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /* ---------- mutation primitives ---------- */

    pub(crate) fn create_node(&mut self, spec: NodeSpec) -> NodeId {
        let id = self.ids.node();
        let inputs = spec
            .inputs
            .into_iter()
            .map(|port| {
                let pid = self.ids.input();
                self.inputs.insert(
                    pid,
                    InputPort {
                        owner: id,
                        name: port.name,
                        data_type: port.data_type,
                        shuffle_key: port.shuffle_key,
                        connected: Default::default(),
                    },
                );
                pid
            })
            .collect();
        let outputs = spec
            .outputs
            .into_iter()
            .map(|port| {
                let pid = self.ids.output();
                self.outputs.insert(
                    pid,
                    OutputPort {
                        owner: id,
                        name: port.name,
                        data_type: port.data_type,
                        connectivity: port.connectivity,
                        connected: Default::default(),
                    },
                );
                pid
            })
            .collect();
        self.nodes.insert(
            id,
            Node {
                id,
                name: spec.name,
                kind: spec.kind,
                boundary: spec.boundary,
                observation: spec.observation,
                inputs,
                outputs,
            },
        );
        id
    }

    /// Create a pass-through pseudo node carrying `data_type`.
    pub(crate) fn create_pseudo(
        &mut self,
        name: String,
        kind: PseudoKind,
        boundary: Boundary,
        data_type: DataType,
    ) -> NodeId {
        let mut spec = NodeSpec::new(name, NodeKind::Pseudo(kind)).boundary(boundary);
        if kind != PseudoKind::Empty {
            spec = spec.input("in", data_type.clone());
        }
        if kind != PseudoKind::ImplicitSink {
            spec = spec.output("out", data_type);
        }
        self.create_node(spec)
    }

    /// Declaration of an existing node, suitable for creating a copy of it.
    pub(crate) fn spec_of(&self, id: NodeId) -> NodeSpec {
        let node = self.node(id);
        NodeSpec {
            name: node.name.clone(),
            kind: node.kind.clone(),
            boundary: node.boundary,
            observation: node.observation,
            inputs: node
                .inputs
                .iter()
                .map(|p| {
                    let port = self.input(*p);
                    PortSpec {
                        name: port.name.clone(),
                        data_type: port.data_type.clone(),
                        shuffle_key: port.shuffle_key.clone(),
                        connectivity: Connectivity::Optional,
                    }
                })
                .collect(),
            outputs: node
                .outputs
                .iter()
                .map(|p| {
                    let port = self.output(*p);
                    PortSpec {
                        name: port.name.clone(),
                        data_type: port.data_type.clone(),
                        shuffle_key: None,
                        connectivity: port.connectivity,
                    }
                })
                .collect(),
        }
    }

    pub(crate) fn link(&mut self, upstream: OutputId, downstream: InputId) {
        match self.outputs.get_mut(&upstream) {
            Some(port) => port.connected.insert(downstream),
            None => panic!("output port {upstream} is not in the graph"),
        };
        match self.inputs.get_mut(&downstream) {
            Some(port) => port.connected.insert(upstream),
            None => panic!("input port {downstream} is not in the graph"),
        };
    }

    pub(crate) fn unlink(&mut self, upstream: OutputId, downstream: InputId) {
        if let Some(port) = self.outputs.get_mut(&upstream) {
            port.connected.remove(&downstream);
        }
        if let Some(port) = self.inputs.get_mut(&downstream) {
            port.connected.remove(&upstream);
        }
    }

    /// Remove every connection of an input port.
    pub(crate) fn disconnect_input(&mut self, port: InputId) {
        let upstreams: Vec<_> = self.input(port).connected.iter().copied().collect();
        for upstream in upstreams {
            self.unlink(upstream, port);
        }
    }

    /// Remove every connection of an output port.
    pub(crate) fn disconnect_output(&mut self, port: OutputId) {
        let downstreams: Vec<_> = self.output(port).connected.iter().copied().collect();
        for downstream in downstreams {
            self.unlink(port, downstream);
        }
    }

    /// Remove every connection of a node.
    pub(crate) fn disconnect_node(&mut self, id: NodeId) {
        let node = self.node(id);
        let (inputs, outputs) = (node.inputs.clone(), node.outputs.clone());
        for port in inputs {
            self.disconnect_input(port);
        }
        for port in outputs {
            self.disconnect_output(port);
        }
    }

    /// Disconnect and drop a node together with its ports.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.disconnect_node(id);
        if let Some(node) = self.nodes.remove(&id) {
            for port in node.inputs {
                self.inputs.remove(&port);
            }
            for port in node.outputs {
                self.outputs.remove(&port);
            }
        }
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(&id) {
            Some(node) => node,
            None => panic!("node {id} is not in the graph"),
        }
    }

    pub(crate) fn set_observation(&mut self, id: NodeId, observation: Observation) {
        self.node_mut(id).observation = observation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::OperatorKind;

    #[test]
    fn connect_rejects_type_mismatch() {
        let mut g = FlowGraph::new();
        let a = g.add_input("a", DataType::new("A"));
        let b = g.add_output("b", DataType::new("B"));
        let err = g.connect_nodes(a, 0, b, 0).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn remove_node_clears_both_sides() -> Result<()> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let m = g.add_node(
            NodeSpec::operator("m", OperatorKind::Map)
                .input("in", t.clone())
                .output("out", t.clone()),
        )?;
        let b = g.add_output("b", t);
        g.connect_nodes(a, 0, m, 0)?;
        g.connect_nodes(m, 0, b, 0)?;

        g.remove_node(m);
        assert!(!g.contains(m));
        assert!(g.output(g.first_output(a)).connected().is_empty());
        assert!(g.input(g.first_input(b)).connected().is_empty());
        Ok(())
    }

    #[test]
    fn flow_part_creates_matching_endpoints() -> Result<()> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let part = g.add_flow_part(
            NodeSpec::new("part", NodeKind::FlowPart(Scope::default()))
                .input("x", t.clone())
                .output("y", t),
        )?;
        let NodeKind::FlowPart(scope) = g.node(part).kind() else {
            panic!("not a flow part");
        };
        assert_eq!(scope.inputs.len(), 1);
        assert_eq!(scope.outputs.len(), 1);
        assert_eq!(g.node(scope.inputs[0]).kind(), &NodeKind::Input);
        Ok(())
    }
}
