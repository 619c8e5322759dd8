//! Fluent builders for test graphs.

use crate::graph::FlowGraph;
use crate::node::{Boundary, DataType, NodeSpec, OperatorKind, ShuffleKey};
use crate::node_id::NodeId;
use anyhow::{Result, ensure};

/// Build a straight chain from one global input to one global output.
///
/// Each step connects the previous node's first output to the new node's
/// first input.
///
/// # Example
///
/// ```
/// use ironstage::node::DataType;
/// use ironstage::testing::ChainBuilder;
///
/// let graph = ChainBuilder::new("lines", DataType::new("Line"))
///     .map("split", DataType::new("Word"))?
///     .group("count", ["word"], DataType::new("WordCount"))?
///     .build("counts")?;
/// assert_eq!(graph.node_count(), 4);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct ChainBuilder {
    graph: FlowGraph,
    tail: NodeId,
    data_type: DataType,
}

impl ChainBuilder {
    #[must_use]
    pub fn new<S: Into<String>>(input: S, data_type: DataType) -> Self {
        let mut graph = FlowGraph::new();
        let tail = graph.add_input(input, data_type.clone());
        Self {
            graph,
            tail,
            data_type,
        }
    }

    /// Append an arbitrary node. Its first input must accept the current type.
    ///
    /// # Errors
    ///
    /// Fails if the node has no ports to connect or the types differ.
    pub fn then(mut self, spec: NodeSpec) -> Result<Self> {
        ensure!(!spec.inputs.is_empty(), "node {:?} has no input", spec.name);
        ensure!(!spec.outputs.is_empty(), "node {:?} has no output", spec.name);
        let next_type = spec.outputs[0].data_type.clone();
        let node = self.graph.add_node(spec)?;
        self.graph.connect_nodes(self.tail, 0, node, 0)?;
        self.tail = node;
        self.data_type = next_type;
        Ok(self)
    }

    /// Append a map operator producing `output`.
    ///
    /// # Errors
    ///
    /// See [`ChainBuilder::then`].
    pub fn map<S: Into<String>>(self, name: S, output: DataType) -> Result<Self> {
        let input = self.data_type.clone();
        self.then(
            NodeSpec::operator(name, OperatorKind::Map)
                .input("in", input)
                .output("out", output),
        )
    }

    /// Append a grouping fold: a shuffle boundary keyed on `keys`.
    ///
    /// # Errors
    ///
    /// See [`ChainBuilder::then`].
    pub fn group<S, I, K>(self, name: S, keys: I, output: DataType) -> Result<Self>
    where
        S: Into<String>,
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let input = self.data_type.clone();
        self.then(
            NodeSpec::operator(name, OperatorKind::Fold)
                .boundary(Boundary::Shuffle)
                .shuffled_input("in", input, ShuffleKey::group_by(keys))
                .output("out", output),
        )
    }

    /// Last node appended so far.
    #[must_use]
    pub fn tail(&self) -> NodeId {
        self.tail
    }

    /// Terminate the chain with a global output.
    ///
    /// # Errors
    ///
    /// Fails only if the chain's tail has no output port.
    pub fn build<S: Into<String>>(mut self, output: S) -> Result<FlowGraph> {
        let sink = self.graph.add_output(output, self.data_type.clone());
        self.graph.connect_nodes(self.tail, 0, sink, 0)?;
        Ok(self.graph)
    }
}
