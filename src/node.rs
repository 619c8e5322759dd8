//! Node and port records of the operator graph.
//!
//! A [`Node`] is one processing step. What it *is* lives in [`NodeKind`], a
//! closed tagged union; how the planner must treat it lives in a handful of
//! attributes ([`Boundary`], [`Observation`]) and in its ports.

use crate::node_id::{InputId, NodeId, OutputId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Name of the record type flowing through a port.
///
/// Both ends of a connection must carry the same data type.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct DataType(String);

impl DataType {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a node splits execution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Boundary {
    /// Ordinary node, fused into whatever block surrounds it.
    #[default]
    None,
    /// Data is materialized here; the next stage reads it back.
    Stage,
    /// Data is redistributed by key here; the node runs on the reduce side.
    Shuffle,
}

/// How often the side effects of a node may be observed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Observation {
    /// No observable side effect.
    #[default]
    DontCare,
    /// Must run even if nothing consumes its output.
    AtLeastOnce,
    /// Must not be re-executed by a retried or duplicated stage.
    AtMostOnce,
    /// Both of the above.
    ExactlyOnce,
}

impl Observation {
    /// Whether the node has to survive dead-code elimination.
    #[must_use]
    pub const fn is_mandatory(self) -> bool {
        matches!(self, Self::AtLeastOnce | Self::ExactlyOnce)
    }

    /// Whether the node's output has to be checkpointed before reuse.
    #[must_use]
    pub const fn is_global(self) -> bool {
        matches!(self, Self::AtMostOnce | Self::ExactlyOnce)
    }
}

/// Whether an output port may be left without downstream connections.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Connectivity {
    /// An unconnected output is silently terminated with an implicit sink.
    #[default]
    Optional,
    /// An unconnected output is a user error.
    Mandatory,
}

/// Grouping and ordering properties for the input of a shuffle operator.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub struct ShuffleKey {
    pub grouping: Vec<String>,
    pub ordering: Vec<String>,
}

impl ShuffleKey {
    pub fn group_by<I, S>(properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grouping: properties.into_iter().map(Into::into).collect(),
            ordering: Vec::new(),
        }
    }

    #[must_use]
    pub fn order_by<S: Into<String>>(mut self, property: S) -> Self {
        self.ordering.push(property.into());
        self
    }
}

/// The operator families the planner distinguishes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum OperatorKind {
    /// Record-at-a-time transformation.
    Map,
    /// Keeps or drops records.
    Filter,
    /// Routes each record to exactly one of several outputs.
    Branch,
    /// Passes records through and writes a log line.
    Logging,
    /// Structural projection between two record types.
    Project,
    /// Unions several inputs into one output.
    Confluent,
    /// Folds each key group into one record.
    Fold,
    /// Groups several inputs by key.
    CoGroup,
    /// Joins a master input with a transaction input.
    MasterJoin,
    /// Anything else.
    Custom,
}

/// Synthetic nodes that carry no user logic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum PseudoKind {
    /// Pass-through.
    Identity,
    /// Pass-through that forces a stage boundary.
    Checkpoint,
    /// Terminal that swallows its input.
    ImplicitSink,
    /// Source that produces nothing.
    Empty,
}

/// A nested graph owned by a flow-part node.
///
/// `inputs[i]` is the internal endpoint receiving what arrives at the outer
/// node's `i`-th input port; `outputs[j]` is the internal endpoint whose
/// input feeds the outer node's `j`-th output port.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Scope {
    pub inputs: Vec<NodeId>,
    pub outputs: Vec<NodeId>,
}

impl Scope {
    #[must_use]
    pub fn endpoints(&self) -> Vec<NodeId> {
        self.inputs.iter().chain(self.outputs.iter()).copied().collect()
    }
}

/// Node kind and its payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum NodeKind {
    /// Entry point of a graph or nested scope.
    Input,
    /// Exit point of a graph or nested scope.
    Output,
    /// User operator.
    Operator(OperatorKind),
    /// Synthetic node.
    Pseudo(PseudoKind),
    /// Nested sub-graph.
    FlowPart(Scope),
}

impl NodeKind {
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Operator(_) => "operator",
            Self::Pseudo(PseudoKind::Identity) => "identity",
            Self::Pseudo(PseudoKind::Checkpoint) => "checkpoint",
            Self::Pseudo(PseudoKind::ImplicitSink) => "implicit-sink",
            Self::Pseudo(PseudoKind::Empty) => "empty",
            Self::FlowPart(_) => "flow-part",
        }
    }
}

/// A processing step.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) boundary: Boundary,
    pub(crate) observation: Observation,
    pub(crate) inputs: Vec<InputId>,
    pub(crate) outputs: Vec<OutputId>,
}

impl Node {
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    #[must_use]
    pub fn observation(&self) -> Observation {
        self.observation
    }

    #[must_use]
    pub fn inputs(&self) -> &[InputId] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[OutputId] {
        &self.outputs
    }
}

/// An input port and the output ports feeding it.
#[derive(Clone, Debug)]
pub struct InputPort {
    pub(crate) owner: NodeId,
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) shuffle_key: Option<ShuffleKey>,
    pub(crate) connected: BTreeSet<OutputId>,
}

impl InputPort {
    #[must_use]
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[must_use]
    pub fn shuffle_key(&self) -> Option<&ShuffleKey> {
        self.shuffle_key.as_ref()
    }

    #[must_use]
    pub fn connected(&self) -> &BTreeSet<OutputId> {
        &self.connected
    }
}

/// An output port and the input ports it feeds.
#[derive(Clone, Debug)]
pub struct OutputPort {
    pub(crate) owner: NodeId,
    pub(crate) name: String,
    pub(crate) data_type: DataType,
    pub(crate) connectivity: Connectivity,
    pub(crate) connected: BTreeSet<InputId>,
}

impl OutputPort {
    #[must_use]
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    #[must_use]
    pub fn connected(&self) -> &BTreeSet<InputId> {
        &self.connected
    }
}

/// Declaration of one port for [`NodeSpec`].
#[derive(Clone, Debug)]
pub struct PortSpec {
    pub name: String,
    pub data_type: DataType,
    pub shuffle_key: Option<ShuffleKey>,
    pub connectivity: Connectivity,
}

/// Fluent description of a node to add to a [`FlowGraph`](crate::graph::FlowGraph).
///
/// # Example
///
/// ```
/// use ironstage::node::{DataType, NodeSpec, OperatorKind, Boundary, ShuffleKey};
///
/// let spec = NodeSpec::operator("sum", OperatorKind::Fold)
///     .boundary(Boundary::Shuffle)
///     .shuffled_input("in", DataType::new("Sale"), ShuffleKey::group_by(["item"]))
///     .output("out", DataType::new("Total"));
/// assert_eq!(spec.inputs.len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct NodeSpec {
    pub name: String,
    pub kind: NodeKind,
    pub boundary: Boundary,
    pub observation: Observation,
    pub inputs: Vec<PortSpec>,
    pub outputs: Vec<PortSpec>,
}

impl NodeSpec {
    pub fn new<S: Into<String>>(name: S, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            boundary: Boundary::None,
            observation: Observation::DontCare,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn operator<S: Into<String>>(name: S, kind: OperatorKind) -> Self {
        Self::new(name, NodeKind::Operator(kind))
    }

    pub fn pseudo<S: Into<String>>(name: S, kind: PseudoKind) -> Self {
        let spec = Self::new(name, NodeKind::Pseudo(kind));
        if kind == PseudoKind::Checkpoint {
            spec.boundary(Boundary::Stage)
        } else {
            spec
        }
    }

    #[must_use]
    pub fn boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    #[must_use]
    pub fn observation(mut self, observation: Observation) -> Self {
        self.observation = observation;
        self
    }

    #[must_use]
    pub fn input<S: Into<String>>(mut self, name: S, data_type: DataType) -> Self {
        self.inputs.push(PortSpec {
            name: name.into(),
            data_type,
            shuffle_key: None,
            connectivity: Connectivity::Optional,
        });
        self
    }

    #[must_use]
    pub fn shuffled_input<S: Into<String>>(
        mut self,
        name: S,
        data_type: DataType,
        key: ShuffleKey,
    ) -> Self {
        self.inputs.push(PortSpec {
            name: name.into(),
            data_type,
            shuffle_key: Some(key),
            connectivity: Connectivity::Optional,
        });
        self
    }

    #[must_use]
    pub fn output<S: Into<String>>(mut self, name: S, data_type: DataType) -> Self {
        self.outputs.push(PortSpec {
            name: name.into(),
            data_type,
            shuffle_key: None,
            connectivity: Connectivity::Optional,
        });
        self
    }

    /// Add an output that must be connected downstream.
    #[must_use]
    pub fn mandatory_output<S: Into<String>>(mut self, name: S, data_type: DataType) -> Self {
        self.outputs.push(PortSpec {
            name: name.into(),
            data_type,
            shuffle_key: None,
            connectivity: Connectivity::Mandatory,
        });
        self
    }
}
