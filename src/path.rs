//! Maximal runs of non-boundary nodes between boundaries.
//!
//! A [`Path`] is what [`boundary_path_forward`](crate::ops::boundary_path_forward)
//! and [`boundary_path_backward`](crate::ops::boundary_path_backward) return:
//! the nodes a walk started from, the non-boundary nodes it passed, and the
//! boundary nodes where it stopped. Paths are immutable values; combining
//! them produces new paths.

use crate::block::{Attached, Block, Wiring};
use crate::graph::FlowGraph;
use crate::node_id::{InputId, NodeId, OutputId};
use std::collections::{BTreeMap, BTreeSet};

/// Walk direction of a [`Path`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }
}

/// Arrival nodes are always boundaries; passing nodes never are.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Path {
    direction: Direction,
    startings: BTreeSet<NodeId>,
    passings: BTreeSet<NodeId>,
    arrivals: BTreeSet<NodeId>,
}

impl Path {
    #[must_use]
    pub fn new(
        direction: Direction,
        startings: BTreeSet<NodeId>,
        passings: BTreeSet<NodeId>,
        arrivals: BTreeSet<NodeId>,
    ) -> Self {
        Self {
            direction,
            startings,
            passings,
            arrivals,
        }
    }

    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn startings(&self) -> &BTreeSet<NodeId> {
        &self.startings
    }

    #[must_use]
    pub fn passings(&self) -> &BTreeSet<NodeId> {
        &self.passings
    }

    #[must_use]
    pub fn arrivals(&self) -> &BTreeSet<NodeId> {
        &self.arrivals
    }

    /// Combine two paths walking the same way.
    ///
    /// # Panics
    ///
    /// Panics if the directions differ.
    #[must_use]
    pub fn union(&self, other: &Path) -> Path {
        assert_eq!(
            self.direction, other.direction,
            "union requires paths of the same direction"
        );
        Path {
            direction: self.direction,
            startings: self.startings.union(&other.startings).copied().collect(),
            passings: self.passings.union(&other.passings).copied().collect(),
            arrivals: self.arrivals.union(&other.arrivals).copied().collect(),
        }
    }

    /// The span shared by this path and an opposite-direction path.
    ///
    /// Intersecting a forward walk from one boundary with a backward walk
    /// from the next yields exactly the nodes between the two.
    ///
    /// # Panics
    ///
    /// Panics if both paths walk the same way.
    #[must_use]
    pub fn transpose_intersect(&self, other: &Path) -> Path {
        assert_eq!(
            self.direction,
            other.direction.opposite(),
            "transpose_intersect requires paths of opposite directions"
        );
        Path {
            direction: self.direction,
            startings: self.startings.intersection(&other.arrivals).copied().collect(),
            passings: self.passings.intersection(&other.passings).copied().collect(),
            arrivals: self.arrivals.intersection(&other.startings).copied().collect(),
        }
    }

    /// Build an attached block covering this path.
    ///
    /// The block's content is the passing nodes plus, optionally, the
    /// starting and arrival nodes. When the starting nodes are included the
    /// block inputs are their input ports; otherwise they are the content
    /// ports fed by a starting node. Block outputs are built the same way
    /// from the arrival side, each remembering which arrival inputs it feeds.
    ///
    /// # Panics
    ///
    /// Panics on a backward path, or when the block would have no content.
    pub fn create_block(
        &self,
        graph: &FlowGraph,
        wiring: &mut Wiring,
        include_startings: bool,
        include_arrivals: bool,
    ) -> Block<Attached> {
        assert_eq!(
            self.direction,
            Direction::Forward,
            "blocks can only be created from forward paths"
        );
        assert!(
            include_startings || include_arrivals || !self.passings.is_empty(),
            "path from {:?} to {:?} has no content",
            self.startings,
            self.arrivals
        );

        let mut members = self.passings.clone();
        if include_startings {
            members.extend(self.startings.iter().copied());
        }
        if include_arrivals {
            members.extend(self.arrivals.iter().copied());
        }

        let mut inputs = BTreeSet::<InputId>::new();
        for &start in &self.startings {
            let node = graph.node(start);
            if include_startings {
                inputs.extend(node.inputs().iter().copied());
                continue;
            }
            for out in node.outputs() {
                inputs.extend(
                    graph
                        .output(*out)
                        .connected()
                        .iter()
                        .copied()
                        .filter(|p| members.contains(&graph.input(*p).owner())),
                );
            }
        }

        let mut outputs = BTreeMap::<OutputId, BTreeSet<InputId>>::new();
        for &arrival in &self.arrivals {
            let node = graph.node(arrival);
            if include_arrivals {
                for out in node.outputs() {
                    outputs
                        .entry(*out)
                        .or_default()
                        .extend(graph.output(*out).connected().iter().copied());
                }
                continue;
            }
            for inp in node.inputs() {
                for out in graph.input(*inp).connected() {
                    if members.contains(&graph.output(*out).owner()) {
                        outputs.entry(*out).or_default().insert(*inp);
                    }
                }
            }
        }

        Block::from_ports(graph, wiring, members, inputs, outputs)
    }
}
