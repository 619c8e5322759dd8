//! # Ironstage
//!
//! A **stage planner** for dataflow programs. Ironstage takes a graph of
//! operators connected through typed ports and compiles it into a
//! MapReduce-style plan: an ordered list of stages, each made of map blocks
//! and the reduce blocks they shuffle into.
//!
//! ## Key Features
//!
//! - **Arena-backed operator graph** - nodes and ports addressed by copyable handles
//! - **Validation with diagnostics** - every problem in the source graph is reported at once
//! - **Pluggable rewriters** - run custom graph optimizations before planning
//! - **Nested flow parts** - inlined with or without a stage seam
//! - **Block compaction** - redundant ports, dead nodes and identity chains are removed
//! - **Optional stage merging** - independent stages at equal depth share one job
//! - **Deterministic** - the same graph always yields the same plan
//!
//! ## Quick Start
//!
//! ```
//! use ironstage::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let mut graph = FlowGraph::new();
//! let lines = graph.add_input("lines", DataType::new("Line"));
//! let split = graph.add_node(
//!     NodeSpec::operator("split", OperatorKind::Map)
//!         .input("in", DataType::new("Line"))
//!         .output("out", DataType::new("Word")),
//! )?;
//! let count = graph.add_node(
//!     NodeSpec::operator("count", OperatorKind::Fold)
//!         .boundary(Boundary::Shuffle)
//!         .shuffled_input("in", DataType::new("Word"), ShuffleKey::group_by(["word"]))
//!         .output("out", DataType::new("WordCount")),
//! )?;
//! let counts = graph.add_output("counts", DataType::new("WordCount"));
//! graph.connect_nodes(lines, 0, split, 0)?;
//! graph.connect_nodes(split, 0, count, 0)?;
//! graph.connect_nodes(count, 0, counts, 0)?;
//!
//! let plan = build_plan(&graph)?;
//! assert_eq!(plan.stages().len(), 1);
//! assert!(plan.stages()[0].has_reduce());
//! println!("{}", plan.explain());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Boundaries
//!
//! Every node carries a [`Boundary`]. `Shuffle` nodes start a reduce block
//! and group their inputs by a [`ShuffleKey`]. `Stage` nodes (including the
//! graph's global inputs and outputs) are materialization points between
//! stages. Everything else is fused into the blocks around them.
//!
//! ### Blocks
//!
//! A [`Block`] is a self-contained copy of a fragment of the graph with its
//! own input and output ports. Blocks are linked through a shared
//! [`Wiring`] table rather than by references to each other.
//!
//! ### Stages
//!
//! A [`Stage`] groups the map blocks feeding a set of reduce blocks. Stages
//! are numbered from 1 in an order where producers always come first.
//!
//! ## Configuration
//!
//! [`PlannerOptions`] selects how flow parts are inlined and whether stages
//! are merged (`compressFlowBlockGroup`). Options can be built in code or
//! loaded from JSON with [`PlannerOptions::from_json`].
//!
//! ## Logging
//!
//! Planning progress is reported as [`PlanEvent`]s to a [`PlanObserver`].
//! The default [`LogObserver`] forwards them to the [`log`] facade; install
//! any logger to see them.
//!
//! ## Module Overview
//!
//! - [`graph`] - The operator graph and its construction API
//! - [`validation`] - Source graph checks and diagnostics
//! - [`rewriter`] - The rewriter extension point
//! - [`normalize`] - Boundary normalization passes
//! - [`block`] - Blocks, block ports and compaction
//! - [`stage`] - Stages and the final stage graph
//! - [`planner`] - The planning pipeline
//! - [`testing`] - Builders, fixtures and assertions for tests

pub mod block;
pub mod graph;
pub mod node;
pub mod node_id;
pub mod normalize;
pub mod ops;
pub mod options;
pub mod path;
pub mod planner;
pub mod rewrite;
pub mod rewriter;
pub mod stage;
pub mod testing;
pub mod trace;
pub mod validation;

// General re-exports
pub use block::{Attached, Block, BlockInput, BlockOutput, Detached, PortMapping, Wiring};
pub use graph::FlowGraph;
pub use node::{
    Boundary, Connectivity, DataType, NodeKind, NodeSpec, Observation, OperatorKind, PseudoKind,
    Scope, ShuffleKey,
};
pub use node_id::{BlockId, BlockInputId, BlockOutputId, InputId, NodeId, OutputId};
pub use normalize::NormalizeSummary;
pub use options::{FlowPartMode, PlannerOptions};
pub use planner::{StagePlanner, build_plan};
pub use rewriter::{FlowGraphRewriter, RewritePhase};
pub use stage::{Stage, StageGraph, StageGraphExplanation};
pub use trace::{LogObserver, PlanEvent, PlanObserver, RecordingObserver};
pub use validation::{Diagnostic, Diagnostics};
