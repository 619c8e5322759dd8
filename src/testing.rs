//! Testing utilities for stage planning.
//!
//! This module bundles what the crate's own tests use, so downstream
//! planners and rewriters can be tested the same way:
//!
//! - **Builders**: assemble chains of operators fluently
//! - **Fixtures**: ready-made graphs for common planning scenarios
//! - **Assertions**: structural invariants every plan must satisfy
//!
//! # Quick Start
//!
//! ```
//! use ironstage::StagePlanner;
//! use ironstage::testing::*;
//!
//! let source = word_count()?;
//! let (plan, events) = plan_with_trace(StagePlanner::default(), &source)?;
//!
//! assert_eq!(plan.stages().len(), 1);
//! assert_topological_stage_order(&plan);
//! assert_reduce_purity(&plan);
//! assert!(!events.is_empty());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod assertions;
pub mod builders;
pub mod fixtures;

pub use assertions::*;
pub use builders::*;
pub use fixtures::*;

use crate::graph::FlowGraph;
use crate::planner::StagePlanner;
use crate::stage::StageGraph;
use crate::trace::{PlanEvent, RecordingObserver};
use crate::validation::Diagnostics;

/// Plan `source` while recording every event the planner emits.
///
/// Any observer already installed on `planner` is replaced.
///
/// # Errors
///
/// Returns the planner's diagnostics if planning fails.
pub fn plan_with_trace(
    planner: StagePlanner,
    source: &FlowGraph,
) -> Result<(StageGraph, Vec<PlanEvent>), Diagnostics> {
    let recorder = RecordingObserver::new();
    let mut planner = planner.with_observer(recorder.clone());
    let plan = planner.plan(source)?;
    Ok((plan, recorder.events()))
}
