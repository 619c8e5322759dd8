//! Planner progress reporting.
//!
//! The planner never logs directly. Every step reports a [`PlanEvent`] to
//! the [`PlanObserver`] it was built with:
//!
//! - [`LogObserver`] (the default) forwards events to the `log` facade
//! - [`RecordingObserver`] keeps them in memory for tests and reports
//!
//! ```
//! use ironstage::trace::{PlanEvent, PlanObserver, RecordingObserver};
//!
//! let recorder = RecordingObserver::new();
//! let mut sink: Box<dyn PlanObserver> = Box::new(recorder.clone());
//! sink.on_event(&PlanEvent::StagesOrdered { stages: 2 });
//! assert_eq!(recorder.events().len(), 1);
//! ```

use crate::normalize::NormalizeSummary;
use crate::rewriter::RewritePhase;
use crate::validation::Diagnostic;
use log::{debug, trace, warn};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex};

/// Something the planner did.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum PlanEvent {
    /// A validation pass finished.
    Validated { diagnostics: usize },
    /// A rewriter ran.
    RewriterApplied {
        name: String,
        phase: RewritePhase,
        changed: bool,
    },
    /// The working graph was normalized.
    Normalized(NormalizeSummary),
    /// Blocks were carved out of the normalized graph.
    BlocksExtracted { map: usize, reduce: usize },
    /// Computation blocks reached their compaction fixed point.
    BlocksCompacted { remaining: usize, dropped: usize },
    /// Blocks were grouped into candidate stages.
    StageGroupsBuilt { groups: usize },
    /// Groups at equal critical-path distance were merged.
    StageGroupsMerged { before: usize, after: usize },
    /// Final stage numbers were assigned.
    StagesOrdered { stages: usize },
    /// A user-facing problem was found.
    Diagnostic(Diagnostic),
    /// A configuration value was not understood and its default was used.
    InvalidOption { key: String, value: String },
}

impl Display for PlanEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validated { diagnostics } => {
                write!(f, "validation finished with {diagnostics} diagnostic(s)")
            }
            Self::RewriterApplied {
                name,
                phase,
                changed,
            } => write!(f, "rewriter {name} ({phase:?}) changed graph: {changed}"),
            Self::Normalized(summary) => write!(f, "normalized graph: {summary}"),
            Self::BlocksExtracted { map, reduce } => {
                write!(f, "extracted {map} map block(s) and {reduce} reduce block(s)")
            }
            Self::BlocksCompacted { remaining, dropped } => {
                write!(f, "compacted blocks: {remaining} left, {dropped} dropped")
            }
            Self::StageGroupsBuilt { groups } => write!(f, "built {groups} stage group(s)"),
            Self::StageGroupsMerged { before, after } => {
                write!(f, "merged stage groups: {before} -> {after}")
            }
            Self::StagesOrdered { stages } => write!(f, "ordered {stages} stage(s)"),
            Self::Diagnostic(diagnostic) => write!(f, "{diagnostic}"),
            Self::InvalidOption { key, value } => {
                write!(f, "unknown value {value:?} for option {key}, using default")
            }
        }
    }
}

/// Receives planner events.
pub trait PlanObserver {
    fn on_event(&mut self, event: &PlanEvent);
}

/// Forwards events to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl PlanObserver for LogObserver {
    fn on_event(&mut self, event: &PlanEvent) {
        match event {
            PlanEvent::Diagnostic(_) | PlanEvent::InvalidOption { .. } => warn!("{event}"),
            PlanEvent::RewriterApplied { .. } | PlanEvent::BlocksCompacted { .. } => {
                trace!("{event}");
            }
            _ => debug!("{event}"),
        }
    }
}

/// Keeps every event in memory.
///
/// Clones share the same buffer, so a clone handed to the planner can be
/// inspected afterwards through the original.
#[derive(Clone, Debug, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<PlanEvent>>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the buffer's lock was poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<PlanEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl PlanObserver for RecordingObserver {
    fn on_event(&mut self, event: &PlanEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
