//! Pluggable graph rewriters run before normalization.
//!
//! Rewriters are applied to the planner's private copy of the source graph,
//! ordered by [`RewritePhase`] and then by name, so the outcome does not
//! depend on registration order.

use crate::graph::FlowGraph;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// When a rewriter runs relative to the others.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum RewritePhase {
    EarlyDebug,
    EarlyOptimize,
    LaterDebug,
    LaterOptimize,
}

/// A transformation over the working graph.
///
/// # Example
///
/// ```
/// use ironstage::graph::FlowGraph;
/// use ironstage::rewriter::{FlowGraphRewriter, RewritePhase};
///
/// struct Noop;
///
/// impl FlowGraphRewriter for Noop {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     fn phase(&self) -> RewritePhase {
///         RewritePhase::EarlyOptimize
///     }
///
///     fn rewrite(&mut self, _graph: &mut FlowGraph) -> anyhow::Result<bool> {
///         Ok(false)
///     }
/// }
/// ```
pub trait FlowGraphRewriter {
    fn name(&self) -> &str;

    fn phase(&self) -> RewritePhase;

    /// Rewrite `graph` in place and report whether anything changed.
    ///
    /// # Errors
    ///
    /// An error aborts planning and is reported as a diagnostic.
    fn rewrite(&mut self, graph: &mut FlowGraph) -> Result<bool>;
}

/// Sort rewriters into application order.
pub(crate) fn sort_rewriters(rewriters: &mut [Box<dyn FlowGraphRewriter>]) {
    rewriters.sort_by(|a, b| {
        a.phase()
            .cmp(&b.phase())
            .then_with(|| a.name().cmp(b.name()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, RewritePhase);

    impl FlowGraphRewriter for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn phase(&self) -> RewritePhase {
            self.1
        }

        fn rewrite(&mut self, _graph: &mut FlowGraph) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn phase_wins_over_name() {
        let mut rewriters: Vec<Box<dyn FlowGraphRewriter>> = vec![
            Box::new(Named("a", RewritePhase::LaterOptimize)),
            Box::new(Named("b", RewritePhase::EarlyDebug)),
            Box::new(Named("a", RewritePhase::EarlyDebug)),
        ];
        sort_rewriters(&mut rewriters);
        let order: Vec<_> = rewriters
            .iter()
            .map(|r| (r.phase(), r.name().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                (RewritePhase::EarlyDebug, "a".to_string()),
                (RewritePhase::EarlyDebug, "b".to_string()),
                (RewritePhase::LaterOptimize, "a".to_string()),
            ]
        );
    }
}
