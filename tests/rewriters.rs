use anyhow::{Result, bail};
use ironstage::testing::*;
use ironstage::*;
use std::sync::{Arc, Mutex};

/// Records the order rewriters ran in.
struct Probe {
    name: &'static str,
    phase: RewritePhase,
    seen: Arc<Mutex<Vec<&'static str>>>,
}

impl FlowGraphRewriter for Probe {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> RewritePhase {
        self.phase
    }

    fn rewrite(&mut self, _graph: &mut FlowGraph) -> Result<bool> {
        self.seen.lock().map_err(|e| anyhow::anyhow!("{e}"))?.push(self.name);
        Ok(false)
    }
}

struct Failing;

impl FlowGraphRewriter for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn phase(&self) -> RewritePhase {
        RewritePhase::LaterOptimize
    }

    fn rewrite(&mut self, _graph: &mut FlowGraph) -> Result<bool> {
        bail!("unsupported operator")
    }
}

/// Adds a map that nobody feeds; validation has to catch it again.
struct Breaking;

impl FlowGraphRewriter for Breaking {
    fn name(&self) -> &str {
        "breaking"
    }

    fn phase(&self) -> RewritePhase {
        RewritePhase::EarlyDebug
    }

    fn rewrite(&mut self, graph: &mut FlowGraph) -> Result<bool> {
        let t = DataType::new("WordCount");
        let orphan = graph.add_node(
            NodeSpec::operator("orphan", OperatorKind::Map)
                .input("in", t.clone())
                .output("out", t),
        )?;
        let Some(&counts) = graph.global_outputs().first() else {
            bail!("no global output");
        };
        graph.connect_nodes(orphan, 0, counts, 0)?;
        Ok(true)
    }
}

#[test]
fn rewriters_run_in_phase_then_name_order() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let probe = |name, phase| Probe {
        name,
        phase,
        seen: Arc::clone(&seen),
    };
    let mut planner = StagePlanner::default()
        .with_rewriter(probe("zeta", RewritePhase::EarlyDebug))
        .with_rewriter(probe("late", RewritePhase::LaterOptimize))
        .with_rewriter(probe("alpha", RewritePhase::EarlyDebug))
        .with_rewriter(probe("mid", RewritePhase::EarlyOptimize));
    planner.plan(&word_count()?)?;

    let order = seen.lock().map_err(|e| anyhow::anyhow!("{e}"))?.clone();
    assert_eq!(order, vec!["alpha", "zeta", "mid", "late"]);
    Ok(())
}

#[test]
fn failing_rewriter_becomes_a_diagnostic() -> Result<()> {
    let mut planner = StagePlanner::default().with_rewriter(Failing);
    let Err(diagnostics) = planner.plan(&word_count()?) else {
        panic!("planning should fail");
    };
    assert_eq!(diagnostics.len(), 1);
    let message = &diagnostics.as_slice()[0].message;
    assert!(message.contains("`failing`"));
    assert!(message.contains("unsupported operator"));
    Ok(())
}

#[test]
fn changed_graph_is_validated_again() -> Result<()> {
    let recorder = RecordingObserver::new();
    let mut planner = StagePlanner::default()
        .with_rewriter(Breaking)
        .with_observer(recorder.clone());
    let Err(diagnostics) = planner.plan(&word_count()?) else {
        panic!("planning should fail");
    };
    assert!(diagnostics.to_string().contains("`orphan`"));

    let validations = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, PlanEvent::Validated { .. }))
        .count();
    assert_eq!(validations, 2);
    Ok(())
}

#[test]
fn unchanged_graph_is_not_validated_again() -> Result<()> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let planner = StagePlanner::default().with_rewriter(Probe {
        name: "noop",
        phase: RewritePhase::LaterDebug,
        seen,
    });
    let (_, events) = plan_with_trace(planner, &word_count()?)?;
    let validations = events
        .iter()
        .filter(|e| matches!(e, PlanEvent::Validated { .. }))
        .count();
    assert_eq!(validations, 1);
    assert!(events.contains(&PlanEvent::RewriterApplied {
        name: "noop".to_string(),
        phase: RewritePhase::LaterDebug,
        changed: false,
    }));
    Ok(())
}
