//! Normalization of the working graph before block extraction.
//!
//! After these passes every boundary is explicit: flow parts are gone,
//! global side effects are checkpointed, shuffles never feed each other,
//! and each hop from a stage boundary straight into another boundary
//! carries exactly one identity for the planner to build a block around.

use crate::graph::FlowGraph;
use crate::node::{Boundary, Scope};
use crate::node_id::{NodeId, OutputId};
use crate::options::FlowPartMode;
use crate::{ops, rewrite};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// What normalization did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub flow_parts_inlined: usize,
    pub checkpoints_inserted: usize,
    pub identities_inserted: usize,
    pub identities_split: usize,
    pub identities_removed: usize,
}

impl fmt::Display for NormalizeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} flow part(s) inlined, {} checkpoint(s), {} identit(ies) inserted, {} split, {} removed",
            self.flow_parts_inlined,
            self.checkpoints_inserted,
            self.identities_inserted,
            self.identities_split,
            self.identities_removed
        )
    }
}

/// Run every normalization pass over the root scope of `graph`.
pub fn normalize(graph: &mut FlowGraph, mode: FlowPartMode) -> NormalizeSummary {
    let mut summary = NormalizeSummary::default();
    let root = graph.scope().clone();
    let seam = match mode {
        FlowPartMode::Aggregate => Boundary::None,
        FlowPartMode::Segregate => Boundary::Stage,
    };
    inline_scope(graph, &root, seam, &mut summary);
    checkpoint_global_side_effects(graph, &mut summary);
    push_down_shuffle_checkpoints(graph, &mut summary);
    insert_boundary_identities(graph, &mut summary);
    split_identities(graph, &mut summary);
    reduce_identities(graph, &mut summary);
    summary
}

fn root_nodes(graph: &FlowGraph) -> BTreeSet<NodeId> {
    ops::collect_nodes(graph, graph.scope())
}

/// Inline flow parts innermost first.
fn inline_scope(graph: &mut FlowGraph, scope: &Scope, seam: Boundary, summary: &mut NormalizeSummary) {
    let nodes = ops::collect_nodes(graph, scope);
    for (part, inner) in ops::collect_flow_parts(graph, &nodes) {
        inline_scope(graph, &inner, seam, summary);
        rewrite::inline_flow_part(graph, part, seam);
        summary.flow_parts_inlined += 1;
    }
}

fn checkpoint_global_side_effects(graph: &mut FlowGraph, summary: &mut NormalizeSummary) {
    for node in root_nodes(graph) {
        if !ops::has_global_side_effect(graph, node) {
            continue;
        }
        for output in ops::connected_outputs(graph, node) {
            rewrite::insert_checkpoint(graph, output);
            summary.checkpoints_inserted += 1;
        }
    }
}

fn push_down_shuffle_checkpoints(graph: &mut FlowGraph, summary: &mut NormalizeSummary) {
    for node in root_nodes(graph) {
        if !ops::is_shuffle_boundary(graph, node) {
            continue;
        }
        for output in graph.node(node).outputs().to_vec() {
            push_down(graph, output, summary);
        }
    }
}

/// Follow single connections through push-down targets and checkpoint the
/// first output that fans out or reaches anything else.
fn push_down(graph: &mut FlowGraph, output: OutputId, summary: &mut NormalizeSummary) {
    let downstreams = graph.output(output).connected();
    if downstreams.is_empty() {
        return;
    }
    if let [only] = downstreams.iter().copied().collect::<Vec<_>>()[..] {
        let next = graph.input(only).owner();
        if ops::is_stage_boundary(graph, next) {
            return;
        }
        if ops::is_push_down_target(graph, next) {
            for out in graph.node(next).outputs().to_vec() {
                push_down(graph, out, summary);
            }
            return;
        }
    }
    rewrite::insert_checkpoint(graph, output);
    summary.checkpoints_inserted += 1;
}

fn insert_boundary_identities(graph: &mut FlowGraph, summary: &mut NormalizeSummary) {
    for node in root_nodes(graph) {
        if !ops::is_stage_boundary(graph, node) {
            continue;
        }
        for output in graph.node(node).outputs().to_vec() {
            let targets: Vec<_> = graph
                .output(output)
                .connected()
                .iter()
                .copied()
                .filter(|p| ops::is_boundary(graph, graph.input(*p).owner()))
                .collect();
            for input in targets {
                rewrite::insert_identity_between(graph, output, input);
                summary.identities_inserted += 1;
            }
        }
    }
}

fn split_identities(graph: &mut FlowGraph, summary: &mut NormalizeSummary) {
    loop {
        let mut changed = false;
        for node in root_nodes(graph) {
            if graph.contains(node) && ops::is_identity(graph, node) {
                let copies = rewrite::split_identity(graph, node);
                if !copies.is_empty() {
                    summary.identities_split += 1;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Keep only identities that are the whole content between a stage
/// boundary and the next boundary.
fn reduce_identities(graph: &mut FlowGraph, summary: &mut NormalizeSummary) {
    loop {
        let mut changed = false;
        for node in root_nodes(graph) {
            if !graph.contains(node) || !ops::is_identity(graph, node) {
                continue;
            }
            let preds = ops::predecessors(graph, node);
            let succs = ops::successors(graph, node);
            let keep = !preds.is_empty()
                && !succs.is_empty()
                && preds.iter().all(|p| ops::is_stage_boundary(graph, *p))
                && succs.iter().all(|s| ops::is_boundary(graph, *s));
            if !keep {
                rewrite::skip(graph, node);
                summary.identities_removed += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataType, NodeSpec, OperatorKind, PseudoKind};
    use anyhow::Result;

    #[test]
    fn shuffle_chain_gets_checkpoint_between() -> Result<()> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let shuffle = |name: &str| {
            NodeSpec::operator(name, OperatorKind::Fold)
                .boundary(Boundary::Shuffle)
                .input("in", t.clone())
                .output("out", t.clone())
        };
        let s1 = g.add_node(shuffle("s1"))?;
        let s2 = g.add_node(shuffle("s2"))?;
        let b = g.add_output("b", t.clone());
        g.connect_nodes(a, 0, s1, 0)?;
        g.connect_nodes(s1, 0, s2, 0)?;
        g.connect_nodes(s2, 0, b, 0)?;

        let summary = normalize(&mut g, FlowPartMode::Segregate);
        assert_eq!(summary.checkpoints_inserted, 1);
        let after_s1: Vec<_> = ops::successors(&g, s1).into_iter().collect();
        assert_eq!(after_s1.len(), 1);
        assert!(matches!(
            g.node(after_s1[0]).kind(),
            crate::node::NodeKind::Pseudo(PseudoKind::Checkpoint)
        ));
        Ok(())
    }

    #[test]
    fn direct_input_to_output_keeps_one_identity() {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let b = g.add_output("b", t);
        g.connect(g.first_output(a), g.first_input(b)).unwrap();

        let summary = normalize(&mut g, FlowPartMode::Segregate);
        assert_eq!(summary.identities_inserted, 1);
        let middle: Vec<_> = ops::successors(&g, a).into_iter().collect();
        assert_eq!(middle.len(), 1);
        assert!(ops::is_identity(&g, middle[0]));
        assert!(ops::successors(&g, middle[0]).contains(&b));
    }
}
