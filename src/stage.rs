//! Stages and the final stage graph.
//!
//! A [`Stage`] is one unit of execution: a set of map blocks and, when the
//! stage shuffles, the reduce blocks fed by them. A [`StageGraph`] is the
//! planner's terminal artifact; it owns the arena holding every block's
//! private nodes, the block-port wiring, the global input and output blocks
//! and the ordered stage list.

use crate::block::{Block, Wiring};
use crate::graph::FlowGraph;
use crate::node_id::BlockId;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Map blocks plus the (possibly empty) reduce blocks they shuffle into.
#[derive(Debug)]
pub struct Stage {
    map_blocks: Vec<Block>,
    reduce_blocks: Vec<Block>,
    number: Option<usize>,
}

impl Stage {
    #[must_use]
    pub fn new(map_blocks: Vec<Block>, reduce_blocks: Vec<Block>) -> Self {
        Self {
            map_blocks,
            reduce_blocks,
            number: None,
        }
    }

    #[must_use]
    pub fn map_blocks(&self) -> &[Block] {
        &self.map_blocks
    }

    #[must_use]
    pub fn reduce_blocks(&self) -> &[Block] {
        &self.reduce_blocks
    }

    /// Map blocks followed by reduce blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.map_blocks.iter().chain(&self.reduce_blocks)
    }

    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks().any(|b| b.id() == block)
    }

    #[must_use]
    pub fn has_reduce(&self) -> bool {
        !self.reduce_blocks.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reduce_blocks.is_empty() && self.map_blocks.iter().all(Block::is_empty)
    }

    /// The 1-based position of this stage in execution order.
    ///
    /// # Panics
    ///
    /// Panics if stages have not been ordered yet.
    #[must_use]
    pub fn number(&self) -> usize {
        match self.number {
            Some(n) => n,
            None => panic!("stage number has not been assigned yet"),
        }
    }

    #[must_use]
    pub fn try_number(&self) -> Option<usize> {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        assert!(
            self.number.is_none(),
            "stage number is already assigned ({:?})",
            self.number
        );
        self.number = Some(number);
    }

    /// Blocks of other stages feeding this one.
    #[must_use]
    pub fn predecessor_blocks(&self, wiring: &Wiring) -> BTreeSet<BlockId> {
        self.blocks()
            .flat_map(|b| b.predecessors(wiring))
            .filter(|b| !self.contains(*b))
            .collect()
    }

    pub(crate) fn into_blocks(self) -> (Vec<Block>, Vec<Block>) {
        (self.map_blocks, self.reduce_blocks)
    }

    /// Bypass identity-only paths through map blocks and drop blocks that
    /// end up empty. Stages with reduce blocks are left untouched.
    ///
    /// Returns whether anything changed.
    pub fn compaction(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        if self.has_reduce() {
            return false;
        }
        let mut changed = false;
        loop {
            let mut round = false;
            for block in &mut self.map_blocks {
                round |= block.bypass_identities(graph, wiring);
            }
            let before = self.map_blocks.len();
            self.map_blocks.retain(|b| !b.is_empty());
            round |= self.map_blocks.len() != before;
            if !round {
                break;
            }
            changed = true;
        }
        changed
    }
}

/// The planner's result.
#[derive(Debug)]
pub struct StageGraph {
    graph: FlowGraph,
    wiring: Wiring,
    input: Block,
    output: Block,
    stages: Vec<Stage>,
}

impl StageGraph {
    pub(crate) fn new(
        graph: FlowGraph,
        wiring: Wiring,
        input: Block,
        output: Block,
        stages: Vec<Stage>,
    ) -> Self {
        Self {
            graph,
            wiring,
            input,
            output,
            stages,
        }
    }

    /// Arena holding the private nodes of every block.
    #[must_use]
    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    #[must_use]
    pub fn wiring(&self) -> &Wiring {
        &self.wiring
    }

    /// Block wrapping the declared global inputs.
    #[must_use]
    pub fn input(&self) -> &Block {
        &self.input
    }

    /// Block wrapping the declared global outputs.
    #[must_use]
    pub fn output(&self) -> &Block {
        &self.output
    }

    /// Stages sorted by stage number.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Every block of the plan: input, stage blocks in order, output.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        std::iter::once(&self.input)
            .chain(self.stages.iter().flat_map(Stage::blocks))
            .chain(std::iter::once(&self.output))
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks().find(|b| b.id() == id)
    }

    /// Stage containing `block`, or `None` for the global blocks.
    #[must_use]
    pub fn stage_of(&self, block: BlockId) -> Option<&Stage> {
        self.stages.iter().find(|s| s.contains(block))
    }

    /// Summarize the plan for humans and tools.
    #[must_use]
    pub fn explain(&self) -> StageGraphExplanation {
        let summarize = |block: &Block| BlockSummary {
            id: block.id().to_string(),
            nodes: block
                .nodes()
                .iter()
                .map(|n| self.graph.node(*n).name().to_string())
                .collect(),
            inputs: block.inputs().len(),
            outputs: block.outputs().len(),
            upstream: block
                .predecessors(&self.wiring)
                .iter()
                .map(ToString::to_string)
                .collect(),
            downstream: block
                .successors(&self.wiring)
                .iter()
                .map(ToString::to_string)
                .collect(),
        };
        StageGraphExplanation {
            input: summarize(&self.input),
            output: summarize(&self.output),
            stages: self
                .stages
                .iter()
                .map(|s| StageSummary {
                    number: s.number(),
                    map_blocks: s.map_blocks().iter().map(summarize).collect(),
                    reduce_blocks: s.reduce_blocks().iter().map(summarize).collect(),
                })
                .collect(),
            links: self.wiring.links().count(),
        }
    }
}

/// One block in a [`StageGraphExplanation`].
#[derive(Clone, Debug, Serialize)]
pub struct BlockSummary {
    pub id: String,
    /// Names of the block's nodes, in creation order.
    pub nodes: Vec<String>,
    pub inputs: usize,
    pub outputs: usize,
    pub upstream: Vec<String>,
    pub downstream: Vec<String>,
}

/// One stage in a [`StageGraphExplanation`].
#[derive(Clone, Debug, Serialize)]
pub struct StageSummary {
    pub number: usize,
    pub map_blocks: Vec<BlockSummary>,
    pub reduce_blocks: Vec<BlockSummary>,
}

/// Report produced by [`StageGraph::explain`].
#[derive(Clone, Debug, Serialize)]
pub struct StageGraphExplanation {
    pub input: BlockSummary,
    pub output: BlockSummary,
    pub stages: Vec<StageSummary>,
    /// Number of block-level links in the whole plan.
    pub links: usize,
}

impl StageGraphExplanation {
    /// Render the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be created or written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json()?.as_bytes())?;
        Ok(())
    }
}

fn write_block(f: &mut Formatter<'_>, label: &str, block: &BlockSummary) -> FormatResult {
    writeln!(f, "│ {label} {} [{}]", block.id, block.nodes.join(", "))?;
    writeln!(
        f,
        "│   ports: {} in / {} out",
        block.inputs, block.outputs
    )?;
    if !block.upstream.is_empty() {
        writeln!(f, "│   from:  {}", block.upstream.join(", "))?;
    }
    if !block.downstream.is_empty() {
        writeln!(f, "│   to:    {}", block.downstream.join(", "))?;
    }
    Ok(())
}

impl Display for StageGraphExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "╔═══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(
            f,
            "║                    STAGE PLAN EXPLANATION                     ║"
        )?;
        writeln!(
            f,
            "╚═══════════════════════════════════════════════════════════════╝"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ SUMMARY ────────────────────────────────────────────────────┐"
        )?;
        let reduces = self.stages.iter().filter(|s| !s.reduce_blocks.is_empty()).count();
        writeln!(f, "│ Stages:            {:>10}", self.stages.len())?;
        writeln!(f, "│ Shuffle Stages:    {reduces:>10}")?;
        writeln!(f, "│ Block Links:       {:>10}", self.links)?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ STAGES ─────────────────────────────────────────────────────┐"
        )?;
        write_block(f, "Input", &self.input)?;
        for stage in &self.stages {
            let marker = if stage.reduce_blocks.is_empty() {
                ""
            } else {
                " [SHUFFLE]"
            };
            writeln!(f, "│")?;
            writeln!(f, "│ Stage {}{marker}", stage.number)?;
            for block in &stage.map_blocks {
                write_block(f, "  Map", block)?;
            }
            for block in &stage.reduce_blocks {
                write_block(f, "  Reduce", block)?;
            }
        }
        writeln!(f, "│")?;
        write_block(f, "Output", &self.output)?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "not been assigned")]
    fn reading_unassigned_number_panics() {
        let _ = Stage::new(Vec::new(), Vec::new()).number();
    }

    #[test]
    fn stage_without_blocks_is_empty() {
        let mut stage = Stage::new(Vec::new(), Vec::new());
        assert!(stage.is_empty());
        stage.set_number(3);
        assert_eq!(stage.number(), 3);
    }
}
