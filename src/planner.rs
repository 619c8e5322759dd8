//! Stage planner: turns a validated operator graph into a [`StageGraph`].
//!
//! The planner works on a private copy of the caller's graph and runs these
//! passes in order:
//!
//! 1. **Validate**: unconnected inputs, unconnected mandatory outputs and
//!    circuits are collected as [`Diagnostics`]; any diagnostic aborts.
//! 2. **Rewrite**: registered [`FlowGraphRewriter`]s run in phase order;
//!    if any of them changed the graph it is validated again.
//! 3. **Normalize**: see [`crate::normalize`].
//! 4. **Extract blocks**: one reduce block per shuffle boundary, one map
//!    block per stage-to-stage span and one per stage-to-shuffle span,
//!    plus the global input and output blocks.
//! 5. **Connect** blocks through the boundaries they were cut at.
//! 6. **Detach** every block and **compact** the computation blocks.
//! 7. **Group** blocks into stages, optionally **merge** stages at equal
//!    critical-path distance, and **compact** stages.
//! 8. **Order** stages topologically and number them from 1.
//!
//! Everything after normalization assumes a valid graph; broken invariants
//! there panic instead of producing diagnostics.

use crate::block::{Attached, Block, Wiring};
use crate::graph::FlowGraph;
use crate::node_id::{BlockId, BlockOutputId, InputId, NodeId, OutputId};
use crate::normalize::normalize;
use crate::ops;
use crate::options::{COMPRESS_FLOW_BLOCK_GROUP, PlannerOptions};
use crate::path::{Direction, Path};
use crate::rewriter::{FlowGraphRewriter, sort_rewriters};
use crate::stage::{Stage, StageGraph};
use crate::trace::{LogObserver, PlanEvent, PlanObserver};
use crate::validation::{Diagnostic, Diagnostics, validate};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{DfsPostOrder, VisitMap};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Plans a [`FlowGraph`] into a [`StageGraph`].
///
/// # Example
///
/// ```
/// use ironstage::planner::StagePlanner;
/// use ironstage::testing::word_count;
///
/// let graph = word_count()?;
/// let plan = StagePlanner::default().plan(&graph)?;
/// assert_eq!(plan.stages().len(), 1);
/// assert!(plan.stages()[0].has_reduce());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct StagePlanner {
    options: PlannerOptions,
    rewriters: Vec<Box<dyn FlowGraphRewriter>>,
    observer: Box<dyn PlanObserver>,
}

impl Default for StagePlanner {
    fn default() -> Self {
        Self::new(PlannerOptions::default())
    }
}

impl StagePlanner {
    #[must_use]
    pub fn new(options: PlannerOptions) -> Self {
        Self {
            options,
            rewriters: Vec::new(),
            observer: Box::new(LogObserver),
        }
    }

    /// Register a rewriter to run before normalization.
    #[must_use]
    pub fn with_rewriter<R: FlowGraphRewriter + 'static>(mut self, rewriter: R) -> Self {
        self.rewriters.push(Box::new(rewriter));
        self
    }

    /// Replace the default [`LogObserver`].
    #[must_use]
    pub fn with_observer<O: PlanObserver + 'static>(mut self, observer: O) -> Self {
        self.observer = Box::new(observer);
        self
    }

    #[must_use]
    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Plan `source`. The caller's graph is never modified.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic found if the graph is invalid or a rewriter
    /// fails.
    pub fn plan(&mut self, source: &FlowGraph) -> Result<StageGraph, Diagnostics> {
        let mut graph = source.clone();
        let mut diagnostics = Diagnostics::new();
        self.check(&mut graph, &mut diagnostics)?;
        self.rewrite(&mut graph, &mut diagnostics)?;

        let summary = normalize(&mut graph, self.options.flow_parts);
        self.observer.on_event(&PlanEvent::Normalized(summary));

        let compression = self.options.compression();
        if let Some(value) = compression.rejected {
            self.observer.on_event(&PlanEvent::InvalidOption {
                key: COMPRESS_FLOW_BLOCK_GROUP.to_string(),
                value,
            });
        }
        let assembly = Assembly {
            graph,
            wiring: Wiring::new(),
            observer: self.observer.as_mut(),
        };
        Ok(assembly.run(compression.enabled))
    }

    fn check(&mut self, graph: &mut FlowGraph, diagnostics: &mut Diagnostics) -> Result<(), Diagnostics> {
        let before = diagnostics.len();
        validate(graph, diagnostics);
        self.observer.on_event(&PlanEvent::Validated {
            diagnostics: diagnostics.len() - before,
        });
        if diagnostics.len() == before {
            return Ok(());
        }
        for diagnostic in diagnostics.iter().skip(before) {
            self.observer.on_event(&PlanEvent::Diagnostic(diagnostic.clone()));
        }
        Err(std::mem::take(diagnostics))
    }

    fn rewrite(&mut self, graph: &mut FlowGraph, diagnostics: &mut Diagnostics) -> Result<(), Diagnostics> {
        sort_rewriters(&mut self.rewriters);
        let mut changed = false;
        for rewriter in &mut self.rewriters {
            match rewriter.rewrite(graph) {
                Ok(c) => {
                    self.observer.on_event(&PlanEvent::RewriterApplied {
                        name: rewriter.name().to_string(),
                        phase: rewriter.phase(),
                        changed: c,
                    });
                    changed |= c;
                }
                Err(e) => {
                    let diagnostic = Diagnostic::new(
                        None,
                        Vec::new(),
                        format!("rewriter `{}` failed: {e:#}", rewriter.name()),
                    );
                    self.observer.on_event(&PlanEvent::Diagnostic(diagnostic.clone()));
                    diagnostics.push(diagnostic);
                    return Err(std::mem::take(diagnostics));
                }
            }
        }
        if changed {
            self.check(graph, diagnostics)?;
        }
        Ok(())
    }
}

/// Plan `graph` with default options.
///
/// # Errors
///
/// See [`StagePlanner::plan`].
pub fn build_plan(graph: &FlowGraph) -> Result<StageGraph, Diagnostics> {
    StagePlanner::default().plan(graph)
}

/// The structural half of planning, over a normalized working graph.
struct Assembly<'a> {
    graph: FlowGraph,
    wiring: Wiring,
    observer: &'a mut dyn PlanObserver,
}

impl Assembly<'_> {
    fn run(mut self, compress: bool) -> StageGraph {
        let (input, output, computation) = self.extract();
        self.connect(&input, &output, &computation);

        let originals: Vec<NodeId> = self.graph.all_nodes().map(|n| n.id()).collect();
        let input = input.detach(&mut self.graph, &mut self.wiring);
        let output = output.detach(&mut self.graph, &mut self.wiring);
        let mut blocks: Vec<Block> = computation
            .into_iter()
            .map(|b| b.detach(&mut self.graph, &mut self.wiring))
            .collect();
        for node in originals {
            self.graph.remove_node(node);
        }
        self.compact_blocks(&mut blocks);

        let mut stages = self.group(blocks);
        self.compact_stages(&mut stages);
        if compress {
            let before = stages.len();
            stages = self.merge(stages);
            self.observer.on_event(&PlanEvent::StageGroupsMerged {
                before,
                after: stages.len(),
            });
            self.compact_stages(&mut stages);
        }
        self.order(&mut stages);
        StageGraph::new(self.graph, self.wiring, input, output, stages)
    }

    /* ---------- extraction ---------- */

    fn extract(&mut self) -> (Block<Attached>, Block<Attached>, Vec<Block<Attached>>) {
        let graph = &self.graph;
        let nodes = ops::collect_nodes(graph, graph.scope());
        let (shuffles, stage_boundaries): (BTreeSet<NodeId>, BTreeSet<NodeId>) = ops::collect_boundaries(graph, &nodes)
            .into_iter()
            .partition(|n| ops::is_shuffle_boundary(graph, *n));

        let mut forward = BTreeMap::new();
        let mut backward = BTreeMap::new();
        for &b in shuffles.iter().chain(&stage_boundaries) {
            forward.insert(b, ops::boundary_path_forward(graph, &BTreeSet::from([b])));
            backward.insert(b, ops::boundary_path_backward(graph, &BTreeSet::from([b])));
        }

        // Non-boundary nodes no boundary can reach, such as empty sources.
        let reachable: BTreeSet<NodeId> = forward.values().flat_map(|p| p.passings().iter().copied()).collect();
        let free: BTreeSet<NodeId> = nodes
            .iter()
            .copied()
            .filter(|n| !ops::is_boundary(graph, *n) && !reachable.contains(n))
            .collect();
        let with_free_sources = |span: Path| -> Path {
            if free.is_empty() || span.passings().is_empty() {
                return span;
            }
            let sources: BTreeSet<NodeId> = ops::boundary_path_backward(graph, span.passings())
                .passings()
                .intersection(&free)
                .copied()
                .collect();
            span.union(&Path::new(Direction::Forward, BTreeSet::new(), sources, BTreeSet::new()))
        };

        let mut stage_spans = Vec::new();
        for &origin in &stage_boundaries {
            let fwd = &forward[&origin];
            let stage_arrivals: Vec<NodeId> = fwd
                .arrivals()
                .iter()
                .copied()
                .filter(|a| ops::is_stage_boundary(graph, *a))
                .collect();
            let reached: BTreeSet<NodeId> = fwd
                .arrivals()
                .iter()
                .flat_map(|a| backward[a].passings().iter().copied())
                .collect();
            let dangling: BTreeSet<NodeId> = fwd.passings().difference(&reached).copied().collect();
            let mut span = Path::new(
                Direction::Forward,
                BTreeSet::from([origin]),
                dead_end_span(graph, fwd, &dangling),
                BTreeSet::new(),
            );
            if let Some(back) = stage_arrivals
                .iter()
                .map(|a| backward[a].clone())
                .reduce(|a, b| a.union(&b))
            {
                span = fwd.transpose_intersect(&back).union(&span);
            }
            if !span.passings().is_empty() {
                stage_spans.push(with_free_sources(span));
            }
        }

        let mut shuffle_spans = Vec::new();
        for &shuffle in &shuffles {
            let back = &backward[&shuffle];
            let mut spans = Vec::new();
            for origin in back.arrivals() {
                if !ops::is_stage_boundary(graph, *origin) {
                    continue;
                }
                let span = forward[origin].transpose_intersect(back);
                if !span.passings().is_empty() {
                    spans.push(with_free_sources(span));
                }
            }
            shuffle_spans.extend(merge_overlapping(spans));
        }

        let mut blocks = Vec::new();
        let mut reduce = 0;
        for &shuffle in &shuffles {
            blocks.push(forward[&shuffle].create_block(graph, &mut self.wiring, true, false));
            reduce += 1;
        }
        for span in merge_overlapping(stage_spans).into_iter().chain(shuffle_spans) {
            blocks.push(span.create_block(graph, &mut self.wiring, false, false));
        }
        self.observer.on_event(&PlanEvent::BlocksExtracted {
            map: blocks.len() - reduce,
            reduce,
        });

        let inputs: BTreeSet<NodeId> = graph.global_inputs().iter().copied().collect();
        let input = Block::from_ports(
            graph,
            &mut self.wiring,
            inputs.clone(),
            BTreeSet::new(),
            inputs
                .iter()
                .flat_map(|n| graph.node(*n).outputs())
                .map(|p| (*p, graph.output(*p).connected().clone()))
                .collect(),
        );
        let outputs: BTreeSet<NodeId> = graph.global_outputs().iter().copied().collect();
        let output = Block::from_ports(
            graph,
            &mut self.wiring,
            outputs.clone(),
            outputs
                .iter()
                .flat_map(|n| graph.node(*n).inputs().iter().copied())
                .collect(),
            BTreeMap::new(),
        );
        (input, output, blocks)
    }

    /// Link every block input to the block outputs that feed it, looking
    /// through boundaries that no block wraps.
    fn connect(&mut self, input: &Block<Attached>, output: &Block<Attached>, blocks: &[Block<Attached>]) {
        let all: Vec<&Block<Attached>> = std::iter::once(input)
            .chain(blocks)
            .chain(std::iter::once(output))
            .collect();
        let mut producers: BTreeMap<OutputId, Vec<(BlockOutputId, &BTreeSet<InputId>)>> = BTreeMap::new();
        for block in &all {
            for &bo in block.outputs() {
                if let Some(targets) = block.targets(bo) {
                    producers
                        .entry(self.wiring.output(bo).port())
                        .or_default()
                        .push((bo, targets));
                }
            }
        }

        let mut links = Vec::new();
        for block in &all {
            for &bi in block.inputs() {
                let mut queue = vec![self.wiring.input(bi).port()];
                let mut visited = BTreeSet::new();
                while let Some(port) = queue.pop() {
                    if !visited.insert(port) {
                        continue;
                    }
                    for upstream in self.graph.input(port).connected() {
                        let found: Vec<_> = producers
                            .get(upstream)
                            .into_iter()
                            .flatten()
                            .filter(|(_, targets)| targets.contains(&port))
                            .map(|(bo, _)| *bo)
                            .collect();
                        if !found.is_empty() {
                            links.extend(found.into_iter().map(|bo| (bo, bi)));
                            continue;
                        }
                        let owner = self.graph.output(*upstream).owner();
                        if ops::is_boundary(&self.graph, owner) {
                            queue.extend(self.graph.node(owner).inputs().iter().copied());
                        }
                    }
                }
            }
        }
        for (upstream, downstream) in links {
            self.wiring.link(upstream, downstream);
        }
    }

    fn compact_blocks(&mut self, blocks: &mut Vec<Block>) {
        loop {
            let mut changed = false;
            for block in blocks.iter_mut() {
                changed |= block.compaction(&mut self.graph, &mut self.wiring);
            }
            if !changed {
                break;
            }
        }
        let before = blocks.len();
        blocks.retain(|b| !b.is_empty());
        self.observer.on_event(&PlanEvent::BlocksCompacted {
            remaining: blocks.len(),
            dropped: before - blocks.len(),
        });
    }

    /* ---------- stages ---------- */

    fn group(&mut self, blocks: Vec<Block>) -> Vec<Stage> {
        let (reduces, maps): (Vec<Block>, Vec<Block>) = blocks
            .into_iter()
            .partition(|b| b.is_reduce_block(&self.graph, &self.wiring));

        let mut map_blocks: BTreeMap<BlockId, Block> = BTreeMap::new();
        let mut stages = Vec::new();
        for block in maps {
            if block.is_succeeding_reduce_block(&self.graph, &self.wiring) {
                map_blocks.insert(block.id(), block);
            } else {
                stages.push(Stage::new(vec![block], Vec::new()));
            }
        }

        let mut groups: Vec<(BTreeSet<BlockId>, Vec<Block>)> = Vec::new();
        for block in reduces {
            let mut preds: BTreeSet<BlockId> = block
                .predecessors(&self.wiring)
                .into_iter()
                .filter(|b| map_blocks.contains_key(b))
                .collect();
            let mut members = vec![block];
            while let Some(pos) = groups.iter().position(|(p, _)| !p.is_disjoint(&preds)) {
                let (p, m) = groups.remove(pos);
                preds.extend(p);
                members.extend(m);
            }
            groups.push((preds, members));
        }
        for (preds, reduce_blocks) in groups {
            let maps = preds.iter().filter_map(|id| map_blocks.remove(id)).collect();
            stages.push(Stage::new(maps, reduce_blocks));
        }
        // Map blocks whose reduce successors were all compacted away.
        stages.extend(map_blocks.into_values().map(|b| Stage::new(vec![b], Vec::new())));

        self.observer.on_event(&PlanEvent::StageGroupsBuilt {
            groups: stages.len(),
        });
        stages
    }

    fn compact_stages(&mut self, stages: &mut Vec<Stage>) {
        loop {
            let mut changed = false;
            for stage in stages.iter_mut() {
                changed |= stage.compaction(&mut self.graph, &mut self.wiring);
            }
            if !changed {
                break;
            }
        }
        stages.retain(|s| !s.is_empty());
    }

    /// For each stage, the indices of the stages feeding it.
    fn stage_predecessors(&self, stages: &[Stage]) -> Vec<BTreeSet<usize>> {
        let owner: BTreeMap<BlockId, usize> = stages
            .iter()
            .enumerate()
            .flat_map(|(i, s)| s.blocks().map(move |b| (b.id(), i)))
            .collect();
        stages
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                stage
                    .predecessor_blocks(&self.wiring)
                    .iter()
                    .filter_map(|b| owner.get(b).copied())
                    .filter(|j| *j != i)
                    .collect()
            })
            .collect()
    }

    /// Critical-path distance of every stage: 0 for stages fed only by the
    /// global inputs, otherwise one more than the farthest predecessor.
    ///
    /// # Panics
    ///
    /// Panics if the stages depend on each other cyclically.
    fn distances(&self, stages: &[Stage]) -> Vec<usize> {
        let preds = self.stage_predecessors(stages);
        let mut distance: Vec<Option<usize>> = vec![None; stages.len()];
        let mut pending: VecDeque<usize> = (0..stages.len()).collect();
        let mut stalled = 0;
        while let Some(i) = pending.pop_front() {
            let known: Option<Vec<usize>> = preds[i].iter().map(|j| distance[*j]).collect();
            match known {
                Some(ds) => {
                    distance[i] = Some(ds.into_iter().max().map_or(0, |d| d + 1));
                    stalled = 0;
                }
                None => {
                    pending.push_back(i);
                    stalled += 1;
                    assert!(stalled <= pending.len(), "stage groups depend on each other cyclically");
                }
            }
        }
        distance.into_iter().flatten().collect()
    }

    /// Merge stages of the same kind at the same distance.
    fn merge(&mut self, stages: Vec<Stage>) -> Vec<Stage> {
        let distance = self.distances(&stages);
        let mut buckets: BTreeMap<(bool, usize), Vec<Stage>> = BTreeMap::new();
        for (stage, d) in stages.into_iter().zip(distance) {
            buckets.entry((stage.has_reduce(), d)).or_default().push(stage);
        }

        let mut merged = Vec::new();
        for (_, mut bucket) in buckets {
            if bucket.len() == 1 {
                merged.append(&mut bucket);
                continue;
            }
            let mut maps = Vec::new();
            let mut reduces = Vec::new();
            for stage in bucket {
                let (m, r) = stage.into_blocks();
                maps.extend(m);
                reduces.extend(r);
            }
            let maps = self.merge_blocks(maps).into_iter().collect();
            let reduces = self.merge_blocks(reduces).into_iter().collect();
            merged.push(Stage::new(maps, reduces));
        }
        merged
    }

    fn merge_blocks(&mut self, blocks: Vec<Block>) -> Option<Block> {
        if blocks.is_empty() {
            return None;
        }
        let (mut block, _) = Block::from_blocks(&self.graph, &mut self.wiring, blocks);
        block.unify(&mut self.graph, &mut self.wiring);
        block.compaction(&mut self.graph, &mut self.wiring);
        Some(block)
    }

    /// Number stages so that producers come before consumers.
    fn order(&mut self, stages: &mut [Stage]) {
        let preds = self.stage_predecessors(stages);
        let mut deps = DiGraphMap::<usize, ()>::new();
        for (i, ps) in preds.iter().enumerate() {
            deps.add_node(i);
            for &p in ps {
                deps.add_edge(i, p, ());
            }
        }

        let mut order = Vec::with_capacity(stages.len());
        let mut dfs = DfsPostOrder::empty(&deps);
        for i in 0..stages.len() {
            if dfs.discovered.is_visited(&i) {
                continue;
            }
            dfs.move_to(i);
            while let Some(next) = dfs.next(&deps) {
                order.push(next);
            }
        }
        for (number, i) in order.into_iter().enumerate() {
            stages[i].set_number(number + 1);
        }
        stages.sort_by_key(Stage::number);
        self.observer.on_event(&PlanEvent::StagesOrdered {
            stages: stages.len(),
        });
    }
}

/// Passing nodes of `fwd` needed to feed the nodes in `dangling`, which
/// reach no boundary at all.
fn dead_end_span(graph: &FlowGraph, fwd: &Path, dangling: &BTreeSet<NodeId>) -> BTreeSet<NodeId> {
    if dangling.is_empty() {
        return BTreeSet::new();
    }
    let feeding = ops::boundary_path_backward(graph, dangling);
    feeding
        .passings()
        .intersection(fwd.passings())
        .chain(dangling)
        .copied()
        .collect()
}

/// Union spans sharing any passing node, so that a node fed by several
/// boundaries ends up in one block with all of its inputs.
fn merge_overlapping(spans: Vec<Path>) -> Vec<Path> {
    let mut merged: Vec<Path> = Vec::new();
    for span in spans {
        let mut current = span;
        while let Some(pos) = merged
            .iter()
            .position(|p| !p.passings().is_disjoint(current.passings()))
        {
            current = merged.remove(pos).union(&current);
        }
        merged.push(current);
    }
    merged
}
