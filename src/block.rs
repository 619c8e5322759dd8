//! Blocks: self-contained regions of the graph with explicit boundary ports.
//!
//! A block starts out [`Attached`]: its node set is a selection of nodes of
//! the planner's working graph, shared with whatever else refers to them.
//! [`Block::detach`] deep-copies that selection, repoints the block ports at
//! the copies and returns a [`Detached`] block that exclusively owns its
//! nodes. Operations that assume isolation (compaction, unification,
//! merging) only exist on `Block<Detached>`.
//!
//! Block-level ports and the links between them live in a shared [`Wiring`]
//! table, so rewiring two blocks never needs both of them borrowed at once.

use crate::graph::FlowGraph;
use crate::node::{NodeKind, PseudoKind};
use crate::node_id::{BlockId, BlockInputId, BlockOutputId, IdGen, InputId, NodeId, OutputId};
use crate::ops;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Lifecycle state of a [`Block`].
pub trait BlockState: sealed::Sealed {}

/// The block's nodes still belong to the working graph.
#[derive(Clone, Copy, Debug)]
pub struct Attached;

/// The block exclusively owns private copies of its nodes.
#[derive(Clone, Copy, Debug)]
pub struct Detached;

impl sealed::Sealed for Attached {}
impl sealed::Sealed for Detached {}
impl BlockState for Attached {}
impl BlockState for Detached {}

/// A block-level input: one node input port plus the block outputs feeding it.
#[derive(Clone, Debug)]
pub struct BlockInput {
    block: BlockId,
    port: InputId,
    links: BTreeSet<BlockOutputId>,
}

impl BlockInput {
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    #[must_use]
    pub fn port(&self) -> InputId {
        self.port
    }

    #[must_use]
    pub fn links(&self) -> &BTreeSet<BlockOutputId> {
        &self.links
    }
}

/// A block-level output: one node output port plus the block inputs it feeds.
#[derive(Clone, Debug)]
pub struct BlockOutput {
    block: BlockId,
    port: OutputId,
    links: BTreeSet<BlockInputId>,
}

impl BlockOutput {
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    #[must_use]
    pub fn port(&self) -> OutputId {
        self.port
    }

    #[must_use]
    pub fn links(&self) -> &BTreeSet<BlockInputId> {
        &self.links
    }
}

/// Table of block ports and the links between them.
#[derive(Clone, Debug, Default)]
pub struct Wiring {
    ids: IdGen,
    inputs: BTreeMap<BlockInputId, BlockInput>,
    outputs: BTreeMap<BlockOutputId, BlockOutput>,
}

impl Wiring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the port was removed.
    #[must_use]
    pub fn input(&self, id: BlockInputId) -> &BlockInput {
        match self.inputs.get(&id) {
            Some(port) => port,
            None => panic!("block input {id} is not wired"),
        }
    }

    /// # Panics
    ///
    /// Panics if the port was removed.
    #[must_use]
    pub fn output(&self, id: BlockOutputId) -> &BlockOutput {
        match self.outputs.get(&id) {
            Some(port) => port,
            None => panic!("block output {id} is not wired"),
        }
    }

    #[must_use]
    pub fn contains_input(&self, id: BlockInputId) -> bool {
        self.inputs.contains_key(&id)
    }

    #[must_use]
    pub fn contains_output(&self, id: BlockOutputId) -> bool {
        self.outputs.contains_key(&id)
    }

    /// Every block-level link, ordered by upstream port.
    pub fn links(&self) -> impl Iterator<Item = (BlockOutputId, BlockInputId)> + '_ {
        self.outputs
            .iter()
            .flat_map(|(id, port)| port.links.iter().map(move |d| (*id, *d)))
    }

    pub(crate) fn new_block_id(&mut self) -> BlockId {
        self.ids.block()
    }

    pub(crate) fn add_input(&mut self, block: BlockId, port: InputId) -> BlockInputId {
        let id = self.ids.block_input();
        self.inputs.insert(
            id,
            BlockInput {
                block,
                port,
                links: BTreeSet::new(),
            },
        );
        id
    }

    pub(crate) fn add_output(&mut self, block: BlockId, port: OutputId) -> BlockOutputId {
        let id = self.ids.block_output();
        self.outputs.insert(
            id,
            BlockOutput {
                block,
                port,
                links: BTreeSet::new(),
            },
        );
        id
    }

    pub(crate) fn link(&mut self, upstream: BlockOutputId, downstream: BlockInputId) {
        match self.outputs.get_mut(&upstream) {
            Some(port) => port.links.insert(downstream),
            None => panic!("block output {upstream} is not wired"),
        };
        match self.inputs.get_mut(&downstream) {
            Some(port) => port.links.insert(upstream),
            None => panic!("block input {downstream} is not wired"),
        };
    }

    pub(crate) fn remove_input(&mut self, id: BlockInputId) {
        if let Some(port) = self.inputs.remove(&id) {
            for upstream in port.links {
                if let Some(up) = self.outputs.get_mut(&upstream) {
                    up.links.remove(&id);
                }
            }
        }
    }

    pub(crate) fn remove_output(&mut self, id: BlockOutputId) {
        if let Some(port) = self.outputs.remove(&id) {
            for downstream in port.links {
                if let Some(down) = self.inputs.get_mut(&downstream) {
                    down.links.remove(&id);
                }
            }
        }
    }

    fn repoint_input(&mut self, id: BlockInputId, port: InputId) {
        if let Some(p) = self.inputs.get_mut(&id) {
            p.port = port;
        }
    }

    fn repoint_output(&mut self, id: BlockOutputId, port: OutputId) {
        if let Some(p) = self.outputs.get_mut(&id) {
            p.port = port;
        }
    }
}

/// Old-to-new block port mapping produced by [`Block::from_blocks`].
#[derive(Clone, Debug, Default)]
pub struct PortMapping {
    pub inputs: BTreeMap<BlockInputId, BlockInputId>,
    pub outputs: BTreeMap<BlockOutputId, BlockOutputId>,
}

/// A region of the graph with explicit block-level inputs and outputs.
#[derive(Debug)]
pub struct Block<S: BlockState = Detached> {
    id: BlockId,
    nodes: BTreeSet<NodeId>,
    inputs: Vec<BlockInputId>,
    outputs: Vec<BlockOutputId>,
    origins: BTreeMap<NodeId, NodeId>,
    targets: BTreeMap<BlockOutputId, BTreeSet<InputId>>,
    state: PhantomData<S>,
}

impl<S: BlockState> Block<S> {
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[must_use]
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    #[must_use]
    pub fn inputs(&self) -> &[BlockInputId] {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &[BlockOutputId] {
        &self.outputs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the block runs on the reduce side of a shuffle.
    ///
    /// Decided by the owner of the first block input's port; construction
    /// guarantees all block inputs agree.
    #[must_use]
    pub fn is_reduce_block(&self, graph: &FlowGraph, wiring: &Wiring) -> bool {
        self.inputs.first().is_some_and(|bi| {
            let port = wiring.input(*bi).port;
            ops::is_shuffle_boundary(graph, graph.input(port).owner())
        })
    }

    fn block_inputs_of(&self, wiring: &Wiring, port: InputId) -> Vec<BlockInputId> {
        self.inputs
            .iter()
            .copied()
            .filter(|bi| wiring.input(*bi).port == port)
            .collect()
    }

    fn block_outputs_of(&self, wiring: &Wiring, port: OutputId) -> Vec<BlockOutputId> {
        self.outputs
            .iter()
            .copied()
            .filter(|bo| wiring.output(*bo).port == port)
            .collect()
    }
}

fn check_uniform_inputs(graph: &FlowGraph, inputs: &BTreeSet<InputId>) {
    let shuffled = inputs
        .iter()
        .filter(|p| ops::is_shuffle_boundary(graph, graph.input(**p).owner()))
        .count();
    assert!(
        shuffled == 0 || shuffled == inputs.len(),
        "block inputs mix shuffle and non-shuffle destinations: {inputs:?}"
    );
}

impl Block<Attached> {
    /// Build a block over `nodes` with the given boundary ports.
    ///
    /// Each output is paired with the downstream input ports it is meant to
    /// feed. A node shared by several blocks has its output wrapped by each
    /// of them, and the targets tell the planner which of those block
    /// outputs to link when it connects the blocks.
    ///
    /// # Panics
    ///
    /// Panics if some inputs belong to shuffle boundaries and others do not.
    pub fn from_ports(
        graph: &FlowGraph,
        wiring: &mut Wiring,
        nodes: BTreeSet<NodeId>,
        inputs: BTreeSet<InputId>,
        outputs: BTreeMap<OutputId, BTreeSet<InputId>>,
    ) -> Self {
        check_uniform_inputs(graph, &inputs);
        let id = wiring.new_block_id();
        let inputs = inputs.into_iter().map(|p| wiring.add_input(id, p)).collect();
        let mut targets = BTreeMap::new();
        let mut ports = Vec::with_capacity(outputs.len());
        for (port, downstreams) in outputs {
            let bo = wiring.add_output(id, port);
            targets.insert(bo, downstreams);
            ports.push(bo);
        }
        Self {
            id,
            nodes,
            inputs,
            outputs: ports,
            origins: BTreeMap::new(),
            targets,
            state: PhantomData,
        }
    }

    /// Downstream input ports a block output was created to feed.
    #[must_use]
    pub fn targets(&self, output: BlockOutputId) -> Option<&BTreeSet<InputId>> {
        self.targets.get(&output)
    }

    /// Copy the block's nodes and repoint its ports at the copies.
    ///
    /// Block-level links are kept; only the node ports they wrap change.
    ///
    /// # Panics
    ///
    /// Panics if a block port wraps a port of a node outside the block.
    pub fn detach(self, graph: &mut FlowGraph, wiring: &mut Wiring) -> Block<Detached> {
        let copy = ops::deep_copy(graph, &self.nodes);
        for &bi in &self.inputs {
            let port = wiring.input(bi).port;
            match copy.inputs.get(&port) {
                Some(new) => wiring.repoint_input(bi, *new),
                None => panic!("block input {bi} wraps {port} outside of block {}", self.id),
            }
        }
        for &bo in &self.outputs {
            let port = wiring.output(bo).port;
            match copy.outputs.get(&port) {
                Some(new) => wiring.repoint_output(bo, *new),
                None => panic!("block output {bo} wraps {port} outside of block {}", self.id),
            }
        }
        Block {
            id: self.id,
            nodes: copy.nodes.values().copied().collect(),
            inputs: self.inputs,
            outputs: self.outputs,
            origins: copy.nodes.iter().map(|(old, new)| (*new, *old)).collect(),
            targets: BTreeMap::new(),
            state: PhantomData,
        }
    }
}

impl Block<Detached> {
    /// Original working-graph node of each copied node.
    #[must_use]
    pub fn origins(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.origins
    }

    /// Merge detached blocks into one.
    ///
    /// Each old block port gets a fresh counterpart on the merged block;
    /// links to ports outside the merged set are carried over and links
    /// between merged blocks are remapped on both ends. The old ports are
    /// dropped from the wiring.
    ///
    /// # Panics
    ///
    /// Panics on an empty list or when map and reduce blocks are mixed.
    pub fn from_blocks(
        graph: &FlowGraph,
        wiring: &mut Wiring,
        blocks: Vec<Block<Detached>>,
    ) -> (Block<Detached>, PortMapping) {
        assert!(!blocks.is_empty(), "nothing to merge");
        let kinds: BTreeSet<bool> = blocks
            .iter()
            .filter(|b| !b.inputs.is_empty())
            .map(|b| b.is_reduce_block(graph, wiring))
            .collect();
        assert!(kinds.len() <= 1, "cannot merge map blocks with reduce blocks");

        let id = wiring.new_block_id();
        let mut mapping = PortMapping::default();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for block in &blocks {
            for &old in &block.inputs {
                let new = wiring.add_input(id, wiring.input(old).port);
                mapping.inputs.insert(old, new);
                inputs.push(new);
            }
            for &old in &block.outputs {
                let new = wiring.add_output(id, wiring.output(old).port);
                mapping.outputs.insert(old, new);
                outputs.push(new);
            }
        }
        for (&old, &new) in &mapping.inputs {
            let upstreams: Vec<_> = wiring.input(old).links.iter().copied().collect();
            for upstream in upstreams {
                let upstream = mapping.outputs.get(&upstream).copied().unwrap_or(upstream);
                wiring.link(upstream, new);
            }
        }
        for (&old, &new) in &mapping.outputs {
            let downstreams: Vec<_> = wiring.output(old).links.iter().copied().collect();
            for downstream in downstreams {
                if !mapping.inputs.contains_key(&downstream) {
                    wiring.link(new, downstream);
                }
            }
        }
        for old in mapping.inputs.keys() {
            wiring.remove_input(*old);
        }
        for old in mapping.outputs.keys() {
            wiring.remove_output(*old);
        }

        let mut nodes = BTreeSet::new();
        let mut origins = BTreeMap::new();
        for block in blocks {
            nodes.extend(block.nodes);
            origins.extend(block.origins);
        }
        let merged = Block {
            id,
            nodes,
            inputs,
            outputs,
            origins,
            targets: BTreeMap::new(),
            state: PhantomData,
        };
        (merged, mapping)
    }

    /// Blocks feeding this block.
    #[must_use]
    pub fn predecessors(&self, wiring: &Wiring) -> BTreeSet<BlockId> {
        self.inputs
            .iter()
            .flat_map(|bi| wiring.input(*bi).links.iter())
            .map(|bo| wiring.output(*bo).block)
            .collect()
    }

    /// Blocks fed by this block.
    #[must_use]
    pub fn successors(&self, wiring: &Wiring) -> BTreeSet<BlockId> {
        self.outputs
            .iter()
            .flat_map(|bo| wiring.output(*bo).links.iter())
            .map(|bi| wiring.input(*bi).block)
            .collect()
    }

    /// Whether any block fed by this one is a reduce block.
    #[must_use]
    pub fn is_succeeding_reduce_block(&self, graph: &FlowGraph, wiring: &Wiring) -> bool {
        self.outputs
            .iter()
            .flat_map(|bo| wiring.output(*bo).links.iter())
            .any(|bi| ops::is_shuffle_boundary(graph, graph.input(wiring.input(*bi).port).owner()))
    }

    /* ---------- compaction ---------- */

    /// Eliminate dead nodes and redundant block ports until nothing changes.
    ///
    /// Returns whether anything was removed or merged. A second call right
    /// after the first always returns `false`.
    pub fn compaction(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        let mut changed = false;
        loop {
            let mut round = false;
            round |= self.merge_redundant_inputs(wiring);
            round |= self.merge_redundant_outputs(wiring);
            round |= self.remove_unlinked_ports(wiring);
            round |= self.remove_dead_nodes(graph, wiring);
            round |= self.remove_orphan_ports(graph, wiring);
            round |= self.merge_identity(graph, wiring);
            if !round {
                break;
            }
            changed = true;
        }
        if changed {
            self.remove_disconnected_nodes(graph, wiring);
        }
        changed
    }

    fn merge_redundant_inputs(&mut self, wiring: &mut Wiring) -> bool {
        let mut first = BTreeMap::<InputId, BlockInputId>::new();
        let mut changed = false;
        for bi in self.inputs.clone() {
            let port = wiring.input(bi).port;
            let Some(&keep) = first.get(&port) else {
                first.insert(port, bi);
                continue;
            };
            let upstreams: Vec<_> = wiring.input(bi).links.iter().copied().collect();
            for upstream in upstreams {
                wiring.link(upstream, keep);
            }
            self.remove_input_port(wiring, bi);
            changed = true;
        }
        changed
    }

    fn merge_redundant_outputs(&mut self, wiring: &mut Wiring) -> bool {
        let mut first = BTreeMap::<OutputId, BlockOutputId>::new();
        let mut changed = false;
        for bo in self.outputs.clone() {
            let port = wiring.output(bo).port;
            let Some(&keep) = first.get(&port) else {
                first.insert(port, bo);
                continue;
            };
            let downstreams: Vec<_> = wiring.output(bo).links.iter().copied().collect();
            for downstream in downstreams {
                wiring.link(keep, downstream);
            }
            self.remove_output_port(wiring, bo);
            changed = true;
        }
        changed
    }

    fn remove_unlinked_ports(&mut self, wiring: &mut Wiring) -> bool {
        let dead_inputs: Vec<_> = self
            .inputs
            .iter()
            .copied()
            .filter(|bi| wiring.input(*bi).links.is_empty())
            .collect();
        let dead_outputs: Vec<_> = self
            .outputs
            .iter()
            .copied()
            .filter(|bo| wiring.output(*bo).links.is_empty())
            .collect();
        let changed = !dead_inputs.is_empty() || !dead_outputs.is_empty();
        for bi in dead_inputs {
            self.remove_input_port(wiring, bi);
        }
        for bo in dead_outputs {
            self.remove_output_port(wiring, bo);
        }
        changed
    }

    fn referenced_ports(&self, wiring: &Wiring) -> (BTreeSet<InputId>, BTreeSet<OutputId>) {
        (
            self.inputs.iter().map(|bi| wiring.input(*bi).port).collect(),
            self.outputs.iter().map(|bo| wiring.output(*bo).port).collect(),
        )
    }

    fn remove_dead_nodes(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        let mut changed = false;
        let mut queue: VecDeque<NodeId> = self.nodes.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if !self.nodes.contains(&node) || ops::is_boundary(graph, node) {
                continue;
            }
            let (used_in, used_out) = self.referenced_ports(wiring);
            let n = graph.node(node);
            let dead_input = if n.inputs().is_empty() {
                matches!(n.kind(), NodeKind::Pseudo(PseudoKind::Empty))
            } else {
                n.inputs()
                    .iter()
                    .all(|p| graph.input(*p).connected().is_empty() && !used_in.contains(p))
            };
            let dead_output = !ops::has_mandatory_side_effect(graph, node)
                && n.outputs()
                    .iter()
                    .all(|p| graph.output(*p).connected().is_empty() && !used_out.contains(p));
            if dead_input {
                let next = ops::successors(graph, node);
                self.remove_node(graph, wiring, node);
                queue.extend(next);
                changed = true;
            } else if dead_output {
                let prev = ops::predecessors(graph, node);
                self.remove_node(graph, wiring, node);
                queue.extend(prev);
                changed = true;
            }
        }
        changed
    }

    fn remove_orphan_ports(&mut self, graph: &FlowGraph, wiring: &mut Wiring) -> bool {
        let orphan_inputs: Vec<_> = self
            .inputs
            .iter()
            .copied()
            .filter(|bi| {
                graph
                    .try_input(wiring.input(*bi).port)
                    .is_none_or(|p| !self.nodes.contains(&p.owner()))
            })
            .collect();
        let orphan_outputs: Vec<_> = self
            .outputs
            .iter()
            .copied()
            .filter(|bo| {
                graph
                    .try_output(wiring.output(*bo).port)
                    .is_none_or(|p| !self.nodes.contains(&p.owner()))
            })
            .collect();
        let changed = !orphan_inputs.is_empty() || !orphan_outputs.is_empty();
        for bi in orphan_inputs {
            self.remove_input_port(wiring, bi);
        }
        for bo in orphan_outputs {
            self.remove_output_port(wiring, bo);
        }
        changed
    }

    /// Collapse identities fed only from outside the block that feed exactly
    /// the same set of downstream inputs into one identity.
    fn merge_identity(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        let mut groups: Vec<(BTreeSet<InputId>, Vec<NodeId>)> = Vec::new();
        for &node in &self.nodes {
            if !ops::is_identity(graph, node) {
                continue;
            }
            let (pin, pout) = (graph.first_input(node), graph.first_output(node));
            if !graph.input(pin).connected().is_empty()
                || self.block_inputs_of(wiring, pin).is_empty()
                || !self.block_outputs_of(wiring, pout).is_empty()
            {
                continue;
            }
            let downstreams = graph.output(pout).connected().clone();
            if downstreams.is_empty() {
                continue;
            }
            match groups.iter_mut().find(|(key, _)| *key == downstreams) {
                Some((_, members)) => members.push(node),
                None => groups.push((downstreams, vec![node])),
            }
        }

        let mut changed = false;
        for (_, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
            let keep = members[0];
            let keep_port = self.block_inputs_of(wiring, graph.first_input(keep))[0];
            for &other in &members[1..] {
                for bi in self.block_inputs_of(wiring, graph.first_input(other)) {
                    let upstreams: Vec<_> = wiring.input(bi).links.iter().copied().collect();
                    for upstream in upstreams {
                        wiring.link(upstream, keep_port);
                    }
                }
                self.remove_node(graph, wiring, other);
                changed = true;
            }
        }
        changed
    }

    fn remove_disconnected_nodes(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) {
        let (used_in, used_out) = self.referenced_ports(wiring);
        let disconnected: Vec<_> = self
            .nodes
            .iter()
            .copied()
            .filter(|node| {
                let n = graph.node(*node);
                n.inputs()
                    .iter()
                    .all(|p| graph.input(*p).connected().is_empty() && !used_in.contains(p))
                    && n.outputs()
                        .iter()
                        .all(|p| graph.output(*p).connected().is_empty() && !used_out.contains(p))
            })
            .collect();
        for node in disconnected {
            self.remove_node(graph, wiring, node);
        }
    }

    /* ---------- unification ---------- */

    /// Fold copies of the same original node into the first copy.
    ///
    /// Merging blocks that were detached separately may leave several copies
    /// of one shared upstream node in the merged block. Every later copy has
    /// its connections and block ports moved onto the first one and is
    /// dropped; block ports that end up wrapping the same port are merged.
    /// Returns whether anything changed.
    pub fn unify(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        let mut canonical = BTreeMap::<NodeId, NodeId>::new();
        let mut changed = false;
        let copies: Vec<_> = self.origins.iter().map(|(c, o)| (*c, *o)).collect();
        for (copy, origin) in copies {
            if !self.nodes.contains(&copy) {
                continue;
            }
            let Some(&first) = canonical.get(&origin) else {
                canonical.insert(origin, copy);
                continue;
            };
            let keep = graph.node(first).clone();
            let redundant = graph.node(copy).clone();
            for (from, to) in redundant.inputs().iter().zip(keep.inputs()) {
                let upstreams: Vec<_> = graph.input(*from).connected().iter().copied().collect();
                for upstream in upstreams {
                    graph.link(upstream, *to);
                }
                for bi in self.block_inputs_of(wiring, *from) {
                    wiring.repoint_input(bi, *to);
                }
            }
            for (from, to) in redundant.outputs().iter().zip(keep.outputs()) {
                let downstreams: Vec<_> = graph.output(*from).connected().iter().copied().collect();
                for downstream in downstreams {
                    graph.link(*to, downstream);
                }
                for bo in self.block_outputs_of(wiring, *from) {
                    wiring.repoint_output(bo, *to);
                }
            }
            graph.remove_node(copy);
            self.nodes.remove(&copy);
            self.origins.remove(&copy);
            changed = true;
        }
        changed |= self.merge_redundant_inputs(wiring);
        changed |= self.merge_redundant_outputs(wiring);
        changed
    }

    /* ---------- identity bypass ---------- */

    /// Route external links around identities that connect a block input
    /// straight to a block output, then compact.
    ///
    /// Only meaningful for map blocks; reduce blocks are never bypassed.
    pub(crate) fn bypass_identities(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring) -> bool {
        let mut changed = false;
        for bi in self.inputs.clone() {
            if !wiring.contains_input(bi) {
                continue;
            }
            let port = wiring.input(bi).port;
            let node = graph.input(port).owner();
            if !ops::is_identity(graph, node) {
                continue;
            }
            let out = graph.first_output(node);
            if !graph.input(port).connected().is_empty() || !graph.output(out).connected().is_empty() {
                continue;
            }
            let exits = self.block_outputs_of(wiring, out);
            if exits.is_empty() {
                continue;
            }
            let entries = self.block_inputs_of(wiring, port);
            let upstreams: BTreeSet<_> = entries
                .iter()
                .flat_map(|e| wiring.input(*e).links.iter().copied())
                .collect();
            let downstreams: BTreeSet<_> = exits
                .iter()
                .flat_map(|e| wiring.output(*e).links.iter().copied())
                .collect();
            for &upstream in &upstreams {
                for &downstream in &downstreams {
                    wiring.link(upstream, downstream);
                }
            }
            for entry in entries {
                self.remove_input_port(wiring, entry);
            }
            for exit in exits {
                self.remove_output_port(wiring, exit);
            }
            changed = true;
        }
        if changed {
            self.compaction(graph, wiring);
        }
        changed
    }

    /* ---------- helpers ---------- */

    fn remove_input_port(&mut self, wiring: &mut Wiring, id: BlockInputId) {
        wiring.remove_input(id);
        self.inputs.retain(|bi| *bi != id);
    }

    fn remove_output_port(&mut self, wiring: &mut Wiring, id: BlockOutputId) {
        wiring.remove_output(id);
        self.outputs.retain(|bo| *bo != id);
    }

    fn remove_node(&mut self, graph: &mut FlowGraph, wiring: &mut Wiring, node: NodeId) {
        let n = graph.node(node);
        let (ins, outs) = (n.inputs().to_vec(), n.outputs().to_vec());
        for port in ins {
            for bi in self.block_inputs_of(wiring, port) {
                self.remove_input_port(wiring, bi);
            }
        }
        for port in outs {
            for bo in self.block_outputs_of(wiring, port) {
                self.remove_output_port(wiring, bo);
            }
        }
        graph.remove_node(node);
        self.nodes.remove(&node);
        self.origins.remove(&node);
    }
}
