//! Source graph validation.
//!
//! Problems with the caller's graph are never fatal: they are collected as
//! [`Diagnostic`]s so every problem can be reported at once, and planning
//! stops with the whole list.
//!
//! # Checks
//!
//! - every input port has at least one connection
//! - every output port declared [`Connectivity::Mandatory`] has at least one
//!   connection; other unconnected outputs are terminated with an implicit
//!   sink
//! - the graph has no circuits
//!
//! Nested flow-part scopes are checked the same way, with the flow-part node
//! recorded as the diagnostic's scope.

use crate::graph::FlowGraph;
use crate::node::{Connectivity, Scope};
use crate::node_id::NodeId;
use crate::{ops, rewrite};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single problem found in the source graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Flow part whose nested scope contains the problem, `None` for the root.
    pub scope: Option<NodeId>,
    /// Nodes involved, in handle order.
    pub nodes: Vec<NodeId>,
    /// Human-readable description.
    pub message: String,
}

impl Diagnostic {
    pub fn new<S: Into<String>>(scope: Option<NodeId>, nodes: Vec<NodeId>, message: S) -> Self {
        Self {
            scope,
            nodes,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = self.scope {
            write!(f, "[in {scope}] ")?;
        }
        write!(f, "{}", self.message)?;
        if !self.nodes.is_empty() {
            let nodes: Vec<_> = self.nodes.iter().map(ToString::to_string).collect();
            write!(f, " ({})", nodes.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Ordered list of diagnostics; the error type of a failed plan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.items
    }

    /// Export diagnostics to JSON format.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.items)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "planning failed with {} diagnostic(s)", self.items.len())?;
        for item in &self.items {
            write!(f, "\n  - {item}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Validate the root scope of `graph` and every nested scope.
///
/// Unconnected optional outputs are stopped in place, so `graph` should be
/// the planner's working copy. Returns `true` if no diagnostic was added.
pub fn validate(graph: &mut FlowGraph, diagnostics: &mut Diagnostics) -> bool {
    let before = diagnostics.len();
    let root = graph.scope().clone();
    validate_scope(graph, None, &root, diagnostics);
    diagnostics.len() == before
}

fn validate_scope(
    graph: &mut FlowGraph,
    owner: Option<NodeId>,
    scope: &Scope,
    diagnostics: &mut Diagnostics,
) {
    let nodes = ops::collect_nodes(graph, scope);
    for &id in &nodes {
        let node = graph.node(id).clone();
        for port in node.inputs() {
            let input = graph.input(*port);
            if input.connected().is_empty() {
                diagnostics.push(Diagnostic::new(
                    owner,
                    vec![id],
                    format!("unconnected input `{}` of `{}`", input.name(), node.name()),
                ));
            }
        }
        for port in node.outputs() {
            let output = graph.output(*port);
            if !output.connected().is_empty() {
                continue;
            }
            if output.connectivity() == Connectivity::Mandatory {
                diagnostics.push(Diagnostic::new(
                    owner,
                    vec![id],
                    format!(
                        "mandatory output `{}` of `{}` is not connected",
                        output.name(),
                        node.name()
                    ),
                ));
            } else {
                rewrite::stop(graph, *port);
            }
        }
    }

    for circuit in find_circuits(graph, scope) {
        let names: Vec<_> = circuit
            .iter()
            .map(|n| graph.node(*n).name().to_string())
            .collect();
        diagnostics.push(Diagnostic::new(
            owner,
            circuit,
            format!("circuit detected: {}", names.join(" -> ")),
        ));
    }

    for (part, inner) in ops::collect_flow_parts(graph, &nodes) {
        validate_scope(graph, Some(part), &inner, diagnostics);
    }
}

/// Strongly connected components with more than one node, plus self loops.
fn find_circuits(graph: &FlowGraph, scope: &Scope) -> Vec<Vec<NodeId>> {
    let nodes = ops::collect_nodes(graph, scope);
    let mut deps = DiGraphMap::<NodeId, ()>::new();
    for &node in &nodes {
        deps.add_node(node);
        for next in ops::successors(graph, node) {
            deps.add_edge(node, next, ());
        }
    }
    let mut circuits: Vec<Vec<NodeId>> = tarjan_scc(&deps)
        .into_iter()
        .filter(|c| c.len() > 1 || deps.contains_edge(c[0], c[0]))
        .map(|mut c| {
            c.sort();
            c
        })
        .collect();
    circuits.sort();
    circuits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataType, NodeSpec, OperatorKind};
    use anyhow::Result;

    fn map(g: &mut FlowGraph, name: &str, t: &DataType) -> Result<NodeId> {
        g.add_node(
            NodeSpec::operator(name, OperatorKind::Map)
                .input("in", t.clone())
                .output("out", t.clone()),
        )
    }

    #[test]
    fn reports_self_loop() -> Result<()> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let m = g.add_node(
            NodeSpec::operator("m", OperatorKind::Confluent)
                .input("first", t.clone())
                .input("again", t.clone())
                .output("out", t.clone()),
        )?;
        let b = g.add_output("b", t);
        g.connect_nodes(a, 0, m, 0)?;
        g.connect_nodes(m, 0, m, 1)?;
        g.connect_nodes(m, 0, b, 0)?;

        let mut diagnostics = Diagnostics::new();
        assert!(!validate(&mut g, &mut diagnostics));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.as_slice()[0].nodes, vec![m]);
        Ok(())
    }

    #[test]
    fn stops_optional_outputs() -> Result<()> {
        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let m = map(&mut g, "m", &t)?;
        g.connect_nodes(a, 0, m, 0)?;

        let mut diagnostics = Diagnostics::new();
        assert!(validate(&mut g, &mut diagnostics));
        assert_eq!(ops::successors(&g, m).len(), 1);
        Ok(())
    }

    #[test]
    fn reports_unconnected_input_inside_flow_part() -> Result<()> {
        use crate::node::{NodeKind, Scope};

        let mut g = FlowGraph::new();
        let t = DataType::new("T");
        let a = g.add_input("a", t.clone());
        let part = g.add_flow_part(
            NodeSpec::new("part", NodeKind::FlowPart(Scope::default()))
                .input("x", t.clone())
                .output("y", t.clone()),
        )?;
        let b = g.add_output("b", t);
        g.connect_nodes(a, 0, part, 0)?;
        g.connect_nodes(part, 0, b, 0)?;

        let mut diagnostics = Diagnostics::new();
        assert!(!validate(&mut g, &mut diagnostics));
        assert!(diagnostics.iter().all(|d| d.scope == Some(part)));
        assert!(diagnostics.to_string().contains("unconnected input"));
        Ok(())
    }
}
