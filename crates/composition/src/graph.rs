//! Operation dependency graph.
//!
//! Nodes are operations keyed by id. An edge `producer -> consumer` exists
//! when some output of the producer matches some input of the consumer
//! within the accepted range; the concept pairs that justify it are kept on
//! the edge. Edges are only ever added.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use catalogue::{Catalogue, Operation, ResourceId};
use matcher::{Concept, LogicMatchType, MatchError, MatchExecutor, MatchType, Matcher, TypeRange};
use serde::Serialize;

use crate::planner::Layer;

/// One output-to-input match backing an operation edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptEdge<T> {
    pub output: Concept,
    pub input: Concept,
    pub match_type: T,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct CompositionGraph<T: MatchType = LogicMatchType> {
    nodes: BTreeMap<ResourceId, Arc<Operation>>,
    edges: BTreeMap<ResourceId, BTreeMap<ResourceId, Vec<ConceptEdge<T>>>>,
}

impl<T: MatchType> Default for CompositionGraph<T> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }
}

impl<T: MatchType> CompositionGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over planner layers: every operation becomes a node, and every
    /// earlier layer is connected to every later one.
    pub fn build<M>(
        layers: &[Layer],
        exec: &MatchExecutor<T, M>,
        range: &TypeRange<T>,
    ) -> Result<Self, MatchError>
    where
        M: Matcher<T> + ?Sized + 'static,
    {
        let mut graph = Self::new();
        for layer in layers {
            for op in layer.operations() {
                graph.add_operation(op.clone());
            }
        }
        for (i, producers) in layers.iter().enumerate() {
            for consumers in &layers[i + 1..] {
                graph.connect(producers.operations(), consumers.operations(), exec, range)?;
            }
        }
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "graph: built from layers"
        );
        Ok(graph)
    }

    pub fn add_operation(&mut self, op: Arc<Operation>) {
        self.nodes.entry(op.id.clone()).or_insert(op);
    }

    /// Add an edge from each producer to each consumer wherever an output of
    /// the producer matches an input of the consumer within `range`.
    pub fn connect<M>(
        &mut self,
        producers: &[Arc<Operation>],
        consumers: &[Arc<Operation>],
        exec: &MatchExecutor<T, M>,
        range: &TypeRange<T>,
    ) -> Result<(), MatchError>
    where
        M: Matcher<T> + ?Sized + 'static,
    {
        for producer in producers {
            for consumer in consumers {
                if producer.id == consumer.id {
                    continue;
                }
                let inputs = consumer.all_inputs();
                if producer.produced_outputs.is_empty() || inputs.is_empty() {
                    continue;
                }
                let pairs = matcher::cartesian(&producer.produced_outputs, &inputs);
                let found: Vec<ConceptEdge<T>> = exec
                    .match_pairs(&pairs)?
                    .into_iter()
                    .filter(|r| range.accepts(r))
                    .map(|r| ConceptEdge {
                        output: r.origin,
                        input: r.matched,
                        match_type: r.match_type,
                        score: r.score,
                    })
                    .collect();
                if !found.is_empty() {
                    self.add_edge(producer.clone(), consumer.clone(), found);
                }
            }
        }
        Ok(())
    }

    /// As [`connect`](Self::connect), resolving ids through `catalogue`.
    /// Ids that do not resolve to an operation are skipped.
    pub fn connect_ids<M>(
        &mut self,
        catalogue: &dyn Catalogue,
        producers: &[ResourceId],
        consumers: &[ResourceId],
        exec: &MatchExecutor<T, M>,
        range: &TypeRange<T>,
    ) -> Result<(), MatchError>
    where
        M: Matcher<T> + ?Sized + 'static,
    {
        let resolve = |ids: &[ResourceId]| -> Vec<Arc<Operation>> {
            ids.iter()
                .filter_map(|id| {
                    let op = catalogue.operation(id);
                    if op.is_none() {
                        tracing::debug!(%id, "graph: skipping unresolvable endpoint");
                    }
                    op
                })
                .collect()
        };
        let producers = resolve(producers);
        let consumers = resolve(consumers);
        self.connect(&producers, &consumers, exec, range)
    }

    fn add_edge(&mut self, from: Arc<Operation>, to: Arc<Operation>, found: Vec<ConceptEdge<T>>) {
        let (from_id, to_id) = (from.id.clone(), to.id.clone());
        self.add_operation(from);
        self.add_operation(to);
        let slot = self.edges.entry(from_id).or_default().entry(to_id).or_default();
        for edge in found {
            if !slot
                .iter()
                .any(|e| e.output == edge.output && e.input == edge.input)
            {
                slot.push(edge);
            }
        }
    }

    pub fn node(&self, id: &ResourceId) -> Option<&Arc<Operation>> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    /// `(from, to)` pairs in id order.
    pub fn edges(&self) -> impl Iterator<Item = (&ResourceId, &ResourceId)> {
        self.edges
            .iter()
            .flat_map(|(from, tos)| tos.keys().map(move |to| (from, to)))
    }

    pub fn contains_edge(&self, from: &ResourceId, to: &ResourceId) -> bool {
        self.concept_edges(from, to).is_some()
    }

    /// The concept matches behind `from -> to`.
    pub fn concept_edges(&self, from: &ResourceId, to: &ResourceId) -> Option<&[ConceptEdge<T>]> {
        self.edges.get(from)?.get(to).map(Vec::as_slice)
    }

    pub fn successors(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.edges
            .get(id)
            .map(|tos| tos.keys().collect())
            .unwrap_or_default()
    }

    pub fn predecessors(&self, id: &ResourceId) -> Vec<&ResourceId> {
        self.edges
            .iter()
            .filter(|(_, tos)| tos.contains_key(id))
            .map(|(from, _)| from)
            .collect()
    }

    /// Nodes ordered so every edge points forward; ties broken by id.
    /// `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<ResourceId>> {
        let mut indegree: BTreeMap<&ResourceId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for (_, to) in self.edges() {
            if let Some(d) = indegree.get_mut(to) {
                *d += 1;
            }
        }
        let mut ready: BTreeSet<&ResourceId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for next in self.successors(id) {
                if let Some(d) = indegree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        (order.len() == self.nodes.len()).then_some(order)
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph composition {\n    rankdir=LR;\n");
        for (id, op) in &self.nodes {
            let _ = writeln!(out, "    \"{}\" [label=\"{}\"];", escape(id.as_str()), escape(&op.label));
        }
        for (from, tos) in &self.edges {
            for (to, concepts) in tos {
                let label = concepts
                    .iter()
                    .map(|c| format!("{} -> {} ({})", c.output, c.input, c.match_type))
                    .collect::<Vec<_>>()
                    .join("\\n");
                let _ = writeln!(
                    out,
                    "    \"{}\" -> \"{}\" [label=\"{}\"];",
                    escape(from.as_str()),
                    escape(to.as_str()),
                    escape(&label)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape(raw: &str) -> String {
    raw.replace('"', "\\\"")
}
