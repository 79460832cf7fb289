//! Element graph topology.
//!
//! Elements and edges live in ordered maps keyed by monotonically assigned
//! ids, so every traversal (and therefore every planning pass) is
//! deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use common_error::{graph_err, WeirError, WeirResult};
use serde::{Deserialize, Serialize};
use weir_core::{Fields, KeyComparator};

use crate::element::{Element, ElementId, ElementKind, ElementType};

/// Unique identifier for an edge in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Data carried by an edge: the input port it feeds and what flows across it.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// Input port on the target element.
    pub ordinal: usize,
    /// Fields flowing across the edge, set by field resolution.
    pub fields: Option<Fields>,
    /// Grouping key fields when the target groups or joins.
    pub key_fields: Option<Fields>,
    /// Secondary sort fields when the target groups.
    pub sort_fields: Option<Fields>,
    pub comparator: KeyComparator,
    /// Planner hints about how the target consumes this edge.
    pub annotations: BTreeMap<String, String>,
}

impl Scope {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            ..Self::default()
        }
    }

    pub fn is_keyed(&self) -> bool {
        self.key_fields.is_some()
    }

    pub fn has_annotation(&self, key: &str, value: &str) -> bool {
        self.annotations.get(key).is_some_and(|v| v == value)
    }

    /// Resolved fields, or an error naming the unresolved edge.
    pub fn resolved_fields(&self) -> WeirResult<&Fields> {
        self.fields.as_ref().ok_or_else(|| {
            WeirError::field(format!("fields on ordinal {} are not resolved", self.ordinal))
        })
    }
}

/// A directed edge between two elements.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub source: ElementId,
    pub target: ElementId,
    pub scope: Scope,
}

/// Directed acyclic graph of elements.
#[derive(Debug, Clone, Default)]
pub struct ElementGraph {
    elements: BTreeMap<ElementId, Element>,
    edges: BTreeMap<EdgeId, Edge>,
    next_element: u32,
    next_edge: u32,
}

impl ElementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    pub fn add_element(&mut self, name: impl Into<String>, kind: ElementKind) -> ElementId {
        let id = ElementId(self.next_element);
        self.next_element += 1;
        self.elements.insert(id, Element::new(id, name, kind));
        id
    }

    /// Connect `source` to input `ordinal` of `target`.
    pub fn add_edge(
        &mut self,
        source: ElementId,
        target: ElementId,
        ordinal: usize,
    ) -> WeirResult<EdgeId> {
        self.add_edge_with_scope(source, target, Scope::new(ordinal))
    }

    /// Connect two elements, checking both endpoints' capabilities.
    pub fn add_edge_with_scope(
        &mut self,
        source: ElementId,
        target: ElementId,
        scope: Scope,
    ) -> WeirResult<EdgeId> {
        let from = self.require(source)?;
        let to = self.require(target)?;
        if source == target {
            graph_err!("self loop on {from}");
        }
        if from.kind.capabilities().sink {
            graph_err!("{from} is a sink and cannot have outputs");
        }
        let caps = to.kind.capabilities();
        if caps.source {
            graph_err!("{to} is a source and cannot have inputs");
        }
        let existing = self.incoming(target);
        if !caps.multi_input && !existing.is_empty() {
            graph_err!("{to} accepts a single input");
        }
        if existing.iter().any(|e| e.scope.ordinal == scope.ordinal) {
            graph_err!("{to} already has an input on ordinal {}", scope.ordinal);
        }

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.insert(
            id,
            Edge {
                id,
                source,
                target,
                scope,
            },
        );
        Ok(id)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn require(&self, id: ElementId) -> WeirResult<&Element> {
        self.elements
            .get(&id)
            .ok_or_else(|| WeirError::graph(format!("no element {id} in graph")))
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&id)
    }

    /// Elements in id order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements.keys().copied()
    }

    /// Edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Element> {
        self.elements.values().find(|e| e.name == name)
    }

    pub fn elements_of(&self, ty: ElementType) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(move |e| e.element_type() == ty)
    }

    /// Incoming edges ordered by ordinal.
    pub fn incoming(&self, id: ElementId) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.values().filter(|e| e.target == id).collect();
        edges.sort_by_key(|e| e.scope.ordinal);
        edges
    }

    /// Outgoing edges in declaration order.
    pub fn outgoing(&self, id: ElementId) -> Vec<&Edge> {
        self.edges.values().filter(|e| e.source == id).collect()
    }

    pub fn in_degree(&self, id: ElementId) -> usize {
        self.edges.values().filter(|e| e.target == id).count()
    }

    pub fn out_degree(&self, id: ElementId) -> usize {
        self.edges.values().filter(|e| e.source == id).count()
    }

    /// Distinct predecessors in ordinal order.
    pub fn predecessors(&self, id: ElementId) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        self.incoming(id)
            .into_iter()
            .map(|e| e.source)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Distinct successors in declaration order.
    pub fn successors(&self, id: ElementId) -> Vec<ElementId> {
        let mut seen = BTreeSet::new();
        self.outgoing(id)
            .into_iter()
            .map(|e| e.target)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Elements with no inputs.
    pub fn heads(&self) -> Vec<ElementId> {
        self.element_ids().filter(|id| self.in_degree(*id) == 0).collect()
    }

    /// Elements with no outputs.
    pub fn tails(&self) -> Vec<ElementId> {
        self.element_ids().filter(|id| self.out_degree(*id) == 0).collect()
    }

    /// Fields an element emits, read from any resolved outgoing edge.
    pub fn output_fields(&self, id: ElementId) -> Option<&Fields> {
        self.outgoing(id)
            .into_iter()
            .find_map(|e| e.scope.fields.as_ref())
    }

    /// Fields arriving on an ordinal.
    pub fn input_fields(&self, id: ElementId, ordinal: usize) -> Option<&Fields> {
        self.incoming(id)
            .into_iter()
            .find(|e| e.scope.ordinal == ordinal)
            .and_then(|e| e.scope.fields.as_ref())
    }

    /// Whether `to` is reachable from `from` through one or more edges.
    pub fn reaches(&self, from: ElementId, to: ElementId) -> bool {
        let mut stack = self.successors(from);
        let mut seen = BTreeSet::new();
        while let Some(next) = stack.pop() {
            if next == to {
                return true;
            }
            if seen.insert(next) {
                stack.extend(self.successors(next));
            }
        }
        false
    }

    /// Kahn's algorithm, choosing the smallest ready id first.
    pub fn topological_order(&self) -> WeirResult<Vec<ElementId>> {
        let mut in_degree: BTreeMap<ElementId, usize> =
            self.element_ids().map(|id| (id, 0)).collect();
        for edge in self.edges.values() {
            *in_degree.entry(edge.target).or_default() += 1;
        }

        let mut ready: BTreeSet<ElementId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.elements.len());

        while let Some(id) = ready.pop_first() {
            order.push(id);
            for edge in self.edges.values().filter(|e| e.source == id) {
                if let Some(d) = in_degree.get_mut(&edge.target) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(edge.target);
                    }
                }
            }
        }

        if order.len() != self.elements.len() {
            let stuck: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            graph_err!("cycle detected among [{}]", stuck.join(", "));
        }
        Ok(order)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Attach an annotation to an element.
    pub fn annotate(&mut self, id: ElementId, key: &str, value: &str) -> WeirResult<()> {
        let element = self
            .elements
            .get_mut(&id)
            .ok_or_else(|| WeirError::graph(format!("no element {id} in graph")))?;
        element.annotations.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn annotate_edge(&mut self, id: EdgeId, key: &str, value: &str) -> WeirResult<()> {
        let edge = self
            .edges
            .get_mut(&id)
            .ok_or_else(|| WeirError::graph(format!("no edge {id} in graph")))?;
        edge.scope.annotations.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Bind an element's failures to a named trap.
    pub fn set_trap(&mut self, id: ElementId, trap: impl Into<String>) -> WeirResult<()> {
        let element = self
            .elements
            .get_mut(&id)
            .ok_or_else(|| WeirError::graph(format!("no element {id} in graph")))?;
        element.trap = Some(trap.into());
        Ok(())
    }

    /// Swap an element's kind, keeping its id, name and edges.
    pub fn replace(&mut self, id: ElementId, kind: ElementKind) -> WeirResult<()> {
        let element = self
            .elements
            .get_mut(&id)
            .ok_or_else(|| WeirError::graph(format!("no element {id} in graph")))?;
        element.kind = kind;
        Ok(())
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Option<Edge> {
        self.edges.remove(&id)
    }

    /// Remove an element and every edge touching it.
    pub fn remove_element(&mut self, id: ElementId) -> Option<Element> {
        self.edges.retain(|_, e| e.source != id && e.target != id);
        self.elements.remove(&id)
    }

    /// Split `edge` with a new element. The upstream half feeds ordinal 0 of
    /// the new element; the downstream half keeps the original scope.
    pub fn insert_between(
        &mut self,
        edge: EdgeId,
        name: impl Into<String>,
        kind: ElementKind,
    ) -> WeirResult<ElementId> {
        let original = self
            .edges
            .remove(&edge)
            .ok_or_else(|| WeirError::graph(format!("no edge {edge} in graph")))?;
        let id = self.add_element(name, kind);

        let mut upstream = Scope::new(0);
        upstream.fields = original.scope.fields.clone();
        self.add_edge_with_scope(original.source, id, upstream)?;
        self.add_edge_with_scope(id, original.target, original.scope)?;
        Ok(id)
    }

    /// Remove a pass-through element, wiring its sole input to each output.
    pub fn splice_out(&mut self, id: ElementId) -> WeirResult<()> {
        let element = self.require(id)?;
        let incoming = self.incoming(id);
        if incoming.len() != 1 {
            graph_err!(
                "cannot splice out {element}: expected one input, found {}",
                incoming.len()
            );
        }
        let upstream = incoming[0].source;
        let outgoing: Vec<Edge> = self.outgoing(id).into_iter().cloned().collect();

        self.remove_element(id);
        for edge in outgoing {
            self.add_edge_with_scope(upstream, edge.target, edge.scope)?;
        }
        Ok(())
    }

    /// Remove an element and, transitively, upstream elements left with no
    /// outputs. Returns the removed ids.
    pub fn remove_branch(&mut self, id: ElementId) -> WeirResult<Vec<ElementId>> {
        self.require(id)?;
        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let preds = self.predecessors(next);
            if self.remove_element(next).is_some() {
                removed.push(next);
            }
            for pred in preds {
                if self.out_degree(pred) == 0 {
                    pending.push(pred);
                }
            }
        }
        Ok(removed)
    }

    /// Copy of the elements in `ids` and the edges between them.
    pub fn subgraph(&self, ids: &BTreeSet<ElementId>) -> ElementGraph {
        ElementGraph {
            elements: self
                .elements
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, e)| (*id, e.clone()))
                .collect(),
            edges: self
                .edges
                .iter()
                .filter(|(_, e)| ids.contains(&e.source) && ids.contains(&e.target))
                .map(|(id, e)| (*id, e.clone()))
                .collect(),
            next_element: self.next_element,
            next_edge: self.next_edge,
        }
    }
}
