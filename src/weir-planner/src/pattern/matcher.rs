//! Backtracking subgraph matcher.

use std::collections::{BTreeSet, HashSet};

use common_config::SearchOrder;
use log::trace;
use weir_logical::{ElementGraph, ElementId};

use super::{CaptureRole, ExpressionGraph};

/// One binding of pattern nodes to graph elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// `(pattern node, role, element)` for every non-excluded node, in node order.
    captures: Vec<(usize, CaptureRole, ElementId)>,
}

impl Match {
    pub fn captured(&self, role: CaptureRole) -> Vec<ElementId> {
        self.captures
            .iter()
            .filter(|(_, r, _)| *r == role)
            .map(|(_, _, id)| *id)
            .collect()
    }

    pub fn primary(&self) -> Vec<ElementId> {
        self.captured(CaptureRole::Primary)
    }

    pub fn secondary(&self) -> Vec<ElementId> {
        self.captured(CaptureRole::Secondary)
    }

    pub fn included(&self) -> Vec<ElementId> {
        self.captured(CaptureRole::Include)
    }

    /// Every captured element.
    pub fn elements(&self) -> BTreeSet<ElementId> {
        self.captures.iter().map(|(_, _, id)| *id).collect()
    }

    pub fn binding(&self, node: usize) -> Option<ElementId> {
        self.captures
            .iter()
            .find(|(n, _, _)| *n == node)
            .map(|(_, _, id)| *id)
    }

    pub(crate) fn bindings(&self) -> Vec<(usize, ElementId)> {
        self.captures.iter().map(|(n, _, id)| (*n, *id)).collect()
    }

    fn identity(&self) -> Vec<(CaptureRole, ElementId)> {
        let mut key: Vec<_> = self.captures.iter().map(|(_, r, id)| (*r, *id)).collect();
        key.sort();
        key
    }
}

/// Finds every binding of an [`ExpressionGraph`] in an element graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    order: SearchOrder,
}

impl Matcher {
    pub fn new(order: SearchOrder) -> Self {
        Self { order }
    }

    /// Elements in the configured visitation order.
    pub fn visitation_order(&self, graph: &ElementGraph) -> Vec<ElementId> {
        let topo = match graph.topological_order() {
            Ok(order) => order,
            Err(_) => graph.element_ids().collect(),
        };
        match self.order {
            SearchOrder::Topological => topo,
            SearchOrder::ReverseTopological => topo.into_iter().rev().collect(),
            SearchOrder::DepthFirst => {
                let mut seen = HashSet::new();
                let mut order = Vec::with_capacity(topo.len());
                for head in graph.heads().into_iter().chain(topo) {
                    let mut stack = vec![head];
                    while let Some(id) = stack.pop() {
                        if !seen.insert(id) {
                            continue;
                        }
                        order.push(id);
                        // reversed so the first declared successor is visited first
                        stack.extend(graph.successors(id).into_iter().rev());
                    }
                }
                order
            }
        }
    }

    /// All distinct matches, ordered by the visitation order of the first
    /// pattern node's binding.
    pub fn find_all(&self, graph: &ElementGraph, pattern: &ExpressionGraph) -> Vec<Match> {
        if pattern.is_empty() {
            return Vec::new();
        }
        let order = self.visitation_order(graph);
        let (positive, negative): (Vec<usize>, Vec<usize>) = (0..pattern.nodes().len())
            .partition(|i| pattern.nodes()[*i].role != CaptureRole::Exclude);

        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut assignment = vec![None; pattern.nodes().len()];
        let mut raw = Vec::new();
        search(graph, pattern, &order, &positive, 0, &mut assignment, &mut raw);

        for mut bound in raw {
            if !negative.is_empty()
                && search_exists(graph, pattern, &order, &negative, 0, &mut bound)
            {
                continue;
            }
            let captures = positive
                .iter()
                .filter_map(|i| bound[*i].map(|id| (*i, pattern.nodes()[*i].role, id)))
                .collect();
            let m = Match { captures };
            if seen.insert(m.identity()) {
                found.push(m);
            }
        }
        trace!("pattern {pattern} matched {} time(s)", found.len());
        found
    }

    /// The first match, if any.
    pub fn find_first(&self, graph: &ElementGraph, pattern: &ExpressionGraph) -> Option<Match> {
        self.find_all(graph, pattern).into_iter().next()
    }
}

/// Whether `node` may be bound to `candidate` given the bindings so far.
fn consistent(
    graph: &ElementGraph,
    pattern: &ExpressionGraph,
    assignment: &[Option<ElementId>],
    node: usize,
    candidate: ElementId,
) -> bool {
    if assignment.iter().flatten().any(|id| *id == candidate) {
        return false;
    }
    if !pattern.nodes()[node].expression.matches(graph, candidate) {
        return false;
    }
    pattern.arcs().iter().all(|arc| {
        let from = if arc.from == node { Some(candidate) } else { assignment[arc.from] };
        let to = if arc.to == node { Some(candidate) } else { assignment[arc.to] };
        match (from, to) {
            (Some(f), Some(t)) if arc.from == node || arc.to == node => arc.holds(graph, f, t),
            _ => true,
        }
    })
}

fn search(
    graph: &ElementGraph,
    pattern: &ExpressionGraph,
    order: &[ElementId],
    nodes: &[usize],
    depth: usize,
    assignment: &mut Vec<Option<ElementId>>,
    out: &mut Vec<Vec<Option<ElementId>>>,
) {
    let Some(&node) = nodes.get(depth) else {
        out.push(assignment.clone());
        return;
    };
    for &candidate in order {
        if consistent(graph, pattern, assignment, node, candidate) {
            assignment[node] = Some(candidate);
            search(graph, pattern, order, nodes, depth + 1, assignment, out);
            assignment[node] = None;
        }
    }
}

fn search_exists(
    graph: &ElementGraph,
    pattern: &ExpressionGraph,
    order: &[ElementId],
    nodes: &[usize],
    depth: usize,
    assignment: &mut Vec<Option<ElementId>>,
) -> bool {
    let Some(&node) = nodes.get(depth) else {
        return true;
    };
    for &candidate in order {
        if consistent(graph, pattern, assignment, node, candidate) {
            assignment[node] = Some(candidate);
            let found = search_exists(graph, pattern, order, nodes, depth + 1, assignment);
            assignment[node] = None;
            if found {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use weir_logical::{ElementKind, ElementType, SourceSpec};

    use super::*;
    use crate::pattern::{ElementExpression, ScopeExpression, Topology};

    /// in -> b1 -> m, in2 -> m, m -> out
    fn diamond() -> (ElementGraph, [ElementId; 5]) {
        let mut g = ElementGraph::new();
        let fields = || SourceSpec { fields: ["k"].into() };
        let s1 = g.add_element("in", ElementKind::Source(fields()));
        let s2 = g.add_element("in2", ElementKind::Source(fields()));
        let b = g.add_element("b1", ElementKind::Boundary);
        let m = g.add_element("m", ElementKind::Merge);
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(s1, b, 0).unwrap();
        g.add_edge(b, m, 0).unwrap();
        g.add_edge(s2, m, 1).unwrap();
        g.add_edge(m, out, 0).unwrap();
        (g, [s1, s2, b, m, out])
    }

    #[test]
    fn test_visitation_orders() {
        let (g, [s1, s2, b, m, out]) = diamond();
        let topo = Matcher::new(SearchOrder::Topological).visitation_order(&g);
        assert_eq!(topo, vec![s1, s2, b, m, out]);
        let rev = Matcher::new(SearchOrder::ReverseTopological).visitation_order(&g);
        assert_eq!(rev, vec![out, m, b, s2, s1]);
        let dfs = Matcher::new(SearchOrder::DepthFirst).visitation_order(&g);
        assert_eq!(dfs, vec![s1, b, m, out, s2]);
    }

    #[test]
    fn test_single_node_matches_in_order() {
        let (g, [s1, s2, ..]) = diamond();
        let pattern = ExpressionGraph::of_kinds([ElementType::Source]);
        let matches = Matcher::default().find_all(&g, &pattern);
        let primaries: Vec<_> = matches.iter().flat_map(Match::primary).collect();
        assert_eq!(primaries, vec![s1, s2]);

        let reversed = Matcher::new(SearchOrder::ReverseTopological).find_all(&g, &pattern);
        assert_eq!(reversed[0].primary(), vec![s2]);
    }

    #[test]
    fn test_direct_arc_with_ordinal() {
        let (g, [_, s2, _, m, _]) = diamond();
        let mut pattern = ExpressionGraph::new();
        let src = pattern.add(ElementExpression::kind(ElementType::Source), CaptureRole::Secondary);
        let merge = pattern.add(
            ElementExpression::kind(ElementType::Merge).with_topology(Topology::Merge),
            CaptureRole::Primary,
        );
        pattern.connect(src, merge, ScopeExpression::Ordinal(1));

        let matches = Matcher::default().find_all(&g, &pattern);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].secondary(), vec![s2]);
        assert_eq!(matches[0].primary(), vec![m]);
    }

    #[test]
    fn test_transitive_arc_and_exclude() {
        let (g, [s1, s2, _, _, out]) = diamond();
        let mut pattern = ExpressionGraph::new();
        let src = pattern.add(ElementExpression::kind(ElementType::Source), CaptureRole::Primary);
        let sink = pattern.add(ElementExpression::kind(ElementType::Sink), CaptureRole::Include);
        let boundary = pattern.add(ElementExpression::kind(ElementType::Boundary), CaptureRole::Exclude);
        pattern.connect_transitive(src, sink);
        pattern.connect_transitive(src, boundary);
        pattern.connect_transitive(boundary, sink);

        // only the source with no boundary on its path to the sink
        let matches = Matcher::default().find_all(&g, &pattern);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].primary(), vec![s2]);
        assert_eq!(matches[0].included(), vec![out]);
        assert!(!matches[0].elements().contains(&s1));
    }

    #[test]
    fn test_avoiding_arc_is_per_path() {
        // in -> b1 -> m and in -> m: one guarded path, one bare
        let mut g = ElementGraph::new();
        let s = g.add_element("in", ElementKind::Source(SourceSpec { fields: ["k"].into() }));
        let b = g.add_element("b1", ElementKind::Boundary);
        let m = g.add_element("m", ElementKind::Merge);
        let out = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, b, 0).unwrap();
        g.add_edge(b, m, 0).unwrap();
        g.add_edge(s, m, 1).unwrap();
        g.add_edge(m, out, 0).unwrap();

        let boundary = || ElementExpression::kind(ElementType::Boundary);
        let mut avoiding = ExpressionGraph::new();
        let src = avoiding.add(ElementExpression::kind(ElementType::Source), CaptureRole::Primary);
        let sink = avoiding.add(ElementExpression::kind(ElementType::Sink), CaptureRole::Include);
        avoiding.connect_avoiding(src, sink, boundary());
        assert_eq!(Matcher::default().find_all(&g, &avoiding).len(), 1);

        let mut excluding = ExpressionGraph::new();
        let src = excluding.add(ElementExpression::kind(ElementType::Source), CaptureRole::Primary);
        let sink = excluding.add(ElementExpression::kind(ElementType::Sink), CaptureRole::Include);
        let cut = excluding.add(boundary(), CaptureRole::Exclude);
        excluding
            .connect_transitive(src, sink)
            .connect_transitive(src, cut)
            .connect_transitive(cut, sink);
        assert!(Matcher::default().find_all(&g, &excluding).is_empty());

        // once the bare edge is cut too, the avoiding arc no longer holds
        let bare = g.incoming(m).into_iter().find(|e| e.source == s).unwrap().id;
        g.insert_between(bare, "b2", ElementKind::Boundary).unwrap();
        assert!(Matcher::default().find_all(&g, &avoiding).is_empty());
    }

    #[test]
    fn test_symmetric_pattern_deduplicated() {
        let (g, _) = diamond();
        let mut pattern = ExpressionGraph::new();
        pattern.add(ElementExpression::kind(ElementType::Source), CaptureRole::Include);
        pattern.add(ElementExpression::kind(ElementType::Source), CaptureRole::Include);
        assert_eq!(Matcher::default().find_all(&g, &pattern).len(), 1);
    }

    #[test]
    fn test_verify_detects_stale_match() {
        let (mut g, [_, _, b, ..]) = diamond();
        let pattern = ExpressionGraph::of_kinds([ElementType::Boundary]);
        let found = Matcher::default().find_first(&g, &pattern).unwrap();
        assert!(pattern.verify(&g, &found));
        g.splice_out(b).unwrap();
        assert!(!pattern.verify(&g, &found));
    }
}
