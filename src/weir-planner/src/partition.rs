//! Cutting a graph into partitions at chosen elements.
//!
//! A cut element belongs to the partition upstream of it and is read by
//! every partition downstream of it. Owned sets are disjoint and cover the
//! graph; a cut appears once as owned and once per reading partition.

use std::collections::{BTreeMap, BTreeSet};

use common_error::{WeirError, WeirResult};
use weir_logical::{ElementGraph, ElementId};

/// One partition of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Elements this partition executes.
    pub owned: BTreeSet<ElementId>,
    /// Cut elements owned elsewhere that feed this partition.
    pub reads: BTreeSet<ElementId>,
    /// Owned cut elements read by other partitions.
    pub writes: BTreeSet<ElementId>,
    /// Indices of the partitions owning `reads`.
    pub dependencies: BTreeSet<usize>,
}

impl Partition {
    /// Owned and read elements.
    pub fn elements(&self) -> BTreeSet<ElementId> {
        self.owned.union(&self.reads).copied().collect()
    }
}

struct DisjointSet {
    parent: BTreeMap<ElementId, ElementId>,
}

impl DisjointSet {
    fn new(ids: impl Iterator<Item = ElementId>) -> Self {
        Self {
            parent: ids.map(|id| (id, id)).collect(),
        }
    }

    fn find(&mut self, id: ElementId) -> ElementId {
        let mut root = id;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }
        let mut current = id;
        while current != root {
            let next = self.parent.get(&current).copied().unwrap_or(root);
            self.parent.insert(current, root);
            current = next;
        }
        root
    }

    fn union(&mut self, a: ElementId, b: ElementId) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller id becomes the root so component ids are stable
            let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent.insert(child, root);
        }
    }
}

/// Partition `graph` at `cuts`, ordered so every partition follows the
/// partitions it reads from.
pub fn partition(graph: &ElementGraph, cuts: &BTreeSet<ElementId>) -> WeirResult<Vec<Partition>> {
    let topo = graph.topological_order()?;
    let position: BTreeMap<ElementId, usize> =
        topo.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut sets = DisjointSet::new(graph.element_ids());
    for edge in graph.edges() {
        if !cuts.contains(&edge.source) || graph.in_degree(edge.source) == 0 {
            sets.union(edge.source, edge.target);
        }
    }

    // components keyed by root, ordered by first topological position
    let mut components: BTreeMap<ElementId, BTreeSet<ElementId>> = BTreeMap::new();
    for id in &topo {
        let root = sets.find(*id);
        components.entry(root).or_default().insert(*id);
    }
    let mut roots: Vec<ElementId> = components.keys().copied().collect();
    roots.sort_by_key(|root| {
        components[root]
            .iter()
            .map(|id| position[id])
            .min()
            .unwrap_or(usize::MAX)
    });
    let index: BTreeMap<ElementId, usize> = roots.iter().enumerate().map(|(i, r)| (*r, i)).collect();

    let mut parts: Vec<Partition> = roots
        .iter()
        .map(|root| Partition {
            owned: components[root].clone(),
            reads: BTreeSet::new(),
            writes: BTreeSet::new(),
            dependencies: BTreeSet::new(),
        })
        .collect();

    for edge in graph.edges() {
        let from = index[&sets.find(edge.source)];
        let to = index[&sets.find(edge.target)];
        if from != to {
            parts[to].reads.insert(edge.source);
            parts[to].dependencies.insert(from);
            parts[from].writes.insert(edge.source);
        }
    }

    order(parts)
}

/// Kahn's algorithm over partition dependencies, preferring the partition
/// that starts earliest in the graph.
fn order(parts: Vec<Partition>) -> WeirResult<Vec<Partition>> {
    let mut remaining: BTreeMap<usize, usize> = parts
        .iter()
        .enumerate()
        .map(|(i, p)| (i, p.dependencies.len()))
        .collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| *i)
        .collect();
    let mut sequence = Vec::with_capacity(parts.len());

    while let Some(next) = ready.pop_first() {
        sequence.push(next);
        remaining.remove(&next);
        for (i, part) in parts.iter().enumerate() {
            if part.dependencies.contains(&next) {
                if let Some(d) = remaining.get_mut(&i) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(i);
                    }
                }
            }
        }
    }

    if sequence.len() != parts.len() {
        let stuck: Vec<String> = remaining
            .keys()
            .map(|i| {
                let owned: Vec<String> = parts[*i].owned.iter().map(ToString::to_string).collect();
                format!("[{}]", owned.join(", "))
            })
            .collect();
        return Err(WeirError::planning(format!(
            "partitions depend on each other: {}",
            stuck.join(" <-> ")
        )));
    }

    let renumber: BTreeMap<usize, usize> =
        sequence.iter().enumerate().map(|(new, old)| (*old, new)).collect();
    let mut slots: Vec<Option<Partition>> = parts.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for old in sequence {
        if let Some(mut part) = slots[old].take() {
            part.dependencies = part.dependencies.iter().map(|d| renumber[d]).collect();
            ordered.push(part);
        }
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use weir_logical::{ElementKind, SourceSpec};

    use super::*;

    fn source(g: &mut ElementGraph, name: &str) -> ElementId {
        g.add_element(name, ElementKind::Source(SourceSpec { fields: ["k"].into() }))
    }

    #[test]
    fn test_no_cuts_is_one_partition() {
        let mut g = ElementGraph::new();
        let s = source(&mut g, "in");
        let t = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, t, 0).unwrap();
        let parts = partition(&g, &BTreeSet::new()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].owned, [s, t].into_iter().collect());
        assert!(parts[0].reads.is_empty());
    }

    #[test]
    fn test_cut_is_owned_upstream_and_read_downstream() {
        let mut g = ElementGraph::new();
        let s = source(&mut g, "in");
        let b = g.add_element("b", ElementKind::Boundary);
        let t1 = g.add_element("out1", ElementKind::Sink);
        let t2 = g.add_element("out2", ElementKind::Sink);
        g.add_edge(s, b, 0).unwrap();
        g.add_edge(b, t1, 0).unwrap();
        g.add_edge(b, t2, 0).unwrap();

        let parts = partition(&g, &[b].into_iter().collect()).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].owned, [s, b].into_iter().collect());
        assert_eq!(parts[0].writes, [b].into_iter().collect());
        for downstream in &parts[1..] {
            assert_eq!(downstream.reads, [b].into_iter().collect());
            assert_eq!(downstream.dependencies, [0].into_iter().collect());
        }
        assert_eq!(parts[1].owned, [t1].into_iter().collect());
    }

    #[test]
    fn test_order_follows_dependencies_not_ids() {
        // the late source feeds the cut; the early one joins downstream
        let mut g = ElementGraph::new();
        let early = source(&mut g, "early");
        let late = source(&mut g, "late");
        let b = g.add_element("b", ElementKind::Boundary);
        let m = g.add_element("m", ElementKind::Merge);
        let t = g.add_element("out", ElementKind::Sink);
        g.add_edge(late, b, 0).unwrap();
        g.add_edge(early, m, 0).unwrap();
        g.add_edge(b, m, 1).unwrap();
        g.add_edge(m, t, 0).unwrap();

        let parts = partition(&g, &[b].into_iter().collect()).unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].owned.contains(&late));
        assert!(parts[1].owned.contains(&early));
        assert_eq!(parts[1].dependencies, [0].into_iter().collect());
    }

    #[test]
    fn test_mutual_dependency_rejected() {
        // s -> c1 -> y -> c2 -> x -> m <- s
        let mut g = ElementGraph::new();
        let s = source(&mut g, "s");
        let c1 = g.add_element("c1", ElementKind::Boundary);
        let y = g.add_element("y", ElementKind::Boundary);
        let c2 = g.add_element("c2", ElementKind::Boundary);
        let x = g.add_element("x", ElementKind::Boundary);
        let m = g.add_element("m", ElementKind::Merge);
        let t = g.add_element("out", ElementKind::Sink);
        g.add_edge(s, c1, 0).unwrap();
        g.add_edge(c1, y, 0).unwrap();
        g.add_edge(y, c2, 0).unwrap();
        g.add_edge(c2, x, 0).unwrap();
        g.add_edge(x, m, 0).unwrap();
        g.add_edge(s, m, 1).unwrap();
        g.add_edge(m, t, 0).unwrap();

        let err = partition(&g, &[c1, c2].into_iter().collect()).unwrap_err();
        assert!(err.to_string().contains("depend on each other"));
    }
}
