//! Planner output: the frozen step and node graph.

use std::collections::BTreeSet;
use std::fmt;

use common_display::{DisplayNode, DisplayTree};
use weir_logical::{ElementGraph, ElementId, ElementType, GraphDump};

use crate::phase::PlanPhase;

/// One rule application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTrace {
    pub phase: PlanPhase,
    pub rule: String,
    /// Matches found, summed over fixed-point iterations.
    pub matches: usize,
    pub iterations: usize,
    pub changed: bool,
}

/// A sub-partition of a step, executed as one stream graph.
#[derive(Debug, Clone)]
pub struct FlowNode {
    pub id: usize,
    /// Owned and read elements with the edges between them.
    pub graph: ElementGraph,
    pub owned: BTreeSet<ElementId>,
    /// Cut elements produced by an earlier node or step.
    pub reads: BTreeSet<ElementId>,
    /// Owned cut elements consumed by later nodes or steps.
    pub writes: BTreeSet<ElementId>,
    /// Earlier nodes of the same step this node reads from.
    pub dependencies: BTreeSet<usize>,
}

impl FlowNode {
    pub fn sources(&self) -> Vec<ElementId> {
        owned_of(&self.graph, &self.owned, ElementType::Source)
    }

    pub fn sinks(&self) -> Vec<ElementId> {
        owned_of(&self.graph, &self.owned, ElementType::Sink)
    }

    /// Elements the node's stream graph starts from.
    pub fn heads(&self) -> Vec<ElementId> {
        self.graph.heads()
    }
}

/// A schedulable unit of the plan.
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub id: usize,
    pub name: String,
    pub graph: ElementGraph,
    pub nodes: Vec<FlowNode>,
    pub owned: BTreeSet<ElementId>,
    /// Boundaries written by upstream steps.
    pub reads: BTreeSet<ElementId>,
    /// Boundaries this step writes for downstream steps.
    pub writes: BTreeSet<ElementId>,
    /// Steps that must complete first.
    pub dependencies: BTreeSet<usize>,
}

impl FlowStep {
    pub fn sources(&self) -> Vec<ElementId> {
        owned_of(&self.graph, &self.owned, ElementType::Source)
    }

    pub fn sinks(&self) -> Vec<ElementId> {
        owned_of(&self.graph, &self.owned, ElementType::Sink)
    }

    fn display_node(&self) -> DisplayNode {
        let mut details = format!("{} elements", self.owned.len());
        if !self.dependencies.is_empty() {
            let deps: Vec<String> = self.dependencies.iter().map(|d| d.to_string()).collect();
            details.push_str(&format!(", after [{}]", deps.join(", ")));
        }
        let mut node = DisplayNode::new(format!("Step {} {}", self.id, self.name)).with_details(details);
        for flow_node in &self.nodes {
            let mut child = DisplayNode::new(format!("Node {}", flow_node.id));
            for id in &flow_node.reads {
                child.push(element_line(&flow_node.graph, *id, "read"));
            }
            for id in &flow_node.owned {
                let role = if flow_node.writes.contains(id) { "write" } else { "" };
                child.push(element_line(&flow_node.graph, *id, role));
            }
            node.push(child);
        }
        node
    }
}

fn element_line(graph: &ElementGraph, id: ElementId, role: &str) -> DisplayNode {
    let label = match graph.element(id) {
        Some(e) => format!("{} '{}'", e.kind.describe(), e.name),
        None => id.to_string(),
    };
    let node = DisplayNode::new(label);
    if role.is_empty() {
        node
    } else {
        node.with_details(role)
    }
}

fn owned_of(graph: &ElementGraph, owned: &BTreeSet<ElementId>, ty: ElementType) -> Vec<ElementId> {
    owned
        .iter()
        .copied()
        .filter(|id| graph.element(*id).is_some_and(|e| e.element_type() == ty))
        .collect()
}

/// A compiled pipeline.
#[derive(Debug, Clone)]
pub struct FlowPlan {
    /// Name of the registry that produced the plan.
    pub registry: String,
    /// The element graph after every assembly phase.
    pub graph: ElementGraph,
    /// Steps in dependency order.
    pub steps: Vec<FlowStep>,
    pub applied: Vec<RuleTrace>,
    /// Per-phase graph dumps, when tracing was enabled.
    pub trace: Vec<GraphDump>,
}

impl FlowPlan {
    pub fn step(&self, id: usize) -> Option<&FlowStep> {
        self.steps.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.steps.iter().map(|s| s.nodes.len()).sum()
    }

    /// Rules that changed the graph, in application order.
    pub fn changed_rules(&self) -> Vec<&str> {
        self.applied
            .iter()
            .filter(|t| t.changed)
            .map(|t| t.rule.as_str())
            .collect()
    }

    /// Indented tree of steps, nodes and elements.
    pub fn explain(&self) -> String {
        let mut root = DisplayNode::new(format!("FlowPlan '{}'", self.registry))
            .with_details(format!("{} steps, {} nodes", self.steps.len(), self.node_count()));
        for step in &self.steps {
            root.push(step.display_node());
        }
        DisplayTree::new(&root).to_string()
    }

    pub fn to_dot(&self) -> String {
        self.graph.to_dot(&self.registry)
    }
}

impl fmt::Display for FlowPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}
