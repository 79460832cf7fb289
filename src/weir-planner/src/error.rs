//! Structured planning failures.

use std::fmt;

use common_error::WeirError;
use thiserror::Error;
use weir_logical::{ElementGraph, GraphDump};

use crate::phase::PlanPhase;

/// Category of a planning failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorKind {
    /// The input graph failed structural or semantic validation.
    Validation,
    /// An assert rule matched.
    Assertion,
    /// Field resolution found a conflict.
    FieldResolution,
    /// An iterative rule did not reach a fixed point.
    NonConvergent,
    /// A transformer returned an error.
    Transform,
    /// Partitions could not be ordered.
    Partition,
}

impl fmt::Display for PlannerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Assertion => "assertion",
            Self::FieldResolution => "field resolution",
            Self::NonConvergent => "non-convergent rule",
            Self::Transform => "transform",
            Self::Partition => "partition",
        };
        f.write_str(name)
    }
}

/// A failed compile, with the graph as it stood at the failure.
#[derive(Debug, Clone, Error)]
#[error("{kind} failure{}{}: {message}", phase_suffix(.phase), rule_suffix(.rule))]
pub struct PlannerError {
    pub phase: Option<PlanPhase>,
    pub rule: Option<String>,
    pub kind: PlannerErrorKind,
    pub message: String,
    /// Graph dumps: the trace so far when tracing, then the failing graph.
    pub snapshot: Vec<GraphDump>,
}

fn phase_suffix(phase: &Option<PlanPhase>) -> String {
    phase.map(|p| format!(" in {p}")).unwrap_or_default()
}

fn rule_suffix(rule: &Option<String>) -> String {
    rule.as_ref().map(|r| format!(" (rule '{r}')")).unwrap_or_default()
}

impl PlannerError {
    pub fn new(kind: PlannerErrorKind, message: impl Into<String>) -> Self {
        Self {
            phase: None,
            rule: None,
            kind,
            message: message.into(),
            snapshot: Vec::new(),
        }
    }

    pub fn in_phase(mut self, phase: PlanPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn for_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Attach a dump of the matched elements only.
    pub fn with_offending(mut self, subgraph: &ElementGraph) -> Self {
        let label = match &self.rule {
            Some(rule) => format!("offending-{rule}"),
            None => "offending".to_string(),
        };
        self.snapshot.push(GraphDump::new(label, subgraph));
        self
    }

    /// Put the trace so far in front of the snapshot and a dump of `graph`
    /// at its end.
    pub fn with_snapshot(mut self, trace: &[GraphDump], graph: &ElementGraph) -> Self {
        self.snapshot.splice(0..0, trace.iter().cloned());
        let label = match (&self.phase, &self.rule) {
            (Some(phase), Some(rule)) => format!("failed-{phase}-{rule}"),
            (Some(phase), None) => format!("failed-{phase}"),
            _ => "failed".to_string(),
        };
        self.snapshot.push(GraphDump::new(label, graph));
        self
    }

    /// The dump of the graph at failure.
    pub fn failed_graph(&self) -> Option<&GraphDump> {
        self.snapshot.last()
    }

    /// The dump of the elements an assert rule matched.
    pub fn offending(&self) -> Option<&GraphDump> {
        self.snapshot.iter().find(|d| d.label.starts_with("offending"))
    }
}

impl From<PlannerError> for WeirError {
    fn from(err: PlannerError) -> Self {
        WeirError::planning(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_conversion() {
        let err = PlannerError::new(PlannerErrorKind::Assertion, "hash joins are not supported")
            .in_phase(PlanPhase::PreBalanceAssembly)
            .for_rule("no-hash-joins")
            .with_snapshot(&[], &ElementGraph::new());
        assert_eq!(
            err.to_string(),
            "assertion failure in PreBalanceAssembly (rule 'no-hash-joins'): hash joins are not supported"
        );
        assert_eq!(err.failed_graph().unwrap().label, "failed-PreBalanceAssembly-no-hash-joins");

        let weir: WeirError = err.into();
        assert!(weir.to_string().starts_with("PlanningError: assertion failure"));
    }

    #[test]
    fn test_display_without_context() {
        let err = PlannerError::new(PlannerErrorKind::Validation, "graph is empty");
        assert_eq!(err.to_string(), "validation failure: graph is empty");
        assert!(err.snapshot.is_empty());
    }
}
