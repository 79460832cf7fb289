//! Planning phases.

use std::fmt;

/// What a phase's rules are matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlanLevel {
    /// The whole element graph.
    Assembly,
    /// Each step's subgraph.
    Step,
    /// Each node's subgraph.
    Node,
}

/// Phases in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanPhase {
    PreBalanceAssembly,
    BalanceAssembly,
    PostBalanceAssembly,
    /// Fields are resolved on entry, before this phase's rules run.
    ResolveAssembly,
    PostResolveAssembly,
    PartitionSteps,
    PostSteps,
    PartitionNodes,
    PostNodes,
}

impl PlanPhase {
    pub const ALL: [PlanPhase; 9] = [
        Self::PreBalanceAssembly,
        Self::BalanceAssembly,
        Self::PostBalanceAssembly,
        Self::ResolveAssembly,
        Self::PostResolveAssembly,
        Self::PartitionSteps,
        Self::PostSteps,
        Self::PartitionNodes,
        Self::PostNodes,
    ];

    pub fn level(&self) -> PlanLevel {
        match self {
            Self::PreBalanceAssembly
            | Self::BalanceAssembly
            | Self::PostBalanceAssembly
            | Self::ResolveAssembly
            | Self::PostResolveAssembly
            | Self::PartitionSteps => PlanLevel::Assembly,
            Self::PostSteps | Self::PartitionNodes => PlanLevel::Step,
            Self::PostNodes => PlanLevel::Node,
        }
    }

    /// Phases where partition rules may appear.
    pub fn is_partition(&self) -> bool {
        matches!(self, Self::PartitionSteps | Self::PartitionNodes)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PreBalanceAssembly => "PreBalanceAssembly",
            Self::BalanceAssembly => "BalanceAssembly",
            Self::PostBalanceAssembly => "PostBalanceAssembly",
            Self::ResolveAssembly => "ResolveAssembly",
            Self::PostResolveAssembly => "PostResolveAssembly",
            Self::PartitionSteps => "PartitionSteps",
            Self::PostSteps => "PostSteps",
            Self::PartitionNodes => "PartitionNodes",
            Self::PostNodes => "PostNodes",
        }
    }
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
