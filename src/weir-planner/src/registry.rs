//! Rule registries: named, ordered phase to rule lists.
//!
//! Within a phase, rules run in declaration order and each sees the graph
//! the previous one produced. When two rules match overlapping elements the
//! one declared first wins; reorder the builder calls to change that.

use std::collections::{BTreeMap, HashSet};

use common_error::{WeirError, WeirResult};
use weir_logical::ElementType;

use crate::pattern::{CaptureRole, ElementExpression, ExpressionGraph, Topology};
use crate::phase::{PlanLevel, PlanPhase};
use crate::rules::{
    AnnotateHashJoinLegs, AssertRule, InsertBoundary, PartitionRule, RemoveBranch, Rule,
    TransformRule,
};

#[derive(Debug, Clone)]
pub struct RuleRegistry {
    name: String,
    phases: BTreeMap<PlanPhase, Vec<Rule>>,
}

impl RuleRegistry {
    pub fn builder(name: impl Into<String>) -> RuleRegistryBuilder {
        RuleRegistryBuilder {
            name: name.into(),
            phases: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rules of a phase in declaration order.
    pub fn rules(&self, phase: PlanPhase) -> &[Rule] {
        self.phases.get(&phase).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rule_count(&self) -> usize {
        self.phases.values().map(Vec::len).sum()
    }

    /// Rules for the local streaming engine.
    ///
    /// Dangling branches are pruned, hash join legs are annotated, every tail
    /// must be a sink, and steps are cut at boundaries. Each step runs as one
    /// node.
    pub fn local() -> Self {
        let dangling = ElementExpression::kind(ElementType::Sink)
            .not()
            .with_topology(Topology::Tail);
        Self::builder("local")
            .rule(
                PlanPhase::PreBalanceAssembly,
                TransformRule::new(
                    "remove-dangling-branches",
                    ExpressionGraph::single(dangling.clone()),
                    RemoveBranch::default(),
                )
                .iterative(),
            )
            .rule(
                PlanPhase::BalanceAssembly,
                TransformRule::new(
                    "annotate-hash-join-legs",
                    ExpressionGraph::of_kinds([ElementType::HashJoin]),
                    AnnotateHashJoinLegs,
                ),
            )
            .rule(
                PlanPhase::PostResolveAssembly,
                AssertRule::new(
                    "tails-are-sinks",
                    ExpressionGraph::single(dangling),
                    "pipeline tail is not a sink: {Primary}",
                ),
            )
            .rule(
                PlanPhase::PartitionSteps,
                PartitionRule::new("boundaries", ExpressionGraph::of_kinds([ElementType::Boundary])),
            )
            .build_unchecked()
    }

    /// Rules for a map/reduce style substrate. Hash joins are rejected, no
    /// path inside a step crosses two groupings, and nodes are cut at
    /// groupings.
    pub fn batch() -> Self {
        let grouping = || ElementExpression::kinds([ElementType::GroupBy, ElementType::CoGroup]);

        // a grouping downstream of another along a path with no boundary
        let mut chained = ExpressionGraph::new();
        let upstream = chained.add(grouping(), CaptureRole::Include);
        let downstream = chained.add(grouping(), CaptureRole::Primary);
        chained.connect_avoiding(upstream, downstream, ElementExpression::kind(ElementType::Boundary));

        let mut two_groups = ExpressionGraph::new();
        let first = two_groups.add(grouping(), CaptureRole::Primary);
        let second = two_groups.add(grouping(), CaptureRole::Secondary);
        two_groups.connect_transitive(first, second);

        Self::builder("batch")
            .rule(
                PlanPhase::PreBalanceAssembly,
                AssertRule::new(
                    "no-hash-joins",
                    ExpressionGraph::of_kinds([ElementType::HashJoin]),
                    "hash joins are not supported by the batch planner: {Primary}",
                ),
            )
            .rule(
                PlanPhase::BalanceAssembly,
                TransformRule::new("isolate-groupings", chained, InsertBoundary::before()).iterative(),
            )
            .rule(
                PlanPhase::PartitionSteps,
                PartitionRule::new("boundaries", ExpressionGraph::of_kinds([ElementType::Boundary])),
            )
            .rule(
                PlanPhase::PostSteps,
                AssertRule::new(
                    "one-grouping-per-step",
                    two_groups,
                    "step holds more than one grouping: {Primary} and {Secondary}",
                ),
            )
            .rule(
                PlanPhase::PartitionNodes,
                PartitionRule::new(
                    "groupings",
                    ExpressionGraph::of_kinds([ElementType::GroupBy, ElementType::CoGroup]),
                ),
            )
            .build_unchecked()
    }
}

pub struct RuleRegistryBuilder {
    name: String,
    phases: BTreeMap<PlanPhase, Vec<Rule>>,
}

impl RuleRegistryBuilder {
    /// Append a rule to a phase.
    pub fn rule(mut self, phase: PlanPhase, rule: impl Into<Rule>) -> Self {
        self.phases.entry(phase).or_default().push(rule.into());
        self
    }

    /// Check rule placement and naming.
    ///
    /// Partition rules belong to partition phases, transform rules to
    /// assembly phases, and rule names are unique across the registry.
    pub fn build(self) -> WeirResult<RuleRegistry> {
        let mut names = HashSet::new();
        for (phase, rules) in &self.phases {
            for rule in rules {
                if !names.insert(rule.name().to_string()) {
                    return Err(WeirError::invalid_parameter(format!(
                        "duplicate rule name '{}' in registry '{}'",
                        rule.name(),
                        self.name
                    )));
                }
                if rule.expression().is_empty() {
                    return Err(WeirError::invalid_parameter(format!(
                        "rule '{}' has an empty expression",
                        rule.name()
                    )));
                }
                match rule {
                    Rule::Partition(_) if !phase.is_partition() => {
                        return Err(WeirError::invalid_parameter(format!(
                            "partition rule '{}' cannot run in {phase}",
                            rule.name()
                        )));
                    }
                    Rule::Transform(_) if phase.level() != PlanLevel::Assembly => {
                        return Err(WeirError::invalid_parameter(format!(
                            "transform rule '{}' cannot run in {phase}",
                            rule.name()
                        )));
                    }
                    _ => {}
                }
            }
        }
        Ok(self.build_unchecked())
    }

    fn build_unchecked(self) -> RuleRegistry {
        RuleRegistry {
            name: self.name,
            phases: self.phases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registries_are_valid() {
        for registry in [RuleRegistry::local(), RuleRegistry::batch()] {
            let mut builder = RuleRegistry::builder(registry.name());
            for phase in PlanPhase::ALL {
                for rule in registry.rules(phase) {
                    builder = builder.rule(phase, rule.clone());
                }
            }
            let rebuilt = builder.build().unwrap();
            assert_eq!(rebuilt.rule_count(), registry.rule_count());
        }
    }

    #[test]
    fn test_declaration_order_kept() {
        let registry = RuleRegistry::builder("custom")
            .rule(
                PlanPhase::PostSteps,
                AssertRule::new("b", ExpressionGraph::of_kinds([ElementType::Merge]), "m"),
            )
            .rule(
                PlanPhase::PostSteps,
                AssertRule::new("a", ExpressionGraph::of_kinds([ElementType::Merge]), "m"),
            )
            .build()
            .unwrap();
        let names: Vec<_> = registry.rules(PlanPhase::PostSteps).iter().map(Rule::name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(registry.rules(PlanPhase::PostNodes).is_empty());
    }

    #[test]
    fn test_placement_checks() {
        let partition = PartitionRule::new("cut", ExpressionGraph::of_kinds([ElementType::Boundary]));
        let err = RuleRegistry::builder("bad")
            .rule(PlanPhase::BalanceAssembly, partition)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cannot run in BalanceAssembly"));

        let transform = TransformRule::new(
            "late",
            ExpressionGraph::of_kinds([ElementType::Boundary]),
            RemoveBranch::default(),
        );
        assert!(RuleRegistry::builder("bad")
            .rule(PlanPhase::PostNodes, transform)
            .build()
            .is_err());

        let dup = || AssertRule::new("same", ExpressionGraph::of_kinds([ElementType::Merge]), "m");
        let err = RuleRegistry::builder("bad")
            .rule(PlanPhase::PreBalanceAssembly, dup())
            .rule(PlanPhase::PostNodes, dup())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate rule name 'same'"));
    }
}
