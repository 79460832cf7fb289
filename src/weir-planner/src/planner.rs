//! The planner: runs a registry's phases over an element graph.

use std::collections::BTreeSet;
use std::path::PathBuf;

use common_config::{PlannerSettings, SearchOrder};
use log::{debug, info};
use weir_logical::validation::{SemanticValidator, StructuralValidator};
use weir_logical::{resolve_fields, ElementGraph, ElementId, ElementType};

use crate::error::{PlannerError, PlannerErrorKind};
use crate::partition::{partition, Partition};
use crate::pattern::{Match, Matcher};
use crate::phase::{PlanLevel, PlanPhase};
use crate::plan::{FlowNode, FlowPlan, FlowStep, RuleTrace};
use crate::registry::RuleRegistry;
use crate::rules::{AssertRule, Rule, TransformRule};
use crate::trace::TraceRecorder;

/// Configuration for the planner.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Bound on fixed-point passes of one iterative rule.
    pub max_iterations: usize,
    /// Record a graph dump per phase and per changing rule.
    pub trace: bool,
    /// Directory the dumps are written to.
    pub trace_dir: Option<PathBuf>,
    pub search_order: SearchOrder,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self::from_settings(&PlannerSettings::default())
    }
}

impl PlannerConfig {
    pub fn from_settings(settings: &PlannerSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations,
            trace: settings.trace,
            trace_dir: settings.trace_dir.clone(),
            search_order: settings.search_order,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_trace(mut self, enable: bool) -> Self {
        self.trace = enable;
        self
    }

    /// Write dumps into `dir`. Enables tracing.
    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace = true;
        self.trace_dir = Some(dir.into());
        self
    }

    pub fn with_search_order(mut self, order: SearchOrder) -> Self {
        self.search_order = order;
        self
    }
}

/// Compiles element graphs into flow plans.
///
/// Phases run in order and rules within a phase in declaration order, each
/// rule seeing the graph left by the previous one. Planning is all or
/// nothing: any failure returns a [`PlannerError`] and no plan.
#[derive(Debug, Clone)]
pub struct Planner {
    registry: RuleRegistry,
    config: PlannerConfig,
}

/// Mutable state of one compile.
struct Run {
    matcher: Matcher,
    recorder: TraceRecorder,
    applied: Vec<RuleTrace>,
}

impl Planner {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry,
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(registry: RuleRegistry, config: PlannerConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Compile `graph` into a [`FlowPlan`].
    pub fn plan(&self, graph: ElementGraph) -> Result<FlowPlan, PlannerError> {
        let mut run = Run {
            matcher: Matcher::new(self.config.search_order),
            recorder: TraceRecorder::new(self.config.trace, self.config.trace_dir.clone()),
            applied: Vec::new(),
        };
        info!(
            "planning {} elements with registry '{}'",
            graph.len(),
            self.registry.name()
        );

        match self.compile(graph, &mut run) {
            Ok((graph, steps)) => {
                let trace = run.recorder.finish(None);
                let plan = FlowPlan {
                    registry: self.registry.name().to_string(),
                    graph,
                    steps,
                    applied: run.applied,
                    trace,
                };
                info!(
                    "planned {} step(s), {} node(s) with registry '{}'",
                    plan.steps.len(),
                    plan.node_count(),
                    plan.registry
                );
                Ok(plan)
            }
            Err(err) => {
                run.recorder.finish(err.failed_graph());
                debug!("planning failed: {err}");
                Err(err)
            }
        }
    }

    fn compile(
        &self,
        mut graph: ElementGraph,
        run: &mut Run,
    ) -> Result<(ElementGraph, Vec<FlowStep>), PlannerError> {
        if let Err(errors) = StructuralValidator::validate(&graph) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(PlannerError::new(PlannerErrorKind::Validation, messages.join("; "))
                .with_snapshot(run.recorder.dumps(), &graph));
        }
        run.recorder.record("initial", &graph);

        let mut step_cuts = BTreeSet::new();
        for phase in PlanPhase::ALL.into_iter().filter(|p| p.level() == PlanLevel::Assembly) {
            if phase == PlanPhase::ResolveAssembly {
                self.resolve(&mut graph, run)?;
            }
            let rules = self.registry.rules(phase);
            for rule in rules {
                graph = self.apply(phase, rule, graph, &mut step_cuts, run)?;
            }
            if !rules.is_empty() || phase == PlanPhase::ResolveAssembly {
                run.recorder.record(phase.name(), &graph);
            }
        }

        let step_parts = partition(&graph, &step_cuts).map_err(|e| {
            PlannerError::new(PlannerErrorKind::Partition, e.to_string())
                .in_phase(PlanPhase::PartitionSteps)
                .with_snapshot(run.recorder.dumps(), &graph)
        })?;
        debug!("cut {} element(s) into {} step(s)", step_cuts.len(), step_parts.len());

        let mut steps = Vec::with_capacity(step_parts.len());
        for (id, part) in step_parts.into_iter().enumerate() {
            let step_graph = graph.subgraph(&part.elements());
            steps.push(self.build_step(id, part, step_graph, run)?);
        }

        for step in &steps {
            for node in &step.nodes {
                for rule in self.registry.rules(PlanPhase::PostNodes) {
                    self.check(PlanPhase::PostNodes, rule, &node.graph, run)?;
                }
            }
        }
        Ok((graph, steps))
    }

    fn resolve(&self, graph: &mut ElementGraph, run: &mut Run) -> Result<(), PlannerError> {
        let phase = PlanPhase::ResolveAssembly;
        if let Err(e) = resolve_fields(graph) {
            return Err(PlannerError::new(PlannerErrorKind::FieldResolution, e.to_string())
                .in_phase(phase)
                .with_snapshot(run.recorder.dumps(), graph));
        }
        if let Err(errors) = SemanticValidator::validate(graph) {
            let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(PlannerError::new(PlannerErrorKind::Validation, messages.join("; "))
                .in_phase(phase)
                .with_snapshot(run.recorder.dumps(), graph));
        }
        debug!("resolved fields on {} edge(s)", graph.edges().count());
        Ok(())
    }

    fn build_step(
        &self,
        id: usize,
        part: Partition,
        graph: ElementGraph,
        run: &mut Run,
    ) -> Result<FlowStep, PlannerError> {
        for rule in self.registry.rules(PlanPhase::PostSteps) {
            self.check(PlanPhase::PostSteps, rule, &graph, run)?;
        }

        let mut node_cuts = BTreeSet::new();
        for rule in self.registry.rules(PlanPhase::PartitionNodes) {
            self.check(PlanPhase::PartitionNodes, rule, &graph, run)?;
            if let Rule::Partition(partition_rule) = rule {
                let matches = run.matcher.find_all(&graph, &partition_rule.expression);
                node_cuts.extend(matches.iter().flat_map(|m| m.primary()));
            }
        }

        let node_parts = partition(&graph, &node_cuts).map_err(|e| {
            PlannerError::new(PlannerErrorKind::Partition, e.to_string())
                .in_phase(PlanPhase::PartitionNodes)
                .with_snapshot(run.recorder.dumps(), &graph)
        })?;
        let nodes = node_parts
            .into_iter()
            .enumerate()
            .map(|(node_id, p)| FlowNode {
                id: node_id,
                graph: graph.subgraph(&p.elements()),
                owned: p.owned,
                reads: p.reads,
                writes: p.writes,
                dependencies: p.dependencies,
            })
            .collect();

        Ok(FlowStep {
            id,
            name: step_name(id, &graph, &part),
            graph,
            nodes,
            owned: part.owned,
            reads: part.reads,
            writes: part.writes,
            dependencies: part.dependencies,
        })
    }

    /// Apply one rule at assembly level.
    fn apply(
        &self,
        phase: PlanPhase,
        rule: &Rule,
        graph: ElementGraph,
        cuts: &mut BTreeSet<ElementId>,
        run: &mut Run,
    ) -> Result<ElementGraph, PlannerError> {
        match rule {
            Rule::Assert(_) => {
                self.check(phase, rule, &graph, run)?;
                Ok(graph)
            }
            Rule::Partition(partition_rule) => {
                let matches = run.matcher.find_all(&graph, &partition_rule.expression);
                cuts.extend(matches.iter().flat_map(|m| m.primary()));
                run.applied.push(RuleTrace {
                    phase,
                    rule: partition_rule.name.clone(),
                    matches: matches.len(),
                    iterations: 1,
                    changed: false,
                });
                Ok(graph)
            }
            Rule::Transform(transform) => self.transform(phase, transform, graph, run),
        }
    }

    /// Run an assert rule against a graph at any level. Other rule kinds
    /// pass.
    fn check(
        &self,
        phase: PlanPhase,
        rule: &Rule,
        graph: &ElementGraph,
        run: &mut Run,
    ) -> Result<(), PlannerError> {
        let Rule::Assert(assert) = rule else {
            return Ok(());
        };
        match run.matcher.find_first(graph, &assert.expression) {
            Some(found) => Err(assertion_failure(phase, assert, graph, &found, run)),
            None => {
                run.applied.push(RuleTrace {
                    phase,
                    rule: assert.name.clone(),
                    matches: 0,
                    iterations: 1,
                    changed: false,
                });
                Ok(())
            }
        }
    }

    fn transform(
        &self,
        phase: PlanPhase,
        rule: &TransformRule,
        mut graph: ElementGraph,
        run: &mut Run,
    ) -> Result<ElementGraph, PlannerError> {
        let mut iterations = 0;
        let mut total_matches = 0;
        let mut changed_any = false;

        loop {
            iterations += 1;
            let matches = run.matcher.find_all(&graph, &rule.expression);
            total_matches += matches.len();
            let mut changed = false;

            for found in &matches {
                if !rule.expression.verify(&graph, found) {
                    debug!("rule '{}' skipping stale match {:?}", rule.name, found.elements());
                    continue;
                }
                let before = graph.clone();
                let result = rule.transformer.rewrite(graph, found).map_err(|e| {
                    PlannerError::new(PlannerErrorKind::Transform, e.to_string())
                        .in_phase(phase)
                        .for_rule(&rule.name)
                        .with_snapshot(run.recorder.dumps(), &before)
                })?;
                changed |= result.changed;
                graph = result.graph;
            }

            changed_any |= changed;
            if changed {
                debug!(
                    "rule '{}' ({}) changed the graph in pass {iterations}",
                    rule.name,
                    rule.transformer.name()
                );
            }
            if !rule.iterative || !changed {
                break;
            }
            if iterations >= self.config.max_iterations {
                return Err(PlannerError::new(
                    PlannerErrorKind::NonConvergent,
                    format!(
                        "rule '{}' still changing the graph after {} passes",
                        rule.name, self.config.max_iterations
                    ),
                )
                .in_phase(phase)
                .for_rule(&rule.name)
                .with_snapshot(run.recorder.dumps(), &graph));
            }
        }

        if changed_any {
            run.recorder.record(format!("{phase}/{}", rule.name), &graph);
        }
        run.applied.push(RuleTrace {
            phase,
            rule: rule.name.clone(),
            matches: total_matches,
            iterations,
            changed: changed_any,
        });
        Ok(graph)
    }
}

fn assertion_failure(
    phase: PlanPhase,
    rule: &AssertRule,
    graph: &ElementGraph,
    found: &Match,
    run: &Run,
) -> PlannerError {
    let offending = graph.subgraph(&found.elements());
    let message = rule.render(graph, found);
    PlannerError::new(PlannerErrorKind::Assertion, message)
        .in_phase(phase)
        .for_rule(&rule.name)
        .with_offending(&offending)
        .with_snapshot(run.recorder.dumps(), graph)
}

/// Name a step after the sinks and boundaries it writes.
fn step_name(id: usize, graph: &ElementGraph, part: &Partition) -> String {
    let names: Vec<&str> = part
        .owned
        .iter()
        .filter_map(|e| graph.element(*e))
        .filter(|e| e.element_type() == ElementType::Sink || part.writes.contains(&e.id))
        .map(|e| e.name.as_str())
        .collect();
    if names.is_empty() {
        format!("step-{id}")
    } else {
        names.join(",")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weir_core::operation::{InnerJoin, Sum};
    use weir_logical::{GroupBySpec, JoinSpec, PipelineBuilder, STREAMED, STREAM_MODE};

    use super::*;
    use crate::pattern::{ElementExpression, ExpressionGraph};
    use crate::rules::{Annotate, FnTransformer, Transformed};

    fn group_sum() -> ElementGraph {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let grouped = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
        let summed = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("sum")));
        b.sink("out", summed);
        b.build().unwrap()
    }

    #[test]
    fn test_local_plan_is_one_step() {
        let plan = Planner::new(RuleRegistry::local()).plan(group_sum()).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.node_count(), 1);
        assert_eq!(plan.steps[0].name, "out");
        let out = plan.graph.find_by_name("out").unwrap().id;
        assert_eq!(
            plan.graph.input_fields(out, 0).unwrap(),
            &weir_core::Fields::from(["k", "sum"])
        );
        assert!(plan.explain().starts_with("FlowPlan 'local' (1 steps, 1 nodes)"));
    }

    #[test]
    fn test_dangling_branch_removed() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        b.boundary("unused", src);
        b.sink("out", src);
        let plan = Planner::new(RuleRegistry::local()).plan(b.build().unwrap()).unwrap();
        assert!(plan.graph.find_by_name("unused").is_none());
        assert_eq!(plan.changed_rules(), vec!["remove-dangling-branches"]);
    }

    #[test]
    fn test_hash_join_legs_annotated() {
        let mut b = PipelineBuilder::new();
        let l = b.source("l", ["a"]);
        let r = b.source("r", ["b"]);
        let join = b.hash_join(
            "join",
            &[l, r],
            JoinSpec::new(vec![["a"].into(), ["b"].into()], Arc::new(InnerJoin)),
        );
        b.sink("out", join);
        let plan = Planner::new(RuleRegistry::local()).plan(b.build().unwrap()).unwrap();
        let left = plan.graph.find_by_name("l").unwrap().id;
        let edge = plan.graph.outgoing(left)[0];
        assert!(edge.scope.has_annotation(STREAM_MODE, STREAMED));
    }

    #[test]
    fn test_field_conflict_is_planning_error() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k"]);
        let grouped = b.group_by("by-missing", &[src], GroupBySpec::new(["nope"]));
        b.sink("out", grouped);
        let err = Planner::new(RuleRegistry::local()).plan(b.build().unwrap()).unwrap_err();
        assert_eq!(err.kind, PlannerErrorKind::FieldResolution);
        assert_eq!(err.phase, Some(PlanPhase::ResolveAssembly));
        assert!(err.message.contains("nope"));
        assert!(err.failed_graph().is_some());
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let annotate = |value: &str| {
            TransformRule::new(
                format!("mark-{value}"),
                ExpressionGraph::of_kinds([ElementType::Sink]),
                Annotate::new("mark", value),
            )
        };
        let registry = RuleRegistry::builder("ordered")
            .rule(PlanPhase::BalanceAssembly, annotate("first"))
            .rule(PlanPhase::BalanceAssembly, annotate("second"))
            .build()
            .unwrap();
        let plan = Planner::new(registry).plan(group_sum()).unwrap();
        // the later rule sees and overwrites the earlier one's work
        assert_eq!(plan.graph.find_by_name("out").unwrap().annotation("mark"), Some("second"));
        assert_eq!(plan.changed_rules(), vec!["mark-first", "mark-second"]);
    }

    #[test]
    fn test_non_convergent_rule() {
        let counter = FnTransformer::new("bump", |mut graph: ElementGraph, found| {
            for id in found.primary() {
                let next = graph
                    .require(id)?
                    .annotation("n")
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(0)
                    + 1;
                graph.annotate(id, "n", &next.to_string())?;
            }
            Ok(Transformed::yes(graph))
        });
        let registry = RuleRegistry::builder("looping")
            .rule(
                PlanPhase::PreBalanceAssembly,
                TransformRule::new(
                    "forever",
                    ExpressionGraph::single(ElementExpression::kind(ElementType::Sink)),
                    counter,
                )
                .iterative(),
            )
            .build()
            .unwrap();
        let config = PlannerConfig::default().with_max_iterations(5);
        let err = Planner::with_config(registry, config).plan(group_sum()).unwrap_err();
        assert_eq!(err.kind, PlannerErrorKind::NonConvergent);
        assert_eq!(err.rule.as_deref(), Some("forever"));
        assert!(err.message.contains("after 5 passes"));
    }

    #[test]
    fn test_invalid_graph_rejected_before_phases() {
        let err = Planner::new(RuleRegistry::local())
            .plan(ElementGraph::new())
            .unwrap_err();
        assert_eq!(err.kind, PlannerErrorKind::Validation);
        assert!(err.phase.is_none());
    }
}
