//! End-to-end planner tests over the built-in and custom registries.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use weir_core::operation::{Count, Identity, InnerJoin, Sum};
use weir_logical::{
    ElementGraph, ElementId, ElementKind, ElementType, GroupBySpec, JoinSpec, OutputSelector,
    PipelineBuilder, SourceSpec,
};
use weir_planner::{
    ElementExpression, ExpressionGraph, PartitionRule, PlanPhase, Planner, PlannerConfig,
    PlannerErrorKind, RuleRegistry,
};

fn hash_join_pipeline() -> ElementGraph {
    let mut b = PipelineBuilder::new();
    let left = b.source("left", ["id", "name"]);
    let right = b.source("right", ["ref", "amount"]);
    let join = b.hash_join(
        "join",
        &[left, right],
        JoinSpec::new(vec![["id"].into(), ["ref"].into()], Arc::new(InnerJoin)),
    );
    b.sink("out", join);
    b.build().unwrap()
}

fn two_groupings() -> ElementGraph {
    let mut b = PipelineBuilder::new();
    let src = b.source("in", ["k", "v"]);
    let by_key = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
    let summed = b.every("sum", by_key, Some(["v"].into()), Arc::new(Sum::new("sum")));
    let by_sum = b.group_by("by-sum", &[summed], GroupBySpec::new(["sum"]));
    let counted = b.every("count", by_sum, None, Arc::new(Count::new("n")));
    b.sink("out", counted);
    b.build().unwrap()
}

#[test]
fn test_batch_rejects_hash_join() {
    let err = Planner::new(RuleRegistry::batch())
        .plan(hash_join_pipeline())
        .unwrap_err();

    assert_eq!(err.kind, PlannerErrorKind::Assertion);
    assert_eq!(err.phase, Some(PlanPhase::PreBalanceAssembly));
    assert_eq!(err.rule.as_deref(), Some("no-hash-joins"));
    assert!(err.message.contains("HashJoin[e2] 'join'"), "{}", err.message);
    assert!(err.to_string().contains("no-hash-joins"));

    let offending = err.offending().unwrap();
    assert!(offending.dot.contains("join"));
    assert!(!offending.dot.contains("left"));
    assert!(err.failed_graph().unwrap().dot.contains("left"));
}

#[test]
fn test_local_accepts_hash_join() {
    let plan = Planner::new(RuleRegistry::local())
        .plan(hash_join_pipeline())
        .unwrap();
    assert_eq!(plan.steps.len(), 1);
    let join = plan.graph.find_by_name("join").unwrap().id;
    assert_eq!(
        plan.graph.output_fields(join).unwrap().names(),
        &["id", "name", "ref", "amount"]
    );
}

#[test]
fn test_batch_isolates_groupings() {
    let plan = Planner::new(RuleRegistry::batch()).plan(two_groupings()).unwrap();

    assert_eq!(plan.graph.elements_of(ElementType::Boundary).count(), 1);
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[1].dependencies, [0].into_iter().collect());
    assert_eq!(plan.steps[0].writes, plan.steps[1].reads);
    // nodes are cut at each grouping
    assert_eq!(plan.steps[0].nodes.len(), 2);
    assert_eq!(plan.steps[1].nodes.len(), 2);
    assert!(plan.changed_rules().contains(&"isolate-groupings"));

    let explained = plan.explain();
    assert!(explained.contains("Step 1"));
    assert!(explained.contains("(read)"));
}

#[test]
fn test_batch_isolates_groupings_on_every_path() {
    // by-k feeds by-sum twice: once through a checkpoint, once directly
    let mut b = PipelineBuilder::new();
    let src = b.source("in", ["k", "v"]);
    let by_key = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
    let summed = b.every("sum", by_key, Some(["v"].into()), Arc::new(Sum::new("sum")));
    let checkpoint = b.boundary("cp", summed);
    let by_sum = b.group_by("by-sum", &[checkpoint, summed], GroupBySpec::new(["sum"]));
    let counted = b.every("count", by_sum, None, Arc::new(Count::new("n")));
    b.sink("out", counted);

    let plan = Planner::new(RuleRegistry::batch()).plan(b.build().unwrap()).unwrap();
    assert_eq!(plan.graph.elements_of(ElementType::Boundary).count(), 2);
    assert!(plan.changed_rules().contains(&"isolate-groupings"));

    let by_sum = plan.graph.find_by_name("by-sum").unwrap().id;
    assert!(plan
        .graph
        .incoming(by_sum)
        .iter()
        .all(|e| plan.graph.element(e.source).unwrap().element_type() == ElementType::Boundary));
    let step_of = |id| plan.steps.iter().position(|s| s.nodes.iter().any(|n| n.owned.contains(&id)));
    let by_key = plan.graph.find_by_name("by-k").unwrap().id;
    assert_ne!(step_of(by_key), step_of(by_sum));
}

#[test]
fn test_local_boundary_splits_steps() {
    let mut b = PipelineBuilder::new();
    let src = b.source("in", ["k", "v"]);
    let copied = b.each("copy", src, Some(["v"].into()), Arc::new(Identity::new(["w"])), OutputSelector::All);
    let cut = b.boundary("checkpoint", copied);
    b.sink("out", cut);
    let graph = b.build().unwrap();
    let all: BTreeSet<ElementId> = graph.element_ids().collect();

    let plan = Planner::new(RuleRegistry::local()).plan(graph).unwrap();
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.steps[0].name, "checkpoint");
    assert_eq!(plan.steps[1].name, "out");

    let covered: BTreeSet<ElementId> = plan
        .steps
        .iter()
        .flat_map(|s| s.nodes.iter().flat_map(|n| n.owned.iter().copied()))
        .collect();
    assert_eq!(covered, all);
}

#[test]
fn test_trace_written_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config = PlannerConfig::default().with_trace_dir(dir.path());
    let plan = Planner::with_config(RuleRegistry::local(), config)
        .plan(two_groupings())
        .unwrap();

    let labels: Vec<&str> = plan.trace.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels.first(), Some(&"initial"));
    assert!(labels.contains(&"ResolveAssembly"));
    assert!(dir.path().join("000-initial.dot").exists());
    assert!(dir.path().join("trace.json").exists());
}

#[test]
fn test_failure_snapshot_includes_trace() {
    let config = PlannerConfig::default().with_trace(true);
    let err = Planner::with_config(RuleRegistry::batch(), config)
        .plan(hash_join_pipeline())
        .unwrap_err();
    assert_eq!(err.snapshot.first().unwrap().label, "initial");
    assert_eq!(
        err.failed_graph().unwrap().label,
        "failed-PreBalanceAssembly-no-hash-joins"
    );
}

#[test]
fn test_search_order_does_not_change_result() {
    use common_config::SearchOrder;

    let counts: Vec<(usize, usize)> = [
        SearchOrder::Topological,
        SearchOrder::ReverseTopological,
        SearchOrder::DepthFirst,
    ]
    .into_iter()
    .map(|order| {
        let config = PlannerConfig::default().with_search_order(order);
        let plan = Planner::with_config(RuleRegistry::batch(), config)
            .plan(two_groupings())
            .unwrap();
        (plan.steps.len(), plan.node_count())
    })
    .collect();
    assert!(counts.windows(2).all(|w| w[0] == w[1]));
}

fn cut_registry() -> RuleRegistry {
    RuleRegistry::builder("cuts")
        .rule(
            PlanPhase::PartitionSteps,
            PartitionRule::new(
                "annotated-cuts",
                ExpressionGraph::single(ElementExpression::annotated("cut", "yes")),
            ),
        )
        .build()
        .unwrap()
}

/// A random DAG of sources and merges. Each merge reads a non-empty set of
/// earlier elements.
fn arb_dag() -> impl Strategy<Value = ElementGraph> {
    prop::collection::vec(
        (any::<bool>(), prop::collection::vec(any::<prop::sample::Index>(), 1..4), any::<bool>()),
        1..12,
    )
    .prop_map(|specs| {
        let mut g = ElementGraph::new();
        let mut ids: Vec<ElementId> = Vec::new();
        for (i, (is_source, inputs, cut)) in specs.into_iter().enumerate() {
            if ids.is_empty() || is_source {
                let id = g.add_element(
                    format!("s{i}"),
                    ElementKind::Source(SourceSpec { fields: ["k"].into() }),
                );
                ids.push(id);
                continue;
            }
            let chosen: BTreeSet<ElementId> = inputs.iter().map(|ix| ids[ix.index(ids.len())]).collect();
            let id = g.add_element(format!("m{i}"), ElementKind::Merge);
            for (ordinal, input) in chosen.into_iter().enumerate() {
                g.add_edge(input, id, ordinal).unwrap();
            }
            if cut {
                g.annotate(id, "cut", "yes").unwrap();
            }
            ids.push(id);
        }
        g
    })
}

proptest! {
    #[test]
    fn prop_partitions_conserve_elements(graph in arb_dag()) {
        let all: BTreeSet<ElementId> = graph.element_ids().collect();
        match Planner::new(cut_registry()).plan(graph) {
            Ok(plan) => {
                let mut seen = BTreeSet::new();
                for step in &plan.steps {
                    for id in &step.owned {
                        prop_assert!(seen.insert(*id), "element {} owned twice", id);
                    }
                    for dep in &step.dependencies {
                        prop_assert!(*dep < step.id);
                    }
                    for read in &step.reads {
                        prop_assert!(plan.graph.require(*read).unwrap().has_annotation("cut", "yes"));
                    }
                }
                prop_assert_eq!(seen, all);
            }
            Err(err) => prop_assert_eq!(err.kind, PlannerErrorKind::Partition),
        }
    }
}
