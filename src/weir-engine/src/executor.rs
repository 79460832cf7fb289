//! Flow executor: runs the steps of a [`FlowPlan`] in order.

use std::fmt::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common_error::{WeirError, WeirResult};
use log::{info, warn};
use weir_logical::ElementType;
use weir_planner::FlowPlan;

use crate::context::{CancellationHandle, ExecutionContext, RuntimeConfig, StopSignal};
use crate::metrics::MetricsSink;
use crate::spill::{CountingSpillListener, SpillEvent, SpillListener};
use crate::stream::{BoundaryTaps, NodeOutcome, StreamGraph};
use crate::tap::{IntermediateTap, TapBindings};

/// Forwards spill events to the configured listener while counting them.
#[derive(Debug)]
struct TeeSpillListener {
    inner: Arc<dyn SpillListener>,
    counts: Arc<CountingSpillListener>,
}

impl SpillListener for TeeSpillListener {
    fn on_spill(&self, event: &SpillEvent) {
        self.counts.on_spill(event);
        self.inner.on_spill(event);
    }

    fn on_read(&self, event: &SpillEvent) {
        self.counts.on_read(event);
        self.inner.on_read(event);
    }
}

/// Executes flow plans on the local tokio runtime.
///
/// Steps run in dependency order and the nodes of a step run one after the
/// other. Within a node every source branch and gate is its own task.
#[derive(Debug, Clone)]
pub struct FlowExecutor {
    config: RuntimeConfig,
}

impl FlowExecutor {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
        }
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Execute `plan` with its taps bound by `bindings`.
    pub async fn execute(&self, plan: &FlowPlan, bindings: &TapBindings) -> WeirResult<FlowResult> {
        self.execute_with_cancellation(plan, bindings, None).await
    }

    /// Execute with cancellation support.
    ///
    /// A cancelled run stops between records and returns a
    /// [`NodeOutcome::Cancelled`] result. Nodes that completed before the
    /// cancellation keep what they published.
    pub async fn execute_with_cancellation(
        &self,
        plan: &FlowPlan,
        bindings: &TapBindings,
        cancel_handle: Option<CancellationHandle>,
    ) -> WeirResult<FlowResult> {
        check_heads(plan)?;
        let start = Instant::now();
        let handle = cancel_handle.unwrap_or_default();

        let counts = Arc::new(CountingSpillListener::new());
        let listener = Arc::new(TeeSpillListener {
            inner: Arc::clone(&self.config.spill.listener),
            counts: Arc::clone(&counts),
        });
        let mut config = self.config.clone();
        config.spill = config.spill.with_listener(listener);

        let memory = config.memory_pool();
        let metrics = config.collect_metrics.then(MetricsSink::new);

        let boundary_spill = config.spill.clone().with_memory(Arc::clone(&memory));
        let boundaries: BoundaryTaps = plan
            .graph
            .elements_of(ElementType::Boundary)
            .map(|e| (e.id, IntermediateTap::new(e.name.clone(), boundary_spill.clone())))
            .collect();

        info!(
            "executing {} step(s), {} node(s) from registry '{}'",
            plan.steps.len(),
            plan.node_count(),
            plan.registry
        );

        let mut outcome = NodeOutcome::Completed;
        let mut nodes_run = 0;
        'steps: for step in &plan.steps {
            info!("step {} '{}': {} node(s)", step.id, step.name, step.nodes.len());
            for node in &step.nodes {
                let stop = StopSignal::new(handle.subscribe());
                let ctx = ExecutionContext::with_memory(config.clone(), Arc::clone(&memory), stop)
                    .with_metrics(metrics.clone());
                let graph = StreamGraph::build(node, bindings, &boundaries, ctx).await?;
                info!(
                    "step {} node {}: {} branch(es), {} gate(s)",
                    step.id,
                    node.id,
                    graph.branch_count(),
                    graph.gate_count()
                );
                outcome = graph.run().await?;
                nodes_run += 1;
                if outcome == NodeOutcome::Cancelled {
                    warn!("execution cancelled in step {} node {}", step.id, node.id);
                    break 'steps;
                }
            }
        }

        let elapsed = start.elapsed();
        info!("execution finished {outcome:?} after {nodes_run} node(s) in {elapsed:?}");
        Ok(FlowResult {
            outcome,
            nodes_run,
            metrics,
            elapsed,
            spills: counts.spills(),
            spilled_bytes: counts.bytes(),
            peak_memory: memory.peak(),
        })
    }

    /// Execute synchronously (blocking).
    pub fn execute_sync(&self, plan: &FlowPlan, bindings: &TapBindings) -> WeirResult<FlowResult> {
        common_runtime::block_on(self.execute(plan, bindings))?
    }
}

/// Nodes can only read what an earlier node materialized in a `Boundary`.
fn check_heads(plan: &FlowPlan) -> WeirResult<()> {
    for step in &plan.steps {
        for node in &step.nodes {
            for &id in &node.reads {
                let element = plan.graph.require(id)?;
                if element.element_type() != ElementType::Boundary {
                    return Err(WeirError::not_implemented(format!(
                        "the stream engine cannot read {element} across nodes (plan from registry '{}')",
                        plan.registry
                    )));
                }
            }
        }
    }
    Ok(())
}

impl Default for FlowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one execution.
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub outcome: NodeOutcome,
    pub nodes_run: usize,
    /// Per-element metrics, when collection was enabled.
    pub metrics: Option<MetricsSink>,
    pub elapsed: Duration,
    /// Segments spilled by collections across every node.
    pub spills: u64,
    pub spilled_bytes: u64,
    /// Highest estimated bytes held in memory by collections at once.
    pub peak_memory: usize,
}

impl FlowResult {
    pub fn is_completed(&self) -> bool {
        self.outcome == NodeOutcome::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == NodeOutcome::Cancelled
    }

    /// Records diverted to traps.
    pub fn trapped(&self) -> u64 {
        self.metrics.as_ref().map_or(0, MetricsSink::total_trapped)
    }

    /// Execution report in the style of `EXPLAIN ANALYZE`.
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "Outcome: {:?}", self.outcome);
        let _ = writeln!(output, "Execution Time: {:?}", self.elapsed);
        let _ = writeln!(output, "Nodes: {}", self.nodes_run);
        let _ = writeln!(output, "Spills: {} ({} bytes)", self.spills, self.spilled_bytes);
        let _ = writeln!(output, "Peak Memory: {} bytes", self.peak_memory);
        if let Some(metrics) = &self.metrics {
            output.push_str("\nElement Metrics:\n");
            output.push_str(&metrics.format());
        }
        output
    }
}

impl fmt::Display for FlowResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use weir_core::operation::Sum;
    use weir_core::testing::{int_rows, sorted};
    use weir_logical::{GroupBySpec, PipelineBuilder};
    use weir_planner::{Planner, RuleRegistry};

    use super::*;
    use crate::tap::MemoryTap;

    fn sum_plan() -> FlowPlan {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let grouped = b.group_by("by-k", &[src], GroupBySpec::new(["k"]));
        let summed = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("total")));
        b.sink("out", summed);
        Planner::new(RuleRegistry::local())
            .plan(b.build().unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_execute_group_sum() {
        let input = Arc::new(MemoryTap::with_rows(int_rows(&[&[1, 3], &[2, 5], &[1, 4]])));
        let output = Arc::new(MemoryTap::new());
        let bindings = TapBindings::new().source("in", input).sink("out", output.clone());

        let result = FlowExecutor::new().execute(&sum_plan(), &bindings).await.unwrap();
        assert!(result.is_completed());
        assert_eq!(result.nodes_run, 1);
        assert_eq!(sorted(output.rows()), int_rows(&[&[1, 7], &[2, 5]]));
    }

    #[tokio::test]
    async fn test_metrics_and_summary() {
        let input = Arc::new(MemoryTap::with_rows(int_rows(&[&[1, 1], &[1, 2]])));
        let output = Arc::new(MemoryTap::new());
        let bindings = TapBindings::new().source("in", input).sink("out", output);

        let executor = FlowExecutor::with_config(RuntimeConfig::default().with_metrics(true));
        let result = executor.execute(&sum_plan(), &bindings).await.unwrap();
        let metrics = result.metrics.as_ref().unwrap();
        assert_eq!(metrics.get("in").unwrap().records_out, 2);
        assert_eq!(result.trapped(), 0);
        assert!(result.peak_memory > 0);
        assert!(result.summary().contains("Outcome: Completed"));
        assert!(result.summary().contains("Peak Memory"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let input = Arc::new(MemoryTap::with_rows(int_rows(&[&[1, 1]])));
        let output = Arc::new(MemoryTap::new());
        let bindings = TapBindings::new().source("in", input).sink("out", output.clone());

        let handle = CancellationHandle::new();
        handle.cancel();
        let result = FlowExecutor::new()
            .execute_with_cancellation(&sum_plan(), &bindings, Some(handle))
            .await
            .unwrap();
        assert!(result.is_cancelled());
        assert!(output.is_empty());
    }

    #[test]
    fn test_execute_sync() {
        let input = Arc::new(MemoryTap::with_rows(int_rows(&[&[3, 1]])));
        let output = Arc::new(MemoryTap::new());
        let bindings = TapBindings::new().source("in", input).sink("out", output.clone());

        let result = FlowExecutor::default().execute_sync(&sum_plan(), &bindings).unwrap();
        assert!(result.is_completed());
        assert_eq!(output.rows(), int_rows(&[&[3, 1]]));
    }
}
