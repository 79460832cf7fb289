//! Push-based stream graph for one flow node.
//!
//! [`StreamGraph::build`] compiles a node's element graph into ducts:
//! `Each`, `Filter`, `Sink` and `Boundary` become per-record stages, every
//! multi-input element becomes a gate task, and `Every` chains are folded
//! into the grouping they follow. Each head of the node (an owned `Source`
//! or a `Boundary` written by an earlier node) runs as its own branch task.
//!
//! [`StreamGraph::run`] drives every task to completion. The first failure
//! stops the whole node; sink and trap writers are closed only when the node
//! completes and aborted otherwise, so a failed or cancelled node publishes
//! nothing.

mod duct;
mod gate;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use common_error::{WeirError, WeirResult};
use common_runtime::JoinSet;
use log::{debug, warn};
use tokio::sync::{mpsc, Mutex};
use weir_core::{Fields, KeyComparator};
use weir_logical::{
    group_context, EachSpec, Element, ElementGraph, ElementId, ElementKind, FilterSpec, GroupBySpec,
    JoinSpec, STREAMED, STREAM_MODE,
};
use weir_planner::FlowNode;

use self::duct::{Duct, EachDuct, FilterDuct, Link, Outputs, SinkDuct, SourceBranch, Trap, WriterSlot};
use self::gate::{
    AggregateStep, Aggregation, CoGroupGate, Emitter, GateInput, GateLogic, GateTask, GroupByGate,
    HashJoinGate, MergeGate,
};
use crate::context::{ExecutionContext, StopSignal};
use crate::tap::{IntermediateTap, SinkTap, TapBindings};

/// Intermediate storage per `Boundary` element of a plan.
pub type BoundaryTaps = HashMap<ElementId, IntermediateTap>;

/// How a node run ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    Completed,
    /// Stopped from outside; nothing was published.
    Cancelled,
}

/// A node compiled into branch and gate tasks, ready to run once.
pub struct StreamGraph {
    node: usize,
    branches: Vec<SourceBranch>,
    gates: Vec<GateTask>,
    writers: Vec<(String, WriterSlot)>,
    stop: StopSignal,
}

impl std::fmt::Debug for StreamGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamGraph")
            .field("node", &self.node)
            .field("branches", &self.branches.len())
            .field("gates", &self.gates.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl StreamGraph {
    /// Compile `node`, opening the writers of its sinks, traps and written
    /// boundaries.
    pub async fn build(
        node: &FlowNode,
        bindings: &TapBindings,
        boundaries: &BoundaryTaps,
        ctx: ExecutionContext,
    ) -> WeirResult<Self> {
        let mut builder = Builder {
            node,
            graph: &node.graph,
            bindings,
            boundaries,
            ctx,
            ducts: HashMap::new(),
            folded: HashSet::new(),
            branches: Vec::new(),
            gates: Vec::new(),
            writers: Vec::new(),
            traps: HashMap::new(),
        };
        if let Err(err) = builder.assemble().await {
            abort_writers(&builder.writers).await;
            return Err(err);
        }
        let Builder {
            branches,
            gates,
            writers,
            ctx,
            ..
        } = builder;
        Ok(Self {
            node: node.id,
            branches,
            gates,
            writers,
            stop: ctx.stop,
        })
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Run every branch and gate until they finish.
    pub async fn run(self) -> WeirResult<NodeOutcome> {
        let StreamGraph {
            node,
            branches,
            gates,
            writers,
            stop,
        } = self;
        debug!("node {node}: {} branches, {} gates", branches.len(), gates.len());

        let mut tasks: JoinSet<()> = JoinSet::new();
        for mut gate in gates {
            let stop = stop.clone();
            tasks.spawn(async move {
                let result = gate.run().await;
                settle(&stop, &result);
                drop(gate);
                result
            });
        }
        for branch in branches {
            let stop = stop.clone();
            tasks.spawn(async move {
                let result = branch.run().await;
                settle(&stop, &result);
                drop(branch);
                result
            });
        }

        let mut failure: Option<WeirError> = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    stop.stop();
                    if failure.is_none() {
                        warn!("node {node} failed: {err}");
                        failure = Some(err);
                    }
                }
            }
        }

        if stop.is_cancelled() {
            warn!("node {node} cancelled");
            abort_writers(&writers).await;
            return Ok(NodeOutcome::Cancelled);
        }
        if let Some(err) = failure {
            abort_writers(&writers).await;
            return Err(err);
        }
        close_writers(&writers).await?;
        Ok(NodeOutcome::Completed)
    }
}

/// Stop the node on a task's first real failure, before its ducts drop.
fn settle(stop: &StopSignal, result: &WeirResult<()>) {
    if let Err(err) = result {
        if !err.is_cancelled() {
            stop.stop();
        }
    }
}

async fn close_writers(writers: &[(String, WriterSlot)]) -> WeirResult<()> {
    for (index, (name, slot)) in writers.iter().enumerate() {
        let writer = slot.lock().await.take();
        if let Some(writer) = writer {
            if let Err(err) = writer.close().await {
                warn!("closing '{name}' failed: {err}");
                abort_writers(&writers[index + 1..]).await;
                return Err(err);
            }
        }
    }
    Ok(())
}

async fn abort_writers(writers: &[(String, WriterSlot)]) {
    for (_, slot) in writers {
        let writer = slot.lock().await.take();
        if let Some(writer) = writer {
            writer.abort().await;
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

struct Builder<'a> {
    node: &'a FlowNode,
    graph: &'a ElementGraph,
    bindings: &'a TapBindings,
    boundaries: &'a BoundaryTaps,
    ctx: ExecutionContext,
    /// Entry duct per element, dropped once the graph is built so gate
    /// channels close when their upstream tasks end.
    ducts: HashMap<ElementId, Arc<dyn Duct>>,
    folded: HashSet<ElementId>,
    branches: Vec<SourceBranch>,
    gates: Vec<GateTask>,
    writers: Vec<(String, WriterSlot)>,
    traps: HashMap<String, Trap>,
}

impl<'a> Builder<'a> {
    /// Build downstream first so every link finds its target.
    async fn assemble(&mut self) -> WeirResult<()> {
        let graph = self.graph;
        let mut order = graph.topological_order()?;
        order.reverse();
        for id in order {
            let element = graph.require(id)?;
            if self.node.reads.contains(&id) {
                self.read_head(element)?;
                continue;
            }
            match &element.kind {
                ElementKind::Source(_) => self.source(element)?,
                ElementKind::Sink => self.sink(element).await?,
                ElementKind::Boundary => self.boundary(element).await?,
                ElementKind::Each(spec) => self.each(element, spec).await?,
                ElementKind::Filter(spec) => self.filter(element, spec).await?,
                // folded when its grouping is reached
                ElementKind::Every(_) => {}
                ElementKind::GroupBy(spec) => self.group_by(element, spec).await?,
                ElementKind::CoGroup(spec) => self.co_group(element, spec).await?,
                ElementKind::HashJoin(spec) => self.hash_join(element, spec).await?,
                ElementKind::Merge => self.merge(element)?,
            }
        }
        if let Some(every) = graph
            .elements()
            .find(|e| matches!(e.kind, ElementKind::Every(_)) && !self.folded.contains(&e.id))
        {
            return Err(WeirError::planning(format!(
                "{every} does not follow a grouping in node {}",
                self.node.id
            )));
        }
        self.ducts.clear();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Fields and links
    // ------------------------------------------------------------------------

    fn input_fields(&self, element: &Element) -> WeirResult<Arc<Fields>> {
        self.graph
            .incoming(element.id)
            .first()
            .and_then(|e| e.scope.fields.clone())
            .map(Arc::new)
            .ok_or_else(|| WeirError::field(format!("{element} has no resolved input")))
    }

    fn output_fields(&self, id: ElementId) -> WeirResult<Arc<Fields>> {
        let element = self.graph.require(id)?;
        self.graph
            .output_fields(id)
            .cloned()
            .map(Arc::new)
            .ok_or_else(|| WeirError::field(format!("{element} has no resolved output")))
    }

    fn outputs(&self, id: ElementId) -> WeirResult<Outputs> {
        let links = self
            .graph
            .outgoing(id)
            .into_iter()
            .map(|edge| {
                let target = self.ducts.get(&edge.target).cloned().ok_or_else(|| {
                    WeirError::internal(format!("no duct built for {}", edge.target))
                })?;
                Ok(Link {
                    target,
                    ordinal: edge.scope.ordinal,
                })
            })
            .collect::<WeirResult<Vec<_>>>()?;
        Ok(Outputs::new(links))
    }

    /// Argument fields and their positions in `input`; `None` positions
    /// select everything.
    fn arguments(input: &Arc<Fields>, argument: Option<&Fields>) -> WeirResult<(Arc<Fields>, Option<Vec<usize>>)> {
        match argument {
            Some(args) => Ok((Arc::new(args.clone()), Some(input.positions(args)?))),
            None => Ok((Arc::clone(input), None)),
        }
    }

    fn key_positions(&self, element: &Element) -> WeirResult<Vec<Vec<usize>>> {
        let graph = self.graph;
        let incoming = graph.incoming(element.id);
        let width = incoming.iter().map(|e| e.scope.ordinal + 1).max().unwrap_or(0);
        let mut keys = vec![Vec::new(); width];
        for edge in incoming {
            let fields = edge.scope.resolved_fields()?;
            let key = edge.scope.key_fields.as_ref().ok_or_else(|| {
                WeirError::field(format!("{element} has no key on ordinal {}", edge.scope.ordinal))
            })?;
            keys[edge.scope.ordinal] = fields.positions(key)?;
        }
        Ok(keys)
    }

    fn comparator(&self, element: &Element) -> KeyComparator {
        self.graph
            .incoming(element.id)
            .first()
            .map(|e| e.scope.comparator.clone())
            .unwrap_or_else(KeyComparator::natural)
    }

    // ------------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------------

    async fn open(&mut self, name: &str, tap: &dyn SinkTap, fields: &Fields) -> WeirResult<WriterSlot> {
        let writer = tap.open_writer(fields).await?;
        let slot: WriterSlot = Arc::new(Mutex::new(Some(writer)));
        self.writers.push((name.to_string(), Arc::clone(&slot)));
        Ok(slot)
    }

    async fn trap(&mut self, element: &Element, fields: &Fields) -> WeirResult<Option<Trap>> {
        let Some(name) = &element.trap else {
            return Ok(None);
        };
        if let Some(trap) = self.traps.get(name) {
            return Ok(Some(trap.clone()));
        }
        let tap = Arc::clone(
            self.bindings
                .trap_for(name)
                .ok_or_else(|| WeirError::tap(format!("trap '{name}' of {element} is not bound")))?,
        );
        let slot = self.open(name, tap.as_ref(), fields).await?;
        let trap = Trap {
            name: name.clone(),
            slot,
        };
        self.traps.insert(name.clone(), trap.clone());
        Ok(Some(trap))
    }

    // ------------------------------------------------------------------------
    // Heads
    // ------------------------------------------------------------------------

    fn source(&mut self, element: &Element) -> WeirResult<()> {
        let tap = self
            .bindings
            .source_for(&element.name)
            .cloned()
            .ok_or_else(|| WeirError::tap(format!("no source bound to {element}")))?;
        let branch = SourceBranch {
            name: element.name.clone(),
            tap,
            fields: self.output_fields(element.id)?,
            outputs: self.outputs(element.id)?,
            ctx: self.ctx.clone(),
        };
        self.branches.push(branch);
        Ok(())
    }

    fn read_head(&mut self, element: &Element) -> WeirResult<()> {
        if !matches!(element.kind, ElementKind::Boundary) {
            return Err(WeirError::not_implemented(format!(
                "the stream engine cannot read {element} from another node"
            )));
        }
        let tap = self
            .boundaries
            .get(&element.id)
            .cloned()
            .ok_or_else(|| WeirError::internal(format!("no intermediate storage for {element}")))?;
        let branch = SourceBranch {
            name: element.name.clone(),
            tap: Arc::new(tap),
            fields: self.output_fields(element.id)?,
            outputs: self.outputs(element.id)?,
            ctx: self.ctx.clone(),
        };
        self.branches.push(branch);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Per-record stages
    // ------------------------------------------------------------------------

    async fn sink(&mut self, element: &Element) -> WeirResult<()> {
        let tap = self
            .bindings
            .sink_for(&element.name)
            .cloned()
            .ok_or_else(|| WeirError::tap(format!("no sink bound to {element}")))?;
        let fields = self.input_fields(element)?;
        let slot = self.open(&element.name, tap.as_ref(), &fields).await?;
        let duct = SinkDuct {
            name: element.name.clone(),
            slot: Some(slot),
            outputs: Outputs::default(),
            ctx: self.ctx.clone(),
        };
        self.ducts.insert(element.id, Arc::new(duct));
        Ok(())
    }

    async fn boundary(&mut self, element: &Element) -> WeirResult<()> {
        let slot = if self.node.writes.contains(&element.id) {
            let tap = self.boundaries.get(&element.id).cloned().ok_or_else(|| {
                WeirError::internal(format!("no intermediate storage for {element}"))
            })?;
            let fields = self.input_fields(element)?;
            Some(self.open(&element.name, &tap, &fields).await?)
        } else {
            None
        };
        let duct = SinkDuct {
            name: element.name.clone(),
            slot,
            outputs: self.outputs(element.id)?,
            ctx: self.ctx.clone(),
        };
        self.ducts.insert(element.id, Arc::new(duct));
        Ok(())
    }

    async fn each(&mut self, element: &Element, spec: &EachSpec) -> WeirResult<()> {
        let input = self.input_fields(element)?;
        let (arguments, positions) = Self::arguments(&input, spec.argument.as_ref())?;
        let trap = self.trap(element, &input).await?;
        let duct = EachDuct {
            name: element.name.clone(),
            function: Arc::clone(&spec.function),
            selector: spec.output,
            arguments,
            positions,
            output: self.output_fields(element.id)?,
            outputs: self.outputs(element.id)?,
            trap,
            ctx: self.ctx.clone(),
        };
        self.ducts.insert(element.id, Arc::new(duct));
        Ok(())
    }

    async fn filter(&mut self, element: &Element, spec: &FilterSpec) -> WeirResult<()> {
        let input = self.input_fields(element)?;
        let (arguments, positions) = Self::arguments(&input, spec.argument.as_ref())?;
        let trap = self.trap(element, &input).await?;
        let duct = FilterDuct {
            name: element.name.clone(),
            filter: Arc::clone(&spec.filter),
            arguments,
            positions,
            outputs: self.outputs(element.id)?,
            trap,
            ctx: self.ctx.clone(),
        };
        self.ducts.insert(element.id, Arc::new(duct));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------------

    fn gate(&mut self, element: &Element, logic: Box<dyn GateLogic>, fields: Arc<Fields>, outputs: Outputs) {
        let mut expected: Vec<usize> = Vec::new();
        for edge in self.graph.incoming(element.id) {
            let ordinal = edge.scope.ordinal;
            if expected.len() <= ordinal {
                expected.resize(ordinal + 1, 0);
            }
            expected[ordinal] += 1;
        }
        let (sender, rx) = mpsc::channel(self.ctx.config.channel_capacity);
        let input = GateInput {
            name: element.name.clone(),
            sender,
            stop: self.ctx.stop.clone(),
        };
        self.ducts.insert(element.id, Arc::new(input));
        self.gates.push(GateTask {
            rx,
            expected,
            logic,
            emitter: Emitter {
                name: element.name.clone(),
                fields,
                outputs,
                ctx: self.ctx.clone(),
            },
        });
    }

    /// Fold the `Every` chain after a grouping. Returns the aggregation, if
    /// any, and the element whose downstream the gate feeds.
    async fn every_chain(&mut self, grouping: &Element) -> WeirResult<(Option<Aggregation>, ElementId)> {
        let graph = self.graph;
        let mut steps = Vec::new();
        let mut tail = grouping.id;
        loop {
            let outgoing = graph.outgoing(tail);
            let everys = outgoing
                .iter()
                .filter(|e| graph.element(e.target).is_some_and(|t| matches!(t.kind, ElementKind::Every(_))))
                .count();
            if everys == 0 {
                break;
            }
            let current = graph.require(tail)?;
            if outgoing.len() != 1 {
                return Err(WeirError::not_implemented(format!(
                    "{current} feeds an Every alongside other elements"
                )));
            }
            let every = graph.require(outgoing[0].target)?;
            let ElementKind::Every(spec) = &every.kind else {
                return Err(WeirError::internal(format!("{every} is not an Every")));
            };
            let (key, values) = group_context(graph, every.id)?;
            let (arguments, positions) = match &spec.argument {
                Some(args) => (args.clone(), Some(values.positions(args)?)),
                None => (values, None),
            };
            let trap = self.trap(every, &key).await?;
            steps.push(AggregateStep {
                name: every.name.clone(),
                function: Arc::clone(&spec.function),
                arguments,
                positions,
                trap,
            });
            self.folded.insert(every.id);
            tail = every.id;
        }
        let aggregation = (!steps.is_empty()).then(|| Aggregation::new(steps));
        Ok((aggregation, tail))
    }

    async fn group_by(&mut self, element: &Element, spec: &GroupBySpec) -> WeirResult<()> {
        let (aggregation, tail) = self.every_chain(element).await?;
        let input = self.input_fields(element)?;
        let sort = match &spec.sort {
            Some(sort) => Some((input.positions(sort)?, spec.sort_comparator())),
            None => None,
        };
        let logic = GroupByGate::new(
            self.ctx.spill.clone(),
            self.comparator(element),
            self.key_positions(element)?,
            sort,
            !spec.unsorted,
            aggregation,
        );
        let fields = self.output_fields(tail)?;
        let outputs = self.outputs(tail)?;
        self.gate(element, Box::new(logic), fields, outputs);
        Ok(())
    }

    fn widths(&self, element: &Element, spec: &JoinSpec) -> WeirResult<Vec<usize>> {
        let widths = self
            .graph
            .incoming(element.id)
            .into_iter()
            .map(|e| e.scope.resolved_fields().map(Fields::len))
            .collect::<WeirResult<Vec<_>>>()?;
        Ok(match (spec.self_joins, widths.first()) {
            (Some(times), Some(width)) => vec![*width; times],
            _ => widths,
        })
    }

    async fn co_group(&mut self, element: &Element, spec: &JoinSpec) -> WeirResult<()> {
        let (aggregation, tail) = self.every_chain(element).await?;
        let key = spec
            .key_for(0)
            .cloned()
            .ok_or_else(|| WeirError::field(format!("{element} has no key")))?;
        let trap = self.trap(element, &key).await?;
        let logic = CoGroupGate::new(
            self.ctx.spill.clone(),
            self.comparator(element),
            self.key_positions(element)?,
            self.widths(element, spec)?,
            Arc::clone(&spec.joiner),
            spec.self_joins,
            trap,
            aggregation,
        );
        let fields = self.output_fields(tail)?;
        let outputs = self.outputs(tail)?;
        self.gate(element, Box::new(logic), fields, outputs);
        Ok(())
    }

    async fn hash_join(&mut self, element: &Element, spec: &JoinSpec) -> WeirResult<()> {
        if spec.self_joins.is_some() {
            return Err(WeirError::not_implemented(format!(
                "{element}: self-joins need a CoGroup"
            )));
        }
        let graph = self.graph;
        let incoming = graph.incoming(element.id);
        let streamed = incoming
            .iter()
            .find(|e| e.scope.has_annotation(STREAM_MODE, STREAMED))
            .or_else(|| incoming.first())
            .ok_or_else(|| WeirError::field(format!("{element} has no inputs")))?;
        let streamed_fields = streamed.scope.resolved_fields()?.clone();
        let streamed = streamed.scope.ordinal;
        let trap = self.trap(element, &streamed_fields).await?;
        let logic = HashJoinGate::new(
            self.ctx.spill.clone(),
            self.comparator(element),
            self.key_positions(element)?,
            self.widths(element, spec)?,
            Arc::clone(&spec.joiner),
            streamed,
            trap,
        );
        let fields = self.output_fields(element.id)?;
        let outputs = self.outputs(element.id)?;
        self.gate(element, Box::new(logic), fields, outputs);
        Ok(())
    }

    fn merge(&mut self, element: &Element) -> WeirResult<()> {
        let fields = self.output_fields(element.id)?;
        let outputs = self.outputs(element.id)?;
        self.gate(element, Box::new(MergeGate), fields, outputs);
        Ok(())
    }
}
