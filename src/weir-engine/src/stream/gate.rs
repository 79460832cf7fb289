//! Gates: stages fed by several upstream branches.
//!
//! Each gate runs as a task draining one bounded channel. Upstream branches
//! hold a [`GateInput`] and send records and completions tagged with their
//! ordinal; the single consuming loop is the only place gate state changes.
//! Once every incoming link has completed, the gate flushes, completes its
//! own downstream and resets for another pass.

use std::mem;
use std::sync::Arc;

use async_trait::async_trait;
use common_error::{ensure, WeirError, WeirResult};
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;
use weir_core::{
    Fields, GroupFunction, Joiner, KeyComparator, OperationError, OutputCollector, Tuple, TupleEntry,
};

use super::duct::{divert, Duct, Outputs, Trap};
use crate::closure::{Closure, ClosureSide, GroupView};
use crate::context::{ExecutionContext, StopSignal};
use crate::metrics::ExecutionTimer;
use crate::spill::{run_blocking, run_spilled, stream_list, KeyIndex, SpillConfig, SpillableList, SpillableMap};

#[derive(Debug)]
pub(crate) enum GateMessage {
    Record { ordinal: usize, tuple: Tuple },
    Complete { ordinal: usize },
}

/// The upstream end of a gate's channel.
pub(crate) struct GateInput {
    pub name: String,
    pub sender: mpsc::Sender<GateMessage>,
    pub stop: StopSignal,
}

impl GateInput {
    async fn send(&self, message: GateMessage) -> WeirResult<()> {
        tokio::select! {
            sent = self.sender.send(message) => sent.map_err(|_| {
                if self.stop.is_stopped() {
                    WeirError::cancelled("node stopped")
                } else {
                    WeirError::execution(format!("gate '{}' stopped receiving", self.name))
                }
            }),
            _ = self.stop.stopped() => Err(WeirError::cancelled("node stopped")),
        }
    }
}

#[async_trait]
impl Duct for GateInput {
    async fn receive(&self, ordinal: usize, entry: TupleEntry) -> WeirResult<()> {
        self.send(GateMessage::Record {
            ordinal,
            tuple: entry.into_tuple(),
        })
        .await
    }

    async fn complete(&self, ordinal: usize) -> WeirResult<()> {
        self.send(GateMessage::Complete { ordinal }).await
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// The downstream end of a gate.
pub(crate) struct Emitter {
    pub name: String,
    pub fields: Arc<Fields>,
    pub outputs: Outputs,
    pub ctx: ExecutionContext,
}

impl Emitter {
    async fn emit(&self, tuple: Tuple) -> WeirResult<()> {
        ensure!(
            tuple.len() == self.fields.len(),
            OperationError: "{}: emitted {} for fields {}", self.name, tuple, self.fields
        );
        self.ctx.update_metrics(&self.name, |m| m.add_out(1));
        self.outputs
            .receive(TupleEntry::new(Arc::clone(&self.fields), tuple))
            .await
    }

    async fn emit_all(&self, tuples: Vec<Tuple>) -> WeirResult<()> {
        for tuple in tuples {
            self.emit(tuple).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Gate Loop
// ============================================================================

/// What a gate does with the records it drains.
#[async_trait]
pub(crate) trait GateLogic: Send {
    async fn record(&mut self, ordinal: usize, tuple: Tuple, out: &Emitter) -> WeirResult<()>;

    /// Every link feeding `ordinal` has completed for this pass.
    async fn ordinal_complete(&mut self, _ordinal: usize, _out: &Emitter) -> WeirResult<()> {
        Ok(())
    }

    /// Every link has completed: emit what is buffered and reset.
    async fn flush(&mut self, out: &Emitter) -> WeirResult<()>;
}

pub(crate) struct GateTask {
    pub rx: mpsc::Receiver<GateMessage>,
    /// Links completing per ordinal in one pass.
    pub expected: Vec<usize>,
    pub logic: Box<dyn GateLogic>,
    pub emitter: Emitter,
}

impl GateTask {
    pub async fn run(&mut self) -> WeirResult<()> {
        let total: usize = self.expected.iter().sum();
        let mut pending = self.expected.clone();
        let mut remaining = total;
        let stop = self.emitter.ctx.stop.clone();
        loop {
            let message = tokio::select! {
                biased;
                _ = stop.stopped() => {
                    debug!("gate '{}' stopped with {} inputs pending", self.emitter.name, remaining);
                    return Err(WeirError::cancelled("node stopped"));
                }
                message = self.rx.recv() => message,
            };
            match message {
                Some(GateMessage::Record { ordinal, tuple }) => {
                    self.emitter.ctx.update_metrics(&self.emitter.name, |m| m.add_in(1));
                    self.logic.record(ordinal, tuple, &self.emitter).await?;
                }
                Some(GateMessage::Complete { ordinal }) => {
                    let left = pending.get_mut(ordinal).ok_or_else(|| {
                        WeirError::internal(format!(
                            "gate '{}' has no ordinal {ordinal}",
                            self.emitter.name
                        ))
                    })?;
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        self.logic.ordinal_complete(ordinal, &self.emitter).await?;
                    }
                    remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        stop.check()?;
                        let timer = ExecutionTimer::start();
                        self.logic.flush(&self.emitter).await?;
                        self.emitter.outputs.complete().await?;
                        debug!("gate '{}' flushed in {:?}", self.emitter.name, timer.elapsed());
                        self.emitter
                            .ctx
                            .update_metrics(&self.emitter.name, |m| m.add_time(timer.elapsed()));
                        pending = self.expected.clone();
                        remaining = total;
                    }
                }
                None if remaining == total => return Ok(()),
                None => {
                    stop.check()?;
                    return Err(WeirError::execution(format!(
                        "gate '{}' lost its inputs with {remaining} completions pending",
                        self.emitter.name
                    )));
                }
            }
        }
    }
}

// ============================================================================
// Every Chains
// ============================================================================

/// One `Every` folded into a grouping.
pub(crate) struct AggregateStep {
    pub name: String,
    pub function: Arc<dyn GroupFunction>,
    pub arguments: Fields,
    pub positions: Option<Vec<usize>>,
    pub trap: Option<Trap>,
}

/// The `Every` chain after a grouping. Each group yields the key followed by
/// one result of every step, for every combination of results.
pub(crate) struct Aggregation {
    steps: Arc<Vec<AggregateStep>>,
}

impl Aggregation {
    pub fn new(steps: Vec<AggregateStep>) -> Self {
        Self { steps: Arc::new(steps) }
    }

    async fn apply(&self, key: Tuple, values: SpillableList<Tuple>, out: &Emitter) -> WeirResult<()> {
        let outcome = if values.spill_count() == 0 {
            aggregate(&self.steps, &key, &values)
        } else {
            let steps = Arc::clone(&self.steps);
            let group = key.clone();
            run_blocking(move || Ok(aggregate(&steps, &group, &values))).await?
        };
        let results = match outcome {
            Ok(results) => results,
            Err((failed, err)) => {
                let step = &self.steps[failed];
                return divert(&out.ctx, &step.name, step.trap.as_ref(), err, &key).await;
            }
        };
        let mut rows = vec![key];
        for (step, results) in self.steps.iter().zip(&results) {
            out.ctx.update_metrics(&step.name, |m| {
                m.groups += 1;
                m.add_out(results.len());
            });
            rows = rows
                .iter()
                .flat_map(|row| results.iter().map(move |result| row.append(result)))
                .collect();
        }
        out.emit_all(rows).await
    }
}

/// Results of every step over one group, or the failing step's index.
fn aggregate(
    steps: &[AggregateStep],
    key: &Tuple,
    values: &SpillableList<Tuple>,
) -> Result<Vec<Vec<Tuple>>, (usize, OperationError)> {
    let mut results = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let view = GroupView::new(values, &step.arguments, step.positions.as_deref());
        results.push(run_aggregate(step, key, &view).map_err(|err| (i, err))?);
    }
    Ok(results)
}

fn run_aggregate(step: &AggregateStep, key: &Tuple, view: &GroupView<'_>) -> Result<Vec<Tuple>, OperationError> {
    let mut collector = OutputCollector::new();
    step.function.aggregate(key, view, &mut collector)?;
    let results = collector.drain();
    let declared = step.function.declared_fields();
    if let Some(bad) = results.iter().find(|r| r.len() != declared.len()) {
        return Err(OperationError::failed(format!(
            "{} emitted {bad}, declared {declared}",
            step.function.name()
        )));
    }
    Ok(results)
}

// ============================================================================
// Key Groups
// ============================================================================

/// Elements buffered ahead of a gate reading a spilled group.
const READ_AHEAD: usize = 64;

/// One key's group on every input; `None` where an input lacks the key.
type InputGroups = Vec<Option<SpillableList<Tuple>>>;

type KeyGroups = Vec<(Tuple, InputGroups)>;

fn in_memory(groups: &[Option<SpillableList<Tuple>>]) -> bool {
    groups.iter().flatten().all(|group| group.spill_count() == 0)
}

/// Regroup every map by key, leaving out ordinal `skip`. Keys stay in
/// first-seen order.
fn index_groups(
    maps: Vec<SpillableMap<Tuple>>,
    comparator: KeyComparator,
    skip: Option<usize>,
) -> WeirResult<(KeyIndex, KeyGroups)> {
    let inputs = maps.len();
    let mut index = KeyIndex::new(comparator);
    let mut groups: KeyGroups = Vec::new();
    for (ordinal, map) in maps.into_iter().enumerate() {
        if Some(ordinal) == skip {
            continue;
        }
        for (key, values) in map.into_groups()? {
            let (slot, fresh) = index.get_or_insert(&key, groups.len());
            if fresh {
                groups.push((key, (0..inputs).map(|_| None).collect()));
            }
            groups[slot].1[ordinal] = Some(values);
        }
    }
    Ok((index, groups))
}

async fn regroup(
    maps: Vec<SpillableMap<Tuple>>,
    comparator: KeyComparator,
    skip: Option<usize>,
) -> WeirResult<(KeyIndex, KeyGroups)> {
    let in_memory = maps.iter().all(|map| !map.needs_disk());
    run_spilled(in_memory, move || index_groups(maps, comparator, skip)).await
}

/// Hand one key's groups to the joiner. A self-join reads a copy of its sole
/// group per repeat.
fn join_groups(
    joiner: &dyn Joiner,
    widths: &[usize],
    self_joins: Option<usize>,
    key: &Tuple,
    groups: &[Option<SpillableList<Tuple>>],
) -> WeirResult<Result<Vec<Tuple>, OperationError>> {
    let copies: Vec<SpillableList<Tuple>> = match (self_joins, groups.first()) {
        (Some(times), Some(Some(sole))) => (0..times).map(|_| sole.duplicate()).collect::<WeirResult<_>>()?,
        _ => Vec::new(),
    };
    let sides: Vec<ClosureSide<'_>> = if self_joins.is_some() {
        copies.iter().map(ClosureSide::List).collect()
    } else {
        groups
            .iter()
            .map(|group| group.as_ref().map_or(ClosureSide::Empty, ClosureSide::List))
            .collect()
    };
    let closure = Closure::new(key, widths, sides);
    let mut collector = OutputCollector::new();
    Ok(joiner.join(&closure, &mut collector).map(|()| collector.drain()))
}

// ============================================================================
// GroupBy
// ============================================================================

pub(crate) struct GroupByGate {
    config: SpillConfig,
    comparator: KeyComparator,
    /// Key positions per ordinal.
    keys: Vec<Vec<usize>>,
    /// Secondary sort positions and their ordering.
    sort: Option<(Vec<usize>, KeyComparator)>,
    sorted: bool,
    aggregation: Option<Aggregation>,
    map: SpillableMap<Tuple>,
}

impl GroupByGate {
    pub fn new(
        config: SpillConfig,
        comparator: KeyComparator,
        keys: Vec<Vec<usize>>,
        sort: Option<(Vec<usize>, KeyComparator)>,
        sorted: bool,
        aggregation: Option<Aggregation>,
    ) -> Self {
        let map = SpillableMap::new(config.clone(), comparator.clone());
        Self {
            config,
            comparator,
            keys,
            sort,
            sorted,
            aggregation,
            map,
        }
    }

    async fn secondary_sort(&self, values: SpillableList<Tuple>) -> WeirResult<SpillableList<Tuple>> {
        let Some((positions, comparator)) = &self.sort else {
            return Ok(values);
        };
        let positions = positions.clone();
        let comparator = comparator.clone();
        run_spilled(values.spill_count() == 0, move || {
            values.into_sorted_by(|a, b| comparator.compare_at(a, b, &positions))
        })
        .await
    }
}

#[async_trait]
impl GateLogic for GroupByGate {
    async fn record(&mut self, ordinal: usize, tuple: Tuple, _out: &Emitter) -> WeirResult<()> {
        let positions = self
            .keys
            .get(ordinal)
            .ok_or_else(|| WeirError::internal(format!("no key for ordinal {ordinal}")))?;
        let key = tuple.select(positions)?;
        self.map.insert_async(key, tuple).await
    }

    async fn flush(&mut self, out: &Emitter) -> WeirResult<()> {
        let map = mem::replace(
            &mut self.map,
            SpillableMap::new(self.config.clone(), self.comparator.clone()),
        );
        let spills = map.spill_count();
        let comparator = self.comparator.clone();
        let sorted = self.sorted;
        let groups = run_spilled(!map.needs_disk(), move || {
            let mut groups = map.into_groups()?;
            if sorted {
                KeyIndex::new(comparator).sort(&mut groups);
            }
            Ok(groups)
        })
        .await?;
        debug!("gate '{}' flushing {} groups ({spills} spills)", out.name, groups.len());
        for (key, values) in groups {
            out.ctx.stop.check()?;
            let values = self.secondary_sort(values).await?;
            match &self.aggregation {
                Some(aggregation) => aggregation.apply(key, values, out).await?,
                None => {
                    let mut rows = stream_list(Arc::new(values), READ_AHEAD);
                    while let Some(tuple) = rows.next().await {
                        out.emit(tuple?).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// CoGroup
// ============================================================================

pub(crate) struct CoGroupGate {
    config: SpillConfig,
    comparator: KeyComparator,
    keys: Vec<Vec<usize>>,
    /// Tuple width per joiner ordinal.
    widths: Vec<usize>,
    joiner: Arc<dyn Joiner>,
    /// Repeats of the sole input for a self-join.
    self_joins: Option<usize>,
    trap: Option<Trap>,
    aggregation: Option<Aggregation>,
    maps: Vec<SpillableMap<Tuple>>,
}

impl CoGroupGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SpillConfig,
        comparator: KeyComparator,
        keys: Vec<Vec<usize>>,
        widths: Vec<usize>,
        joiner: Arc<dyn Joiner>,
        self_joins: Option<usize>,
        trap: Option<Trap>,
        aggregation: Option<Aggregation>,
    ) -> Self {
        let maps = fresh_maps(&config, &comparator, keys.len());
        Self {
            config,
            comparator,
            keys,
            widths,
            joiner,
            self_joins,
            trap,
            aggregation,
            maps,
        }
    }

    async fn join(&self, key: &Tuple, groups: InputGroups) -> WeirResult<Result<Vec<Tuple>, OperationError>> {
        if in_memory(&groups) {
            return join_groups(&*self.joiner, &self.widths, self.self_joins, key, &groups);
        }
        let joiner = Arc::clone(&self.joiner);
        let widths = self.widths.clone();
        let self_joins = self.self_joins;
        let key = key.clone();
        run_blocking(move || join_groups(&*joiner, &widths, self_joins, &key, &groups)).await
    }

    async fn emit_joined(&self, key: Tuple, joined: Vec<Tuple>, out: &Emitter) -> WeirResult<()> {
        match &self.aggregation {
            Some(aggregation) => {
                let mut values = SpillableList::new(self.config.clone());
                for tuple in joined {
                    values.push_async(tuple).await?;
                }
                aggregation.apply(key, values, out).await
            }
            None => out.emit_all(joined).await,
        }
    }
}

fn fresh_maps(config: &SpillConfig, comparator: &KeyComparator, inputs: usize) -> Vec<SpillableMap<Tuple>> {
    (0..inputs)
        .map(|_| SpillableMap::new(config.clone(), comparator.clone()))
        .collect()
}

#[async_trait]
impl GateLogic for CoGroupGate {
    async fn record(&mut self, ordinal: usize, tuple: Tuple, _out: &Emitter) -> WeirResult<()> {
        let positions = self
            .keys
            .get(ordinal)
            .ok_or_else(|| WeirError::internal(format!("no key for ordinal {ordinal}")))?;
        let key = tuple.select(positions)?;
        self.maps[ordinal].insert_async(key, tuple).await
    }

    async fn flush(&mut self, out: &Emitter) -> WeirResult<()> {
        let maps = mem::replace(
            &mut self.maps,
            fresh_maps(&self.config, &self.comparator, self.keys.len()),
        );
        let (index, mut merged) = regroup(maps, self.comparator.clone(), None).await?;
        index.sort(&mut merged);
        debug!("gate '{}' joining {} keys", out.name, merged.len());
        for (key, groups) in merged {
            out.ctx.stop.check()?;
            match self.join(&key, groups).await? {
                Ok(joined) => self.emit_joined(key, joined, out).await?,
                Err(err) => divert(&out.ctx, &out.name, self.trap.as_ref(), err, &key).await?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// HashJoin
// ============================================================================

/// Join that buffers its accumulated inputs and streams one input past them.
///
/// Streamed records arriving before every accumulated input has completed
/// are stashed and replayed once the accumulated side is ready.
pub(crate) struct HashJoinGate {
    config: SpillConfig,
    comparator: KeyComparator,
    keys: Vec<Vec<usize>>,
    widths: Vec<usize>,
    joiner: Arc<dyn Joiner>,
    streamed: usize,
    trap: Option<Trap>,
    maps: Vec<SpillableMap<Tuple>>,
    accumulating: usize,
    stash: SpillableList<Tuple>,
    table: Option<Arc<JoinTable>>,
    /// Per table slot: reached by a streamed record this pass.
    matched: Vec<bool>,
}

/// Accumulated groups indexed by key.
struct JoinTable {
    index: KeyIndex,
    groups: KeyGroups,
}

impl HashJoinGate {
    pub fn new(
        config: SpillConfig,
        comparator: KeyComparator,
        keys: Vec<Vec<usize>>,
        widths: Vec<usize>,
        joiner: Arc<dyn Joiner>,
        streamed: usize,
        trap: Option<Trap>,
    ) -> Self {
        let inputs = keys.len();
        Self {
            maps: fresh_maps(&config, &comparator, inputs),
            accumulating: inputs.saturating_sub(1),
            stash: SpillableList::new(config.clone()),
            table: None,
            matched: Vec::new(),
            config,
            comparator,
            keys,
            widths,
            joiner,
            streamed,
            trap,
        }
    }

    async fn build_table(&mut self) -> WeirResult<()> {
        let maps = mem::take(&mut self.maps);
        let (index, groups) = regroup(maps, self.comparator.clone(), Some(self.streamed)).await?;
        self.matched = vec![false; groups.len()];
        self.table = Some(Arc::new(JoinTable { index, groups }));
        Ok(())
    }

    async fn join_streamed(&mut self, tuple: Tuple, out: &Emitter) -> WeirResult<()> {
        let table = self
            .table
            .clone()
            .ok_or_else(|| WeirError::internal("hash join streamed a record before its table was built"))?;
        let key = tuple.select(&self.keys[self.streamed])?;
        let slot = table.index.get(&key);
        if let Some(slot) = slot {
            self.matched[slot] = true;
        }
        let outcome = match slot {
            Some(s) if !in_memory(&table.groups[s].1) => {
                let joiner = Arc::clone(&self.joiner);
                let widths = self.widths.clone();
                let streamed = self.streamed;
                let record = tuple.clone();
                run_blocking(move || Ok(join_record(&*joiner, &widths, streamed, &table, slot, &key, &record)))
                    .await?
            }
            _ => join_record(&*self.joiner, &self.widths, self.streamed, &table, slot, &key, &tuple),
        };
        match outcome {
            Ok(joined) => out.emit_all(joined).await,
            Err(err) => divert(&out.ctx, &out.name, self.trap.as_ref(), err, &tuple).await,
        }
    }

    /// Join every stashed record, in arrival order.
    async fn replay(&mut self, out: &Emitter) -> WeirResult<()> {
        let stash = mem::replace(&mut self.stash, SpillableList::new(self.config.clone()));
        if stash.is_empty() {
            return Ok(());
        }
        debug!("gate '{}' replaying {} stashed records", out.name, stash.len());
        let mut records = stream_list(Arc::new(stash), READ_AHEAD);
        while let Some(tuple) = records.next().await {
            out.ctx.stop.check()?;
            self.join_streamed(tuple?, out).await?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.maps = fresh_maps(&self.config, &self.comparator, self.keys.len());
        self.accumulating = self.keys.len().saturating_sub(1);
        self.stash = SpillableList::new(self.config.clone());
        self.table = None;
        self.matched.clear();
    }
}

fn join_record(
    joiner: &dyn Joiner,
    widths: &[usize],
    streamed: usize,
    table: &JoinTable,
    slot: Option<usize>,
    key: &Tuple,
    tuple: &Tuple,
) -> Result<Vec<Tuple>, OperationError> {
    let sides: Vec<ClosureSide<'_>> = (0..widths.len())
        .map(|ordinal| {
            if ordinal == streamed {
                return ClosureSide::Record(tuple);
            }
            slot.and_then(|s| table.groups[s].1[ordinal].as_ref())
                .map_or(ClosureSide::Empty, ClosureSide::List)
        })
        .collect();
    let closure = Closure::new(key, widths, sides);
    let mut collector = OutputCollector::new();
    joiner.join(&closure, &mut collector).map(|()| collector.drain())
}

#[async_trait]
impl GateLogic for HashJoinGate {
    async fn record(&mut self, ordinal: usize, tuple: Tuple, out: &Emitter) -> WeirResult<()> {
        if ordinal == self.streamed {
            if self.table.is_some() {
                return self.join_streamed(tuple, out).await;
            }
            return self.stash.push_async(tuple).await;
        }
        let positions = self
            .keys
            .get(ordinal)
            .ok_or_else(|| WeirError::internal(format!("no key for ordinal {ordinal}")))?;
        let key = tuple.select(positions)?;
        self.maps[ordinal].insert_async(key, tuple).await
    }

    async fn ordinal_complete(&mut self, ordinal: usize, out: &Emitter) -> WeirResult<()> {
        if ordinal == self.streamed {
            return Ok(());
        }
        self.accumulating = self.accumulating.saturating_sub(1);
        if self.accumulating > 0 {
            return Ok(());
        }
        self.build_table().await?;
        debug!("gate '{}' accumulated {} keys", out.name, self.matched.len());
        self.replay(out).await
    }

    async fn flush(&mut self, out: &Emitter) -> WeirResult<()> {
        if self.table.is_none() {
            self.build_table().await?;
        }
        self.replay(out).await?;
        if let Some(table) = self.table.take() {
            // keys no streamed record reached still go to the joiner
            for slot in 0..table.groups.len() {
                if self.matched[slot] {
                    continue;
                }
                out.ctx.stop.check()?;
                let (key, groups) = &table.groups[slot];
                let outcome = if in_memory(groups) {
                    join_groups(&*self.joiner, &self.widths, None, key, groups)?
                } else {
                    let joiner = Arc::clone(&self.joiner);
                    let widths = self.widths.clone();
                    let table = Arc::clone(&table);
                    run_blocking(move || {
                        let (key, groups) = &table.groups[slot];
                        join_groups(&*joiner, &widths, None, key, groups)
                    })
                    .await?
                };
                match outcome {
                    Ok(joined) => out.emit_all(joined).await?,
                    Err(err) => divert(&out.ctx, &out.name, self.trap.as_ref(), err, key).await?,
                }
            }
        }
        self.reset();
        Ok(())
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Forwards records as they arrive.
pub(crate) struct MergeGate;

#[async_trait]
impl GateLogic for MergeGate {
    async fn record(&mut self, _ordinal: usize, tuple: Tuple, out: &Emitter) -> WeirResult<()> {
        out.emit(tuple).await
    }

    async fn flush(&mut self, _out: &Emitter) -> WeirResult<()> {
        Ok(())
    }
}
