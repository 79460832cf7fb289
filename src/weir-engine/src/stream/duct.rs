//! Per-record stages of a stream graph.

use std::sync::Arc;

use async_trait::async_trait;
use common_error::{WeirError, WeirResult};
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::Mutex;
use weir_core::{Fields, Filter, Function, OperationError, OutputCollector, Tuple, TupleEntry};
use weir_logical::OutputSelector;

use crate::context::ExecutionContext;
use crate::metrics::ExecutionTimer;
use crate::tap::{SourceTap, TupleWriter};

/// A stage records are pushed through.
///
/// `ordinal` is the input position the record arrives on. Every upstream
/// link calls `complete` exactly once, after its last record.
#[async_trait]
pub(crate) trait Duct: Send + Sync {
    async fn receive(&self, ordinal: usize, entry: TupleEntry) -> WeirResult<()>;

    async fn complete(&self, ordinal: usize) -> WeirResult<()>;
}

/// Edge from a stage to one downstream duct.
#[derive(Clone)]
pub(crate) struct Link {
    pub target: Arc<dyn Duct>,
    pub ordinal: usize,
}

/// Downstream links in declared order.
#[derive(Clone, Default)]
pub(crate) struct Outputs {
    links: Vec<Link>,
}

impl Outputs {
    pub fn new(links: Vec<Link>) -> Self {
        Self { links }
    }

    pub async fn receive(&self, entry: TupleEntry) -> WeirResult<()> {
        if let Some((last, rest)) = self.links.split_last() {
            for link in rest {
                link.target.receive(link.ordinal, entry.clone()).await?;
            }
            last.target.receive(last.ordinal, entry).await?;
        }
        Ok(())
    }

    pub async fn complete(&self) -> WeirResult<()> {
        for link in &self.links {
            link.target.complete(link.ordinal).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Writers and Traps
// ============================================================================

/// An open writer shared between the duct using it and the node that closes
/// or aborts it.
pub(crate) type WriterSlot = Arc<Mutex<Option<Box<dyn TupleWriter>>>>;

pub(crate) async fn write_to(slot: &WriterSlot, name: &str, tuple: Tuple) -> WeirResult<()> {
    match slot.lock().await.as_mut() {
        Some(writer) => writer.write(tuple).await,
        None => Err(WeirError::internal(format!("writer for '{name}' is already closed"))),
    }
}

/// Trap tap bound to an element.
#[derive(Clone)]
pub(crate) struct Trap {
    pub name: String,
    pub slot: WriterSlot,
}

/// Divert `input` to the trap when the failure allows it, otherwise turn the
/// failure into the error that aborts the node.
pub(crate) async fn divert(
    ctx: &ExecutionContext,
    element: &str,
    trap: Option<&Trap>,
    err: OperationError,
    input: &Tuple,
) -> WeirResult<()> {
    match trap {
        Some(trap) if err.is_trappable() => {
            warn!("{element}: trapping {input} into '{}': {err}", trap.name);
            write_to(&trap.slot, &trap.name, input.clone()).await?;
            ctx.update_metrics(element, |m| m.add_trapped());
            Ok(())
        }
        _ => Err(match err {
            OperationError::Resource(inner) => inner,
            other => WeirError::operation(format!("{element}: {other}")),
        }),
    }
}

fn check_width(function: &str, result: &Tuple, declared: &Fields) -> Result<(), OperationError> {
    if result.len() == declared.len() {
        Ok(())
    } else {
        Err(OperationError::failed(format!(
            "{function} emitted {result}, declared {declared}"
        )))
    }
}

// ============================================================================
// Each
// ============================================================================

pub(crate) struct EachDuct {
    pub name: String,
    pub function: Arc<dyn Function>,
    pub selector: OutputSelector,
    pub arguments: Arc<Fields>,
    /// Positions of the arguments in the input; `None` passes every field.
    pub positions: Option<Vec<usize>>,
    pub output: Arc<Fields>,
    pub outputs: Outputs,
    pub trap: Option<Trap>,
    pub ctx: ExecutionContext,
}

impl EachDuct {
    fn arguments(&self, input: &Tuple) -> WeirResult<TupleEntry> {
        let tuple = match &self.positions {
            Some(positions) => input.select(positions)?,
            None => input.clone(),
        };
        Ok(TupleEntry::new(Arc::clone(&self.arguments), tuple))
    }

    fn combine(&self, input: &Tuple, result: Tuple) -> Tuple {
        match self.selector {
            OutputSelector::All => input.append(&result),
            OutputSelector::Results => result,
            OutputSelector::Replace => {
                let mut values = input.values().to_vec();
                let positions = self.positions.clone().unwrap_or_else(|| (0..values.len()).collect());
                for (position, value) in positions.into_iter().zip(result.into_values()) {
                    if let Some(slot) = values.get_mut(position) {
                        *slot = value;
                    }
                }
                Tuple::new(values)
            }
        }
    }

    fn operate(&self, args: &TupleEntry) -> Result<Vec<Tuple>, OperationError> {
        let mut collector = OutputCollector::new();
        self.function.operate(args, &mut collector)?;
        let results = collector.drain();
        let declared = self.function.declared_fields();
        for result in &results {
            check_width(self.function.name(), result, declared)?;
        }
        Ok(results)
    }
}

#[async_trait]
impl Duct for EachDuct {
    async fn receive(&self, _ordinal: usize, entry: TupleEntry) -> WeirResult<()> {
        let timer = ExecutionTimer::start();
        let args = self.arguments(entry.tuple())?;
        let results = match self.operate(&args) {
            Ok(results) => results,
            Err(err) => return divert(&self.ctx, &self.name, self.trap.as_ref(), err, entry.tuple()).await,
        };
        let emitted = results.len();
        for result in results {
            let tuple = self.combine(entry.tuple(), result);
            self.outputs
                .receive(TupleEntry::new(Arc::clone(&self.output), tuple))
                .await?;
        }
        self.ctx.update_metrics(&self.name, |m| {
            m.add_in(1);
            m.add_out(emitted);
            m.add_time(timer.elapsed());
        });
        Ok(())
    }

    async fn complete(&self, _ordinal: usize) -> WeirResult<()> {
        self.outputs.complete().await
    }
}

// ============================================================================
// Filter
// ============================================================================

pub(crate) struct FilterDuct {
    pub name: String,
    pub filter: Arc<dyn Filter>,
    pub arguments: Arc<Fields>,
    pub positions: Option<Vec<usize>>,
    pub outputs: Outputs,
    pub trap: Option<Trap>,
    pub ctx: ExecutionContext,
}

#[async_trait]
impl Duct for FilterDuct {
    async fn receive(&self, _ordinal: usize, entry: TupleEntry) -> WeirResult<()> {
        let args = match &self.positions {
            Some(positions) => entry.tuple().select(positions)?,
            None => entry.tuple().clone(),
        };
        let args = TupleEntry::new(Arc::clone(&self.arguments), args);
        let remove = match self.filter.is_remove(&args) {
            Ok(remove) => remove,
            Err(err) => return divert(&self.ctx, &self.name, self.trap.as_ref(), err, entry.tuple()).await,
        };
        self.ctx.update_metrics(&self.name, |m| {
            m.add_in(1);
            m.add_out(usize::from(!remove));
        });
        if remove {
            Ok(())
        } else {
            self.outputs.receive(entry).await
        }
    }

    async fn complete(&self, _ordinal: usize) -> WeirResult<()> {
        self.outputs.complete().await
    }
}

// ============================================================================
// Sink and Boundary
// ============================================================================

/// Writes records to a tap writer. A written `Boundary` also forwards to
/// whatever follows it inside the node.
pub(crate) struct SinkDuct {
    pub name: String,
    pub slot: Option<WriterSlot>,
    pub outputs: Outputs,
    pub ctx: ExecutionContext,
}

#[async_trait]
impl Duct for SinkDuct {
    async fn receive(&self, _ordinal: usize, entry: TupleEntry) -> WeirResult<()> {
        if let Some(slot) = &self.slot {
            write_to(slot, &self.name, entry.tuple().clone()).await?;
            self.ctx.update_metrics(&self.name, |m| m.add_in(1));
        }
        self.outputs.receive(entry).await
    }

    async fn complete(&self, _ordinal: usize) -> WeirResult<()> {
        self.outputs.complete().await
    }
}

// ============================================================================
// Source Branch
// ============================================================================

/// Reads one head of the node and pushes its records downstream.
///
/// Runs as its own task and stops between records once the node stops.
pub(crate) struct SourceBranch {
    pub name: String,
    pub tap: Arc<dyn SourceTap>,
    pub fields: Arc<Fields>,
    pub outputs: Outputs,
    pub ctx: ExecutionContext,
}

impl SourceBranch {
    pub async fn run(&self) -> WeirResult<()> {
        let mut stream = self.tap.open().await?;
        let mut count = 0usize;
        while let Some(tuple) = stream.next().await {
            self.ctx.stop.check()?;
            let tuple = tuple?;
            if tuple.len() != self.fields.len() {
                return Err(WeirError::tap(format!(
                    "source '{}' produced {tuple} for fields {}",
                    self.name, self.fields
                )));
            }
            count += 1;
            self.outputs
                .receive(TupleEntry::new(Arc::clone(&self.fields), tuple))
                .await?;
        }
        self.ctx.stop.check()?;
        debug!("source '{}' read {count} records", self.name);
        self.ctx.update_metrics(&self.name, |m| m.add_out(count));
        self.outputs.complete().await
    }
}
