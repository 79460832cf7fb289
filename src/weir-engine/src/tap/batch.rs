//! Arrow `RecordBatch` interop.

use std::sync::{Arc, Mutex, PoisonError};

use arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Float32Array, Float64Array, Int32Array,
    Int64Array, LargeStringArray, NullArray, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use async_trait::async_trait;
use common_error::{WeirError, WeirResult};
use futures::stream;
use weir_core::{Fields, Tuple, Value};

use super::{SinkTap, SourceTap, TupleStream, TupleWriter};

/// Tap over Arrow record batches.
///
/// As a source it yields the rows of its batches; as a sink it collects
/// rows and publishes them as one batch per closed writer.
#[derive(Debug, Clone, Default)]
pub struct RecordBatchTap {
    batches: Arc<Mutex<Vec<RecordBatch>>>,
}

impl RecordBatchTap {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            batches: Arc::new(Mutex::new(batches)),
        }
    }

    pub fn batches(&self) -> Vec<RecordBatch> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn num_rows(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(RecordBatch::num_rows)
            .sum()
    }
}

#[async_trait]
impl SourceTap for RecordBatchTap {
    async fn open(&self) -> WeirResult<TupleStream> {
        let mut rows = Vec::new();
        for batch in self.batches() {
            rows.extend(record_batch_to_tuples(&batch)?);
        }
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }
}

#[async_trait]
impl SinkTap for RecordBatchTap {
    async fn open_writer(&self, fields: &Fields) -> WeirResult<Box<dyn TupleWriter>> {
        Ok(Box::new(BatchWriter {
            fields: fields.clone(),
            rows: Vec::new(),
            target: Arc::clone(&self.batches),
        }))
    }
}

struct BatchWriter {
    fields: Fields,
    rows: Vec<Tuple>,
    target: Arc<Mutex<Vec<RecordBatch>>>,
}

#[async_trait]
impl TupleWriter for BatchWriter {
    async fn write(&mut self, tuple: Tuple) -> WeirResult<()> {
        self.rows.push(tuple);
        Ok(())
    }

    async fn close(self: Box<Self>) -> WeirResult<()> {
        let batch = tuples_to_record_batch(&self.fields, &self.rows)?;
        self.target
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
        Ok(())
    }

    async fn abort(self: Box<Self>) {}
}

// ============================================================================
// Conversion
// ============================================================================

/// Rows of a batch as tuples, in column order.
pub fn record_batch_to_tuples(batch: &RecordBatch) -> WeirResult<Vec<Tuple>> {
    let columns = batch
        .columns()
        .iter()
        .map(column_values)
        .collect::<WeirResult<Vec<_>>>()?;
    let mut rows: Vec<Vec<Value>> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();
    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }
    Ok(rows.into_iter().map(Tuple::new).collect())
}

fn column_values(column: &ArrayRef) -> WeirResult<Vec<Value>> {
    match column.data_type() {
        DataType::Null => Ok(vec![Value::Null; column.len()]),
        DataType::Boolean => values::<BooleanArray>(column, |a, i| Value::Bool(a.value(i))),
        DataType::Int32 => values::<Int32Array>(column, |a, i| Value::Int64(i64::from(a.value(i)))),
        DataType::Int64 => values::<Int64Array>(column, |a, i| Value::Int64(a.value(i))),
        DataType::Float32 => {
            values::<Float32Array>(column, |a, i| Value::Float64(f64::from(a.value(i))))
        }
        DataType::Float64 => values::<Float64Array>(column, |a, i| Value::Float64(a.value(i))),
        DataType::Utf8 => values::<StringArray>(column, |a, i| Value::String(a.value(i).to_string())),
        DataType::LargeUtf8 => {
            values::<LargeStringArray>(column, |a, i| Value::String(a.value(i).to_string()))
        }
        DataType::Binary => values::<BinaryArray>(column, |a, i| Value::Binary(a.value(i).to_vec())),
        other => Err(WeirError::tap(format!("unsupported arrow type {other}"))),
    }
}

fn values<A: Array + 'static>(column: &ArrayRef, f: impl Fn(&A, usize) -> Value) -> WeirResult<Vec<Value>> {
    let array = column.as_any().downcast_ref::<A>().ok_or_else(|| {
        WeirError::internal(format!("array does not match type {}", column.data_type()))
    })?;
    Ok((0..array.len())
        .map(|i| if array.is_null(i) { Value::Null } else { f(array, i) })
        .collect())
}

/// Build a batch from tuples. Column types are inferred from the values:
/// integers mixed with floats widen to `Float64`, all-null columns are `Null`.
pub fn tuples_to_record_batch(fields: &Fields, rows: &[Tuple]) -> WeirResult<RecordBatch> {
    if let Some(row) = rows.iter().find(|r| r.len() != fields.len()) {
        return Err(WeirError::value_error(format!(
            "row {row} does not match fields {fields}"
        )));
    }
    let mut schema_fields = Vec::with_capacity(fields.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());
    for (index, name) in fields.iter().enumerate() {
        let cells: Vec<&Value> = rows.iter().filter_map(|r| r.get(index)).collect();
        let data_type = infer_type(name, &cells)?;
        columns.push(build_column(&data_type, &cells));
        schema_fields.push(Field::new(name, data_type, true));
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(schema_fields)),
        columns,
        &options,
    )?)
}

fn infer_type(name: &str, cells: &[&Value]) -> WeirResult<DataType> {
    let mut inferred = DataType::Null;
    for cell in cells {
        let next = match cell {
            Value::Null => continue,
            Value::Bool(_) => DataType::Boolean,
            Value::Int64(_) => DataType::Int64,
            Value::Float64(_) => DataType::Float64,
            Value::String(_) => DataType::Utf8,
            Value::Binary(_) => DataType::Binary,
        };
        inferred = match (&inferred, &next) {
            (DataType::Null, _) => next,
            (a, b) if a == b => inferred,
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                DataType::Float64
            }
            (a, b) => {
                return Err(WeirError::value_error(format!(
                    "column '{name}' mixes {a} and {b} values"
                )))
            }
        };
    }
    Ok(inferred)
}

fn build_column(data_type: &DataType, cells: &[&Value]) -> ArrayRef {
    match data_type {
        DataType::Boolean => Arc::new(cells.iter().map(|v| v.as_bool()).collect::<BooleanArray>()),
        DataType::Int64 => Arc::new(cells.iter().map(|v| v.as_int64()).collect::<Int64Array>()),
        DataType::Float64 => Arc::new(cells.iter().map(|v| v.as_float64()).collect::<Float64Array>()),
        DataType::Utf8 => Arc::new(cells.iter().map(|v| v.as_str()).collect::<StringArray>()),
        DataType::Binary => Arc::new(
            cells
                .iter()
                .map(|v| match v {
                    Value::Binary(b) => Some(b.as_slice()),
                    _ => None,
                })
                .collect::<BinaryArray>(),
        ),
        _ => Arc::new(NullArray::new(cells.len())),
    }
}
