//! Small reference operations.
//!
//! The catalog of production operations lives outside Weir; these cover the
//! common cases and give tests something concrete to plan and run.

use std::fmt;
use std::sync::Arc;

use super::{
    Filter, Function, GroupFunction, GroupValues, OperationError, OperationResult,
    OutputCollector,
};
use crate::types::{Fields, Tuple, TupleEntry, Value};

// ============================================================================
// Functions
// ============================================================================

/// Emits its arguments unchanged under the declared names.
#[derive(Debug, Clone)]
pub struct Identity {
    fields: Fields,
}

impl Identity {
    pub fn new(fields: impl Into<Fields>) -> Self {
        Self {
            fields: fields.into(),
        }
    }
}

impl Function for Identity {
    fn name(&self) -> &str {
        "Identity"
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn operate(&self, args: &TupleEntry, output: &mut OutputCollector) -> OperationResult {
        if args.tuple().len() != self.fields.len() {
            return Err(OperationError::invalid_argument(format!(
                "Identity declares {} but received {}",
                self.fields,
                args.fields()
            )));
        }
        output.emit(args.tuple().clone());
        Ok(())
    }
}

/// Emits a constant tuple for every record.
#[derive(Debug, Clone)]
pub struct Insert {
    fields: Fields,
    values: Tuple,
}

impl Insert {
    pub fn new(fields: impl Into<Fields>, values: Tuple) -> Self {
        Self {
            fields: fields.into(),
            values,
        }
    }
}

impl Function for Insert {
    fn name(&self) -> &str {
        "Insert"
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn operate(&self, _args: &TupleEntry, output: &mut OutputCollector) -> OperationResult {
        output.emit(self.values.clone());
        Ok(())
    }
}

type FunctionFn = dyn Fn(&TupleEntry, &mut OutputCollector) -> OperationResult + Send + Sync;

/// Function backed by a closure.
#[derive(Clone)]
pub struct FnFunction {
    name: String,
    fields: Fields,
    f: Arc<FunctionFn>,
}

impl FnFunction {
    pub fn new<F>(name: impl Into<String>, fields: impl Into<Fields>, f: F) -> Self
    where
        F: Fn(&TupleEntry, &mut OutputCollector) -> OperationResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fields: fields.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFunction")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Function for FnFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn operate(&self, args: &TupleEntry, output: &mut OutputCollector) -> OperationResult {
        (self.f)(args, output)
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Removes records where any argument is null.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilterNull;

impl Filter for FilterNull {
    fn name(&self) -> &str {
        "FilterNull"
    }

    fn is_remove(&self, args: &TupleEntry) -> OperationResult<bool> {
        Ok(args.tuple().values().iter().any(Value::is_null))
    }
}

type FilterFn = dyn Fn(&TupleEntry) -> OperationResult<bool> + Send + Sync;

/// Filter backed by a closure returning `true` to remove.
#[derive(Clone)]
pub struct FnFilter {
    name: String,
    f: Arc<FilterFn>,
}

impl FnFilter {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TupleEntry) -> OperationResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter").field("name", &self.name).finish()
    }
}

impl Filter for FnFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_remove(&self, args: &TupleEntry) -> OperationResult<bool> {
        (self.f)(args)
    }
}

// ============================================================================
// Group functions
// ============================================================================

/// Sums the first argument of every value. Nulls are skipped.
///
/// The result is `Int64` while every input is an integer and `Float64` once a
/// float is seen. An empty group sums to `Int64(0)`.
#[derive(Debug, Clone)]
pub struct Sum {
    fields: Fields,
}

impl Sum {
    pub fn new(field: &str) -> Self {
        Self {
            fields: Fields::new([field]),
        }
    }
}

impl GroupFunction for Sum {
    fn name(&self) -> &str {
        "Sum"
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn aggregate(
        &self,
        _key: &Tuple,
        values: &dyn GroupValues,
        output: &mut OutputCollector,
    ) -> OperationResult {
        let mut int_sum: i64 = 0;
        let mut float_sum: Option<f64> = None;
        for value in values.iter() {
            let value = value?;
            match value.get(0) {
                None | Some(Value::Null) => {}
                Some(Value::Int64(i)) => match float_sum.as_mut() {
                    Some(f) => *f += *i as f64,
                    None => {
                        int_sum = int_sum.checked_add(*i).ok_or_else(|| {
                            OperationError::failed("integer overflow in Sum")
                        })?;
                    }
                },
                Some(Value::Float64(x)) => {
                    let acc = float_sum.get_or_insert(int_sum as f64);
                    *acc += *x;
                }
                Some(other) => {
                    return Err(OperationError::invalid_argument(format!(
                        "Sum expects numeric values, got {}",
                        other.type_name()
                    )))
                }
            }
        }
        let result = float_sum.map_or(Value::Int64(int_sum), Value::Float64);
        output.emit(Tuple::new(vec![result]));
        Ok(())
    }
}

/// Counts values in the group.
#[derive(Debug, Clone)]
pub struct Count {
    fields: Fields,
}

impl Count {
    pub fn new(field: &str) -> Self {
        Self {
            fields: Fields::new([field]),
        }
    }
}

impl GroupFunction for Count {
    fn name(&self) -> &str {
        "Count"
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn aggregate(
        &self,
        _key: &Tuple,
        values: &dyn GroupValues,
        output: &mut OutputCollector,
    ) -> OperationResult {
        let mut count: i64 = 0;
        for value in values.iter() {
            value?;
            count += 1;
        }
        output.emit(Tuple::new(vec![Value::Int64(count)]));
        Ok(())
    }
}

/// Emits the first value of the group, if any.
#[derive(Debug, Clone)]
pub struct First {
    fields: Fields,
}

impl First {
    pub fn new(fields: impl Into<Fields>) -> Self {
        Self {
            fields: fields.into(),
        }
    }
}

impl GroupFunction for First {
    fn name(&self) -> &str {
        "First"
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn aggregate(
        &self,
        _key: &Tuple,
        values: &dyn GroupValues,
        output: &mut OutputCollector,
    ) -> OperationResult {
        if let Some(first) = values.iter().next() {
            output.emit(first?);
        }
        Ok(())
    }
}

type GroupFn = dyn Fn(&Tuple, &dyn GroupValues, &mut OutputCollector) -> OperationResult + Send + Sync;

/// Group function backed by a closure.
#[derive(Clone)]
pub struct FnGroupFunction {
    name: String,
    fields: Fields,
    f: Arc<GroupFn>,
}

impl FnGroupFunction {
    pub fn new<F>(name: impl Into<String>, fields: impl Into<Fields>, f: F) -> Self
    where
        F: Fn(&Tuple, &dyn GroupValues, &mut OutputCollector) -> OperationResult
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            fields: fields.into(),
            f: Arc::new(f),
        }
    }
}

impl fmt::Debug for FnGroupFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGroupFunction")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl GroupFunction for FnGroupFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_fields(&self) -> &Fields {
        &self.fields
    }

    fn aggregate(
        &self,
        key: &Tuple,
        values: &dyn GroupValues,
        output: &mut OutputCollector,
    ) -> OperationResult {
        (self.f)(key, values, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    struct VecValues(Fields, Vec<Tuple>);

    impl GroupValues for VecValues {
        fn fields(&self) -> &Fields {
            &self.0
        }

        fn iter(&self) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
            Box::new(self.1.iter().cloned().map(Ok))
        }
    }

    fn aggregate(f: &dyn GroupFunction, values: Vec<Tuple>) -> Vec<Tuple> {
        let mut out = OutputCollector::new();
        f.aggregate(&tuple![1], &VecValues(Fields::from(["v"]), values), &mut out)
            .unwrap();
        out.drain()
    }

    #[test]
    fn test_sum_int_and_float() {
        assert_eq!(aggregate(&Sum::new("sum"), vec![tuple![3], tuple![4]]), vec![tuple![7]]);
        assert_eq!(
            aggregate(&Sum::new("sum"), vec![tuple![1], tuple![0.5]]),
            vec![tuple![1.5]]
        );
        assert_eq!(aggregate(&Sum::new("sum"), vec![]), vec![tuple![0]]);
    }

    #[test]
    fn test_sum_rejects_strings() {
        let mut out = OutputCollector::new();
        let values = VecValues(Fields::from(["v"]), vec![tuple!["x"]]);
        let err = Sum::new("sum").aggregate(&tuple![1], &values, &mut out).unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgument(_)));
    }

    #[test]
    fn test_count_and_first() {
        let values = vec![tuple![5], tuple![6]];
        assert_eq!(aggregate(&Count::new("n"), values.clone()), vec![tuple![2]]);
        assert_eq!(aggregate(&First::new(["v"]), values), vec![tuple![5]]);
        assert!(aggregate(&First::new(["v"]), vec![]).is_empty());
    }

    #[test]
    fn test_filters_and_functions() {
        let entry = TupleEntry::new(Arc::new(Fields::from(["a", "b"])), tuple![1, Value::Null]);
        assert!(FilterNull.is_remove(&entry).unwrap());

        let keep_odd = FnFilter::new("odd", |e| Ok(e.get("a")?.as_int64() == Some(2)));
        assert!(!keep_odd.is_remove(&entry).unwrap());

        let mut out = OutputCollector::new();
        Insert::new(["c"], tuple!["x"]).operate(&entry, &mut out).unwrap();
        assert_eq!(out.drain(), vec![tuple!["x"]]);
        assert!(Identity::new(["a"]).operate(&entry, &mut out).is_err());
    }
}
