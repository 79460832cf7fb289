use super::{Joiner, OperationError, OperationResult, OutputCollector};
use crate::types::Tuple;

/// Per-key view a [`Joiner`] consumes: one value sequence per input ordinal.
///
/// Sequences support repeated iteration, so a joiner can re-scan one side
/// for every element of another.
pub trait JoinerClosure {
    /// Grouping key shared by all sequences.
    fn key(&self) -> &Tuple;

    fn num_ordinals(&self) -> usize;

    /// Width of the tuples on `ordinal`, used to pad missing sides.
    fn width(&self, ordinal: usize) -> usize;

    fn is_empty(&self, ordinal: usize) -> bool;

    fn values(&self, ordinal: usize) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_>;
}

/// Cartesian product across ordinals. A required ordinal with no values
/// suppresses the key; an optional one contributes a row of nulls.
fn product(
    closure: &dyn JoinerClosure,
    required: impl Fn(usize) -> bool,
    output: &mut OutputCollector,
) -> OperationResult {
    let n = closure.num_ordinals();
    if (0..n).any(|ord| required(ord) && closure.is_empty(ord)) {
        return Ok(());
    }
    if (0..n).all(|ord| closure.is_empty(ord)) {
        return Ok(());
    }
    emit_from(closure, 0, Tuple::default(), output)
}

fn emit_from(
    closure: &dyn JoinerClosure,
    ordinal: usize,
    prefix: Tuple,
    output: &mut OutputCollector,
) -> OperationResult {
    if ordinal == closure.num_ordinals() {
        output.emit(prefix);
        return Ok(());
    }
    if closure.is_empty(ordinal) {
        let padded = prefix.append(&Tuple::nulls(closure.width(ordinal)));
        return emit_from(closure, ordinal + 1, padded, output);
    }
    for value in closure.values(ordinal) {
        let value = value?;
        emit_from(closure, ordinal + 1, prefix.append(&value), output)?;
    }
    Ok(())
}

/// Emits only keys present on every ordinal.
#[derive(Debug, Default, Clone, Copy)]
pub struct InnerJoin;

impl Joiner for InnerJoin {
    fn name(&self) -> &str {
        "InnerJoin"
    }

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult {
        product(closure, |_| true, output)
    }
}

/// Emits every key, padding absent sides with nulls.
#[derive(Debug, Default, Clone, Copy)]
pub struct OuterJoin;

impl Joiner for OuterJoin {
    fn name(&self) -> &str {
        "OuterJoin"
    }

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult {
        product(closure, |_| false, output)
    }
}

/// Requires ordinal 0; other sides are optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeftJoin;

impl Joiner for LeftJoin {
    fn name(&self) -> &str {
        "LeftJoin"
    }

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult {
        product(closure, |ord| ord == 0, output)
    }
}

/// Requires the last ordinal; other sides are optional.
#[derive(Debug, Default, Clone, Copy)]
pub struct RightJoin;

impl Joiner for RightJoin {
    fn name(&self) -> &str {
        "RightJoin"
    }

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult {
        let last = closure.num_ordinals().saturating_sub(1);
        product(closure, |ord| ord == last, output)
    }
}

/// Per-ordinal choice of inner (`true`) or outer (`false`) semantics.
#[derive(Debug, Clone)]
pub struct MixedJoin {
    inner: Vec<bool>,
}

impl MixedJoin {
    pub fn new(inner: Vec<bool>) -> Self {
        Self { inner }
    }
}

impl Joiner for MixedJoin {
    fn name(&self) -> &str {
        "MixedJoin"
    }

    fn join(&self, closure: &dyn JoinerClosure, output: &mut OutputCollector) -> OperationResult {
        if self.inner.len() != closure.num_ordinals() {
            return Err(OperationError::invalid_argument(format!(
                "MixedJoin declares {} ordinals but closure has {}",
                self.inner.len(),
                closure.num_ordinals()
            )));
        }
        product(closure, |ord| self.inner[ord], output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;

    struct VecClosure {
        key: Tuple,
        sides: Vec<(usize, Vec<Tuple>)>,
    }

    impl JoinerClosure for VecClosure {
        fn key(&self) -> &Tuple {
            &self.key
        }

        fn num_ordinals(&self) -> usize {
            self.sides.len()
        }

        fn width(&self, ordinal: usize) -> usize {
            self.sides[ordinal].0
        }

        fn is_empty(&self, ordinal: usize) -> bool {
            self.sides[ordinal].1.is_empty()
        }

        fn values(&self, ordinal: usize) -> Box<dyn Iterator<Item = OperationResult<Tuple>> + '_> {
            Box::new(self.sides[ordinal].1.iter().cloned().map(Ok))
        }
    }

    fn run(joiner: &dyn Joiner, closure: &VecClosure) -> Vec<Tuple> {
        let mut out = OutputCollector::new();
        joiner.join(closure, &mut out).unwrap();
        out.drain()
    }

    fn one_sided() -> VecClosure {
        VecClosure {
            key: tuple![1],
            sides: vec![(2, vec![tuple![1, "a"], tuple![1, "b"]]), (2, vec![])],
        }
    }

    #[test]
    fn test_inner_product() {
        let closure = VecClosure {
            key: tuple![1],
            sides: vec![
                (1, vec![tuple!["a"], tuple!["b"]]),
                (1, vec![tuple!["x"], tuple!["y"]]),
            ],
        };
        let rows = run(&InnerJoin, &closure);
        assert_eq!(
            rows,
            vec![tuple!["a", "x"], tuple!["a", "y"], tuple!["b", "x"], tuple!["b", "y"]]
        );
        assert!(run(&InnerJoin, &one_sided()).is_empty());
    }

    #[test]
    fn test_outer_pads_missing_side() {
        let rows = run(&OuterJoin, &one_sided());
        assert_eq!(
            rows,
            vec![
                Tuple::new(vec![1.into(), "a".into(), crate::Value::Null, crate::Value::Null]),
                Tuple::new(vec![1.into(), "b".into(), crate::Value::Null, crate::Value::Null]),
            ]
        );
    }

    #[test]
    fn test_left_right_mixed() {
        assert_eq!(run(&LeftJoin, &one_sided()).len(), 2);
        assert!(run(&RightJoin, &one_sided()).is_empty());
        assert_eq!(run(&MixedJoin::new(vec![true, false]), &one_sided()).len(), 2);
        assert!(run(&MixedJoin::new(vec![false, true]), &one_sided()).is_empty());

        let mut out = OutputCollector::new();
        assert!(MixedJoin::new(vec![true]).join(&one_sided(), &mut out).is_err());
    }
}
