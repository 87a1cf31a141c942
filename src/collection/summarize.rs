use crate::catalog::types::Value;
use crate::error::AtError;
use crate::expr::ops::BinaryOp;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOp {
    /// Folds values with `op`; an empty group yields `zero`.
    Sum { op: BinaryOp, zero: Value },
    Min,
    Max,
}

impl AggregateOp {
    pub fn sum_integers() -> Self {
        AggregateOp::Sum {
            op: BinaryOp::Add,
            zero: Value::Integer(0),
        }
    }

    fn fold(&self, acc: Value, next: Value) -> Result<Value, AtError> {
        // nulls never win min/max
        match self {
            AggregateOp::Sum { op, .. } => op.evaluate(&acc, &next),
            AggregateOp::Min if acc.is_null() || (!next.is_null() && next < acc) => Ok(next),
            AggregateOp::Max if acc.is_null() || (!next.is_null() && next > acc) => Ok(next),
            AggregateOp::Min | AggregateOp::Max => Ok(acc),
        }
    }

    fn result(&self, acc: Option<Value>) -> Value {
        match (self, acc) {
            (_, Some(value)) => value,
            (AggregateOp::Sum { zero, .. }, None) => zero.clone(),
            (AggregateOp::Min | AggregateOp::Max, None) => Value::Null,
        }
    }
}

/// Role of one projection field when rows are grouped or aggregated.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldSummarization {
    #[default]
    None,
    Group,
    Aggregate(AggregateOp),
}

/// Whole-query summarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummarizationKind {
    None,
    Group,
    All,
}

impl SummarizationKind {
    /// Grouped when any field is a group key, aggregated when any field aggregates.
    pub fn of(group_indices: &[usize], fields: &[FieldSummarization]) -> Self {
        if !group_indices.is_empty() {
            SummarizationKind::Group
        } else if fields
            .iter()
            .any(|f| matches!(f, FieldSummarization::Aggregate(_)))
        {
            SummarizationKind::All
        } else {
            SummarizationKind::None
        }
    }
}

enum ValueSummarizer<'a> {
    Group(Option<Value>),
    Aggregate(&'a AggregateOp, Option<Value>),
}

impl<'a> ValueSummarizer<'a> {
    fn new(summarization: &'a FieldSummarization) -> Result<Self, AtError> {
        match summarization {
            FieldSummarization::None => Err(AtError::internal(
                "aggregation failed: field has no summarization",
            )),
            FieldSummarization::Group => Ok(ValueSummarizer::Group(None)),
            FieldSummarization::Aggregate(op) => Ok(ValueSummarizer::Aggregate(op, None)),
        }
    }

    fn update(&mut self, value: Value) -> Result<(), AtError> {
        match self {
            ValueSummarizer::Group(last) => match last {
                None => *last = Some(value),
                Some(prev) if *prev == value => {}
                Some(prev) => {
                    return Err(AtError::internal(format!(
                        "group field mismatch within one group: {prev} vs {value}"
                    )));
                }
            },
            ValueSummarizer::Aggregate(op, acc) => {
                let next = match acc.take() {
                    None => value,
                    Some(prev) => op.fold(prev, value)?,
                };
                *acc = Some(next);
            }
        }
        Ok(())
    }

    fn result(self) -> Result<Value, AtError> {
        match self {
            ValueSummarizer::Group(last) => {
                last.ok_or_else(|| AtError::internal("group field without rows"))
            }
            ValueSummarizer::Aggregate(op, acc) => Ok(op.result(acc)),
        }
    }
}

struct RowAggregator<'a> {
    values: Vec<ValueSummarizer<'a>>,
}

impl<'a> RowAggregator<'a> {
    fn new(fields: &'a [FieldSummarization]) -> Result<Self, AtError> {
        let values = fields
            .iter()
            .map(ValueSummarizer::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    fn update(&mut self, row: Vec<Value>) -> Result<(), AtError> {
        check_arity(row.len(), self.values.len())?;
        for (summarizer, value) in self.values.iter_mut().zip(row) {
            summarizer.update(value)?;
        }
        Ok(())
    }

    fn result(self) -> Result<Vec<Value>, AtError> {
        self.values.into_iter().map(ValueSummarizer::result).collect()
    }
}

fn check_arity(actual: usize, expected: usize) -> Result<(), AtError> {
    if actual != expected {
        return Err(AtError::internal(format!(
            "row has {actual} values, expected {expected}"
        )));
    }
    Ok(())
}

enum Buckets<'a> {
    None {
        field_count: usize,
        rows: Vec<Vec<Value>>,
    },
    /// Buckets in first-seen order.
    Group {
        fields: &'a [FieldSummarization],
        group_indices: Vec<usize>,
        index: BTreeMap<Vec<Value>, usize>,
        buckets: Vec<RowAggregator<'a>>,
    },
    All(RowAggregator<'a>),
}

/// Accumulates projected rows according to the query's summarization.
pub struct Summarizer<'a> {
    buckets: Buckets<'a>,
}

impl<'a> Summarizer<'a> {
    /// `group_indices` are the fields whose values form the group key.
    pub fn new(
        kind: SummarizationKind,
        fields: &'a [FieldSummarization],
        group_indices: Vec<usize>,
    ) -> Result<Self, AtError> {
        if let Some(bad) = group_indices.iter().find(|&&i| i >= fields.len()) {
            return Err(AtError::internal(format!("group field index {bad} out of range")));
        }
        let buckets = match kind {
            SummarizationKind::None => Buckets::None {
                field_count: fields.len(),
                rows: Vec::new(),
            },
            SummarizationKind::Group => Buckets::Group {
                fields,
                group_indices,
                index: BTreeMap::new(),
                buckets: Vec::new(),
            },
            SummarizationKind::All => Buckets::All(RowAggregator::new(fields)?),
        };
        Ok(Self { buckets })
    }

    /// Early limiting is only sound when rows come out in input order.
    pub fn allows_early_limit(&self, sorting: bool) -> bool {
        matches!(self.buckets, Buckets::None { .. }) && !sorting
    }

    pub fn add(&mut self, row: Vec<Value>) -> Result<(), AtError> {
        match &mut self.buckets {
            Buckets::None { field_count, rows } => {
                check_arity(row.len(), *field_count)?;
                rows.push(row);
                Ok(())
            }
            Buckets::Group {
                fields,
                group_indices,
                index,
                buckets,
            } => {
                check_arity(row.len(), fields.len())?;
                let key: Vec<Value> = group_indices.iter().map(|&i| row[i].clone()).collect();
                let pos = match index.get(&key) {
                    Some(&pos) => pos,
                    None => {
                        buckets.push(RowAggregator::new(*fields)?);
                        index.insert(key, buckets.len() - 1);
                        buckets.len() - 1
                    }
                };
                buckets[pos].update(row)
            }
            Buckets::All(aggregator) => aggregator.update(row),
        }
    }

    pub fn finish(self) -> Result<Vec<Vec<Value>>, AtError> {
        match self.buckets {
            Buckets::None { rows, .. } => Ok(rows),
            Buckets::Group { buckets, .. } => {
                buckets.into_iter().map(RowAggregator::result).collect()
            }
            Buckets::All(aggregator) => Ok(vec![aggregator.result()?]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AggregateOp, FieldSummarization, SummarizationKind, Summarizer};
    use crate::catalog::types::Value;

    fn summarize(
        fields: &[FieldSummarization],
        group: Vec<usize>,
        rows: Vec<Vec<Value>>,
    ) -> Vec<Vec<Value>> {
        let kind = SummarizationKind::of(&group, fields);
        let mut s = Summarizer::new(kind, fields, group).expect("summarizer");
        for row in rows {
            s.add(row).expect("add");
        }
        s.finish().expect("finish")
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Integer(*v)).collect()
    }

    #[test]
    fn kind_follows_group_keys_and_aggregates() {
        use FieldSummarization as F;
        assert_eq!(SummarizationKind::of(&[], &[F::None]), SummarizationKind::None);
        assert_eq!(
            SummarizationKind::of(&[], &[F::Aggregate(AggregateOp::Min)]),
            SummarizationKind::All
        );
        assert_eq!(
            SummarizationKind::of(&[1], &[F::Aggregate(AggregateOp::Min), F::Group]),
            SummarizationKind::Group
        );
    }

    #[test]
    fn groups_keep_first_seen_order() {
        let fields = [
            FieldSummarization::Group,
            FieldSummarization::Aggregate(AggregateOp::sum_integers()),
        ];
        let rows = vec![ints(&[2, 1]), ints(&[1, 1]), ints(&[2, 5]), ints(&[1, 3])];
        assert_eq!(
            summarize(&fields, vec![0], rows),
            vec![ints(&[2, 6]), ints(&[1, 4])]
        );
    }

    #[test]
    fn aggregate_all_over_nothing_yields_zero_and_null() {
        let fields = [
            FieldSummarization::Aggregate(AggregateOp::sum_integers()),
            FieldSummarization::Aggregate(AggregateOp::Max),
        ];
        assert_eq!(
            summarize(&fields, vec![], vec![]),
            vec![vec![Value::Integer(0), Value::Null]]
        );
    }

    #[test]
    fn min_max_skip_nulls() {
        let fields = [
            FieldSummarization::Aggregate(AggregateOp::Min),
            FieldSummarization::Aggregate(AggregateOp::Max),
        ];
        let rows = vec![
            vec![Value::Null, Value::Integer(3)],
            vec![Value::Integer(4), Value::Null],
            vec![Value::Integer(2), Value::Integer(9)],
        ];
        assert_eq!(summarize(&fields, vec![], rows), vec![ints(&[2, 9])]);
    }

    #[test]
    fn min_max_over_only_nulls_is_null() {
        let fields = [
            FieldSummarization::Group,
            FieldSummarization::Aggregate(AggregateOp::Min),
            FieldSummarization::Aggregate(AggregateOp::Max),
        ];
        let rows = vec![
            vec![Value::Integer(1), Value::Null, Value::Null],
            vec![Value::Integer(2), Value::Null, Value::Integer(5)],
            vec![Value::Integer(1), Value::Null, Value::Null],
        ];
        assert_eq!(
            summarize(&fields, vec![0], rows),
            vec![
                vec![Value::Integer(1), Value::Null, Value::Null],
                vec![Value::Integer(2), Value::Null, Value::Integer(5)],
            ]
        );
    }

    #[test]
    fn group_check_field_must_agree_within_a_group() {
        // field 1 is carried along with key field 0
        let fields = [FieldSummarization::Group, FieldSummarization::Group];
        let mut s =
            Summarizer::new(SummarizationKind::Group, &fields, vec![0]).expect("summarizer");
        s.add(ints(&[1, 7])).expect("add");
        s.add(ints(&[2, 8])).expect("other group");
        s.add(ints(&[1, 7])).expect("same value");
        assert!(s.add(ints(&[1, 9])).expect_err("mismatch").is_internal());
    }

    #[test]
    fn plain_field_under_aggregation_fails() {
        let fields = [
            FieldSummarization::None,
            FieldSummarization::Aggregate(AggregateOp::sum_integers()),
        ];
        assert!(
            Summarizer::new(SummarizationKind::All, &fields, vec![])
                .err()
                .expect("no summarization")
                .is_internal()
        );
        assert!(
            Summarizer::new(SummarizationKind::Group, &fields, vec![5])
                .err()
                .expect("bad index")
                .is_internal()
        );
    }
}
