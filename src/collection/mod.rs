//! At-expressions over in-memory collections.
//!
//! Mirrors the SQL path: filter, project, summarize, sort, limit, decode and
//! finally check cardinality, all without touching a backend.

pub mod expr;
pub mod limiter;
pub mod summarize;

pub use expr::{ColCase, ColExpr, Frame};
pub use limiter::Limiter;
pub use summarize::{AggregateOp, FieldSummarization, SummarizationKind, Summarizer};

use crate::catalog::types::Value;
use crate::error::{AtError, LimitKind};
use crate::query::cardinality::Cardinality;
use crate::query::limit_value;
use crate::query::plan::{FieldFlags, Order, RowDecoder};
use std::borrow::Cow;
use std::cmp::Ordering;
use tracing::trace;

pub const VALUES_NOUN: &str = "values";

/// Iterable input of a collection at-expression.
#[derive(Debug, Clone, Copy)]
pub enum ColSource<'a> {
    List(&'a [Value]),
    /// Each entry is yielded as a `(key, value)` tuple, in map order.
    Map(&'a [(Value, Value)]),
}

impl<'a> ColSource<'a> {
    pub fn from_value(value: &'a Value) -> Result<Self, AtError> {
        match value {
            Value::List(items) => Ok(ColSource::List(items)),
            Value::Map(entries) => Ok(ColSource::Map(entries)),
            other => Err(AtError::type_mismatch("collection", other.type_name())),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColSource::List(items) => items.len(),
            ColSource::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn items(self) -> Box<dyn Iterator<Item = Cow<'a, Value>> + 'a> {
        match self {
            ColSource::List(items) => Box::new(items.iter().map(Cow::Borrowed)),
            ColSource::Map(entries) => Box::new(
                entries
                    .iter()
                    .map(|(k, v)| Cow::Owned(Value::Tuple(vec![k.clone(), v.clone()]))),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColField {
    pub expr: ColExpr,
    pub flags: FieldFlags,
    pub summarization: FieldSummarization,
}

impl ColField {
    pub fn new(expr: ColExpr) -> Self {
        Self {
            expr,
            flags: FieldFlags::plain(),
            summarization: FieldSummarization::None,
        }
    }

    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Group key field.
    pub fn grouped(mut self) -> Self {
        self.flags.group = true;
        self.summarization = FieldSummarization::Group;
        self
    }

    pub fn aggregated(mut self, op: AggregateOp) -> Self {
        self.flags.aggregate = true;
        self.summarization = FieldSummarization::Aggregate(op);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionQuery {
    pub fields: Vec<ColField>,
    pub filter: Option<ColExpr>,
    pub limit: Option<ColExpr>,
    pub offset: Option<ColExpr>,
    pub cardinality: Cardinality,
    pub decoder: Option<RowDecoder>,
}

impl CollectionQuery {
    pub fn new(cardinality: Cardinality) -> Self {
        Self {
            fields: Vec::new(),
            filter: None,
            limit: None,
            offset: None,
            cardinality,
            decoder: None,
        }
    }

    pub fn field(mut self, field: ColField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn where_(mut self, filter: ColExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: ColExpr) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: ColExpr) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn decoder(mut self, decoder: RowDecoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    fn eval_limit(
        &self,
        expr: Option<&ColExpr>,
        kind: LimitKind,
        params: &[Value],
    ) -> Result<Option<u64>, AtError> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let value = expr.evaluate(&Frame::params_only(params))?;
        Ok(Some(limit_value(&value, kind)?.unsigned_abs()))
    }

    /// Runs the query over `items` and shapes the result by cardinality.
    pub fn evaluate(&self, items: &[Value], params: &[Value]) -> Result<Value, AtError> {
        self.evaluate_source(ColSource::List(items), params)
    }

    /// Runs the query over a list or map value.
    pub fn evaluate_value(&self, source: &Value, params: &[Value]) -> Result<Value, AtError> {
        self.evaluate_source(ColSource::from_value(source)?, params)
    }

    pub fn evaluate_source(
        &self,
        source: ColSource<'_>,
        params: &[Value],
    ) -> Result<Value, AtError> {
        let rows = self.evaluate_rows(source, params)?;
        self.cardinality.into_result(rows, VALUES_NOUN)
    }

    fn evaluate_rows(
        &self,
        source: ColSource<'_>,
        params: &[Value],
    ) -> Result<Vec<Value>, AtError> {
        let limit = self.eval_limit(self.limit.as_ref(), LimitKind::Limit, params)?;
        let offset = self.eval_limit(self.offset.as_ref(), LimitKind::Offset, params)?;
        if limit == Some(0) {
            return Ok(Vec::new());
        }

        let summarizations: Vec<FieldSummarization> =
            self.fields.iter().map(|f| f.summarization.clone()).collect();
        let group_indices: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.flags.group)
            .map(|(i, _)| i)
            .collect();
        let sorting: Vec<(usize, Order)> = self
            .fields
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.flags.sort.map(|o| (i, o)))
            .collect();

        let kind = SummarizationKind::of(&group_indices, &summarizations);
        let mut summarizer = Summarizer::new(kind, &summarizations, group_indices)?;
        let early = summarizer.allows_early_limit(!sorting.is_empty());
        let mut limiter = Limiter::new(limit, offset, early);

        let mut passed = 0usize;
        for item in source.items() {
            if !limiter.process_limit() {
                break;
            }
            let frame = Frame::new(&item, params);
            if let Some(filter) = &self.filter {
                if !filter.evaluate(&frame)?.as_bool()? {
                    continue;
                }
            }
            passed += 1;
            if !limiter.process_offset() {
                continue;
            }
            let row = self
                .fields
                .iter()
                .map(|f| f.expr.evaluate(&frame))
                .collect::<Result<Vec<_>, _>>()?;
            summarizer.add(row)?;
        }

        let mut rows = summarizer.finish()?;
        if !sorting.is_empty() {
            rows.sort_by(|a, b| compare_rows(a, b, &sorting));
        }
        let rows = limiter.finish(rows)?;
        trace!(input = source.len(), passed, output = rows.len(), "collection at-expression");

        let decoder = self.decoder.clone().unwrap_or_else(|| {
            RowDecoder::for_field_count(self.fields.iter().filter(|f| !f.flags.omit).count())
        });
        rows.into_iter()
            .map(|row| {
                let visible = row
                    .into_iter()
                    .zip(&self.fields)
                    .filter(|(_, f)| !f.flags.omit)
                    .map(|(v, _)| v)
                    .collect();
                decoder.decode(visible)
            })
            .collect()
    }
}

fn compare_rows(a: &[Value], b: &[Value], sorting: &[(usize, Order)]) -> Ordering {
    for &(index, order) in sorting {
        let ord = a[index].cmp(&b[index]);
        let ord = match order {
            Order::Asc => ord,
            Order::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::{AggregateOp, ColExpr, ColField, CollectionQuery};
    use crate::catalog::types::Value;
    use crate::error::{AtError, LimitKind};
    use crate::expr::ops::BinaryOp;
    use crate::query::cardinality::Cardinality;
    use crate::query::plan::{FieldFlags, Order};

    fn pets() -> Vec<Value> {
        [("rex", 1), ("tom", 2), ("max", 1), ("kit", 2), ("bob", 1)]
            .iter()
            .map(|(name, owner)| Value::Tuple(vec![Value::text(*name), Value::Integer(*owner)]))
            .collect()
    }

    fn name() -> ColExpr {
        ColExpr::field(ColExpr::Element, 0)
    }

    fn owner() -> ColExpr {
        ColExpr::field(ColExpr::Element, 1)
    }

    #[test]
    fn group_by_owner_counts_pets() {
        let q = CollectionQuery::new(Cardinality::ZeroOrMore)
            .field(ColField::new(owner()).grouped())
            .field(
                ColField::new(ColExpr::Const(Value::Integer(1)))
                    .aggregated(AggregateOp::sum_integers()),
            );
        let out = q.evaluate(&pets(), &[]).expect("grouped");
        assert_eq!(
            out,
            Value::List(vec![
                Value::Tuple(vec![Value::Integer(1), Value::Integer(3)]),
                Value::Tuple(vec![Value::Integer(2), Value::Integer(2)]),
            ])
        );
    }

    #[test]
    fn filter_sort_limit_offset() {
        let q = CollectionQuery::new(Cardinality::ZeroOrMore)
            .field(ColField::new(name()).with_flags(FieldFlags::plain().sorted(Order::Asc)))
            .where_(ColExpr::binary(
                BinaryOp::Eq,
                owner(),
                ColExpr::Const(Value::Integer(1)),
            ))
            .limit(ColExpr::Const(Value::Integer(2)))
            .offset(ColExpr::Param(0));
        let out = q.evaluate(&pets(), &[Value::Integer(1)]).expect("sorted");
        assert_eq!(out, Value::List(vec![Value::text("max"), Value::text("rex")]));
    }

    #[test]
    fn omitted_sort_field_orders_but_is_hidden() {
        let q = CollectionQuery::new(Cardinality::ZeroOrMore)
            .field(ColField::new(name()))
            .field(
                ColField::new(owner())
                    .with_flags(FieldFlags::plain().omitted().sorted(Order::Desc)),
            );
        let out = q.evaluate(&pets(), &[]).expect("sorted");
        assert_eq!(
            out,
            Value::List(
                ["tom", "kit", "rex", "max", "bob"]
                    .iter()
                    .map(|n| Value::text(*n))
                    .collect()
            )
        );
    }

    #[test]
    fn zero_limit_short_circuits_before_cardinality() {
        let q = CollectionQuery::new(Cardinality::ExactlyOne)
            .field(ColField::new(name()))
            .limit(ColExpr::Const(Value::Integer(0)));
        assert_eq!(
            q.evaluate(&pets(), &[]).expect_err("none"),
            AtError::Cardinality {
                count: 0,
                noun: "values"
            }
        );
    }

    #[test]
    fn negative_offset_is_rejected() {
        let q = CollectionQuery::new(Cardinality::ZeroOrMore)
            .field(ColField::new(name()))
            .offset(ColExpr::Const(Value::Integer(-2)));
        assert_eq!(
            q.evaluate(&pets(), &[]).expect_err("negative"),
            AtError::NegativeLimit {
                kind: LimitKind::Offset,
                value: -2
            }
        );
    }

    #[test]
    fn aggregate_over_empty_input_yields_one_row() {
        let q = CollectionQuery::new(Cardinality::ExactlyOne).field(
            ColField::new(ColExpr::Const(Value::Integer(1)))
                .aggregated(AggregateOp::sum_integers()),
        );
        assert_eq!(q.evaluate(&[], &[]).expect("sum"), Value::Integer(0));
    }

    #[test]
    fn filter_must_be_boolean() {
        let q = CollectionQuery::new(Cardinality::ZeroOrMore)
            .field(ColField::new(name()))
            .where_(name());
        assert!(matches!(
            q.evaluate(&pets(), &[]),
            Err(AtError::TypeMismatch { .. })
        ));
    }
}
