use crate::catalog::SqlContext;
use crate::catalog::schema::EntityRef;
use crate::catalog::types::{Value, ValueType};
use crate::config::CompilerConfig;
use crate::error::AtError;
use crate::expr::decl::{DeclExpr, TableExpr};
use crate::expr::ops::BinaryOp;
use crate::expr::reduce::{ReduceContext, reduce};
use crate::query::cardinality::Cardinality;
use tracing::warn;

/// Rows a mutation statement applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationTarget {
    /// Primary entity first, then entities that only join and filter.
    Filter {
        from: Vec<EntityRef>,
        filter: Option<DeclExpr>,
        cardinality: Cardinality,
    },
    /// The single row of an object entity.
    Object { entity: EntityRef },
    /// One row identified by a host-evaluated entity value; null skips the statement.
    Value { entity: EntityRef, value: DeclExpr },
    /// Rows identified by a host-evaluated list or set of entity values.
    Values { entity: EntityRef, values: DeclExpr },
}

/// One statement's worth of a target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPortion {
    pub from: Vec<EntityRef>,
    pub filter: Option<DeclExpr>,
    /// Row count expectation checked through `RETURNING`; `None` runs a plain statement.
    pub check: Option<Cardinality>,
}

impl MutationTarget {
    pub fn primary(&self) -> Result<&EntityRef, AtError> {
        match self {
            MutationTarget::Filter { from, .. } => from
                .first()
                .ok_or_else(|| AtError::internal("filter target without entities")),
            MutationTarget::Object { entity }
            | MutationTarget::Value { entity, .. }
            | MutationTarget::Values { entity, .. } => Ok(entity),
        }
    }

    /// Splits the target into the statements to run, in order. Empty when nothing applies.
    pub fn portions(
        &self,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
    ) -> Result<Vec<TargetPortion>, AtError> {
        match self {
            MutationTarget::Filter {
                from,
                filter,
                cardinality,
            } => {
                let primary = self.primary()?;
                if from[1..].iter().any(|e| e.entity.name == primary.entity.name) {
                    return Err(AtError::internal(format!(
                        "extra entities contain main entity '{}'",
                        primary.entity.name
                    )));
                }
                let mut parts: Vec<DeclExpr> = filter.iter().cloned().collect();
                parts.extend(extra_wheres(from, ctx)?);
                Ok(vec![TargetPortion {
                    from: from.clone(),
                    filter: DeclExpr::and_all(parts),
                    check: Some(*cardinality),
                }])
            }
            MutationTarget::Object { entity } => Ok(vec![TargetPortion {
                from: vec![entity.clone()],
                filter: DeclExpr::and_all(extra_wheres(std::slice::from_ref(entity), ctx)?),
                check: Some(Cardinality::ExactlyOne),
            }]),
            MutationTarget::Value { entity, value } => {
                let value = host_value(value, params, config)?;
                if value.is_null() {
                    return Ok(Vec::new());
                }
                let key = DeclExpr::table(TableExpr::entity(entity.clone()));
                let ty = entity.entity.value_type();
                Ok(vec![TargetPortion {
                    from: vec![entity.clone()],
                    filter: Some(DeclExpr::binary(
                        BinaryOp::Eq,
                        key,
                        DeclExpr::constant(value, ty),
                    )),
                    check: None,
                }])
            }
            MutationTarget::Values { entity, values } => {
                let list = host_value(values, params, config)?;
                let items = dedup(list.as_list()?);
                if items.is_empty() {
                    return Ok(Vec::new());
                }
                let list_ty = ValueType::list(entity.entity.value_type());
                Ok(items
                    .chunks(config.mutation_batch_size.max(1))
                    .map(|part| {
                        let key = DeclExpr::table(TableExpr::entity(entity.clone()));
                        let part = DeclExpr::constant(Value::List(part.to_vec()), list_ty.clone());
                        TargetPortion {
                            from: vec![entity.clone()],
                            filter: Some(DeclExpr::in_collection(key, part, false)),
                            check: None,
                        }
                    })
                    .collect())
            }
        }
    }
}

fn extra_wheres(from: &[EntityRef], ctx: &SqlContext) -> Result<Vec<DeclExpr>, AtError> {
    let mut out = Vec::new();
    for entity_ref in from {
        let base = TableExpr::entity(entity_ref.clone());
        if let Some(extra) = entity_ref
            .entity
            .mapping
            .extra_where(&entity_ref.entity, &base, ctx)?
        {
            out.push(extra);
        }
    }
    Ok(out)
}

fn host_value(expr: &DeclExpr, params: &[Value], config: &CompilerConfig) -> Result<Value, AtError> {
    let rctx = ReduceContext::new(params).with_frac_digits(config.decimal_frac_digits);
    let reduced = reduce(expr, &rctx)?;
    if let Some(items) = reduced.host_list() {
        return Ok(Value::List(items));
    }
    reduced
        .constant_value()
        .cloned()
        .ok_or_else(|| AtError::internal("mutation target value is not a host value"))
}

/// Keeps the first occurrence of every value, preserving order.
fn dedup(items: &[Value]) -> Vec<Value> {
    let mut seen = std::collections::BTreeSet::new();
    let out: Vec<Value> = items
        .iter()
        .filter(|v| seen.insert((*v).clone()))
        .cloned()
        .collect();
    if out.len() != items.len() {
        warn!(
            total = items.len(),
            unique = out.len(),
            "duplicate values removed from mutation target"
        );
    }
    out
}
