use crate::catalog::SqlContext;
use crate::catalog::types::{Row, Value, ValueType};
use crate::config::CompilerConfig;
use crate::error::{AtError, LimitKind};
use crate::expr::decl::{DeclExpr, TableExpr};
use crate::expr::emit::{emit_sql, touch_aliases};
use crate::expr::reduce::{ReduceContext, reduce};
use crate::expr::reduced::ReducedExpr;
use crate::query::limit_value;
use crate::query::plan::{Combiner, FieldFlags, FieldValue, Order, QueryPlan, RowDecoder};
use crate::sql::alias::AliasRegistry;
use crate::sql::builder::SqlBuilder;
use crate::sql::{ParameterizedSql, append_from_clause};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
enum CompiledFieldKind {
    Columns {
        count: usize,
        combiner: Option<Combiner>,
    },
    Host(Value),
}

#[derive(Debug, Clone, PartialEq)]
struct CompiledField {
    omit: bool,
    kind: CompiledFieldKind,
}

/// A SELECT statement plus what is needed to decode its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: ParameterizedSql,
    /// Type of every SQL result column, in order.
    pub columns: Vec<ValueType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    fields: Vec<CompiledField>,
    decoder: RowDecoder,
}

impl CompiledQuery {
    /// Recombines one SQL row into the query's row value.
    pub fn decode(&self, row: Row) -> Result<Value, AtError> {
        let column_count = row.values.len();
        if column_count != self.columns.len() {
            return Err(AtError::internal(format!(
                "result row has {column_count} columns, expected {}",
                self.columns.len()
            )));
        }
        let mut values = row.values.into_iter();
        let mut visible = Vec::with_capacity(self.fields.len());
        for field in self.fields.iter().filter(|f| !f.omit) {
            match &field.kind {
                CompiledFieldKind::Columns { count, combiner } => {
                    let parts: Vec<Value> = values.by_ref().take(*count).collect();
                    if parts.len() != *count {
                        return Err(AtError::internal("result row is shorter than projection"));
                    }
                    match combiner {
                        Some(combiner) => visible.push(combiner.combine(parts)?),
                        None => visible.extend(parts),
                    }
                }
                CompiledFieldKind::Host(value) => visible.push(value.clone()),
            }
        }
        self.decoder.decode(visible)
    }
}

struct ReducedField {
    flags: FieldFlags,
    exprs: Vec<ReducedExpr>,
    kind: CompiledFieldKind,
}

fn reduce_limit(
    expr: Option<&DeclExpr>,
    kind: LimitKind,
    rctx: &ReduceContext<'_>,
) -> Result<Option<i64>, AtError> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    let reduced = reduce(expr, rctx)?;
    let value = reduced
        .constant_value()
        .ok_or_else(|| AtError::internal(format!("{kind} must be known before execution")))?;
    limit_value(value, kind).map(Some)
}

fn reduce_host(expr: &DeclExpr, rctx: &ReduceContext<'_>) -> Result<Value, AtError> {
    reduce(expr, rctx)?
        .constant_value()
        .cloned()
        .ok_or_else(|| AtError::internal("host field does not reduce to a value"))
}

/// Conjunction of the user filter and every listed entity's extra where.
fn full_filter(plan: &QueryPlan, ctx: &SqlContext) -> Result<Option<DeclExpr>, AtError> {
    let mut parts: Vec<DeclExpr> = plan.filter.iter().cloned().collect();
    for entity_ref in &plan.from {
        let base = TableExpr::entity(entity_ref.clone());
        if let Some(extra) = entity_ref
            .entity
            .mapping
            .extra_where(&entity_ref.entity, &base, ctx)?
        {
            parts.push(extra);
        }
    }
    Ok(DeclExpr::and_all(parts))
}

fn append_exprs(
    b: &mut SqlBuilder,
    exprs: &[&ReducedExpr],
    reg: &mut AliasRegistry,
) -> Result<(), AtError> {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            b.append(", ");
        }
        emit_sql(expr, reg, b)?;
    }
    Ok(())
}

pub fn compile_query(
    plan: &QueryPlan,
    params: &[Value],
    ctx: &SqlContext,
    config: &CompilerConfig,
) -> Result<CompiledQuery, AtError> {
    config.validate()?;
    let rctx = ReduceContext::new(params).with_frac_digits(config.decimal_frac_digits);
    let mut reg = AliasRegistry::new(&plan.from)?;

    let filter = full_filter(plan, ctx)?
        .map(|f| reduce(&f, &rctx))
        .transpose()?
        .filter(|f| f.constant_value() != Some(&Value::Boolean(true)));

    let mut fields = Vec::with_capacity(plan.fields.len());
    for field in &plan.fields {
        let (exprs, kind) = match &field.value {
            FieldValue::Host(expr) => (Vec::new(), CompiledFieldKind::Host(reduce_host(expr, &rctx)?)),
            _ if !field.flags.is_emitted() => (
                Vec::new(),
                CompiledFieldKind::Columns {
                    count: 0,
                    combiner: None,
                },
            ),
            FieldValue::Expr(expr) => (
                vec![reduce(expr, &rctx)?],
                CompiledFieldKind::Columns {
                    count: 1,
                    combiner: None,
                },
            ),
            FieldValue::Compound { exprs, combiner } => {
                let exprs = exprs
                    .iter()
                    .map(|e| reduce(e, &rctx))
                    .collect::<Result<Vec<_>, _>>()?;
                let count = exprs.len();
                (
                    exprs,
                    CompiledFieldKind::Columns {
                        count,
                        combiner: Some(combiner.clone()),
                    },
                )
            }
        };
        fields.push(ReducedField {
            flags: field.flags,
            exprs,
            kind,
        });
    }

    let limit = reduce_limit(plan.limit.as_ref(), LimitKind::Limit, &rctx)?;
    let offset = reduce_limit(plan.offset.as_ref(), LimitKind::Offset, &rctx)?;

    // pass 1: discover joins
    if let Some(filter) = &filter {
        touch_aliases(filter, &mut reg)?;
    }
    for expr in fields.iter().flat_map(|f| f.exprs.iter()) {
        touch_aliases(expr, &mut reg)?;
    }
    reg.seal();
    let from_info = reg.snapshot_from_info();

    // pass 2: emit
    let mut b = SqlBuilder::new();
    let selected: Vec<&ReducedExpr> = fields
        .iter()
        .filter(|f| !f.flags.omit)
        .flat_map(|f| f.exprs.iter())
        .collect();
    b.append("SELECT ");
    if selected.is_empty() {
        b.append("0");
    } else {
        append_exprs(&mut b, &selected, &mut reg)?;
    }

    b.append(" FROM ");
    append_from_clause(&mut b, &from_info, ctx)?;

    if let Some(filter) = &filter {
        b.append(" WHERE ");
        emit_sql(filter, &mut reg, &mut b)?;
    }

    let grouped: Vec<&ReducedExpr> = fields
        .iter()
        .filter(|f| f.flags.group)
        .flat_map(|f| f.exprs.iter())
        .collect();
    if !grouped.is_empty() {
        b.append(" GROUP BY ");
        append_exprs(&mut b, &grouped, &mut reg)?;
    }

    let mut order: Vec<(ReducedExpr, Order)> = Vec::new();
    for field in &fields {
        if let Some(dir) = field.flags.sort {
            order.extend(field.exprs.iter().map(|e| (e.clone(), dir)));
        }
    }
    if plan.is_summarized() {
        for field in fields.iter().filter(|f| f.flags.group && f.flags.sort.is_none()) {
            order.extend(field.exprs.iter().map(|e| (e.clone(), Order::Asc)));
        }
    } else {
        for entity_ref in &plan.from {
            let rowid = ReducedExpr::Rowid(TableExpr::entity(entity_ref.clone()));
            order.push((rowid, Order::Asc));
        }
    }
    if !order.is_empty() {
        b.append(" ORDER BY ");
        for (i, (expr, dir)) in order.iter().enumerate() {
            if i > 0 {
                b.append(", ");
            }
            emit_sql(expr, &mut reg, &mut b)?;
            if *dir == Order::Desc {
                b.append(" DESC");
            }
        }
    }

    if let Some(limit) = limit {
        b.append(" LIMIT ");
        b.append_integer(limit);
    }
    if let Some(offset) = offset {
        b.append(" OFFSET ");
        b.append_integer(offset);
    }

    let columns = selected.iter().map(|e| e.ty()).collect();
    let sql = b.build(config.max_sql_params)?;
    if config.log_sql {
        debug!(sql = %sql, "compiled at-expression");
    }
    Ok(CompiledQuery {
        sql,
        columns,
        limit,
        offset,
        fields: fields
            .into_iter()
            .map(|f| CompiledField {
                omit: f.flags.omit,
                kind: f.kind,
            })
            .collect(),
        decoder: plan.row_decoder(),
    })
}

#[cfg(test)]
mod tests {
    use super::compile_query;
    use crate::catalog::schema::{Attribute, EntityDef, EntityRef};
    use crate::catalog::types::{Row, Value, ValueType};
    use crate::catalog::{ExternalChain, SqlContext};
    use crate::config::CompilerConfig;
    use crate::error::{AtError, AtErrorCode, LimitKind};
    use crate::expr::decl::{DeclExpr, TableExpr};
    use crate::expr::function;
    use crate::expr::ops::BinaryOp;
    use crate::query::plan::{
        Combiner, FieldFlags, FieldValue, Order, ProjectionField, QueryPlan,
    };
    use std::sync::Arc;

    struct Model {
        user: Arc<EntityDef>,
        pet: Arc<EntityDef>,
    }

    fn model() -> Model {
        let user = Arc::new(
            EntityDef::new("user")
                .with_attribute(Attribute::new("name", ValueType::Text))
                .with_attribute(Attribute::new("age", ValueType::Integer)),
        );
        let pet = Arc::new(
            EntityDef::new("pet")
                .with_attribute(Attribute::relation("owner", "user"))
                .with_attribute(Attribute::new("name", ValueType::Text)),
        );
        Model { user, pet }
    }

    fn attr(table: &TableExpr, def: &EntityDef, name: &str) -> DeclExpr {
        DeclExpr::attr(table.clone(), def.attribute(name).expect("attr").clone())
    }

    #[test]
    fn filter_projection_limit_offset() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let u = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from)
            .select(attr(&u, &m.user, "name"))
            .where_(DeclExpr::binary(
                BinaryOp::Gt,
                attr(&u, &m.user, "age"),
                DeclExpr::integer(18),
            ))
            .limit(DeclExpr::integer(2))
            .offset(DeclExpr::integer(1));
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."name" FROM "user" A00 WHERE (A00."age" > ?) ORDER BY A00."rowid" LIMIT 2 OFFSET 1"#
        );
        assert_eq!(q.sql.param_values(), vec![Value::Integer(18)]);
        assert_eq!(q.columns, vec![ValueType::Text]);
    }

    #[test]
    fn default_order_covers_every_from_entity() {
        let m = model();
        let from = vec![
            EntityRef::new(m.user.clone(), 0),
            EntityRef::new(m.pet.clone(), 1),
        ];
        let u = TableExpr::entity(from[0].clone());
        let p = TableExpr::entity(from[1].clone());
        let plan = QueryPlan::new(from)
            .select(attr(&p, &m.pet, "name"))
            .where_(DeclExpr::binary(
                BinaryOp::Eq,
                attr(&p, &m.pet, "owner"),
                DeclExpr::table(u),
            ));
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A01."name" FROM "user" A00, "pet" A01 WHERE (A01."owner" = A00."rowid") ORDER BY A00."rowid", A01."rowid""#
        );
    }

    #[test]
    fn omitted_fields_do_not_pull_joins() {
        let m = model();
        let from = vec![EntityRef::new(m.pet.clone(), 0)];
        let p = TableExpr::entity(from[0].clone());
        let owner = TableExpr::relation(
            p.clone(),
            m.pet.attribute("owner").expect("owner").clone(),
            m.user.clone(),
        );
        let plan = QueryPlan::new(from)
            .select(attr(&p, &m.pet, "name"))
            .field(
                ProjectionField::expr(attr(&owner, &m.user, "name"))
                    .with_flags(FieldFlags::plain().omitted()),
            );
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."name" FROM "pet" A00 ORDER BY A00."rowid""#
        );

        let plan = plan.field(
            ProjectionField::expr(attr(&owner, &m.user, "age"))
                .with_flags(FieldFlags::plain().omitted().sorted(Order::Desc)),
        );
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."name" FROM "pet" A00 INNER JOIN "user" A01 ON A00."owner" = A01."rowid" ORDER BY A01."age" DESC, A00."rowid""#
        );
    }

    #[test]
    fn grouping_orders_by_unsorted_group_fields() {
        let m = model();
        let from = vec![EntityRef::new(m.pet.clone(), 0)];
        let p = TableExpr::entity(from[0].clone());
        let count = function::lookup("count", 0).expect("count");
        let plan = QueryPlan::new(from)
            .field(
                ProjectionField::expr(attr(&p, &m.pet, "owner"))
                    .with_flags(FieldFlags::plain().grouped()),
            )
            .field(
                ProjectionField::expr(DeclExpr::call(count, vec![]))
                    .with_flags(FieldFlags::plain().aggregated().sorted(Order::Desc)),
            );
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."owner", COUNT(*) FROM "pet" A00 GROUP BY A00."owner" ORDER BY COUNT(*) DESC, A00."owner""#
        );
    }

    #[test]
    fn no_visible_fields_selects_zero_and_host_fields_decode() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let plan = QueryPlan::new(from).field(ProjectionField::new(
            FieldValue::Host(DeclExpr::param(0, ValueType::Text)),
            FieldFlags::plain(),
        ));
        let q = compile_query(
            &plan,
            &[Value::text("k")],
            &SqlContext::default(),
            &CompilerConfig::default(),
        )
        .expect("compile");
        assert_eq!(q.sql.sql, r#"SELECT 0 FROM "user" A00 ORDER BY A00."rowid""#);
        assert!(q.columns.is_empty());
        assert_eq!(q.decode(Row::from_values(vec![])).expect("decode"), Value::text("k"));
    }

    #[test]
    fn compound_fields_expand_and_recombine() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let u = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from)
            .field(ProjectionField::new(
                FieldValue::Compound {
                    exprs: vec![attr(&u, &m.user, "name"), attr(&u, &m.user, "age")],
                    combiner: Combiner::Tuple,
                },
                FieldFlags::plain().sorted(Order::Asc),
            ))
            .select(DeclExpr::rowid(u));
        let q = compile_query(&plan, &[], &SqlContext::default(), &CompilerConfig::default())
            .expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."name", A00."age", A00."rowid" FROM "user" A00 ORDER BY A00."name", A00."age", A00."rowid""#
        );
        let row = Row::from_values(vec![Value::text("a"), Value::Integer(3), Value::Rowid(9)]);
        assert_eq!(
            q.decode(row).expect("decode"),
            Value::Tuple(vec![
                Value::Tuple(vec![Value::text("a"), Value::Integer(3)]),
                Value::Rowid(9),
            ])
        );
        assert!(q.decode(Row::from_values(vec![Value::Null])).is_err());
    }

    #[test]
    fn negative_limit_is_user_error() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let plan = QueryPlan::new(from)
            .select(DeclExpr::integer(1))
            .limit(DeclExpr::param(0, ValueType::Integer));
        let err = compile_query(
            &plan,
            &[Value::Integer(-1)],
            &SqlContext::default(),
            &CompilerConfig::default(),
        )
        .expect_err("negative");
        assert_eq!(
            err,
            AtError::NegativeLimit {
                kind: LimitKind::Limit,
                value: -1
            }
        );
    }

    #[test]
    fn constant_true_filter_is_omitted_and_false_is_kept() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let u = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from)
            .select(attr(&u, &m.user, "name"))
            .where_(DeclExpr::param(0, ValueType::Boolean));
        let cfg = CompilerConfig::default();
        let ctx = SqlContext::default();
        let q = compile_query(&plan, &[Value::Boolean(true)], &ctx, &cfg).expect("compile");
        assert!(!q.sql.sql.contains("WHERE"));
        let q = compile_query(&plan, &[Value::Boolean(false)], &ctx, &cfg).expect("compile");
        assert!(q.sql.sql.contains("WHERE ?"));
    }

    #[test]
    fn external_entity_gets_height_bound_join() {
        let ext = Arc::new(
            EntityDef::new("remote")
                .with_mapping(crate::catalog::schema::EntityMapping::External {
                    chain: "other".into(),
                })
                .with_attribute(Attribute::new("name", ValueType::Text))
                .with_attribute(Attribute::relation("transaction", "transaction")),
        );
        let from = vec![EntityRef::new(ext.clone(), 0)];
        let r = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from).select(attr(&r, &ext, "name"));
        let ctx = SqlContext::for_chain(1).with_external_chain(
            "other",
            ExternalChain {
                table_prefix: "c2.".into(),
                chain_iid: 2,
                height: 50,
            },
        );
        let q = compile_query(&plan, &[], &ctx, &CompilerConfig::default()).expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."name" FROM "c2.remote" A00 INNER JOIN "transactions" A01 ON A00."transaction" = A01."tx_iid" INNER JOIN "blocks" A02 ON A01."block_iid" = A02."block_iid" WHERE (A02."block_height" <= ?) ORDER BY A00."rowid""#
        );
        assert_eq!(q.sql.param_values(), vec![Value::Integer(50)]);
    }

    #[test]
    fn transaction_entity_is_scoped_to_chain() {
        let ctx = SqlContext::for_chain(4);
        let tx = ctx.system.transaction.clone();
        let from = vec![EntityRef::new(tx.clone(), 0)];
        let t = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from).select(attr(&t, &tx, "tx_rid"));
        let q = compile_query(&plan, &[], &ctx, &CompilerConfig::default()).expect("compile");
        assert_eq!(
            q.sql.sql,
            r#"SELECT A00."tx_rid" FROM "transactions" A00 WHERE (A00."chain_iid" = ?) ORDER BY A00."tx_iid""#
        );
        assert_eq!(q.sql.param_values(), vec![Value::Integer(4)]);
    }

    #[test]
    fn param_limit_is_enforced() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let u = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from).select(attr(&u, &m.user, "name")).where_(
            DeclExpr::in_list(
                attr(&u, &m.user, "age"),
                (0..5).map(DeclExpr::integer).collect(),
                false,
            ),
        );
        let cfg = CompilerConfig::default()
            .with_max_sql_params(4)
            .with_mutation_batch_size(4);
        let err = compile_query(&plan, &[], &SqlContext::default(), &cfg).expect_err("params");
        assert_eq!(err.code_str(), "sql:too_many_params");
    }

    #[test]
    fn invalid_config_is_rejected_before_compiling() {
        let m = model();
        let from = vec![EntityRef::new(m.user.clone(), 0)];
        let u = TableExpr::entity(from[0].clone());
        let plan = QueryPlan::new(from).select(attr(&u, &m.user, "name"));
        let cfg = CompilerConfig::default().with_max_sql_params(4);
        let err = compile_query(&plan, &[], &SqlContext::default(), &cfg).expect_err("config");
        assert_eq!(err.code(), AtErrorCode::InvalidConfig);
    }
}
