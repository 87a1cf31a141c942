use crate::catalog::SqlContext;
use crate::catalog::schema::Attribute;
use crate::catalog::types::{Value, ValueType};
use crate::config::CompilerConfig;
use crate::error::AtError;
use crate::expr::decl::DeclExpr;
use crate::expr::emit::{emit_sql, touch_aliases};
use crate::expr::ops::BinaryOp;
use crate::expr::reduce::{ReduceContext, reduce};
use crate::mutation::target::{MutationTarget, TargetPortion};
use crate::query::cardinality::Cardinality;
use crate::query::executor::RECORDS_NOUN;
use crate::sql::alias::AliasRegistry;
use crate::sql::builder::SqlBuilder;
use crate::sql::{ParameterizedSql, SqlExecutor, append_extra_tables};
use std::sync::Arc;
use tracing::debug;

/// `attr = [attr OP] expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub attr: Arc<Attribute>,
    pub op: Option<BinaryOp>,
    pub expr: DeclExpr,
}

impl Assignment {
    pub fn set(attr: Arc<Attribute>, expr: DeclExpr) -> Self {
        Self {
            attr,
            op: None,
            expr,
        }
    }

    pub fn compound(attr: Arc<Attribute>, op: BinaryOp, expr: DeclExpr) -> Self {
        Self {
            attr,
            op: Some(op),
            expr,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Update(Vec<Assignment>),
    Delete,
}

/// A built statement and the row count it must affect, if checked.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMutation {
    pub sql: ParameterizedSql,
    pub check: Option<Cardinality>,
}

impl CompiledMutation {
    pub fn uses_returning(&self) -> bool {
        self.check.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationStatement {
    pub target: MutationTarget,
    pub kind: MutationKind,
}

impl MutationStatement {
    pub fn update(target: MutationTarget, assignments: Vec<Assignment>) -> Self {
        Self {
            target,
            kind: MutationKind::Update(assignments),
        }
    }

    pub fn delete(target: MutationTarget) -> Self {
        Self {
            target,
            kind: MutationKind::Delete,
        }
    }

    /// Every statement the mutation runs, in execution order.
    pub fn compile(
        &self,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
    ) -> Result<Vec<CompiledMutation>, AtError> {
        config.validate()?;
        self.target
            .portions(params, ctx, config)?
            .into_iter()
            .map(|portion| {
                // an unrestricted count needs no probe
                let check = portion.check.filter(|c| *c != Cardinality::ZeroOrMore);
                let sql = self.build_sql(&portion, params, ctx, config, check.is_some())?;
                Ok(CompiledMutation { sql, check })
            })
            .collect()
    }

    pub fn build_sql(
        &self,
        portion: &TargetPortion,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
        returning: bool,
    ) -> Result<ParameterizedSql, AtError> {
        let rctx = ReduceContext::new(params).with_frac_digits(config.decimal_frac_digits);
        let primary = portion
            .from
            .first()
            .ok_or_else(|| AtError::internal("mutation without primary entity"))?;
        let mut reg = AliasRegistry::new(&portion.from)?;

        let filter = portion
            .filter
            .as_ref()
            .map(|f| reduce(f, &rctx))
            .transpose()?
            .filter(|f| f.constant_value() != Some(&Value::Boolean(true)));
        let assignments = match &self.kind {
            MutationKind::Update(assignments) => assignments
                .iter()
                .map(|a| {
                    let expr = reduce(&a.expr, &rctx)?
                        .wrap_decimal(&a.attr.ty, config.decimal_frac_digits);
                    Ok((a, expr))
                })
                .collect::<Result<Vec<_>, AtError>>()?,
            MutationKind::Delete => Vec::new(),
        };

        if let Some(filter) = &filter {
            touch_aliases(filter, &mut reg)?;
        }
        for (_, expr) in &assignments {
            touch_aliases(expr, &mut reg)?;
        }
        reg.seal();
        let from_info = reg.snapshot_from_info();
        let main = reg.get_alias(primary)?;

        let mut b = SqlBuilder::new();
        match &self.kind {
            MutationKind::Update(_) => b.append("UPDATE "),
            MutationKind::Delete => b.append("DELETE FROM "),
        }
        b.append_name(&primary.entity.table_name(ctx)?);
        b.append(" AS ");
        b.append(&main.name);

        if !assignments.is_empty() {
            b.append(" SET ");
            for (i, (assignment, expr)) in assignments.iter().enumerate() {
                if i > 0 {
                    b.append(", ");
                }
                b.append_name(&assignment.attr.sql_column);
                b.append(" = ");
                if let Some(op) = assignment.op {
                    b.append_name(&assignment.attr.sql_column);
                    b.append(" ");
                    b.append(op.sql());
                    b.append(" ");
                }
                emit_sql(expr, &mut reg, &mut b)?;
            }
        }

        let mut extra = SqlBuilder::new();
        let joins = append_extra_tables(&mut extra, &from_info, ctx)?;
        if !extra.is_empty() {
            b.append(match &self.kind {
                MutationKind::Update(_) => " FROM ",
                MutationKind::Delete => " USING ",
            });
            b.append_builder(&extra);
        }

        let mut where_b = SqlBuilder::new();
        for join in &joins {
            where_b.append_sep(" AND ");
            where_b.append("(");
            where_b.append_column(&join.base, &join.column);
            where_b.append(" = ");
            where_b.append_column(&join.alias, &join.alias.entity.rowid_column);
            where_b.append(")");
        }
        if let Some(filter) = &filter {
            where_b.append_sep(" AND ");
            emit_sql(filter, &mut reg, &mut where_b)?;
        }
        if !where_b.is_empty() {
            b.append(" WHERE ");
            b.append_builder(&where_b);
        }

        if returning {
            b.append(" RETURNING ");
            b.append_column(&main, &primary.entity.rowid_column);
        }

        let sql = b.build(config.max_sql_params)?;
        if config.log_sql {
            debug!(sql = %sql, "compiled mutation");
        }
        Ok(sql)
    }

    /// Runs every portion in order, stopping at the first failure. Returns the affected row count.
    pub fn execute(
        &self,
        exec: &mut dyn SqlExecutor,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
    ) -> Result<u64, AtError> {
        let statements = self.compile(params, ctx, config)?;
        let batches = statements.len();
        let mut affected = 0u64;
        for (batch, stmt) in statements.iter().enumerate() {
            debug!(batch, batches, params = stmt.sql.params.len(), "mutation batch");
            match stmt.check {
                Some(cardinality) => {
                    let mut count = 0usize;
                    exec.query(&stmt.sql, &[ValueType::Rowid], &mut |_| {
                        count += 1;
                        Ok(())
                    })?;
                    cardinality.check(count, RECORDS_NOUN)?;
                    affected += count as u64;
                }
                None => affected += exec.execute(&stmt.sql)?,
            }
        }
        Ok(affected)
    }
}
