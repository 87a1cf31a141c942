pub mod alias;
pub mod builder;

use crate::catalog::SqlContext;
use crate::catalog::types::{Row, Value, ValueType};
use crate::error::AtError;
use crate::sql::alias::FromInfo;
use crate::sql::builder::SqlBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlParam {
    pub ty: ValueType,
    pub value: Value,
}

/// Final statement text with positional `?` placeholders and their values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterizedSql {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl ParameterizedSql {
    pub fn param_values(&self) -> Vec<Value> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }
}

impl fmt::Display for ParameterizedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.params.is_empty() {
            write!(f, " [")?;
            for (i, p) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", p.value)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Statement execution adapter. Binding, type coercion and transactions are its concern.
pub trait SqlExecutor {
    /// Runs `sql` and feeds every row, decoded per `columns`, to `consumer`.
    fn query(
        &mut self,
        sql: &ParameterizedSql,
        columns: &[ValueType],
        consumer: &mut dyn FnMut(Row) -> Result<(), AtError>,
    ) -> Result<(), AtError>;

    /// Runs a statement without a result set and returns the affected row count.
    fn execute(&mut self, sql: &ParameterizedSql) -> Result<u64, AtError>;

    fn query_all(
        &mut self,
        sql: &ParameterizedSql,
        columns: &[ValueType],
    ) -> Result<Vec<Row>, AtError> {
        let mut rows = Vec::new();
        self.query(sql, columns, &mut |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }
}

/// `"table" A00 INNER JOIN "t" A01 ON A00."fk" = A01."rowid", ...`
pub fn append_from_clause(
    b: &mut SqlBuilder,
    from: &FromInfo,
    ctx: &SqlContext,
) -> Result<(), AtError> {
    b.append_list(&from.entities, ", ", |b, entity| {
        b.append_name(&entity.alias.entity.table_name(ctx)?);
        b.append(" ");
        b.append(&entity.alias.name);
        append_joins(b, &entity.joins, ctx)
    })
}

fn append_joins(
    b: &mut SqlBuilder,
    joins: &[alias::FromJoin],
    ctx: &SqlContext,
) -> Result<(), AtError> {
    for join in joins {
        b.append(" INNER JOIN ");
        b.append_name(&join.alias.entity.table_name(ctx)?);
        b.append(" ");
        b.append(&join.alias.name);
        b.append(" ON ");
        b.append_column(&join.base, &join.column);
        b.append(" = ");
        b.append_column(&join.alias, &join.alias.entity.rowid_column);
    }
    Ok(())
}

/// Extra tables for UPDATE ... FROM / DELETE ... USING, and the join equalities
/// that would otherwise live in ON clauses.
pub fn append_extra_tables(
    b: &mut SqlBuilder,
    from: &FromInfo,
    ctx: &SqlContext,
) -> Result<Vec<alias::FromJoin>, AtError> {
    let mut tables = Vec::new();
    let mut equalities = Vec::new();
    for (pos, entity) in from.entities.iter().enumerate() {
        if pos > 0 {
            tables.push(entity.alias.clone());
        }
        for join in &entity.joins {
            tables.push(join.alias.clone());
            equalities.push(join.clone());
        }
    }
    b.append_list(&tables, ", ", |b, alias| {
        b.append_name(&alias.entity.table_name(ctx)?);
        b.append(" ");
        b.append(&alias.name);
        Ok(())
    })?;
    Ok(equalities)
}
