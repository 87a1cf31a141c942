use crate::catalog::SqlContext;
use crate::catalog::types::Value;
use crate::config::CompilerConfig;
use crate::error::AtError;
use crate::query::cardinality::Cardinality;
use crate::query::compiler::{CompiledQuery, compile_query};
use crate::query::plan::QueryPlan;
use crate::sql::SqlExecutor;
use tracing::{debug, instrument};

pub const RECORDS_NOUN: &str = "records";

/// An at-expression over database entities, ready to run against an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct AtQuery {
    pub plan: QueryPlan,
    pub cardinality: Cardinality,
    pub noun: &'static str,
}

impl AtQuery {
    pub fn new(plan: QueryPlan, cardinality: Cardinality) -> Self {
        Self {
            plan,
            cardinality,
            noun: RECORDS_NOUN,
        }
    }

    pub fn with_noun(mut self, noun: &'static str) -> Self {
        self.noun = noun;
        self
    }

    pub fn compile(
        &self,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
    ) -> Result<CompiledQuery, AtError> {
        compile_query(&self.plan, params, ctx, config)
    }

    /// Compiles, runs and decodes the query, then applies the cardinality check.
    #[instrument(level = "debug", skip_all, fields(cardinality = ?self.cardinality))]
    pub fn execute(
        &self,
        exec: &mut dyn SqlExecutor,
        params: &[Value],
        ctx: &SqlContext,
        config: &CompilerConfig,
    ) -> Result<Value, AtError> {
        let compiled = self.compile(params, ctx, config)?;
        let mut rows = Vec::new();
        exec.query(&compiled.sql, &compiled.columns, &mut |row| {
            rows.push(compiled.decode(row)?);
            Ok(())
        })?;
        debug!(rows = rows.len(), "at-expression fetched");
        self.cardinality.into_result(rows, self.noun)
    }
}
