pub mod cardinality;
pub mod compiler;
pub mod executor;
pub mod plan;

pub use cardinality::Cardinality;
pub use compiler::{CompiledQuery, compile_query};
pub use executor::AtQuery;
pub use plan::{
    Combiner, FieldFlags, FieldValue, Order, ProjectionField, QueryPlan, RowDecoder,
};

use crate::catalog::types::Value;
use crate::error::{AtError, LimitKind};

/// Validates a reduced limit or offset value.
pub fn limit_value(value: &Value, kind: LimitKind) -> Result<i64, AtError> {
    let value = value.as_integer()?;
    if value < 0 {
        return Err(AtError::NegativeLimit { kind, value });
    }
    Ok(value)
}
