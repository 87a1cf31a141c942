use crate::catalog::types::Value;
use crate::error::AtError;
use serde::{Deserialize, Serialize};

/// Declared expectation on the number of result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    ExactlyOne,
    ZeroOrOne,
    OneOrMore,
    ZeroOrMore,
}

impl Cardinality {
    pub fn allows_zero(self) -> bool {
        matches!(self, Cardinality::ZeroOrOne | Cardinality::ZeroOrMore)
    }

    pub fn allows_many(self) -> bool {
        matches!(self, Cardinality::OneOrMore | Cardinality::ZeroOrMore)
    }

    pub fn matches(self, count: usize) -> bool {
        !((count == 0 && !self.allows_zero()) || (count > 1 && !self.allows_many()))
    }

    pub fn check(self, count: usize, noun: &'static str) -> Result<(), AtError> {
        if self.matches(count) {
            Ok(())
        } else {
            Err(AtError::Cardinality { count, noun })
        }
    }

    /// Checks the count and shapes the final value: a list for `*-or-more`,
    /// otherwise the single row or null.
    pub fn into_result(self, mut rows: Vec<Value>, noun: &'static str) -> Result<Value, AtError> {
        self.check(rows.len(), noun)?;
        if self.allows_many() {
            return Ok(Value::List(rows));
        }
        Ok(rows.pop().unwrap_or(Value::Null))
    }
}
