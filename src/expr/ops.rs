use crate::catalog::types::{Value, ValueType};
use crate::error::AtError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    pub fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Concat => "+",
            other => other.sql(),
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operand value that decides an AND/OR without looking at the other side.
    pub fn short_circuit_value(self) -> Option<bool> {
        match self {
            BinaryOp::And => Some(false),
            BinaryOp::Or => Some(true),
            _ => None,
        }
    }

    pub fn result_type(self, left: &ValueType) -> ValueType {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::And
            | BinaryOp::Or => ValueType::Boolean,
            BinaryOp::Concat => ValueType::Text,
            _ => left.clone(),
        }
    }

    pub fn evaluate(self, left: &Value, right: &Value) -> Result<Value, AtError> {
        match self {
            BinaryOp::Eq => Ok(Value::Boolean(left == right)),
            BinaryOp::Ne => Ok(Value::Boolean(left != right)),
            BinaryOp::Lt => compare(left, right, |o| o == Ordering::Less),
            BinaryOp::Le => compare(left, right, |o| o != Ordering::Greater),
            BinaryOp::Gt => compare(left, right, |o| o == Ordering::Greater),
            BinaryOp::Ge => compare(left, right, |o| o != Ordering::Less),
            BinaryOp::And => Ok(Value::Boolean(left.as_bool()? && right.as_bool()?)),
            BinaryOp::Or => Ok(Value::Boolean(left.as_bool()? || right.as_bool()?)),
            BinaryOp::Concat => {
                let mut out = compact_str::CompactString::from(left.as_text()?);
                out.push_str(right.as_text()?);
                Ok(Value::Text(out))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                arithmetic(self, left, right)
            }
        }
    }
}

fn compare(
    left: &Value,
    right: &Value,
    pick: impl FnOnce(Ordering) -> bool,
) -> Result<Value, AtError> {
    if left.is_null() || right.is_null() {
        return Err(AtError::type_mismatch("comparable value", "null"));
    }
    Ok(Value::Boolean(pick(left.cmp(right))))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, AtError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => integer_op(op, *a, *b).map(Value::Integer),
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            decimal_op(op, left.as_decimal()?, right.as_decimal()?).map(Value::Decimal)
        }
        (Value::Integer(_), other) | (other, _) => {
            Err(AtError::type_mismatch("number", other.type_name()))
        }
    }
}

fn integer_op(op: BinaryOp, a: i64, b: i64) -> Result<i64, AtError> {
    let overflow = || AtError::Overflow { op: op.code() };
    match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        BinaryOp::Div => {
            if b == 0 {
                return Err(AtError::DivisionByZero);
            }
            a.checked_div(b).ok_or_else(overflow)
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(AtError::DivisionByZero);
            }
            a.checked_rem(b).ok_or_else(overflow)
        }
        other => Err(AtError::internal(format!(
            "'{}' is not an arithmetic operator",
            other.code()
        ))),
    }
}

fn decimal_op(op: BinaryOp, a: Decimal, b: Decimal) -> Result<Decimal, AtError> {
    let overflow = || AtError::Overflow { op: op.code() };
    match op {
        BinaryOp::Add => a.checked_add(b).ok_or_else(overflow),
        BinaryOp::Sub => a.checked_sub(b).ok_or_else(overflow),
        BinaryOp::Mul => a.checked_mul(b).ok_or_else(overflow),
        BinaryOp::Div => {
            if b.is_zero() {
                return Err(AtError::DivisionByZero);
            }
            a.checked_div(b).ok_or_else(overflow)
        }
        BinaryOp::Mod => {
            if b.is_zero() {
                return Err(AtError::DivisionByZero);
            }
            a.checked_rem(b).ok_or_else(overflow)
        }
        other => Err(AtError::internal(format!(
            "'{}' is not an arithmetic operator",
            other.code()
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Minus,
}

impl UnaryOp {
    pub fn sql(self) -> &'static str {
        match self {
            UnaryOp::Not => "NOT ",
            UnaryOp::Minus => "-",
        }
    }

    pub fn result_type(self, operand: &ValueType) -> ValueType {
        match self {
            UnaryOp::Not => ValueType::Boolean,
            UnaryOp::Minus => operand.clone(),
        }
    }

    pub fn evaluate(self, operand: &Value) -> Result<Value, AtError> {
        match (self, operand) {
            (UnaryOp::Not, v) => Ok(Value::Boolean(!v.as_bool()?)),
            (UnaryOp::Minus, Value::Integer(v)) => v
                .checked_neg()
                .map(Value::Integer)
                .ok_or(AtError::Overflow { op: "-" }),
            (UnaryOp::Minus, Value::Decimal(d)) => Ok(Value::Decimal(-*d)),
            (UnaryOp::Minus, other) => Err(AtError::type_mismatch("number", other.type_name())),
        }
    }
}
