use crate::catalog::types::Value;
use crate::error::AtError;
use crate::expr::function::SysFunction;
use crate::expr::ops::{BinaryOp, UnaryOp};

/// Variables visible to a collection expression.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Current element; `None` while evaluating limit and offset.
    pub element: Option<&'a Value>,
    pub params: &'a [Value],
}

impl<'a> Frame<'a> {
    pub fn new(element: &'a Value, params: &'a [Value]) -> Self {
        Self {
            element: Some(element),
            params,
        }
    }

    pub fn params_only(params: &'a [Value]) -> Self {
        Self {
            element: None,
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColCase {
    pub conds: Vec<ColExpr>,
    pub expr: ColExpr,
}

/// Expression evaluated in memory over one collection element.
#[derive(Debug, Clone, PartialEq)]
pub enum ColExpr {
    Element,
    Const(Value),
    Param(usize),
    /// Tuple or struct member by position.
    Field { base: Box<ColExpr>, index: usize },
    Binary {
        op: BinaryOp,
        left: Box<ColExpr>,
        right: Box<ColExpr>,
    },
    Unary { op: UnaryOp, expr: Box<ColExpr> },
    In {
        key: Box<ColExpr>,
        candidates: Vec<ColExpr>,
        not: bool,
    },
    When {
        key: Option<Box<ColExpr>>,
        cases: Vec<ColCase>,
        default: Option<Box<ColExpr>>,
    },
    Call {
        function: SysFunction,
        args: Vec<ColExpr>,
    },
    Elvis {
        left: Box<ColExpr>,
        right: Box<ColExpr>,
    },
}

impl ColExpr {
    pub fn field(base: ColExpr, index: usize) -> Self {
        ColExpr::Field {
            base: Box::new(base),
            index,
        }
    }

    pub fn binary(op: BinaryOp, left: ColExpr, right: ColExpr) -> Self {
        ColExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: ColExpr) -> Self {
        ColExpr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn in_list(key: ColExpr, candidates: Vec<ColExpr>, not: bool) -> Self {
        ColExpr::In {
            key: Box::new(key),
            candidates,
            not,
        }
    }

    pub fn call(function: SysFunction, args: Vec<ColExpr>) -> Self {
        ColExpr::Call { function, args }
    }

    pub fn elvis(left: ColExpr, right: ColExpr) -> Self {
        ColExpr::Elvis {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, frame: &Frame<'_>) -> Result<Value, AtError> {
        match self {
            ColExpr::Element => frame
                .element
                .cloned()
                .ok_or_else(|| AtError::internal("collection element is not bound")),
            ColExpr::Const(value) => Ok(value.clone()),
            ColExpr::Param(index) => frame.params.get(*index).cloned().ok_or_else(|| {
                AtError::internal(format!(
                    "parameter #{index} out of range ({} given)",
                    frame.params.len()
                ))
            }),
            ColExpr::Field { base, index } => Ok(base.evaluate(frame)?.field(*index)?.clone()),
            ColExpr::Binary { op, left, right } => {
                let left = left.evaluate(frame)?;
                if let Some(decisive) = op.short_circuit_value() {
                    if left.as_bool()? == decisive {
                        return Ok(Value::Boolean(decisive));
                    }
                }
                op.evaluate(&left, &right.evaluate(frame)?)
            }
            ColExpr::Unary { op, expr } => op.evaluate(&expr.evaluate(frame)?),
            ColExpr::In {
                key,
                candidates,
                not,
            } => {
                let key = key.evaluate(frame)?;
                for candidate in candidates {
                    if candidate.evaluate(frame)? == key {
                        return Ok(Value::Boolean(!not));
                    }
                }
                Ok(Value::Boolean(*not))
            }
            ColExpr::When {
                key,
                cases,
                default,
            } => {
                let key = key.as_ref().map(|k| k.evaluate(frame)).transpose()?;
                for case in cases {
                    for cond in &case.conds {
                        let value = cond.evaluate(frame)?;
                        let hit = match &key {
                            Some(key) => value == *key,
                            None => value.as_bool()?,
                        };
                        if hit {
                            return case.expr.evaluate(frame);
                        }
                    }
                }
                match default {
                    Some(default) => default.evaluate(frame),
                    None => Ok(Value::Null),
                }
            }
            ColExpr::Call { function, args } => {
                let args = args
                    .iter()
                    .map(|a| a.evaluate(frame))
                    .collect::<Result<Vec<_>, _>>()?;
                function.call_host(&args)
            }
            ColExpr::Elvis { left, right } => {
                let left = left.evaluate(frame)?;
                if left.is_null() {
                    right.evaluate(frame)
                } else {
                    Ok(left)
                }
            }
        }
    }
}
