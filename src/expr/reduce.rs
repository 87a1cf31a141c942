use crate::catalog::types::{Value, ValueType, round_decimal};
use crate::config::DEFAULT_DECIMAL_FRAC_DIGITS;
use crate::error::AtError;
use crate::expr::decl::{DeclExpr, DeclKind, WhenCase};
use crate::expr::function;
use crate::expr::ops::BinaryOp;
use crate::expr::reduced::{CaseBranch, ReducedExpr};

/// Runtime inputs for one reduction pass.
#[derive(Debug, Clone, Copy)]
pub struct ReduceContext<'a> {
    pub params: &'a [Value],
    pub frac_digits: u32,
}

impl<'a> ReduceContext<'a> {
    pub fn new(params: &'a [Value]) -> Self {
        Self {
            params,
            frac_digits: DEFAULT_DECIMAL_FRAC_DIGITS,
        }
    }

    pub fn with_frac_digits(mut self, digits: u32) -> Self {
        self.frac_digits = digits;
        self
    }

    fn param(&self, index: usize) -> Result<&'a Value, AtError> {
        self.params.get(index).ok_or_else(|| {
            AtError::internal(format!(
                "parameter #{index} out of range ({} supplied)",
                self.params.len()
            ))
        })
    }
}

pub fn reduce(expr: &DeclExpr, ctx: &ReduceContext<'_>) -> Result<ReducedExpr, AtError> {
    match &expr.kind {
        DeclKind::Table(table) => Ok(ReducedExpr::Table(table.clone())),
        DeclKind::Rowid(table) => Ok(ReducedExpr::Rowid(table.clone())),
        DeclKind::Attr { base, attr } => Ok(ReducedExpr::Attr {
            base: base.clone(),
            attr: attr.clone(),
        }
        .wrap_decimal(&expr.ty, ctx.frac_digits)),
        DeclKind::Binary { op, left, right } => reduce_binary(expr, *op, left, right, ctx),
        DeclKind::Unary { op, expr: operand } => {
            let operand = reduce(operand, ctx)?;
            if let Some(v) = operand.constant_value() {
                let value = op.evaluate(v)?;
                return Ok(folded(value, &expr.ty, ctx));
            }
            Ok(ReducedExpr::Unary {
                op: *op,
                expr: Box::new(operand),
            }
            .wrap_decimal(&expr.ty, ctx.frac_digits))
        }
        DeclKind::In {
            key,
            candidates,
            not,
        } => reduce_in(key, candidates, *not, ctx),
        DeclKind::InCollection {
            key,
            collection,
            not,
        } => reduce_in_collection(key, collection, *not, ctx),
        DeclKind::When {
            key,
            cases,
            default,
        } => reduce_when(expr, key.as_deref(), cases, default.as_deref(), ctx),
        DeclKind::Call { function, args } => {
            let args = args
                .iter()
                .map(|a| reduce(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ReducedExpr::Call {
                function: function.clone(),
                args,
            }
            .wrap_decimal(&expr.ty, ctx.frac_digits))
        }
        DeclKind::Param(index) => Ok(ReducedExpr::constant(
            ctx.param(*index)?.clone(),
            expr.ty.clone(),
        )),
        DeclKind::ArrayParam(index) => {
            let values = ctx.param(*index)?.as_list()?.to_vec();
            let element = match &expr.ty {
                ValueType::List(element) => element.as_ref().clone(),
                other => other.clone(),
            };
            Ok(ReducedExpr::Tuple { values, element })
        }
        DeclKind::Interpreted(value) => Ok(ReducedExpr::constant(value.clone(), expr.ty.clone())),
        DeclKind::Elvis { left, right } => {
            let left = reduce(left, ctx)?;
            match left.constant_value() {
                Some(Value::Null) => reduce(right, ctx),
                Some(value) => Ok(ReducedExpr::constant(value.clone(), expr.ty.clone())),
                None => {
                    let right = reduce(right, ctx)?;
                    let coalesce = function::lookup_typed("coalesce", 2, expr.ty.clone())
                        .ok_or_else(|| AtError::internal("coalesce is not a built-in"))?;
                    Ok(ReducedExpr::Call {
                        function: coalesce,
                        args: vec![left, right],
                    }
                    .wrap_decimal(&expr.ty, ctx.frac_digits))
                }
            }
        }
    }
}

fn folded(value: Value, ty: &ValueType, ctx: &ReduceContext<'_>) -> ReducedExpr {
    let value = match value {
        Value::Decimal(d) if ty.is_decimal() => Value::Decimal(round_decimal(d, ctx.frac_digits)),
        other => other,
    };
    ReducedExpr::constant(value, ty.clone())
}

fn reduce_binary(
    expr: &DeclExpr,
    op: BinaryOp,
    left: &DeclExpr,
    right: &DeclExpr,
    ctx: &ReduceContext<'_>,
) -> Result<ReducedExpr, AtError> {
    let left = reduce(left, ctx)?;

    if let Some(decisive) = op.short_circuit_value() {
        let decisive = Value::Boolean(decisive);
        if let Some(lv) = left.constant_value() {
            // right side must not be reduced when the left decides
            if *lv == decisive {
                return Ok(left);
            }
            return reduce(right, ctx);
        }
        let right = reduce(right, ctx)?;
        if let Some(rv) = right.constant_value() {
            if *rv == decisive {
                return Ok(right);
            }
            return Ok(left);
        }
        return Ok(ReducedExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        });
    }

    let right = reduce(right, ctx)?;
    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let value = op.evaluate(lv, rv)?;
        return Ok(folded(value, &expr.ty, ctx));
    }
    Ok(ReducedExpr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
    .wrap_decimal(&expr.ty, ctx.frac_digits))
}

/// Empty list to a constant, one alternative to `=`/`<>`, otherwise an IN node.
fn make_in(key: ReducedExpr, mut alternatives: Vec<ReducedExpr>, not: bool) -> ReducedExpr {
    match alternatives.len() {
        0 => ReducedExpr::boolean(not),
        1 => {
            let alt = alternatives.remove(0);
            ReducedExpr::Binary {
                op: if not { BinaryOp::Ne } else { BinaryOp::Eq },
                left: Box::new(key),
                right: Box::new(alt),
            }
        }
        _ => ReducedExpr::In {
            key: Box::new(key),
            alternatives,
            not,
        },
    }
}

/// Outcome of matching a reduced key against candidate keys.
enum CandidateMatch {
    Matched,
    Remaining(Vec<ReducedExpr>),
}

fn match_candidates(
    key: &ReducedExpr,
    candidates: &[DeclExpr],
    ctx: &ReduceContext<'_>,
) -> Result<CandidateMatch, AtError> {
    let key_value = key.constant_value();
    let mut remaining = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let candidate = reduce(candidate, ctx)?;
        match (key_value, candidate.constant_value()) {
            (Some(k), Some(c)) if k == c => return Ok(CandidateMatch::Matched),
            (Some(_), Some(_)) => {}
            _ => remaining.push(candidate),
        }
    }
    Ok(CandidateMatch::Remaining(remaining))
}

fn reduce_in(
    key: &DeclExpr,
    candidates: &[DeclExpr],
    not: bool,
    ctx: &ReduceContext<'_>,
) -> Result<ReducedExpr, AtError> {
    let key = reduce(key, ctx)?;
    match match_candidates(&key, candidates, ctx)? {
        CandidateMatch::Matched => Ok(ReducedExpr::boolean(!not)),
        CandidateMatch::Remaining(alternatives) => Ok(make_in(key, alternatives, not)),
    }
}

fn reduce_in_collection(
    key: &DeclExpr,
    collection: &DeclExpr,
    not: bool,
    ctx: &ReduceContext<'_>,
) -> Result<ReducedExpr, AtError> {
    let key = reduce(key, ctx)?;
    let collection_red = reduce(collection, ctx)?;
    let items = collection_red.host_list().ok_or_else(|| {
        AtError::internal("collection operand of 'in' must be a host value")
    })?;
    if items.is_empty() {
        return Ok(ReducedExpr::boolean(not));
    }
    // only a constant key found in the list folds; misses, null included, stay in SQL
    if key.constant_value().is_some_and(|k| items.contains(k)) {
        return Ok(ReducedExpr::boolean(!not));
    }
    let element = match collection_red.ty() {
        ValueType::List(element) => *element,
        _ => key.ty(),
    };
    Ok(ReducedExpr::In {
        key: Box::new(key),
        alternatives: items
            .into_iter()
            .map(|v| ReducedExpr::constant(v, element.clone()))
            .collect(),
        not,
    })
}

fn or_all(mut conds: Vec<ReducedExpr>) -> Option<ReducedExpr> {
    if conds.is_empty() {
        return None;
    }
    let first = conds.remove(0);
    Some(conds.into_iter().fold(first, |acc, next| ReducedExpr::Binary {
        op: BinaryOp::Or,
        left: Box::new(acc),
        right: Box::new(next),
    }))
}

fn reduce_when(
    expr: &DeclExpr,
    key: Option<&DeclExpr>,
    cases: &[WhenCase],
    default: Option<&DeclExpr>,
    ctx: &ReduceContext<'_>,
) -> Result<ReducedExpr, AtError> {
    let key = key.map(|k| reduce(k, ctx)).transpose()?;
    let mut branches: Vec<CaseBranch> = Vec::new();
    let mut matched: Option<ReducedExpr> = None;

    for case in cases {
        let cond = match &key {
            Some(key) => match match_candidates(key, &case.conds, ctx)? {
                CandidateMatch::Matched => None,
                CandidateMatch::Remaining(rest) if rest.is_empty() => continue,
                CandidateMatch::Remaining(rest) => Some(make_in(key.clone(), rest, false)),
            },
            None => {
                let mut kept = Vec::new();
                let mut always = false;
                for cond in &case.conds {
                    let cond = reduce(cond, ctx)?;
                    match cond.constant_value() {
                        Some(Value::Boolean(true)) => {
                            always = true;
                            break;
                        }
                        Some(_) => {}
                        None => kept.push(cond),
                    }
                }
                if always {
                    None
                } else {
                    match or_all(kept) {
                        Some(cond) => Some(cond),
                        None => continue,
                    }
                }
            }
        };
        let result = reduce(&case.expr, ctx)?;
        match cond {
            Some(cond) => branches.push(CaseBranch { cond, expr: result }),
            None => {
                matched = Some(result);
                break;
            }
        }
    }

    // a branch proven to match acts as the default for the branches before it
    let default = match matched {
        Some(result) => Some(result),
        None => default.map(|d| reduce(d, ctx)).transpose()?,
    };

    if branches.is_empty() {
        return Ok(default.unwrap_or_else(|| ReducedExpr::constant(Value::Null, expr.ty.clone())));
    }
    Ok(ReducedExpr::Case {
        ty: expr.ty.clone(),
        cases: branches,
        default: default.map(Box::new),
    }
    .wrap_decimal(&expr.ty, ctx.frac_digits))
}
