use crate::catalog::schema::Attribute;
use crate::catalog::types::{Value, ValueType};
use crate::expr::decl::{DeclExpr, DeclKind, TableExpr, WhenCase};
use crate::expr::function::SysFunction;
use crate::expr::ops::{BinaryOp, UnaryOp};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct CaseBranch {
    pub cond: ReducedExpr,
    pub expr: ReducedExpr,
}

/// Expression after partial evaluation against concrete parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ReducedExpr {
    Constant {
        value: Value,
        ty: ValueType,
    },
    Tuple {
        values: Vec<Value>,
        element: ValueType,
    },
    Table(TableExpr),
    Rowid(TableExpr),
    Attr {
        base: TableExpr,
        attr: Arc<Attribute>,
    },
    Binary {
        op: BinaryOp,
        left: Box<ReducedExpr>,
        right: Box<ReducedExpr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<ReducedExpr>,
    },
    In {
        key: Box<ReducedExpr>,
        alternatives: Vec<ReducedExpr>,
        not: bool,
    },
    Case {
        ty: ValueType,
        cases: Vec<CaseBranch>,
        default: Option<Box<ReducedExpr>>,
    },
    Call {
        function: SysFunction,
        args: Vec<ReducedExpr>,
    },
    /// `ROUND(expr, digits)` around decimal-typed values.
    Round {
        expr: Box<ReducedExpr>,
        digits: u32,
    },
}

impl ReducedExpr {
    pub fn constant(value: Value, ty: ValueType) -> Self {
        ReducedExpr::Constant { value, ty }
    }

    pub fn boolean(value: bool) -> Self {
        Self::constant(Value::Boolean(value), ValueType::Boolean)
    }

    /// Value known at reduction time. Looks through the rounding wrapper.
    pub fn constant_value(&self) -> Option<&Value> {
        match self {
            ReducedExpr::Constant { value, .. } => Some(value),
            ReducedExpr::Round { expr, .. } => expr.constant_value(),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant_value().is_some()
    }

    /// Host-side list content of a constant list or a spliced tuple.
    pub fn host_list(&self) -> Option<Vec<Value>> {
        match self {
            ReducedExpr::Tuple { values, .. } => Some(values.clone()),
            other => match other.constant_value() {
                Some(Value::List(items)) => Some(items.clone()),
                _ => None,
            },
        }
    }

    pub fn ty(&self) -> ValueType {
        match self {
            ReducedExpr::Constant { ty, .. } => ty.clone(),
            ReducedExpr::Tuple { element, .. } => ValueType::list(element.clone()),
            ReducedExpr::Table(table) => table.entity_def().value_type(),
            ReducedExpr::Rowid(_) => ValueType::Rowid,
            ReducedExpr::Attr { attr, .. } => attr.ty.clone(),
            ReducedExpr::Binary { op, left, .. } => op.result_type(&left.ty()),
            ReducedExpr::Unary { op, expr } => op.result_type(&expr.ty()),
            ReducedExpr::In { .. } => ValueType::Boolean,
            ReducedExpr::Case { ty, .. } => ty.clone(),
            ReducedExpr::Call { function, .. } => function.result.clone(),
            ReducedExpr::Round { expr, .. } => expr.ty(),
        }
    }

    /// Wraps a decimal-typed node in `Round` unless it is already wrapped or constant.
    pub fn wrap_decimal(self, ty: &ValueType, digits: u32) -> Self {
        if !ty.is_decimal() {
            return self;
        }
        match self {
            ReducedExpr::Round { .. } | ReducedExpr::Constant { .. } => self,
            other => ReducedExpr::Round {
                expr: Box::new(other),
                digits,
            },
        }
    }

    /// Declarative form that reduces back to `self`. Spliced tuples become list constants.
    pub fn to_decl(&self) -> DeclExpr {
        let ty = self.ty();
        let kind = match self {
            ReducedExpr::Constant { value, .. } => DeclKind::Interpreted(value.clone()),
            ReducedExpr::Tuple { values, .. } => DeclKind::Interpreted(Value::List(values.clone())),
            ReducedExpr::Table(t) => DeclKind::Table(t.clone()),
            ReducedExpr::Rowid(t) => DeclKind::Rowid(t.clone()),
            ReducedExpr::Attr { base, attr } => DeclKind::Attr {
                base: base.clone(),
                attr: attr.clone(),
            },
            ReducedExpr::Binary { op, left, right } => DeclKind::Binary {
                op: *op,
                left: Box::new(left.to_decl()),
                right: Box::new(right.to_decl()),
            },
            ReducedExpr::Unary { op, expr } => DeclKind::Unary {
                op: *op,
                expr: Box::new(expr.to_decl()),
            },
            ReducedExpr::In {
                key,
                alternatives,
                not,
            } => DeclKind::In {
                key: Box::new(key.to_decl()),
                candidates: alternatives.iter().map(ReducedExpr::to_decl).collect(),
                not: *not,
            },
            ReducedExpr::Case { cases, default, .. } => DeclKind::When {
                key: None,
                cases: cases
                    .iter()
                    .map(|c| WhenCase {
                        conds: vec![c.cond.to_decl()],
                        expr: c.expr.to_decl(),
                    })
                    .collect(),
                default: default.as_ref().map(|d| Box::new(d.to_decl())),
            },
            ReducedExpr::Call { function, args } => DeclKind::Call {
                function: function.clone(),
                args: args.iter().map(ReducedExpr::to_decl).collect(),
            },
            ReducedExpr::Round { expr, .. } => return expr.to_decl(),
        };
        DeclExpr::new(ty, kind)
    }
}
