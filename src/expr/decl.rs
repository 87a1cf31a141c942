use crate::catalog::schema::{Attribute, EntityDef, EntityRef};
use crate::catalog::types::{Value, ValueType};
use crate::expr::function::SysFunction;
use crate::expr::ops::{BinaryOp, UnaryOp};
use std::sync::Arc;

/// A table occurrence: a from-list entity, or the entity reached through a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum TableExpr {
    Entity(EntityRef),
    Relation {
        base: Box<TableExpr>,
        attr: Arc<Attribute>,
        target: Arc<EntityDef>,
    },
}

impl TableExpr {
    pub fn entity(entity_ref: EntityRef) -> Self {
        TableExpr::Entity(entity_ref)
    }

    pub fn relation(base: TableExpr, attr: Arc<Attribute>, target: Arc<EntityDef>) -> Self {
        TableExpr::Relation {
            base: Box::new(base),
            attr,
            target,
        }
    }

    pub fn entity_def(&self) -> &Arc<EntityDef> {
        match self {
            TableExpr::Entity(r) => &r.entity,
            TableExpr::Relation { target, .. } => target,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenCase {
    /// Candidate keys for a keyed `when`, or OR-ed conditions otherwise.
    pub conds: Vec<DeclExpr>,
    pub expr: DeclExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Table(TableExpr),
    Rowid(TableExpr),
    Attr {
        base: TableExpr,
        attr: Arc<Attribute>,
    },
    Binary {
        op: BinaryOp,
        left: Box<DeclExpr>,
        right: Box<DeclExpr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<DeclExpr>,
    },
    In {
        key: Box<DeclExpr>,
        candidates: Vec<DeclExpr>,
        not: bool,
    },
    /// `key in <collection>` where the collection is a host value.
    InCollection {
        key: Box<DeclExpr>,
        collection: Box<DeclExpr>,
        not: bool,
    },
    When {
        key: Option<Box<DeclExpr>>,
        cases: Vec<WhenCase>,
        default: Option<Box<DeclExpr>>,
    },
    Call {
        function: SysFunction,
        args: Vec<DeclExpr>,
    },
    Param(usize),
    /// List parameter spliced as a literal tuple `(?, ?, ...)`.
    ArrayParam(usize),
    Interpreted(Value),
    Elvis {
        left: Box<DeclExpr>,
        right: Box<DeclExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclExpr {
    pub ty: ValueType,
    pub kind: DeclKind,
}

impl DeclExpr {
    pub fn new(ty: ValueType, kind: DeclKind) -> Self {
        Self { ty, kind }
    }

    pub fn table(table: TableExpr) -> Self {
        let ty = table.entity_def().value_type();
        Self::new(ty, DeclKind::Table(table))
    }

    pub fn rowid(table: TableExpr) -> Self {
        Self::new(ValueType::Rowid, DeclKind::Rowid(table))
    }

    pub fn attr(base: TableExpr, attr: Arc<Attribute>) -> Self {
        Self::new(attr.ty.clone(), DeclKind::Attr { base, attr })
    }

    pub fn constant(value: Value, ty: ValueType) -> Self {
        Self::new(ty, DeclKind::Interpreted(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::constant(Value::Boolean(value), ValueType::Boolean)
    }

    pub fn integer(value: i64) -> Self {
        Self::constant(Value::Integer(value), ValueType::Integer)
    }

    pub fn text(value: &str) -> Self {
        Self::constant(Value::text(value), ValueType::Text)
    }

    pub fn param(index: usize, ty: ValueType) -> Self {
        Self::new(ty, DeclKind::Param(index))
    }

    pub fn array_param(index: usize, element: ValueType) -> Self {
        Self::new(ValueType::list(element), DeclKind::ArrayParam(index))
    }

    pub fn binary(op: BinaryOp, left: DeclExpr, right: DeclExpr) -> Self {
        let ty = op.result_type(&left.ty);
        Self::new(
            ty,
            DeclKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    pub fn unary(op: UnaryOp, expr: DeclExpr) -> Self {
        let ty = op.result_type(&expr.ty);
        Self::new(
            ty,
            DeclKind::Unary {
                op,
                expr: Box::new(expr),
            },
        )
    }

    pub fn and(self, other: DeclExpr) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    pub fn or(self, other: DeclExpr) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    pub fn in_list(key: DeclExpr, candidates: Vec<DeclExpr>, not: bool) -> Self {
        Self::new(
            ValueType::Boolean,
            DeclKind::In {
                key: Box::new(key),
                candidates,
                not,
            },
        )
    }

    pub fn in_collection(key: DeclExpr, collection: DeclExpr, not: bool) -> Self {
        Self::new(
            ValueType::Boolean,
            DeclKind::InCollection {
                key: Box::new(key),
                collection: Box::new(collection),
                not,
            },
        )
    }

    pub fn when(
        ty: ValueType,
        key: Option<DeclExpr>,
        cases: Vec<WhenCase>,
        default: Option<DeclExpr>,
    ) -> Self {
        Self::new(
            ty,
            DeclKind::When {
                key: key.map(Box::new),
                cases,
                default: default.map(Box::new),
            },
        )
    }

    pub fn call(function: SysFunction, args: Vec<DeclExpr>) -> Self {
        let ty = function.result.clone();
        Self::new(ty, DeclKind::Call { function, args })
    }

    pub fn elvis(left: DeclExpr, right: DeclExpr) -> Self {
        let ty = right.ty.clone();
        Self::new(
            ty,
            DeclKind::Elvis {
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    /// Left-nested conjunction; `None` for an empty list.
    pub fn and_all(parts: impl IntoIterator<Item = DeclExpr>) -> Option<DeclExpr> {
        parts.into_iter().reduce(|acc, next| acc.and(next))
    }
}
