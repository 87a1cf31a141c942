//! Two-layer expression model.
//!
//! [`decl::DeclExpr`] describes what a filter or projection term computes.
//! [`reduce::reduce`] partially evaluates it against runtime parameters into a
//! [`reduced::ReducedExpr`], which is the only form that can be rendered as SQL
//! (see [`emit`]).

pub mod decl;
pub mod emit;
pub mod function;
pub mod ops;
pub mod reduce;
pub mod reduced;

pub use decl::{DeclExpr, DeclKind, TableExpr, WhenCase};
pub use emit::{emit_sql, touch_aliases};
pub use ops::{BinaryOp, UnaryOp};
pub use reduce::{ReduceContext, reduce};
pub use reduced::ReducedExpr;
