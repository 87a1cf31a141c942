//! UPDATE and DELETE statements over at-expression targets.

pub mod statement;
pub mod target;

pub use statement::{Assignment, CompiledMutation, MutationKind, MutationStatement};
pub use target::{MutationTarget, TargetPortion};
