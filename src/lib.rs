pub mod catalog;
pub mod collection;
pub mod config;
pub mod error;
pub mod expr;
pub mod mutation;
pub mod query;
pub mod sql;

pub use catalog::schema::{Attribute, EntityDef, EntityMapping, EntityRef, SystemEntities};
pub use catalog::types::{Row, Value, ValueType};
pub use catalog::{Catalog, ExternalChain, SqlContext};
pub use collection::{ColExpr, ColField, ColSource, CollectionQuery};
pub use config::CompilerConfig;
pub use error::{AtError, AtErrorCode, LimitKind};
pub use expr::{DeclExpr, ReducedExpr, TableExpr};
pub use mutation::{Assignment, MutationStatement, MutationTarget};
pub use query::{AtQuery, Cardinality, CompiledQuery, QueryPlan, compile_query};
pub use sql::{ParameterizedSql, SqlExecutor, SqlParam};
