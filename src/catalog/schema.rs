use crate::catalog::SqlContext;
use crate::catalog::types::{Value, ValueType};
use crate::error::AtError;
use crate::expr::decl::{DeclExpr, TableExpr};
use crate::expr::ops::BinaryOp;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_ROWID_COLUMN: &str = "rowid";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attribute {
    pub name: CompactString,
    pub sql_column: CompactString,
    pub ty: ValueType,
    /// Name of the entity this attribute references, for relation attributes.
    #[serde(default)]
    pub relation: Option<CompactString>,
    #[serde(default)]
    pub mutable: bool,
}

impl Attribute {
    pub fn new(name: impl Into<CompactString>, ty: ValueType) -> Self {
        let name = name.into();
        Self {
            sql_column: name.clone(),
            name,
            ty,
            relation: None,
            mutable: false,
        }
    }

    pub fn relation(name: impl Into<CompactString>, target: impl Into<CompactString>) -> Self {
        let target = target.into();
        let mut attr = Self::new(name, ValueType::Entity(target.clone()));
        attr.relation = Some(target);
        attr
    }

    pub fn with_column(mut self, column: impl Into<CompactString>) -> Self {
        self.sql_column = column.into();
        self
    }

    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub fn is_relation(&self) -> bool {
        self.relation.is_some()
    }
}

/// How an entity is stored and which implicit predicate scopes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EntityMapping {
    /// Table named by the chain's prefix followed by the entity's mount name.
    #[default]
    Regular,
    /// Entity of another chain, visible only up to that chain's known height.
    External { chain: CompactString },
    /// System transaction table scoped by chain iid. `None` is the current chain.
    Transaction { chain: Option<CompactString> },
    /// System block table scoped by chain iid.
    Block { chain: Option<CompactString> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityDef {
    pub name: CompactString,
    pub mount: CompactString,
    pub rowid_column: CompactString,
    pub attributes: Vec<Arc<Attribute>>,
    #[serde(default)]
    pub mapping: EntityMapping,
    /// Singleton entity holding exactly one row.
    #[serde(default)]
    pub is_object: bool,
}

impl EntityDef {
    pub fn new(name: impl Into<CompactString>) -> Self {
        let name = name.into();
        Self {
            mount: name.clone(),
            name,
            rowid_column: DEFAULT_ROWID_COLUMN.into(),
            attributes: Vec::new(),
            mapping: EntityMapping::Regular,
            is_object: false,
        }
    }

    pub fn object(name: impl Into<CompactString>) -> Self {
        let mut def = Self::new(name);
        def.is_object = true;
        def
    }

    pub fn with_mount(mut self, mount: impl Into<CompactString>) -> Self {
        self.mount = mount.into();
        self
    }

    pub fn with_rowid_column(mut self, column: impl Into<CompactString>) -> Self {
        self.rowid_column = column.into();
        self
    }

    pub fn with_mapping(mut self, mapping: EntityMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_attribute(mut self, attr: Attribute) -> Self {
        self.attributes.push(Arc::new(attr));
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Arc<Attribute>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn require_attribute(&self, name: &str) -> Result<&Arc<Attribute>, AtError> {
        self.attribute(name).ok_or_else(|| {
            AtError::internal(format!("entity '{}' has no attribute '{name}'", self.name))
        })
    }

    pub fn value_type(&self) -> ValueType {
        ValueType::Entity(self.name.clone())
    }

    pub fn table_name(&self, ctx: &SqlContext) -> Result<CompactString, AtError> {
        let name = match &self.mapping {
            EntityMapping::Regular => format!("{}{}", ctx.table_prefix, self.mount),
            EntityMapping::External { chain } => {
                let chain = ctx.external_chain(chain)?;
                format!("{}{}", chain.table_prefix, self.mount)
            }
            EntityMapping::Transaction { .. } | EntityMapping::Block { .. } => {
                self.mount.to_string()
            }
        };
        Ok(name.into())
    }
}

impl EntityMapping {
    /// Implicit predicate over `base`, ANDed into every query that lists the entity.
    pub fn extra_where(
        &self,
        entity: &EntityDef,
        base: &TableExpr,
        ctx: &SqlContext,
    ) -> Result<Option<DeclExpr>, AtError> {
        match self {
            EntityMapping::Regular => Ok(None),
            EntityMapping::External { chain } => {
                let height = ctx.external_chain(chain)?.height;
                let tx_attr = entity.require_attribute("transaction")?;
                let tx = TableExpr::relation(
                    base.clone(),
                    tx_attr.clone(),
                    ctx.system.transaction.clone(),
                );
                Ok(Some(block_height_bound(tx, ctx, height)?))
            }
            EntityMapping::Transaction { chain } => {
                let Some(chain) = chain else {
                    return Ok(Some(chain_scope(entity, base, ctx.chain_iid)?));
                };
                let ext = ctx.external_chain(chain)?;
                let scope = chain_scope(entity, base, ext.chain_iid)?;
                let bound = block_height_bound(base.clone(), ctx, ext.height)?;
                Ok(Some(DeclExpr::binary(BinaryOp::And, scope, bound)))
            }
            EntityMapping::Block { chain } => {
                let Some(chain) = chain else {
                    return Ok(Some(chain_scope(entity, base, ctx.chain_iid)?));
                };
                let ext = ctx.external_chain(chain)?;
                let scope = chain_scope(entity, base, ext.chain_iid)?;
                let height_attr = entity.require_attribute("block_height")?;
                let bound = DeclExpr::binary(
                    BinaryOp::Le,
                    DeclExpr::attr(base.clone(), height_attr.clone()),
                    DeclExpr::constant(Value::Integer(ext.height), ValueType::Integer),
                );
                Ok(Some(DeclExpr::binary(BinaryOp::And, scope, bound)))
            }
        }
    }
}

fn chain_scope(entity: &EntityDef, base: &TableExpr, chain_iid: i64) -> Result<DeclExpr, AtError> {
    let attr = entity.require_attribute("chain_iid")?;
    Ok(DeclExpr::binary(
        BinaryOp::Eq,
        DeclExpr::attr(base.clone(), attr.clone()),
        DeclExpr::constant(Value::Integer(chain_iid), ValueType::Integer),
    ))
}

/// `tx.block.block_height <= height` for a transaction-typed table expression.
fn block_height_bound(tx: TableExpr, ctx: &SqlContext, height: i64) -> Result<DeclExpr, AtError> {
    let tx_def = &ctx.system.transaction;
    let block_def = &ctx.system.block;
    let block_attr = tx_def.require_attribute("block")?;
    let height_attr = block_def.require_attribute("block_height")?;
    let block = TableExpr::relation(tx, block_attr.clone(), block_def.clone());
    Ok(DeclExpr::binary(
        BinaryOp::Le,
        DeclExpr::attr(block, height_attr.clone()),
        DeclExpr::constant(Value::Integer(height), ValueType::Integer),
    ))
}

/// One occurrence of an entity in a query's from-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity: Arc<EntityDef>,
    pub index: usize,
}

impl EntityRef {
    pub fn new(entity: Arc<EntityDef>, index: usize) -> Self {
        Self { entity, index }
    }
}

/// Built-in transaction and block tables shared by all chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemEntities {
    pub transaction: Arc<EntityDef>,
    pub block: Arc<EntityDef>,
}

impl SystemEntities {
    pub fn standard() -> Self {
        let block = EntityDef::new("block")
            .with_mount("blocks")
            .with_rowid_column("block_iid")
            .with_mapping(EntityMapping::Block { chain: None })
            .with_attribute(Attribute::new("block_height", ValueType::Integer))
            .with_attribute(Attribute::new("block_rid", ValueType::ByteArray))
            .with_attribute(Attribute::new("timestamp", ValueType::Integer))
            .with_attribute(Attribute::new("chain_iid", ValueType::Integer));
        let transaction = EntityDef::new("transaction")
            .with_mount("transactions")
            .with_rowid_column("tx_iid")
            .with_mapping(EntityMapping::Transaction { chain: None })
            .with_attribute(Attribute::new("tx_rid", ValueType::ByteArray))
            .with_attribute(Attribute::new("tx_hash", ValueType::ByteArray))
            .with_attribute(Attribute::new("tx_data", ValueType::ByteArray))
            .with_attribute(Attribute::relation("block", "block").with_column("block_iid"))
            .with_attribute(Attribute::new("chain_iid", ValueType::Integer));
        Self {
            transaction: Arc::new(transaction),
            block: Arc::new(block),
        }
    }
}

impl Default for SystemEntities {
    fn default() -> Self {
        Self::standard()
    }
}
