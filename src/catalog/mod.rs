pub mod schema;
pub mod types;

use crate::catalog::schema::{EntityDef, EntityRef, SystemEntities};
use crate::error::AtError;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalChain {
    pub table_prefix: CompactString,
    pub chain_iid: i64,
    /// Highest block of the external chain visible to this chain.
    pub height: i64,
}

/// Per-chain naming and scoping used when turning entities into SQL tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlContext {
    pub table_prefix: CompactString,
    pub chain_iid: i64,
    pub external_chains: BTreeMap<CompactString, ExternalChain>,
    pub system: SystemEntities,
}

impl Default for SqlContext {
    fn default() -> Self {
        Self {
            table_prefix: CompactString::default(),
            chain_iid: 0,
            external_chains: BTreeMap::new(),
            system: SystemEntities::standard(),
        }
    }
}

impl SqlContext {
    pub fn for_chain(chain_iid: i64) -> Self {
        Self {
            table_prefix: format!("c{chain_iid}.").into(),
            chain_iid,
            ..Self::default()
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<CompactString>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_external_chain(
        mut self,
        name: impl Into<CompactString>,
        chain: ExternalChain,
    ) -> Self {
        self.external_chains.insert(name.into(), chain);
        self
    }

    pub fn external_chain(&self, name: &str) -> Result<&ExternalChain, AtError> {
        self.external_chains
            .get(name)
            .ok_or_else(|| AtError::internal(format!("external chain '{name}' is not linked")))
    }
}

/// Registry of entity definitions known to a module.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<CompactString, Arc<EntityDef>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: EntityDef) -> Arc<EntityDef> {
        let entity = Arc::new(entity);
        self.entities.insert(entity.name.clone(), entity.clone());
        entity
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntityDef>, AtError> {
        self.entities
            .get(name)
            .ok_or_else(|| AtError::internal(format!("entity '{name}' not found")))
    }

    /// Builds a contiguous from-list for the named entities, in order.
    pub fn from_list(&self, names: &[&str]) -> Result<Vec<EntityRef>, AtError> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| Ok(EntityRef::new(self.entity(name)?.clone(), index)))
            .collect()
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDef>> {
        self.entities.values()
    }
}

#[cfg(test)]
mod tests {
    use super::{Catalog, SqlContext};
    use crate::catalog::schema::EntityDef;

    #[test]
    fn from_list_assigns_contiguous_indices() {
        let mut catalog = Catalog::new();
        catalog.register(EntityDef::new("user"));
        catalog.register(EntityDef::new("pet"));
        let from = catalog.from_list(&["pet", "user", "pet"]).expect("from");
        let indices: Vec<_> = from.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(from[2].entity.name, "pet");
        assert!(catalog.from_list(&["missing"]).is_err());
    }

    #[test]
    fn chain_context_prefixes_tables() {
        let ctx = SqlContext::for_chain(3);
        assert_eq!(ctx.table_prefix, "c3.");
        assert_eq!(ctx.chain_iid, 3);
        assert!(ctx.external_chain("x").is_err());
    }
}
