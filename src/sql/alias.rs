use crate::catalog::schema::{Attribute, EntityDef, EntityRef};
use crate::error::AtError;
use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::Arc;

/// A generated table alias and the entity whose table it names.
#[derive(Debug, Clone)]
pub struct TableAlias {
    pub name: CompactString,
    pub entity: Arc<EntityDef>,
}

impl TableAlias {
    pub fn new(name: impl Into<CompactString>, entity: Arc<EntityDef>) -> Self {
        Self {
            name: name.into(),
            entity,
        }
    }
}

impl PartialEq for TableAlias {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.entity.name == other.entity.name
    }
}

impl Eq for TableAlias {}

impl std::hash::Hash for TableAlias {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.entity.name.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromJoin {
    pub base: TableAlias,
    /// Column of `base` holding the referenced row id.
    pub column: CompactString,
    pub alias: TableAlias,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromEntity {
    pub alias: TableAlias,
    pub joins: Vec<FromJoin>,
}

/// FROM-clause shape: one entry per from-list entity with the joins reached from it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FromInfo {
    pub entities: Vec<FromEntity>,
}

impl FromInfo {
    pub fn aliases(&self) -> impl Iterator<Item = &TableAlias> {
        self.entities
            .iter()
            .flat_map(|e| std::iter::once(&e.alias).chain(e.joins.iter().map(|j| &j.alias)))
    }

    pub fn join_count(&self) -> usize {
        self.entities.iter().map(|e| e.joins.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct JoinKey {
    base: CompactString,
    attr: CompactString,
}

/// Assigns aliases to the from-list eagerly and to joins on first request.
#[derive(Debug)]
pub struct AliasRegistry {
    next_alias: u32,
    from: Vec<TableAlias>,
    joins: HashMap<JoinKey, TableAlias>,
    // owning from-list position for every alias name
    roots: HashMap<CompactString, usize>,
    join_order: Vec<(usize, FromJoin)>,
    sealed: bool,
}

impl AliasRegistry {
    pub fn new(from: &[EntityRef]) -> Result<Self, AtError> {
        let mut registry = Self {
            next_alias: 0,
            from: Vec::with_capacity(from.len()),
            joins: HashMap::new(),
            roots: HashMap::new(),
            join_order: Vec::new(),
            sealed: false,
        };
        for (pos, entity_ref) in from.iter().enumerate() {
            if entity_ref.index != pos {
                return Err(AtError::internal(format!(
                    "entity ref '{}' has index {} at position {pos}",
                    entity_ref.entity.name, entity_ref.index
                )));
            }
            let alias = registry.mint(entity_ref.entity.clone());
            registry.roots.insert(alias.name.clone(), pos);
            registry.from.push(alias);
        }
        Ok(registry)
    }

    fn mint(&mut self, entity: Arc<EntityDef>) -> TableAlias {
        let alias = TableAlias::new(format!("A{:02}", self.next_alias), entity);
        self.next_alias += 1;
        alias
    }

    pub fn get_alias(&self, entity_ref: &EntityRef) -> Result<TableAlias, AtError> {
        let alias = self.from.get(entity_ref.index).ok_or_else(|| {
            AtError::internal(format!(
                "entity ref #{} ('{}') is not registered",
                entity_ref.index, entity_ref.entity.name
            ))
        })?;
        if alias.entity.name != entity_ref.entity.name {
            return Err(AtError::internal(format!(
                "entity ref #{} is '{}', registered as '{}'",
                entity_ref.index, entity_ref.entity.name, alias.entity.name
            )));
        }
        Ok(alias.clone())
    }

    pub fn get_relation_alias(
        &mut self,
        base: &TableAlias,
        attr: &Attribute,
        target: &Arc<EntityDef>,
    ) -> Result<TableAlias, AtError> {
        let key = JoinKey {
            base: base.name.clone(),
            attr: attr.name.clone(),
        };
        if let Some(existing) = self.joins.get(&key) {
            return Ok(existing.clone());
        }
        if self.sealed {
            return Err(AtError::internal(format!(
                "join {}.{} requested after FROM clause was fixed",
                base.name, attr.name
            )));
        }
        let root = *self.roots.get(&base.name).ok_or_else(|| {
            AtError::internal(format!("alias {} is not registered", base.name))
        })?;
        let alias = self.mint(target.clone());
        self.roots.insert(alias.name.clone(), root);
        self.joins.insert(key, alias.clone());
        self.join_order.push((
            root,
            FromJoin {
                base: base.clone(),
                column: attr.sql_column.clone(),
                alias: alias.clone(),
            },
        ));
        Ok(alias)
    }

    /// Fixes the FROM shape; any later request for an unseen join is an error.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn snapshot_from_info(&self) -> FromInfo {
        let entities = self
            .from
            .iter()
            .enumerate()
            .map(|(pos, alias)| FromEntity {
                alias: alias.clone(),
                joins: self
                    .join_order
                    .iter()
                    .filter(|(root, _)| *root == pos)
                    .map(|(_, join)| join.clone())
                    .collect(),
            })
            .collect();
        FromInfo { entities }
    }
}
