//! Table definitions and structural validation.

use crate::error::{StoreError, StoreResult};
use crate::fields::Fields;
use crate::index::Indexer;
use std::collections::HashMap;
use std::sync::Arc;

/// The mandatory primary index name for every table.
pub const PK: &str = "id";

/// Definition of one index on a table.
#[derive(Clone)]
pub struct IndexSchema {
    /// Index name; must match the key it is registered under.
    pub name: String,
    /// Whether keys are unique across records.
    pub unique: bool,
    /// The projection producing this index's keys.
    pub indexer: Arc<dyn Indexer>,
}

impl IndexSchema {
    /// Creates an index definition.
    pub fn new(name: impl Into<String>, indexer: impl Indexer + 'static) -> Self {
        Self {
            name: name.into(),
            unique: false,
            indexer: Arc::new(indexer),
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

impl std::fmt::Debug for IndexSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSchema")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .field("kind", &self.indexer.kind())
            .field("field", &self.indexer.field())
            .finish()
    }
}

/// Definition of one table: its field vtable and its indexes.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table name; must match the key it is registered under.
    pub name: String,
    /// Field accessors for the table's entity type.
    pub fields: Fields,
    /// Indexes by name. Must contain a unique [`PK`] index.
    pub indexes: HashMap<String, IndexSchema>,
}

impl TableSchema {
    /// Creates a table definition without indexes.
    pub fn new(name: impl Into<String>, fields: Fields) -> Self {
        Self {
            name: name.into(),
            fields,
            indexes: HashMap::new(),
        }
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: IndexSchema) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    /// Looks up an index, failing when it is unknown.
    pub fn require_index(&self, name: &str) -> StoreResult<&IndexSchema> {
        self.indexes
            .get(name)
            .ok_or_else(|| StoreError::UnknownIndex {
                table: self.name.clone(),
                index: name.to_string(),
            })
    }
}

/// The set of tables a store is opened with.
#[derive(Debug, Clone, Default)]
pub struct StoreSchema {
    /// Tables by name.
    pub tables: HashMap<String, TableSchema>,
}

impl StoreSchema {
    /// Creates a schema from a list of tables.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), t))
                .collect(),
        }
    }

    /// Structurally validates the table definitions.
    pub fn validate(&self) -> StoreResult<()> {
        validate_tables(&self.tables)
    }
}

/// Structurally validates a table map.
///
/// Checks that registration keys match names, that every table carries a
/// unique non-collection [`PK`] index, that unique indexes are not
/// collection-valued, and that every indexer's field is registered in the
/// table's field vtable.
pub fn validate_tables(tables: &HashMap<String, TableSchema>) -> StoreResult<()> {
    for (key, table) in tables {
        if *key != table.name {
            return Err(StoreError::schema(format!(
                "table {:?} registered under key {:?}",
                table.name, key
            )));
        }
        let primary = table.indexes.get(PK).ok_or_else(|| {
            StoreError::schema(format!("table {:?} has no {:?} index", table.name, PK))
        })?;
        if !primary.unique {
            return Err(StoreError::schema(format!(
                "primary index of table {:?} must be unique",
                table.name
            )));
        }
        for (index_key, index) in &table.indexes {
            if *index_key != index.name {
                return Err(StoreError::schema(format!(
                    "index {:?} of table {:?} registered under key {:?}",
                    index.name, table.name, index_key
                )));
            }
            if index.unique && index.indexer.kind().is_collection() {
                return Err(StoreError::schema(format!(
                    "index {:?} of table {:?} cannot be both unique and collection-valued",
                    index.name, table.name
                )));
            }
            if !table.fields.contains(index.indexer.field()) {
                return Err(StoreError::schema(format!(
                    "index {:?} of table {:?} reads unregistered field {:?}",
                    index.name,
                    table.name,
                    index.indexer.field()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{downcast, Entity, FieldValue};
    use crate::index::{StringFieldIndex, StringSliceFieldIndex};
    use std::any::Any;

    #[derive(Debug, Clone)]
    struct Item {
        id: String,
        labels: Vec<String>,
    }

    impl Entity for Item {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn clone_entity(&self) -> Box<dyn Entity> {
            Box::new(self.clone())
        }
    }

    fn item_fields() -> Fields {
        Fields::new()
            .field("id", |e: &dyn Entity| {
                downcast::<Item>(e).map(|i| FieldValue::Str(i.id.clone()))
            })
            .field("labels", |e: &dyn Entity| {
                downcast::<Item>(e).map(|i| FieldValue::StrList(i.labels.clone()))
            })
    }

    #[test]
    fn valid_table_passes() {
        let schema = StoreSchema::new([TableSchema::new("item", item_fields())
            .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
            .index(IndexSchema::new(
                "labels",
                StringSliceFieldIndex::new("labels"),
            ))]);
        schema.validate().unwrap();
    }

    #[test]
    fn missing_primary_index_fails() {
        let schema = StoreSchema::new([TableSchema::new("item", item_fields())
            .index(IndexSchema::new("labels", StringSliceFieldIndex::new("labels")))]);
        assert!(matches!(
            schema.validate(),
            Err(StoreError::Schema { .. })
        ));
    }

    #[test]
    fn non_unique_primary_index_fails() {
        let schema = StoreSchema::new([TableSchema::new("item", item_fields())
            .index(IndexSchema::new(PK, StringFieldIndex::new("id")))]);
        assert!(matches!(
            schema.validate(),
            Err(StoreError::Schema { .. })
        ));
    }

    #[test]
    fn index_over_unregistered_field_fails() {
        let schema = StoreSchema::new([TableSchema::new("item", item_fields())
            .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
            .index(IndexSchema::new("ghost", StringFieldIndex::new("ghost")))]);
        assert!(matches!(
            schema.validate(),
            Err(StoreError::Schema { .. })
        ));
    }

    #[test]
    fn unique_collection_index_fails() {
        let schema = StoreSchema::new([TableSchema::new("item", item_fields())
            .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
            .index(IndexSchema::new("labels", StringSliceFieldIndex::new("labels")).unique())]);
        assert!(matches!(
            schema.validate(),
            Err(StoreError::Schema { .. })
        ));
    }
}
