//! Store transactions: snapshot reads and copy-on-write writes.

use crate::entity::{Entity, FieldValue, Record};
use crate::error::{StoreError, StoreResult};
use crate::schema::{StoreSchema, TableSchema, PK};
use crate::store::{StoreState, TableState};
use parking_lot::{MutexGuard, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) enum TxnInner<'s> {
    Read(Arc<StoreState>),
    Write {
        working: StoreState,
        _guard: MutexGuard<'s, ()>,
    },
}

/// An open transaction.
///
/// Reads observe the transaction's own uncommitted writes. Nothing is
/// visible to other transactions until [`Txn::commit`]; dropping the
/// transaction (or calling [`Txn::abort`]) discards all work.
pub struct Txn<'s> {
    schema: &'s StoreSchema,
    shared: &'s RwLock<Arc<StoreState>>,
    inner: TxnInner<'s>,
}

/// The index keys one record occupies, per index.
type RecordKeys = Vec<(String, Vec<Vec<u8>>)>;

impl<'s> Txn<'s> {
    pub(crate) fn new(
        schema: &'s StoreSchema,
        shared: &'s RwLock<Arc<StoreState>>,
        inner: TxnInner<'s>,
    ) -> Self {
        Self {
            schema,
            shared,
            inner,
        }
    }

    /// Whether this is a write transaction.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self.inner, TxnInner::Write { .. })
    }

    fn state(&self) -> &StoreState {
        match &self.inner {
            TxnInner::Read(snapshot) => snapshot,
            TxnInner::Write { working, .. } => working,
        }
    }

    fn table_schema(&self, table: &str) -> StoreResult<&TableSchema> {
        self.schema
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })
    }

    /// Inserts a record, replacing any record with the same primary key.
    pub fn insert(&mut self, table: &str, entity: Box<dyn Entity>) -> StoreResult<()> {
        let table_schema = self
            .schema
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;
        let record: Record = Arc::from(entity);

        let pk = primary_key(table_schema, record.as_ref())?;
        let new_keys = record_keys(table_schema, record.as_ref())?;

        let working = match &mut self.inner {
            TxnInner::Read(_) => return Err(StoreError::ReadOnly),
            TxnInner::Write { working, .. } => working,
        };
        let table_state = working
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;

        // Replace semantics: drop the previous record's index entries
        // before adding the new ones. Old keys are computed up front so an
        // indexer error cannot leave a half-updated table.
        if let Some(existing) = lookup_unique(table_state, PK, &pk) {
            let old_keys = record_keys(table_schema, existing.as_ref())?;
            remove_entries(table_state, table_schema, &old_keys, &pk);
        }
        insert_entries(table_state, table_schema, &new_keys, &pk, &record);
        Ok(())
    }

    /// Deletes the record whose primary key matches `entity`.
    pub fn delete(&mut self, table: &str, entity: &dyn Entity) -> StoreResult<()> {
        let table_schema = self
            .schema
            .tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;
        let pk = primary_key(table_schema, entity)?;

        let working = match &mut self.inner {
            TxnInner::Read(_) => return Err(StoreError::ReadOnly),
            TxnInner::Write { working, .. } => working,
        };
        let table_state = working
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable {
                table: table.to_string(),
            })?;

        let existing = lookup_unique(table_state, PK, &pk).ok_or_else(|| StoreError::NotFound {
            table: table.to_string(),
        })?;
        let old_keys = record_keys(table_schema, existing.as_ref())?;
        remove_entries(table_state, table_schema, &old_keys, &pk);
        Ok(())
    }

    /// Returns the first record matching `args` on the given index.
    pub fn first(
        &self,
        table: &str,
        index: &str,
        args: &[FieldValue],
    ) -> StoreResult<Option<Record>> {
        let table_schema = self.table_schema(table)?;
        let index_schema = table_schema.require_index(index)?;
        let key = index_schema.indexer.key_from_arg(args)?;
        let table_state = self.state().tables.get(table).ok_or_else(|| {
            StoreError::UnknownTable {
                table: table.to_string(),
            }
        })?;
        let tree = index_tree(table_state, table, index)?;
        if index_schema.unique {
            Ok(tree.get(&key).cloned())
        } else {
            Ok(prefix_scan(tree, &key).next())
        }
    }

    /// Returns all records matching `args` on the given index.
    ///
    /// The result is materialized, so callers may freely mutate the store
    /// while walking it.
    pub fn scan(
        &self,
        table: &str,
        index: &str,
        args: &[FieldValue],
    ) -> StoreResult<Vec<Record>> {
        let table_schema = self.table_schema(table)?;
        let index_schema = table_schema.require_index(index)?;
        let key = index_schema.indexer.key_from_arg(args)?;
        let table_state = self.state().tables.get(table).ok_or_else(|| {
            StoreError::UnknownTable {
                table: table.to_string(),
            }
        })?;
        let tree = index_tree(table_state, table, index)?;
        if index_schema.unique {
            Ok(tree.get(&key).cloned().into_iter().collect())
        } else {
            Ok(prefix_scan(tree, &key).collect())
        }
    }

    /// Publishes this transaction's writes. A no-op for read transactions.
    pub fn commit(self) -> StoreResult<()> {
        if let TxnInner::Write { working, _guard } = self.inner {
            *self.shared.write() = Arc::new(working);
        }
        Ok(())
    }

    /// Discards this transaction's writes.
    pub fn abort(self) {}
}

fn primary_key(table_schema: &TableSchema, entity: &dyn Entity) -> StoreResult<Vec<u8>> {
    let primary = table_schema.require_index(PK)?;
    let mut keys = primary
        .indexer
        .keys_from_entity(&table_schema.fields, entity)?;
    match keys.len() {
        1 => Ok(keys.remove(0)),
        _ => Err(StoreError::MissingPrimaryKey {
            table: table_schema.name.clone(),
        }),
    }
}

fn record_keys(table_schema: &TableSchema, entity: &dyn Entity) -> StoreResult<RecordKeys> {
    let mut keys = Vec::with_capacity(table_schema.indexes.len());
    for (name, index) in &table_schema.indexes {
        let produced = index.indexer.keys_from_entity(&table_schema.fields, entity)?;
        keys.push((name.clone(), produced));
    }
    Ok(keys)
}

fn full_key(unique: bool, key: &[u8], pk: &[u8]) -> Vec<u8> {
    if unique {
        key.to_vec()
    } else {
        let mut composite = Vec::with_capacity(key.len() + pk.len());
        composite.extend_from_slice(key);
        composite.extend_from_slice(pk);
        composite
    }
}

fn lookup_unique(table_state: &TableState, index: &str, key: &[u8]) -> Option<Record> {
    table_state.indexes.get(index)?.get(key).cloned()
}

fn index_tree<'a>(
    table_state: &'a TableState,
    table: &str,
    index: &str,
) -> StoreResult<&'a BTreeMap<Vec<u8>, Record>> {
    table_state
        .indexes
        .get(index)
        .ok_or_else(|| StoreError::UnknownIndex {
            table: table.to_string(),
            index: index.to_string(),
        })
}

fn prefix_scan<'a>(
    tree: &'a BTreeMap<Vec<u8>, Record>,
    prefix: &'a [u8],
) -> impl Iterator<Item = Record> + 'a {
    tree.range(prefix.to_vec()..)
        .take_while(move |(k, _)| k.starts_with(prefix))
        .map(|(_, record)| record.clone())
}

fn remove_entries(
    table_state: &mut TableState,
    table_schema: &TableSchema,
    keys: &RecordKeys,
    pk: &[u8],
) {
    for (index_name, index_keys) in keys {
        let unique = table_schema
            .indexes
            .get(index_name)
            .map(|i| i.unique)
            .unwrap_or(false);
        if let Some(tree) = table_state.indexes.get_mut(index_name) {
            for key in index_keys {
                tree.remove(&full_key(unique, key, pk));
            }
        }
    }
}

fn insert_entries(
    table_state: &mut TableState,
    table_schema: &TableSchema,
    keys: &RecordKeys,
    pk: &[u8],
    record: &Record,
) {
    for (index_name, index_keys) in keys {
        let unique = table_schema
            .indexes
            .get(index_name)
            .map(|i| i.unique)
            .unwrap_or(false);
        if let Some(tree) = table_state.indexes.get_mut(index_name) {
            for key in index_keys {
                tree.insert(full_key(unique, key, pk), record.clone());
            }
        }
    }
}
