//! The database handle: a validated relation schema over an owned store.

use crate::error::EngineResult;
use crate::schema::DBSchema;
use crate::txn::Txn;
use reldb_store::{Store, StoreSchema, TxnMode};
use std::sync::Arc;

/// An embedded database with relation enforcement.
///
/// Owns the underlying store and the validated [`DBSchema`]. The schema is
/// immutable after construction; all reads and writes go through
/// [`Database::txn`].
pub struct Database {
    schema: Arc<DBSchema>,
    store: Store,
}

impl Database {
    /// Validates `schema` and opens an empty database over it.
    pub fn new(mut schema: DBSchema) -> EngineResult<Self> {
        schema.validate()?;
        let store = Store::new(StoreSchema::new(schema.tables.values().cloned()))?;
        Ok(Self {
            schema: Arc::new(schema),
            store,
        })
    }

    /// Returns the validated schema.
    #[must_use]
    pub fn schema(&self) -> &DBSchema {
        &self.schema
    }

    /// Opens a guarded transaction.
    pub fn txn(&self, mode: TxnMode) -> Txn<'_> {
        Txn::new(Arc::clone(&self.schema), self.store.txn(mode))
    }
}
