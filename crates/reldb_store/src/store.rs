//! The store: shared state, snapshots, and transaction opening.

use crate::entity::Record;
use crate::error::StoreResult;
use crate::schema::StoreSchema;
use crate::txn::{Txn, TxnInner};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnMode {
    /// Snapshot reader; mutations are rejected.
    Read,
    /// Exclusive writer; at most one is open at a time.
    Write,
}

/// All index trees of one table.
#[derive(Debug, Clone, Default)]
pub(crate) struct TableState {
    /// Index name to ordered key space. Non-unique indexes suffix the
    /// record's primary key to the index key.
    pub(crate) indexes: HashMap<String, BTreeMap<Vec<u8>, Record>>,
}

/// The full committed (or in-flight) contents of a store.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: HashMap<String, TableState>,
}

impl StoreState {
    fn empty(schema: &StoreSchema) -> Self {
        let mut tables = HashMap::new();
        for (name, table) in &schema.tables {
            let indexes = table
                .indexes
                .keys()
                .map(|index| (index.clone(), BTreeMap::new()))
                .collect();
            tables.insert(name.clone(), TableState { indexes });
        }
        Self { tables }
    }
}

/// A transactional indexed entity store.
///
/// The store itself only sees plain insert/delete/lookup calls; it has no
/// knowledge of relations. Concurrency follows a copy-on-write model: a
/// write transaction works on a private copy of the state and publishes it
/// atomically at commit, so concurrently open readers keep their snapshot.
pub struct Store {
    schema: Arc<StoreSchema>,
    state: RwLock<Arc<StoreState>>,
    writer: Mutex<()>,
}

impl Store {
    /// Opens an empty store over validated table definitions.
    pub fn new(schema: StoreSchema) -> StoreResult<Self> {
        schema.validate()?;
        let state = StoreState::empty(&schema);
        Ok(Self {
            schema: Arc::new(schema),
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        })
    }

    /// Returns the table definitions.
    #[must_use]
    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    /// Opens a transaction.
    ///
    /// A write transaction blocks until it is the only writer; readers are
    /// never blocked and observe the last committed snapshot.
    pub fn txn(&self, mode: TxnMode) -> Txn<'_> {
        let inner = match mode {
            TxnMode::Read => TxnInner::Read(self.state.read().clone()),
            TxnMode::Write => {
                let guard = self.writer.lock();
                // Snapshot taken after the writer lock, so this txn sees
                // every previously committed write.
                let working = (**self.state.read()).clone();
                TxnInner::Write {
                    working,
                    _guard: guard,
                }
            }
        };
        Txn::new(&self.schema, &self.state, inner)
    }
}
