//! # reldb core
//!
//! Referential integrity and cascading archival on top of
//! [`reldb_store`].
//!
//! A [`DBSchema`] declares, per table, three relation sets:
//!
//! - **mandatory foreign keys**: checked on insert, every declared
//!   reference must resolve to a live target;
//! - **cascade relations**: dependents that are deleted, archived, and
//!   restored together with their owner;
//! - **checking relations**: dependents that only block deletion or
//!   archival of their owner.
//!
//! Tables may additionally declare unique constraints, secondary indexes
//! whose values may have at most one live holder.
//!
//! Archival is a soft delete: records carry an [`ArchiveMark`]
//! (re-exported from the store) and every record archived in one
//! cascading call shares the same mark, so a later cascading restore
//! brings back exactly that set and nothing else.
//!
//! ```
//! # use reldb_core::*;
//! # use reldb_store::*;
//! # fn demo(schema: DBSchema) -> EngineResult<()> {
//! let db = Database::new(schema)?;
//! let txn = db.txn(TxnMode::Write);
//! // ... txn.insert / txn.cascade_archive / txn.first ...
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod error;
mod indexer;
mod schema;
mod txn;

pub use database::Database;
pub use error::{EngineError, EngineResult};
pub use indexer::{CustomTypeFieldIndex, CustomTypeSliceFieldIndex, Projection};
pub use schema::{DBSchema, DataType, IndexName, Relation, RelationKey, RelationMap, TargetArgBuilder};
pub use txn::Txn;

pub use reldb_store::{ArchiveMark, TxnMode};
