//! # reldb store
//!
//! A transactional, indexed, in-memory entity store.
//!
//! This crate provides the lowest layer of reldb: tables defined as a
//! primary index plus secondary indexes, explicit per-table field vtables
//! (no runtime reflection), and snapshot-isolated transactions with
//! read-your-writes.
//!
//! The store only sees plain insert/delete/lookup calls. Referential
//! integrity, cascading deletes, and archival live one layer up, in
//! `reldb_core`.
//!
//! ## Isolation contract
//!
//! - one writer transaction at a time, any number of snapshot readers;
//! - a write transaction's mutations are invisible to every other open
//!   transaction and fully visible to its own later operations;
//! - commit publishes the whole working state atomically.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod fields;
mod index;
mod schema;
mod store;
mod txn;

pub use entity::{
    downcast, downcast_mut, Archivable, ArchiveMark, CustomValue, Entity, FieldValue, Record,
};
pub use error::{StoreError, StoreResult};
pub use fields::{FieldGetter, FieldName, FieldSetter, FieldSpec, Fields};
pub use index::{terminate, Indexer, IndexerKind, StringFieldIndex, StringSliceFieldIndex};
pub use schema::{validate_tables, IndexSchema, StoreSchema, TableSchema, PK};
pub use store::{Store, TxnMode};
pub use txn::Txn;
