//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the indexed store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A mutating operation was attempted on a read transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The named table is not part of the schema.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Name of the missing table.
        table: String,
    },

    /// The named index does not exist on the table.
    #[error("unknown index {index} on table {table}")]
    UnknownIndex {
        /// Table that was searched.
        table: String,
        /// Name of the missing index.
        index: String,
    },

    /// The named field is not registered in the table's field set.
    #[error("unknown field: {field}")]
    UnknownField {
        /// Name of the missing field.
        field: String,
    },

    /// A field held a value of a shape the indexer cannot use.
    #[error("field {field} has the wrong shape: expected {expected}")]
    WrongFieldType {
        /// Name of the offending field.
        field: String,
        /// The shape the indexer expected.
        expected: &'static str,
    },

    /// A lookup was given the wrong number of arguments.
    #[error("lookup takes exactly one argument, got {got}")]
    WrongArity {
        /// Number of arguments supplied.
        got: usize,
    },

    /// An inserted record produced no primary key.
    #[error("record for table {table} has no primary key")]
    MissingPrimaryKey {
        /// Table the record was destined for.
        table: String,
    },

    /// The record to delete is not present.
    #[error("record not found in table {table}")]
    NotFound {
        /// Table that was searched.
        table: String,
    },

    /// A custom-type projection failed.
    #[error("projection failed: {message}")]
    Projection {
        /// Description supplied by the projection function.
        message: String,
    },

    /// The table definitions are structurally invalid.
    #[error("invalid store schema: {message}")]
    Schema {
        /// Description of the structural problem.
        message: String,
    },
}

impl StoreError {
    /// Creates a projection error.
    pub fn projection(message: impl Into<String>) -> Self {
        Self::Projection {
            message: message.into(),
        }
    }

    /// Creates a store schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }
}
