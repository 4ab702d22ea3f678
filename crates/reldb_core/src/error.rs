//! Error types for the relation engine.

use reldb_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the relation engine.
///
/// Constraint violations (`ForeignKey`, `NotEmptyRelation`,
/// `UniqueConstraint`) are aggregated:
/// every relation is checked and every violation recorded before the
/// combined error is returned. Structural and usage errors fail fast.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// One or more mandatory foreign keys were unsatisfied on insert.
    #[error("foreign key violation: {}", violations.join("; "))]
    ForeignKey {
        /// Every violated relation, one message each.
        violations: Vec<String>,
    },

    /// A delete or archive was blocked by existing dependents.
    #[error("relation not empty: {}", violations.join("; "))]
    NotEmptyRelation {
        /// Every non-empty relation, one message each.
        violations: Vec<String>,
    },

    /// An insert would duplicate a value under a unique constraint.
    #[error("unique constraint violated: {}", violations.join("; "))]
    UniqueConstraint {
        /// Every taken value, one message each.
        violations: Vec<String>,
    },

    /// An archive or restore was attempted on a non-archivable type.
    #[error("records of table {table} are not archivable")]
    NotArchivable {
        /// Table whose entity type lacks the capability.
        table: String,
    },

    /// The schema failed validation.
    #[error("invalid schema: {message}")]
    InvalidSchema {
        /// The structural or cyclic cause.
        message: String,
    },

    /// A schema merge failed.
    #[error("schema merge failed: {message}")]
    MergeSchema {
        /// Name collision or post-merge validation failure.
        message: String,
    },

    /// An operation was given a value it cannot work on.
    #[error("precondition violated: {message}")]
    Precondition {
        /// Description of the unmet precondition.
        message: String,
    },
}

impl EngineError {
    /// Creates an invalid-schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a merge error.
    pub fn merge_schema(message: impl Into<String>) -> Self {
        Self::MergeSchema {
            message: message.into(),
        }
    }

    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates a not-archivable error.
    pub fn not_archivable(table: impl Into<String>) -> Self {
        Self::NotArchivable {
            table: table.into(),
        }
    }
}
