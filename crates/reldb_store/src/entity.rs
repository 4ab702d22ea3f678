//! The entity model: stored records, reflected field values, and the
//! archival capability.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A record stored in a table.
///
/// Entities are held behind `dyn Entity` so tables of different concrete
/// types share one store. Field access goes through the per-table
/// [`Fields`](crate::Fields) vtable rather than runtime reflection.
pub trait Entity: fmt::Debug + Send + Sync + 'static {
    /// Upcasts to [`Any`] for downcasting in field accessors.
    fn as_any(&self) -> &dyn Any;

    /// Mutable counterpart of [`Entity::as_any`].
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Clones the entity into a fresh box.
    fn clone_entity(&self) -> Box<dyn Entity>;

    /// Returns the archival capability, if this type carries one.
    ///
    /// Types that can be soft-deleted override this (and
    /// [`Entity::as_archivable_mut`]) to return `Some(self)`.
    fn as_archivable(&self) -> Option<&dyn Archivable> {
        None
    }

    /// Mutable counterpart of [`Entity::as_archivable`].
    fn as_archivable_mut(&mut self) -> Option<&mut dyn Archivable> {
        None
    }
}

/// A shared, immutable record handle as returned by lookups.
pub type Record = Arc<dyn Entity>;

/// Downcasts a record to its concrete type.
pub fn downcast<T: Entity>(entity: &dyn Entity) -> Option<&T> {
    entity.as_any().downcast_ref::<T>()
}

/// Mutable counterpart of [`downcast`].
pub fn downcast_mut<T: Entity>(entity: &mut dyn Entity) -> Option<&mut T> {
    entity.as_any_mut().downcast_mut::<T>()
}

/// A soft-delete mark: the timestamp and provenance hash of one archiving
/// operation.
///
/// `(0, 0)` is the sentinel for "live". Any other value is an opaque token
/// shared by every record archived together in one cascading call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ArchiveMark {
    /// Unix timestamp of the archiving operation.
    pub timestamp: i64,
    /// Random hash identifying the archiving operation.
    pub hash: i64,
}

impl ArchiveMark {
    /// The live sentinel, `(0, 0)`.
    pub const LIVE: ArchiveMark = ArchiveMark {
        timestamp: 0,
        hash: 0,
    };

    /// Creates a fresh mark for a new archiving operation.
    #[must_use]
    pub fn new() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(1);
        Self {
            timestamp,
            hash: rand::random(),
        }
    }

    /// Whether this mark is the live sentinel.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.timestamp == 0 && self.hash == 0
    }
}

/// The soft-delete capability.
///
/// Implementors usually embed an [`ArchiveMark`] field and forward to it.
pub trait Archivable {
    /// Marks the entity as archived under `mark`.
    fn archive(&mut self, mark: ArchiveMark);

    /// Clears the mark, making the entity live again.
    fn restore(&mut self);

    /// Returns the current mark.
    fn archive_mark(&self) -> ArchiveMark;

    /// Whether the entity is currently archived.
    fn is_archived(&self) -> bool {
        !self.archive_mark().is_live()
    }
}

/// A composite value indexed through a custom projection.
///
/// Blanket-implemented for any `'static` type, so domain value types need no
/// extra impl to participate in custom-type indexes.
pub trait CustomValue: fmt::Debug + Send + Sync + 'static {
    /// Upcasts to [`Any`] for downcasting in projection functions.
    fn as_any(&self) -> &dyn Any;
}

impl<T: fmt::Debug + Send + Sync + 'static> CustomValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The reflected value of one entity field, as produced by a field getter
/// and consumed by indexers and relation checks.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// A plain string value (identifiers, foreign keys).
    Str(String),
    /// A collection of plain strings; each element is indexed independently.
    StrList(Vec<String>),
    /// A composite value keyed through a custom projection.
    Custom(Arc<dyn CustomValue>),
    /// A collection of composite values.
    CustomList(Vec<Arc<dyn CustomValue>>),
}

impl FieldValue {
    /// Wraps a string.
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Wraps a composite value.
    pub fn custom<T: CustomValue>(value: T) -> Self {
        Self::Custom(Arc::new(value))
    }

    /// Wraps a collection of composite values.
    pub fn custom_list<T: CustomValue>(values: Vec<T>) -> Self {
        Self::CustomList(
            values
                .into_iter()
                .map(|v| Arc::new(v) as Arc<dyn CustomValue>)
                .collect(),
        )
    }
}
