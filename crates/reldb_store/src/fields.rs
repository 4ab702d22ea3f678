//! Per-table field vtables.
//!
//! Instead of reflecting over struct fields at runtime, every table
//! registers an explicit accessor per field. Indexers and relation checks
//! resolve field names through this table.

use crate::entity::{Entity, FieldValue};
use crate::error::{StoreError, StoreResult};
use std::collections::HashMap;

/// A field name as registered in a table's vtable.
pub type FieldName = &'static str;

/// Reads a field from an entity.
///
/// Returns `None` when the field is optional and unset, or when the entity
/// is not of the type the accessor was written for.
pub type FieldGetter = fn(&dyn Entity) -> Option<FieldValue>;

/// Writes a field back into an entity.
///
/// Returns `false` when the entity or the value does not have the shape the
/// accessor expects.
pub type FieldSetter = fn(&mut dyn Entity, FieldValue) -> bool;

/// Accessors for a single field.
#[derive(Clone, Copy)]
pub struct FieldSpec {
    /// Reads the field value.
    pub get: FieldGetter,
    /// Writes the field value, when the field is mutable in place.
    pub set: Option<FieldSetter>,
}

/// The vtable mapping field names to accessors for one entity type.
#[derive(Clone, Default)]
pub struct Fields {
    specs: HashMap<FieldName, FieldSpec>,
}

impl Fields {
    /// Creates an empty vtable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a read-only field.
    #[must_use]
    pub fn field(mut self, name: FieldName, get: FieldGetter) -> Self {
        self.specs.insert(name, FieldSpec { get, set: None });
        self
    }

    /// Registers a field with both accessors.
    #[must_use]
    pub fn field_mut(mut self, name: FieldName, get: FieldGetter, set: FieldSetter) -> Self {
        self.specs.insert(name, FieldSpec { get, set: Some(set) });
        self
    }

    /// Looks up a field's accessors.
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.specs.get(name)
    }

    /// Looks up a field's accessors, failing when the field is unknown.
    pub fn require(&self, name: &str) -> StoreResult<&FieldSpec> {
        self.get(name).ok_or_else(|| StoreError::UnknownField {
            field: name.to_string(),
        })
    }

    /// Whether a field is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }
}

impl std::fmt::Debug for Fields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.specs.keys()).finish()
    }
}
