//! Custom-type indexers.
//!
//! These project a composite field value into the byte key a target index
//! stores, through a caller-supplied projection function. They are used
//! both when writing a record into an index and when building a lookup
//! key, so the two sides always agree on the encoding.

use reldb_store::{
    terminate, CustomValue, Entity, FieldName, FieldValue, Fields, Indexer, IndexerKind,
    StoreError, StoreResult,
};
use std::sync::Arc;

/// Converts a composite value into index key bytes.
///
/// An empty result means "not indexed under this value". Errors propagate
/// verbatim to the caller of the indexing operation.
pub type Projection = Arc<dyn Fn(&dyn CustomValue) -> StoreResult<Vec<u8>> + Send + Sync>;

/// Indexes a composite field through a projection.
#[derive(Clone)]
pub struct CustomTypeFieldIndex {
    field: FieldName,
    project: Projection,
}

impl CustomTypeFieldIndex {
    /// Creates an indexer over `field` with the given projection.
    pub fn new(
        field: FieldName,
        project: impl Fn(&dyn CustomValue) -> StoreResult<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            field,
            project: Arc::new(project),
        }
    }
}

impl Indexer for CustomTypeFieldIndex {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Custom
    }

    fn field(&self) -> FieldName {
        self.field
    }

    fn keys_from_entity(&self, fields: &Fields, entity: &dyn Entity) -> StoreResult<Vec<Vec<u8>>> {
        let spec = fields.require(self.field)?;
        match (spec.get)(entity) {
            None => Ok(Vec::new()),
            Some(FieldValue::Custom(value)) => {
                let key = (self.project)(value.as_ref())?;
                if key.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![terminate(key)])
                }
            }
            Some(_) => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "custom value",
            }),
        }
    }

    fn key_from_arg(&self, args: &[FieldValue]) -> StoreResult<Vec<u8>> {
        match args {
            [FieldValue::Custom(value)] => Ok(terminate((self.project)(value.as_ref())?)),
            [_] => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "custom value",
            }),
            _ => Err(StoreError::WrongArity { got: args.len() }),
        }
    }
}

/// Indexes each element of a collection of composite values.
#[derive(Clone)]
pub struct CustomTypeSliceFieldIndex {
    field: FieldName,
    project: Projection,
}

impl CustomTypeSliceFieldIndex {
    /// Creates an indexer over the collection field `field`.
    pub fn new(
        field: FieldName,
        project: impl Fn(&dyn CustomValue) -> StoreResult<Vec<u8>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            field,
            project: Arc::new(project),
        }
    }
}

impl Indexer for CustomTypeSliceFieldIndex {
    fn kind(&self) -> IndexerKind {
        IndexerKind::CustomCollection
    }

    fn field(&self) -> FieldName {
        self.field
    }

    fn keys_from_entity(&self, fields: &Fields, entity: &dyn Entity) -> StoreResult<Vec<Vec<u8>>> {
        let spec = fields.require(self.field)?;
        match (spec.get)(entity) {
            None => Ok(Vec::new()),
            Some(FieldValue::CustomList(values)) => {
                let mut keys = Vec::with_capacity(values.len());
                for value in &values {
                    let key = (self.project)(value.as_ref())?;
                    // An element projecting to nothing is simply not
                    // indexed under this value.
                    if !key.is_empty() {
                        keys.push(terminate(key));
                    }
                }
                Ok(keys)
            }
            Some(_) => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "collection of custom values",
            }),
        }
    }

    fn key_from_arg(&self, args: &[FieldValue]) -> StoreResult<Vec<u8>> {
        match args {
            [FieldValue::Custom(value)] => Ok(terminate((self.project)(value.as_ref())?)),
            [_] => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "custom value",
            }),
            _ => Err(StoreError::WrongArity { got: args.len() }),
        }
    }
}
