//! Indexers: projections from entity fields to index keys.

use crate::entity::{Entity, FieldValue};
use crate::error::{StoreError, StoreResult};
use crate::fields::{FieldName, Fields};

/// The four supported indexer kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerKind {
    /// One key per record, taken from a plain string field.
    Plain,
    /// One key per element of a string collection field.
    PlainCollection,
    /// One key per record, projected from a composite value.
    Custom,
    /// One key per element of a collection of composite values.
    CustomCollection,
}

impl IndexerKind {
    /// Whether records produce a key per collection element.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::PlainCollection | Self::CustomCollection)
    }
}

/// Terminates an index key with a single null byte.
///
/// Every key handed to the store ends in `\0`, so no valid key is a prefix
/// of another and prefix scans over composite keys stay exact.
#[must_use]
pub fn terminate(mut key: Vec<u8>) -> Vec<u8> {
    key.push(0);
    key
}

/// A projection from an entity field (or a lookup argument) to index keys.
///
/// # Symmetry invariant
///
/// For any value `v`, [`Indexer::key_from_arg`] of `v` must equal the key
/// [`Indexer::keys_from_entity`] produces for a record whose indexed field
/// holds `v`. Point lookups are only correct under this symmetry.
pub trait Indexer: Send + Sync {
    /// The kind of this indexer.
    fn kind(&self) -> IndexerKind;

    /// The field this indexer reads.
    fn field(&self) -> FieldName;

    /// Extracts the index keys for a record.
    ///
    /// An empty result means the record is not indexed here (unset optional
    /// field, empty collection, or empty projections).
    fn keys_from_entity(&self, fields: &Fields, entity: &dyn Entity) -> StoreResult<Vec<Vec<u8>>>;

    /// Builds the lookup key for exactly one caller-supplied argument.
    fn key_from_arg(&self, args: &[FieldValue]) -> StoreResult<Vec<u8>>;
}

fn single_arg(args: &[FieldValue]) -> StoreResult<&FieldValue> {
    match args {
        [arg] => Ok(arg),
        _ => Err(StoreError::WrongArity { got: args.len() }),
    }
}

/// Indexes a plain string field.
#[derive(Debug, Clone)]
pub struct StringFieldIndex {
    field: FieldName,
}

impl StringFieldIndex {
    /// Creates an indexer over `field`.
    #[must_use]
    pub fn new(field: FieldName) -> Self {
        Self { field }
    }
}

impl Indexer for StringFieldIndex {
    fn kind(&self) -> IndexerKind {
        IndexerKind::Plain
    }

    fn field(&self) -> FieldName {
        self.field
    }

    fn keys_from_entity(&self, fields: &Fields, entity: &dyn Entity) -> StoreResult<Vec<Vec<u8>>> {
        let spec = fields.require(self.field)?;
        match (spec.get)(entity) {
            None => Ok(Vec::new()),
            Some(FieldValue::Str(s)) if s.is_empty() => Ok(Vec::new()),
            Some(FieldValue::Str(s)) => Ok(vec![terminate(s.into_bytes())]),
            Some(_) => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "string",
            }),
        }
    }

    fn key_from_arg(&self, args: &[FieldValue]) -> StoreResult<Vec<u8>> {
        match single_arg(args)? {
            FieldValue::Str(s) => Ok(terminate(s.clone().into_bytes())),
            _ => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "string",
            }),
        }
    }
}

/// Indexes each element of a string collection field.
#[derive(Debug, Clone)]
pub struct StringSliceFieldIndex {
    field: FieldName,
}

impl StringSliceFieldIndex {
    /// Creates an indexer over the collection field `field`.
    #[must_use]
    pub fn new(field: FieldName) -> Self {
        Self { field }
    }
}

impl Indexer for StringSliceFieldIndex {
    fn kind(&self) -> IndexerKind {
        IndexerKind::PlainCollection
    }

    fn field(&self) -> FieldName {
        self.field
    }

    fn keys_from_entity(&self, fields: &Fields, entity: &dyn Entity) -> StoreResult<Vec<Vec<u8>>> {
        let spec = fields.require(self.field)?;
        match (spec.get)(entity) {
            None => Ok(Vec::new()),
            Some(FieldValue::StrList(values)) => Ok(values
                .into_iter()
                .filter(|v| !v.is_empty())
                .map(|v| terminate(v.into_bytes()))
                .collect()),
            Some(_) => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "string collection",
            }),
        }
    }

    fn key_from_arg(&self, args: &[FieldValue]) -> StoreResult<Vec<u8>> {
        match single_arg(args)? {
            FieldValue::Str(s) => Ok(terminate(s.clone().into_bytes())),
            _ => Err(StoreError::WrongFieldType {
                field: self.field.to_string(),
                expected: "string",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{downcast, Entity};
    use std::any::Any;

    #[derive(Debug, Clone)]
    struct Tag {
        name: String,
        aliases: Vec<String>,
    }

    impl Entity for Tag {
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
        fn clone_entity(&self) -> Box<dyn Entity> {
            Box::new(self.clone())
        }
    }

    fn tag_fields() -> Fields {
        Fields::new()
            .field("name", |e: &dyn Entity| {
                downcast::<Tag>(e).map(|t| FieldValue::Str(t.name.clone()))
            })
            .field("aliases", |e: &dyn Entity| {
                downcast::<Tag>(e).map(|t| FieldValue::StrList(t.aliases.clone()))
            })
    }

    #[test]
    fn string_index_keys_are_null_terminated() {
        let tag = Tag {
            name: "alpha".into(),
            aliases: vec![],
        };
        let keys = StringFieldIndex::new("name")
            .keys_from_entity(&tag_fields(), &tag)
            .unwrap();
        assert_eq!(keys, vec![b"alpha\0".to_vec()]);
    }

    #[test]
    fn string_index_arg_matches_entity_key() {
        let tag = Tag {
            name: "alpha".into(),
            aliases: vec![],
        };
        let index = StringFieldIndex::new("name");
        let stored = index.keys_from_entity(&tag_fields(), &tag).unwrap();
        let looked_up = index.key_from_arg(&[FieldValue::str("alpha")]).unwrap();
        assert_eq!(stored[0], looked_up);
    }

    #[test]
    fn empty_string_is_not_indexed() {
        let tag = Tag {
            name: String::new(),
            aliases: vec![],
        };
        let keys = StringFieldIndex::new("name")
            .keys_from_entity(&tag_fields(), &tag)
            .unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn slice_index_skips_empty_elements() {
        let tag = Tag {
            name: "alpha".into(),
            aliases: vec!["a".into(), String::new(), "b".into()],
        };
        let keys = StringSliceFieldIndex::new("aliases")
            .keys_from_entity(&tag_fields(), &tag)
            .unwrap();
        assert_eq!(keys, vec![b"a\0".to_vec(), b"b\0".to_vec()]);
    }

    #[test]
    fn lookup_requires_exactly_one_argument() {
        let index = StringFieldIndex::new("name");
        let err = index.key_from_arg(&[]).unwrap_err();
        assert!(matches!(err, StoreError::WrongArity { got: 0 }));
        let err = index
            .key_from_arg(&[FieldValue::str("a"), FieldValue::str("b")])
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongArity { got: 2 }));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let tag = Tag {
            name: "alpha".into(),
            aliases: vec!["a".into()],
        };
        let err = StringFieldIndex::new("aliases")
            .keys_from_entity(&tag_fields(), &tag)
            .unwrap_err();
        assert!(matches!(err, StoreError::WrongFieldType { .. }));
    }
}
