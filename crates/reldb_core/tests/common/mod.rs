//! Shared fixture schema for the integration tests.
//!
//! A small family tree of tables:
//!
//! - `parent`: the root type, with a unique `label`;
//! - `child1`: a checking dependent (blocks parent deletion/archival);
//! - `child2`: a cascade dependent, itself cascading into `grandchild`;
//! - `child3`: holds several parent keys in a collection field;
//! - `tag`: an unrelated, non-archivable type with a unique `name`.

#![allow(dead_code)]

use reldb_core::{DBSchema, Database, Relation, Txn};
use reldb_store::{
    downcast, downcast_mut, Archivable, ArchiveMark, Entity, FieldValue, Fields, IndexSchema,
    StringFieldIndex, StringSliceFieldIndex, TableSchema, PK,
};
use std::any::Any;
use uuid::Uuid;

/// A fresh random identifier.
pub fn uid() -> String {
    Uuid::new_v4().to_string()
}

macro_rules! archivable_entity {
    ($ty:ident) => {
        impl Entity for $ty {
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
            fn clone_entity(&self) -> Box<dyn Entity> {
                Box::new(self.clone())
            }
            fn as_archivable(&self) -> Option<&dyn Archivable> {
                Some(self)
            }
            fn as_archivable_mut(&mut self) -> Option<&mut dyn Archivable> {
                Some(self)
            }
        }

        impl Archivable for $ty {
            fn archive(&mut self, mark: ArchiveMark) {
                self.mark = mark;
            }
            fn restore(&mut self) {
                self.mark = ArchiveMark::LIVE;
            }
            fn archive_mark(&self) -> ArchiveMark {
                self.mark
            }
        }
    };
}

#[derive(Debug, Clone)]
pub struct Parent {
    pub id: String,
    pub label: String,
    pub mark: ArchiveMark,
}

#[derive(Debug, Clone)]
pub struct Child1 {
    pub id: String,
    pub parent_id: String,
    pub mark: ArchiveMark,
}

#[derive(Debug, Clone)]
pub struct Child2 {
    pub id: String,
    pub parent_id: String,
    pub mark: ArchiveMark,
}

#[derive(Debug, Clone)]
pub struct GrandChild {
    pub id: String,
    pub child_id: String,
    pub mark: ArchiveMark,
}

#[derive(Debug, Clone)]
pub struct Child3 {
    pub id: String,
    pub parents: Vec<String>,
    pub mark: ArchiveMark,
}

archivable_entity!(Parent);
archivable_entity!(Child1);
archivable_entity!(Child2);
archivable_entity!(GrandChild);
archivable_entity!(Child3);

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: String,
    pub name: String,
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

pub fn parent(id: &str) -> Box<dyn Entity> {
    Box::new(Parent {
        id: id.into(),
        label: format!("parent {id}"),
        mark: ArchiveMark::LIVE,
    })
}

pub fn child1(id: &str, parent_id: &str) -> Box<dyn Entity> {
    Box::new(Child1 {
        id: id.into(),
        parent_id: parent_id.into(),
        mark: ArchiveMark::LIVE,
    })
}

pub fn child2(id: &str, parent_id: &str) -> Box<dyn Entity> {
    Box::new(Child2 {
        id: id.into(),
        parent_id: parent_id.into(),
        mark: ArchiveMark::LIVE,
    })
}

pub fn grandchild(id: &str, child_id: &str) -> Box<dyn Entity> {
    Box::new(GrandChild {
        id: id.into(),
        child_id: child_id.into(),
        mark: ArchiveMark::LIVE,
    })
}

pub fn child3(id: &str, parents: &[&str]) -> Box<dyn Entity> {
    Box::new(Child3 {
        id: id.into(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        mark: ArchiveMark::LIVE,
    })
}

pub fn tag(id: &str) -> Box<dyn Entity> {
    Box::new(Tag {
        id: id.into(),
        name: format!("tag {id}"),
    })
}

fn parent_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<Parent>(e).map(|p| FieldValue::Str(p.id.clone()))
        })
        .field("label", |e: &dyn Entity| {
            downcast::<Parent>(e).map(|p| FieldValue::Str(p.label.clone()))
        });
    TableSchema::new("parent", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("label", StringFieldIndex::new("label")))
}

fn child1_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<Child1>(e).map(|c| FieldValue::Str(c.id.clone()))
        })
        .field("parent_id", |e: &dyn Entity| {
            downcast::<Child1>(e).map(|c| FieldValue::Str(c.parent_id.clone()))
        });
    TableSchema::new("child1", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("parent_id", StringFieldIndex::new("parent_id")))
}

fn child2_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<Child2>(e).map(|c| FieldValue::Str(c.id.clone()))
        })
        .field("parent_id", |e: &dyn Entity| {
            downcast::<Child2>(e).map(|c| FieldValue::Str(c.parent_id.clone()))
        });
    TableSchema::new("child2", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("parent_id", StringFieldIndex::new("parent_id")))
}

fn grandchild_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<GrandChild>(e).map(|g| FieldValue::Str(g.id.clone()))
        })
        .field("child_id", |e: &dyn Entity| {
            downcast::<GrandChild>(e).map(|g| FieldValue::Str(g.child_id.clone()))
        });
    TableSchema::new("grandchild", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("child_id", StringFieldIndex::new("child_id")))
}

fn child3_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<Child3>(e).map(|c| FieldValue::Str(c.id.clone()))
        })
        .field_mut(
            "parents",
            |e: &dyn Entity| downcast::<Child3>(e).map(|c| FieldValue::StrList(c.parents.clone())),
            |e: &mut dyn Entity, value| match (downcast_mut::<Child3>(e), value) {
                (Some(c), FieldValue::StrList(parents)) => {
                    c.parents = parents;
                    true
                }
                _ => false,
            },
        );
    TableSchema::new("child3", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("parents", StringSliceFieldIndex::new("parents")))
}

fn tag_table() -> TableSchema {
    let fields = Fields::new()
        .field("id", |e: &dyn Entity| {
            downcast::<Tag>(e).map(|t| FieldValue::Str(t.id.clone()))
        })
        .field("name", |e: &dyn Entity| {
            downcast::<Tag>(e).map(|t| FieldValue::Str(t.name.clone()))
        });
    TableSchema::new("tag", fields)
        .index(IndexSchema::new(PK, StringFieldIndex::new("id")).unique())
        .index(IndexSchema::new("name", StringFieldIndex::new("name")))
}

/// The fixture schema with all three relation sets populated.
pub fn schema() -> DBSchema {
    DBSchema::new([
        parent_table(),
        child1_table(),
        child2_table(),
        grandchild_table(),
        child3_table(),
        tag_table(),
    ])
    .with_foreign_keys("child1", vec![Relation::new("parent_id", "parent", PK)])
    .with_foreign_keys("child2", vec![Relation::new("parent_id", "parent", PK)])
    .with_foreign_keys("grandchild", vec![Relation::new("child_id", "child2", PK)])
    .with_foreign_keys("child3", vec![Relation::new("parents", "parent", PK)])
    .with_cascade_deletes(
        "parent",
        vec![
            Relation::new("id", "child2", "parent_id"),
            Relation::new("id", "child3", "parents"),
        ],
    )
    .with_cascade_deletes("child2", vec![Relation::new("id", "grandchild", "child_id")])
    .with_checking_relations("parent", vec![Relation::new("id", "child1", "parent_id")])
    .with_unique_constraints("parent", vec!["label".into()])
    .with_unique_constraints("tag", vec!["name".into()])
}

pub fn database() -> Database {
    Database::new(schema()).unwrap()
}

/// Fetches a record by primary key and downcasts it to its concrete type.
pub fn fetch<T: Entity + Clone>(txn: &Txn<'_>, table: &str, id: &str) -> Option<T> {
    txn.first(table, PK, &[FieldValue::str(id)])
        .unwrap()
        .map(|r| downcast::<T>(r.as_ref()).unwrap().clone())
}
