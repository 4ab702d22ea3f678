//! The guarded transaction: relation checks, cascades, and archival on top
//! of the plain store transaction.

use crate::error::{EngineError, EngineResult};
use crate::schema::{DBSchema, Relation, RelationMap};
use reldb_store::{
    ArchiveMark, Entity, FieldValue, Fields, Record, StoreError, StoreResult, PK,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// A transaction that enforces the relation schema.
///
/// Wraps a store transaction; every mutation first checks the relations
/// declared for the affected table. Reads pass straight through. A guarded
/// call is atomic up to its own boundary, but a cascade that fails midway
/// leaves earlier steps applied; the caller aborts the transaction to get
/// all-or-nothing behavior.
pub struct Txn<'s> {
    schema: Arc<DBSchema>,
    inner: reldb_store::Txn<'s>,
}

impl<'s> Txn<'s> {
    pub(crate) fn new(schema: Arc<DBSchema>, inner: reldb_store::Txn<'s>) -> Self {
        Self { schema, inner }
    }

    /// Inserts a record after checking every mandatory foreign key.
    ///
    /// All relations are checked and all violations collected before the
    /// combined error is returned.
    pub fn insert(&mut self, table: &str, entity: Box<dyn Entity>) -> EngineResult<()> {
        self.insert_with_transitional(table, entity, ArchiveMark::LIVE)
    }

    /// Inserts a record, additionally accepting archived foreign-key
    /// targets whose mark equals `allowed`.
    ///
    /// Used while a cascading restore is in flight: mid-restore, a
    /// dependent's target may still carry the mark of the operation being
    /// undone.
    pub fn insert_with_transitional(
        &mut self,
        table: &str,
        entity: Box<dyn Entity>,
        allowed: ArchiveMark,
    ) -> EngineResult<()> {
        self.check_foreign_keys(table, entity.as_ref(), allowed)?;
        self.check_unique_constraints(table, entity.as_ref())?;
        self.inner.insert(table, entity)?;
        Ok(())
    }

    /// Deletes a record; blocked while any dependent exists.
    pub fn delete(&mut self, table: &str, entity: &dyn Entity) -> EngineResult<()> {
        let violations = self.dependent_violations(table, entity, true, false)?;
        if !violations.is_empty() {
            return Err(EngineError::NotEmptyRelation { violations });
        }
        self.inner.delete(table, entity)?;
        Ok(())
    }

    /// Deletes a record together with its cascade dependents.
    ///
    /// Checking relations still block; cascade relations are walked one
    /// dependent at a time, re-fetching after every recursive delete so
    /// mutation during the walk is safe. Collection-valued target indexes
    /// are not cascaded over (see
    /// [`Txn::clean_children_slice_indexes`]).
    pub fn cascade_delete(&mut self, table: &str, entity: &dyn Entity) -> EngineResult<()> {
        let violations = self.dependent_violations(table, entity, false, false)?;
        if !violations.is_empty() {
            return Err(EngineError::NotEmptyRelation { violations });
        }
        debug!(table, "cascade delete");

        let schema = Arc::clone(&self.schema);
        if let Some(rels) = schema.cascade_deletes.get(table) {
            let fields = table_fields(&schema, table)?;
            for rel in rels {
                if rel.is_collection_index() {
                    continue;
                }
                for value in origin_values(fields, rel, entity)? {
                    let arg = rel.build_arg(&value)?;
                    loop {
                        let Some(child) =
                            self.inner
                                .first(&rel.target_type, &rel.target_index, &[arg.clone()])?
                        else {
                            break;
                        };
                        trace!(child_table = %rel.target_type, "cascading delete into dependent");
                        self.cascade_delete(&rel.target_type, child.as_ref())?;
                    }
                }
            }
        }
        self.inner.delete(table, entity)?;
        Ok(())
    }

    /// Archives a record under `mark`; blocked while any live dependent
    /// exists.
    ///
    /// A record that is already archived is left untouched. The table's
    /// entity type must be archivable.
    pub fn archive(
        &mut self,
        table: &str,
        entity: &dyn Entity,
        mark: ArchiveMark,
    ) -> EngineResult<()> {
        let current = entity
            .as_archivable()
            .ok_or_else(|| EngineError::not_archivable(table))?
            .archive_mark();
        if !current.is_live() {
            return Ok(());
        }
        let violations = self.dependent_violations(table, entity, true, true)?;
        if !violations.is_empty() {
            return Err(EngineError::NotEmptyRelation { violations });
        }
        let marked = marked_clone(table, entity, |a| a.archive(mark))?;
        self.insert_with_transitional(table, marked, mark)
    }

    /// Archives a record and every cascade dependent under the same `mark`.
    ///
    /// Live checking dependents still block. Dependents that are already
    /// archived keep their own mark; dependents without the archival
    /// capability fail the whole call.
    pub fn cascade_archive(
        &mut self,
        table: &str,
        entity: &dyn Entity,
        mark: ArchiveMark,
    ) -> EngineResult<()> {
        let current = entity
            .as_archivable()
            .ok_or_else(|| EngineError::not_archivable(table))?
            .archive_mark();
        if !current.is_live() {
            return Ok(());
        }
        let violations = self.dependent_violations(table, entity, false, true)?;
        if !violations.is_empty() {
            return Err(EngineError::NotEmptyRelation { violations });
        }
        debug!(table, "cascade archive");

        let marked = marked_clone(table, entity, |a| a.archive(mark))?;
        self.insert_with_transitional(table, marked, mark)?;

        let schema = Arc::clone(&self.schema);
        if let Some(rels) = schema.cascade_deletes.get(table) {
            let fields = table_fields(&schema, table)?;
            for rel in rels {
                if rel.is_collection_index() {
                    continue;
                }
                for value in origin_values(fields, rel, entity)? {
                    let arg = rel.build_arg(&value)?;
                    loop {
                        let children =
                            self.inner
                                .scan(&rel.target_type, &rel.target_index, &[arg.clone()])?;
                        let Some(child) = children.into_iter().find(is_live_record) else {
                            break;
                        };
                        if child.as_archivable().is_none() {
                            return Err(EngineError::not_archivable(rel.target_type.clone()));
                        }
                        trace!(child_table = %rel.target_type, "cascading archive into dependent");
                        self.cascade_archive(&rel.target_type, child.as_ref(), mark)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Restores an archived record.
    ///
    /// The reinsert is fully checked, so restoring a dependent whose
    /// target is still archived fails with a foreign-key violation. A
    /// record that is already live is left untouched.
    pub fn restore(&mut self, table: &str, entity: &dyn Entity) -> EngineResult<()> {
        let current = entity
            .as_archivable()
            .ok_or_else(|| EngineError::not_archivable(table))?
            .archive_mark();
        if current.is_live() {
            return Ok(());
        }
        let restored = marked_clone(table, entity, |a| a.restore())?;
        self.insert(table, restored)
    }

    /// Restores a record and exactly the dependents archived with it.
    ///
    /// The record's mark identifies one archiving operation; only
    /// dependents carrying that exact mark are restored. Dependents
    /// archived independently keep their own mark and stay archived. A
    /// live record restores nothing.
    pub fn cascade_restore(&mut self, table: &str, entity: &dyn Entity) -> EngineResult<()> {
        let captured = entity
            .as_archivable()
            .ok_or_else(|| EngineError::not_archivable(table))?
            .archive_mark();
        if captured.is_live() {
            return Ok(());
        }
        debug!(table, "cascade restore");

        let restored = marked_clone(table, entity, |a| a.restore())?;
        // Mid-cascade, a dependent's own target may still carry the mark
        // being undone; the captured mark is the allowance.
        self.insert_with_transitional(table, restored, captured)?;

        let schema = Arc::clone(&self.schema);
        if let Some(rels) = schema.cascade_deletes.get(table) {
            let fields = table_fields(&schema, table)?;
            for rel in rels {
                if rel.is_collection_index() {
                    continue;
                }
                for value in origin_values(fields, rel, entity)? {
                    let arg = rel.build_arg(&value)?;
                    loop {
                        let children =
                            self.inner
                                .scan(&rel.target_type, &rel.target_index, &[arg.clone()])?;
                        let Some(child) = children.into_iter().find(|c| {
                            c.as_archivable()
                                .is_some_and(|a| a.archive_mark() == captured)
                        }) else {
                            break;
                        };
                        trace!(child_table = %rel.target_type, "cascading restore into dependent");
                        self.cascade_restore(&rel.target_type, child.as_ref())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Removes this record's key from the collection fields of its
    /// dependents.
    ///
    /// Applies to cascade relations whose target index is
    /// collection-valued: each dependent's indexed collection drops the
    /// owner's key and the dependent is rewritten through the unchecked
    /// store path. Relations carrying a custom projection and collection
    /// fields without an in-place setter are usage errors.
    pub fn clean_children_slice_indexes(
        &mut self,
        table: &str,
        entity: &dyn Entity,
    ) -> EngineResult<()> {
        let schema = Arc::clone(&self.schema);
        let Some(rels) = schema.cascade_deletes.get(table) else {
            return Ok(());
        };
        let fields = table_fields(&schema, table)?;
        for rel in rels {
            if !rel.is_collection_index() {
                continue;
            }
            if rel.has_target_arg() {
                return Err(EngineError::precondition(format!(
                    "relation {:?} of table {:?}: cannot detach through a custom projection",
                    rel, table
                )));
            }
            let child_table = table_schema(&schema, &rel.target_type)?;
            let child_field = child_table.require_index(&rel.target_index)?.indexer.field();
            let child_spec = child_table.fields.require(child_field)?;
            let set = child_spec.set.ok_or_else(|| {
                EngineError::precondition(format!(
                    "field {:?} of table {:?} has no setter",
                    child_field, rel.target_type
                ))
            })?;

            for value in origin_values(fields, rel, entity)? {
                let FieldValue::Str(owner_key) = &value else {
                    return Err(EngineError::precondition(format!(
                        "field {:?} of table {:?} is not string-keyed",
                        rel.origin_field, table
                    )));
                };
                let children =
                    self.inner
                        .scan(&rel.target_type, &rel.target_index, &[value.clone()])?;
                for child in children {
                    let mut detached = child.clone_entity();
                    let remaining = match (child_spec.get)(detached.as_ref()) {
                        Some(FieldValue::StrList(list)) => {
                            list.into_iter().filter(|k| k != owner_key).collect()
                        }
                        _ => {
                            return Err(EngineError::precondition(format!(
                                "field {:?} of table {:?} is not a string collection",
                                child_field, rel.target_type
                            )))
                        }
                    };
                    if !set(detached.as_mut(), FieldValue::StrList(remaining)) {
                        return Err(EngineError::precondition(format!(
                            "field {:?} of table {:?} rejected the detached value",
                            child_field, rel.target_type
                        )));
                    }
                    self.inner.insert(&rel.target_type, detached)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the first record matching `args` on the given index.
    pub fn first(
        &self,
        table: &str,
        index: &str,
        args: &[FieldValue],
    ) -> StoreResult<Option<Record>> {
        self.inner.first(table, index, args)
    }

    /// Returns all records matching `args` on the given index.
    pub fn scan(&self, table: &str, index: &str, args: &[FieldValue]) -> StoreResult<Vec<Record>> {
        self.inner.scan(table, index, args)
    }

    /// Publishes this transaction's writes.
    pub fn commit(self) -> StoreResult<()> {
        self.inner.commit()
    }

    /// Discards this transaction's writes.
    pub fn abort(self) {
        self.inner.abort();
    }

    /// Checks every mandatory foreign key of `table` against `entity`,
    /// collecting all violations.
    fn check_foreign_keys(
        &self,
        table: &str,
        entity: &dyn Entity,
        allowed: ArchiveMark,
    ) -> EngineResult<()> {
        let schema = Arc::clone(&self.schema);
        let Some(rels) = schema.mandatory_foreign_keys.get(table) else {
            return Ok(());
        };
        let fields = table_fields(&schema, table)?;
        let mut violations = Vec::new();
        for rel in rels {
            for value in origin_values(fields, rel, entity)? {
                let arg = rel.build_arg(&value)?;
                match self
                    .inner
                    .first(&rel.target_type, &rel.target_index, &[arg])?
                {
                    None => violations.push(format!(
                        "field {:?} of table {:?}: no record in {:?}/{:?} matches {:?}",
                        rel.origin_field, table, rel.target_type, rel.target_index, value
                    )),
                    Some(target) => {
                        let archived_mark = target
                            .as_archivable()
                            .filter(|a| a.is_archived())
                            .map(|a| a.archive_mark());
                        if let Some(m) = archived_mark {
                            if allowed.is_live() || m != allowed {
                                violations.push(format!(
                                    "field {:?} of table {:?}: record in {:?}/{:?} matching {:?} \
                                     is archived",
                                    rel.origin_field,
                                    table,
                                    rel.target_type,
                                    rel.target_index,
                                    value
                                ));
                            }
                        }
                    }
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ForeignKey { violations })
        }
    }

    /// Checks the table's unique constraints against `entity`, collecting
    /// all violations.
    ///
    /// A value is taken when another record holds it on the constrained
    /// index and is not archived. Records sharing the inserted record's
    /// primary key never conflict, so in-place updates pass.
    fn check_unique_constraints(&self, table: &str, entity: &dyn Entity) -> EngineResult<()> {
        let schema = Arc::clone(&self.schema);
        let Some(indexes) = schema.unique_constraints.get(table) else {
            return Ok(());
        };
        let table_schema = table_schema(&schema, table)?;
        let pk = primary_key_of(table_schema, entity)?;
        let mut violations = Vec::new();
        for index in indexes {
            let field = table_schema.require_index(index)?.indexer.field();
            for value in field_values(&table_schema.fields, field, entity)? {
                let holders = self.inner.scan(table, index, &[value.clone()])?;
                for holder in holders {
                    if !is_live_record(&holder) {
                        continue;
                    }
                    if primary_key_of(table_schema, holder.as_ref())? == pk {
                        continue;
                    }
                    violations.push(format!(
                        "index {:?} of table {:?}: value {:?} is already taken",
                        index, table, value
                    ));
                    break;
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(EngineError::UniqueConstraint { violations })
        }
    }

    /// Collects the dependents that block an operation on `entity`.
    ///
    /// Checking relations always participate; cascade relations only when
    /// `include_cascade` (delete and plain archive). `live_only` relaxes
    /// the check to records that are not archived (archival guards).
    fn dependent_violations(
        &self,
        table: &str,
        entity: &dyn Entity,
        include_cascade: bool,
        live_only: bool,
    ) -> EngineResult<Vec<String>> {
        let schema = Arc::clone(&self.schema);
        let mut maps: Vec<&RelationMap> = vec![&schema.checking_relations];
        if include_cascade {
            maps.push(&schema.cascade_deletes);
        }
        let fields = table_fields(&schema, table)?;
        let mut violations = Vec::new();
        for map in maps {
            let Some(rels) = map.get(table) else { continue };
            for rel in rels {
                for value in origin_values(fields, rel, entity)? {
                    let arg = rel.build_arg(&value)?;
                    let blocked = if live_only {
                        self.inner
                            .scan(&rel.target_type, &rel.target_index, &[arg])?
                            .iter()
                            .any(is_live_record)
                    } else {
                        self.inner
                            .first(&rel.target_type, &rel.target_index, &[arg])?
                            .is_some()
                    };
                    if blocked {
                        violations.push(format!(
                            "table {:?} key {:?} has dependent records in {:?}/{:?}",
                            table, value, rel.target_type, rel.target_index
                        ));
                    }
                }
            }
        }
        Ok(violations)
    }
}

/// Whether a record counts as live: not archived, or lacking the archival
/// capability altogether.
fn is_live_record(record: &Record) -> bool {
    record.as_archivable().is_none_or(|a| !a.is_archived())
}

fn table_schema<'a>(
    schema: &'a DBSchema,
    table: &str,
) -> EngineResult<&'a reldb_store::TableSchema> {
    schema.tables.get(table).ok_or_else(|| {
        EngineError::Store(StoreError::UnknownTable {
            table: table.to_string(),
        })
    })
}

fn table_fields<'a>(schema: &'a DBSchema, table: &str) -> EngineResult<&'a Fields> {
    Ok(&table_schema(schema, table)?.fields)
}

/// Computes a record's primary index key.
fn primary_key_of(
    table_schema: &reldb_store::TableSchema,
    entity: &dyn Entity,
) -> EngineResult<Vec<u8>> {
    let primary = table_schema.require_index(PK)?;
    let mut keys = primary
        .indexer
        .keys_from_entity(&table_schema.fields, entity)?;
    match keys.len() {
        1 => Ok(keys.remove(0)),
        _ => Err(EngineError::Store(StoreError::MissingPrimaryKey {
            table: table_schema.name.clone(),
        })),
    }
}

/// Reads the origin field of a relation, flattening it to the list of
/// reference values to check.
fn origin_values(fields: &Fields, rel: &Relation, entity: &dyn Entity) -> EngineResult<Vec<FieldValue>> {
    field_values(fields, rel.origin_field, entity)
}

/// Reads a field and flattens it to its indexable values.
///
/// Unset fields and empty strings carry no value and yield nothing;
/// collections contribute one value per non-empty element.
fn field_values(fields: &Fields, field: &str, entity: &dyn Entity) -> EngineResult<Vec<FieldValue>> {
    let spec = fields.require(field)?;
    let values = match (spec.get)(entity) {
        None => Vec::new(),
        Some(FieldValue::Str(s)) => {
            if s.is_empty() {
                Vec::new()
            } else {
                vec![FieldValue::Str(s)]
            }
        }
        Some(FieldValue::StrList(list)) => list
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(FieldValue::Str)
            .collect(),
        Some(FieldValue::Custom(v)) => vec![FieldValue::Custom(v)],
        Some(FieldValue::CustomList(vs)) => vs.into_iter().map(FieldValue::Custom).collect(),
    };
    Ok(values)
}

/// Clones an entity and applies an archival mutation to the clone.
fn marked_clone(
    table: &str,
    entity: &dyn Entity,
    mutate: impl FnOnce(&mut dyn reldb_store::Archivable),
) -> EngineResult<Box<dyn Entity>> {
    let mut clone = entity.clone_entity();
    match clone.as_archivable_mut() {
        Some(archivable) => mutate(archivable),
        None => return Err(EngineError::not_archivable(table)),
    }
    Ok(clone)
}
