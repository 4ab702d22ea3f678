//! The relation schema: tables plus declared relations, validation, and
//! merging.

use crate::error::{EngineError, EngineResult};
use reldb_store::{validate_tables, FieldName, FieldValue, IndexerKind, StoreResult, TableSchema, PK};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// An entity type name (a table).
pub type DataType = String;

/// An index name.
pub type IndexName = String;

/// Converts an origin field value into the argument the target index
/// expects.
///
/// Required when the target index is a custom-type index (the raw field
/// value must be lifted into the composite value the index projects);
/// forbidden when the target index is a plain string index.
pub type TargetArgBuilder = Arc<dyn Fn(&FieldValue) -> StoreResult<FieldValue> + Send + Sync>;

/// A declared reference from one entity type's field to another entity
/// type's index.
#[derive(Clone)]
pub struct Relation {
    /// The referencing field on the owning entity type. May hold a
    /// collection; each element is checked independently.
    pub origin_field: FieldName,
    /// The referenced entity type.
    pub target_type: DataType,
    /// The index on the target type the reference resolves through.
    pub target_index: IndexName,
    build_target_arg: Option<TargetArgBuilder>,
    /// Whether the target index is collection-valued. Resolved by
    /// [`DBSchema::validate`].
    index_is_collection: bool,
}

impl Relation {
    /// Creates a relation.
    pub fn new(
        origin_field: FieldName,
        target_type: impl Into<DataType>,
        target_index: impl Into<IndexName>,
    ) -> Self {
        Self {
            origin_field,
            target_type: target_type.into(),
            target_index: target_index.into(),
            build_target_arg: None,
            index_is_collection: false,
        }
    }

    /// Attaches a target-argument builder for custom-type target indexes.
    #[must_use]
    pub fn with_target_arg(
        mut self,
        build: impl Fn(&FieldValue) -> StoreResult<FieldValue> + Send + Sync + 'static,
    ) -> Self {
        self.build_target_arg = Some(Arc::new(build));
        self
    }

    /// Whether this relation carries a target-argument builder.
    #[must_use]
    pub fn has_target_arg(&self) -> bool {
        self.build_target_arg.is_some()
    }

    /// Whether the target index is collection-valued. Meaningful only
    /// after the schema has been validated.
    #[must_use]
    pub fn is_collection_index(&self) -> bool {
        self.index_is_collection
    }

    /// Builds the lookup argument for one origin field value.
    pub fn build_arg(&self, value: &FieldValue) -> StoreResult<FieldValue> {
        match &self.build_target_arg {
            Some(build) => build(value),
            None => Ok(value.clone()),
        }
    }

    /// The identity of this relation, used for overlap checks.
    #[must_use]
    pub fn key(&self) -> RelationKey {
        RelationKey {
            origin_field: self.origin_field,
            target_type: self.target_type.clone(),
            target_index: self.target_index.clone(),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("origin_field", &self.origin_field)
            .field("target_type", &self.target_type)
            .field("target_index", &self.target_index)
            .field("has_target_arg", &self.build_target_arg.is_some())
            .finish()
    }
}

/// The `(origin field, target type, target index)` triple identifying a
/// relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationKey {
    /// The referencing field.
    pub origin_field: FieldName,
    /// The referenced entity type.
    pub target_type: DataType,
    /// The referenced index.
    pub target_index: IndexName,
}

/// Relations grouped by owning entity type.
pub type RelationMap = HashMap<DataType, Vec<Relation>>;

/// Table definitions plus the three named relation sets.
///
/// Built once at process start (optionally via [`DBSchema::merge`]),
/// validated, then treated as immutable.
#[derive(Debug, Clone, Default)]
pub struct DBSchema {
    /// Table definitions by entity type.
    pub tables: HashMap<DataType, TableSchema>,
    /// Checked on insert: every relation must resolve to a live (or
    /// transitionally allowed) target.
    pub mandatory_foreign_keys: RelationMap,
    /// Dependents deleted/archived/restored together with their owner.
    pub cascade_deletes: RelationMap,
    /// Dependents that only block deletion/archival of their owner.
    pub checking_relations: RelationMap,
    /// Secondary indexes whose values must be unique among live records
    /// of their table, checked on insert.
    pub unique_constraints: HashMap<DataType, Vec<IndexName>>,
}

impl DBSchema {
    /// Creates a schema over the given tables, without relations.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = TableSchema>) -> Self {
        Self {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
            ..Self::default()
        }
    }

    /// Adds mandatory foreign keys for `owner`.
    #[must_use]
    pub fn with_foreign_keys(mut self, owner: impl Into<DataType>, rels: Vec<Relation>) -> Self {
        self.mandatory_foreign_keys
            .entry(owner.into())
            .or_default()
            .extend(rels);
        self
    }

    /// Adds cascade relations for `owner`.
    #[must_use]
    pub fn with_cascade_deletes(mut self, owner: impl Into<DataType>, rels: Vec<Relation>) -> Self {
        self.cascade_deletes
            .entry(owner.into())
            .or_default()
            .extend(rels);
        self
    }

    /// Adds checking relations for `owner`.
    #[must_use]
    pub fn with_checking_relations(
        mut self,
        owner: impl Into<DataType>,
        rels: Vec<Relation>,
    ) -> Self {
        self.checking_relations
            .entry(owner.into())
            .or_default()
            .extend(rels);
        self
    }

    /// Declares unique constraints for `table`.
    ///
    /// Each named index must exist on the table; a duplicate value among
    /// records that are not archived rejects the insert. Records sharing
    /// the primary key of the inserted record do not count, so updates
    /// keep their own values.
    #[must_use]
    pub fn with_unique_constraints(
        mut self,
        table: impl Into<DataType>,
        indexes: Vec<IndexName>,
    ) -> Self {
        self.unique_constraints
            .entry(table.into())
            .or_default()
            .extend(indexes);
        self
    }

    /// Validates the schema and resolves relation metadata.
    ///
    /// Runs, in order: structural table validation; resolution and
    /// kind-checking of every relation in all three maps; the
    /// foreign-key primary-index rule; the cascade/checking overlap rule;
    /// acyclicity of the combined child-relation graph; acyclicity of the
    /// foreign-key graph. Fails with the first structural problem found;
    /// cycle failures carry the full path.
    pub fn validate(&mut self) -> EngineResult<()> {
        validate_tables(&self.tables)
            .map_err(|e| EngineError::invalid_schema(e.to_string()))?;

        resolve_relations(&self.tables, &mut self.mandatory_foreign_keys)?;
        resolve_relations(&self.tables, &mut self.cascade_deletes)?;
        resolve_relations(&self.tables, &mut self.checking_relations)?;

        for (owner, rels) in &self.mandatory_foreign_keys {
            for rel in rels {
                if rel.target_index != PK {
                    return Err(EngineError::invalid_schema(format!(
                        "foreign key {:?} of table {:?} must target the {:?} index",
                        rel, owner, PK
                    )));
                }
            }
        }

        for (table, indexes) in &self.unique_constraints {
            let table_schema = self.tables.get(table).ok_or_else(|| {
                EngineError::invalid_schema(format!(
                    "unique constraint on undefined table {:?}",
                    table
                ))
            })?;
            for index in indexes {
                if !table_schema.indexes.contains_key(index) {
                    return Err(EngineError::invalid_schema(format!(
                        "unique constraint on table {:?} names unknown index {:?}",
                        table, index
                    )));
                }
            }
        }

        let child_graph = combined_child_graph(
            &[&self.cascade_deletes, &self.checking_relations],
        )?;
        check_acyclic(&child_graph)?;

        let fk_graph = graph_of(&self.mandatory_foreign_keys);
        check_acyclic(&fk_graph)?;
        Ok(())
    }

    /// Merges several subsystem schemas into one and validates the result.
    ///
    /// Tables are unioned (a duplicate table name is a hard failure) and
    /// relation lists are concatenated per owning type. The merged schema
    /// is fully re-validated, so cycles only visible across subsystems are
    /// still caught.
    pub fn merge(schemas: impl IntoIterator<Item = DBSchema>) -> EngineResult<DBSchema> {
        let mut merged = DBSchema::default();
        for schema in schemas {
            for (name, table) in schema.tables {
                if merged.tables.contains_key(&name) {
                    return Err(EngineError::merge_schema(format!(
                        "table {:?} is already defined",
                        name
                    )));
                }
                merged.tables.insert(name, table);
            }
            merge_relations(&mut merged.mandatory_foreign_keys, schema.mandatory_foreign_keys);
            merge_relations(&mut merged.cascade_deletes, schema.cascade_deletes);
            merge_relations(&mut merged.checking_relations, schema.checking_relations);
            for (table, indexes) in schema.unique_constraints {
                merged
                    .unique_constraints
                    .entry(table)
                    .or_default()
                    .extend(indexes);
            }
        }
        merged
            .validate()
            .map_err(|e| EngineError::merge_schema(e.to_string()))?;
        Ok(merged)
    }

    /// Strips all relations and unique constraints, keeping only the
    /// tables.
    ///
    /// Replica consumers use this to load records exactly as shipped,
    /// without constraint checking.
    #[must_use]
    pub fn drop_relations(mut self) -> Self {
        self.mandatory_foreign_keys.clear();
        self.cascade_deletes.clear();
        self.checking_relations.clear();
        self.unique_constraints.clear();
        self
    }
}

fn merge_relations(into: &mut RelationMap, from: RelationMap) {
    for (owner, rels) in from {
        into.entry(owner).or_default().extend(rels);
    }
}

/// Resolves every relation's target index, checks kind compatibility, and
/// records whether the target index is collection-valued.
fn resolve_relations(
    tables: &HashMap<DataType, TableSchema>,
    relations: &mut RelationMap,
) -> EngineResult<()> {
    for (owner, rels) in relations.iter_mut() {
        if !tables.contains_key(owner) {
            return Err(EngineError::invalid_schema(format!(
                "table {:?} holds relations but is not defined",
                owner
            )));
        }
        for rel in rels.iter_mut() {
            let target = tables.get(&rel.target_type).ok_or_else(|| {
                EngineError::invalid_schema(format!(
                    "table {:?}, referenced by field {:?} of table {:?}, is not defined",
                    rel.target_type, rel.origin_field, owner
                ))
            })?;
            let index = target.indexes.get(&rel.target_index).ok_or_else(|| {
                EngineError::invalid_schema(format!(
                    "index {:?} not found at table {:?}, referenced by field {:?} of table {:?}",
                    rel.target_index, rel.target_type, rel.origin_field, owner
                ))
            })?;
            let kind = index.indexer.kind();
            rel.index_is_collection = kind.is_collection();
            let is_custom = matches!(kind, IndexerKind::Custom | IndexerKind::CustomCollection);
            if is_custom && rel.build_target_arg.is_none() {
                return Err(EngineError::invalid_schema(format!(
                    "relation {:?} of table {:?} targets a custom-type index and needs a \
                     target-argument builder",
                    rel, owner
                )));
            }
            if !is_custom && rel.build_target_arg.is_some() {
                return Err(EngineError::invalid_schema(format!(
                    "relation {:?} of table {:?} targets a plain index and must not carry a \
                     target-argument builder",
                    rel, owner
                )));
            }
        }
    }
    Ok(())
}

type Graph = HashMap<DataType, BTreeSet<DataType>>;

fn graph_of(relations: &RelationMap) -> Graph {
    let mut graph: Graph = HashMap::new();
    for (owner, rels) in relations {
        let targets = graph.entry(owner.clone()).or_default();
        for rel in rels {
            // Self-references are allowed; they do not form a cascade cycle.
            if rel.target_type != *owner {
                targets.insert(rel.target_type.clone());
            }
        }
    }
    graph
}

/// Builds the union graph of cascade and checking relations, rejecting a
/// relation triple that appears in more than one set for the same owner.
fn combined_child_graph(maps: &[&RelationMap]) -> EngineResult<Graph> {
    let mut seen: HashMap<DataType, BTreeSet<RelationKey>> = HashMap::new();
    let mut combined: RelationMap = HashMap::new();
    for map in maps {
        for (owner, rels) in *map {
            let owner_seen = seen.entry(owner.clone()).or_default();
            for rel in rels {
                if !owner_seen.insert(rel.key()) {
                    return Err(EngineError::invalid_schema(format!(
                        "relation {:?} is declared twice for table {:?}",
                        rel, owner
                    )));
                }
                combined
                    .entry(owner.clone())
                    .or_default()
                    .push(rel.clone());
            }
        }
    }
    Ok(graph_of(&combined))
}

impl std::cmp::Ord for RelationKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.origin_field, &self.target_type, &self.target_index).cmp(&(
            other.origin_field,
            &other.target_type,
            &other.target_index,
        ))
    }
}

impl std::cmp::PartialOrd for RelationKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Depth-first search from every type; a traversal that revisits its
/// origin fails with the full cycle path rendered `t1=>t2=>...=>t1`.
fn check_acyclic(graph: &Graph) -> EngineResult<()> {
    let mut starts: Vec<&DataType> = graph.keys().collect();
    starts.sort();
    for start in starts {
        let mut path = vec![start.clone()];
        if dfs_finds_origin(start, start, graph, &mut path) {
            path.push(start.clone());
            return Err(EngineError::invalid_schema(format!(
                "cyclic dependency: {}",
                path.join("=>")
            )));
        }
    }
    Ok(())
}

fn dfs_finds_origin(
    node: &DataType,
    origin: &DataType,
    graph: &Graph,
    path: &mut Vec<DataType>,
) -> bool {
    let Some(targets) = graph.get(node) else {
        return false;
    };
    for next in targets {
        if next == origin {
            return true;
        }
        if path.contains(next) {
            continue;
        }
        path.push(next.clone());
        if dfs_finds_origin(next, origin, graph, path) {
            return true;
        }
        path.pop();
    }
    false
}
