//! Schema registration
//!
//! Registering an entity type makes sure its table exists with exactly the
//! persistable columns of the type and that the stored schema version equals
//! the declared one. A version mismatch is handed to the configured
//! [`MismatchDelegate`]; until it is resolved the type stays unregistered and
//! every CRUD call on it fails.

use std::any::TypeId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::entity::{Entity, Field, FieldKind};
use crate::reflect::{quote, EntitySchema};
use crate::storage::SqliteStore;
use crate::{Error, Result};

/// What the delegate sees about a mismatched table
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub table: &'static str,
    /// Rust type name of the entity
    pub type_name: &'static str,
    /// Persistable fields the type declares
    pub columns: Vec<Field>,
    /// Columns the stored table currently has
    pub stored_columns: Vec<String>,
}

impl EntityInfo {
    /// Declared fields with no column in the stored table
    pub fn missing_columns(&self) -> Vec<&Field> {
        self.columns
            .iter()
            .filter(|f| !self.stored_columns.iter().any(|c| c == f.name))
            .collect()
    }

    /// Stored columns the type no longer declares
    pub fn extra_columns(&self) -> Vec<&str> {
        self.stored_columns
            .iter()
            .filter(|c| !self.columns.iter().any(|f| f.name == c.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// `ALTER TABLE` statements that bring the stored columns in line with the
    /// declared ones. Added non-null columns get a zero default.
    pub fn reconcile_statements(&self) -> Vec<String> {
        let table = quote(self.table);
        let mut statements: Vec<String> = self
            .missing_columns()
            .into_iter()
            .map(|field| {
                let sql_type = field.kind.sql_type().unwrap_or("BLOB");
                if field.nullable {
                    format!("ALTER TABLE {} ADD COLUMN {} {}", table, quote(field.name), sql_type)
                } else {
                    format!(
                        "ALTER TABLE {} ADD COLUMN {} {} NOT NULL DEFAULT {}",
                        table,
                        quote(field.name),
                        sql_type,
                        zero_default(field.kind)
                    )
                }
            })
            .collect();
        statements.extend(
            self.extra_columns()
                .into_iter()
                .map(|c| format!("ALTER TABLE {} DROP COLUMN {}", table, quote(c))),
        );
        statements
    }
}

fn zero_default(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "0",
        FieldKind::Real => "0.0",
        FieldKind::Text => "''",
        FieldKind::Blob | FieldKind::Unmapped => "x''",
    }
}

/// How to proceed after a schema version mismatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Run these statements, then record the declared version
    Execute(Vec<String>),
    /// Record the declared version without changing the table
    Accept,
    /// Leave the store untouched and fail registration
    Abort(String),
}

/// Decides what to do when a stored schema version differs from the
/// declared one. Called synchronously during registration.
pub trait MismatchDelegate: Send {
    fn resolve_mismatch(&self, entity: &EntityInfo, stored: u32, declared: u32) -> Resolution;
}

impl<F> MismatchDelegate for F
where
    F: Fn(&EntityInfo, u32, u32) -> Resolution + Send,
{
    fn resolve_mismatch(&self, entity: &EntityInfo, stored: u32, declared: u32) -> Resolution {
        self(entity, stored, declared)
    }
}

/// Schemas of the types registered with one manager
#[derive(Debug, Default)]
pub(crate) struct Registry {
    by_type: HashMap<TypeId, Arc<EntitySchema>>,
    by_table: HashMap<&'static str, Vec<TypeId>>,
}

impl Registry {
    pub(crate) fn get<T: Entity>(&self) -> Result<Arc<EntitySchema>> {
        self.by_type
            .get(&TypeId::of::<T>())
            .cloned()
            .ok_or(Error::UnregisteredEntityType(T::table_name()))
    }

    pub(crate) fn contains<T: Entity>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn tables(&self) -> Vec<&'static str> {
        let mut tables: Vec<_> = self.by_table.keys().copied().collect();
        tables.sort_unstable();
        tables
    }

    fn same_table(&self, table: &str) -> Vec<Arc<EntitySchema>> {
        self.by_table
            .get(table)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_type.get(id).cloned())
            .collect()
    }

    fn insert<T: Entity>(&mut self, schema: EntitySchema) {
        let id = TypeId::of::<T>();
        let table = schema.table;
        let version = schema.version;

        // Types registered against an older version of this table go stale.
        let stale: Vec<TypeId> = self
            .by_table
            .get(table)
            .into_iter()
            .flatten()
            .filter(|other| {
                self.by_type
                    .get(*other)
                    .is_some_and(|s| s.version != version)
            })
            .copied()
            .collect();
        for other in &stale {
            self.by_type.remove(other);
        }

        let ids = self.by_table.entry(table).or_default();
        ids.retain(|other| !stale.contains(other));
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.by_type.insert(id, Arc::new(schema));
    }
}

/// Describe how two column sets differ, `None` when they are equal as sets
fn column_diff<'a>(
    declared: impl IntoIterator<Item = &'a str>,
    stored: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let declared: BTreeSet<&str> = declared.into_iter().collect();
    let stored: BTreeSet<&str> = stored.into_iter().collect();
    if declared == stored {
        return None;
    }
    let missing: Vec<_> = declared.difference(&stored).collect();
    let extra: Vec<_> = stored.difference(&declared).collect();
    Some(format!("missing {:?}, unexpected {:?}", missing, extra))
}

/// Register `T` against the store.
pub(crate) fn register<T: Entity>(
    store: &SqliteStore,
    registry: &mut Registry,
    delegate: Option<&dyn MismatchDelegate>,
) -> Result<()> {
    let schema = EntitySchema::of::<T>()?;
    schema.probe::<T>()?;

    if registry.contains::<T>() {
        tracing::debug!("{} already registered", schema.table);
        return Ok(());
    }

    for other in registry.same_table(schema.table) {
        if other.version != schema.version {
            continue;
        }
        if let Some(detail) = column_diff(schema.column_names(), other.column_names()) {
            return Err(Error::DuplicateRegistration {
                entity: schema.table,
                version: schema.version,
                detail,
            });
        }
    }

    if store.table_exists(schema.table)? {
        reconcile(store, &schema, std::any::type_name::<T>(), delegate)?;
    } else {
        store.batch(|s| -> Result<()> {
            s.execute_ddl(&schema.statements.create_table)?;
            s.set_version(schema.table, schema.version)?;
            Ok(())
        })?;
        tracing::info!(
            "Created table {} ({} columns, version {})",
            schema.table,
            schema.columns.len(),
            schema.version
        );
    }

    registry.insert::<T>(schema);
    Ok(())
}

/// Bring an existing table's version record in line with the declared schema
fn reconcile(
    store: &SqliteStore,
    schema: &EntitySchema,
    type_name: &'static str,
    delegate: Option<&dyn MismatchDelegate>,
) -> Result<()> {
    let table = schema.table;
    let declared = schema.version;
    let stored_columns = store.table_columns(table)?;
    let diff = column_diff(
        schema.column_names(),
        stored_columns.iter().map(String::as_str),
    );

    // An untracked table is treated as version 0.
    let stored = store.stored_version(table)?;
    match (stored, diff) {
        (Some(v), None) if v == declared => {
            tracing::debug!("{} matches stored version {}", table, v);
            return Ok(());
        }
        (Some(v), Some(detail)) if v == declared => {
            return Err(Error::DuplicateRegistration {
                entity: table,
                version: declared,
                detail,
            });
        }
        (None, None) => {
            store.set_version(table, declared)?;
            tracing::info!("Recorded version {} for existing table {}", declared, table);
            return Ok(());
        }
        _ => {}
    }

    let stored = stored.unwrap_or(0);
    tracing::warn!(
        "Schema version mismatch on {}: stored {}, declared {}",
        table,
        stored,
        declared
    );

    let unresolved = |reason: String| Error::SchemaMismatchUnresolved {
        entity: table,
        stored,
        declared,
        reason,
    };

    let Some(delegate) = delegate else {
        return Err(unresolved("no mismatch delegate configured".to_string()));
    };

    let info = EntityInfo {
        table,
        type_name,
        columns: schema.columns.clone(),
        stored_columns,
    };
    let statements = match delegate.resolve_mismatch(&info, stored, declared) {
        Resolution::Abort(reason) => return Err(unresolved(reason)),
        Resolution::Accept => Vec::new(),
        Resolution::Execute(statements) => statements,
    };

    store.batch(|s| -> Result<()> {
        for statement in &statements {
            s.execute_ddl(statement)
                .map_err(|e| unresolved(format!("`{}` failed: {}", statement, e)))?;
        }
        let columns = s.table_columns(table)?;
        if let Some(detail) = column_diff(
            schema.column_names(),
            columns.iter().map(String::as_str),
        ) {
            return Err(unresolved(format!("columns still differ after resolution: {}", detail)));
        }
        s.set_version(table, declared)?;
        Ok(())
    })?;

    tracing::info!("Migrated {} from version {} to {}", table, stored, declared);
    Ok(())
}
