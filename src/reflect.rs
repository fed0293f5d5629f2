//! Field reflection
//!
//! [`EntitySchema`] is the validated, store-facing view of an [`Entity`]
//! descriptor: its persistable columns in declaration order, its key columns
//! in key order, and the SQL text of every statement the engine runs against
//! the table. It is computed once at registration and shared for the
//! manager's lifetime.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::entity::{Entity, Field, FieldKind};
use crate::value::{type_name, Key, Value};
use crate::{Error, Result};

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

/// Whether `name` can be used as a table or column name without escaping
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
        .is_match(name)
}

/// Quote an identifier for SQL text
pub fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Store-facing schema of one entity type
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub table: &'static str,
    pub version: u32,
    /// Persistable fields, declaration order
    pub columns: Vec<Field>,
    /// Key fields, key order
    pub key_fields: Vec<&'static str>,
    pub statements: Statements,
}

/// Statement texts derived from a schema.
///
/// The `*_prefix` entries are completed with an optional predicate fragment
/// by [`Statements::with_predicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statements {
    pub create_table: String,
    pub insert: String,
    pub replace: String,
    /// `None` when every column is part of the key
    pub update: Option<String>,
    pub delete_by_key: String,
    pub select_by_key: String,
    pub exists_by_key: String,
    pub select_prefix: String,
    pub delete_prefix: String,
    pub exists_prefix: String,
    pub count_prefix: String,
}

impl Statements {
    /// Append ` WHERE <fragment>` unless the fragment is blank, then the suffix
    pub fn with_predicate(prefix: &str, fragment: &str, suffix: &str) -> String {
        let mut sql = prefix.to_string();
        if !fragment.trim().is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(fragment);
        }
        sql.push_str(suffix);
        sql
    }
}

impl EntitySchema {
    /// Validate the descriptor of `T` and derive its schema
    pub fn of<T: Entity>() -> Result<Self> {
        let table = T::table_name();
        let invalid = |reason: String| Error::InvalidDescriptor {
            entity: table,
            reason,
        };

        if !is_identifier(table) {
            return Err(invalid(format!("table name `{}` is not an identifier", table)));
        }
        if T::version() == 0 {
            return Err(invalid("schema version must be at least 1".to_string()));
        }

        let fields = T::fields();
        let mut declared = HashSet::new();
        for field in fields {
            if !is_identifier(field.name) {
                return Err(invalid(format!("field name `{}` is not an identifier", field.name)));
            }
            if !declared.insert(field.name) {
                return Err(invalid(format!("field `{}` declared twice", field.name)));
            }
        }

        let transient: HashSet<&str> = T::transient_fields().iter().copied().collect();
        for name in &transient {
            if !declared.contains(name) {
                return Err(invalid(format!("transient field `{}` is not declared", name)));
            }
        }

        let key_fields = T::key().fields();
        if key_fields.is_empty() {
            return Err(invalid("composite key has no fields".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &key_fields {
            let Some(field) = fields.iter().find(|f| f.name == *name) else {
                return Err(invalid(format!("key field `{}` is not declared", name)));
            };
            if transient.contains(name) {
                return Err(invalid(format!("key field `{}` is transient", name)));
            }
            if field.nullable {
                return Err(invalid(format!("key field `{}` is nullable", name)));
            }
            if !seen.insert(*name) {
                return Err(invalid(format!("key field `{}` listed twice", name)));
            }
        }

        let columns: Vec<Field> = fields
            .iter()
            .filter(|f| !transient.contains(f.name))
            .copied()
            .collect();

        if let Some(field) = columns.iter().find(|f| f.kind == FieldKind::Unmapped) {
            return Err(Error::UnsupportedFieldType {
                entity: table,
                field: field.name.to_string(),
                reason: "field has no store representation and is not transient".to_string(),
            });
        }

        let statements = build_statements(table, &columns, &key_fields);
        Ok(Self {
            table,
            version: T::version(),
            columns,
            key_fields,
            statements,
        })
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|f| f.name).collect()
    }

    /// Persistable columns that are not part of the key, declaration order
    pub fn non_key_columns(&self) -> impl Iterator<Item = &Field> {
        self.columns
            .iter()
            .filter(move |f| !self.key_fields.contains(&f.name))
    }

    /// Check a store value against a column's declared kind
    fn check_value(&self, field: &Field, value: &Value) -> Result<()> {
        let ok = match value {
            Value::Null => field.nullable,
            other => field.kind.accepts(other),
        };
        if ok {
            return Ok(());
        }
        Err(Error::UnsupportedFieldType {
            entity: self.table,
            field: field.name.to_string(),
            reason: format!(
                "declared {:?}{}, got {}",
                field.kind,
                if field.nullable { " (nullable)" } else { "" },
                type_name(value)
            ),
        })
    }

    fn read_checked<T: Entity>(&self, entity: &T, field: &Field) -> Result<Value> {
        let value = entity.read_field(field.name)?;
        self.check_value(field, &value)?;
        Ok(value)
    }

    /// All persistable values of an instance, in column order
    pub fn values_of<T: Entity>(&self, entity: &T) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .map(|field| self.read_checked(entity, field))
            .collect()
    }

    /// Values for the `UPDATE` statement: non-key columns, then the key
    pub fn update_values_of<T: Entity>(&self, entity: &T) -> Result<Vec<Value>> {
        let mut values = self
            .non_key_columns()
            .map(|field| self.read_checked(entity, field))
            .collect::<Result<Vec<_>>>()?;
        values.extend(self.extract_key(entity)?.into_values());
        Ok(values)
    }

    /// The key of an instance: one value per key field, in key order
    pub fn extract_key<T: Entity>(&self, entity: &T) -> Result<Key> {
        let values = self
            .key_fields
            .iter()
            .map(|name| {
                let field = self
                    .columns
                    .iter()
                    .find(|f| f.name == *name)
                    .ok_or_else(|| Error::unknown_field(self.table, name))?;
                self.read_checked(entity, field)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Key::new(values))
    }

    /// Reject keys whose arity does not match the key definition
    pub fn check_key(&self, key: &Key) -> Result<()> {
        if key.len() != self.key_fields.len() {
            return Err(Error::KeyArityMismatch {
                entity: self.table,
                expected: self.key_fields.len(),
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Build an instance from a row selected with `select_prefix` column order
    pub fn materialize<T: Entity>(&self, row: Vec<Value>) -> Result<T> {
        let mut entity = T::default();
        for (field, value) in self.columns.iter().zip(row) {
            entity.write_field(field.name, value)?;
        }
        Ok(entity)
    }

    /// Read every persistable field of a default instance to confirm the
    /// declared kinds match what the type actually produces.
    pub fn probe<T: Entity>(&self) -> Result<()> {
        let sample = T::default();
        for field in &self.columns {
            self.read_checked(&sample, field)?;
        }
        Ok(())
    }
}

fn key_predicate(key_fields: &[&'static str]) -> String {
    key_fields
        .iter()
        .map(|name| format!("{} = ?", quote(name)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn build_statements(table: &str, columns: &[Field], key_fields: &[&'static str]) -> Statements {
    let t = quote(table);
    let column_list = columns
        .iter()
        .map(|f| quote(f.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    let where_key = key_predicate(key_fields);

    let mut definitions: Vec<String> = columns
        .iter()
        .map(|f| {
            let sql_type = f.kind.sql_type().unwrap_or("BLOB");
            if f.nullable {
                format!("{} {}", quote(f.name), sql_type)
            } else {
                format!("{} {} NOT NULL", quote(f.name), sql_type)
            }
        })
        .collect();
    definitions.push(format!(
        "PRIMARY KEY ({})",
        key_fields.iter().map(|k| quote(k)).collect::<Vec<_>>().join(", ")
    ));

    let assignments: Vec<String> = columns
        .iter()
        .filter(|f| !key_fields.contains(&f.name))
        .map(|f| format!("{} = ?", quote(f.name)))
        .collect();
    let update = if assignments.is_empty() {
        None
    } else {
        Some(format!(
            "UPDATE {} SET {} WHERE {}",
            t,
            assignments.join(", "),
            where_key
        ))
    };

    Statements {
        create_table: format!("CREATE TABLE {} ({})", t, definitions.join(", ")),
        insert: format!("INSERT INTO {} ({}) VALUES ({})", t, column_list, placeholders),
        replace: format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            t, column_list, placeholders
        ),
        update,
        delete_by_key: format!("DELETE FROM {} WHERE {}", t, where_key),
        select_by_key: format!("SELECT {} FROM {} WHERE {}", column_list, t, where_key),
        exists_by_key: format!("SELECT 1 FROM {} WHERE {} LIMIT 1", t, where_key),
        select_prefix: format!("SELECT {} FROM {}", column_list, t),
        delete_prefix: format!("DELETE FROM {}", t),
        exists_prefix: format!("SELECT 1 FROM {}", t),
        count_prefix: format!("SELECT COUNT(*) FROM {}", t),
    }
}
