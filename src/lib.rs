//! # entity-manager - descriptor-driven entity persistence
//!
//! Maps plain Rust structs onto rows of an embedded SQLite store.
//!
//! entity-manager provides:
//! - An `Entity` descriptor trait (plus the `entity!` macro) describing the
//!   table, schema version, key and transient fields of a type
//! - Schema registration with version bookkeeping and delegated mismatch resolution
//! - Generic CRUD over any registered type with singular or composite keys
//! - Predicate queries with positional parameters, validated before execution

pub mod entity;
pub mod value;
pub mod reflect;
pub mod query;
pub mod registrar;
pub mod manager;
pub mod storage;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use entity::{Entity, Field, FieldKind, KeyDef};
pub use value::{FieldValue, IntoKey, Key, Value, ValueError};
pub use query::Predicate;
pub use registrar::{EntityInfo, MismatchDelegate, Resolution};
pub use manager::EntityManager;
pub use storage::SqliteStore;
pub use config::ManagerConfig;

/// Result type alias for entity-manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for entity-manager operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Entity type `{0}` is not registered")]
    UnregisteredEntityType(&'static str),

    #[error("Schema version mismatch on `{entity}` (stored {stored}, declared {declared}) not resolved: {reason}")]
    SchemaMismatchUnresolved {
        entity: &'static str,
        stored: u32,
        declared: u32,
        reason: String,
    },

    #[error("`{entity}` registered twice at version {version} with conflicting columns: {detail}")]
    DuplicateRegistration {
        entity: &'static str,
        version: u32,
        detail: String,
    },

    #[error("Field `{entity}.{field}` cannot be stored: {reason}")]
    UnsupportedFieldType {
        entity: &'static str,
        field: String,
        reason: String,
    },

    #[error("Invalid descriptor for `{entity}`: {reason}")]
    InvalidDescriptor { entity: &'static str, reason: String },

    #[error("Duplicate key {key} in `{entity}`")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("No row with key {key} in `{entity}`")]
    NotFound { entity: &'static str, key: String },

    #[error("Key for `{entity}` has {actual} values, expected {expected}")]
    KeyArityMismatch {
        entity: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Predicate `{fragment}` expects {expected} arguments, got {actual}")]
    ArgumentCountMismatch {
        fragment: String,
        expected: usize,
        actual: usize,
    },

    #[error("Refusing to {operation} `{entity}` rows with an empty predicate")]
    EmptyPredicate {
        operation: &'static str,
        entity: &'static str,
    },

    #[error("More than one `{entity}` row matches `{fragment}`")]
    AmbiguousResult {
        entity: &'static str,
        fragment: String,
    },

    #[error("Store error during {operation} on `{entity}`{}: {source}", key_suffix(.key))]
    Store {
        operation: &'static str,
        entity: &'static str,
        key: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_ref().map(|k| format!(" (key {k})")).unwrap_or_default()
}

impl Error {
    pub(crate) fn store(operation: &'static str, entity: &'static str, source: rusqlite::Error) -> Self {
        Error::Store { operation, entity, key: None, source }
    }

    pub(crate) fn store_at(
        operation: &'static str,
        entity: &'static str,
        key: &Key,
        source: rusqlite::Error,
    ) -> Self {
        Error::Store {
            operation,
            entity,
            key: Some(key.to_string()),
            source,
        }
    }

    /// Wrap a value conversion failure with the entity and field it came from
    pub fn unsupported(entity: &'static str, field: &str, err: ValueError) -> Self {
        Error::UnsupportedFieldType {
            entity,
            field: field.to_string(),
            reason: err.to_string(),
        }
    }

    /// The field name is not declared by the entity
    pub fn unknown_field(entity: &'static str, field: &str) -> Self {
        Error::UnsupportedFieldType {
            entity,
            field: field.to_string(),
            reason: "no such field".to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures;
