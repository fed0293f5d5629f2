//! Storage Layer - SQLite-backed store handle
//!
//! System of record is SQLite with:
//! - one table per registered entity type, one column per persistable field
//! - _entity_versions(entity, version) holding the schema version of each table

pub mod schema;
pub mod sqlite;

pub use sqlite::{SqliteStore, StoreStats, TableStats, VersionRecord};
