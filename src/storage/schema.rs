//! Bookkeeping schema definitions

/// Version bookkeeping: one record per entity table
pub const CREATE_VERSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS _entity_versions (
    entity TEXT PRIMARY KEY,
    version INTEGER NOT NULL
)
"#;

/// Stored version of one entity table
pub const SELECT_VERSION: &str = "SELECT version FROM _entity_versions WHERE entity = ?1";

/// Insert or overwrite a version record
pub const UPSERT_VERSION: &str = r#"
INSERT INTO _entity_versions (entity, version) VALUES (?1, ?2)
ON CONFLICT(entity) DO UPDATE SET version = excluded.version
"#;

/// All version records
pub const SELECT_ALL_VERSIONS: &str =
    "SELECT entity, version FROM _entity_versions ORDER BY entity";

/// Whether a table exists
pub const TABLE_EXISTS: &str =
    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1";

/// Column names of a table, in table order
pub const TABLE_COLUMNS: &str = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";

/// User tables, bookkeeping and SQLite internals excluded
pub const USER_TABLES: &str = r#"
SELECT name FROM sqlite_master
WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name != '_entity_versions'
ORDER BY name
"#;

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_VERSIONS_TABLE]
}
