//! SQLite store handle

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::schema;
use crate::config::ManagerConfig;
use crate::reflect::quote;
use crate::value::Value;
use crate::{Error, Result};

const STATEMENT_CACHE_CAPACITY: usize = 64;

/// The single connection to the relational store.
///
/// Every statement the manager runs goes through this handle. It is `Send`
/// but not `Sync`; callers sharing it across threads serialize access.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    /// Open the database named by a config and apply its connection settings
    pub fn open_with(config: &ManagerConfig) -> Result<Self> {
        let store = match &config.database {
            Some(path) => {
                crate::config::ensure_db_dir(path)?;
                Self::open(path)?
            }
            None => Self::open_in_memory()?,
        };

        store
            .conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        store
            .conn
            .pragma_update(None, "foreign_keys", config.foreign_keys)?;
        if let Some(mode) = &config.journal_mode {
            let applied: String =
                store
                    .conn
                    .pragma_update_and_check(None, "journal_mode", mode, |row| row.get(0))?;
            tracing::debug!("journal_mode set to {}", applied);
        }
        Ok(store)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        let store = Self { conn, path };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the bookkeeping schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    /// Close the connection, reporting any error SQLite raises while closing
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    /// File backing this store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========== Statement Primitives ==========

    /// Execute a statement with positional arguments, returning affected rows
    pub fn execute(&self, sql: &str, args: &[Value]) -> rusqlite::Result<usize> {
        tracing::debug!(sql, args = args.len(), "execute");
        let mut stmt = self.conn.prepare_cached(sql)?;
        stmt.execute(params_from_iter(args.iter()))
    }

    /// Run a query with positional arguments, returning every row as values
    pub fn query(&self, sql: &str, args: &[Value]) -> rusqlite::Result<Vec<Vec<Value>>> {
        tracing::debug!(sql, args = args.len(), "query");
        let mut stmt = self.conn.prepare_cached(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        rows.collect()
    }

    /// Run statements that must take effect together.
    ///
    /// Everything `f` executes through this store commits when it returns
    /// `Ok` and rolls back when it returns `Err`.
    pub fn batch<T, E>(&self, f: impl FnOnce(&Self) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    /// Execute DDL text without parameters
    pub fn execute_ddl(&self, sql: &str) -> rusqlite::Result<()> {
        tracing::debug!(sql, "ddl");
        self.conn.execute_batch(sql)
    }

    // ========== Schema Introspection ==========

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(schema::TABLE_EXISTS, [table], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Column names of a table, in table order
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(schema::TABLE_COLUMNS)?;
        let columns = stmt
            .query_map([table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(columns)
    }

    /// User tables, bookkeeping excluded
    pub fn user_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(schema::USER_TABLES)?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(tables)
    }

    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ========== Version Operations ==========

    /// Stored schema version of an entity table
    pub fn stored_version(&self, entity: &str) -> Result<Option<u32>> {
        let version: Option<i64> = self
            .conn
            .query_row(schema::SELECT_VERSION, [entity], |row| row.get(0))
            .optional()?;
        version
            .map(|v| u32::try_from(v).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(0, v)))
            .transpose()
            .map_err(Into::into)
    }

    /// Record the schema version of an entity table
    pub fn set_version(&self, entity: &str, version: u32) -> rusqlite::Result<()> {
        self.conn
            .execute(schema::UPSERT_VERSION, params![entity, i64::from(version)])?;
        Ok(())
    }

    /// All version records, ordered by entity name
    pub fn versions(&self) -> Result<Vec<VersionRecord>> {
        let mut stmt = self.conn.prepare(schema::SELECT_ALL_VERSIONS)?;
        let records = stmt
            .query_map([], |row| {
                Ok(VersionRecord {
                    entity: row.get(0)?,
                    version: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<StoreStats> {
        let versions = self.versions()?;
        let mut tables = Vec::new();
        for name in self.user_tables()? {
            let version = versions
                .iter()
                .find(|r| r.entity == name)
                .map(|r| r.version);
            tables.push(TableStats {
                rows: self.count_rows(&name)?,
                columns: self.table_columns(&name)?.len(),
                version,
                name,
            });
        }
        Ok(StoreStats { tables })
    }
}

/// Stored schema version of one entity table
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionRecord {
    pub entity: String,
    pub version: i64,
}

/// Row and column counts of one table
#[derive(Debug, Clone, serde::Serialize)]
pub struct TableStats {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    /// `None` for tables without a version record
    pub version: Option<i64>,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
    pub tables: Vec<TableStats>,
}

impl StoreStats {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Tables: {}", self.tables.len())?;
        for table in &self.tables {
            let version = table
                .version
                .map(|v| format!("v{}", v))
                .unwrap_or_else(|| "unversioned".to_string());
            writeln!(f, "  {} ({}): {} rows", table.name, version, table.rows)?;
        }
        writeln!(f, "  Total rows: {}", self.total_rows())
    }
}
