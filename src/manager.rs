//! Persistence engine
//!
//! [`EntityManager`] owns the store handle and the registry of entity
//! schemas, and implements CRUD generically over any registered [`Entity`]:
//! - `create` / `replace` / `update` / `remove` on instances
//! - removal by key, key list and predicate
//! - loading by key, first match, unique match and all matches
//!
//! Absence on load is `Ok(None)`; absence on update or remove is
//! [`Error::NotFound`].

use std::path::Path;
use std::sync::Arc;

use rusqlite::ErrorCode;

use crate::config::ManagerConfig;
use crate::entity::Entity;
use crate::query::Predicate;
use crate::reflect::{EntitySchema, Statements};
use crate::registrar::{self, MismatchDelegate, Registry};
use crate::storage::SqliteStore;
use crate::value::{IntoKey, Key, Value};
use crate::{Error, Result};

/// Generic persistence over one store connection
pub struct EntityManager {
    store: SqliteStore,
    delegate: Option<Box<dyn MismatchDelegate>>,
    registry: Registry,
}

impl EntityManager {
    /// Open a manager on a database file (creates if doesn't exist)
    pub fn open(path: impl AsRef<Path>, delegate: Option<Box<dyn MismatchDelegate>>) -> Result<Self> {
        let store = SqliteStore::open(path.as_ref())?;
        tracing::debug!("Opened entity store at {}", path.as_ref().display());
        Ok(Self::with_store(store, delegate))
    }

    /// Open a manager on an in-memory database
    pub fn open_in_memory(delegate: Option<Box<dyn MismatchDelegate>>) -> Result<Self> {
        Ok(Self::with_store(SqliteStore::open_in_memory()?, delegate))
    }

    pub fn open_with_config(
        config: &ManagerConfig,
        delegate: Option<Box<dyn MismatchDelegate>>,
    ) -> Result<Self> {
        Ok(Self::with_store(SqliteStore::open_with(config)?, delegate))
    }

    pub fn with_store(store: SqliteStore, delegate: Option<Box<dyn MismatchDelegate>>) -> Self {
        Self {
            store,
            delegate,
            registry: Registry::default(),
        }
    }

    /// Release the store connection
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    // ========== Registration ==========

    /// Register an entity type, creating or reconciling its table
    pub fn register<T: Entity>(&mut self) -> Result<()> {
        registrar::register::<T>(&self.store, &mut self.registry, self.delegate.as_deref())
    }

    pub fn is_registered<T: Entity>(&self) -> bool {
        self.registry.contains::<T>()
    }

    /// Tables of all registered types, sorted
    pub fn registered_tables(&self) -> Vec<&'static str> {
        self.registry.tables()
    }

    fn schema<T: Entity>(&self) -> Result<Arc<EntitySchema>> {
        self.registry.get::<T>()
    }

    fn key_for<T: Entity>(&self, schema: &EntitySchema, key: impl IntoKey) -> Result<Key> {
        let key = key.into_key().map_err(|e| Error::UnsupportedFieldType {
            entity: T::table_name(),
            field: schema.key_fields.join(", "),
            reason: e.to_string(),
        })?;
        schema.check_key(&key)?;
        Ok(key)
    }

    // ========== Instance Operations ==========

    /// Insert a new row. Fails with `DuplicateKey` when the key is taken.
    pub fn create<T: Entity>(&self, entity: &T) -> Result<()> {
        let schema = self.schema::<T>()?;
        let values = schema.values_of(entity)?;
        self.store
            .execute(&schema.statements.insert, &values)
            .map_err(|e| {
                let key = schema.extract_key(entity).unwrap_or_else(|_| Key::new(Vec::new()));
                classify("create", schema.table, &key, e)
            })?;
        Ok(())
    }

    /// Insert the row, or overwrite every column of the row with the same key
    pub fn replace<T: Entity>(&self, entity: &T) -> Result<()> {
        let schema = self.schema::<T>()?;
        let values = schema.values_of(entity)?;
        self.store
            .execute(&schema.statements.replace, &values)
            .map_err(|e| match schema.extract_key(entity) {
                Ok(key) => Error::store_at("replace", schema.table, &key, e),
                Err(_) => Error::store("replace", schema.table, e),
            })?;
        Ok(())
    }

    /// Overwrite the non-key columns of an existing row
    pub fn update<T: Entity>(&self, entity: &T) -> Result<()> {
        let schema = self.schema::<T>()?;
        let key = schema.extract_key(entity)?;

        let affected = match &schema.statements.update {
            Some(sql) => {
                let values = schema.update_values_of(entity)?;
                self.store
                    .execute(sql, &values)
                    .map_err(|e| classify("update", schema.table, &key, e))?
            }
            // Every column is part of the key: nothing to write, only existence to check.
            None => self
                .store
                .query(&schema.statements.exists_by_key, key.values())
                .map_err(|e| Error::store_at("update", schema.table, &key, e))?
                .len(),
        };

        if affected == 0 {
            return Err(not_found(schema.table, &key));
        }
        Ok(())
    }

    /// Delete the row with the instance's key
    pub fn remove<T: Entity>(&self, entity: &T) -> Result<()> {
        let schema = self.schema::<T>()?;
        let key = schema.extract_key(entity)?;
        self.delete_key(&schema, &key)
    }

    // ========== Key Operations ==========

    /// Delete the row with the given key
    pub fn remove_by_key<T: Entity>(&self, key: impl IntoKey) -> Result<()> {
        let schema = self.schema::<T>()?;
        let key = self.key_for::<T>(&schema, key)?;
        self.delete_key(&schema, &key)
    }

    /// Delete every listed key in one transaction.
    ///
    /// Keys listed more than once are removed once. Either all rows are
    /// removed or, when a key has no row, none are and the call fails with
    /// `NotFound` for the first missing key.
    pub fn remove_by_key_list<T, K>(&self, keys: impl IntoIterator<Item = K>) -> Result<usize>
    where
        T: Entity,
        K: IntoKey,
    {
        let schema = self.schema::<T>()?;
        let mut unique: Vec<Key> = Vec::new();
        for key in keys {
            let key = self.key_for::<T>(&schema, key)?;
            if !unique.contains(&key) {
                unique.push(key);
            }
        }
        let keys = unique;
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self.store.batch(|store| -> Result<usize> {
            for key in &keys {
                let affected = store
                    .execute(&schema.statements.delete_by_key, key.values())
                    .map_err(|e| Error::store_at("remove", schema.table, key, e))?;
                if affected == 0 {
                    return Err(not_found(schema.table, key));
                }
            }
            Ok(keys.len())
        });

        if let Err(err) = &removed {
            tracing::warn!("Rolled back removal of {} {} rows: {}", keys.len(), schema.table, err);
        }
        removed
    }

    fn delete_key(&self, schema: &EntitySchema, key: &Key) -> Result<()> {
        let affected = self
            .store
            .execute(&schema.statements.delete_by_key, key.values())
            .map_err(|e| Error::store_at("remove", schema.table, key, e))?;
        if affected == 0 {
            return Err(not_found(schema.table, key));
        }
        Ok(())
    }

    /// Load the row with the given key, `None` when absent
    pub fn load_by_key<T: Entity>(&self, key: impl IntoKey) -> Result<Option<T>> {
        let schema = self.schema::<T>()?;
        let key = self.key_for::<T>(&schema, key)?;
        let rows = self
            .store
            .query(&schema.statements.select_by_key, key.values())
            .map_err(|e| Error::store_at("load", schema.table, &key, e))?;
        rows.into_iter()
            .next()
            .map(|row| schema.materialize(row))
            .transpose()
    }

    // ========== Predicate Operations ==========

    fn run_query(
        &self,
        operation: &'static str,
        schema: &EntitySchema,
        prefix: &str,
        predicate: &Predicate,
        suffix: &str,
    ) -> Result<Vec<Vec<Value>>> {
        predicate.validate(schema.table)?;
        let sql = Statements::with_predicate(prefix, predicate.fragment(), suffix);
        self.store
            .query(&sql, predicate.args())
            .map_err(|e| Error::store(operation, schema.table, e))
    }

    /// Delete every row matching the predicate, returning how many went.
    ///
    /// A blank fragment is refused with `EmptyPredicate`; clearing a table
    /// goes through [`EntityManager::remove_all`].
    pub fn remove_by_query<T: Entity>(&self, predicate: &Predicate) -> Result<usize> {
        let schema = self.schema::<T>()?;
        if predicate.is_blank() {
            return Err(Error::EmptyPredicate {
                operation: "remove",
                entity: schema.table,
            });
        }
        predicate.validate(schema.table)?;
        let sql = Statements::with_predicate(&schema.statements.delete_prefix, predicate.fragment(), "");
        self.store
            .execute(&sql, predicate.args())
            .map_err(|e| Error::store("remove", schema.table, e))
    }

    /// Delete every row of the table, returning how many went
    pub fn remove_all<T: Entity>(&self) -> Result<usize> {
        let schema = self.schema::<T>()?;
        let removed = self
            .store
            .execute(&schema.statements.delete_prefix, &[])
            .map_err(|e| Error::store("remove", schema.table, e))?;
        tracing::debug!("Removed all {} rows of {}", removed, schema.table);
        Ok(removed)
    }

    /// First matching row, `None` when nothing matches.
    ///
    /// Further matches are ignored; use [`EntityManager::load_unique`] when
    /// more than one match is a bug.
    pub fn load_single<T: Entity>(&self, predicate: &Predicate) -> Result<Option<T>> {
        let schema = self.schema::<T>()?;
        let rows = self.run_query("load", &schema, &schema.statements.select_prefix, predicate, " LIMIT 1")?;
        rows.into_iter()
            .next()
            .map(|row| schema.materialize(row))
            .transpose()
    }

    /// The only matching row; `AmbiguousResult` when several match
    pub fn load_unique<T: Entity>(&self, predicate: &Predicate) -> Result<Option<T>> {
        let schema = self.schema::<T>()?;
        let mut rows = self.run_query("load", &schema, &schema.statements.select_prefix, predicate, " LIMIT 2")?;
        if rows.len() > 1 {
            return Err(Error::AmbiguousResult {
                entity: schema.table,
                fragment: predicate.fragment().to_string(),
            });
        }
        rows.pop().map(|row| schema.materialize(row)).transpose()
    }

    /// All matching rows in store order
    pub fn load_array<T: Entity>(&self, predicate: &Predicate) -> Result<Vec<T>> {
        let schema = self.schema::<T>()?;
        self.run_query("load", &schema, &schema.statements.select_prefix, predicate, "")?
            .into_iter()
            .map(|row| schema.materialize(row))
            .collect()
    }

    pub fn load_all<T: Entity>(&self) -> Result<Vec<T>> {
        self.load_array(&Predicate::all())
    }

    /// Whether any row matches, without materializing it
    pub fn has_entity<T: Entity>(&self, predicate: &Predicate) -> Result<bool> {
        let schema = self.schema::<T>()?;
        let rows = self.run_query("exists", &schema, &schema.statements.exists_prefix, predicate, " LIMIT 1")?;
        Ok(!rows.is_empty())
    }

    pub fn count<T: Entity>(&self, predicate: &Predicate) -> Result<usize> {
        let schema = self.schema::<T>()?;
        let rows = self.run_query("count", &schema, &schema.statements.count_prefix, predicate, "")?;
        match rows.first().and_then(|row| row.first()) {
            Some(Value::Integer(n)) => Ok(*n as usize),
            _ => Ok(0),
        }
    }
}

fn not_found(entity: &'static str, key: &Key) -> Error {
    Error::NotFound {
        entity,
        key: key.to_string(),
    }
}

/// Surface key conflicts as `DuplicateKey`, everything else with context
fn classify(operation: &'static str, entity: &'static str, key: &Key, err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        let unique = failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE;
        if failure.code == ErrorCode::ConstraintViolation && unique {
            return Error::DuplicateKey {
                entity,
                key: key.to_string(),
            };
        }
    }
    Error::store_at(operation, entity, key, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Account, AccountV2, Document, Membership, Note, Tag};
    use crate::registrar::{EntityInfo, Resolution};

    fn manager() -> EntityManager {
        let mut manager = EntityManager::open_in_memory(None).unwrap();
        manager.register::<Account>().unwrap();
        manager.register::<Membership>().unwrap();
        manager.register::<Note>().unwrap();
        manager
    }

    fn member(group_id: i64, user_id: i64) -> Membership {
        Membership {
            group_id,
            user_id,
            role: "member".to_string(),
        }
    }

    #[test]
    fn test_account_scenario() {
        let manager = manager();

        manager.create(&Account::new(1, "ada", 100)).unwrap();
        manager.update(&Account::new(1, "ada", 150)).unwrap();

        let loaded: Account = manager.load_by_key(1i64).unwrap().unwrap();
        assert_eq!(loaded, Account::new(1, "ada", 150));

        manager.remove_by_key::<Account>(1i64).unwrap();
        assert_eq!(manager.load_by_key::<Account>(1i64).unwrap(), None);
    }

    #[test]
    fn test_round_trip_all_column_kinds() {
        let mut manager = EntityManager::open_in_memory(None).unwrap();
        manager.register::<Document>().unwrap();

        let doc = Document {
            slug: "intro".to_string(),
            score: 0.75,
            published: true,
            payload: vec![0, 1, 2, 255],
            views: 12,
            summary: None,
        };
        manager.create(&doc).unwrap();
        assert_eq!(manager.load_by_key::<Document>("intro").unwrap(), Some(doc));
    }

    #[test]
    fn test_nan_field_is_unsupported() {
        let mut manager = EntityManager::open_in_memory(None).unwrap();
        manager.register::<Document>().unwrap();

        let doc = Document {
            slug: "nan".to_string(),
            score: f64::NAN,
            ..Document::default()
        };
        let err = manager.create(&doc).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldType { ref field, .. } if field == "score"));
        assert_eq!(manager.count::<Document>(&Predicate::all()).unwrap(), 0);
    }

    #[test]
    fn test_replace_store_error_carries_key() {
        let manager = manager();
        manager.store().execute_ddl(r#"DROP TABLE "accounts""#).unwrap();

        let err = manager.replace(&Account::new(7, "cy", 70)).unwrap_err();
        assert!(matches!(
            err,
            Error::Store {
                operation: "replace",
                entity: "accounts",
                key: Some(ref key),
                ..
            } if key == "7"
        ));
    }

    #[test]
    fn test_create_duplicate_key() {
        let manager = manager();
        manager.create(&Account::new(1, "ada", 100)).unwrap();

        let err = manager.create(&Account::new(1, "bob", 5)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { ref key, .. } if key == "1"));
    }

    #[test]
    fn test_replace_is_idempotent() {
        let manager = manager();
        let account = Account::new(7, "cy", 70);

        manager.replace(&account).unwrap();
        manager.replace(&account).unwrap();
        assert_eq!(manager.count::<Account>(&Predicate::all()).unwrap(), 1);
        assert_eq!(manager.load_by_key::<Account>(7i64).unwrap(), Some(account));

        manager.replace(&Account::new(7, "cy", 71)).unwrap();
        assert_eq!(manager.load_by_key::<Account>(7i64).unwrap().unwrap().balance, 71);
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let manager = manager();
        let err = manager.update(&Account::new(9, "nobody", 0)).unwrap_err();
        assert!(matches!(err, Error::NotFound { ref key, .. } if key == "9"));
    }

    #[test]
    fn test_remove_missing_row_is_not_found() {
        let manager = manager();
        let err = manager.remove(&Account::new(9, "nobody", 0)).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        let err = manager.remove_by_key::<Account>(9i64).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_update_key_only_entity_checks_existence() {
        let mut manager = EntityManager::open_in_memory(None).unwrap();
        manager.register::<Tag>().unwrap();

        let tag = Tag {
            name: "rust".to_string(),
        };
        assert!(matches!(manager.update(&tag).unwrap_err(), Error::NotFound { .. }));
        manager.create(&tag).unwrap();
        manager.update(&tag).unwrap();
    }

    #[test]
    fn test_unregistered_type_is_rejected() {
        let manager = EntityManager::open_in_memory(None).unwrap();
        let err = manager.create(&Account::new(1, "ada", 1)).unwrap_err();
        assert!(matches!(err, Error::UnregisteredEntityType("accounts")));
        assert!(matches!(
            manager.load_by_key::<Account>(1i64).unwrap_err(),
            Error::UnregisteredEntityType(_)
        ));
    }

    #[test]
    fn test_composite_key_list_removal() {
        let manager = manager();
        for (g, u) in [(1, 2), (3, 4), (1, 4), (3, 2)] {
            manager.create(&member(g, u)).unwrap();
        }

        let removed = manager
            .remove_by_key_list::<Membership, _>([(1i64, 2i64), (3i64, 4i64)])
            .unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<(i64, i64)> = manager
            .load_all::<Membership>()
            .unwrap()
            .into_iter()
            .map(|m| (m.group_id, m.user_id))
            .collect();
        left.sort();
        assert_eq!(left, vec![(1, 4), (3, 2)]);
    }

    #[test]
    fn test_key_list_removal_is_atomic() {
        let manager = manager();
        manager.create(&member(1, 2)).unwrap();
        manager.create(&member(3, 4)).unwrap();

        let err = manager
            .remove_by_key_list::<Membership, _>([(1i64, 2i64), (5i64, 6i64)])
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref key, .. } if key == "(5, 6)"));
        assert_eq!(manager.count::<Membership>(&Predicate::all()).unwrap(), 2);
        assert!(manager.load_by_key::<Membership>((1i64, 2i64)).unwrap().is_some());
    }

    #[test]
    fn test_repeated_keys_are_removed_once() {
        let manager = manager();
        manager.create(&Account::new(1, "ada", 10)).unwrap();
        manager.create(&Account::new(2, "bob", 20)).unwrap();
        manager.create(&Account::new(3, "cy", 30)).unwrap();

        let removed = manager.remove_by_key_list::<Account, _>([1i64, 2, 1]).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(manager.count::<Account>(&Predicate::all()).unwrap(), 1);
        assert!(manager.load_by_key::<Account>(3i64).unwrap().is_some());
    }

    #[test]
    fn test_key_arity_is_checked() {
        let manager = manager();
        let err = manager.load_by_key::<Membership>(1i64).unwrap_err();
        assert!(matches!(
            err,
            Error::KeyArityMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_key_list_removes_nothing() {
        let manager = manager();
        let keys: Vec<i64> = Vec::new();
        assert_eq!(manager.remove_by_key_list::<Account, _>(keys).unwrap(), 0);
    }

    #[test]
    fn test_remove_by_query() {
        let manager = manager();
        for (id, balance) in [(1, 10), (2, 20), (3, 30)] {
            manager.create(&Account::new(id, "x", balance)).unwrap();
        }

        let removed = manager
            .remove_by_query::<Account>(&Predicate::new("balance >= ?").arg(20i64))
            .unwrap();
        assert_eq!(removed, 2);
        let none = manager
            .remove_by_query::<Account>(&Predicate::new("balance > ?").arg(1000i64))
            .unwrap();
        assert_eq!(none, 0);
    }

    #[test]
    fn test_blank_delete_predicate_is_refused() {
        let manager = manager();
        manager.create(&Account::new(1, "ada", 10)).unwrap();
        manager.create(&Account::new(2, "bob", 20)).unwrap();

        for predicate in [Predicate::new("   "), Predicate::all()] {
            let err = manager.remove_by_query::<Account>(&predicate).unwrap_err();
            assert!(matches!(
                err,
                Error::EmptyPredicate {
                    operation: "remove",
                    entity: "accounts"
                }
            ));
        }
        assert_eq!(manager.count::<Account>(&Predicate::all()).unwrap(), 2);

        assert_eq!(manager.remove_all::<Account>().unwrap(), 2);
        assert_eq!(manager.count::<Account>(&Predicate::all()).unwrap(), 0);
    }

    #[test]
    fn test_rejected_argument_names_the_table() {
        let manager = manager();
        let err = manager
            .load_array::<Account>(&Predicate::new("balance = ?").arg(u64::MAX))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFieldType { entity: "accounts", .. }));
    }

    #[test]
    fn test_load_single_takes_first_match() {
        let manager = manager();
        manager.create(&Account::new(1, "ada", 10)).unwrap();
        manager.create(&Account::new(2, "ada", 20)).unwrap();

        let first: Option<Account> = manager
            .load_single(&Predicate::new("owner = ? ORDER BY id").arg("ada".to_string()))
            .unwrap();
        assert_eq!(first.unwrap().id, 1);

        let missing: Option<Account> = manager
            .load_single(&Predicate::new("owner = ?").arg("bob".to_string()))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_load_unique_rejects_ambiguity() {
        let manager = manager();
        manager.create(&Account::new(1, "ada", 10)).unwrap();
        manager.create(&Account::new(2, "ada", 20)).unwrap();

        let err = manager
            .load_unique::<Account>(&Predicate::new("owner = ?").arg("ada".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousResult { .. }));

        let one = manager
            .load_unique::<Account>(&Predicate::new("balance = ?").arg(20i64))
            .unwrap();
        assert_eq!(one.unwrap().id, 2);
    }

    #[test]
    fn test_load_array_and_has_entity() {
        let manager = manager();
        for id in 1..=5 {
            manager.create(&Account::new(id, "z", id * 10)).unwrap();
        }

        let rich: Vec<Account> = manager
            .load_array(&Predicate::new("balance > ? AND balance < ?").arg(15i64).arg(45i64))
            .unwrap();
        assert_eq!(rich.len(), 3);

        assert!(manager.has_entity::<Account>(&Predicate::new("id = ?").arg(3i64)).unwrap());
        assert!(!manager.has_entity::<Account>(&Predicate::new("id = ?").arg(30i64)).unwrap());
        assert_eq!(
            manager
                .count::<Account>(&Predicate::new("balance >= ?").arg(30i64))
                .unwrap(),
            3
        );
    }

    #[test]
    fn test_argument_count_checked_before_store() {
        let manager = manager();
        // A fragment naming a missing column would be a store error; the
        // count check must fire first.
        let err = manager
            .load_array::<Account>(&Predicate::new("no_such_column = ?"))
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentCountMismatch { expected: 1, actual: 0, .. }));

        let err = manager
            .load_array::<Account>(&Predicate::new("no_such_column = ?").arg(1i64).arg(2i64))
            .unwrap_err();
        assert!(matches!(err, Error::ArgumentCountMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn test_malformed_fragment_is_store_error() {
        let manager = manager();
        let err = manager
            .load_array::<Account>(&Predicate::new("no_such_column = ?").arg(1i64))
            .unwrap_err();
        assert!(matches!(err, Error::Store { operation: "load", entity: "accounts", .. }));
    }

    #[test]
    fn test_transient_fields_are_not_stored() {
        let manager = manager();
        let note = Note {
            id: 1,
            title: "hello".to_string(),
            body: Some("world".to_string()),
            scratch: vec!["draft".to_string()],
        };
        manager.create(&note).unwrap();

        let loaded: Note = manager.load_by_key(1i64).unwrap().unwrap();
        assert_eq!(loaded.body.as_deref(), Some("world"));
        assert!(loaded.scratch.is_empty());
        assert_eq!(
            manager.store().table_columns("notes").unwrap(),
            vec!["id", "title", "body"]
        );
    }

    #[test]
    fn test_version_mismatch_gates_crud() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.db");

        let mut manager = EntityManager::open(&path, None).unwrap();
        manager.register::<Account>().unwrap();
        manager.create(&Account::new(1, "ada", 100)).unwrap();
        manager.close().unwrap();

        let mut manager = EntityManager::open(&path, None).unwrap();
        let err = manager.register::<AccountV2>().unwrap_err();
        assert!(matches!(err, Error::SchemaMismatchUnresolved { .. }));
        assert!(!manager.is_registered::<AccountV2>());
        assert!(matches!(
            manager.load_by_key::<AccountV2>(1i64).unwrap_err(),
            Error::UnregisteredEntityType(_)
        ));
    }

    #[test]
    fn test_delegate_resolution_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.db");

        let mut manager = EntityManager::open(&path, None).unwrap();
        manager.register::<Account>().unwrap();
        manager.create(&Account::new(1, "ada", 100)).unwrap();
        manager.close().unwrap();

        let delegate = |info: &EntityInfo, stored: u32, declared: u32| {
            assert_eq!((stored, declared), (1, 2));
            Resolution::Execute(info.reconcile_statements())
        };
        let mut manager = EntityManager::open(&path, Some(Box::new(delegate))).unwrap();
        manager.register::<AccountV2>().unwrap();

        let loaded: AccountV2 = manager.load_by_key(1i64).unwrap().unwrap();
        assert_eq!(loaded.balance, 100);
        assert_eq!(loaded.currency, None);
        assert_eq!(manager.registered_tables(), vec!["accounts"]);
    }

    #[test]
    fn test_open_with_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ManagerConfig {
            database: Some(dir.path().join("cfg.db")),
            ..ManagerConfig::default()
        };
        let mut manager = EntityManager::open_with_config(&config, None).unwrap();
        manager.register::<Account>().unwrap();
        assert!(manager.is_registered::<Account>());
        assert!(dir.path().join("cfg.db").exists());
    }
}
