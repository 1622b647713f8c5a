//! Catalog store: catalogs and databases.

use metacat_proto::{CatalogDef, DatabaseDef, DatabaseRef, PartitionDef, TableDef, DEFAULT_DATABASE_NAME};
use sled::transaction::TransactionError;
use sled::{Db, Transactional, Tree};
use tracing::{debug, info, warn};

use super::drop::{partitions_current, remove_table, until_current, Attempt};
use super::keys;
use crate::error::Error;
use crate::storage::counter;
use crate::storage::txn::{abort, finish, get, read, scan, scan_keys, write};
use crate::storage::{join_location, StoreConfig, LAYOUT_EPOCH_TREE, ROW_COUNT_TREE};

/// Tree name for catalogs.
const CATALOG_TREE: &str = "catalog:catalogs";

/// Tree name for databases.
const DATABASE_TREE: &str = "catalog:databases";

/// Tree name for tables.
const TABLE_TREE: &str = "catalog:tables";

/// Tree name for partitions.
const PARTITION_TREE: &str = "catalog:partitions";

/// Tree name for per-table constraint sets.
const CONSTRAINT_TREE: &str = "catalog:constraints";

/// Tree name for child counters, keyed by the parent's key.
const CHILDREN_TREE: &str = "catalog:children";

/// Tree name for store metadata.
const META_TREE: &str = "catalog:meta";

/// Key for the on-disk format version in the meta tree.
const FORMAT_VERSION_KEY: &[u8] = b"format_version";

/// Current on-disk format version.
const FORMAT_VERSION: u32 = 1;

/// A table removed by a drop, with the partitions removed alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedTable {
    /// The dropped table.
    pub table: TableDef,
    /// Its dropped partitions.
    pub partitions: Vec<PartitionDef>,
}

impl DroppedTable {
    /// Every location that held data of the table.
    pub fn data_locations(&self) -> Vec<String> {
        self.table
            .location
            .iter()
            .chain(self.partitions.iter().filter_map(|p| p.location.as_ref()))
            .cloned()
            .collect()
    }
}

/// A database removed by a drop, with the tables removed alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedDatabase {
    /// The dropped database.
    pub database: DatabaseDef,
    /// Its dropped tables.
    pub tables: Vec<DroppedTable>,
}

/// Persistent catalog store.
///
/// The store holds no in-memory copy of the object graph; every call reads
/// the trees directly.
pub struct CatalogStore {
    pub(super) catalogs: Tree,
    pub(super) databases: Tree,
    pub(super) tables: Tree,
    pub(super) partitions: Tree,
    pub(super) constraints: Tree,
    pub(super) children: Tree,
    pub(super) row_counts: Tree,
    pub(super) layout_epochs: Tree,
    meta: Tree,
    default_catalog: String,
}

impl CatalogStore {
    /// Open or create a catalog store using the given sled database.
    ///
    /// The default catalog and its `default` database are created on first open.
    pub fn open(db: &Db, config: &StoreConfig) -> Result<Self, Error> {
        let store = Self {
            catalogs: db.open_tree(CATALOG_TREE)?,
            databases: db.open_tree(DATABASE_TREE)?,
            tables: db.open_tree(TABLE_TREE)?,
            partitions: db.open_tree(PARTITION_TREE)?,
            constraints: db.open_tree(CONSTRAINT_TREE)?,
            children: db.open_tree(CHILDREN_TREE)?,
            row_counts: db.open_tree(ROW_COUNT_TREE)?,
            layout_epochs: db.open_tree(LAYOUT_EPOCH_TREE)?,
            meta: db.open_tree(META_TREE)?,
            default_catalog: config.default_catalog.clone(),
        };

        match store.meta.get(FORMAT_VERSION_KEY)? {
            Some(bytes) if bytes.len() == 4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&bytes);
                let version = u32::from_be_bytes(buf);
                if version != FORMAT_VERSION {
                    return Err(Error::InvalidOperation(format!(
                        "unsupported catalog format version {}",
                        version
                    )));
                }
            }
            _ => {
                store
                    .meta
                    .insert(FORMAT_VERSION_KEY, &FORMAT_VERSION.to_be_bytes())?;
            }
        }

        if store.get_catalog(&store.default_catalog)?.is_none() {
            let default = CatalogDef::new(store.default_catalog.clone(), config.warehouse.clone())
                .with_description("Default catalog");
            match store.create_catalog(default) {
                Ok(_) | Err(Error::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(store)
    }

    /// Name of the catalog that cannot be dropped.
    pub fn default_catalog(&self) -> &str {
        &self.default_catalog
    }

    // ---- catalogs ----

    /// Create a catalog together with its `default` database.
    pub fn create_catalog(&self, catalog: CatalogDef) -> Result<CatalogDef, Error> {
        if catalog.name.trim().is_empty() {
            return Err(Error::InvalidSchemaObject("Catalog name cannot be empty".to_string()));
        }
        if catalog.location_uri.trim().is_empty() {
            return Err(Error::InvalidSchemaObject(format!(
                "Catalog {} must have a location",
                catalog.name
            )));
        }

        let catalog_key = keys::catalog(&catalog.name);
        let default_db = DatabaseDef::new(DEFAULT_DATABASE_NAME)
            .in_catalog(catalog.name.clone())
            .with_location(catalog.location_uri.clone())
            .with_description(format!("Default database for catalog {}", catalog.name));
        let default_db_key = keys::database(&default_db.database_ref());

        let result = (&self.catalogs, &self.databases, &self.children).transaction(
            |(catalogs, databases, children)| {
                if catalogs.get(&catalog_key)?.is_some() {
                    return abort(Error::AlreadyExists(format!(
                        "Catalog {} already exists",
                        catalog.name
                    )));
                }
                write(catalogs, &catalog_key, &catalog)?;
                if databases.get(&default_db_key)?.is_none() {
                    write(databases, &default_db_key, &default_db)?;
                    counter::add(children, &catalog_key, 1)?;
                }
                Ok(())
            },
        );

        finish(result).inspect_err(|e| warn!(catalog = %catalog.name, error = %e, "Rejected catalog creation"))?;
        info!(catalog = %catalog.name, location = %catalog.location_uri, "Created catalog");
        Ok(catalog)
    }

    /// Get a catalog by name.
    pub fn get_catalog(&self, name: &str) -> Result<Option<CatalogDef>, Error> {
        debug!(catalog = %name, "Looking up catalog");
        get(&self.catalogs, &keys::catalog(name))
    }

    /// List every catalog, ordered by lower-cased name.
    pub fn list_catalogs(&self) -> Result<Vec<CatalogDef>, Error> {
        scan(&self.catalogs, &[])
    }

    /// Drop an empty catalog.
    ///
    /// A catalog is empty when its only database is an empty `default`.
    /// Returns whether a catalog was removed. An absent catalog is an error
    /// unless `ignore_unknown` is set.
    pub fn drop_catalog(&self, name: &str, ignore_unknown: bool) -> Result<bool, Error> {
        if name.eq_ignore_ascii_case(&self.default_catalog) {
            return Err(Error::InvalidOperation(format!(
                "Cannot drop the default catalog {}",
                name
            )));
        }

        let catalog_key = keys::catalog(name);
        let default_db_key = keys::database(&DatabaseRef::new(name, DEFAULT_DATABASE_NAME));

        let result: Result<bool, TransactionError<Error>> = (&self.catalogs, &self.databases, &self.children)
            .transaction(|(catalogs, databases, children)| {
                if catalogs.get(&catalog_key)?.is_none() {
                    return Ok(false);
                }
                let has_default = databases.get(&default_db_key)?.is_some();
                if counter::read(children, &catalog_key)? > u64::from(has_default)
                    || counter::read(children, &default_db_key)? > 0
                {
                    return abort(Error::InvalidOperation(format!(
                        "Cannot drop catalog {} because it is not empty",
                        name
                    )));
                }

                catalogs.remove(catalog_key.as_slice())?;
                databases.remove(default_db_key.as_slice())?;
                counter::clear(children, &catalog_key)?;
                counter::clear(children, &default_db_key)?;
                Ok(true)
            });

        let dropped = finish(result).inspect_err(|e| warn!(catalog = %name, error = %e, "Rejected catalog drop"))?;
        if dropped {
            info!(catalog = %name, "Dropped catalog");
        } else if !ignore_unknown {
            return Err(Error::NotFound(format!("Catalog {} does not exist", name)));
        }
        Ok(dropped)
    }

    // ---- databases ----

    /// Create a database.
    ///
    /// A database without a location is placed at `<catalog root>/<name>.db`;
    /// a catalog's `default` database takes the catalog root itself.
    pub fn create_database(&self, database: DatabaseDef) -> Result<DatabaseDef, Error> {
        if database.name.trim().is_empty() {
            return Err(Error::InvalidSchemaObject("Database name cannot be empty".to_string()));
        }

        let catalog_key = keys::catalog(&database.catalog);
        let database_key = keys::database(&database.database_ref());

        let result = (&self.catalogs, &self.databases, &self.children).transaction(|(catalogs, databases, children)| {
            let Some(catalog) = read::<CatalogDef>(catalogs, &catalog_key)? else {
                return abort(Error::InvalidSchemaObject(format!(
                    "Catalog {} does not exist",
                    database.catalog
                )));
            };
            if databases.get(&database_key)?.is_some() {
                return abort(Error::AlreadyExists(format!(
                    "Database {} already exists",
                    database.database_ref()
                )));
            }

            let mut created = database.clone();
            if created.location_uri.is_none() {
                created.location_uri = Some(if created.name.eq_ignore_ascii_case(DEFAULT_DATABASE_NAME) {
                    catalog.location_uri.clone()
                } else {
                    join_location(&catalog.location_uri, &format!("{}.db", created.name.to_lowercase()))
                });
            }
            write(databases, &database_key, &created)?;
            counter::add(children, &catalog_key, 1)?;
            Ok(created)
        });

        let created = finish(result)
            .inspect_err(|e| warn!(database = %database.database_ref(), error = %e, "Rejected database creation"))?;
        info!(
            database = %created.database_ref(),
            location = created.location_uri.as_deref().unwrap_or_default(),
            "Created database"
        );
        Ok(created)
    }

    /// Get a database.
    pub fn get_database(&self, database: &DatabaseRef) -> Result<Option<DatabaseDef>, Error> {
        debug!(database = %database, "Looking up database");
        get(&self.databases, &keys::database(database))
    }

    /// List the databases of a catalog. Empty when the catalog is absent.
    pub fn list_databases(&self, catalog: &str) -> Result<Vec<DatabaseDef>, Error> {
        scan(&self.databases, &keys::databases_of(catalog))
    }

    /// Drop a database.
    ///
    /// Without `cascade` a database holding tables is refused; with it every
    /// table goes in the same transaction as the database.
    pub fn drop_database(
        &self,
        database: &DatabaseRef,
        ignore_unknown: bool,
        cascade: bool,
    ) -> Result<Option<DroppedDatabase>, Error> {
        if database.database.eq_ignore_ascii_case(DEFAULT_DATABASE_NAME) {
            return Err(Error::InvalidOperation(format!(
                "Cannot drop the default database of catalog {}",
                database.catalog
            )));
        }

        let database_key = keys::database(database);
        let catalog_key = keys::catalog(&database.catalog);

        let dropped = until_current(database, || {
            let mut snapshot = Vec::new();
            for table_key in scan_keys(&self.tables, &keys::children(&database_key))? {
                let partition_keys = self.partition_keys(&table_key)?;
                snapshot.push((table_key, partition_keys));
            }

            let result = (
                &self.databases,
                &self.tables,
                &self.constraints,
                &self.partitions,
                &self.children,
            )
                .transaction(|(databases, tables, constraint_sets, partitions, children)| {
                    let Some(def) = read::<DatabaseDef>(databases, &database_key)? else {
                        return Ok(Attempt::Done(None));
                    };
                    if counter::read(children, &database_key)? != snapshot.len() as u64 {
                        return Ok(Attempt::Stale);
                    }
                    if !snapshot.is_empty() && !cascade {
                        return abort(Error::InvalidOperation(format!(
                            "Database {} is not empty. One or more tables exist.",
                            database
                        )));
                    }

                    let mut defs = Vec::with_capacity(snapshot.len());
                    for (table_key, partition_keys) in &snapshot {
                        let Some(table) = read::<TableDef>(tables, table_key)? else {
                            return Ok(Attempt::Stale);
                        };
                        if !partitions_current(partitions, children, table_key, partition_keys)? {
                            return Ok(Attempt::Stale);
                        }
                        defs.push(table);
                    }

                    let mut dropped_tables = Vec::with_capacity(defs.len());
                    for ((table_key, partition_keys), table) in snapshot.iter().zip(defs) {
                        dropped_tables.push(remove_table(
                            tables,
                            constraint_sets,
                            partitions,
                            children,
                            table_key,
                            table,
                            partition_keys,
                        )?);
                    }
                    databases.remove(database_key.as_slice())?;
                    counter::clear(children, &database_key)?;
                    counter::add(children, &catalog_key, -1)?;

                    Ok(Attempt::Done(Some(DroppedDatabase {
                        database: def,
                        tables: dropped_tables,
                    })))
                });
            finish(result)
        })
        .inspect_err(|e| warn!(database = %database, error = %e, "Rejected database drop"))?;

        match dropped {
            Some(dropped) => {
                info!(database = %database, tables = dropped.tables.len(), "Dropped database");
                Ok(Some(dropped))
            }
            None if ignore_unknown => Ok(None),
            None => Err(Error::NotFound(format!("Database {} does not exist", database))),
        }
    }

    /// Partition keys of a table, read outside any transaction.
    pub(super) fn partition_keys(&self, table_key: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        scan_keys(&self.partitions, &keys::children(table_key))
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.catalogs.flush()?;
        self.databases.flush()?;
        self.tables.flush()?;
        self.partitions.flush()?;
        self.constraints.flush()?;
        self.children.flush()?;
        self.row_counts.flush()?;
        self.layout_epochs.flush()?;
        self.meta.flush()?;
        Ok(())
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    pub(crate) fn test_store() -> CatalogStore {
        test_db_and_store().1
    }

    /// A store together with its database, for tests that also write rows.
    pub(crate) fn test_db_and_store() -> (Db, CatalogStore) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let config = StoreConfig::temporary().with_warehouse("file:/wh");
        let store = CatalogStore::open(&db, &config).unwrap();
        (db, store)
    }

    pub(crate) fn child_count(store: &CatalogStore, parent: &[u8]) -> u64 {
        counter::get(&store.children, parent).unwrap()
    }

    #[test]
    fn test_bootstrap_default_catalog() {
        let store = test_store();

        let hive = store.get_catalog("hive").unwrap().unwrap();
        assert_eq!(hive.location_uri, "file:/wh");

        let default_db = store.get_database(&DatabaseRef::new("hive", "default")).unwrap().unwrap();
        assert_eq!(default_db.location_uri.as_deref(), Some("file:/wh"));
    }

    #[test]
    fn test_reopen_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path()).with_warehouse("file:/wh");

        {
            let db = config.open_db().unwrap();
            let store = CatalogStore::open(&db, &config).unwrap();
            store
                .create_catalog(CatalogDef::new("other_hive", "file:/other"))
                .unwrap();
            store.flush().unwrap();
        }

        let db = config.open_db().unwrap();
        let store = CatalogStore::open(&db, &config).unwrap();
        let names: Vec<String> = store.list_catalogs().unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["hive".to_string(), "other_hive".to_string()]);
    }

    #[test]
    fn test_create_catalog_creates_default_database() {
        let store = test_store();
        store.create_catalog(CatalogDef::new("Other_Hive", "file:/other")).unwrap();

        let dbs = store.list_databases("other_hive").unwrap();
        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].name, "default");
        assert_eq!(dbs[0].location_uri.as_deref(), Some("file:/other"));

        let dup = store.create_catalog(CatalogDef::new("OTHER_HIVE", "file:/x"));
        assert!(matches!(dup, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_catalog_requires_location() {
        let store = test_store();
        let result = store.create_catalog(CatalogDef::new("nowhere", ""));
        assert!(matches!(result, Err(Error::InvalidSchemaObject(_))));
    }

    #[test]
    fn test_database_location_derived_under_catalog() {
        let store = test_store();
        store.create_catalog(CatalogDef::new("other_hive", "file:/other/")).unwrap();

        let db = store
            .create_database(DatabaseDef::new("DB_OTHER_CAT").in_catalog("other_hive"))
            .unwrap();
        assert_eq!(db.location_uri.as_deref(), Some("file:/other/db_other_cat.db"));

        let explicit = store
            .create_database(DatabaseDef::new("placed").with_location("file:/elsewhere"))
            .unwrap();
        assert_eq!(explicit.location_uri.as_deref(), Some("file:/elsewhere"));
    }

    #[test]
    fn test_database_needs_catalog() {
        let store = test_store();
        let result = store.create_database(DatabaseDef::new("db").in_catalog("missing"));
        assert!(matches!(result, Err(Error::InvalidSchemaObject(_))));
        assert!(store.list_databases("missing").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_database_case_insensitive() {
        let store = test_store();
        store.create_database(DatabaseDef::new("sales")).unwrap();
        let result = store.create_database(DatabaseDef::new("SALES"));
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_drop_catalog_rules() {
        let store = test_store();

        assert!(matches!(store.drop_catalog("hive", true), Err(Error::InvalidOperation(_))));
        assert!(matches!(store.drop_catalog("missing", false), Err(Error::NotFound(_))));
        assert!(!store.drop_catalog("missing", true).unwrap());

        store.create_catalog(CatalogDef::new("other_hive", "file:/other")).unwrap();
        store
            .create_database(DatabaseDef::new("db1").in_catalog("other_hive"))
            .unwrap();
        assert!(matches!(
            store.drop_catalog("other_hive", false),
            Err(Error::InvalidOperation(_))
        ));

        store
            .drop_database(&DatabaseRef::new("other_hive", "db1"), false, false)
            .unwrap();
        assert!(store.drop_catalog("other_hive", false).unwrap());
        assert!(store.get_catalog("other_hive").unwrap().is_none());
        assert!(store.list_databases("other_hive").unwrap().is_empty());
    }

    #[test]
    fn test_drop_catalog_refused_with_table_in_default_database() {
        let store = test_store();
        store.create_catalog(CatalogDef::new("other_hive", "file:/other")).unwrap();
        let t = store
            .create_table(
                TableDef::new("t")
                    .in_database("other_hive", "default")
                    .with_column("c", "int"),
            )
            .unwrap()
            .table_ref();

        assert!(matches!(
            store.drop_catalog("other_hive", false),
            Err(Error::InvalidOperation(_))
        ));
        assert!(store.get_catalog("other_hive").unwrap().is_some());
        assert!(store.get_table(&t).unwrap().is_some());

        store.drop_table(&t, false).unwrap();
        assert!(store.drop_catalog("other_hive", false).unwrap());
    }

    #[test]
    fn test_child_counters_follow_creates_and_drops() {
        let store = test_store();
        let catalog_key = keys::catalog("hive");
        assert_eq!(child_count(&store, &catalog_key), 1);

        store.create_database(DatabaseDef::new("sales")).unwrap();
        assert_eq!(child_count(&store, &catalog_key), 2);

        let db = DatabaseRef::new("hive", "sales");
        let database_key = keys::database(&db);
        let t = store
            .create_table(
                TableDef::new("orders")
                    .in_database("hive", "sales")
                    .with_column("id", "bigint")
                    .with_partition_key("ds", "string"),
            )
            .unwrap()
            .table_ref();
        let table_key = keys::table(&t);
        for ds in ["1", "2"] {
            store.add_partition(PartitionDef::new(&t, [ds])).unwrap();
        }
        assert_eq!(child_count(&store, &database_key), 1);
        assert_eq!(child_count(&store, &table_key), 2);

        store.drop_partition(&t, &["1".to_string()], false).unwrap();
        assert_eq!(child_count(&store, &table_key), 1);

        let dropped = store.drop_database(&db, false, true).unwrap().unwrap();
        assert_eq!(dropped.tables[0].partitions.len(), 1);
        assert_eq!(child_count(&store, &table_key), 0);
        assert_eq!(child_count(&store, &database_key), 0);
        assert_eq!(child_count(&store, &catalog_key), 1);
    }

    #[test]
    fn test_drop_database_with_concurrent_creates() {
        let store = test_store();
        store.create_database(DatabaseDef::new("sales")).unwrap();
        let db = DatabaseRef::new("hive", "sales");

        std::thread::scope(|scope| {
            let creator = scope.spawn(|| {
                for i in 0..20 {
                    let table = TableDef::new(format!("t{}", i))
                        .in_database("hive", "sales")
                        .with_column("c", "int");
                    let _ = store.create_table(table);
                }
            });
            let dropper = scope.spawn(|| store.drop_database(&db, true, true));
            creator.join().unwrap();
            match dropper.join().unwrap() {
                Ok(_) | Err(Error::Conflict(_)) => {}
                Err(e) => panic!("unexpected drop failure: {}", e),
            }
        });

        // Whatever survived the race is counted exactly.
        let left = store.list_tables(&db).unwrap().len() as u64;
        assert_eq!(child_count(&store, &keys::database(&db)), left);
        if store.get_database(&db).unwrap().is_none() {
            assert_eq!(left, 0);
        }

        store.drop_database(&db, true, true).unwrap();
        assert!(store.list_tables(&db).unwrap().is_empty());
        assert_eq!(child_count(&store, &keys::database(&db)), 0);
    }

    #[test]
    fn test_drop_database_rules() {
        let store = test_store();
        let default = DatabaseRef::new("hive", "default");
        assert!(matches!(
            store.drop_database(&default, true, true),
            Err(Error::InvalidOperation(_))
        ));

        let missing = DatabaseRef::new("hive", "missing");
        assert!(store.drop_database(&missing, true, false).unwrap().is_none());
        assert!(matches!(
            store.drop_database(&missing, false, false),
            Err(Error::NotFound(_))
        ));
    }
}
