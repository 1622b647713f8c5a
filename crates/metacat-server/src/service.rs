//! Catalog service: one entry point per catalog operation.
//!
//! The service owns the catalog store and the row store, sequences them into
//! single logical operations and applies the data side of drops. It holds no
//! cache of its own; every call reads and writes through the store.

use metacat_core::proto::{
    CatalogDef, ColumnPredicate, ConstraintDef, ConstraintType, DatabaseDef, DatabaseRef,
    PartitionDef, Row, ScanResult, SkewSpec, SkewedInfo, TableConstraints, TableDef, TableRef,
    TableType,
};
use metacat_core::{CatalogStore, DataLayout, DroppedTable, RowStore, StoreConfig};
use tracing::{debug, info};

use crate::error::Error;

/// Catalog service over one store.
pub struct CatalogService {
    catalog: CatalogStore,
    rows: RowStore,
}

impl CatalogService {
    /// Open the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, Error> {
        let db = config.open_db()?;
        let catalog = CatalogStore::open(&db, config)?;
        let rows = RowStore::open(&db)?;
        Ok(Self { catalog, rows })
    }

    /// Open an in-memory store rooted at `warehouse`.
    pub fn temporary(warehouse: &str) -> Result<Self, Error> {
        Self::open(&StoreConfig::temporary().with_warehouse(warehouse))
    }

    /// Name of the catalog bootstrapped on first open.
    pub fn default_catalog(&self) -> &str {
        self.catalog.default_catalog()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(self.catalog.flush()?)
    }

    // Catalogs

    pub fn create_catalog(&self, catalog: CatalogDef) -> Result<CatalogDef, Error> {
        Ok(self.catalog.create_catalog(catalog)?)
    }

    pub fn get_catalog(&self, name: &str) -> Result<Option<CatalogDef>, Error> {
        Ok(self.catalog.get_catalog(name)?)
    }

    pub fn list_catalogs(&self) -> Result<Vec<CatalogDef>, Error> {
        Ok(self.catalog.list_catalogs()?)
    }

    /// Drop an empty catalog. `false` when it was absent and `ignore_unknown` is set.
    pub fn drop_catalog(&self, name: &str, ignore_unknown: bool) -> Result<bool, Error> {
        Ok(self.catalog.drop_catalog(name, ignore_unknown)?)
    }

    // Databases

    pub fn create_database(&self, database: DatabaseDef) -> Result<DatabaseDef, Error> {
        Ok(self.catalog.create_database(database)?)
    }

    pub fn get_database(&self, database: &DatabaseRef) -> Result<Option<DatabaseDef>, Error> {
        Ok(self.catalog.get_database(database)?)
    }

    pub fn list_databases(&self, catalog: &str) -> Result<Vec<DatabaseDef>, Error> {
        Ok(self.catalog.list_databases(catalog)?)
    }

    /// Drop a database, and with `cascade` every table in it.
    ///
    /// With `delete_data` the rows of every dropped managed table go too.
    pub fn drop_database(
        &self,
        database: &DatabaseRef,
        delete_data: bool,
        ignore_unknown: bool,
        cascade: bool,
    ) -> Result<bool, Error> {
        let Some(dropped) = self.catalog.drop_database(database, ignore_unknown, cascade)? else {
            return Ok(false);
        };
        if delete_data {
            for table in &dropped.tables {
                self.delete_table_data(table)?;
            }
        }
        Ok(true)
    }

    // Tables

    pub fn create_table(&self, table: TableDef) -> Result<TableDef, Error> {
        Ok(self.catalog.create_table(table)?)
    }

    /// Create a table and its constraints atomically.
    ///
    /// A rejected constraint leaves no table behind.
    pub fn create_table_with_constraints(
        &self,
        table: TableDef,
        constraints: TableConstraints,
    ) -> Result<(TableDef, Vec<ConstraintDef>), Error> {
        Ok(self.catalog.create_table_with_constraints(table, constraints)?)
    }

    pub fn get_table(&self, table: &TableRef) -> Result<Option<TableDef>, Error> {
        Ok(self.catalog.get_table(table)?)
    }

    /// Table names of a database, optionally filtered by a `*`/`|` pattern.
    pub fn list_tables(&self, database: &DatabaseRef, pattern: Option<&str>) -> Result<Vec<String>, Error> {
        let names = match pattern {
            Some(pattern) => self.catalog.list_tables_matching(database, pattern)?,
            None => self.catalog.list_tables(database)?,
        };
        Ok(names)
    }

    pub fn alter_table(&self, table: TableDef) -> Result<TableDef, Error> {
        Ok(self.catalog.alter_table(table)?)
    }

    /// Drop a table with its partitions and constraints.
    ///
    /// Rows are deleted only for managed tables and only with `delete_data`.
    pub fn drop_table(&self, table: &TableRef, delete_data: bool, ignore_unknown: bool) -> Result<bool, Error> {
        let Some(dropped) = self.catalog.drop_table(table, ignore_unknown)? else {
            return Ok(false);
        };
        if delete_data {
            self.delete_table_data(&dropped)?;
        }
        Ok(true)
    }

    // Partitions

    pub fn add_partition(&self, partition: PartitionDef) -> Result<PartitionDef, Error> {
        Ok(self.catalog.add_partition(partition)?)
    }

    pub fn get_partition(&self, table: &TableRef, values: &[String]) -> Result<Option<PartitionDef>, Error> {
        Ok(self.catalog.get_partition(table, values)?)
    }

    pub fn list_partitions(&self, table: &TableRef) -> Result<Vec<PartitionDef>, Error> {
        Ok(self.catalog.list_partitions(table)?)
    }

    pub fn drop_partition(
        &self,
        table: &TableRef,
        values: &[String],
        delete_data: bool,
        ignore_unknown: bool,
    ) -> Result<bool, Error> {
        let managed = self
            .catalog
            .get_table(table)?
            .is_some_and(|t| t.table_type == TableType::Managed);
        let Some(dropped) = self.catalog.drop_partition(table, values, ignore_unknown)? else {
            return Ok(false);
        };
        if delete_data && managed {
            if let Some(location) = &dropped.location {
                self.rows.delete_under(location)?;
            }
        }
        Ok(true)
    }

    // Constraints

    /// Add a batch of constraints, all or none.
    pub fn add_constraints(&self, batch: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        Ok(self.catalog.add_constraints(batch)?)
    }

    pub fn get_constraints(&self, table: &TableRef, constraint_type: ConstraintType) -> Result<Vec<ConstraintDef>, Error> {
        Ok(self.catalog.get_constraints(table, constraint_type)?)
    }

    pub fn get_table_constraints(&self, table: &TableRef) -> Result<TableConstraints, Error> {
        Ok(self.catalog.get_table_constraints(table)?)
    }

    pub fn get_foreign_keys_referencing(&self, parent: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        Ok(self.catalog.get_foreign_keys_referencing(parent)?)
    }

    pub fn drop_constraint(&self, table: &TableRef, name: &str) -> Result<ConstraintDef, Error> {
        Ok(self.catalog.drop_constraint(table, name)?)
    }

    // Skewed layout

    pub fn alter_table_skewed(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        spec: &SkewSpec,
    ) -> Result<SkewedInfo, Error> {
        Ok(self.catalog.alter_table_skewed(table, partition, spec)?)
    }

    /// Location of a skewed-value tuple. `None` when the table or partition is absent.
    pub fn resolve_location(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        values: &[String],
    ) -> Result<Option<String>, Error> {
        Ok(self.catalog.resolve_location(table, partition, values)?)
    }

    // Rows

    /// Insert rows into a table or partition.
    ///
    /// A missing partition of an existing table is created first; losing
    /// that creation to a concurrent insert is not an error. A skewed layout
    /// declared between reading the layout and writing the rows fails the
    /// call with a conflict, which the caller may resend.
    pub fn insert_rows(&self, table: &TableRef, partition: Option<&[String]>, rows: &[Row]) -> Result<u64, Error> {
        let Some((def, layout)) = self.layout_for_insert(table, partition)? else {
            return Err(metacat_core::Error::InvalidSchemaObject(format!("Table {} does not exist", table)).into());
        };
        Ok(self.rows.insert_rows(&def, &layout, rows)?)
    }

    fn layout_for_insert(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
    ) -> Result<Option<(TableDef, DataLayout)>, Error> {
        if let Some(found) = self.catalog.data_layout(table, partition)? {
            return Ok(Some(found));
        }
        let Some(values) = partition else {
            return Ok(None);
        };
        if self.catalog.get_table(table)?.is_none() {
            return Ok(None);
        }
        match self.catalog.add_partition(PartitionDef::new(table, values.iter().cloned())) {
            Ok(created) => debug!(table = %table, values = ?created.values, "Created partition for insert"),
            Err(metacat_core::Error::AlreadyExists(_)) => {
                debug!(table = %table, values = ?values, "Partition created concurrently")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(self.catalog.data_layout(table, partition)?)
    }

    /// Rows matching every predicate. Empty when the table or partition is absent.
    pub fn select(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        predicates: &[ColumnPredicate],
    ) -> Result<ScanResult, Error> {
        match self.catalog.data_layout(table, partition)? {
            Some((def, layout)) => Ok(self.rows.select(&def, &layout, predicates)?),
            None => Ok(ScanResult::default()),
        }
    }

    /// Replace the stored values of `columns` with NULL in a table or partition.
    pub fn truncate_columns(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        columns: &[String],
    ) -> Result<u64, Error> {
        let Some((def, layout)) = self.catalog.data_layout(table, partition)? else {
            return Err(metacat_core::Error::InvalidSchemaObject(format!(
                "Table {} or its partition does not exist",
                table
            ))
            .into());
        };
        Ok(self.rows.truncate_columns(&def, &layout, columns)?)
    }

    fn delete_table_data(&self, dropped: &DroppedTable) -> Result<(), Error> {
        if dropped.table.table_type != TableType::Managed {
            return Ok(());
        }
        let mut deleted = 0;
        for location in dropped.data_locations() {
            deleted += self.rows.delete_under(&location)?;
        }
        info!(table = %dropped.table.table_ref(), rows = deleted, "Deleted table data");
        Ok(())
    }
}
