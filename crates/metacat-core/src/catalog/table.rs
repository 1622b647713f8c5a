//! Catalog store: tables.

use std::collections::{HashMap, HashSet};

use metacat_proto::{
    ConstraintDef, ConstraintKind, DatabaseDef, DatabaseRef, PartitionDef, SkewSpec, SkewedInfo,
    TableConstraints, TableDef, TableRef,
};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Transactional;
use tracing::{debug, info, warn};

use super::drop::{partitions_current, remove_table, until_current, Attempt};
use super::keys;
use super::pattern;
use super::store::{CatalogStore, DroppedTable};
use crate::constraint::{parent_key, ConstraintValidator, ParentTable};
use crate::error::Error;
use crate::skew::{self, DataLayout};
use crate::storage::counter;
use crate::storage::join_location;
use crate::storage::txn::{abort, finish, get, now_secs, read, scan, write, TxResult};

impl CatalogStore {
    /// Create a table without constraints.
    pub fn create_table(&self, table: TableDef) -> Result<TableDef, Error> {
        self.create_table_with_constraints(table, TableConstraints::default())
            .map(|(table, _)| table)
    }

    /// Create a table and its constraints in one transaction.
    ///
    /// If any constraint is rejected the table is not created. Returns the
    /// stored table and the named constraints.
    pub fn create_table_with_constraints(
        &self,
        table: TableDef,
        constraints: TableConstraints,
    ) -> Result<(TableDef, Vec<ConstraintDef>), Error> {
        validate_table_shape(&table)?;

        let table_ref = table.table_ref();
        let database_key = keys::database(&table_ref.database_ref());
        let table_key = keys::table(&table_ref);
        let batch = constraints.into_list();

        let result = (&self.databases, &self.tables, &self.constraints, &self.children).transaction(
            |(databases, tables, constraint_sets, children)| {
                let Some(database) = read::<DatabaseDef>(databases, &database_key)? else {
                    return abort(Error::InvalidSchemaObject(format!(
                        "Database {} does not exist",
                        table_ref.database_ref()
                    )));
                };
                if tables.get(&table_key)?.is_some() {
                    return abort(Error::AlreadyExists(format!("Table {} already exists", table_ref)));
                }

                let mut created = table.clone();
                if created.location.is_none() {
                    let base = database.location_uri.clone().unwrap_or_default();
                    created.location = Some(join_location(&base, &created.name.to_lowercase()));
                }
                created.create_time = now_secs();
                write(tables, &table_key, &created)?;

                let parents = load_parents(tables, constraint_sets, &table_ref, &batch)?;
                let existing = TableConstraints::default();
                let prepared = ConstraintValidator::new(&created, &existing, &parents)
                    .prepare(batch.clone())
                    .map_err(ConflictableTransactionError::Abort)?;
                if !prepared.is_empty() {
                    write(
                        constraint_sets,
                        &table_key,
                        &TableConstraints::from_list(prepared.clone()),
                    )?;
                }
                counter::add(children, &database_key, 1)?;
                Ok((created, prepared))
            },
        );

        let (created, prepared) = finish(result)
            .inspect_err(|e| warn!(table = %table_ref, error = %e, "Rejected table creation"))?;
        info!(
            table = %table_ref,
            location = created.location.as_deref().unwrap_or_default(),
            constraints = prepared.len(),
            "Created table"
        );
        Ok((created, prepared))
    }

    /// Get a table.
    pub fn get_table(&self, table: &TableRef) -> Result<Option<TableDef>, Error> {
        debug!(table = %table, "Looking up table");
        get(&self.tables, &keys::table(table))
    }

    /// Table names of a database, ordered by lower-cased name. Empty when the
    /// database is absent.
    pub fn list_tables(&self, database: &DatabaseRef) -> Result<Vec<String>, Error> {
        Ok(self
            .list_table_defs(database)?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    /// Table names matching a `*` / `|` pattern.
    pub fn list_tables_matching(&self, database: &DatabaseRef, pattern: &str) -> Result<Vec<String>, Error> {
        Ok(self
            .list_tables(database)?
            .into_iter()
            .filter(|name| pattern::matches(pattern, name))
            .collect())
    }

    pub(super) fn list_table_defs(&self, database: &DatabaseRef) -> Result<Vec<TableDef>, Error> {
        scan(&self.tables, &keys::tables_of(database))
    }

    /// Replace the columns, parameters and owner of an existing table.
    ///
    /// Stored rows are positional, so existing columns keep their names and
    /// order; only their types may change and new columns may only be
    /// appended. Partition keys cannot change.
    pub fn alter_table(&self, table: TableDef) -> Result<TableDef, Error> {
        validate_table_shape(&table)?;

        let table_ref = table.table_ref();
        let table_key = keys::table(&table_ref);

        let result = (&self.tables, &self.constraints).transaction(|(tables, constraint_sets)| {
            let Some(mut current) = read::<TableDef>(tables, &table_key)? else {
                return abort(Error::InvalidSchemaObject(format!(
                    "Table {} does not exist; alter is not possible",
                    table_ref
                )));
            };

            if current.partition_keys != table.partition_keys {
                return abort(Error::InvalidOperation(format!(
                    "Partition keys of {} cannot be changed",
                    table_ref
                )));
            }

            let kept = current
                .columns
                .iter()
                .zip(&table.columns)
                .position(|(old, new)| !old.name.eq_ignore_ascii_case(&new.name))
                .or_else(|| (table.columns.len() < current.columns.len()).then_some(table.columns.len()));
            if let Some(position) = kept {
                let column = &current.columns[position].name;
                let constraints = read::<TableConstraints>(constraint_sets, &table_key)?.unwrap_or_default();
                let holder = constraints
                    .iter()
                    .find(|c| c.columns.iter().any(|name| name.eq_ignore_ascii_case(column)));
                return abort(Error::InvalidOperation(match holder {
                    Some(constraint) => format!(
                        "Column {} of {} is used by constraint {} and cannot be removed or moved",
                        column,
                        table_ref,
                        constraint.name().unwrap_or_default()
                    ),
                    None => format!(
                        "Column {} of {} cannot be removed or moved; new columns may only be appended",
                        column, table_ref
                    ),
                }));
            }

            current.columns = table.columns.clone();
            current.parameters = table.parameters.clone();
            current.owner = table.owner.clone();
            write(tables, &table_key, &current)?;
            Ok(current)
        });

        let altered = finish(result)
            .inspect_err(|e| warn!(table = %table_ref, error = %e, "Rejected table alteration"))?;
        info!(table = %table_ref, columns = altered.columns.len(), "Altered table");
        Ok(altered)
    }

    /// Drop a table with its partitions and constraints.
    ///
    /// Returns `None` when the table was absent and `ignore_unknown` is set.
    /// Foreign keys in other tables that reference this table are left in place.
    pub fn drop_table(&self, table: &TableRef, ignore_unknown: bool) -> Result<Option<DroppedTable>, Error> {
        let table_key = keys::table(table);
        let database_key = keys::database(&table.database_ref());

        let dropped = until_current(table, || {
            let partition_keys = self.partition_keys(&table_key)?;
            let result = (&self.tables, &self.constraints, &self.partitions, &self.children).transaction(
                |(tables, constraint_sets, partitions, children)| {
                    let Some(def) = read::<TableDef>(tables, &table_key)? else {
                        return Ok(Attempt::Done(None));
                    };
                    if !partitions_current(partitions, children, &table_key, &partition_keys)? {
                        return Ok(Attempt::Stale);
                    }
                    let dropped = remove_table(
                        tables,
                        constraint_sets,
                        partitions,
                        children,
                        &table_key,
                        def,
                        &partition_keys,
                    )?;
                    counter::add(children, &database_key, -1)?;
                    Ok(Attempt::Done(Some(dropped)))
                },
            );
            finish(result)
        })?;

        match dropped {
            Some(dropped) => {
                info!(table = %table, partitions = dropped.partitions.len(), "Dropped table");
                Ok(Some(dropped))
            }
            None if ignore_unknown => Ok(None),
            None => Err(Error::NotFound(format!("Table {} does not exist", table))),
        }
    }

    /// Declare the skewed layout of a table, or of one partition when
    /// `partition` is given.
    ///
    /// A layout is declared once, before any rows are stored at its base
    /// location. Declaring it moves the base location's layout epoch, so row
    /// writes routed with the old layout are refused.
    pub fn alter_table_skewed(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        spec: &SkewSpec,
    ) -> Result<SkewedInfo, Error> {
        let table_key = keys::table(table);

        let result = match partition {
            None => (&self.tables, &self.row_counts, &self.layout_epochs).transaction(
                |(tables, row_counts, epochs)| {
                    let Some(mut def) = read::<TableDef>(tables, &table_key)? else {
                        return abort(Error::InvalidSchemaObject(format!("Table {} does not exist", table)));
                    };
                    let base = def.location.clone().unwrap_or_default();
                    check_layout_open(def.skewed.is_some(), row_counts, &base, &table.to_string())?;
                    let info = skew::declare(&base, &def, spec).map_err(ConflictableTransactionError::Abort)?;
                    def.skewed = Some(info.clone());
                    write(tables, &table_key, &def)?;
                    counter::add(epochs, base.as_bytes(), 1)?;
                    Ok(info)
                },
            ),
            Some(values) => {
                let partition_key = keys::partition(table, values);
                (&self.tables, &self.partitions, &self.row_counts, &self.layout_epochs).transaction(
                    |(tables, partitions, row_counts, epochs)| {
                        let Some(def) = read::<TableDef>(tables, &table_key)? else {
                            return abort(Error::InvalidSchemaObject(format!("Table {} does not exist", table)));
                        };
                        let Some(mut part) = read::<PartitionDef>(partitions, &partition_key)? else {
                            return abort(Error::InvalidSchemaObject(format!(
                                "Partition ({}) of {} does not exist",
                                values.join(", "),
                                table
                            )));
                        };
                        let base = part.location.clone().unwrap_or_default();
                        let object = format!("partition ({}) of {}", values.join(", "), table);
                        check_layout_open(part.skewed.is_some(), row_counts, &base, &object)?;
                        let info = skew::declare(&base, &def, spec).map_err(ConflictableTransactionError::Abort)?;
                        part.skewed = Some(info.clone());
                        write(partitions, &partition_key, &part)?;
                        counter::add(epochs, base.as_bytes(), 1)?;
                        Ok(info)
                    },
                )
            }
        };

        let info = finish(result)
            .inspect_err(|e| warn!(table = %table, error = %e, "Rejected skew declaration"))?;
        info!(
            table = %table,
            columns = ?info.columns,
            tuples = info.values.len(),
            "Declared skewed layout"
        );
        Ok(info)
    }

    /// Physical layout of a table, or of one of its partitions.
    ///
    /// `None` when the table or partition is absent. Partitioned tables need
    /// a partition; unpartitioned tables must not get one. The layout carries
    /// the epoch its base location had when it was read.
    pub fn data_layout(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
    ) -> Result<Option<(TableDef, DataLayout)>, Error> {
        let table_key = keys::table(table);
        let partition_key = partition.map(|values| keys::partition(table, values));

        let result = (&self.tables, &self.partitions, &self.layout_epochs).transaction(
            |(tables, partitions, epochs)| {
                let Some(def) = read::<TableDef>(tables, &table_key)? else {
                    return Ok(None);
                };
                let layout = match (def.is_partitioned(), &partition_key) {
                    (false, None) => DataLayout::for_table(&def),
                    (true, Some(key)) => match read::<PartitionDef>(partitions, key)? {
                        Some(p) => DataLayout::for_partition(&p),
                        None => return Ok(None),
                    },
                    (true, None) => {
                        return abort(Error::InvalidOperation(format!(
                            "Table {} is partitioned; a partition must be specified",
                            table
                        )))
                    }
                    (false, Some(_)) => {
                        return abort(Error::InvalidOperation(format!("Table {} is not partitioned", table)))
                    }
                };
                let epoch = counter::read(epochs, layout.base_location().as_bytes())?;
                Ok(Some((def, layout.with_epoch(epoch))))
            },
        );
        finish(result)
    }

    /// Storage location for a tuple of skewed-column values.
    ///
    /// `None` when the table or partition is absent.
    pub fn resolve_location(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        values: &[String],
    ) -> Result<Option<String>, Error> {
        Ok(self
            .data_layout(table, partition)?
            .map(|(_, layout)| layout.resolve(values).to_string()))
    }
}

/// Refuse a skew declaration on a layout that is already declared or
/// already holds rows at its base location.
fn check_layout_open(
    declared: bool,
    row_counts: &TransactionalTree,
    base: &str,
    object: &str,
) -> TxResult<()> {
    if declared {
        return abort(Error::InvalidOperation(format!(
            "Skewed layout of {} is already declared",
            object
        )));
    }
    let rows = counter::read(row_counts, base.as_bytes())?;
    if rows > 0 {
        return abort(Error::InvalidOperation(format!(
            "{} already holds {} rows at {}; its skewed layout can no longer be declared",
            object, rows, base
        )));
    }
    Ok(())
}

/// Load every foreign-key parent of `batch` other than `table` itself.
/// Absent parents are left out and rejected by the validator.
pub(super) fn load_parents(
    tables: &TransactionalTree,
    constraint_sets: &TransactionalTree,
    table: &TableRef,
    batch: &[ConstraintDef],
) -> TxResult<HashMap<String, ParentTable>> {
    let mut parents = HashMap::new();
    for constraint in batch {
        let ConstraintKind::ForeignKey { references, .. } = &constraint.kind else {
            continue;
        };
        let key = parent_key(references);
        if references.same_table(table) || parents.contains_key(&key) {
            continue;
        }

        let parent_table_key = keys::table(references);
        if let Some(parent) = read::<TableDef>(tables, &parent_table_key)? {
            let constraints = read::<TableConstraints>(constraint_sets, &parent_table_key)?.unwrap_or_default();
            parents.insert(
                key,
                ParentTable {
                    table: parent,
                    constraints,
                },
            );
        }
    }
    Ok(parents)
}

fn validate_table_shape(table: &TableDef) -> Result<(), Error> {
    if table.name.trim().is_empty() {
        return Err(Error::InvalidSchemaObject("Table name cannot be empty".to_string()));
    }
    if table.columns.is_empty() {
        return Err(Error::InvalidSchemaObject(format!(
            "Table {} must have at least one column",
            table.table_ref()
        )));
    }

    let mut seen = HashSet::new();
    for column in table.columns.iter().chain(&table.partition_keys) {
        if column.name.trim().is_empty() {
            return Err(Error::InvalidSchemaObject(format!(
                "Table {} has a column without a name",
                table.table_ref()
            )));
        }
        if !seen.insert(column.name.to_lowercase()) {
            return Err(Error::InvalidSchemaObject(format!(
                "Duplicate column {} in table {}",
                column.name,
                table.table_ref()
            )));
        }
    }
    Ok(())
}
