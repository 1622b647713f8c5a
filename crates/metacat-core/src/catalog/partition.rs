//! Catalog store: partitions.

use metacat_proto::{partition_name, PartitionDef, TableDef, TableRef};
use sled::Transactional;
use tracing::{debug, info, warn};

use super::keys;
use super::store::CatalogStore;
use crate::error::Error;
use crate::skew;
use crate::storage::counter;
use crate::storage::join_location;
use crate::storage::txn::{abort, finish, get, now_secs, read, scan, write};

impl CatalogStore {
    /// Add a partition to a partitioned table.
    ///
    /// Without an explicit location the partition lives at
    /// `<table location>/<k1=v1/...>`. A skewed table hands its skew
    /// declaration down, re-homed under the partition location.
    pub fn add_partition(&self, partition: PartitionDef) -> Result<PartitionDef, Error> {
        let table_ref = partition.table_ref();
        let table_key = keys::table(&table_ref);
        let partition_key = keys::partition(&table_ref, &partition.values);

        let result = (&self.tables, &self.partitions, &self.children).transaction(|(tables, partitions, children)| {
            let Some(table) = read::<TableDef>(tables, &table_key)? else {
                return abort(Error::InvalidSchemaObject(format!("Table {} does not exist", table_ref)));
            };
            if !table.is_partitioned() {
                return abort(Error::InvalidSchemaObject(format!(
                    "Table {} is not partitioned",
                    table_ref
                )));
            }
            if partition.values.len() != table.partition_keys.len() {
                return abort(Error::InvalidSchemaObject(format!(
                    "Partition of {} needs {} values, got {}",
                    table_ref,
                    table.partition_keys.len(),
                    partition.values.len()
                )));
            }
            if partition.values.iter().any(|v| v.is_empty()) {
                return abort(Error::InvalidSchemaObject(format!(
                    "Partition values of {} cannot be empty",
                    table_ref
                )));
            }
            if partitions.get(&partition_key)?.is_some() {
                return abort(Error::AlreadyExists(format!(
                    "Partition {} of {} already exists",
                    partition_name(&table.partition_keys, &partition.values),
                    table_ref
                )));
            }

            let mut created = partition.clone();
            let location = match &created.location {
                Some(location) => location.clone(),
                None => join_location(
                    table.location.as_deref().unwrap_or_default(),
                    &partition_name(&table.partition_keys, &created.values),
                ),
            };
            if created.skewed.is_none() {
                created.skewed = table.skewed.as_ref().map(|info| skew::relocate(info, &location));
            }
            created.location = Some(location);
            created.create_time = now_secs();
            write(partitions, &partition_key, &created)?;
            counter::add(children, &table_key, 1)?;
            Ok(created)
        });

        let created = finish(result)
            .inspect_err(|e| warn!(table = %table_ref, error = %e, "Rejected partition"))?;
        info!(
            table = %table_ref,
            values = ?created.values,
            location = created.location.as_deref().unwrap_or_default(),
            "Added partition"
        );
        Ok(created)
    }

    /// Get a partition by its values.
    pub fn get_partition(&self, table: &TableRef, values: &[String]) -> Result<Option<PartitionDef>, Error> {
        debug!(table = %table, values = ?values, "Looking up partition");
        get(&self.partitions, &keys::partition(table, values))
    }

    /// Partitions of a table. Empty when the table is absent.
    pub fn list_partitions(&self, table: &TableRef) -> Result<Vec<PartitionDef>, Error> {
        scan(&self.partitions, &keys::partitions_of(table))
    }

    /// Drop a partition.
    ///
    /// Returns `None` when the partition was absent and `ignore_unknown` is set.
    pub fn drop_partition(
        &self,
        table: &TableRef,
        values: &[String],
        ignore_unknown: bool,
    ) -> Result<Option<PartitionDef>, Error> {
        let table_key = keys::table(table);
        let partition_key = keys::partition(table, values);

        let result = (&self.partitions, &self.children).transaction(|(partitions, children)| {
            let dropped = read::<PartitionDef>(partitions, &partition_key)?;
            if dropped.is_some() {
                partitions.remove(partition_key.as_slice())?;
                counter::add(children, &table_key, -1)?;
            }
            Ok(dropped)
        });

        match finish(result)? {
            Some(dropped) => {
                info!(table = %table, values = ?values, "Dropped partition");
                Ok(Some(dropped))
            }
            None if ignore_unknown => Ok(None),
            None => Err(Error::NotFound(format!(
                "Partition ({}) of {} does not exist",
                values.join(", "),
                table
            ))),
        }
    }
}
