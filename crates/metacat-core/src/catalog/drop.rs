//! Shared pieces of the table and database drops.
//!
//! A drop must remove children it can only find by scanning, and sled
//! transactions cannot scan. The child keys are therefore read first and
//! handed to the transaction, which compares them with the parent's child
//! counter. Every create or drop of a child moves that counter, so a
//! snapshot that no longer matches is thrown away and read again.

use std::fmt::Display;

use metacat_proto::{PartitionDef, TableDef};
use sled::transaction::TransactionalTree;
use tracing::debug;

use super::store::DroppedTable;
use crate::error::Error;
use crate::storage::counter;
use crate::storage::txn::{read, TxResult};

/// Snapshots tried before a drop gives up.
const DROP_ATTEMPTS: usize = 8;

/// Outcome of one drop transaction.
pub(super) enum Attempt<T> {
    /// The transaction committed, or found nothing to drop.
    Done(T),
    /// The child snapshot was out of date; nothing was written.
    Stale,
}

/// Run `attempt` with fresh snapshots until one is current.
pub(super) fn until_current<T>(
    object: &dyn Display,
    mut attempt: impl FnMut() -> Result<Attempt<T>, Error>,
) -> Result<T, Error> {
    for _ in 0..DROP_ATTEMPTS {
        if let Attempt::Done(value) = attempt()? {
            return Ok(value);
        }
        debug!(object = %object, "Children changed during drop, rescanning");
    }
    Err(Error::Conflict(format!(
        "children of {} kept changing during drop",
        object
    )))
}

/// Check that `partition_keys` is still the complete partition set of a table.
pub(super) fn partitions_current(
    partitions: &TransactionalTree,
    children: &TransactionalTree,
    table_key: &[u8],
    partition_keys: &[Vec<u8>],
) -> TxResult<bool> {
    if counter::read(children, table_key)? != partition_keys.len() as u64 {
        return Ok(false);
    }
    for key in partition_keys {
        if partitions.get(key.as_slice())?.is_none() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Remove a table with its constraint set and partitions.
///
/// `partition_keys` must have passed [`partitions_current`] in the same
/// transaction. The database's child counter is left to the caller.
pub(super) fn remove_table(
    tables: &TransactionalTree,
    constraint_sets: &TransactionalTree,
    partitions: &TransactionalTree,
    children: &TransactionalTree,
    table_key: &[u8],
    table: TableDef,
    partition_keys: &[Vec<u8>],
) -> TxResult<DroppedTable> {
    tables.remove(table_key)?;
    constraint_sets.remove(table_key)?;

    let mut dropped = Vec::with_capacity(partition_keys.len());
    for key in partition_keys {
        if let Some(partition) = read::<PartitionDef>(partitions, key)? {
            partitions.remove(key.as_slice())?;
            dropped.push(partition);
        }
    }
    counter::clear(children, table_key)?;

    Ok(DroppedTable {
        table,
        partitions: dropped,
    })
}
