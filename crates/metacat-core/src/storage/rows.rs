//! Row storage keyed by physical location.
//!
//! Rows are stored under `location \0 row_id`, so one location is one key
//! prefix and scanning a location never touches another. The number of rows
//! at each location is kept alongside, so a catalog transaction can tell
//! whether a location holds data without scanning it.

use std::collections::BTreeMap;

use metacat_proto::{ColumnPredicate, Row, ScanResult, TableDef, Value};
use sled::transaction::ConflictableTransactionError;
use sled::{Batch, Db, Transactional, Tree};
use tracing::{debug, info};

use super::counter;
use super::record::Record;
use super::txn::{abort, finish};
use super::{LAYOUT_EPOCH_TREE, ROW_COUNT_TREE};
use crate::error::Error;
use crate::skew::DataLayout;

/// Tree name for rows.
const ROW_TREE: &str = "data:rows";

/// Row storage.
pub struct RowStore {
    db: Db,
    rows: Tree,
    row_counts: Tree,
    layout_epochs: Tree,
}

impl RowStore {
    /// Open the row trees of the given sled database.
    pub fn open(db: &Db) -> Result<Self, Error> {
        Ok(Self {
            db: db.clone(),
            rows: db.open_tree(ROW_TREE)?,
            row_counts: db.open_tree(ROW_COUNT_TREE)?,
            layout_epochs: db.open_tree(LAYOUT_EPOCH_TREE)?,
        })
    }

    /// Insert rows, each into the location its skewed values route it to.
    ///
    /// Fails with [`Error::Conflict`] when a skewed layout was declared
    /// on the base location after `layout` was read; the caller reloads the
    /// layout and tries again.
    pub fn insert_rows(&self, table: &TableDef, layout: &DataLayout, rows: &[Row]) -> Result<u64, Error> {
        let mut staged = Vec::with_capacity(rows.len());
        let mut per_location: BTreeMap<&str, i64> = BTreeMap::new();
        for row in rows {
            if row.values.len() != table.columns.len() {
                return Err(Error::InvalidSchemaObject(format!(
                    "Row has {} values but table {} has {} columns",
                    row.values.len(),
                    table.table_ref(),
                    table.columns.len()
                )));
            }
            let location = layout.route(table, row);
            staged.push((row_key(location, self.db.generate_id()?), row.to_bytes()?));
            *per_location.entry(location).or_default() += 1;
        }

        let base = layout.base_location().as_bytes();
        let result = (&self.rows, &self.row_counts, &self.layout_epochs).transaction(
            |(rows_tx, counts, epochs)| {
                if counter::read(epochs, base)? != layout.epoch() {
                    return abort(Error::Conflict(format!(
                        "layout of {} changed while inserting",
                        layout.base_location()
                    )));
                }
                for (key, bytes) in &staged {
                    rows_tx.insert(key.as_slice(), bytes.as_slice())?;
                }
                for (location, added) in &per_location {
                    counter::add(counts, location.as_bytes(), *added)?;
                }
                Ok::<_, ConflictableTransactionError<Error>>(())
            },
        );
        finish(result)?;

        debug!(table = %table.table_ref(), rows = rows.len(), "Inserted rows");
        Ok(rows.len() as u64)
    }

    /// Rows matching every equality predicate.
    ///
    /// When the predicates pin every skewed column only the resolved
    /// location is read.
    pub fn select(
        &self,
        table: &TableDef,
        layout: &DataLayout,
        predicates: &[ColumnPredicate],
    ) -> Result<ScanResult, Error> {
        let mut filters = Vec::with_capacity(predicates.len());
        for p in predicates {
            let index = table.column_index(&p.column).ok_or_else(|| {
                Error::InvalidSchemaObject(format!(
                    "Column {} not found in table {}",
                    p.column,
                    table.table_ref()
                ))
            })?;
            filters.push((index, p.value.to_literal()));
        }

        let locations = match layout.prune(predicates) {
            Some(location) => vec![location.to_string()],
            None => layout.locations(),
        };

        let mut result = ScanResult::default();
        for location in locations {
            for row in self.rows_at(&location)? {
                let matched = filters.iter().all(|(index, wanted)| {
                    wanted.is_some() && row.get(*index).and_then(Value::to_literal) == *wanted
                });
                if matched {
                    result.rows.push(row);
                }
            }
            result.locations_scanned.push(location);
        }

        debug!(
            table = %table.table_ref(),
            locations = result.locations_scanned.len(),
            rows = result.rows.len(),
            "Selected rows"
        );
        Ok(result)
    }

    /// Replace the stored values of `columns` with NULL in every location of the layout.
    ///
    /// Partition and skewed columns cannot be truncated; the layout itself is
    /// never changed. Returns the number of rows rewritten.
    pub fn truncate_columns(&self, table: &TableDef, layout: &DataLayout, columns: &[String]) -> Result<u64, Error> {
        if columns.is_empty() {
            return Err(Error::InvalidSchemaObject("No columns to truncate".to_string()));
        }

        let mut indexes = Vec::with_capacity(columns.len());
        for column in columns {
            if table.is_partition_key(column) {
                return Err(Error::InvalidOperation(format!(
                    "Partition column {} cannot be truncated",
                    column
                )));
            }
            if layout.is_skewed_column(column) {
                return Err(Error::InvalidOperation(format!(
                    "Skewed column {} cannot be truncated",
                    column
                )));
            }
            let index = table.column_index(column).ok_or_else(|| {
                Error::InvalidSchemaObject(format!(
                    "Column {} not found in table {}",
                    column,
                    table.table_ref()
                ))
            })?;
            indexes.push(index);
        }

        let mut batch = Batch::default();
        let mut rewritten = 0u64;
        for location in layout.locations() {
            for item in self.rows.scan_prefix(location_prefix(&location)) {
                let (key, bytes) = item?;
                let mut row = Row::from_bytes(&bytes)?;
                for &index in &indexes {
                    if let Some(value) = row.values.get_mut(index) {
                        *value = Value::Null;
                    }
                }
                batch.insert(key, row.to_bytes()?);
                rewritten += 1;
            }
        }
        self.rows.apply_batch(batch)?;

        info!(
            table = %table.table_ref(),
            columns = ?columns,
            rows = rewritten,
            "Truncated columns"
        );
        Ok(rewritten)
    }

    /// Rows stored at exactly `location`.
    pub fn rows_at(&self, location: &str) -> Result<Vec<Row>, Error> {
        let mut rows = Vec::new();
        for item in self.rows.scan_prefix(location_prefix(location)) {
            let (_, bytes) = item?;
            rows.push(Row::from_bytes(&bytes)?);
        }
        Ok(rows)
    }

    /// Number of rows stored at exactly `location`.
    pub fn row_count(&self, location: &str) -> Result<u64, Error> {
        Ok(counter::get(&self.row_counts, location.as_bytes())?)
    }

    /// Delete every row at `location` or in a directory below it.
    pub fn delete_under(&self, location: &str) -> Result<u64, Error> {
        let nested = format!("{}/", location.trim_end_matches('/'));
        let mut batch = Batch::default();
        let mut deleted = 0u64;
        for prefix in [location_prefix(location), nested.clone().into_bytes()] {
            for item in self.rows.scan_prefix(prefix) {
                let (key, _) = item?;
                batch.remove(key);
                deleted += 1;
            }
        }
        self.rows.apply_batch(batch)?;

        let mut counts = Batch::default();
        counts.remove(location.as_bytes());
        for item in self.row_counts.scan_prefix(nested.as_bytes()) {
            let (key, _) = item?;
            counts.remove(key);
        }
        self.row_counts.apply_batch(counts)?;

        debug!(location = %location, rows = deleted, "Deleted rows");
        Ok(deleted)
    }
}

fn location_prefix(location: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(location.len() + 1);
    key.extend_from_slice(location.as_bytes());
    key.push(0);
    key
}

fn row_key(location: &str, row_id: u64) -> Vec<u8> {
    let mut key = location_prefix(location);
    key.extend_from_slice(&row_id.to_be_bytes());
    key
}
