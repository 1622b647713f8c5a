//! Skewed-value ("list bucketing") index.
//!
//! A skewed table or partition gives each registered value tuple of its
//! skewed columns a dedicated directory; every other tuple lives in one
//! default directory. Resolution is a single hash lookup.

mod layout;

use std::collections::{HashMap, HashSet};

use metacat_proto::{escape_path_name, tuple_key, SkewSpec, SkewedInfo, TableDef, DEFAULT_SKEW_DIR_NAME};

use crate::error::Error;
use crate::storage::join_location;

pub use layout::DataLayout;

/// Register a skew declaration against `table`, laying it out under `base_location`.
pub fn declare(base_location: &str, table: &TableDef, spec: &SkewSpec) -> Result<SkewedInfo, Error> {
    if spec.columns.is_empty() {
        return Err(Error::InvalidSchemaObject(
            "Skewed column list cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for column in &spec.columns {
        if table.is_partition_key(column) {
            return Err(Error::InvalidSchemaObject(format!(
                "Partition column {} cannot be skewed",
                column
            )));
        }
        if table.column_index(column).is_none() {
            return Err(Error::InvalidSchemaObject(format!(
                "Skewed column {} not found in table {}",
                column,
                table.table_ref()
            )));
        }
        if !seen.insert(column.to_lowercase()) {
            return Err(Error::InvalidSchemaObject(format!(
                "Skewed column {} listed twice",
                column
            )));
        }
    }

    let mut tuples = HashSet::new();
    for values in &spec.values {
        if values.len() != spec.columns.len() {
            return Err(Error::InvalidSchemaObject(format!(
                "Skewed value tuple has {} values but {} columns are skewed",
                values.len(),
                spec.columns.len()
            )));
        }
        if !tuples.insert(tuple_key(values)) {
            return Err(Error::InvalidSchemaObject(format!(
                "Skewed value tuple ({}) listed twice",
                values.join(", ")
            )));
        }
    }

    Ok(layout_under(
        base_location,
        spec.columns.clone(),
        spec.values.clone(),
        spec.stored_as_directories,
    ))
}

/// Re-home a registered layout under a new base, e.g. when a partition
/// inherits its table's skew.
pub fn relocate(info: &SkewedInfo, base_location: &str) -> SkewedInfo {
    layout_under(
        base_location,
        info.columns.clone(),
        info.values.clone(),
        info.stored_as_directories,
    )
}

fn layout_under(
    base_location: &str,
    columns: Vec<String>,
    values: Vec<Vec<String>>,
    stored_as_directories: bool,
) -> SkewedInfo {
    if !stored_as_directories {
        return SkewedInfo {
            columns,
            values,
            stored_as_directories,
            locations: HashMap::new(),
            default_location: base_location.to_string(),
        };
    }

    let locations = values
        .iter()
        .map(|tuple| (tuple_key(tuple), skew_location(base_location, &columns, tuple)))
        .collect();

    SkewedInfo {
        columns,
        values,
        stored_as_directories,
        locations,
        default_location: join_location(base_location, DEFAULT_SKEW_DIR_NAME),
    }
}

/// Dedicated directory of one value tuple: `<base>/<c1>=<v1>/.../<cn>=<vn>`.
pub fn skew_location(base_location: &str, columns: &[String], values: &[String]) -> String {
    columns
        .iter()
        .zip(values)
        .fold(base_location.to_string(), |location, (column, value)| {
            join_location(
                &location,
                &format!(
                    "{}={}",
                    escape_path_name(&column.to_lowercase()),
                    escape_path_name(value)
                ),
            )
        })
}

/// Location that holds rows whose skewed columns equal `values`.
///
/// Tuples without a dedicated directory resolve to the default location,
/// whether or not any such row exists.
pub fn resolve_location<'a>(info: &'a SkewedInfo, values: &[String]) -> &'a str {
    info.dedicated_location(values)
        .unwrap_or(info.default_location.as_str())
}

/// Every location of a layout: dedicated directories in declaration order, then the default.
pub fn all_locations(info: &SkewedInfo) -> Vec<String> {
    let mut locations: Vec<String> = info
        .values
        .iter()
        .filter_map(|tuple| info.dedicated_location(tuple).map(str::to_string))
        .collect();
    locations.push(info.default_location.clone());
    locations
}
