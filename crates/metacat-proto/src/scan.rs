//! Row predicates and scan results for the pruning query path.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::value::{Row, Value};

/// Equality predicate on one column.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ColumnPredicate {
    /// Column name.
    pub column: String,
    /// Value the column must equal.
    pub value: Value,
}

impl ColumnPredicate {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Rows matched by a select, with the locations that were read.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ScanResult {
    /// Locations scanned, in scan order.
    pub locations_scanned: Vec<String>,
    /// Matching rows.
    pub rows: Vec<Row>,
}

impl ScanResult {
    /// Number of matching rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no row matched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check whether the scan was pruned to exactly `location`.
    pub fn pruned_to(&self, location: &str) -> bool {
        self.locations_scanned.len() == 1 && self.locations_scanned[0] == location
    }
}
