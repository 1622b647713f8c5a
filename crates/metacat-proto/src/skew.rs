//! Skewed-value ("list bucketing") layout descriptions.

use std::collections::HashMap;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// Directory that receives every value tuple without a dedicated location.
pub const DEFAULT_SKEW_DIR_NAME: &str = "HIVE_DEFAULT_LIST_BUCKETING_DIR_NAME";

/// Separator between values inside a tuple key. Not valid in DDL literals.
const TUPLE_SEPARATOR: char = '\u{1}';

/// Alteration input: `SKEWED BY (columns) ON (values) [STORED AS DIRECTORIES]`.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct SkewSpec {
    /// Skewed column names.
    pub columns: Vec<String>,
    /// Value tuples, each with one entry per skewed column.
    pub values: Vec<Vec<String>>,
    /// Give each tuple its own directory.
    pub stored_as_directories: bool,
}

impl SkewSpec {
    /// Skew on a single column, stored as directories.
    pub fn single(column: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: vec![column.into()],
            values: values.into_iter().map(|v| vec![v.into()]).collect(),
            stored_as_directories: true,
        }
    }

    /// Skew on several columns, stored as directories.
    pub fn composite(
        columns: impl IntoIterator<Item = impl Into<String>>,
        values: Vec<Vec<String>>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            values,
            stored_as_directories: true,
        }
    }

    /// Keep the skew metadata but store all rows in the base location.
    pub fn without_directories(mut self) -> Self {
        self.stored_as_directories = false;
        self
    }
}

/// Registered skewed layout of a table or partition.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct SkewedInfo {
    /// Skewed column names, as declared.
    pub columns: Vec<String>,
    /// Registered value tuples, in declaration order.
    pub values: Vec<Vec<String>>,
    /// Whether tuples have dedicated directories.
    pub stored_as_directories: bool,
    /// Dedicated location per tuple, keyed by [`tuple_key`].
    pub locations: HashMap<String, String>,
    /// Location for every tuple without a dedicated one.
    pub default_location: String,
}

impl SkewedInfo {
    /// Dedicated location of an exact tuple, if registered.
    pub fn dedicated_location(&self, values: &[String]) -> Option<&str> {
        self.locations.get(&tuple_key(values)).map(String::as_str)
    }
}

/// Key a value tuple for the location map.
pub fn tuple_key(values: &[String]) -> String {
    let mut key = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            key.push(TUPLE_SEPARATOR);
        }
        key.push_str(v);
    }
    key
}
