//! Catalog objects: catalogs, databases, tables, columns and partitions.

use std::collections::HashMap;
use std::fmt;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::skew::SkewedInfo;

/// Catalog that exists in every deployment.
pub const DEFAULT_CATALOG_NAME: &str = "hive";

/// Database created inside every catalog.
pub const DEFAULT_DATABASE_NAME: &str = "default";

/// Fully-qualified database coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct DatabaseRef {
    /// Owning catalog.
    pub catalog: String,
    /// Database name.
    pub database: String,
}

impl DatabaseRef {
    /// Create a database reference.
    pub fn new(catalog: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
        }
    }
}

impl fmt::Display for DatabaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.catalog, self.database)
    }
}

/// Fully-qualified table coordinates. The triple is the table's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct TableRef {
    /// Owning catalog.
    pub catalog: String,
    /// Owning database.
    pub database: String,
    /// Table name.
    pub table: String,
}

impl TableRef {
    /// Create a table reference.
    pub fn new(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
            table: table.into(),
        }
    }

    /// Reference a table in the default catalog.
    pub fn in_default_catalog(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self::new(DEFAULT_CATALOG_NAME, database, table)
    }

    /// The database this table belongs to.
    pub fn database_ref(&self) -> DatabaseRef {
        DatabaseRef::new(self.catalog.clone(), self.database.clone())
    }

    /// Case-insensitive comparison of two triples.
    pub fn same_table(&self, other: &TableRef) -> bool {
        self.catalog.eq_ignore_ascii_case(&other.catalog)
            && self.database.eq_ignore_ascii_case(&other.database)
            && self.table.eq_ignore_ascii_case(&other.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.catalog, self.database, self.table)
    }
}

/// A top-level namespace.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct CatalogDef {
    /// Catalog name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Root storage location; databases without an explicit location nest under it.
    pub location_uri: String,
}

impl CatalogDef {
    /// Create a catalog definition.
    pub fn new(name: impl Into<String>, location_uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            location_uri: location_uri.into(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A named container of tables.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct DatabaseDef {
    /// Owning catalog.
    pub catalog: String,
    /// Database name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Storage location. `None` on create means derive from the catalog root.
    pub location_uri: Option<String>,
    /// Owner principal.
    pub owner: Option<String>,
    /// Arbitrary key/value parameters.
    pub parameters: HashMap<String, String>,
}

impl DatabaseDef {
    /// Create a database definition in the default catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: DEFAULT_CATALOG_NAME.to_string(),
            name: name.into(),
            description: None,
            location_uri: None,
            owner: None,
            parameters: HashMap::new(),
        }
    }

    /// Place the database in a catalog.
    pub fn in_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self
    }

    /// Set an explicit location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_uri = Some(location.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Coordinates of this database.
    pub fn database_ref(&self) -> DatabaseRef {
        DatabaseRef::new(self.catalog.clone(), self.name.clone())
    }
}

/// A column: name plus type string.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Type as written in DDL, e.g. `int` or `varchar(32)`.
    pub type_name: String,
    /// Optional comment.
    pub comment: Option<String>,
}

impl ColumnDef {
    /// Create a column.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            comment: None,
        }
    }
}

/// Whether the catalog owns a table's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum TableType {
    /// Data is deleted with the table when requested.
    Managed,
    /// Data is never deleted by the catalog.
    External,
}

/// A table definition.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct TableDef {
    /// Owning catalog.
    pub catalog: String,
    /// Owning database.
    pub database: String,
    /// Table name.
    pub name: String,
    /// Data columns in ordinal order.
    pub columns: Vec<ColumnDef>,
    /// Partition key columns in order.
    pub partition_keys: Vec<ColumnDef>,
    /// Storage location. `None` on create means derive from the database location.
    pub location: Option<String>,
    /// Managed or external.
    pub table_type: TableType,
    /// Owner principal.
    pub owner: Option<String>,
    /// Arbitrary key/value parameters.
    pub parameters: HashMap<String, String>,
    /// Skewed-value storage layout, if declared.
    pub skewed: Option<SkewedInfo>,
    /// Creation time in seconds since the Unix epoch; assigned by the store.
    pub create_time: u64,
}

impl TableDef {
    /// Create a managed table in `hive.default`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            catalog: DEFAULT_CATALOG_NAME.to_string(),
            database: DEFAULT_DATABASE_NAME.to_string(),
            name: name.into(),
            columns: Vec::new(),
            partition_keys: Vec::new(),
            location: None,
            table_type: TableType::Managed,
            owner: None,
            parameters: HashMap::new(),
            skewed: None,
            create_time: 0,
        }
    }

    /// Place the table in a database.
    pub fn in_database(mut self, catalog: impl Into<String>, database: impl Into<String>) -> Self {
        self.catalog = catalog.into();
        self.database = database.into();
        self
    }

    /// Append a data column.
    pub fn with_column(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns.push(ColumnDef::new(name, type_name));
        self
    }

    /// Append a partition key.
    pub fn with_partition_key(
        mut self,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        self.partition_keys.push(ColumnDef::new(name, type_name));
        self
    }

    /// Set an explicit location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Mark as external.
    pub fn external(mut self) -> Self {
        self.table_type = TableType::External;
        self
    }

    /// Add a parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Coordinates of this table.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.catalog.clone(), self.database.clone(), self.name.clone())
    }

    /// Ordinal of a data column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check if `name` is a partition key.
    pub fn is_partition_key(&self, name: &str) -> bool {
        self.partition_keys
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check if `name` is a data column or a partition key.
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some() || self.is_partition_key(name)
    }

    /// Check if the table has partition keys.
    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }
}

/// A partition: one value per partition key of its table.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct PartitionDef {
    /// Owning catalog.
    pub catalog: String,
    /// Owning database.
    pub database: String,
    /// Owning table.
    pub table: String,
    /// Values in partition-key order.
    pub values: Vec<String>,
    /// Storage location. `None` on create means derive from the table location.
    pub location: Option<String>,
    /// Skewed-value layout for this partition, inherited or overridden.
    pub skewed: Option<SkewedInfo>,
    /// Arbitrary key/value parameters.
    pub parameters: HashMap<String, String>,
    /// Creation time in seconds since the Unix epoch; assigned by the store.
    pub create_time: u64,
}

impl PartitionDef {
    /// Create a partition of `table` with the given values.
    pub fn new(table: &TableRef, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            catalog: table.catalog.clone(),
            database: table.database.clone(),
            table: table.table.clone(),
            values: values.into_iter().map(Into::into).collect(),
            location: None,
            skewed: None,
            parameters: HashMap::new(),
            create_time: 0,
        }
    }

    /// Set an explicit location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Coordinates of the owning table.
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.catalog.clone(), self.database.clone(), self.table.clone())
    }
}

/// Build a partition name such as `ds=2008-04-08/hr=11`.
///
/// Keys are lower-cased; keys and values are path-escaped.
pub fn partition_name(keys: &[ColumnDef], values: &[String]) -> String {
    keys.iter()
        .zip(values)
        .map(|(k, v)| {
            format!(
                "{}={}",
                escape_path_name(&k.name.to_lowercase()),
                escape_path_name(v)
            )
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Escape characters that are unsafe in a path segment as `%XX`.
pub fn escape_path_name(segment: &str) -> String {
    const SPECIAL: &[char] = &[
        '"', '#', '%', '\'', '*', '/', ':', '=', '?', '\\', '\u{7F}', '{', '[', ']', '^',
    ];

    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c.is_control() || SPECIAL.contains(&c) {
            out.push_str(&format!("%{:02X}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}
