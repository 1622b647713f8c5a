//! Request and response message types.

use crate::constraint::{ConstraintDef, ConstraintType, TableConstraints};
use crate::object::{CatalogDef, DatabaseDef, DatabaseRef, PartitionDef, TableDef, TableRef};
use crate::scan::{ColumnPredicate, ScanResult};
use crate::skew::{SkewSpec, SkewedInfo};
use crate::value::Row;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

/// A request from client to server.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Request {
    /// Unique request identifier for correlation.
    pub id: u64,
    /// The operation to perform.
    pub operation: Operation,
}

/// Operations that can be requested.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Operation {
    /// Ping the server (for health checks).
    Ping,

    /// Create a catalog together with its `default` database.
    CreateCatalog(CatalogDef),
    /// Fetch a catalog by name.
    GetCatalog {
        /// Catalog name.
        name: String,
    },
    /// List every catalog.
    ListCatalogs,
    /// Drop an empty catalog.
    DropCatalog {
        /// Catalog name.
        name: String,
        /// Succeed when the catalog is absent.
        ignore_unknown: bool,
    },

    /// Create a database.
    CreateDatabase(DatabaseDef),
    /// Fetch a database.
    GetDatabase(DatabaseRef),
    /// List the databases of a catalog.
    ListDatabases {
        /// Catalog name.
        catalog: String,
    },
    /// Drop a database.
    DropDatabase {
        /// Database to drop.
        database: DatabaseRef,
        /// Delete data of managed tables.
        delete_data: bool,
        /// Succeed when the database is absent.
        ignore_unknown: bool,
        /// Drop contained tables instead of failing.
        cascade: bool,
    },

    /// Create a table without constraints.
    CreateTable(TableDef),
    /// Create a table and its constraints atomically.
    CreateTableWithConstraints {
        /// Table definition.
        table: TableDef,
        /// Constraints, grouped by kind.
        constraints: TableConstraints,
    },
    /// Fetch a table.
    GetTable(TableRef),
    /// List table names of a database, optionally filtered by a pattern.
    ListTables {
        /// Database to list.
        database: DatabaseRef,
        /// `*` wildcard / `|` alternation pattern.
        pattern: Option<String>,
    },
    /// Replace columns, parameters and owner of an existing table.
    AlterTable(TableDef),
    /// Drop a table with its partitions and constraints.
    DropTable {
        /// Table to drop.
        table: TableRef,
        /// Delete rows of a managed table.
        delete_data: bool,
        /// Succeed when the table is absent.
        ignore_unknown: bool,
    },

    /// Add a partition.
    AddPartition(PartitionDef),
    /// Fetch a partition by its values.
    GetPartition {
        /// Owning table.
        table: TableRef,
        /// Values in partition-key order.
        values: Vec<String>,
    },
    /// List the partitions of a table.
    ListPartitions(TableRef),
    /// Drop a partition.
    DropPartition {
        /// Owning table.
        table: TableRef,
        /// Values in partition-key order.
        values: Vec<String>,
        /// Delete the partition's rows.
        delete_data: bool,
        /// Succeed when the partition is absent.
        ignore_unknown: bool,
    },

    /// Add a batch of constraints to one table atomically.
    AddConstraints(Vec<ConstraintDef>),
    /// Fetch the constraints of one kind.
    GetConstraints {
        /// Owning table.
        table: TableRef,
        /// Kind to fetch.
        constraint_type: ConstraintType,
    },
    /// Fetch every constraint of a table, grouped by kind.
    GetTableConstraints(TableRef),
    /// Fetch foreign keys in any table that reference `parent`.
    GetForeignKeysReferencing(TableRef),
    /// Drop a constraint by name.
    DropConstraint {
        /// Owning table.
        table: TableRef,
        /// Constraint name.
        name: String,
    },

    /// Declare the skewed layout of a table or one of its partitions.
    AlterTableSkewed {
        /// Target table.
        table: TableRef,
        /// Partition values for a per-partition override.
        partition: Option<Vec<String>>,
        /// Skew declaration.
        spec: SkewSpec,
    },
    /// Resolve the storage location of a skewed-value tuple.
    ResolveLocation {
        /// Target table.
        table: TableRef,
        /// Partition values, for partitioned tables.
        partition: Option<Vec<String>>,
        /// One value per skewed column.
        values: Vec<String>,
    },

    /// Insert rows, routing each by its skewed values.
    InsertRows {
        /// Target table.
        table: TableRef,
        /// Partition values, for partitioned tables.
        partition: Option<Vec<String>>,
        /// Rows, one value per data column.
        rows: Vec<Row>,
    },
    /// Select rows by column equality, pruning skewed locations when possible.
    Select {
        /// Target table.
        table: TableRef,
        /// Partition values, for partitioned tables.
        partition: Option<Vec<String>>,
        /// Conjunction of equality predicates.
        predicates: Vec<ColumnPredicate>,
    },
    /// Replace the stored values of columns with NULL.
    TruncateColumns {
        /// Target table.
        table: TableRef,
        /// Partition values, for partitioned tables.
        partition: Option<Vec<String>>,
        /// Columns to truncate.
        columns: Vec<String>,
    },
}

impl Operation {
    /// Short operation name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::CreateCatalog(_) => "create_catalog",
            Operation::GetCatalog { .. } => "get_catalog",
            Operation::ListCatalogs => "list_catalogs",
            Operation::DropCatalog { .. } => "drop_catalog",
            Operation::CreateDatabase(_) => "create_database",
            Operation::GetDatabase(_) => "get_database",
            Operation::ListDatabases { .. } => "list_databases",
            Operation::DropDatabase { .. } => "drop_database",
            Operation::CreateTable(_) => "create_table",
            Operation::CreateTableWithConstraints { .. } => "create_table_with_constraints",
            Operation::GetTable(_) => "get_table",
            Operation::ListTables { .. } => "list_tables",
            Operation::AlterTable(_) => "alter_table",
            Operation::DropTable { .. } => "drop_table",
            Operation::AddPartition(_) => "add_partition",
            Operation::GetPartition { .. } => "get_partition",
            Operation::ListPartitions(_) => "list_partitions",
            Operation::DropPartition { .. } => "drop_partition",
            Operation::AddConstraints(_) => "add_constraints",
            Operation::GetConstraints { .. } => "get_constraints",
            Operation::GetTableConstraints(_) => "get_table_constraints",
            Operation::GetForeignKeysReferencing(_) => "get_foreign_keys_referencing",
            Operation::DropConstraint { .. } => "drop_constraint",
            Operation::AlterTableSkewed { .. } => "alter_table_skewed",
            Operation::ResolveLocation { .. } => "resolve_location",
            Operation::InsertRows { .. } => "insert_rows",
            Operation::Select { .. } => "select",
            Operation::TruncateColumns { .. } => "truncate_columns",
        }
    }

    /// Whether the operation only reads, so sending it twice is harmless.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Operation::Ping
                | Operation::GetCatalog { .. }
                | Operation::ListCatalogs
                | Operation::GetDatabase(_)
                | Operation::ListDatabases { .. }
                | Operation::GetTable(_)
                | Operation::ListTables { .. }
                | Operation::GetPartition { .. }
                | Operation::ListPartitions(_)
                | Operation::GetConstraints { .. }
                | Operation::GetTableConstraints(_)
                | Operation::GetForeignKeysReferencing(_)
                | Operation::ResolveLocation { .. }
                | Operation::Select { .. }
        )
    }
}

impl Request {
    /// Create a request.
    pub fn new(id: u64, operation: Operation) -> Self {
        Self { id, operation }
    }

    /// Create a ping request.
    pub fn ping(id: u64) -> Self {
        Self::new(id, Operation::Ping)
    }
}

/// A response from server to client.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Response {
    /// Request ID this response correlates to.
    pub id: u64,
    /// Response status.
    pub status: Status,
    /// Response payload.
    pub payload: ResponsePayload,
}

/// Response status.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Status {
    /// Request succeeded.
    Ok,
    /// Request failed with an error.
    Error {
        /// Error code for programmatic handling.
        code: u32,
        /// Human-readable error message.
        message: String,
    },
}

impl Status {
    /// Create a success status.
    pub fn ok() -> Self {
        Status::Ok
    }

    /// Create an error status.
    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Status::Error {
            code,
            message: message.into(),
        }
    }

    /// Check if this is a success status.
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if this is an error status.
    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error { .. })
    }
}

/// Response payload variants.
///
/// Lookups of absent objects answer with `None` or an empty list, never an error status.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum ResponsePayload {
    /// Pong response to ping.
    Pong,
    /// Mutation applied.
    Done,
    /// Empty payload (for errors).
    Empty,
    /// Catalog lookup.
    Catalog(Option<CatalogDef>),
    /// Catalog listing.
    Catalogs(Vec<CatalogDef>),
    /// Database lookup.
    Database(Option<DatabaseDef>),
    /// Database listing.
    Databases(Vec<DatabaseDef>),
    /// Table lookup.
    Table(Option<TableDef>),
    /// A table created together with its named constraints.
    CreatedTable {
        /// The stored table.
        table: TableDef,
        /// The stored constraints.
        constraints: Vec<ConstraintDef>,
    },
    /// Table name listing.
    TableNames(Vec<String>),
    /// Partition lookup.
    Partition(Option<PartitionDef>),
    /// Partition listing.
    Partitions(Vec<PartitionDef>),
    /// Constraints, in commit order.
    Constraints(Vec<ConstraintDef>),
    /// Constraints grouped by kind.
    TableConstraints(TableConstraints),
    /// Declared skewed layout.
    Skewed(SkewedInfo),
    /// Resolved location.
    Location(Option<String>),
    /// Number of rows affected.
    RowCount(u64),
    /// Select result.
    Scan(ScanResult),
}

impl Response {
    /// Create a successful response with a payload.
    pub fn ok(id: u64, payload: ResponsePayload) -> Self {
        Self {
            id,
            status: Status::ok(),
            payload,
        }
    }

    /// Create a pong response.
    pub fn pong(id: u64) -> Self {
        Self::ok(id, ResponsePayload::Pong)
    }

    /// Create a response for a mutation without a result.
    pub fn done(id: u64) -> Self {
        Self::ok(id, ResponsePayload::Done)
    }

    /// Create an error response.
    pub fn error(id: u64, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::error(code, message),
            payload: ResponsePayload::Empty,
        }
    }
}

/// Standard error codes.
pub mod error_codes {
    /// Unknown/internal error.
    pub const INTERNAL: u32 = 1;
    /// Invalid request format.
    pub const INVALID_REQUEST: u32 = 2;
    /// Object not found on a write path.
    pub const NOT_FOUND: u32 = 3;
    /// Write references a missing or malformed schema object.
    pub const INVALID_OBJECT: u32 = 4;
    /// Object or constraint name already exists.
    pub const ALREADY_EXISTS: u32 = 5;
    /// Operation not allowed on the object's current state.
    pub const INVALID_OPERATION: u32 = 6;
    /// Persistence backend failed; the whole operation may be retried.
    pub const STORE_UNAVAILABLE: u32 = 7;
}
