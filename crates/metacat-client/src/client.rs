//! Metacat client API.
//!
//! [`Client`] has one async method per catalog operation. Lookups of absent
//! objects come back as `None` or an empty list; rejected writes come back as
//! [`Error::Server`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use metacat_proto::{
    CatalogDef, ColumnPredicate, ConstraintDef, ConstraintType, DatabaseDef, DatabaseRef,
    Operation, PartitionDef, Request, Response, ResponsePayload, Row, ScanResult, SkewSpec,
    SkewedInfo, Status, TableConstraints, TableDef, TableRef,
};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Error;

/// A client for a metacat server.
///
/// # Example
///
/// ```ignore
/// use metacat_client::{Client, ClientConfig};
/// use metacat_client::proto::{ConstraintDef, TableDef};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::connect(ClientConfig::localhost()).await?;
///
///     let table = client
///         .create_table(TableDef::new("orders").with_column("id", "bigint"))
///         .await?;
///     client
///         .add_primary_key(vec![ConstraintDef::primary_key(table.table_ref(), ["id"])])
///         .await?;
///
///     client.close().await;
///     Ok(())
/// }
/// ```
pub struct Client {
    connection: Arc<Mutex<Connection>>,
    config: ClientConfig,
    next_request_id: AtomicU64,
}

/// Unwrap one payload variant or fail with a protocol error.
macro_rules! expect_payload {
    ($payload:expr, $pattern:pat => $value:expr, $what:literal) => {
        match $payload {
            $pattern => Ok($value),
            _ => Err(Error::Protocol(metacat_proto::Error::InvalidMessage(
                concat!("expected ", $what).to_string(),
            ))),
        }
    };
}

impl Client {
    /// Connect to a metacat server.
    pub async fn connect(config: ClientConfig) -> Result<Self, Error> {
        let connection = Connection::establish(config.clone()).await?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            config,
            next_request_id: AtomicU64::new(1),
        })
    }

    /// Connect to a server at the given address.
    pub async fn connect_to(address: impl Into<String>) -> Result<Self, Error> {
        Self::connect(ClientConfig::new(address)).await
    }

    /// Ping the server to check connectivity.
    pub async fn ping(&self) -> Result<(), Error> {
        let payload = self.execute(Operation::Ping).await?;
        expect_payload!(payload, ResponsePayload::Pong => (), "pong response")
    }

    // Catalogs

    /// Create a catalog and its `default` database.
    pub async fn create_catalog(&self, catalog: CatalogDef) -> Result<CatalogDef, Error> {
        let payload = self.execute(Operation::CreateCatalog(catalog)).await?;
        expect_payload!(payload, ResponsePayload::Catalog(Some(c)) => c, "created catalog")
    }

    pub async fn get_catalog(&self, name: &str) -> Result<Option<CatalogDef>, Error> {
        let payload = self
            .execute(Operation::GetCatalog { name: name.to_string() })
            .await?;
        expect_payload!(payload, ResponsePayload::Catalog(c) => c, "catalog")
    }

    pub async fn list_catalogs(&self) -> Result<Vec<CatalogDef>, Error> {
        let payload = self.execute(Operation::ListCatalogs).await?;
        expect_payload!(payload, ResponsePayload::Catalogs(c) => c, "catalog list")
    }

    pub async fn drop_catalog(&self, name: &str, ignore_unknown: bool) -> Result<(), Error> {
        self.execute_done(Operation::DropCatalog {
            name: name.to_string(),
            ignore_unknown,
        })
        .await
    }

    // Databases

    pub async fn create_database(&self, database: DatabaseDef) -> Result<DatabaseDef, Error> {
        let payload = self.execute(Operation::CreateDatabase(database)).await?;
        expect_payload!(payload, ResponsePayload::Database(Some(d)) => d, "created database")
    }

    pub async fn get_database(&self, database: &DatabaseRef) -> Result<Option<DatabaseDef>, Error> {
        let payload = self.execute(Operation::GetDatabase(database.clone())).await?;
        expect_payload!(payload, ResponsePayload::Database(d) => d, "database")
    }

    pub async fn list_databases(&self, catalog: &str) -> Result<Vec<DatabaseDef>, Error> {
        let payload = self
            .execute(Operation::ListDatabases {
                catalog: catalog.to_string(),
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Databases(d) => d, "database list")
    }

    pub async fn drop_database(
        &self,
        database: &DatabaseRef,
        delete_data: bool,
        ignore_unknown: bool,
        cascade: bool,
    ) -> Result<(), Error> {
        self.execute_done(Operation::DropDatabase {
            database: database.clone(),
            delete_data,
            ignore_unknown,
            cascade,
        })
        .await
    }

    // Tables

    pub async fn create_table(&self, table: TableDef) -> Result<TableDef, Error> {
        let payload = self.execute(Operation::CreateTable(table)).await?;
        expect_payload!(payload, ResponsePayload::Table(Some(t)) => t, "created table")
    }

    /// Create a table together with its constraints; neither is stored if
    /// any constraint is rejected.
    pub async fn create_table_with_constraints(
        &self,
        table: TableDef,
        constraints: TableConstraints,
    ) -> Result<(TableDef, Vec<ConstraintDef>), Error> {
        let payload = self
            .execute(Operation::CreateTableWithConstraints { table, constraints })
            .await?;
        expect_payload!(
            payload,
            ResponsePayload::CreatedTable { table, constraints } => (table, constraints),
            "created table"
        )
    }

    pub async fn get_table(&self, table: &TableRef) -> Result<Option<TableDef>, Error> {
        let payload = self.execute(Operation::GetTable(table.clone())).await?;
        expect_payload!(payload, ResponsePayload::Table(t) => t, "table")
    }

    /// Table names of a database, optionally filtered by a `*`/`|` pattern.
    pub async fn list_tables(&self, database: &DatabaseRef, pattern: Option<&str>) -> Result<Vec<String>, Error> {
        let payload = self
            .execute(Operation::ListTables {
                database: database.clone(),
                pattern: pattern.map(str::to_string),
            })
            .await?;
        expect_payload!(payload, ResponsePayload::TableNames(names) => names, "table names")
    }

    pub async fn alter_table(&self, table: TableDef) -> Result<TableDef, Error> {
        let payload = self.execute(Operation::AlterTable(table)).await?;
        expect_payload!(payload, ResponsePayload::Table(Some(t)) => t, "altered table")
    }

    pub async fn drop_table(&self, table: &TableRef, delete_data: bool, ignore_unknown: bool) -> Result<(), Error> {
        self.execute_done(Operation::DropTable {
            table: table.clone(),
            delete_data,
            ignore_unknown,
        })
        .await
    }

    // Partitions

    pub async fn add_partition(&self, partition: PartitionDef) -> Result<PartitionDef, Error> {
        let payload = self.execute(Operation::AddPartition(partition)).await?;
        expect_payload!(payload, ResponsePayload::Partition(Some(p)) => p, "added partition")
    }

    pub async fn get_partition(&self, table: &TableRef, values: &[String]) -> Result<Option<PartitionDef>, Error> {
        let payload = self
            .execute(Operation::GetPartition {
                table: table.clone(),
                values: values.to_vec(),
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Partition(p) => p, "partition")
    }

    pub async fn list_partitions(&self, table: &TableRef) -> Result<Vec<PartitionDef>, Error> {
        let payload = self.execute(Operation::ListPartitions(table.clone())).await?;
        expect_payload!(payload, ResponsePayload::Partitions(p) => p, "partition list")
    }

    pub async fn drop_partition(
        &self,
        table: &TableRef,
        values: &[String],
        delete_data: bool,
        ignore_unknown: bool,
    ) -> Result<(), Error> {
        self.execute_done(Operation::DropPartition {
            table: table.clone(),
            values: values.to_vec(),
            delete_data,
            ignore_unknown,
        })
        .await
    }

    // Constraints

    /// Add a batch of constraints of any kinds, all or none.
    ///
    /// Returns the stored constraints with their assigned names.
    pub async fn add_constraints(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        let payload = self.execute(Operation::AddConstraints(constraints)).await?;
        expect_payload!(payload, ResponsePayload::Constraints(c) => c, "constraint list")
    }

    pub async fn add_primary_key(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::PrimaryKey, constraints).await
    }

    pub async fn add_foreign_key(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::ForeignKey, constraints).await
    }

    pub async fn add_unique_constraint(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::Unique, constraints).await
    }

    pub async fn add_not_null_constraint(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::NotNull, constraints).await
    }

    pub async fn add_default_constraint(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::Default, constraints).await
    }

    pub async fn add_check_constraint(&self, constraints: Vec<ConstraintDef>) -> Result<Vec<ConstraintDef>, Error> {
        self.add_of_type(ConstraintType::Check, constraints).await
    }

    /// Constraints of one kind on a table. Empty when the table is absent.
    pub async fn get_constraints(
        &self,
        table: &TableRef,
        constraint_type: ConstraintType,
    ) -> Result<Vec<ConstraintDef>, Error> {
        let payload = self
            .execute(Operation::GetConstraints {
                table: table.clone(),
                constraint_type,
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Constraints(c) => c, "constraint list")
    }

    pub async fn get_primary_keys(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::PrimaryKey).await
    }

    pub async fn get_foreign_keys(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::ForeignKey).await
    }

    pub async fn get_unique_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::Unique).await
    }

    pub async fn get_not_null_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::NotNull).await
    }

    pub async fn get_default_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::Default).await
    }

    pub async fn get_check_constraints(&self, table: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        self.get_constraints(table, ConstraintType::Check).await
    }

    /// Every constraint of a table, grouped by kind.
    pub async fn get_all_table_constraints(&self, table: &TableRef) -> Result<TableConstraints, Error> {
        let payload = self.execute(Operation::GetTableConstraints(table.clone())).await?;
        expect_payload!(payload, ResponsePayload::TableConstraints(c) => c, "table constraints")
    }

    /// Foreign keys of other tables that reference `parent`.
    pub async fn get_foreign_keys_referencing(&self, parent: &TableRef) -> Result<Vec<ConstraintDef>, Error> {
        let payload = self
            .execute(Operation::GetForeignKeysReferencing(parent.clone()))
            .await?;
        expect_payload!(payload, ResponsePayload::Constraints(c) => c, "constraint list")
    }

    pub async fn drop_constraint(&self, table: &TableRef, name: &str) -> Result<(), Error> {
        self.execute_done(Operation::DropConstraint {
            table: table.clone(),
            name: name.to_string(),
        })
        .await
    }

    // Skewed layout

    /// Declare the skewed layout of a table, or of one partition.
    pub async fn alter_table_skewed(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        spec: SkewSpec,
    ) -> Result<SkewedInfo, Error> {
        let payload = self
            .execute(Operation::AlterTableSkewed {
                table: table.clone(),
                partition: partition.map(<[String]>::to_vec),
                spec,
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Skewed(info) => info, "skewed layout")
    }

    /// Storage location for a tuple of skewed-column values.
    pub async fn resolve_location(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        values: &[String],
    ) -> Result<Option<String>, Error> {
        let payload = self
            .execute(Operation::ResolveLocation {
                table: table.clone(),
                partition: partition.map(<[String]>::to_vec),
                values: values.to_vec(),
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Location(l) => l, "location")
    }

    // Rows

    pub async fn insert_rows(&self, table: &TableRef, partition: Option<&[String]>, rows: Vec<Row>) -> Result<u64, Error> {
        let payload = self
            .execute(Operation::InsertRows {
                table: table.clone(),
                partition: partition.map(<[String]>::to_vec),
                rows,
            })
            .await?;
        expect_payload!(payload, ResponsePayload::RowCount(n) => n, "row count")
    }

    pub async fn select(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        predicates: Vec<ColumnPredicate>,
    ) -> Result<ScanResult, Error> {
        let payload = self
            .execute(Operation::Select {
                table: table.clone(),
                partition: partition.map(<[String]>::to_vec),
                predicates,
            })
            .await?;
        expect_payload!(payload, ResponsePayload::Scan(scan) => scan, "scan result")
    }

    /// Replace the stored values of `columns` with NULL.
    pub async fn truncate_columns(
        &self,
        table: &TableRef,
        partition: Option<&[String]>,
        columns: &[String],
    ) -> Result<u64, Error> {
        let payload = self
            .execute(Operation::TruncateColumns {
                table: table.clone(),
                partition: partition.map(<[String]>::to_vec),
                columns: columns.to_vec(),
            })
            .await?;
        expect_payload!(payload, ResponsePayload::RowCount(n) => n, "row count")
    }

    /// Close the client connection.
    pub async fn close(&self) {
        let mut conn = self.connection.lock().await;
        conn.close();
    }

    /// Check if the client is connected.
    pub async fn is_connected(&self) -> bool {
        let conn = self.connection.lock().await;
        conn.is_connected()
    }

    async fn add_of_type(
        &self,
        expected: ConstraintType,
        constraints: Vec<ConstraintDef>,
    ) -> Result<Vec<ConstraintDef>, Error> {
        check_kinds(expected, &constraints)?;
        self.add_constraints(constraints).await
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send one operation, resending it while the configured retry policy allows.
    async fn execute(&self, operation: Operation) -> Result<ResponsePayload, Error> {
        let request = Request::new(self.next_request_id(), operation);
        let mut attempt = 1;
        loop {
            let err = match self.send_request(&request).await.and_then(handle_response) {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };
            if !self.config.should_retry(&request.operation, &err, attempt) {
                return Err(err);
            }
            tracing::debug!(
                operation = request.operation.name(),
                attempt,
                error = %err,
                "Resending request"
            );
            tokio::time::sleep(self.config.backoff(attempt)).await;
            attempt += 1;
        }
    }

    async fn execute_done(&self, operation: Operation) -> Result<(), Error> {
        let payload = self.execute(operation).await?;
        expect_payload!(payload, ResponsePayload::Done => (), "acknowledgement")
    }

    async fn send_request(&self, request: &Request) -> Result<Response, Error> {
        let conn = self.connection.lock().await;
        conn.send_request(request).await
    }
}

/// Extract the payload, or turn an error status into [`Error::Server`].
fn handle_response(response: Response) -> Result<ResponsePayload, Error> {
    match response.status {
        Status::Ok => Ok(response.payload),
        Status::Error { code, message } => Err(Error::Server { code, message }),
    }
}

fn check_kinds(expected: ConstraintType, constraints: &[ConstraintDef]) -> Result<(), Error> {
    match constraints.iter().find(|c| c.constraint_type() != expected) {
        Some(other) => Err(Error::InvalidArgument(format!(
            "expected {:?} constraints, got {:?}",
            expected,
            other.constraint_type()
        ))),
        None => Ok(()),
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("next_request_id", &self.next_request_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metacat_proto::error_codes;

    fn t() -> TableRef {
        TableRef::in_default_catalog("default", "t")
    }

    #[test]
    fn test_check_kinds() {
        let uniques = vec![ConstraintDef::unique(t(), ["a"]), ConstraintDef::unique(t(), ["b"])];
        assert!(check_kinds(ConstraintType::Unique, &uniques).is_ok());

        let mixed = vec![ConstraintDef::unique(t(), ["a"]), ConstraintDef::not_null(t(), "b")];
        assert!(matches!(
            check_kinds(ConstraintType::Unique, &mixed),
            Err(Error::InvalidArgument(_))
        ));
        assert!(check_kinds(ConstraintType::Check, &[]).is_ok());
    }

    #[test]
    fn test_handle_response() {
        let ok = Response::ok(3, ResponsePayload::RowCount(2));
        assert_eq!(handle_response(ok).unwrap(), ResponsePayload::RowCount(2));

        let err = Response::error(4, error_codes::NOT_FOUND, "Table hive.default.t does not exist");
        let err = handle_response(err).unwrap_err();
        assert!(err.is_not_found());
    }
}
