//! Request handler for processing client requests.

use std::sync::Arc;

use metacat_proto::{error_codes, Operation, Request, Response, ResponsePayload};

use crate::error::Error;
use crate::service::CatalogService;

/// Handles incoming requests and dispatches them to the catalog service.
pub struct RequestHandler {
    service: Arc<CatalogService>,
}

impl RequestHandler {
    /// Create a new request handler over the given service.
    pub fn new(service: Arc<CatalogService>) -> Self {
        Self { service }
    }

    /// The service requests are dispatched to.
    pub fn service(&self) -> &CatalogService {
        &self.service
    }

    /// Handle a request and return a response.
    pub fn handle(&self, request: &Request) -> Response {
        let result = self.handle_inner(request);

        match result {
            Ok(payload) => Response::ok(request.id, payload),
            Err(e) => {
                tracing::debug!(
                    request_id = request.id,
                    operation = request.operation.name(),
                    error = %e,
                    "request failed"
                );
                self.error_response(request.id, e)
            }
        }
    }

    /// Internal handler that can return errors.
    fn handle_inner(&self, request: &Request) -> Result<ResponsePayload, Error> {
        let svc = &self.service;

        let payload = match &request.operation {
            Operation::Ping => ResponsePayload::Pong,

            Operation::CreateCatalog(catalog) => {
                ResponsePayload::Catalog(Some(svc.create_catalog(catalog.clone())?))
            }
            Operation::GetCatalog { name } => ResponsePayload::Catalog(svc.get_catalog(name)?),
            Operation::ListCatalogs => ResponsePayload::Catalogs(svc.list_catalogs()?),
            Operation::DropCatalog { name, ignore_unknown } => {
                svc.drop_catalog(name, *ignore_unknown)?;
                ResponsePayload::Done
            }

            Operation::CreateDatabase(database) => {
                ResponsePayload::Database(Some(svc.create_database(database.clone())?))
            }
            Operation::GetDatabase(database) => ResponsePayload::Database(svc.get_database(database)?),
            Operation::ListDatabases { catalog } => ResponsePayload::Databases(svc.list_databases(catalog)?),
            Operation::DropDatabase {
                database,
                delete_data,
                ignore_unknown,
                cascade,
            } => {
                svc.drop_database(database, *delete_data, *ignore_unknown, *cascade)?;
                ResponsePayload::Done
            }

            Operation::CreateTable(table) => ResponsePayload::Table(Some(svc.create_table(table.clone())?)),
            Operation::CreateTableWithConstraints { table, constraints } => {
                let (table, constraints) =
                    svc.create_table_with_constraints(table.clone(), constraints.clone())?;
                ResponsePayload::CreatedTable { table, constraints }
            }
            Operation::GetTable(table) => ResponsePayload::Table(svc.get_table(table)?),
            Operation::ListTables { database, pattern } => {
                ResponsePayload::TableNames(svc.list_tables(database, pattern.as_deref())?)
            }
            Operation::AlterTable(table) => ResponsePayload::Table(Some(svc.alter_table(table.clone())?)),
            Operation::DropTable {
                table,
                delete_data,
                ignore_unknown,
            } => {
                svc.drop_table(table, *delete_data, *ignore_unknown)?;
                ResponsePayload::Done
            }

            Operation::AddPartition(partition) => {
                ResponsePayload::Partition(Some(svc.add_partition(partition.clone())?))
            }
            Operation::GetPartition { table, values } => {
                ResponsePayload::Partition(svc.get_partition(table, values)?)
            }
            Operation::ListPartitions(table) => ResponsePayload::Partitions(svc.list_partitions(table)?),
            Operation::DropPartition {
                table,
                values,
                delete_data,
                ignore_unknown,
            } => {
                svc.drop_partition(table, values, *delete_data, *ignore_unknown)?;
                ResponsePayload::Done
            }

            Operation::AddConstraints(batch) => ResponsePayload::Constraints(svc.add_constraints(batch.clone())?),
            Operation::GetConstraints { table, constraint_type } => {
                ResponsePayload::Constraints(svc.get_constraints(table, *constraint_type)?)
            }
            Operation::GetTableConstraints(table) => {
                ResponsePayload::TableConstraints(svc.get_table_constraints(table)?)
            }
            Operation::GetForeignKeysReferencing(parent) => {
                ResponsePayload::Constraints(svc.get_foreign_keys_referencing(parent)?)
            }
            Operation::DropConstraint { table, name } => {
                svc.drop_constraint(table, name)?;
                ResponsePayload::Done
            }

            Operation::AlterTableSkewed { table, partition, spec } => {
                ResponsePayload::Skewed(svc.alter_table_skewed(table, partition.as_deref(), spec)?)
            }
            Operation::ResolveLocation {
                table,
                partition,
                values,
            } => ResponsePayload::Location(svc.resolve_location(table, partition.as_deref(), values)?),

            Operation::InsertRows { table, partition, rows } => {
                ResponsePayload::RowCount(svc.insert_rows(table, partition.as_deref(), rows)?)
            }
            Operation::Select {
                table,
                partition,
                predicates,
            } => ResponsePayload::Scan(svc.select(table, partition.as_deref(), predicates)?),
            Operation::TruncateColumns {
                table,
                partition,
                columns,
            } => ResponsePayload::RowCount(svc.truncate_columns(table, partition.as_deref(), columns)?),
        };

        Ok(payload)
    }

    /// Convert an error to an error response.
    fn error_response(&self, request_id: u64, error: Error) -> Response {
        let code = error_code(&error);
        if code == error_codes::STORE_UNAVAILABLE || code == error_codes::INTERNAL {
            tracing::error!(request_id, error = %error, "request failed in the store");
        }
        Response::error(request_id, code, error.to_string())
    }
}

/// Wire error code of a server error.
pub fn error_code(error: &Error) -> u32 {
    use metacat_core::Error as Core;

    match error {
        Error::Catalog(e) if e.is_store_failure() => error_codes::STORE_UNAVAILABLE,
        Error::Catalog(e) => match e {
            Core::NotFound(_) => error_codes::NOT_FOUND,
            Core::InvalidSchemaObject(_) => error_codes::INVALID_OBJECT,
            Core::AlreadyExists(_) => error_codes::ALREADY_EXISTS,
            Core::InvalidOperation(_) => error_codes::INVALID_OPERATION,
            _ => error_codes::INTERNAL,
        },
        Error::Protocol(_) => error_codes::INVALID_REQUEST,
        Error::Transport(_) | Error::Config(_) | Error::Io(_) => error_codes::INTERNAL,
    }
}
