//! Constraint manager.
//!
//! Validation and naming of constraint batches. Everything here is pure:
//! the catalog store reads the current state inside its transaction, hands
//! it to [`ConstraintValidator`], and persists the prepared batch.

mod validator;

use metacat_proto::{ConstraintType, TableRef};

pub use validator::{ConstraintValidator, ParentTable};

/// Name given to an unnamed constraint.
///
/// The name depends only on the table and the kind, so a table holds at most
/// one unnamed constraint of each kind.
pub fn derive_name(table: &str, constraint_type: ConstraintType) -> String {
    format!("{}_{}", table, constraint_type.suffix()).to_lowercase()
}

/// Lookup key of a table inside a batch's parent map.
pub fn parent_key(table: &TableRef) -> String {
    format!("{}\0{}\0{}", table.catalog, table.database, table.table).to_lowercase()
}
