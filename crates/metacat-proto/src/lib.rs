//! Metacat object model and wire protocol.
//!
//! This crate defines the catalog objects (catalogs, databases, tables,
//! partitions), constraint declarations, skewed-value layouts and the
//! request/response envelopes exchanged between client and server.
//!
//! # Modules
//!
//! - [`object`] - Catalog, database, table, column and partition definitions
//! - [`constraint`] - Constraint kinds and grouped constraint sets
//! - [`skew`] - Skewed-value ("list bucketing") declarations and layouts
//! - [`value`] - Cell values and rows
//! - [`scan`] - Row predicates and scan results
//! - [`message`] - Request/response message wrappers
//! - [`framing`] - Length-prefixed message framing
//! - [`error`] - Protocol error types
//!
//! # Serialization
//!
//! All types derive `rkyv::Archive`, `rkyv::Serialize` and `rkyv::Deserialize`
//! and are stored and sent as rkyv bytes. They also derive serde traits for
//! tooling that wants a readable form.

pub mod constraint;
pub mod error;
pub mod framing;
pub mod message;
pub mod object;
pub mod scan;
pub mod skew;
pub mod value;

pub use error::Error;

pub use constraint::{ConstraintDef, ConstraintKind, ConstraintType, ReferentialAction, TableConstraints};
pub use message::{error_codes, Operation, Request, Response, ResponsePayload, Status};
pub use object::{
    escape_path_name, partition_name, CatalogDef, ColumnDef, DatabaseDef, DatabaseRef,
    PartitionDef, TableDef, TableRef, TableType, DEFAULT_CATALOG_NAME, DEFAULT_DATABASE_NAME,
};
pub use scan::{ColumnPredicate, ScanResult};
pub use skew::{tuple_key, SkewSpec, SkewedInfo, DEFAULT_SKEW_DIR_NAME};
pub use value::{Row, Value};

/// Protocol version for wire compatibility.
pub const PROTOCOL_VERSION: u32 = 1;
