//! Metacat Core - catalog store, constraint manager and skewed-value index.
//!
//! This crate owns every piece of persistent catalog state. The constraint
//! manager and the skewed-value index are pure functions over that state and
//! are invoked from inside the store's transactions.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod constraint;
pub mod error;
pub mod skew;
pub mod storage;

pub use catalog::{CatalogStore, DroppedDatabase, DroppedTable};
pub use error::Error;
pub use skew::DataLayout;
pub use storage::{RowStore, StoreConfig};

/// Re-export protocol types.
pub use metacat_proto as proto;
