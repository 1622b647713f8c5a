//! Persistent catalog of catalogs, databases, tables, partitions and constraints.
//!
//! All state lives in sled trees. Every mutating call runs in one sled
//! transaction over the trees it touches, so a logical operation either
//! commits entirely or leaves nothing behind.

mod constraints;
mod drop;
mod keys;
mod partition;
pub mod pattern;
mod store;
mod table;

pub use store::{CatalogStore, DroppedDatabase, DroppedTable};
