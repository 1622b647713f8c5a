//! Persistence plumbing: configuration, record encoding and the row store.

mod config;
pub(crate) mod counter;
pub(crate) mod record;
mod rows;
pub(crate) mod txn;

pub use config::StoreConfig;
pub use rows::RowStore;

/// Tree name for the number of rows stored at each location.
pub(crate) const ROW_COUNT_TREE: &str = "data:row_counts";

/// Tree name for the layout epoch of each base location. The epoch moves
/// whenever the skewed layout rooted at that location is declared.
pub(crate) const LAYOUT_EPOCH_TREE: &str = "data:layout_epochs";

/// Join a child segment under a storage location.
pub fn join_location(base: &str, child: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), child)
}
