//! Unsigned counters stored as big-endian `u64` values.
//!
//! sled transactions cannot scan, so anything a transaction must re-check
//! about a key range (children of a parent, rows under a location) is kept
//! as a counter under one key that every writer of the range updates.

use sled::transaction::{TransactionalTree, UnabortableTransactionError};
use sled::Tree;

fn decode(bytes: &[u8]) -> u64 {
    <[u8; 8]>::try_from(bytes).map(u64::from_be_bytes).unwrap_or(0)
}

/// Current value inside a transaction. Absent keys read as zero.
pub(crate) fn read(tree: &TransactionalTree, key: &[u8]) -> Result<u64, UnabortableTransactionError> {
    Ok(tree.get(key)?.map_or(0, |bytes| decode(&bytes)))
}

/// Add `delta` inside a transaction and return the new value. A counter
/// that reaches zero is removed.
pub(crate) fn add(tree: &TransactionalTree, key: &[u8], delta: i64) -> Result<u64, UnabortableTransactionError> {
    let value = read(tree, key)?.saturating_add_signed(delta);
    if value == 0 {
        tree.remove(key)?;
    } else {
        tree.insert(key, value.to_be_bytes().to_vec())?;
    }
    Ok(value)
}

/// Remove a counter inside a transaction.
pub(crate) fn clear(tree: &TransactionalTree, key: &[u8]) -> Result<(), UnabortableTransactionError> {
    tree.remove(key)?;
    Ok(())
}

/// Current value outside a transaction.
pub(crate) fn get(tree: &Tree, key: &[u8]) -> Result<u64, sled::Error> {
    Ok(tree.get(key)?.map_or(0, |bytes| decode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sled::transaction::TransactionError;

    #[test]
    fn test_add_and_remove_at_zero() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let tree = db.open_tree("counters").unwrap();

        let result: Result<(u64, u64), TransactionError<()>> = tree.transaction(|tx| {
            let up = add(tx, b"k", 2)?;
            let down = add(tx, b"k", -1)?;
            Ok((up, down))
        });
        assert_eq!(result.unwrap(), (2, 1));
        assert_eq!(get(&tree, b"k").unwrap(), 1);

        let result: Result<u64, TransactionError<()>> = tree.transaction(|tx| Ok(add(tx, b"k", -5)?));
        assert_eq!(result.unwrap(), 0);
        assert!(tree.get(b"k").unwrap().is_none());
        assert_eq!(get(&tree, b"missing").unwrap(), 0);
    }
}
