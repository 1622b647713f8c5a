//! Typed reads and writes on sled trees, inside and outside transactions.

use std::time::{SystemTime, UNIX_EPOCH};

use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Tree;

use crate::error::Error;
use crate::storage::record::Record;

pub(crate) type TxResult<T> = Result<T, ConflictableTransactionError<Error>>;

/// Abort the running transaction with `error`.
pub(crate) fn abort<T>(error: Error) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(error))
}

/// Read and decode a record inside a transaction.
pub(crate) fn read<T: Record>(tree: &TransactionalTree, key: &[u8]) -> TxResult<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => T::from_bytes(&bytes)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

/// Encode and write a record inside a transaction.
pub(crate) fn write<T: Record>(tree: &TransactionalTree, key: &[u8], value: &T) -> TxResult<()> {
    let bytes = value.to_bytes().map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key, bytes)?;
    Ok(())
}

/// Unwrap a transaction result into the core error type.
pub(crate) fn finish<T>(result: Result<T, TransactionError<Error>>) -> Result<T, Error> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(e)) => Err(e),
        Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
    }
}

/// Read and decode a record outside a transaction.
pub(crate) fn get<T: Record>(tree: &Tree, key: &[u8]) -> Result<Option<T>, Error> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(T::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Decode every record under a key prefix, in key order.
pub(crate) fn scan<T: Record>(tree: &Tree, prefix: &[u8]) -> Result<Vec<T>, Error> {
    let mut out = Vec::new();
    for item in tree.scan_prefix(prefix) {
        let (_, bytes) = item?;
        out.push(T::from_bytes(&bytes)?);
    }
    Ok(out)
}

/// Keys under a prefix, in key order.
pub(crate) fn scan_keys(tree: &Tree, prefix: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let mut out = Vec::new();
    for item in tree.scan_prefix(prefix) {
        let (key, _) = item?;
        out.push(key.to_vec());
    }
    Ok(out)
}

/// Seconds since the Unix epoch.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
