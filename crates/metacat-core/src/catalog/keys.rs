//! Tree key encoding.
//!
//! Names are lower-cased and joined with a `\0` separator so that lookups
//! are case-insensitive and a parent's key followed by `\0` is a prefix of
//! every child key. The same parent key also names the parent's child
//! counter.

use metacat_proto::{DatabaseRef, TableRef};

const SEP: u8 = 0;

fn join(parts: &[&str]) -> Vec<u8> {
    let mut key = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(part.to_lowercase().as_bytes());
    }
    key
}

/// Key of a catalog.
pub(crate) fn catalog(name: &str) -> Vec<u8> {
    join(&[name])
}

/// Key of a database.
pub(crate) fn database(db: &DatabaseRef) -> Vec<u8> {
    join(&[&db.catalog, &db.database])
}

/// Prefix of every key nested under `parent`.
pub(crate) fn children(parent: &[u8]) -> Vec<u8> {
    let mut key = parent.to_vec();
    key.push(SEP);
    key
}

/// Prefix of every database key in a catalog.
pub(crate) fn databases_of(catalog_name: &str) -> Vec<u8> {
    children(&catalog(catalog_name))
}

/// Key of a table. Also keys the table's constraint set.
pub(crate) fn table(table: &TableRef) -> Vec<u8> {
    join(&[&table.catalog, &table.database, &table.table])
}

/// Prefix of every table key in a database.
pub(crate) fn tables_of(db: &DatabaseRef) -> Vec<u8> {
    children(&database(db))
}

/// Key of a partition. Partition values keep their case.
pub(crate) fn partition(table_ref: &TableRef, values: &[String]) -> Vec<u8> {
    let mut key = partitions_of(table_ref);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            key.push(SEP);
        }
        key.extend_from_slice(value.as_bytes());
    }
    key
}

/// Prefix of every partition key of a table.
pub(crate) fn partitions_of(table_ref: &TableRef) -> Vec<u8> {
    children(&table(table_ref))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_keys() {
        assert_eq!(
            table(&TableRef::new("Hive", "Default", "T1")),
            table(&TableRef::new("hive", "default", "t1"))
        );
    }

    #[test]
    fn test_prefixes_do_not_cross_names() {
        let db = DatabaseRef::new("hive", "default");
        let t1 = table(&TableRef::new("hive", "default", "t1"));
        let other_db = table(&TableRef::new("hive", "default2", "t1"));

        assert!(t1.starts_with(&tables_of(&db)));
        assert!(!other_db.starts_with(&tables_of(&db)));
        assert!(!table(&TableRef::new("hive", "default", "t10"))
            .starts_with(&partitions_of(&TableRef::new("hive", "default", "t1"))));
    }

    #[test]
    fn test_partition_values_keep_case() {
        let t = TableRef::new("hive", "default", "t");
        assert_ne!(
            partition(&t, &["A".to_string()]),
            partition(&t, &["a".to_string()])
        );
    }
}
