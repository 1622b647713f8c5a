//! rkyv encoding of persisted catalog records.

use metacat_proto::{CatalogDef, ConstraintDef, DatabaseDef, PartitionDef, Row, TableConstraints, TableDef};

use crate::error::Error;

/// A value stored as rkyv bytes in a sled tree.
pub(crate) trait Record: Sized {
    /// Serialize to bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, Error>;

    /// Deserialize from bytes. sled values carry no alignment guarantee, so
    /// the bytes are copied into an aligned buffer first.
    fn from_bytes(bytes: &[u8]) -> Result<Self, Error>;
}

macro_rules! impl_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Record for $ty {
                fn to_bytes(&self) -> Result<Vec<u8>, Error> {
                    rkyv::to_bytes::<rkyv::rancor::Error>(self)
                        .map(|v| v.to_vec())
                        .map_err(|e| Error::Serialization(e.to_string()))
                }

                fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                    let mut aligned: rkyv::util::AlignedVec<16> = rkyv::util::AlignedVec::new();
                    aligned.extend_from_slice(bytes);
                    rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                        .map_err(|e| Error::Deserialization(e.to_string()))
                }
            }
        )*
    };
}

impl_record!(
    CatalogDef,
    DatabaseDef,
    TableDef,
    PartitionDef,
    ConstraintDef,
    TableConstraints,
    Row,
);

#[cfg(test)]
mod tests {
    use super::*;
    use metacat_proto::{TableRef, Value};

    #[test]
    fn test_table_record_roundtrip() {
        let table = TableDef::new("test_table_1")
            .with_column("col1", "int")
            .with_column("col2", "varchar(32)")
            .with_location("file:/warehouse/test_table_1");
        let bytes = table.to_bytes().unwrap();
        assert_eq!(TableDef::from_bytes(&bytes).unwrap(), table);
    }

    #[test]
    fn test_unaligned_input() {
        let row = Row::new(vec![Value::from("484"), Value::from("val_484")]);
        let bytes = row.to_bytes().unwrap();

        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        assert_eq!(Row::from_bytes(&shifted[1..]).unwrap(), row);
    }

    #[test]
    fn test_garbage_rejected() {
        let constraint = ConstraintDef::unique(TableRef::in_default_catalog("default", "t"), ["c"]);
        assert!(!constraint.to_bytes().unwrap().is_empty());

        let result = TableConstraints::from_bytes(&[0xFF; 3]);
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }
}
