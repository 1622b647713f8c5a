//! Column truncation on a list-bucketed partition keeps skewed routing intact.

use metacat_core::proto::{ColumnPredicate, PartitionDef, Row, SkewSpec, TableDef, Value};
use metacat_core::{CatalogStore, RowStore, StoreConfig};

fn open() -> (CatalogStore, RowStore) {
    let config = StoreConfig::temporary().with_warehouse("file:/warehouse");
    let db = config.open_db().unwrap();
    (CatalogStore::open(&db, &config).unwrap(), RowStore::open(&db).unwrap())
}

#[test]
fn truncate_column_on_skewed_partition() {
    let (catalog, rows) = open();

    let table = catalog
        .create_table(
            TableDef::new("test_tab")
                .with_column("key", "string")
                .with_column("value", "string")
                .with_partition_key("part", "string"),
        )
        .unwrap();
    let t = table.table_ref();
    catalog
        .alter_table_skewed(&t, None, &SkewSpec::single("key", ["484"]))
        .unwrap();
    catalog.add_partition(PartitionDef::new(&t, ["1"])).unwrap();

    let part = vec!["1".to_string()];
    let (table, layout) = catalog.data_layout(&t, Some(part.as_slice())).unwrap().unwrap();
    rows.insert_rows(
        &table,
        &layout,
        &[Row::new(["484", "val_484"]), Row::new(["0", "val_0"])],
    )
    .unwrap();

    let hot_before = catalog.resolve_location(&t, Some(part.as_slice()), &["484".to_string()]).unwrap();
    let cold_before = catalog.resolve_location(&t, Some(part.as_slice()), &["0".to_string()]).unwrap();
    assert_eq!(hot_before.as_deref(), Some("file:/warehouse/test_tab/part=1/key=484"));
    assert_eq!(
        cold_before.as_deref(),
        Some("file:/warehouse/test_tab/part=1/HIVE_DEFAULT_LIST_BUCKETING_DIR_NAME")
    );

    rows.truncate_columns(&table, &layout, &["value".to_string()])
        .unwrap();

    // Re-read the layout from the catalog: truncation must not have touched it.
    let (table, layout) = catalog.data_layout(&t, Some(part.as_slice())).unwrap().unwrap();
    assert_eq!(
        catalog.resolve_location(&t, Some(part.as_slice()), &["484".to_string()]).unwrap(),
        hot_before
    );
    assert_eq!(
        catalog.resolve_location(&t, Some(part.as_slice()), &["0".to_string()]).unwrap(),
        cold_before
    );

    let hot = rows
        .select(&table, &layout, &[ColumnPredicate::eq("key", "484")])
        .unwrap();
    assert_eq!(hot.locations_scanned, vec![hot_before.unwrap()]);
    assert_eq!(hot.rows, vec![Row::new(vec![Value::from("484"), Value::Null])]);

    let cold = rows
        .select(&table, &layout, &[ColumnPredicate::eq("key", "0")])
        .unwrap();
    assert_eq!(cold.locations_scanned, vec![cold_before.unwrap()]);
    assert_eq!(cold.rows, vec![Row::new(vec![Value::from("0"), Value::Null])]);
}

#[test]
fn absent_value_routes_to_default_without_rows() {
    let (catalog, _rows) = open();
    let t = catalog
        .create_table(
            TableDef::new("skewed")
                .with_column("key", "string")
                .with_column("value", "string"),
        )
        .unwrap()
        .table_ref();
    catalog
        .alter_table_skewed(&t, None, &SkewSpec::single("key", ["484"]))
        .unwrap();

    let location = catalog
        .resolve_location(&t, None, &["never-inserted".to_string()])
        .unwrap();
    assert_eq!(
        location.as_deref(),
        Some("file:/warehouse/skewed/HIVE_DEFAULT_LIST_BUCKETING_DIR_NAME")
    );
}
