//! Column truncation on a list-bucketed partition, driven through requests.

use std::sync::Arc;

use metacat_proto::{
    error_codes, ColumnPredicate, Operation, PartitionDef, Request, Response, ResponsePayload,
    Row, ScanResult, SkewSpec, Status, TableDef, TableRef, Value,
};
use metacat_server::{CatalogService, RequestHandler};

struct Session {
    handler: RequestHandler,
    next_id: u64,
}

impl Session {
    fn new() -> Self {
        let service = CatalogService::temporary("file:/user/hive/warehouse").unwrap();
        Self {
            handler: RequestHandler::new(Arc::new(service)),
            next_id: 1,
        }
    }

    fn send(&mut self, operation: Operation) -> Response {
        let id = self.next_id;
        self.next_id += 1;
        let response = self.handler.handle(&Request::new(id, operation));
        assert_eq!(response.id, id);
        response
    }

    fn ok(&mut self, operation: Operation) -> ResponsePayload {
        let response = self.send(operation);
        assert!(response.status.is_ok(), "unexpected error: {:?}", response.status);
        response.payload
    }

    fn location(&mut self, table: &TableRef, part: &[String], key: &str) -> String {
        match self.ok(Operation::ResolveLocation {
            table: table.clone(),
            partition: Some(part.to_vec()),
            values: vec![key.to_string()],
        }) {
            ResponsePayload::Location(Some(location)) => location,
            other => panic!("expected a location, got {:?}", other),
        }
    }

    fn select_key(&mut self, table: &TableRef, part: &[String], key: &str) -> ScanResult {
        match self.ok(Operation::Select {
            table: table.clone(),
            partition: Some(part.to_vec()),
            predicates: vec![ColumnPredicate::eq("key", key)],
        }) {
            ResponsePayload::Scan(scan) => scan,
            other => panic!("expected a scan, got {:?}", other),
        }
    }
}

const BASE: &str = "file:/user/hive/warehouse/test_tab/part=1";
const HOT: &str = "file:/user/hive/warehouse/test_tab/part=1/key=484";
const DEFAULT_DIR: &str = "file:/user/hive/warehouse/test_tab/part=1/HIVE_DEFAULT_LIST_BUCKETING_DIR_NAME";

fn skewed_table(session: &mut Session) -> (TableRef, Vec<String>) {
    let table = TableDef::new("test_tab")
        .with_column("key", "string")
        .with_column("value", "string")
        .with_partition_key("part", "string");
    let t = table.table_ref();
    session.ok(Operation::CreateTable(table));
    session.ok(Operation::AlterTableSkewed {
        table: t.clone(),
        partition: None,
        spec: SkewSpec::single("key", ["484"]),
    });

    let part = vec!["1".to_string()];
    match session.ok(Operation::AddPartition(PartitionDef::new(&t, ["1"]))) {
        ResponsePayload::Partition(Some(p)) => {
            assert_eq!(p.location.as_deref(), Some(BASE));
            let skewed = p.skewed.expect("partition inherits the table's skew");
            assert_eq!(skewed.default_location, DEFAULT_DIR);
        }
        other => panic!("expected a partition, got {:?}", other),
    }
    (t, part)
}

#[test]
fn truncate_keeps_skewed_directories() {
    let mut session = Session::new();
    let (t, part) = skewed_table(&mut session);

    let inserted = session.ok(Operation::InsertRows {
        table: t.clone(),
        partition: Some(part.clone()),
        rows: vec![Row::new(["484", "val_484"]), Row::new(["0", "val_0"])],
    });
    assert_eq!(inserted, ResponsePayload::RowCount(2));

    assert_eq!(session.location(&t, &part, "484"), HOT);
    assert_eq!(session.location(&t, &part, "0"), DEFAULT_DIR);

    let hot = session.select_key(&t, &part, "484");
    assert_eq!(hot.locations_scanned, vec![HOT.to_string()]);
    assert_eq!(hot.rows[0].get(1), Some(&Value::from("val_484")));

    let truncated = session.ok(Operation::TruncateColumns {
        table: t.clone(),
        partition: Some(part.clone()),
        columns: vec!["value".to_string()],
    });
    assert_eq!(truncated, ResponsePayload::RowCount(2));

    assert_eq!(session.location(&t, &part, "484"), HOT);
    assert_eq!(session.location(&t, &part, "0"), DEFAULT_DIR);

    let hot = session.select_key(&t, &part, "484");
    assert!(hot.pruned_to(HOT));
    assert_eq!(hot.rows, vec![Row::new([Value::from("484"), Value::Null])]);

    let cold = session.select_key(&t, &part, "0");
    assert!(cold.pruned_to(DEFAULT_DIR));
    assert_eq!(cold.rows, vec![Row::new([Value::from("0"), Value::Null])]);
}

#[test]
fn absent_value_prunes_to_default_without_rows() {
    let mut session = Session::new();
    let (t, part) = skewed_table(&mut session);

    assert_eq!(session.location(&t, &part, "1000"), DEFAULT_DIR);
    let scan = session.select_key(&t, &part, "1000");
    assert!(scan.pruned_to(DEFAULT_DIR));
    assert!(scan.is_empty());
}

#[test]
fn truncating_skewed_column_is_rejected() {
    let mut session = Session::new();
    let (t, part) = skewed_table(&mut session);

    for column in ["key", "part"] {
        let response = session.send(Operation::TruncateColumns {
            table: t.clone(),
            partition: Some(part.clone()),
            columns: vec![column.to_string()],
        });
        assert!(matches!(
            response.status,
            Status::Error { code: error_codes::INVALID_OPERATION, .. }
        ));
    }
}

#[test]
fn partitioned_table_needs_partition() {
    let mut session = Session::new();
    let (t, _) = skewed_table(&mut session);

    let response = session.send(Operation::TruncateColumns {
        table: t,
        partition: None,
        columns: vec!["value".to_string()],
    });
    assert!(matches!(
        response.status,
        Status::Error { code: error_codes::INVALID_OPERATION, .. }
    ));
}
