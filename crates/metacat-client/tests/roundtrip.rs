//! Client against an in-process server over IPC.

use std::sync::Arc;
use std::thread::JoinHandle;

use metacat_client::proto::{
    CatalogDef, ColumnPredicate, ConstraintDef, ConstraintType, DatabaseRef, Row, SkewSpec,
    TableConstraints, TableDef, TableRef, Value,
};
use metacat_client::{Client, ClientConfig, Error};
use metacat_server::{create_transport, CatalogService, RequestHandler, ServerConfig};
use tokio::sync::broadcast;

struct TestServer {
    address: String,
    shutdown: broadcast::Sender<()>,
    thread: Option<JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// `None` when the sandbox forbids IPC sockets.
    fn start() -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let address = format!("ipc://{}", dir.path().join("metacat.sock").display());
        let config = ServerConfig::new(dir.path().join("data"))
            .without_tcp()
            .with_ipc_address(address.clone())
            .with_warehouse("file:/wh")
            .with_transport_workers(2);

        let service = Arc::new(CatalogService::open(&config.store_config()).unwrap());
        let handler = Arc::new(RequestHandler::new(service));
        let transport = match create_transport(&config, handler) {
            Ok(transport) => transport,
            Err(metacat_server::Error::Transport(msg)) if msg.contains("Permission denied") => return None,
            Err(e) => panic!("failed to start server: {e}"),
        };

        let (shutdown, rx) = broadcast::channel(1);
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(transport.run_until_shutdown(rx)).unwrap();
        });

        Some(Self {
            address,
            shutdown,
            thread: Some(thread),
            _dir: dir,
        })
    }

    async fn client(&self) -> Client {
        Client::connect(ClientConfig::new(self.address.clone())).await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn table(name: &str) -> TableDef {
    TableDef::new(name)
        .with_column("col1", "int")
        .with_column("col2", "varchar(32)")
}

#[tokio::test]
async fn ping_and_close() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;

    client.ping().await.unwrap();
    assert!(client.is_connected().await);

    client.close().await;
    assert!(!client.is_connected().await);
    assert!(matches!(client.ping().await, Err(Error::Connection(_))));
}

#[tokio::test]
async fn unique_constraint_lifecycle() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;

    let t = client.create_table(table("test_uc_table")).await.unwrap().table_ref();
    assert!(client.get_unique_constraints(&t).await.unwrap().is_empty());

    let added = client
        .add_unique_constraint(vec![ConstraintDef::unique(t.clone(), ["col1"])])
        .await
        .unwrap();
    assert_eq!(added[0].name(), Some("test_uc_table_uk"));

    let err = client
        .add_unique_constraint(vec![ConstraintDef::unique(t.clone(), ["col2"])])
        .await
        .unwrap_err();
    assert!(err.is_already_exists(), "{err}");

    client.drop_constraint(&t, "test_uc_table_uk").await.unwrap();
    assert!(client.get_unique_constraints(&t).await.unwrap().is_empty());

    let err = client.drop_constraint(&t, "test_uc_table_uk").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn lenient_reads_and_strict_writes() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;

    let missing = TableRef::new("no_such_catalog", "default", "t");
    assert!(client.get_table(&missing).await.unwrap().is_none());
    assert!(client.get_unique_constraints(&missing).await.unwrap().is_empty());
    assert!(client.get_catalog("no_such_catalog").await.unwrap().is_none());

    let err = client
        .add_primary_key(vec![ConstraintDef::primary_key(missing.clone(), ["col1"])])
        .await
        .unwrap_err();
    assert!(err.is_invalid_object());

    let err = client.drop_table(&missing, false, false).await.unwrap_err();
    assert!(err.is_not_found());
    client.drop_table(&missing, false, true).await.unwrap();
}

#[tokio::test]
async fn typed_add_rejects_other_kinds() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;
    let t = client.create_table(table("typed")).await.unwrap().table_ref();

    let err = client
        .add_unique_constraint(vec![ConstraintDef::not_null(t.clone(), "col1")])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(client.get_all_table_constraints(&t).await.unwrap().is_empty());
}

#[tokio::test]
async fn catalogs_are_isolated() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;

    client
        .create_catalog(CatalogDef::new("spark", "file:/spark"))
        .await
        .unwrap();
    let in_hive = client.create_table(table("shared")).await.unwrap().table_ref();
    let in_spark = client
        .create_table(table("shared").in_database("spark", "default"))
        .await
        .unwrap()
        .table_ref();
    assert_eq!(
        client.get_table(&in_spark).await.unwrap().unwrap().location.as_deref(),
        Some("file:/spark/shared")
    );

    client
        .create_table_with_constraints(
            TableDef::new("keyed").with_column("id", "bigint"),
            TableConstraints::from_list([ConstraintDef::primary_key(
                TableRef::in_default_catalog("default", "keyed"),
                ["id"],
            )]),
        )
        .await
        .unwrap();

    client.drop_table(&in_hive, true, false).await.unwrap();
    assert!(client.get_table(&in_spark).await.unwrap().is_some());
    assert_eq!(
        client
            .list_tables(&DatabaseRef::new("hive", "default"), None)
            .await
            .unwrap(),
        vec!["keyed"]
    );
    assert_eq!(
        client
            .get_constraints(&TableRef::in_default_catalog("default", "keyed"), ConstraintType::PrimaryKey)
            .await
            .unwrap()
            .len(),
        1
    );

    let err = client.drop_catalog("spark", false).await.unwrap_err();
    assert!(err.is_invalid_operation());
    client.drop_table(&in_spark, true, false).await.unwrap();
    client.drop_catalog("spark", false).await.unwrap();
    assert!(client.get_catalog("spark").await.unwrap().is_none());
}

#[tokio::test]
async fn list_bucketing_truncate() {
    let Some(server) = TestServer::start() else { return };
    let client = server.client().await;

    let t = client
        .create_table(
            TableDef::new("test_tab")
                .with_column("key", "string")
                .with_column("value", "string")
                .with_partition_key("part", "string"),
        )
        .await
        .unwrap()
        .table_ref();
    client
        .alter_table_skewed(&t, None, SkewSpec::single("key", ["484"]))
        .await
        .unwrap();

    let part = vec!["1".to_string()];
    let inserted = client
        .insert_rows(
            &t,
            Some(part.as_slice()),
            vec![Row::new(["484", "val_484"]), Row::new(["0", "val_0"])],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    client
        .truncate_columns(&t, Some(part.as_slice()), &["value".to_string()])
        .await
        .unwrap();

    let hot = client
        .select(&t, Some(part.as_slice()), vec![ColumnPredicate::eq("key", "484")])
        .await
        .unwrap();
    assert!(hot.pruned_to("file:/wh/test_tab/part=1/key=484"));
    assert_eq!(hot.rows, vec![Row::new([Value::from("484"), Value::Null])]);

    let location = client
        .resolve_location(&t, Some(part.as_slice()), &["0".to_string()])
        .await
        .unwrap();
    assert_eq!(
        location.as_deref(),
        Some("file:/wh/test_tab/part=1/HIVE_DEFAULT_LIST_BUCKETING_DIR_NAME")
    );
}
