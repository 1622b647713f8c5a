//! Metastore server configuration.
//!
//! [`ServerConfig`] says where the catalog lives on disk, which warehouse
//! root the bootstrapped `hive` catalog places managed tables under, and
//! where metastore clients reach the server. [`Args`] is its command line.

use clap::Parser;
use metacat_core::StoreConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Default metastore TCP address, on the conventional metastore port.
pub const DEFAULT_TCP_ADDRESS: &str = "tcp://0.0.0.0:9083";

/// Default threshold, in seconds, above which a metastore call is logged as slow.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default limit on one encoded request or response (16 MB). Row inserts and
/// selects are the largest messages.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default warehouse root of the bootstrapped catalog.
pub const DEFAULT_WAREHOUSE: &str = "file:/user/hive/warehouse";

fn default_transport_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .max(1)
}

/// Metastore server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP address metastore clients dial, e.g. `tcp://0.0.0.0:9083`.
    pub tcp_address: Option<String>,

    /// IPC address for clients on the same host, e.g. `ipc:///tmp/metacat.sock`.
    pub ipc_address: Option<String>,

    /// Directory of the sled database holding catalogs, tables, constraints and rows.
    pub data_path: PathBuf,

    /// Warehouse root of the default catalog. Managed tables without an
    /// explicit location land under `<warehouse>/<table>` or
    /// `<warehouse>/<database>.db/<table>`.
    pub warehouse: String,

    /// Metastore calls slower than this are logged with their operation name.
    /// Calls are never cut off.
    pub request_timeout: Duration,

    /// Largest encoded request or response accepted, in bytes.
    pub max_message_size: usize,

    /// Metastore calls served concurrently, one NNG context each.
    pub transport_workers: usize,
}

impl ServerConfig {
    /// Configuration for a catalog stored under `data_path`, served on the
    /// default TCP address.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            tcp_address: Some(DEFAULT_TCP_ADDRESS.to_string()),
            ipc_address: None,
            data_path: data_path.into(),
            warehouse: DEFAULT_WAREHOUSE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            transport_workers: default_transport_workers(),
        }
    }

    pub fn with_tcp_address(mut self, address: impl Into<String>) -> Self {
        self.tcp_address = Some(address.into());
        self
    }

    /// Serve IPC clients only.
    pub fn without_tcp(mut self) -> Self {
        self.tcp_address = None;
        self
    }

    pub fn with_ipc_address(mut self, address: impl Into<String>) -> Self {
        self.ipc_address = Some(address.into());
        self
    }

    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = warehouse.into();
        self
    }

    /// Set the slow-call logging threshold.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the number of concurrently served calls. At least one.
    pub fn with_transport_workers(mut self, workers: usize) -> Self {
        self.transport_workers = workers.max(1);
        self
    }

    /// Whether clients can reach the server at all.
    pub fn has_transport(&self) -> bool {
        self.tcp_address.is_some() || self.ipc_address.is_some()
    }

    /// Store configuration for the catalog under `data_path`.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.data_path.clone()).with_warehouse(self.warehouse.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("./data")
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "metacat-server")]
#[command(version, about = "Metacat metastore server: catalogs, tables, constraints and skewed layouts", long_about = None)]
pub struct Args {
    /// Directory holding the catalog database.
    #[arg(short, long, default_value = "./data")]
    pub data_path: PathBuf,

    /// Warehouse root of the bootstrapped `hive` catalog.
    #[arg(long, default_value = DEFAULT_WAREHOUSE)]
    pub warehouse: String,

    /// TCP address for metastore clients.
    #[arg(long, default_value = DEFAULT_TCP_ADDRESS)]
    pub tcp: String,

    /// Additional IPC address for local clients.
    #[arg(long)]
    pub ipc: Option<String>,

    /// Log metastore calls slower than this many seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Largest request or response, in megabytes.
    #[arg(long, default_value_t = 16)]
    pub max_message_mb: usize,

    /// Serve IPC only; needs --ipc.
    #[arg(long)]
    pub no_tcp: bool,

    /// Concurrently served calls (0 = one per CPU).
    #[arg(long, default_value_t = 0)]
    pub workers: usize,
}

impl Args {
    /// Build the server configuration.
    pub fn into_config(self) -> ServerConfig {
        let tcp_address = if self.no_tcp { None } else { Some(self.tcp) };
        let transport_workers = if self.workers == 0 {
            default_transport_workers()
        } else {
            self.workers.max(1)
        };

        ServerConfig {
            tcp_address,
            ipc_address: self.ipc,
            data_path: self.data_path,
            warehouse: self.warehouse,
            request_timeout: Duration::from_secs(self.timeout),
            max_message_size: self.max_message_mb * 1024 * 1024,
            transport_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tcp_address, Some(DEFAULT_TCP_ADDRESS.to_string()));
        assert!(config.ipc_address.is_none());
        assert_eq!(config.data_path, PathBuf::from("./data"));
        assert_eq!(config.warehouse, DEFAULT_WAREHOUSE);
        assert!(config.has_transport());
    }

    #[test]
    fn test_config_builder() {
        let config = ServerConfig::new("/var/lib/metacat")
            .with_tcp_address("tcp://127.0.0.1:8080")
            .with_ipc_address("ipc:///tmp/metacat.sock")
            .with_warehouse("file:/wh")
            .with_request_timeout(Duration::from_secs(60))
            .with_max_message_size(32 * 1024 * 1024)
            .with_transport_workers(0);

        assert_eq!(config.tcp_address, Some("tcp://127.0.0.1:8080".to_string()));
        assert_eq!(config.ipc_address, Some("ipc:///tmp/metacat.sock".to_string()));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.max_message_size, 32 * 1024 * 1024);
        assert_eq!(config.transport_workers, 1);

        let store = config.store_config();
        assert_eq!(store.path, PathBuf::from("/var/lib/metacat"));
        assert_eq!(store.warehouse, "file:/wh");
    }

    #[test]
    fn test_no_transport() {
        let config = ServerConfig::new("./data").without_tcp();
        assert!(!config.has_transport());
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "metacat-server",
            "--data-path",
            "/tmp/mc",
            "--no-tcp",
            "--ipc",
            "ipc:///tmp/mc.sock",
            "--workers",
            "3",
            "--max-message-mb",
            "2",
        ]);
        let config = args.into_config();

        assert!(config.tcp_address.is_none());
        assert_eq!(config.ipc_address.as_deref(), Some("ipc:///tmp/mc.sock"));
        assert_eq!(config.transport_workers, 3);
        assert_eq!(config.max_message_size, 2 * 1024 * 1024);
        assert_eq!(config.data_path, PathBuf::from("/tmp/mc"));
    }
}
