//! Metacat client - async client library for metacat servers.
//!
//! # Quick Start
//!
//! ```ignore
//! use metacat_client::{Client, ClientConfig};
//! use metacat_client::proto::TableRef;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::connect(ClientConfig::localhost()).await?;
//!     client.ping().await?;
//!
//!     let orders = TableRef::in_default_catalog("default", "orders");
//!     for uk in client.get_unique_constraints(&orders).await? {
//!         println!("{:?} on {:?}", uk.name, uk.columns);
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;

pub use client::Client;
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionState};
pub use error::Error;

/// Re-export protocol types.
pub use metacat_proto as proto;
