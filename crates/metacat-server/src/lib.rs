//! Metacat server library.
//!
//! The catalog service façade, the request handler that maps operations and
//! errors onto the wire protocol, and the NNG transport.

pub mod config;
pub mod error;
pub mod handler;
pub mod service;
pub mod transport;

pub use config::{Args, ServerConfig};
pub use error::Error;
pub use handler::RequestHandler;
pub use service::CatalogService;
pub use transport::{create_transport, Transport};
