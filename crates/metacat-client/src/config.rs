//! Client configuration.

use std::time::Duration;

use metacat_proto::Operation;

use crate::error::Error;

/// Default TCP address of a metacat server.
pub const DEFAULT_ADDRESS: &str = "tcp://127.0.0.1:9083";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum message size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default number of times a request is sent before its error is returned.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default pause before the first resend; later resends wait proportionally longer.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Metastore address, e.g. `tcp://127.0.0.1:9083` or `ipc:///tmp/metacat.sock`.
    pub address: String,

    /// How long one request may wait for the server.
    pub timeout: Duration,

    /// Largest request or response accepted, in bytes.
    pub max_message_size: usize,

    /// Times a request is sent before a retryable error is returned. `1`
    /// disables resending.
    pub retry_attempts: u32,

    /// Pause before the first resend.
    pub retry_backoff: Duration,
}

impl ClientConfig {
    /// Configuration for the metastore at `address`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Configuration for a metastore on this host's default port.
    pub fn localhost() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Send each request up to `attempts` times, pausing `backoff` times the
    /// attempt number between sends.
    pub fn with_retries(mut self, attempts: u32, backoff: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    /// Whether `operation` should be sent again after failing with `error`
    /// on send number `attempt` (starting at 1).
    ///
    /// A store failure means the server applied nothing, so any operation
    /// is resent. A timeout leaves the outcome unknown, so only reads are.
    pub fn should_retry(&self, operation: &Operation, error: &Error, attempt: u32) -> bool {
        if attempt >= self.retry_attempts || !error.is_retryable() {
            return false;
        }
        !matches!(error, Error::Timeout) || operation.is_read_only()
    }

    /// Pause before send number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::localhost()
    }
}
