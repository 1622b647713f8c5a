//! Server transport layer using async-nng.
//!
//! A single REP socket is shared by several worker threads. Each worker owns
//! a current-thread runtime and an [`AsyncContext`], so requests from
//! different clients are served concurrently.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use async_nng::AsyncContext;
use nng::options::Options;
use nng::{Message, Protocol, Socket};

use metacat_proto::framing::{encode_frame, extract_payload};
use metacat_proto::{error_codes, Request, Response};

use crate::config::ServerConfig;
use crate::error::Error;
use crate::handler::RequestHandler;

/// How long a worker waits for a message before checking the stop flag.
const RECEIVE_POLL: Duration = Duration::from_secs(1);

/// Transport counters.
#[derive(Debug)]
pub struct TransportMetrics {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    started_at: Instant,
}

impl TransportMetrics {
    fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    fn record(&self, received_bytes: usize, sent_bytes: usize, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_received.fetch_add(received_bytes as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent_bytes as u64, Ordering::Relaxed);
    }

    /// Time since the transport started.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Requests answered, successful or not.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Requests answered with an error status.
    pub fn failed_requests(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn total_bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

impl Default for TransportMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server transport that handles incoming connections.
pub struct Transport {
    socket: Socket,
    handler: Arc<RequestHandler>,
    max_message_size: usize,
    metrics: Arc<TransportMetrics>,
    request_timeout: Duration,
    worker_count: usize,
}

impl Transport {
    /// Bind a REP socket to every configured address.
    pub fn new(config: &ServerConfig, handler: Arc<RequestHandler>) -> Result<Self, Error> {
        let socket = Socket::new(Protocol::Rep0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;

        socket
            .set_opt::<nng::options::RecvMaxSize>(config.max_message_size)
            .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;

        for address in config.tcp_address.iter().chain(config.ipc_address.iter()) {
            socket
                .listen(address)
                .map_err(|e| Error::Transport(format!("failed to listen on {}: {}", address, e)))?;
            tracing::info!(address = %address, "listening");
        }

        Ok(Self {
            socket,
            handler,
            max_message_size: config.max_message_size,
            metrics: Arc::new(TransportMetrics::new()),
            request_timeout: config.request_timeout,
            worker_count: config.transport_workers.max(1),
        })
    }

    /// Get a reference to the transport metrics.
    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    /// Serve requests until `shutdown` fires, then wait for the workers.
    pub async fn run_until_shutdown(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), Error> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let handles = self.spawn_worker_threads(stop_flag.clone())?;

        tracing::info!(workers = handles.len(), "transport ready, accepting requests");

        let _ = shutdown.recv().await;
        tracing::info!(
            total_requests = self.metrics.total_requests(),
            failed = self.metrics.failed_requests(),
            bytes_received = self.metrics.total_bytes_received(),
            bytes_sent = self.metrics.total_bytes_sent(),
            uptime_secs = self.metrics.uptime().as_secs(),
            "shutdown signal received, stopping transport"
        );

        stop_flag.store(true, Ordering::SeqCst);
        let _ = tokio::task::spawn_blocking(move || {
            for handle in handles {
                let _ = handle.join();
            }
        })
        .await;

        Ok(())
    }

    fn worker(&self) -> TransportWorker {
        TransportWorker::new(self.handler.clone(), self.max_message_size)
    }

    fn spawn_worker_threads(&self, stop_flag: Arc<AtomicBool>) -> Result<Vec<thread::JoinHandle<()>>, Error> {
        let mut handles = Vec::with_capacity(self.worker_count);
        for worker_id in 0..self.worker_count {
            let socket = self.socket.clone();
            let worker = self.worker();
            let metrics = self.metrics.clone();
            let request_timeout = self.request_timeout;
            let stop_flag = stop_flag.clone();

            let handle = thread::Builder::new()
                .name(format!("metacat-transport-{}", worker_id))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            tracing::error!(error = %e, worker_id, "failed to build worker runtime");
                            return;
                        }
                    };

                    runtime.block_on(async move {
                        let mut ctx = match AsyncContext::try_from(&socket) {
                            Ok(ctx) => ctx,
                            Err(e) => {
                                tracing::error!(error = %e, worker_id, "failed to create async context");
                                return;
                            }
                        };

                        while !stop_flag.load(Ordering::SeqCst) {
                            let msg = match ctx.receive(Some(RECEIVE_POLL)).await {
                                Ok(msg) => msg,
                                Err(nng::Error::TimedOut) => continue,
                                Err(e) => {
                                    tracing::error!(error = %e, worker_id, "receive error");
                                    continue;
                                }
                            };

                            let received_bytes = msg.len();
                            let start = Instant::now();
                            let (response_bytes, is_success) = worker.process_message(msg.as_slice());
                            let elapsed = start.elapsed();

                            let sent_bytes = response_bytes.len();
                            if let Err((_, e)) = ctx.send(Message::from(response_bytes.as_slice()), None).await {
                                tracing::error!(error = %e, worker_id, "failed to send response");
                                metrics.record(received_bytes, 0, false);
                            } else {
                                metrics.record(received_bytes, sent_bytes, is_success);
                            }

                            if elapsed > request_timeout {
                                tracing::warn!(
                                    worker_id,
                                    duration_ms = elapsed.as_millis() as u64,
                                    timeout_ms = request_timeout.as_millis() as u64,
                                    "request exceeded timeout"
                                );
                            }
                        }
                        tracing::info!(worker_id, "transport worker stopping");
                    });
                })
                .map_err(|e| Error::Transport(format!("failed to spawn transport worker: {}", e)))?;

            handles.push(handle);
        }

        Ok(handles)
    }
}

/// Decodes one framed request, dispatches it and encodes the answer.
struct TransportWorker {
    handler: Arc<RequestHandler>,
    max_message_size: usize,
}

impl TransportWorker {
    fn new(handler: Arc<RequestHandler>, max_message_size: usize) -> Self {
        Self {
            handler,
            max_message_size,
        }
    }

    /// Process a raw message and return (response bytes, is_success).
    ///
    /// Malformed input gets an `INVALID_REQUEST` response with request id 0.
    fn process_message(&self, data: &[u8]) -> (Vec<u8>, bool) {
        let response = match self.decode(data) {
            Ok(request) => self.handler.handle(&request),
            Err(e) => {
                tracing::warn!(error = %e, bytes = data.len(), "rejected malformed request");
                Response::error(0, error_codes::INVALID_REQUEST, e.to_string())
            }
        };
        let is_success = response.status.is_ok();

        let bytes = match encode_response(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode response");
                let fallback = Response::error(response.id, error_codes::INTERNAL, e.to_string());
                encode_response(&fallback).unwrap_or_default()
            }
        };

        (bytes, is_success)
    }

    fn decode(&self, data: &[u8]) -> Result<Request, Error> {
        if data.len() > self.max_message_size {
            return Err(Error::Protocol(metacat_proto::Error::InvalidMessage(format!(
                "message too large: {} bytes (max: {})",
                data.len(),
                self.max_message_size
            ))));
        }

        let payload = extract_payload(data)?;

        // rkyv needs an aligned buffer
        let mut aligned: rkyv::util::AlignedVec<16> = rkyv::util::AlignedVec::new();
        aligned.extend_from_slice(payload);

        rkyv::from_bytes::<Request, rkyv::rancor::Error>(&aligned).map_err(|e| {
            Error::Protocol(metacat_proto::Error::InvalidMessage(format!(
                "failed to deserialize request: {}",
                e
            )))
        })
    }
}

fn encode_response(response: &Response) -> Result<Vec<u8>, Error> {
    let payload = rkyv::to_bytes::<rkyv::rancor::Error>(response).map_err(|e| {
        Error::Protocol(metacat_proto::Error::Serialization(format!(
            "failed to serialize response: {}",
            e
        )))
    })?;
    Ok(encode_frame(&payload)?)
}

/// Create a transport that listens on the configured addresses.
pub fn create_transport(config: &ServerConfig, handler: Arc<RequestHandler>) -> Result<Transport, Error> {
    if !config.has_transport() {
        return Err(Error::Config(
            "no transport configured (need TCP or IPC address)".to_string(),
        ));
    }

    Transport::new(config, handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::CatalogService;
    use metacat_proto::framing::MAX_FRAME_PAYLOAD;
    use metacat_proto::{Operation, ResponsePayload, Status, TableDef};

    fn handler() -> Arc<RequestHandler> {
        let service = CatalogService::temporary("file:/wh").unwrap();
        Arc::new(RequestHandler::new(Arc::new(service)))
    }

    fn frame(request: &Request) -> Vec<u8> {
        let payload = rkyv::to_bytes::<rkyv::rancor::Error>(request).unwrap();
        encode_frame(&payload).unwrap()
    }

    fn decode_response(bytes: &[u8]) -> Response {
        let payload = extract_payload(bytes).unwrap();
        let mut aligned: rkyv::util::AlignedVec<16> = rkyv::util::AlignedVec::new();
        aligned.extend_from_slice(payload);
        rkyv::from_bytes::<Response, rkyv::rancor::Error>(&aligned).unwrap()
    }

    #[test]
    fn test_transport_creation() {
        let dir = tempfile::tempdir().unwrap();
        let ipc_path = format!("ipc://{}", dir.path().join("metacat.sock").display());
        let config = ServerConfig::new(dir.path()).without_tcp().with_ipc_address(ipc_path);

        match Transport::new(&config, handler()) {
            Ok(transport) => assert_eq!(transport.metrics().total_requests(), 0),
            Err(Error::Transport(msg)) if msg.contains("Permission denied") => {}
            Err(err) => panic!("transport creation failed: {err}"),
        }
    }

    #[test]
    fn test_transport_requires_address() {
        let config = ServerConfig::new("/tmp/test").without_tcp();
        assert!(matches!(create_transport(&config, handler()), Err(Error::Config(_))));
    }

    #[test]
    fn test_process_ping_message() {
        let worker = TransportWorker::new(handler(), MAX_FRAME_PAYLOAD);

        let (bytes, is_success) = worker.process_message(&frame(&Request::ping(42)));
        assert!(is_success);

        let response = decode_response(&bytes);
        assert_eq!(response.id, 42);
        assert!(matches!(response.payload, ResponsePayload::Pong));
    }

    #[test]
    fn test_process_invalid_message() {
        let worker = TransportWorker::new(handler(), MAX_FRAME_PAYLOAD);

        let (bytes, is_success) = worker.process_message(b"invalid data");
        assert!(!is_success);

        let response = decode_response(&bytes);
        assert_eq!(response.id, 0);
        assert!(matches!(
            response.status,
            Status::Error { code: error_codes::INVALID_REQUEST, .. }
        ));
    }

    #[test]
    fn test_process_oversized_message() {
        let worker = TransportWorker::new(handler(), 8);
        let (bytes, is_success) = worker.process_message(&frame(&Request::ping(1)));
        assert!(!is_success);
        assert!(decode_response(&bytes).status.is_error());
    }

    #[test]
    fn test_rejected_operation_is_not_success() {
        let worker = TransportWorker::new(handler(), MAX_FRAME_PAYLOAD);
        let request = Request::new(7, Operation::CreateTable(TableDef::new("no_columns")));

        let (bytes, is_success) = worker.process_message(&frame(&request));
        assert!(!is_success);
        assert_eq!(decode_response(&bytes).id, 7);
    }

    #[test]
    fn test_process_messages_concurrently() {
        let handler = handler();

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let handler = handler.clone();
            handles.push(std::thread::spawn(move || {
                let worker = TransportWorker::new(handler, MAX_FRAME_PAYLOAD);
                let table = TableDef::new(format!("t{}", i)).with_column("a", "string");
                let request = Request::new(100 + i, Operation::CreateTable(table));

                let (bytes, is_success) = worker.process_message(&frame(&request));
                assert!(is_success);
                assert_eq!(decode_response(&bytes).id, 100 + i);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(
            handler
                .service()
                .list_tables(&metacat_proto::DatabaseRef::new("hive", "default"), None)
                .unwrap()
                .len(),
            8
        );
    }
}
