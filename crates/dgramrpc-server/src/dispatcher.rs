//! Request Dispatcher
//!
//! Turns one inbound datagram into at most one outbound datagram. The order
//! of steps is fixed: decode, dedup check, method lookup, optional fault
//! delay, invocation, encode. A request that fails an early step never
//! reaches the later ones, so a duplicate or malformed datagram can never
//! run a handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dgramrpc_common::transport::{JsonCodec, MAX_DATAGRAM_SIZE};
use dgramrpc_common::{CorrelationId, Request, Response};
use tracing::{debug, error, info, warn};

use crate::fault::FaultInjection;
use crate::ledger::DedupLedger;
use crate::registry::MethodRegistry;

/// Dispatcher configuration.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    pub fault: FaultInjection,
}

impl DispatcherConfig {
    pub fn with_fault(mut self, fault: FaultInjection) -> Self {
        self.fault = fault;
        self
    }
}

/// Lock-free dispatch counters.
///
/// Every datagram bumps `received` and exactly one of `rejected`,
/// `duplicates`, `unknown_methods` or `executed`. `failed` counts the
/// executed requests whose handler returned an error or panicked.
#[derive(Debug, Default)]
struct DispatchCounters {
    received: AtomicU64,
    rejected: AtomicU64,
    duplicates: AtomicU64,
    unknown_methods: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl DispatchCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            unknown_methods: self.unknown_methods.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the dispatcher's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Datagrams handed to the dispatcher
    pub received: u64,
    /// Datagrams that did not decode into a valid request
    pub rejected: u64,
    /// Requests suppressed by the dedup ledger
    pub duplicates: u64,
    /// Requests naming a method that is not registered
    pub unknown_methods: u64,
    /// Requests whose handler was invoked
    pub executed: u64,
    /// Invoked requests that produced an ERROR response
    pub failed: u64,
}

/// Executes requests against a [`MethodRegistry`] with duplicate
/// suppression.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dgramrpc_common::transport::JsonCodec;
/// use dgramrpc_common::{Params, Request, Status};
/// use dgramrpc_server::{DedupLedger, Dispatcher, DispatcherConfig, MethodRegistry};
///
/// # async fn example() -> Option<()> {
/// let dispatcher = Dispatcher::new(
///     MethodRegistry::with_builtins(),
///     Arc::new(DedupLedger::default()),
///     DispatcherConfig::default(),
/// );
///
/// let request = Request::new("add", Params::new().with("a", 5).with("b", 7));
/// let bytes = JsonCodec::encode_request(&request).ok()?;
///
/// let first = dispatcher.dispatch(&bytes).await?;
/// let again = dispatcher.dispatch(&bytes).await?;
///
/// assert_eq!(JsonCodec::decode_response(&first).ok()?.status, Status::Ok);
/// assert_eq!(JsonCodec::decode_response(&again).ok()?.status, Status::Duplicate);
/// # Some(())
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    registry: MethodRegistry,
    ledger: Arc<DedupLedger>,
    config: DispatcherConfig,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(registry: MethodRegistry, ledger: Arc<DedupLedger>, config: DispatcherConfig) -> Self {
        Self {
            registry,
            ledger,
            config,
            counters: DispatchCounters::default(),
        }
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<DedupLedger> {
        &self.ledger
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Handles one datagram and returns the encoded reply.
    ///
    /// `None` only when not even an error response could be encoded; the
    /// datagram is then dropped without a reply.
    pub async fn dispatch(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        let response = self.handle(datagram).await;
        self.encode(response)
    }

    /// Runs the dispatch steps and returns the unencoded response.
    pub async fn handle(&self, datagram: &[u8]) -> Response {
        DispatchCounters::bump(&self.counters.received);

        let request = match JsonCodec::decode_request(datagram) {
            Ok(request) => request,
            Err(e) => {
                DispatchCounters::bump(&self.counters.rejected);
                let id = JsonCodec::peek_correlation_id(datagram).unwrap_or_default();
                warn!("Rejected datagram ({} bytes, id '{}'): {}", datagram.len(), id, e);
                return Response::error(id, format!("error parsing request: {}", e));
            }
        };

        debug!(
            "Received request {} for method {}",
            request.correlation_id, request.method
        );

        if !self
            .ledger
            .check_and_record(&request.correlation_id, Instant::now())
            .is_first_seen()
        {
            DispatchCounters::bump(&self.counters.duplicates);
            info!("Duplicate request {} suppressed", request.correlation_id);
            return Response::duplicate(request.correlation_id);
        }

        let Some(handler) = self.registry.lookup(&request.method) else {
            DispatchCounters::bump(&self.counters.unknown_methods);
            debug!("Unknown method {} in request {}", request.method, request.correlation_id);
            return Response::error(
                request.correlation_id,
                format!("unknown method: {}", request.method),
            );
        };

        if let Some(delay) = self.config.fault.roll() {
            info!(
                "Injecting {:?} delay before {} ({})",
                delay, request.method, request.correlation_id
            );
            tokio::time::sleep(delay).await;
        }

        DispatchCounters::bump(&self.counters.executed);
        let Request {
            correlation_id,
            method,
            params,
            ..
        } = request;

        // Handlers may block; keep them off the async workers.
        let handler = Arc::clone(handler);
        match tokio::task::spawn_blocking(move || handler(&params)).await {
            Ok(Ok(result)) => Response::ok(correlation_id, result),
            Ok(Err(e)) => {
                DispatchCounters::bump(&self.counters.failed);
                debug!("Method {} failed for {}: {}", method, correlation_id, e);
                Response::error(correlation_id, e.to_string())
            }
            Err(e) => {
                DispatchCounters::bump(&self.counters.failed);
                if e.is_panic() {
                    error!("Handler for {} panicked on request {}", method, correlation_id);
                } else {
                    error!("Handler for {} was cancelled on request {}: {}", method, correlation_id, e);
                }
                Response::error(correlation_id, format!("internal error in {}", method))
            }
        }
    }

    fn encode(&self, response: Response) -> Option<Vec<u8>> {
        let id = response.correlation_id.clone();

        let failure = match JsonCodec::encode_response(&response) {
            Ok(bytes) if bytes.len() <= MAX_DATAGRAM_SIZE => return Some(bytes),
            Ok(bytes) => format!(
                "response too large: {} bytes exceeds {} byte limit",
                bytes.len(),
                MAX_DATAGRAM_SIZE
            ),
            Err(e) => format!("error encoding response: {}", e),
        };

        warn!("Replacing response for {}: {}", id, failure);
        fallback_response(id, failure)
    }
}

fn fallback_response(id: CorrelationId, message: String) -> Option<Vec<u8>> {
    match JsonCodec::encode_response(&Response::error(id.clone(), message)) {
        Ok(bytes) if bytes.len() <= MAX_DATAGRAM_SIZE => Some(bytes),
        Ok(_) => {
            error!("Error response for {} does not fit in a datagram, dropping", id);
            None
        }
        Err(e) => {
            error!("Could not encode error response for {}: {}", id, e);
            None
        }
    }
}
