use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use dgramrpc_common::transport::{resolve, JsonCodec, UdpTransport, MAX_DATAGRAM_SIZE};
use dgramrpc_common::{CorrelationId, Params, Request, Response, Result, RpcError, Value};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::{CallAttempt, CallSession, RetryPolicy};

type Waiters = Arc<Mutex<HashMap<CorrelationId, oneshot::Sender<Response>>>>;

/// dgramrpc client for making RPC calls over UDP.
///
/// Owns one socket for its lifetime. A background task reads every inbound
/// datagram and hands it to the call waiting on its correlation id, so any
/// number of calls can be in flight on the same client. Replies nobody is
/// waiting for (a late answer to an abandoned call, a second reply to a
/// resent request) are dropped.
///
/// # Example
///
/// ```no_run
/// use dgramrpc_client::{Client, RetryPolicy};
/// use dgramrpc_common::Params;
///
/// # async fn demo() -> dgramrpc_common::Result<()> {
/// let client = Client::connect("127.0.0.1:5000", RetryPolicy::default()).await?;
/// let sum = client.call_value("add", Params::new().with("a", 5).with("b", 7)).await?;
/// assert_eq!(sum, 12);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    server: SocketAddr,
    transport: UdpTransport,
    policy: RetryPolicy,
    waiters: Waiters,
    shutdown: CancellationToken,
}

impl Client {
    /// Creates a client for the server at `server` ("host:port").
    ///
    /// Binds an ephemeral local socket and starts the response router. No
    /// datagram is sent until the first call.
    pub async fn connect(server: &str, policy: RetryPolicy) -> Result<Self> {
        let server = resolve(server).await?;
        let transport = UdpTransport::bind_for(server).await?;
        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(route_responses(
            transport.clone(),
            server,
            waiters.clone(),
            shutdown.clone(),
        ));

        debug!("Client bound to {} for server {}", transport.local_addr()?, server);

        Ok(Self {
            server,
            transport,
            policy,
            waiters,
            shutdown,
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `method` and returns the server's response envelope.
    ///
    /// OK, ERROR and DUPLICATE are all definitive answers and are returned
    /// as `Ok`. Only missing replies are retried.
    ///
    /// # Errors
    ///
    /// `RetriesExhausted` when no attempt got a reply, or `Encoding` if the
    /// request cannot be encoded.
    pub async fn call(&self, method: &str, params: Params) -> Result<Response> {
        self.call_with_cancel(method, params, &CancellationToken::new()).await
    }

    /// Like [`Client::call`], but gives up with `Cancelled` once `cancel`
    /// fires.
    ///
    /// Cancellation is observed before each attempt and while backing off.
    /// An attempt already waiting for its reply runs to its timeout.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.send_request(&Request::new(method, params), cancel).await
    }

    /// Calls `method` and unwraps the result.
    ///
    /// ERROR maps to [`RpcError::Remote`] with the server's message.
    ///
    /// DUPLICATE maps to [`RpcError::Duplicate`] even though it is not a
    /// failure: the effect happened, but the result was lost with an earlier
    /// reply and is not replayed. Callers that must not treat that case as
    /// an error should use [`Client::call_outcome`].
    pub async fn call_value(&self, method: &str, params: Params) -> Result<Value> {
        self.call(method, params).await?.into_result()
    }

    /// Calls `method`, returning `Ok(None)` for DUPLICATE.
    ///
    /// `Ok(Some(value))` is the method's result; `Ok(None)` means the
    /// request executed on an earlier attempt whose reply was lost.
    pub async fn call_outcome(&self, method: &str, params: Params) -> Result<Option<Value>> {
        self.call(method, params).await?.into_outcome()
    }

    /// Sends an already-built request with retries.
    ///
    /// The request is encoded once and every attempt sends the same bytes.
    pub async fn send_request(&self, request: &Request, cancel: &CancellationToken) -> Result<Response> {
        request.validate()?;
        let payload = JsonCodec::encode_request(request)?;
        if payload.len() > MAX_DATAGRAM_SIZE {
            // Resending cannot make it fit.
            return Err(RpcError::Encoding(format!(
                "message too large: {} bytes (max {} bytes)",
                payload.len(),
                MAX_DATAGRAM_SIZE
            )));
        }
        let mut session = CallSession::new(request.correlation_id.clone(), payload, self.policy.clone());

        let (tx, mut rx) = oneshot::channel();
        let _waiter = self.register(session.correlation_id().clone(), tx)?;

        while let Some(attempt) = session.next_attempt() {
            if cancel.is_cancelled() {
                return Err(RpcError::Cancelled);
            }

            let error = match self.attempt(&session, attempt, &mut rx).await {
                Ok(response) => {
                    debug!(
                        "{} ({}) answered {} on attempt {}",
                        request.method,
                        session.correlation_id(),
                        response.status,
                        attempt.index + 1
                    );
                    return Ok(response);
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            warn!(
                "{} ({}) attempt {}/{} failed: {}",
                request.method,
                session.correlation_id(),
                attempt.index + 1,
                self.policy.attempts(),
                error
            );

            if let Some(delay) = session.record_failure(error) {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RpcError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(session.into_exhausted())
    }

    /// Sends the payload once and waits up to the attempt's timeout for the
    /// routed reply.
    async fn attempt(
        &self,
        session: &CallSession,
        attempt: CallAttempt,
        rx: &mut oneshot::Receiver<Response>,
    ) -> Result<Response> {
        self.transport.send_to(session.payload(), self.server).await?;

        match tokio::time::timeout(attempt.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RpcError::Transport("response router stopped".to_string())),
            Err(_) => Err(RpcError::Timeout(attempt.timeout.as_millis() as u64)),
        }
    }

    fn register(&self, id: CorrelationId, tx: oneshot::Sender<Response>) -> Result<WaiterGuard> {
        let mut waiters = lock(&self.waiters);
        if waiters.contains_key(&id) {
            return Err(RpcError::Validation(format!(
                "a call with request_id {} is already in flight",
                id
            )));
        }
        waiters.insert(id.clone(), tx);

        Ok(WaiterGuard {
            waiters: self.waiters.clone(),
            id,
        })
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Removes a call's waiter when the call returns, however it returns.
struct WaiterGuard {
    waiters: Waiters,
    id: CorrelationId,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        lock(&self.waiters).remove(&self.id);
    }
}

fn lock(waiters: &Waiters) -> MutexGuard<'_, HashMap<CorrelationId, oneshot::Sender<Response>>> {
    waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Receive loop: decodes each datagram from the server and forwards it to
/// the call waiting on its correlation id.
async fn route_responses(
    transport: UdpTransport,
    server: SocketAddr,
    waiters: Waiters,
    shutdown: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = transport.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        debug!("Client receive failed: {}", e);
                        continue;
                    }
                };

                if !is_from_server(from, server) {
                    debug!("Discarding datagram from unexpected peer {}", from);
                    continue;
                }

                let response = match JsonCodec::decode_response(&buf[..len]) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Discarding undecodable response from {}: {}", from, e);
                        continue;
                    }
                };

                let waiter = lock(&waiters).remove(&response.correlation_id);
                match waiter {
                    Some(tx) => {
                        // The call may have given up between removal and send.
                        let _ = tx.send(response);
                    }
                    None => debug!(
                        "Discarding {} response for {} with no waiting call",
                        response.status, response.correlation_id
                    ),
                }
            }
        }
    }
}

/// A server reached through a wildcard address answers from a concrete one.
fn is_from_server(from: SocketAddr, server: SocketAddr) -> bool {
    if server.ip().is_unspecified() {
        from.port() == server.port()
    } else {
        from == server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        // Will create successfully even if no server is listening
        let client = Client::connect("127.0.0.1:5000", RetryPolicy::default()).await;
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let result = Client::connect("not an address", RetryPolicy::default()).await;
        assert!(matches!(result, Err(RpcError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_already_cancelled_call_sends_nothing() {
        let client = Client::connect("127.0.0.1:9", RetryPolicy::default()).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.call_with_cancel("get_time", Params::new(), &cancel).await;
        assert!(matches!(result, Err(RpcError::Cancelled)));
        assert!(lock(&client.waiters).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_sent() {
        let client = Client::connect("127.0.0.1:9", RetryPolicy::default()).await.unwrap();
        let result = client.call("", Params::new()).await;
        assert!(matches!(result, Err(RpcError::Validation(_))));
    }

    #[test]
    fn test_is_from_server() {
        let server: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        assert!(is_from_server(server, server));
        assert!(!is_from_server("127.0.0.1:5001".parse().unwrap(), server));

        let wildcard: SocketAddr = "0.0.0.0:5000".parse().unwrap();
        assert!(is_from_server(server, wildcard));
    }
}
