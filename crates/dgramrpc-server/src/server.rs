use std::net::SocketAddr;
use std::sync::Arc;

use dgramrpc_common::transport::{UdpTransport, MAX_DATAGRAM_SIZE};
use dgramrpc_common::{Result, RpcError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
use crate::fault::FaultInjection;
use crate::ledger::{DedupLedger, LedgerConfig};
use crate::registry::MethodRegistry;

/// Server configuration.
///
/// # Example
///
/// ```
/// use dgramrpc_server::{FaultInjection, LedgerConfig, ServerConfig};
/// use std::time::Duration;
///
/// let config = ServerConfig::default()
///     .with_ledger(LedgerConfig::default().with_retention(Duration::from_secs(60)))
///     .with_fault(FaultInjection::new(0.2, Duration::from_secs(3)));
/// assert_eq!(config.ledger.retention, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub ledger: LedgerConfig,
    pub dispatcher: DispatcherConfig,
}

impl ServerConfig {
    pub fn with_ledger(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_fault(mut self, fault: FaultInjection) -> Self {
        self.dispatcher.fault = fault;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ledger.retention.is_zero() {
            return Err(RpcError::Config("ledger retention must be greater than zero".into()));
        }
        if self.ledger.sweep_interval.is_zero() {
            return Err(RpcError::Config("sweep interval must be greater than zero".into()));
        }
        self.dispatcher.fault.validate().map_err(RpcError::Config)
    }
}

/// UDP RPC server.
///
/// Owns one socket, one dedup ledger and one dispatcher. Each inbound
/// datagram is handled on its own task, so a slow handler delays only its
/// own reply.
pub struct UdpServer {
    transport: UdpTransport,
    dispatcher: Arc<Dispatcher>,
}

impl UdpServer {
    /// Binds a server to `addr` (e.g. "0.0.0.0:5000", or port 0 for an
    /// ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid configuration and `Transport` if the
    /// socket cannot be bound.
    pub async fn bind(addr: &str, registry: MethodRegistry, config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let transport = UdpTransport::bind(addr).await?;
        let ledger = Arc::new(DedupLedger::new(config.ledger));
        let dispatcher = Arc::new(Dispatcher::new(registry, ledger, config.dispatcher));

        info!(
            "dgramrpc server bound to {} with methods {:?}",
            transport.local_addr()?,
            dispatcher.registry().names()
        );

        Ok(Self {
            transport,
            dispatcher,
        })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Serves until the process exits.
    pub async fn run(self) -> Result<()> {
        self.run_until(CancellationToken::new()).await
    }

    /// Serves until `shutdown` is cancelled.
    ///
    /// Starts the ledger sweeper, then reads datagrams and spawns one
    /// dispatch task per datagram. Receive errors are logged and the loop
    /// keeps going. Dispatch tasks already spawned when shutdown fires are
    /// left to finish on their own.
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        let sweeper = self
            .dispatcher
            .ledger()
            .clone()
            .spawn_sweeper(shutdown.child_token());

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.transport.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            error!("Error receiving datagram: {}", e);
                            continue;
                        }
                    };

                    debug!("Datagram of {} bytes from {}", len, peer);

                    let datagram = buf[..len].to_vec();
                    let dispatcher = self.dispatcher.clone();
                    let transport = self.transport.clone();

                    tokio::spawn(async move {
                        let Some(reply) = dispatcher.dispatch(&datagram).await else {
                            return;
                        };
                        if let Err(e) = transport.send_to(&reply, peer).await {
                            warn!("Failed to send response to {}: {}", peer, e);
                        }
                    });
                }
            }
        }

        if let Err(e) = sweeper.await {
            warn!("Ledger sweeper ended abnormally: {}", e);
        }

        let stats = self.dispatcher.stats();
        info!(
            "dgramrpc server stopped: {} received, {} executed, {} duplicates, {} rejected, {} unknown, {} failed",
            stats.received,
            stats.executed,
            stats.duplicates,
            stats.rejected,
            stats.unknown_methods,
            stats.failed
        );

        Ok(())
    }

    /// Runs the server on a background task.
    ///
    /// The returned handle stops the server when [`ServerHandle::shutdown`]
    /// is called or when it is dropped.
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let dispatcher = self.dispatcher();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.run_until(shutdown.clone()));

        Ok(ServerHandle {
            addr,
            dispatcher,
            shutdown,
            task: Some(task),
        })
    }
}

/// Handle to a server started with [`UdpServer::spawn`].
pub struct ServerHandle {
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Stops the receive loop and sweeper and waits for them to exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| RpcError::Transport(format!("server task failed: {}", e)))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
