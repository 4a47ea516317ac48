//! dgramrpc Server
//!
//! This crate provides a UDP RPC server that executes each request at most
//! once within a retention window, even when the client resends it.
//!
//! # Components
//!
//! - [`ledger`] - time-bounded record of admitted correlation ids
//! - [`registry`] - method name to handler table
//! - [`methods`] - the builtin catalog (`add`, `divide`, `echo`, ...)
//! - [`dispatcher`] - decode, dedup, invoke and encode one datagram
//! - [`fault`] - optional artificial delay for exercising clients
//! - [`server`] - socket loop with one task per datagram
//!
//! # Example
//!
//! ```no_run
//! use dgramrpc_server::{MethodRegistry, ServerConfig, UdpServer};
//!
//! # async fn demo() -> dgramrpc_common::Result<()> {
//! let server = UdpServer::bind("0.0.0.0:5000", MethodRegistry::with_builtins(), ServerConfig::default()).await?;
//! server.run().await
//! # }
//! ```

pub mod dispatcher;
pub mod fault;
pub mod ledger;
pub mod methods;
pub mod registry;
pub mod server;

pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig};
pub use fault::FaultInjection;
pub use ledger::{Admission, DedupLedger, LedgerConfig};
pub use registry::{Handler, MethodError, MethodRegistry};
pub use server::{ServerConfig, ServerHandle, UdpServer};
