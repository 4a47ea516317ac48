//! dgramrpc Common Types and Transport
//!
//! This crate provides the envelope definitions, the JSON codec and the UDP
//! transport shared by the dgramrpc server and client.
//!
//! # Overview
//!
//! dgramrpc is a small RPC system that runs over a connectionless, lossy
//! transport. Every request and every response is exactly one datagram, so
//! the interesting parts live in correlation and failure handling:
//!
//! - **Protocol Layer**: Request/Response envelopes, correlation ids, typed
//!   parameter extraction and the error taxonomy
//! - **Transport Layer**: JSON codec and a thin UDP socket wrapper that
//!   enforces the datagram budget
//!
//! # Architecture
//!
//! - **Transport**: UDP, one socket per endpoint
//! - **Serialization**: JSON with explicit, order-independent field names
//! - **Message Format**: one JSON document per datagram, no framing
//! - **Max Message Size**: 1024 bytes ([`transport::MAX_DATAGRAM_SIZE`])
//!
//! # Components
//!
//! - [`protocol`] - Request, Response, Params and RpcError
//! - [`transport`] - JSON codec and UDP transport
//!
//! # Example
//!
//! ```
//! use dgramrpc_common::{Params, Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new("add", Params::new().with("a", 5).with("b", 7));
//! let response = Response::ok(request.correlation_id.clone(), json!(12));
//! assert!(response.is_ok());
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
