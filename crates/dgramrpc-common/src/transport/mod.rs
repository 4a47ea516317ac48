//! dgramrpc Transport Layer
//!
//! This module provides the JSON codec and the UDP transport used to move
//! envelopes between endpoints.
//!
//! # Architecture
//!
//! - **Transport**: UDP, connectionless, no delivery or ordering guarantee
//! - **Codec**: JSON serialization for protocol messages
//! - **Wire Format**: one JSON document per datagram, no length prefix
//!
//! # Components
//!
//! - **[`JsonCodec`]**: Encode/decode envelopes, with validation on decode
//! - **[`UdpTransport`]**: Shared UDP socket enforcing [`MAX_DATAGRAM_SIZE`]
//!
//! # Message Size Limits
//!
//! Payloads must fit one datagram of at most 1024 bytes. Oversized payloads
//! are a configuration error and are refused at send time.

pub mod codec;
pub mod udp;

pub use codec::JsonCodec;
pub use udp::{resolve, UdpTransport, MAX_DATAGRAM_SIZE};
