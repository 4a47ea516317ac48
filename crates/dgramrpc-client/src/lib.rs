//! dgramrpc Client
//!
//! Calls a dgramrpc server over UDP. Lost requests and lost replies are
//! handled by resending the identical request after a timeout; the server's
//! dedup ledger makes sure a resent request runs at most once.

pub mod client;
pub mod session;

pub use client::Client;
pub use session::{CallAttempt, CallSession, RetryPolicy};
