use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::error::{Result, RpcError};
use super::params::Params;

pub type MethodName = String;

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque token linking a response to the request that caused it.
///
/// The same id is carried by every retransmission of one logical call, which
/// is what lets the server recognise duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates an id unique across the process lifetime.
    ///
    /// Format: `<unix nanos>-<random discriminator>-<process counter>`. The
    /// counter alone guarantees uniqueness within the process; the clock and
    /// random parts keep ids from separate processes apart.
    pub fn generate() -> Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let discriminator: u32 = rand::random();
        let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);

        Self(format!("{}-{:08x}-{}", nanos, discriminator, counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An RPC request sent from a client to a server.
///
/// # Wire Format
///
/// ```json
/// {"request_id": "1718000000000000000-9f2c11aa-0", "method": "add",
///  "params": {"a": 5, "b": 7}, "timestamp": 1718000000}
/// ```
///
/// `request_id` and `method` are required and must be non-empty. Missing
/// fields decode as empty and are then rejected by [`Request::validate`], so
/// the codec can tell "not JSON" apart from "JSON but incomplete".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "request_id", default)]
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub method: MethodName,
    #[serde(default, deserialize_with = "Params::deserialize_nullable")]
    pub params: Params,
    #[serde(rename = "timestamp", default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<i64>,
}

impl Request {
    /// Creates a request with a fresh correlation id stamped with the current
    /// Unix time.
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        Request {
            correlation_id: CorrelationId::generate(),
            method: method.into(),
            params,
            issued_at: Some(unix_seconds()),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = id.into();
        self
    }

    pub fn with_issued_at(mut self, issued_at: Option<i64>) -> Self {
        self.issued_at = issued_at;
        self
    }

    /// Checks the required-field invariant.
    pub fn validate(&self) -> Result<()> {
        if self.correlation_id.is_empty() {
            return Err(RpcError::Validation("request_id is required".to_string()));
        }
        if self.method.is_empty() {
            return Err(RpcError::Validation("method is required".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
