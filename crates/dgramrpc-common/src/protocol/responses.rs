//! dgramrpc Response Types
//!
//! This module defines the RPC response envelope and its status.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::error::{Result, RpcError};
use super::requests::CorrelationId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// Outcome class of a response.
///
/// All three are definitive from the caller's point of view: only transport
/// failures and timeouts are worth a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// The method ran and produced `result`.
    Ok,
    /// The request was rejected or the method failed; see `error`.
    Error,
    /// The correlation id was already executed within the retention window.
    Duplicate,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::Duplicate => "DUPLICATE",
        };
        f.write_str(s)
    }
}

/// An RPC response returned from a server to the client.
///
/// # Response Flow
///
/// 1. Server receives and decodes a datagram
/// 2. Server consults its dedup ledger, then the method registry
/// 3. Server builds a `Response` (ok, error or duplicate)
/// 4. Response is serialized to JSON and sent back as one datagram
/// 5. Client routes it to the waiter holding the same correlation id
///
/// # Fields
///
/// - `correlation_id`: id of the originating request (`request_id` on the wire)
/// - `result`: present iff `status` is [`Status::Ok`]
/// - `error_message`: present iff `status` is [`Status::Error`] or [`Status::Duplicate`] (`error` on the wire)
/// - `status`: outcome class
///
/// # Example
///
/// ```
/// use dgramrpc_common::{CorrelationId, Response, Status};
/// use serde_json::json;
///
/// let ok = Response::ok(CorrelationId::new("42-a"), json!(12));
/// assert_eq!(ok.status, Status::Ok);
///
/// let err = Response::error(CorrelationId::new("42-a"), "division by zero");
/// assert_eq!(err.error_message.as_deref(), Some("division by zero"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "request_id", default)]
    pub correlation_id: CorrelationId,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub result: Option<RpcResult>,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub status: Status,
}

/// Message carried by every DUPLICATE response.
pub const DUPLICATE_MESSAGE: &str = "request already processed";

impl Response {
    /// Creates a successful response.
    pub fn ok(correlation_id: CorrelationId, result: RpcResult) -> Self {
        Response {
            correlation_id,
            result: Some(result),
            error_message: None,
            status: Status::Ok,
        }
    }

    /// Creates an error response.
    pub fn error(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Response {
            correlation_id,
            result: None,
            error_message: Some(message.into()),
            status: Status::Error,
        }
    }

    /// Creates the response sent for a request that was already executed.
    pub fn duplicate(correlation_id: CorrelationId) -> Self {
        Response {
            correlation_id,
            result: None,
            error_message: Some(DUPLICATE_MESSAGE.to_string()),
            status: Status::Duplicate,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Checks that exactly one of `result` / `error_message` matches the status.
    pub fn validate(&self) -> Result<()> {
        let consistent = match self.status {
            Status::Ok => self.result.is_some() && self.error_message.is_none(),
            Status::Error | Status::Duplicate => {
                self.result.is_none() && self.error_message.is_some()
            }
        };

        if consistent {
            Ok(())
        } else {
            Err(RpcError::Validation(format!(
                "{} response must carry {}",
                self.status,
                if self.status == Status::Ok {
                    "a result and no error"
                } else {
                    "an error and no result"
                }
            )))
        }
    }

    /// Converts the response into the method's result.
    ///
    /// ERROR becomes [`RpcError::Remote`] and DUPLICATE becomes
    /// [`RpcError::Duplicate`]: the call took effect on an earlier attempt but
    /// its result is not replayed.
    pub fn into_result(self) -> Result<RpcResult> {
        match self.status {
            Status::Ok => self.result.ok_or_else(|| {
                RpcError::Validation("OK response without a result".to_string())
            }),
            Status::Error => Err(RpcError::Remote(
                self.error_message.unwrap_or_else(|| "Unknown error".to_string()),
            )),
            Status::Duplicate => Err(RpcError::Duplicate),
        }
    }

    /// Like [`Response::into_result`], but treats DUPLICATE as success.
    ///
    /// `Ok(Some(value))` is a fresh result, `Ok(None)` means the request
    /// took effect on an earlier attempt and its result is not replayed.
    pub fn into_outcome(self) -> Result<Option<RpcResult>> {
        match self.status {
            Status::Duplicate => Ok(None),
            _ => self.into_result().map(Some),
        }
    }
}

/// A present `result` field is `Some` even when it holds JSON `null`.
fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<RpcResult>, D::Error>
where
    D: Deserializer<'de>,
{
    RpcResult::deserialize(deserializer).map(Some)
}
