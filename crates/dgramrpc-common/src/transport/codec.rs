use serde_json::Value;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{CorrelationId, Request, Response};

/// JSON codec for encoding/decoding RPC envelopes
///
/// Decoding distinguishes two failure classes:
///
/// - [`RpcError::Decoding`]: the bytes are not a well-formed envelope
/// - [`RpcError::Validation`]: well-formed, but a required field is missing
///   or the status/result/error combination is inconsistent
///
/// Unknown fields are ignored so newer peers can add fields freely.
///
/// # Example
///
/// ```
/// use dgramrpc_common::transport::JsonCodec;
/// use dgramrpc_common::{Params, Request};
///
/// let request = Request::new("add", Params::new().with("a", 1).with("b", 2));
/// let encoded = JsonCodec::encode_request(&request).unwrap();
/// let decoded = JsonCodec::decode_request(&encoded).unwrap();
/// assert_eq!(request, decoded);
/// ```
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a request to bytes
    pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
        serde_json::to_vec(request).map_err(|e| RpcError::Encoding(e.to_string()))
    }

    /// Decode a request from bytes
    ///
    /// # Errors
    ///
    /// Returns `Decoding` for malformed JSON or wrongly-typed fields, and
    /// `Validation` when `request_id` or `method` is missing or empty.
    pub fn decode_request(data: &[u8]) -> Result<Request> {
        let request: Request =
            serde_json::from_slice(data).map_err(|e| RpcError::Decoding(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Encode a response to bytes
    pub fn encode_response(response: &Response) -> Result<Vec<u8>> {
        serde_json::to_vec(response).map_err(|e| RpcError::Encoding(e.to_string()))
    }

    /// Decode a response from bytes
    pub fn decode_response(data: &[u8]) -> Result<Response> {
        let response: Response =
            serde_json::from_slice(data).map_err(|e| RpcError::Decoding(e.to_string()))?;
        response.validate()?;
        Ok(response)
    }

    /// Best-effort extraction of `request_id` from a datagram that failed to
    /// decode as a full request.
    ///
    /// Lets the server correlate its ERROR reply whenever the id itself was
    /// readable, even if other fields were not.
    pub fn peek_correlation_id(data: &[u8]) -> Option<CorrelationId> {
        let value: Value = serde_json::from_slice(data).ok()?;
        value
            .get("request_id")?
            .as_str()
            .filter(|id| !id.is_empty())
            .map(CorrelationId::from)
    }
}
