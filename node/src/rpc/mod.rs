//! JSON-RPC transport seam and batch fetching.

mod batch;
mod http;

pub use batch::{decode, fetch_batch, fetch_values, reduce_batch_on_retry, ErrorClassifier};
pub use http::{HttpTransport, HttpTransportConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single JSON-RPC call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: &'static str, params: Vec<Value>) -> Self {
        Self { method, params }
    }
}

/// Error object the server returned for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Outcome of one call: the result value or the server's error object.
pub type RpcResponse = Result<Value, RpcErrorObject>;

/// Failures below the JSON-RPC layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
    /// The peer answered, but not with a well-formed JSON-RPC payload.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The request could not be issued at all; retrying will not help.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Capability the ingestion engine needs from an RPC client.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issues one call. `retry_attempts` overrides the transport's default budget.
    async fn call(
        &self,
        request: &RpcRequest,
        retry_attempts: Option<u32>,
    ) -> Result<RpcResponse, TransportError>;

    /// Issues a batch. Responses come back in request order.
    async fn batch_call(
        &self,
        requests: &[RpcRequest],
        retry_attempts: Option<u32>,
    ) -> Result<Vec<RpcResponse>, TransportError>;

    /// Number of requests the endpoint is expected to serve in parallel.
    fn concurrency(&self) -> usize;

    fn is_connection_error(&self, err: &TransportError) -> bool;
}

/// Encodes a block number as a JSON-RPC quantity.
pub fn quantity(value: u64) -> Value {
    Value::String(format!("{value:#x}"))
}
