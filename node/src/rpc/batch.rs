//! Batched calls with bisection on transport failure.

use super::{RpcErrorObject, RpcRequest, RpcResponse, RpcTransport, TransportError};
use crate::error::IngestError;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Marks server errors that mean "no data for this item" rather than failure.
pub type ErrorClassifier = fn(&RpcErrorObject) -> bool;

/// Issues `requests` as one batch, splitting it in half whenever the transport
/// fails in a way a smaller payload might avoid.
///
/// Multi-request batches run with retries disabled so a failing batch is split
/// immediately; single requests use the caller's retry budget. Responses are
/// returned in request order regardless of how often the batch was split.
pub fn reduce_batch_on_retry<'a>(
    transport: &'a dyn RpcTransport,
    requests: &'a [RpcRequest],
    retry_attempts: Option<u32>,
) -> BoxFuture<'a, Result<Vec<RpcResponse>, TransportError>> {
    async move {
        if requests.len() <= 1 {
            let mut responses = Vec::with_capacity(requests.len());
            for request in requests {
                responses.push(transport.call(request, retry_attempts).await?);
            }
            return Ok(responses);
        }

        match transport.batch_call(requests, Some(0)).await {
            Ok(responses) => Ok(responses),
            Err(err) if is_splittable(transport, &err) => {
                let mid = requests.len().div_ceil(2);
                warn!(
                    batch_size = requests.len(),
                    method = requests[0].method,
                    error = %err,
                    "rpc batch failed, splitting"
                );
                let (left, right) = requests.split_at(mid);
                let (mut responses, tail) = futures::try_join!(
                    reduce_batch_on_retry(transport, left, retry_attempts),
                    reduce_batch_on_retry(transport, right, retry_attempts),
                )?;
                responses.extend(tail);
                Ok(responses)
            }
            Err(err) => Err(err),
        }
    }
    .boxed()
}

fn is_splittable(transport: &dyn RpcTransport, err: &TransportError) -> bool {
    transport.is_connection_error(err) || matches!(err, TransportError::Protocol(_))
}

/// Fetches raw values for `requests`.
///
/// JSON `null` and errors accepted by `classify` become `None`; any other
/// server error is fatal.
pub async fn fetch_values(
    transport: &dyn RpcTransport,
    requests: &[RpcRequest],
    retry_attempts: Option<u32>,
    classify: Option<ErrorClassifier>,
) -> Result<Vec<Option<Value>>, IngestError> {
    let responses = reduce_batch_on_retry(transport, requests, retry_attempts).await?;
    if responses.len() != requests.len() {
        return Err(TransportError::Protocol(format!(
            "expected {} responses, got {}",
            requests.len(),
            responses.len()
        ))
        .into());
    }

    requests
        .iter()
        .zip(responses)
        .map(|(request, response)| match response {
            Ok(Value::Null) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(err) if classify.is_some_and(|accept| accept(&err)) => {
                debug!(
                    method = request.method,
                    code = err.code,
                    message = %err.message,
                    "rpc reported missing data"
                );
                Ok(None)
            }
            Err(err) => Err(IngestError::Rpc {
                method: request.method,
                code: err.code,
                message: err.message,
            }),
        })
        .collect()
}

/// Decodes one result value, mapping shape errors to [`IngestError::Validation`].
pub fn decode<T: DeserializeOwned>(method: &'static str, value: Value) -> Result<T, IngestError> {
    serde_json::from_value(value).map_err(|err| IngestError::Validation {
        method,
        reason: err.to_string(),
    })
}

/// Fetches and decodes `requests`, preserving order.
pub async fn fetch_batch<T: DeserializeOwned>(
    transport: &dyn RpcTransport,
    requests: &[RpcRequest],
    retry_attempts: Option<u32>,
    classify: Option<ErrorClassifier>,
) -> Result<Vec<Option<T>>, IngestError> {
    let values = fetch_values(transport, requests, retry_attempts, classify).await?;
    requests
        .iter()
        .zip(values)
        .map(|(request, value)| value.map(|value| decode(request.method, value)).transpose())
        .collect()
}
