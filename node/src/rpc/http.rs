//! HTTP transport backed by the jsonrpsee client.

use super::{RpcErrorObject, RpcRequest, RpcResponse, RpcTransport, TransportError};
use async_trait::async_trait;
use jsonrpsee::{
    core::{
        client::{BatchResponse, ClientT, Error as ClientError},
        params::{ArrayParams, BatchRequestBuilder},
    },
    http_client::{HttpClient, HttpClientBuilder},
    types::ErrorObject,
};
use serde_json::Value;
use std::{future::Future, time::Duration};
use tracing::debug;

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub url: String,
    pub concurrency: usize,
    pub retry_attempts: u32,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
    /// Largest response body accepted, in bytes. Single block traces are not
    /// divisible, so this must cover the largest one.
    pub max_response_size: u32,
}

/// JSON-RPC over HTTP with bounded retries on connection failures.
#[derive(Debug)]
pub struct HttpTransport {
    client: HttpClient,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .max_response_size(config.max_response_size)
            .build(&config.url)
            .map_err(|err| TransportError::Rejected(err.to_string()))?;
        Ok(Self { client, config })
    }

    async fn with_retries<T, F, Fut>(
        &self,
        retry_attempts: Option<u32>,
        mut attempt: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let budget = retry_attempts.unwrap_or(self.config.retry_attempts);
        let mut retries = 0u32;
        loop {
            match attempt().await {
                Err(err) if retries < budget && self.is_connection_error(&err) => {
                    retries += 1;
                    debug!(attempt = retries, budget, error = %err, "retrying rpc request");
                    tokio::time::sleep(self.config.retry_backoff.saturating_mul(retries)).await;
                }
                result => return result,
            }
        }
    }
}

fn array_params(values: &[Value]) -> Result<ArrayParams, TransportError> {
    let mut params = ArrayParams::new();
    for value in values {
        params
            .insert(value)
            .map_err(|err| TransportError::Rejected(err.to_string()))?;
    }
    Ok(params)
}

fn error_object(err: &ErrorObject<'_>) -> RpcErrorObject {
    RpcErrorObject {
        code: i64::from(err.code()),
        message: err.message().to_string(),
        data: err
            .data()
            .and_then(|raw| serde_json::from_str(raw.get()).ok()),
    }
}

fn transport_error(err: ClientError) -> TransportError {
    match err {
        ClientError::Transport(err) => TransportError::Connection(err.to_string()),
        ClientError::RestartNeeded(err) => TransportError::Connection(err.to_string()),
        ClientError::RequestTimeout => TransportError::Timeout,
        ClientError::ParseError(err) => TransportError::Protocol(err.to_string()),
        other => TransportError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        request: &RpcRequest,
        retry_attempts: Option<u32>,
    ) -> Result<RpcResponse, TransportError> {
        let client = &self.client;
        self.with_retries(retry_attempts, || async move {
            let params = array_params(&request.params)?;
            match client.request::<Value, _>(request.method, params).await {
                Ok(value) => Ok(Ok(value)),
                Err(ClientError::Call(err)) => Ok(Err(error_object(&err))),
                Err(err) => Err(transport_error(err)),
            }
        })
        .await
    }

    async fn batch_call(
        &self,
        requests: &[RpcRequest],
        retry_attempts: Option<u32>,
    ) -> Result<Vec<RpcResponse>, TransportError> {
        let client = &self.client;
        self.with_retries(retry_attempts, || async move {
            let mut batch = BatchRequestBuilder::new();
            for request in requests {
                batch
                    .insert(request.method, array_params(&request.params)?)
                    .map_err(|err| TransportError::Rejected(err.to_string()))?;
            }
            let response: BatchResponse<'_, Value> =
                client.batch_request(batch).await.map_err(transport_error)?;
            Ok(response
                .into_iter()
                .map(|entry| entry.map_err(|err| error_object(&err)))
                .collect())
        })
        .await
    }

    fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    fn is_connection_error(&self, err: &TransportError) -> bool {
        matches!(err, TransportError::Connection(_) | TransportError::Timeout)
    }
}
