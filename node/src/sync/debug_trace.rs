//! `debug_traceBlockByHash` enrichment with geth's built-in tracers.

use super::{client::RpcIngest, Enrichment};
use crate::{
    chain::{DebugFrame, DebugStateDiff, DebugTxResult, RawBlock, TxCallTrace, TxStateDiff},
    error::IngestError,
    rpc::{decode, fetch_values, RpcErrorObject, RpcRequest},
};
use alloy_primitives::B256;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

const METHOD: &str = "debug_traceBlockByHash";

/// JSON-RPC `Method not found`: the node has no `debug` namespace.
const METHOD_NOT_FOUND: i64 = -32601;

fn is_unknown_block(err: &RpcErrorObject) -> bool {
    err.code != METHOD_NOT_FOUND && err.message.to_ascii_lowercase().contains("not found")
}

fn tracer_config(tracer: &str, tracer_config: Value, timeout: Option<&str>) -> Value {
    let mut config = json!({ "tracer": tracer, "tracerConfig": tracer_config });
    if let Some(timeout) = timeout {
        config["timeout"] = json!(timeout);
    }
    config
}

pub(super) async fn call_traces(
    client: &RpcIngest,
    blocks: &[RawBlock],
    timeout: Option<&str>,
) -> Result<Vec<Enrichment<Vec<TxCallTrace>>>, IngestError> {
    let config = tracer_config(
        "callTracer",
        json!({ "onlyTopCall": false, "withLog": true }),
        timeout,
    );
    let traced = trace_blocks::<DebugFrame>(client, blocks, config).await?;
    Ok(traced
        .into_iter()
        .map(|block| {
            block.map(|results| {
                results
                    .into_iter()
                    .map(|(transaction_hash, frame)| TxCallTrace {
                        transaction_hash,
                        frame,
                    })
                    .collect()
            })
        })
        .collect())
}

pub(super) async fn state_diffs(
    client: &RpcIngest,
    blocks: &[RawBlock],
    timeout: Option<&str>,
) -> Result<Vec<Enrichment<Vec<TxStateDiff>>>, IngestError> {
    let config = tracer_config("prestateTracer", json!({ "diffMode": true }), timeout);
    let traced = trace_blocks::<DebugStateDiff>(client, blocks, config).await?;
    Ok(traced
        .into_iter()
        .map(|block| {
            block.map(|results| {
                results
                    .into_iter()
                    .map(|(transaction_hash, diff)| TxStateDiff {
                        transaction_hash,
                        diff,
                    })
                    .collect()
            })
        })
        .collect())
}

async fn trace_blocks<T: DeserializeOwned>(
    client: &RpcIngest,
    blocks: &[RawBlock],
    config: Value,
) -> Result<Vec<Enrichment<Vec<(B256, T)>>>, IngestError> {
    let requests: Vec<RpcRequest> = blocks
        .iter()
        .map(|block| RpcRequest::new(METHOD, vec![json!(block.hash), config.clone()]))
        .collect();
    let served = fetch_values(
        client.transport(),
        &requests,
        client.retry_attempts(),
        Some(is_unknown_block),
    )
    .await?;

    blocks
        .iter()
        .zip(served)
        .map(|(block, value)| match value {
            None => Ok(Enrichment::Invalid(format!(
                "debug traces unavailable for block {}",
                block.number
            ))),
            Some(value) => {
                let results: Vec<DebugTxResult<T>> = decode(METHOD, normalize(value)?)?;
                match_transactions(block, results)
            }
        })
        .collect()
}

/// Wraps bare tracer output as `{"result": ..}` so every entry decodes as a
/// [`DebugTxResult`].
fn normalize(value: Value) -> Result<Value, IngestError> {
    let Value::Array(items) = value else {
        return Err(IngestError::Validation {
            method: METHOD,
            reason: "expected an array of per-transaction results".to_string(),
        });
    };
    Ok(Value::Array(
        items
            .into_iter()
            .map(|item| if is_wrapped(&item) { item } else { json!({ "result": item }) })
            .collect(),
    ))
}

fn is_wrapped(item: &Value) -> bool {
    let Some(object) = item.as_object() else {
        return false;
    };
    object.contains_key("result") || object.contains_key("txHash") || is_bare_error(object)
}

fn is_bare_error(object: &Map<String, Value>) -> bool {
    object.len() == 1 && object.contains_key("error")
}

/// Pairs tracer results with the block's transactions, by position when the
/// node returns one result per transaction in order, by hash otherwise.
fn match_transactions<T>(
    block: &RawBlock,
    results: Vec<DebugTxResult<T>>,
) -> Result<Enrichment<Vec<(B256, T)>>, IngestError> {
    let hashes = block.transactions.hashes();
    if results.is_empty() && !hashes.is_empty() {
        return Ok(Enrichment::Invalid(format!(
            "no debug traces for block {} with {} transactions",
            block.number,
            hashes.len()
        )));
    }

    let positional = results.len() == hashes.len()
        && results
            .iter()
            .zip(&hashes)
            .all(|(result, hash)| result.tx_hash.is_none_or(|reported| reported == *hash));
    let ordered: Vec<(B256, DebugTxResult<T>)> = if positional {
        hashes.into_iter().zip(results).collect()
    } else {
        debug!(
            number = block.number,
            transactions = hashes.len(),
            results = results.len(),
            "debug traces out of order, matching by hash"
        );
        let mut by_hash: HashMap<B256, DebugTxResult<T>> = HashMap::with_capacity(results.len());
        for result in results {
            let hash = result.tx_hash.ok_or_else(|| {
                IngestError::invariant(format!(
                    "debug trace without transaction hash in block {}",
                    block.number
                ))
            })?;
            by_hash.insert(hash, result);
        }
        hashes
            .into_iter()
            .map(|hash| {
                by_hash.remove(&hash).map(|result| (hash, result)).ok_or_else(|| {
                    IngestError::invariant(format!(
                        "no debug trace for transaction {hash} in block {}",
                        block.number
                    ))
                })
            })
            .collect::<Result<_, _>>()?
    };

    let mut traced = Vec::with_capacity(ordered.len());
    for (hash, result) in ordered {
        if let Some(error) = result.error {
            return Ok(Enrichment::Invalid(format!(
                "tracer failed for transaction {hash} in block {}: {error}",
                block.number
            )));
        }
        match result.result {
            Some(value) => traced.push((hash, value)),
            None => {
                return Ok(Enrichment::Invalid(format!(
                    "empty trace for transaction {hash} in block {}",
                    block.number
                )))
            }
        }
    }
    Ok(Enrichment::Valid(traced))
}
