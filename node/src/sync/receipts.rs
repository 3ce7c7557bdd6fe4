//! Receipt enrichment.

use super::{client::RpcIngest, DataRequest, Enrichment, ReceiptsApi};
use crate::{
    chain::{RawBlock, Receipt},
    error::IngestError,
    rpc::{fetch_batch, quantity, RpcRequest},
};
use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use serde_json::json;
use tracing::debug;

/// Upper bound on `eth_getTransactionReceipt` calls per batch.
const TX_RECEIPTS_PER_BATCH: usize = 100;

pub(super) async fn fetch(
    client: &RpcIngest,
    blocks: &[RawBlock],
    api: ReceiptsApi,
    request: &DataRequest,
) -> Result<Vec<Enrichment<Vec<Receipt>>>, IngestError> {
    let served = match api {
        ReceiptsApi::Block => by_block(client, blocks).await?,
        ReceiptsApi::Transaction => by_transaction(client, blocks).await?,
    };
    blocks
        .iter()
        .zip(served)
        .map(|(block, receipts)| check_block_receipts(client, block, receipts, request))
        .collect()
}

async fn by_block(
    client: &RpcIngest,
    blocks: &[RawBlock],
) -> Result<Vec<Option<Vec<Receipt>>>, IngestError> {
    let requests: Vec<RpcRequest> = blocks
        .iter()
        .map(|block| RpcRequest::new("eth_getBlockReceipts", vec![quantity(block.number)]))
        .collect();
    fetch_batch(client.transport(), &requests, client.retry_attempts(), None).await
}

/// Per-transaction receipts, regrouped by block. A block with any missing
/// receipt yields `None`.
async fn by_transaction(
    client: &RpcIngest,
    blocks: &[RawBlock],
) -> Result<Vec<Option<Vec<Receipt>>>, IngestError> {
    let requests: Vec<RpcRequest> = blocks
        .iter()
        .flat_map(|block| block.transactions.hashes())
        .map(|hash| RpcRequest::new("eth_getTransactionReceipt", vec![json!(hash)]))
        .collect();
    let transport = client.transport();
    let pages: Vec<Vec<Option<Receipt>>> = stream::iter(requests.chunks(TX_RECEIPTS_PER_BATCH))
        .map(|page| fetch_batch(transport, page, client.retry_attempts(), None))
        .buffered(transport.concurrency().max(1))
        .try_collect::<Vec<_>>()
        .boxed()
        .await?;

    let mut receipts = pages.into_iter().flatten();
    Ok(blocks
        .iter()
        .map(|block| {
            let served: Vec<Option<Receipt>> =
                receipts.by_ref().take(block.transactions.len()).collect();
            served.into_iter().collect::<Option<Vec<Receipt>>>()
        })
        .collect())
}

fn check_block_receipts(
    client: &RpcIngest,
    block: &RawBlock,
    receipts: Option<Vec<Receipt>>,
    request: &DataRequest,
) -> Result<Enrichment<Vec<Receipt>>, IngestError> {
    let Some(receipts) = receipts else {
        return Ok(Enrichment::Invalid(format!(
            "receipts unavailable for block {}",
            block.number
        )));
    };
    if receipts.len() != block.transactions.len() {
        return Ok(Enrichment::Invalid(format!(
            "block {} has {} transactions but {} receipts",
            block.number,
            block.transactions.len(),
            receipts.len()
        )));
    }
    if let Some(stray) = receipts.iter().find(|r| r.block_hash != block.hash) {
        return Ok(Enrichment::Invalid(format!(
            "receipt {} belongs to block {}, expected {}",
            stray.transaction_hash, stray.block_hash, block.hash
        )));
    }

    let policy = client.policy();
    if request.verify_logs_bloom && policy.logs_bloom(&receipts) != block.logs_bloom {
        return Ok(Enrichment::Invalid(format!(
            "logs bloom mismatch in block {}",
            block.number
        )));
    }
    if request.verify_receipts_root {
        let computed = policy.receipts_root(&receipts)?;
        if computed != block.receipts_root {
            debug!(
                number = block.number,
                served = %block.receipts_root,
                %computed,
                "receipts root mismatch"
            );
            return Ok(Enrichment::Invalid(format!(
                "receipts root mismatch in block {}",
                block.number
            )));
        }
    }
    Ok(Enrichment::Valid(receipts))
}
