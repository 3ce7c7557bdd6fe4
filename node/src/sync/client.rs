//! Batch orchestration and head queries over an [`RpcTransport`].

use super::{
    debug_trace, plan::TraceSource, receipts, traces, Commitment, DataRequest, EnrichmentPlan,
    Enrichment, IngestedBlock,
};
use crate::{
    chain::{BlockRef, ChainPolicy, RawBlock, Receipt, TraceReplay, TxCallTrace, TxStateDiff},
    error::IngestError,
    rpc::{fetch_batch, quantity, ErrorClassifier, RpcErrorObject, RpcRequest, RpcTransport},
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Settings that shape how the client talks to the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientOptions {
    pub chain_id: Option<u64>,
    /// Treat `latest - n` as finalized instead of asking the node.
    pub finality_confirmation: Option<u64>,
    /// Overrides the transport's retry budget for single calls.
    pub retry_attempts: Option<u32>,
}

/// Fetches verified, enriched block batches from one JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcIngest {
    transport: Arc<dyn RpcTransport>,
    policy: ChainPolicy,
    options: ClientOptions,
}

#[derive(Debug, Deserialize)]
struct HeadResponse {
    #[serde(with = "alloy_serde::quantity")]
    number: u64,
    hash: alloy_primitives::B256,
}

fn is_unavailable_block(err: &RpcErrorObject) -> bool {
    let message = err.message.to_ascii_lowercase();
    message.contains("cannot query unfinalized data") || message.contains("data not available")
}

/// Enrichment results for a chain prefix, aligned with its blocks.
#[derive(Debug, Default)]
struct BlockEnrichments {
    receipts: Option<Vec<Enrichment<Vec<Receipt>>>>,
    traces: Option<Vec<Enrichment<Vec<TraceReplay>>>>,
    call_traces: Option<Vec<Enrichment<Vec<TxCallTrace>>>>,
    state_diffs: Option<Vec<Enrichment<Vec<TxStateDiff>>>>,
}

impl RpcIngest {
    pub fn new(transport: Arc<dyn RpcTransport>, options: ClientOptions) -> Self {
        Self {
            transport,
            policy: options.chain_id.map(ChainPolicy::for_chain).unwrap_or_default(),
            options,
        }
    }

    pub(crate) fn transport(&self) -> &dyn RpcTransport {
        &*self.transport
    }

    pub fn policy(&self) -> ChainPolicy {
        self.policy
    }

    pub(crate) fn retry_attempts(&self) -> Option<u32> {
        self.options.retry_attempts
    }

    /// Issues one call and decodes its result. `null` is reported as `None`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
        classify: Option<ErrorClassifier>,
    ) -> Result<Option<T>, IngestError> {
        let request = [RpcRequest::new(method, params)];
        let mut results =
            fetch_batch(self.transport(), &request, self.retry_attempts(), classify).await?;
        Ok(results.pop().flatten())
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Vec<Value>,
    ) -> Result<T, IngestError> {
        self.call(method, params, None)
            .await?
            .ok_or_else(|| IngestError::Validation {
                method,
                reason: "unexpected null result".to_string(),
            })
    }

    pub async fn get_chain_id(&self) -> Result<u64, IngestError> {
        let id: alloy_primitives::U64 = self.call_required("eth_chainId", vec![]).await?;
        Ok(id.to())
    }

    /// Latest block number known to the node.
    pub async fn get_height(&self) -> Result<u64, IngestError> {
        let height: alloy_primitives::U64 = self.call_required("eth_blockNumber", vec![]).await?;
        Ok(height.to())
    }

    pub async fn get_finalized_height(&self) -> Result<u64, IngestError> {
        match self.options.finality_confirmation {
            Some(depth) => Ok(self.get_height().await?.saturating_sub(depth)),
            None => Ok(self.get_latest_blockhash(Commitment::Finalized).await?.number),
        }
    }

    /// Number and hash of the latest or finalized head.
    ///
    /// With a confirmation depth configured, "finalized" is `latest - depth`.
    pub async fn get_latest_blockhash(
        &self,
        commitment: Commitment,
    ) -> Result<BlockRef, IngestError> {
        let tag = match (commitment, self.options.finality_confirmation) {
            (Commitment::Latest, _) => json!("latest"),
            (Commitment::Finalized, None) => json!("finalized"),
            (Commitment::Finalized, Some(depth)) => {
                quantity(self.get_height().await?.saturating_sub(depth))
            }
        };
        let head: HeadResponse = self
            .call_required("eth_getBlockByNumber", vec![tag, json!(false)])
            .await?;
        trace!(?commitment, number = head.number, hash = %head.hash, "head resolved");
        Ok(BlockRef::new(head.number, head.hash))
    }

    /// Fetches `numbers` (ascending, contiguous) and returns the longest
    /// prefix that is available, chained, verified, and fully enriched.
    pub async fn get_block_batch(
        &self,
        numbers: &[u64],
        request: &DataRequest,
    ) -> Result<Vec<IngestedBlock>, IngestError> {
        if numbers.is_empty() {
            return Ok(Vec::new());
        }
        let full = request.needs_full_transactions();
        let requests: Vec<RpcRequest> = numbers
            .iter()
            .map(|&number| RpcRequest::new("eth_getBlockByNumber", vec![quantity(number), json!(full)]))
            .collect();
        let fetched: Vec<Option<RawBlock>> = fetch_batch(
            self.transport(),
            &requests,
            self.retry_attempts(),
            Some(is_unavailable_block),
        )
        .await?;

        let blocks = chain_prefix(numbers, fetched)?;
        if blocks.len() < numbers.len() {
            debug!(
                requested = numbers.len(),
                available = blocks.len(),
                first = numbers[0],
                "block batch shortened"
            );
        }
        for block in &blocks {
            self.verify_block(block, request)?;
        }

        let plan = EnrichmentPlan::from_request(request);
        let enrichments = self.enrich(&blocks, &plan, request).await?;
        Ok(assemble(blocks, enrichments))
    }

    fn verify_block(&self, block: &RawBlock, request: &DataRequest) -> Result<(), IngestError> {
        if request.verify_block_hash {
            let computed = self.policy.block_hash(block);
            if computed != block.hash {
                return Err(IngestError::invariant(format!(
                    "block {} hash mismatch: served {}, computed {computed}",
                    block.number, block.hash
                )));
            }
        }
        if request.verify_tx_root {
            let txs = block.transactions.as_full().ok_or_else(|| {
                IngestError::invariant(format!(
                    "block {} served without transaction objects",
                    block.number
                ))
            })?;
            let computed = self.policy.transactions_root(txs)?;
            if computed != block.transactions_root {
                return Err(IngestError::invariant(format!(
                    "block {} transactions root mismatch: served {}, computed {computed}",
                    block.number, block.transactions_root
                )));
            }
        }
        Ok(())
    }

    async fn enrich(
        &self,
        blocks: &[RawBlock],
        plan: &EnrichmentPlan,
        request: &DataRequest,
    ) -> Result<BlockEnrichments, IngestError> {
        if blocks.is_empty() || plan.is_empty() {
            return Ok(BlockEnrichments::default());
        }
        let timeout = request.debug_trace_timeout.as_deref();

        let receipts = async {
            match plan.receipts {
                Some(api) => receipts::fetch(self, blocks, api, request).await.map(Some),
                None => Ok(None),
            }
        };
        let call_traces = async {
            match plan.traces {
                Some(TraceSource::DebugCallTracer) => {
                    debug_trace::call_traces(self, blocks, timeout).await.map(Some)
                }
                _ => Ok(None),
            }
        };
        let traces = async {
            match (plan.traces, plan.replay) {
                (Some(TraceSource::TraceBlock), _) => {
                    traces::trace_block(self, blocks).await.map(Some)
                }
                (_, Some(tracers)) => traces::replay(self, blocks, tracers).await.map(Some),
                _ => Ok(None),
            }
        };
        let state_diffs = async {
            if plan.debug_state_diffs {
                debug_trace::state_diffs(self, blocks, timeout).await.map(Some)
            } else {
                Ok(None)
            }
        };

        let (receipts, call_traces, traces, state_diffs) =
            tokio::try_join!(receipts, call_traces, traces, state_diffs)?;
        Ok(BlockEnrichments {
            receipts,
            traces,
            call_traces,
            state_diffs,
        })
    }
}

/// Longest prefix of present blocks in which each block extends the previous.
fn chain_prefix(
    numbers: &[u64],
    fetched: Vec<Option<RawBlock>>,
) -> Result<Vec<RawBlock>, IngestError> {
    let mut chain: Vec<RawBlock> = Vec::with_capacity(fetched.len());
    for (&number, block) in numbers.iter().zip(fetched) {
        let Some(block) = block else { break };
        if block.number != number {
            return Err(IngestError::invariant(format!(
                "requested block {number}, node served {}",
                block.number
            )));
        }
        if let Some(prev) = chain.last() {
            if block.parent_hash != prev.hash {
                debug!(
                    number,
                    parent_hash = %block.parent_hash,
                    prev_hash = %prev.hash,
                    "batch crosses a reorg, truncating"
                );
                break;
            }
        }
        chain.push(block);
    }
    Ok(chain)
}

type Parts<T> = Option<std::vec::IntoIter<Enrichment<T>>>;

fn next_part<T>(parts: &mut Parts<T>) -> Result<Option<T>, String> {
    match parts.as_mut().and_then(Iterator::next) {
        None => Ok(None),
        Some(Enrichment::Valid(value)) => Ok(Some(value)),
        Some(Enrichment::Invalid(reason)) => Err(reason),
    }
}

/// Zips blocks with their enrichments, stopping at the first invalid block.
fn assemble(blocks: Vec<RawBlock>, enrichments: BlockEnrichments) -> Vec<IngestedBlock> {
    let mut receipts = enrichments.receipts.map(Vec::into_iter);
    let mut traces = enrichments.traces.map(Vec::into_iter);
    let mut call_traces = enrichments.call_traces.map(Vec::into_iter);
    let mut state_diffs = enrichments.state_diffs.map(Vec::into_iter);

    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        let parts = (
            next_part(&mut receipts),
            next_part(&mut traces),
            next_part(&mut call_traces),
            next_part(&mut state_diffs),
        );
        match parts {
            (Ok(receipts), Ok(traces), Ok(call_traces), Ok(state_diffs)) => {
                out.push(IngestedBlock {
                    number: block.number,
                    hash: block.hash,
                    block,
                    receipts,
                    traces,
                    call_traces,
                    state_diffs,
                });
            }
            (receipts, traces, call_traces, state_diffs) => {
                let reasons: Vec<String> = [
                    receipts.err(),
                    traces.err(),
                    call_traces.err(),
                    state_diffs.err(),
                ]
                .into_iter()
                .flatten()
                .collect();
                debug!(
                    number = block.number,
                    reason = %reasons.join("; "),
                    "block data invalid, truncating batch"
                );
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::BlockTransactions,
        rpc::TransportError,
        test_utils::{
            block_hash, block_json, block_receipts, eip1559_tx, legacy_tx, number_param,
            shanghai_block_json, tx_hash, ChainFixture, MockReply, MockTransport,
        },
    };
    use alloy_primitives::B256;

    fn client(transport: MockTransport) -> RpcIngest {
        RpcIngest::new(Arc::new(transport), ClientOptions::default())
    }

    #[tokio::test]
    async fn full_batch_of_linear_blocks() {
        let fixture = ChainFixture::new(20, 2);
        let client = client(fixture.transport());
        let blocks = client
            .get_block_batch(&[3, 4, 5], &DataRequest::default())
            .await
            .expect("batch");
        let numbers: Vec<u64> = blocks.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(blocks[1].parent_hash(), block_hash(3));
        assert!(blocks.iter().all(|b| b.receipts.is_none()));
    }

    #[tokio::test]
    async fn batch_stops_at_first_missing_block() {
        let fixture = ChainFixture::new(4, 1);
        let client = client(fixture.transport());
        let blocks = client
            .get_block_batch(&[3, 4, 5, 6], &DataRequest::default())
            .await
            .expect("batch");
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn unfinalized_error_is_treated_as_missing() {
        let fixture = ChainFixture::new(10, 0);
        let transport = MockTransport::new().on("eth_getBlockByNumber", move |request| {
            let number = number_param(request);
            if number >= 6 {
                MockReply::Error(RpcErrorObject::new(-32000, "cannot query unfinalized data"))
            } else {
                MockReply::Value(fixture.block(number).unwrap_or(Value::Null))
            }
        });
        let blocks = client(transport)
            .get_block_batch(&[4, 5, 6, 7], &DataRequest::default())
            .await
            .expect("batch");
        assert_eq!(blocks.len(), 2);
    }

    #[tokio::test]
    async fn batch_stops_where_parent_hash_breaks() {
        let fixture = ChainFixture::new(10, 0);
        let transport = MockTransport::new().on("eth_getBlockByNumber", move |request| {
            let number = number_param(request);
            if number == 5 {
                MockReply::Value(block_json(5, B256::repeat_byte(0xf5), B256::repeat_byte(0xf4), 0))
            } else {
                MockReply::Value(fixture.block(number).unwrap_or(Value::Null))
            }
        });
        let blocks = client(transport)
            .get_block_batch(&[3, 4, 5, 6], &DataRequest::default())
            .await
            .expect("batch");
        assert_eq!(blocks.iter().map(|b| b.number).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn missing_receipts_truncate_the_batch() {
        let fixture = ChainFixture::new(10, 2);
        let receipts = fixture.clone();
        let transport = fixture.transport().on("eth_getBlockReceipts", move |request| {
            let number = number_param(request);
            if number == 6 {
                MockReply::Value(Value::Null)
            } else {
                MockReply::Value(receipts.receipts(number).unwrap_or(Value::Null))
            }
        });
        let request = DataRequest {
            receipts: true,
            ..Default::default()
        };
        let blocks = client(transport)
            .get_block_batch(&[4, 5, 6, 7], &request)
            .await
            .expect("batch");
        assert_eq!(blocks.len(), 2);
        let receipts = blocks[1].receipts.as_ref().expect("receipts");
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[1].transaction_hash, tx_hash(5, 1));
    }

    #[tokio::test]
    async fn receipts_from_another_fork_truncate_the_batch() {
        let fixture = ChainFixture::new(10, 1);
        let transport = fixture.clone().transport().on("eth_getBlockReceipts", move |request| {
            let number = number_param(request);
            let hash = if number == 5 { B256::repeat_byte(0xee) } else { block_hash(number) };
            MockReply::Value(Value::Array(vec![crate::test_utils::receipt_json(number, hash, 0)]))
        });
        let request = DataRequest {
            receipts: true,
            ..Default::default()
        };
        let blocks = client(transport)
            .get_block_batch(&[4, 5, 6], &request)
            .await
            .expect("batch");
        assert_eq!(blocks.len(), 1);
    }

    fn verified_block_transport(mutate: fn(&mut Value)) -> MockTransport {
        MockTransport::new()
            .on("eth_getBlockByNumber", move |_| {
                let mut block = shanghai_block_json();
                block["transactions"] = serde_json::to_value([legacy_tx(), eip1559_tx()])
                    .expect("transactions");
                mutate(&mut block);
                MockReply::Value(block)
            })
            .on("eth_getBlockReceipts", |_| {
                let hash = shanghai_block_json()["hash"].clone();
                let hash: B256 = serde_json::from_value(hash).expect("hash");
                MockReply::Value(serde_json::to_value(block_receipts(hash)).expect("receipts"))
            })
    }

    fn verify_everything() -> DataRequest {
        DataRequest {
            transactions: true,
            receipts: true,
            verify_block_hash: true,
            verify_tx_root: true,
            verify_receipts_root: true,
            verify_logs_bloom: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn consistent_block_passes_every_check() {
        let blocks = client(verified_block_transport(|_| {}))
            .get_block_batch(&[16], &verify_everything())
            .await
            .expect("batch");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(
            blocks[0].block.transactions,
            BlockTransactions::Full(ref txs) if txs.len() == 2
        ));
        assert_eq!(blocks[0].receipts.as_ref().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn tampered_header_is_fatal() {
        let err = client(verified_block_transport(|block| {
            block["gasUsed"] = json!("0x10640");
        }))
        .get_block_batch(&[16], &verify_everything())
        .await
        .expect_err("hash mismatch");
        assert!(matches!(err, IngestError::Invariant(_)));
    }

    #[tokio::test]
    async fn receipts_root_mismatch_invalidates_the_block() {
        let transport = verified_block_transport(|_| {}).on("eth_getBlockReceipts", |_| {
            let hash: B256 =
                serde_json::from_value(shanghai_block_json()["hash"].clone()).expect("hash");
            let mut receipts = block_receipts(hash);
            receipts[1].cumulative_gas_used += 1;
            MockReply::Value(serde_json::to_value(receipts).expect("receipts"))
        });
        let blocks = client(transport)
            .get_block_batch(&[16], &verify_everything())
            .await
            .expect("batch");
        assert!(blocks.is_empty());
    }

    #[tokio::test]
    async fn logs_outside_the_header_bloom_invalidate_the_block() {
        let transport = verified_block_transport(|_| {}).on("eth_getBlockReceipts", |_| {
            let hash: B256 =
                serde_json::from_value(shanghai_block_json()["hash"].clone()).expect("hash");
            let mut receipts = block_receipts(hash);
            receipts[1].logs[0].topics[0] = B256::repeat_byte(0xab);
            MockReply::Value(serde_json::to_value(receipts).expect("receipts"))
        });
        let request = DataRequest {
            verify_receipts_root: false,
            ..verify_everything()
        };
        let blocks = client(transport)
            .get_block_batch(&[16], &request)
            .await
            .expect("batch");
        assert!(blocks.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_is_fatal() {
        let transport = MockTransport::new()
            .on("eth_getBlockByNumber", |_| MockReply::Fail(TransportError::Timeout));
        let err = client(transport)
            .get_block_batch(&[1, 2], &DataRequest::default())
            .await
            .expect_err("transport");
        assert!(matches!(err, IngestError::Transport(TransportError::Timeout)));
    }

    #[tokio::test]
    async fn finalized_head_uses_confirmation_depth() {
        let fixture = ChainFixture::new(100, 0);
        let client = RpcIngest::new(
            Arc::new(fixture.transport()),
            ClientOptions {
                finality_confirmation: Some(10),
                ..Default::default()
            },
        );
        let head = client
            .get_latest_blockhash(Commitment::Finalized)
            .await
            .expect("head");
        assert_eq!(head, BlockRef::new(90, block_hash(90)));
        assert_eq!(client.get_finalized_height().await.expect("height"), 90);

        let latest = client
            .get_latest_blockhash(Commitment::Latest)
            .await
            .expect("latest");
        assert_eq!(latest.number, 100);
    }

    #[tokio::test]
    async fn finalized_head_falls_back_to_the_tag() {
        let fixture = ChainFixture::new(42, 0);
        let transport = fixture.transport();
        let client = client(transport.clone());
        let head = client
            .get_latest_blockhash(Commitment::Finalized)
            .await
            .expect("head");
        assert_eq!(head.number, 42);
        assert_eq!(transport.calls()[0].requests[0].params[0], json!("finalized"));
        assert_eq!(client.get_height().await.expect("height"), 42);
        assert_eq!(client.get_chain_id().await.expect("chain id"), 1);
    }
}
