//! Block ingestion: batch orchestration, stride scheduling, and continuity.

mod client;
mod continuity;
mod debug_trace;
mod plan;
mod receipts;
mod stride;
mod stream;
mod traces;

pub use client::{ClientOptions, RpcIngest};
pub use continuity::{guard_stream, ContinuityGuard, GuardOutcome};
pub use plan::{EnrichmentPlan, ReplayTracers, TraceSource};
pub use stride::{stride_stream, StrideOptions, StridePlanner};
pub use stream::{ingest, IngestOptions, IngestProgress};

use crate::chain::{BlockRef, RawBlock, Receipt, TraceReplay, TxCallTrace, TxStateDiff};
use alloy_primitives::B256;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How receipts are fetched.
#[derive(ValueEnum, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptsApi {
    /// One `eth_getBlockReceipts` per block.
    #[default]
    Block,
    /// One `eth_getTransactionReceipt` per transaction.
    Transaction,
}

/// What to fetch and verify for each block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub transactions: bool,
    pub receipts: bool,
    pub traces: bool,
    pub state_diffs: bool,
    pub use_trace_api: bool,
    pub use_debug_api_for_state_diffs: bool,
    /// Tracer timeout passed to debug APIs, e.g. `"30s"`.
    pub debug_trace_timeout: Option<String>,
    pub receipts_api: ReceiptsApi,
    pub verify_block_hash: bool,
    pub verify_tx_root: bool,
    pub verify_receipts_root: bool,
    pub verify_logs_bloom: bool,
}

impl DataRequest {
    /// Full transaction objects are needed for output or for root checks.
    pub fn needs_full_transactions(&self) -> bool {
        self.transactions || self.verify_tx_root
    }
}

/// Outcome of one enrichment step for one block.
#[derive(Debug, Clone, PartialEq)]
pub enum Enrichment<T> {
    Valid(T),
    /// The node could not serve consistent data for this block.
    Invalid(String),
}

impl<T> Enrichment<T> {
    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> Enrichment<U> {
        match self {
            Enrichment::Valid(value) => Enrichment::Valid(f(value)),
            Enrichment::Invalid(reason) => Enrichment::Invalid(reason),
        }
    }
}

/// A block with the enrichment data the request asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedBlock {
    #[serde(with = "alloy_serde::quantity")]
    pub number: u64,
    pub hash: B256,
    pub block: RawBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipts: Option<Vec<Receipt>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traces: Option<Vec<TraceReplay>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_traces: Option<Vec<TxCallTrace>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_diffs: Option<Vec<TxStateDiff>>,
}

impl IngestedBlock {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.number, self.hash)
    }

    pub fn parent_hash(&self) -> B256 {
        self.block.parent_hash
    }
}

/// Contiguous blocks from one stride window, tagged with the finalized head
/// observed when the window was dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBatch {
    pub blocks: Vec<IngestedBlock>,
    pub finalized_head: BlockRef,
}

/// Which head a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commitment {
    Latest,
    Finalized,
}

/// Emitted when a block does not extend the trusted chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkSignal {
    pub trusted_parent_hash: B256,
    pub conflicting_block: BlockRef,
    /// Blocks the consumer should re-check to locate the fork point.
    pub candidate_parents: Vec<BlockRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Batch(BlockBatch),
    Fork(ForkSignal),
}
