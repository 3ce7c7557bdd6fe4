//! The composed ingest stream: stride windows behind the continuity guard.

use super::{
    client::RpcIngest, continuity::guard_stream, stride::stride_stream, BlockBatch,
    ContinuityGuard, DataRequest, IngestEvent, StrideOptions,
};
use crate::{chain::BlockRef, error::IngestError};
use alloy_primitives::B256;
use futures::Stream;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub request: DataRequest,
    pub from: u64,
    /// Inclusive; `None` follows the chain until a window comes back short.
    pub to: Option<u64>,
    pub stride_size: u64,
    pub stride_concurrency: usize,
    /// Hash block `from` must name as its parent.
    pub expected_parent_hash: Option<B256>,
}

/// Ordered batches from `options.from` onward. Ends after the range is
/// exhausted, after a fork, or after the first error.
pub fn ingest(
    client: RpcIngest,
    options: IngestOptions,
) -> impl Stream<Item = Result<IngestEvent, IngestError>> + Send + 'static {
    info!(
        from = options.from,
        to = ?options.to,
        stride_size = options.stride_size,
        stride_concurrency = options.stride_concurrency,
        "starting ingest"
    );
    let stride = StrideOptions {
        from: options.from,
        to: options.to,
        stride_size: options.stride_size,
        concurrency: options.stride_concurrency,
    };
    guard_stream(
        stride_stream(client, options.request, stride),
        ContinuityGuard::new(options.expected_parent_hash),
    )
}

/// Last block handed to the caller, used to pick up a closed range where a
/// pass ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestProgress {
    from: u64,
    to: Option<u64>,
    last: Option<BlockRef>,
}

impl IngestProgress {
    pub fn new(options: &IngestOptions) -> Self {
        Self {
            from: options.from,
            to: options.to,
            last: None,
        }
    }

    pub fn record(&mut self, batch: &BlockBatch) {
        if let Some(block) = batch.blocks.last() {
            self.last = Some(BlockRef::new(block.number, block.hash));
        }
    }

    pub fn last(&self) -> Option<BlockRef> {
        self.last
    }

    pub fn next_block(&self) -> u64 {
        self.last
            .map_or(self.from, |last| last.number.saturating_add(1))
    }

    /// Whether a closed range has been fully delivered. Open ranges never are.
    pub fn is_complete(&self) -> bool {
        match (self.to, self.last) {
            (Some(to), Some(last)) => last.number >= to,
            _ => false,
        }
    }

    /// Options for the next pass: start after the last delivered block and
    /// require it as the parent.
    pub fn resume(&self, options: &IngestOptions) -> IngestOptions {
        let mut next = options.clone();
        if let Some(last) = self.last {
            next.from = self.next_block();
            next.expected_parent_hash = Some(last.hash);
        }
        next
    }
}
