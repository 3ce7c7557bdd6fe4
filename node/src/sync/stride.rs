//! Fixed-size window scheduling over a block range.

use super::{client::RpcIngest, BlockBatch, Commitment, DataRequest};
use crate::error::IngestError;
use futures::{future, stream, Stream, StreamExt};
use std::{ops::RangeInclusive, sync::Arc};
use tracing::debug;

/// Splits `from..=to` (or `from..` when `to` is `None`) into consecutive
/// windows of `stride_size` blocks.
#[derive(Debug, Clone)]
pub struct StridePlanner {
    next: Option<u64>,
    to: Option<u64>,
    stride_size: u64,
}

impl StridePlanner {
    pub fn new(from: u64, to: Option<u64>, stride_size: u64) -> Self {
        Self {
            next: Some(from),
            to,
            stride_size: stride_size.max(1),
        }
    }
}

impl Iterator for StridePlanner {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        if self.to.is_some_and(|to| start > to) {
            self.next = None;
            return None;
        }
        let mut end = start.saturating_add(self.stride_size - 1);
        if let Some(to) = self.to {
            end = end.min(to);
        }
        self.next = end.checked_add(1);
        Some(start..=end)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrideOptions {
    pub from: u64,
    pub to: Option<u64>,
    pub stride_size: u64,
    /// Windows in flight at once.
    pub concurrency: usize,
}

/// One fetched window and how many blocks it asked for.
struct WindowResult {
    batch: BlockBatch,
    requested: usize,
}

async fn fetch_window(
    client: &RpcIngest,
    request: &DataRequest,
    window: RangeInclusive<u64>,
) -> Result<WindowResult, IngestError> {
    let numbers: Vec<u64> = window.collect();
    let finalized_head = client.get_latest_blockhash(Commitment::Finalized).await?;
    let blocks = client.get_block_batch(&numbers, request).await?;
    Ok(WindowResult {
        batch: BlockBatch {
            blocks,
            finalized_head,
        },
        requested: numbers.len(),
    })
}

/// Fetches windows with up to `concurrency` in flight and yields their batches
/// in ascending order.
///
/// The pass ends after an empty window, after a window that came back short
/// (later windows could not chain onto it), or after the first error.
pub fn stride_stream(
    client: RpcIngest,
    request: DataRequest,
    options: StrideOptions,
) -> impl Stream<Item = Result<BlockBatch, IngestError>> + Send + 'static {
    let request = Arc::new(request);
    let windows = StridePlanner::new(options.from, options.to, options.stride_size);
    stream::iter(windows)
        .map(move |window| {
            let client = client.clone();
            let request = Arc::clone(&request);
            async move { fetch_window(&client, &request, window).await }
        })
        .buffered(options.concurrency.max(1))
        .scan(false, |finished, result| {
            if *finished {
                return future::ready(None);
            }
            let item = match result {
                Ok(WindowResult { batch, .. }) if batch.blocks.is_empty() => {
                    debug!("empty window, ending pass");
                    None
                }
                Ok(WindowResult { batch, requested }) => {
                    if batch.blocks.len() < requested {
                        debug!(
                            requested,
                            received = batch.blocks.len(),
                            "short window, ending pass"
                        );
                        *finished = true;
                    }
                    Some(Ok(batch))
                }
                Err(err) => {
                    *finished = true;
                    Some(Err(err))
                }
            };
            future::ready(item)
        })
}
