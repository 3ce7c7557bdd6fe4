//! Parent-hash continuity across batches and fork detection.

use super::{BlockBatch, ForkSignal, IngestEvent};
use crate::{chain::BlockRef, error::IngestError};
use alloy_primitives::B256;
use futures::{future, stream, Stream, StreamExt};
use tracing::warn;

/// Tracks the hash the next block must name as its parent.
#[derive(Debug, Clone, Default)]
pub struct ContinuityGuard {
    expected_parent_hash: Option<B256>,
}

/// What to pass downstream for one checked batch.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome {
    pub emit: Option<BlockBatch>,
    pub fork: Option<ForkSignal>,
}

impl ContinuityGuard {
    /// Without an expected hash the first block seen is trusted.
    pub fn new(expected_parent_hash: Option<B256>) -> Self {
        Self {
            expected_parent_hash,
        }
    }

    pub fn expected_parent_hash(&self) -> Option<B256> {
        self.expected_parent_hash
    }

    /// Accepts the longest prefix of `batch` that extends the trusted chain.
    pub fn check(&mut self, batch: BlockBatch) -> GuardOutcome {
        let break_at = batch.blocks.iter().position(|block| {
            let extends = self
                .expected_parent_hash
                .is_none_or(|expected| block.parent_hash() == expected);
            if extends {
                self.expected_parent_hash = Some(block.hash);
            }
            !extends
        });
        let Some(index) = break_at else {
            return GuardOutcome {
                emit: Some(batch),
                fork: None,
            };
        };

        let BlockBatch {
            mut blocks,
            finalized_head,
        } = batch;
        let conflicting = blocks.swap_remove(index);
        blocks.truncate(index);
        let trusted_parent_hash = self.expected_parent_hash.unwrap_or_default();
        let fork = ForkSignal {
            trusted_parent_hash,
            conflicting_block: conflicting.block_ref(),
            candidate_parents: conflicting
                .number
                .checked_sub(1)
                .map(|number| BlockRef::new(number, conflicting.parent_hash()))
                .into_iter()
                .collect(),
        };
        warn!(
            number = conflicting.number,
            hash = %conflicting.hash,
            parent_hash = %conflicting.parent_hash(),
            trusted = %trusted_parent_hash,
            "block does not extend the trusted chain"
        );
        GuardOutcome {
            emit: (!blocks.is_empty()).then_some(BlockBatch {
                blocks,
                finalized_head,
            }),
            fork: Some(fork),
        }
    }
}

/// Runs `batches` through `guard`. The stream ends after a fork or an error.
pub fn guard_stream<S>(
    batches: S,
    guard: ContinuityGuard,
) -> impl Stream<Item = Result<IngestEvent, IngestError>>
where
    S: Stream<Item = Result<BlockBatch, IngestError>>,
{
    batches
        .scan((guard, false), |(guard, halted), item| {
            if *halted {
                return future::ready(None);
            }
            let events: Vec<Result<IngestEvent, IngestError>> = match item {
                Ok(batch) => {
                    let outcome = guard.check(batch);
                    *halted = outcome.fork.is_some();
                    outcome
                        .emit
                        .map(IngestEvent::Batch)
                        .into_iter()
                        .chain(outcome.fork.map(IngestEvent::Fork))
                        .map(Ok)
                        .collect()
                }
                Err(err) => {
                    *halted = true;
                    vec![Err(err)]
                }
            };
            future::ready(Some(stream::iter(events)))
        })
        .flatten()
}
