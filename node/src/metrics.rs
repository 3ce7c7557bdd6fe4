//! Lightweight ingest counters and rate helpers.

use crate::sync::BlockBatch;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counts what the ingest stream delivered.
#[derive(Debug)]
pub struct IngestStats {
    started_at: Instant,
    blocks: AtomicU64,
    batches: AtomicU64,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            blocks: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    pub fn record_batch(&self, batch: &BlockBatch) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.blocks
            .fetch_add(batch.blocks.len() as u64, Ordering::Relaxed);
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Blocks per second since creation.
    pub fn blocks_per_sec(&self) -> Option<f64> {
        rate_per_sec(self.blocks(), self.elapsed())
    }
}

pub fn rate_per_sec(count: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        Some(count as f64 / secs)
    } else {
        None
    }
}

pub fn range_len(range: &RangeInclusive<u64>) -> u64 {
    range.end().saturating_sub(*range.start()).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::BlockRef,
        sync::{BlockBatch, IngestedBlock},
        test_utils::{block_hash, block_json},
    };

    fn batch(numbers: RangeInclusive<u64>) -> BlockBatch {
        let blocks = numbers
            .map(|number| {
                let json = block_json(number, block_hash(number), block_hash(number - 1), 0);
                IngestedBlock {
                    number,
                    hash: block_hash(number),
                    block: serde_json::from_value(json).expect("block"),
                    receipts: None,
                    traces: None,
                    call_traces: None,
                    state_diffs: None,
                }
            })
            .collect();
        BlockBatch {
            blocks,
            finalized_head: BlockRef::new(0, block_hash(0)),
        }
    }

    #[test]
    fn stats_count_blocks_and_batches() {
        let stats = IngestStats::new();
        stats.record_batch(&batch(1..=4));
        stats.record_batch(&batch(5..=5));
        assert_eq!(stats.batches(), 2);
        assert_eq!(stats.blocks(), 5);
    }

    #[test]
    fn rate_per_sec_handles_zero_duration() {
        assert_eq!(rate_per_sec(10, Duration::from_secs(0)), None);
        let rate = rate_per_sec(10, Duration::from_secs(2)).expect("rate");
        assert!((rate - 5.0).abs() < 1e-6);
    }

    #[test]
    fn range_len_counts_inclusive() {
        assert_eq!(range_len(&(5..=5)), 1);
        assert_eq!(range_len(&(5..=7)), 3);
        assert_eq!(range_len(&(0..=u64::MAX)), u64::MAX);
    }
}
