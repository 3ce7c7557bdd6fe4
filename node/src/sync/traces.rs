//! Parity trace API enrichment: `trace_block` and `trace_replayBlockTransactions`.

use super::{client::RpcIngest, plan::ReplayTracers, Enrichment};
use crate::{
    chain::{RawBlock, ReplayRecord, TraceFrame, TraceReplay},
    error::IngestError,
    rpc::{fetch_batch, quantity, RpcRequest},
};
use alloy_primitives::B256;
use serde_json::json;
use std::collections::{HashMap, HashSet};

pub(super) async fn trace_block(
    client: &RpcIngest,
    blocks: &[RawBlock],
) -> Result<Vec<Enrichment<Vec<TraceReplay>>>, IngestError> {
    let requests: Vec<RpcRequest> = blocks
        .iter()
        .map(|block| RpcRequest::new("trace_block", vec![quantity(block.number)]))
        .collect();
    let served: Vec<Option<Vec<TraceFrame>>> =
        fetch_batch(client.transport(), &requests, client.retry_attempts(), None).await?;

    Ok(blocks
        .iter()
        .zip(served)
        .map(|(block, frames)| match frames {
            None => Enrichment::Invalid(format!("traces unavailable for block {}", block.number)),
            Some(frames) => check_block_frames(block, frames),
        })
        .collect())
}

fn check_block_frames(block: &RawBlock, frames: Vec<TraceFrame>) -> Enrichment<Vec<TraceReplay>> {
    if frames.is_empty() && !block.transactions.is_empty() {
        return Enrichment::Invalid(format!(
            "no trace frames for block {} with {} transactions; node may be pruned",
            block.number,
            block.transactions.len()
        ));
    }
    if let Some(frame) = frames.iter().find(|f| f.block_hash != Some(block.hash)) {
        return Enrichment::Invalid(format!(
            "trace frame of block {} reports block hash {:?}",
            block.number, frame.block_hash
        ));
    }
    Enrichment::Valid(group_by_transaction(frames))
}

/// Groups frames by transaction in first-seen order. Reward frames carry no
/// transaction and are dropped.
fn group_by_transaction(frames: Vec<TraceFrame>) -> Vec<TraceReplay> {
    let mut replays: Vec<TraceReplay> = Vec::new();
    let mut positions: HashMap<B256, usize> = HashMap::new();
    for frame in frames {
        let Some(hash) = frame.transaction_hash else {
            continue;
        };
        let idx = *positions.entry(hash).or_insert_with(|| {
            replays.push(TraceReplay {
                transaction_hash: hash,
                trace: Some(Vec::new()),
                state_diff: None,
            });
            replays.len() - 1
        });
        if let Some(trace) = replays[idx].trace.as_mut() {
            trace.push(frame);
        }
    }
    replays
}

pub(super) async fn replay(
    client: &RpcIngest,
    blocks: &[RawBlock],
    tracers: ReplayTracers,
) -> Result<Vec<Enrichment<Vec<TraceReplay>>>, IngestError> {
    let requests: Vec<RpcRequest> = blocks
        .iter()
        .map(|block| {
            RpcRequest::new(
                "trace_replayBlockTransactions",
                vec![quantity(block.number), json!(tracers.names())],
            )
        })
        .collect();
    let served: Vec<Option<Vec<ReplayRecord>>> =
        fetch_batch(client.transport(), &requests, client.retry_attempts(), None).await?;

    blocks
        .iter()
        .zip(served)
        .map(|(block, records)| match records {
            None => Ok(Enrichment::Invalid(format!(
                "replay unavailable for block {}",
                block.number
            ))),
            Some(records) => resolve_block_replay(block, records, tracers),
        })
        .collect()
}

fn resolve_block_replay(
    block: &RawBlock,
    records: Vec<ReplayRecord>,
    tracers: ReplayTracers,
) -> Result<Enrichment<Vec<TraceReplay>>, IngestError> {
    let known: HashSet<B256> = block.transactions.hashes().into_iter().collect();
    let mut replays = Vec::with_capacity(records.len());
    for record in records {
        let hash = replay_transaction_hash(&record)?;
        if !known.contains(&hash) {
            return Ok(Enrichment::Invalid(format!(
                "replay of block {} references unknown transaction {hash}",
                block.number
            )));
        }
        replays.push(TraceReplay {
            transaction_hash: hash,
            trace: if tracers.trace { record.trace } else { None },
            state_diff: if tracers.state_diff { record.state_diff } else { None },
        });
    }
    Ok(Enrichment::Valid(replays))
}

/// Hash of the replayed transaction, inferred from its frames when the record
/// omits it. Every frame must name the same non-zero hash.
pub(crate) fn replay_transaction_hash(record: &ReplayRecord) -> Result<B256, IngestError> {
    if let Some(hash) = record.transaction_hash {
        return Ok(hash);
    }
    let mut inferred: Option<B256> = None;
    for frame in record.trace.iter().flatten() {
        let hash = frame
            .transaction_hash
            .filter(|hash| !hash.is_zero())
            .ok_or_else(|| IngestError::invariant("replay frame without transaction hash"))?;
        match inferred {
            Some(seen) if seen != hash => {
                return Err(IngestError::invariant(format!(
                    "replay frames disagree on transaction: {seen} vs {hash}"
                )))
            }
            _ => inferred = Some(hash),
        }
    }
    inferred.ok_or_else(|| {
        IngestError::invariant("cannot infer transaction hash of replay without frames")
    })
}
